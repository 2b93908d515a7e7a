//! Events: everything that happens to an entity during a frame.
//!
//! Events are stored in the timeline's interval tree, which needs a total
//! order on values. Equality is deliberately looser than field-by-field
//! comparison: a collision's sub-frame offset, an acceleration's flags and a
//! teleportation's spin are treated as metadata, so that the same logical
//! event recurring over consecutive frames fuses into a single interval. The
//! storage order is stricter than equality (it includes the world position)
//! so that distinct same-kind inputs within one frame all survive.

use std::cmp::Ordering;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    geometry::{Quaternion, Vec3},
    scene::{Entity, FuelTank},
};

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[repr(transparent)]
    pub struct AccelerationFlags: u32 {
        /// Apply the entire value on the first frame instead of scaling by
        /// delta time.
        const IMPULSE = 1;
        /// Divide the value by inertial mass to obtain acceleration.
        const FORCE = 1 << 1;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct Acceleration {
    pub linear: Vec3,
    pub flags: AccelerationFlags,
    pub angular: Quaternion,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct Collision {
    pub first_id: Entity,
    pub second_id: Entity,
    /// Seconds into the frame at which contact occurs, in `[0, dt]`.
    pub first_frame_offset_seconds: f32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct Stick {
    /// Entity to glue to; nil detaches.
    pub parent_id: Entity,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct Destruction {
    pub value: i32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct Damage {
    pub value: i32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct Teleportation {
    pub new_position: Vec3,
    pub new_velocity: Vec3,
    pub new_spin: Quaternion,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct RocketBurn {
    pub fuel_tank: i32,
    /// Desired thrust as a fraction of the tank's output, so ranging in
    /// magnitude from 0 to 1.
    pub thrust: Vec3,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct RocketRefuel {
    /// Tank to overwrite; negative picks the first empty tank.
    pub fuel_tank_no: i32,
    pub fuel_tank: FuelTank,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct Spawn {
    pub pool_id: Entity,
    pub rotation: Quaternion,
    pub velocity: Vec3,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct SpawnAttempt {
    pub rotation: Quaternion,
    pub velocity: Vec3,
}

/// Discriminates [`Payload`]; the explicit values are the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum EventKind {
    Acceleration = 1,
    Collision = 2,
    Stick = 3,
    Destruction = 4,
    Damage = 5,
    Teleportation = 6,
    RocketBurn = 7,
    RocketRefuel = 8,
    Spawn = 9,
    SpawnAttempt = 10,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Payload {
    Acceleration(Acceleration),
    Collision(Collision),
    Stick(Stick),
    Destruction(Destruction),
    Damage(Damage),
    Teleportation(Teleportation),
    RocketBurn(RocketBurn),
    RocketRefuel(RocketRefuel),
    Spawn(Spawn),
    SpawnAttempt(SpawnAttempt),
}

impl Payload {
    pub fn kind(&self) -> EventKind {
        match self {
            Payload::Acceleration(_) => EventKind::Acceleration,
            Payload::Collision(_) => EventKind::Collision,
            Payload::Stick(_) => EventKind::Stick,
            Payload::Destruction(_) => EventKind::Destruction,
            Payload::Damage(_) => EventKind::Damage,
            Payload::Teleportation(_) => EventKind::Teleportation,
            Payload::RocketBurn(_) => EventKind::RocketBurn,
            Payload::RocketRefuel(_) => EventKind::RocketRefuel,
            Payload::Spawn(_) => EventKind::Spawn,
            Payload::SpawnAttempt(_) => EventKind::SpawnAttempt,
        }
    }
}

macro_rules! payload_from {
    ($($variant:ident($t:ty)),*) => {
        $(impl From<$t> for Payload {
            fn from(value: $t) -> Self {
                Payload::$variant(value)
            }
        })*
    };
}

payload_from!(
    Acceleration(Acceleration),
    Collision(Collision),
    Stick(Stick),
    Destruction(Destruction),
    Damage(Damage),
    Teleportation(Teleportation),
    RocketBurn(RocketBurn),
    RocketRefuel(RocketRefuel),
    Spawn(Spawn),
    SpawnAttempt(SpawnAttempt)
);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Event {
    pub id: Entity,
    /// World position the event happened at; metadata, never compared.
    pub position: Vec3,
    pub payload: Payload,
}

impl Event {
    pub fn new(id: Entity, position: Vec3, payload: impl Into<Payload>) -> Self {
        Self {
            id,
            position,
            payload: payload.into(),
        }
    }

    /// A collision event acts on its first entity.
    pub fn collision(position: Vec3, collision: Collision) -> Self {
        Self::new(collision.first_id, position, collision)
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

fn payload_cmp(a: &Payload, b: &Payload) -> Ordering {
    match (a, b) {
        (Payload::Acceleration(x), Payload::Acceleration(y)) => {
            // Flags are metadata, like the collision offset below.
            x.linear
                .total_cmp(&y.linear)
                .then(x.angular.total_cmp(&y.angular))
        }
        (Payload::Collision(x), Payload::Collision(y)) => {
            // The sub-frame offset is intentionally ignored so that a
            // colliding pair merges into a single interval.
            x.first_id
                .cmp(&y.first_id)
                .then(x.second_id.cmp(&y.second_id))
        }
        (Payload::Stick(x), Payload::Stick(y)) => x.parent_id.cmp(&y.parent_id),
        (Payload::Destruction(x), Payload::Destruction(y)) => x.value.cmp(&y.value),
        (Payload::Damage(x), Payload::Damage(y)) => x.value.cmp(&y.value),
        (Payload::Teleportation(x), Payload::Teleportation(y)) => x
            .new_position
            .total_cmp(&y.new_position)
            .then(x.new_velocity.total_cmp(&y.new_velocity)),
        (Payload::RocketBurn(x), Payload::RocketBurn(y)) => x
            .fuel_tank
            .cmp(&y.fuel_tank)
            .then(x.thrust.total_cmp(&y.thrust)),
        (Payload::RocketRefuel(x), Payload::RocketRefuel(y)) => x
            .fuel_tank_no
            .cmp(&y.fuel_tank_no)
            .then(x.fuel_tank.mass_flow_rate.total_cmp(&y.fuel_tank.mass_flow_rate))
            .then(x.fuel_tank.fuel.total_cmp(&y.fuel_tank.fuel))
            .then(x.fuel_tank.thrust.total_cmp(&y.fuel_tank.thrust)),
        (Payload::Spawn(x), Payload::Spawn(y)) => x
            .pool_id
            .cmp(&y.pool_id)
            .then(x.rotation.total_cmp(&y.rotation))
            .then(x.velocity.total_cmp(&y.velocity)),
        (Payload::SpawnAttempt(x), Payload::SpawnAttempt(y)) => x
            .rotation
            .total_cmp(&y.rotation)
            .then(x.velocity.total_cmp(&y.velocity)),
        // Different kinds; ordered by their discriminants in Event::cmp.
        _ => Ordering::Equal,
    }
}

impl Ord for Event {
    /// Storage order: `(id, kind, position, payload)`. The position takes
    /// part here - two otherwise-equal inputs at different world positions
    /// are distinct tree entries - even though [`PartialEq`] treats it as
    /// metadata. Equality is deliberately coarser than the order; interval
    /// merging relies on it.
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then(self.kind().cmp(&other.kind()))
            .then_with(|| self.position.total_cmp(&other.position))
            .then_with(|| payload_cmp(&self.payload, &other.payload))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.kind() == other.kind()
            && payload_cmp(&self.payload, &other.payload) == Ordering::Equal
    }
}

impl Eq for Event {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum TriggerCondition {
    Collision = 0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum TriggerTarget {
    /// The entity carrying the trigger.
    Owner = 0,
    /// The entity the trigger's owner collided with.
    CollidingObject = 1,
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[repr(transparent)]
    pub struct TriggerFlags: u32 {
        /// Also destroy the trigger's owner when it fires.
        const DESTROY_TRIGGER = 1;
    }
}

/// Per-entity event template emitted when a `TriggerEvent` collision rule
/// fires on the owner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Trigger {
    pub id: Entity,
    pub condition: TriggerCondition,
    pub target: TriggerTarget,
    pub flags: TriggerFlags,
    pub event: Event,
}

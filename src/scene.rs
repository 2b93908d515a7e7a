//! The entity-component scene model.
//!
//! Every entity has one instance of each required component, stored in dense
//! vectors where the entity value is the offset. Optional components carry
//! their entity id as the first field and live in per-type vectors kept
//! sorted by id for binary search. A [`Frame`] is the complete set of
//! component vectors at one simulated instant.

use std::ops::{Add, Mul};

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::{
    events::Trigger,
    geometry::{Quaternion, Vec3},
};

/// Identifies a physics object, and can be used to look up both required and
/// optional components. Intentionally opaque to prevent accidental mixups
/// between entities and other vector offsets.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Pod,
    Zeroable,
    Serialize,
    Deserialize,
)]
#[repr(transparent)]
pub struct Entity(i32);

impl Entity {
    /// Sentinel meaning no entity.
    pub const NIL: Entity = Entity(-1);
    pub const MAX: i32 = 1_000_000;

    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> i32 {
        self.0
    }

    /// Offset into the required-component vectors.
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    pub const fn is_nil(&self) -> bool {
        self.0 < 0
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quaternion,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Mass {
    /// Resistance to acceleration from forces.
    pub inertial: f32,
    /// Gravitational pull exerted on other entities.
    pub active: f32,
    /// Maximum distance at which the active mass attracts; 0 means unbounded.
    pub cutoff_distance: f32,
}

/// Kinematic scratch state. `new_position` is a two-phase buffer: integration
/// writes it, collision detection reads both it and the committed position,
/// and the commit pass copies it into the transform.
#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Motion {
    pub velocity: Vec3,
    pub new_position: Vec3,
    pub acceleration: Vec3,
    pub spin: Quaternion,
}

impl Motion {
    pub fn from_position_and_velocity(position: Vec3, velocity: Vec3) -> Self {
        Self {
            velocity,
            new_position: position + velocity,
            acceleration: Vec3::ZERO,
            spin: Quaternion::IDENTITY,
        }
    }
}

/// Sphere collider in entity-local coordinates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Collider {
    pub layer: u32,
    pub radius: f32,
    pub center: Vec3,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Glue {
    pub parent_id: Entity,
}

bitflags! {
    /// Per-entity behavior switches.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[repr(transparent)]
    pub struct Flags: u32 {
        const DESTROYED = 1;
        const GLUED = 1 << 1;
        const ORBITING = 1 << 2;
        const REUSABLE = 1 << 3;
    }
}

/// Keplerian orbital elements. Angles are in degrees.
#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Kepler {
    pub semi_major_axis: f32,
    pub eccentricity: f32,
    pub mean_longitude_deg: f32,
    pub longitude_of_perihelion_deg: f32,
    pub longitude_of_ascending_node_deg: f32,
    pub inclination_deg: f32,
}

impl Add<Kepler> for Kepler {
    type Output = Kepler;

    fn add(self, rhs: Kepler) -> Self::Output {
        Kepler {
            semi_major_axis: self.semi_major_axis + rhs.semi_major_axis,
            eccentricity: self.eccentricity + rhs.eccentricity,
            mean_longitude_deg: self.mean_longitude_deg + rhs.mean_longitude_deg,
            longitude_of_perihelion_deg: self.longitude_of_perihelion_deg
                + rhs.longitude_of_perihelion_deg,
            longitude_of_ascending_node_deg: self.longitude_of_ascending_node_deg
                + rhs.longitude_of_ascending_node_deg,
            inclination_deg: self.inclination_deg + rhs.inclination_deg,
        }
    }
}

impl Mul<f32> for Kepler {
    type Output = Kepler;

    fn mul(self, rhs: f32) -> Self::Output {
        Kepler {
            semi_major_axis: self.semi_major_axis * rhs,
            eccentricity: self.eccentricity * rhs,
            mean_longitude_deg: self.mean_longitude_deg * rhs,
            longitude_of_perihelion_deg: self.longitude_of_perihelion_deg * rhs,
            longitude_of_ascending_node_deg: self.longitude_of_ascending_node_deg * rhs,
            inclination_deg: self.inclination_deg * rhs,
        }
    }
}

/// Closed-form orbit: elements at the epoch plus per-second deltas.
#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Orbit {
    pub id: Entity,
    pub focus: Vec3,
    pub epoch: Kepler,
    pub delta: Kepler,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Durability {
    pub id: Entity,
    pub value: i32,
    pub max: i32,
}

pub const MAX_FUEL_TANKS: usize = 8;

#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct FuelTank {
    /// How much the fuel in the tank weighs, in kg per second of thrust.
    pub mass_flow_rate: f32,
    /// Fuel in seconds: how long the tank can provide thrust.
    pub fuel: f32,
    /// The force the fuel tank can produce, in N.
    pub thrust: f32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Rocket {
    pub id: Entity,
    pub fuel_tank_count: i32,
    pub fuel_tanks: [FuelTank; MAX_FUEL_TANKS],
}

/// Pool membership of a reusable entity; `next_id` threads the pool's
/// singly-linked free list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct ReuseTag {
    pub id: Entity,
    pub pool_id: Entity,
    pub next_id: Entity,
}

/// Pool bookkeeping, attached to the pool entity. `free_count + in_use_count`
/// stays equal to the pool's initial capacity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct ReusePool {
    pub id: Entity,
    pub first_id: Entity,
    pub in_use_count: i32,
    pub free_count: i32,
}

/// Optional components carry the id of the entity they belong to and are kept
/// in vectors sorted by that id.
pub trait Keyed {
    fn id(&self) -> Entity;
    fn set_id(&mut self, id: Entity);
}

macro_rules! keyed {
    ($($t:ty),*) => {
        $(impl Keyed for $t {
            fn id(&self) -> Entity {
                self.id
            }
            fn set_id(&mut self, id: Entity) {
                self.id = id;
            }
        })*
    };
}

keyed!(Orbit, Durability, Rocket, ReuseTag, ReusePool, Trigger);

pub fn find_component<T: Keyed>(data: &[T], id: Entity) -> Option<&T> {
    find_component_index(data, id).map(|idx| &data[idx])
}

pub fn find_component_mut<T: Keyed>(data: &mut [T], id: Entity) -> Option<&mut T> {
    find_component_index(data, id).map(move |idx| &mut data[idx])
}

pub fn find_component_index<T: Keyed>(data: &[T], id: Entity) -> Option<usize> {
    data.binary_search_by(|c| c.id().cmp(&id)).ok()
}

/// Inserts or overwrites the component at the position that keeps the vector
/// sorted by id, and returns that position. Appending at the end is constant
/// time; inserting in the middle is linear, so scenes should be built in
/// ascending entity order.
pub fn set_component<T: Keyed>(data: &mut Vec<T>, component: T) -> usize {
    let id = component.id();
    match data.binary_search_by(|c| c.id().cmp(&id)) {
        Ok(idx) => {
            data[idx] = component;
            idx
        }
        Err(idx) => {
            if idx != data.len() {
                log::warn!(
                    "inserting component for entity {} at non-terminal index {idx} \
                     is a linear-time operation",
                    id.value()
                );
            }
            data.insert(idx, component);
            idx
        }
    }
}

pub fn copy_component<T: Keyed + Clone>(data: &mut Vec<T>, dst: Entity, src: Entity) {
    let Some(src_value) = find_component(data, src) else {
        return;
    };
    let mut value = src_value.clone();
    value.set_id(dst);
    set_component(data, value);
}

/// All component vectors at one simulated instant.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Frame {
    // Required components. Point mass moves clumsily, goes fast.
    pub transforms: Vec<Transform>,
    pub mass: Vec<Mass>,
    pub motion: Vec<Motion>,
    pub colliders: Vec<Collider>,
    pub glue: Vec<Glue>,
    pub flags: Vec<Flags>,

    // Optional components, sorted by entity id.
    pub orbits: Vec<Orbit>,
    pub durability: Vec<Durability>,
    pub rockets: Vec<Rocket>,
    pub triggers: Vec<Trigger>,
    pub reuse_pools: Vec<ReusePool>,
    pub reuse_tags: Vec<ReuseTag>,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Appends an entity with all-default required components; used by the
    /// object pool to reserve slots.
    pub fn push_default(&mut self) -> Entity {
        self.push(
            Transform::default(),
            Mass::default(),
            Motion::default(),
            Collider::default(),
            Glue::default(),
            Flags::default(),
        )
    }

    pub fn push(
        &mut self,
        transform: Transform,
        mass: Mass,
        motion: Motion,
        collider: Collider,
        glue: Glue,
        flags: Flags,
    ) -> Entity {
        let id = self.transforms.len() as i32;
        debug_assert!(id < Entity::MAX);
        self.transforms.push(transform);
        self.mass.push(mass);
        self.motion.push(motion);
        self.colliders.push(collider);
        self.glue.push(glue);
        self.flags.push(flags);
        Entity::new(id)
    }

    pub fn set_orbit(&mut self, orbit: Orbit) -> usize {
        set_component(&mut self.orbits, orbit)
    }

    pub fn set_durability(&mut self, durability: Durability) -> usize {
        set_component(&mut self.durability, durability)
    }

    pub fn set_rocket(&mut self, rocket: Rocket) -> usize {
        set_component(&mut self.rockets, rocket)
    }

    pub fn set_trigger(&mut self, trigger: Trigger) -> usize {
        set_component(&mut self.triggers, trigger)
    }
}

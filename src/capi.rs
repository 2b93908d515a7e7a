//! Flat, opaque-handle C API over frames, rule sets and timelines.
//!
//! Handles are raw pointers produced by the `Create*` functions and released
//! by the matching `Destroy*`; every entry point tolerates null handles. The
//! idiomatic event and rule types are mirrored here by `#[repr(C)]` twins
//! (`RawEvent`, `RawCollisionEffect`, `RawTrigger`) whose layouts are the
//! wire contract; conversion happens at this boundary and nowhere else.

#![allow(clippy::missing_safety_doc)]

use std::{ptr, slice, time::Duration};

use crate::{
    events::{
        Acceleration, Collision, Damage, Destruction, Event, EventKind, Payload, RocketBurn,
        RocketRefuel, Spawn, SpawnAttempt, Stick, Teleportation, Trigger, TriggerCondition,
        TriggerFlags, TriggerTarget,
    },
    geometry::{LayerMatrix, Vec3},
    motion::Integrator,
    orbit::elliptical_position,
    pool::initialize_pool,
    rules::{ApplyDamageParams, BounceParams, CollisionEffect, EffectKind, RuleSet},
    scene::{
        find_component, Collider, Durability, Entity, Flags, Frame, Glue, Kepler, Mass, Motion,
        Orbit, Rocket, Transform,
    },
    timeline::{Timeline, Trajectory, TrajectoryAttributes},
};

// EVENT WIRE FORMAT //

#[repr(C)]
#[derive(Clone, Copy)]
pub union RawPayload {
    pub acceleration: Acceleration,
    pub collision: Collision,
    pub stick: Stick,
    pub destruction: Destruction,
    pub damage: Damage,
    pub teleportation: Teleportation,
    pub rocket_burn: RocketBurn,
    pub rocket_refuel: RocketRefuel,
    pub spawn: Spawn,
    pub spawn_attempt: SpawnAttempt,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawEvent {
    pub id: Entity,
    pub kind: u32,
    pub position: Vec3,
    pub payload: RawPayload,
}

impl From<Event> for RawEvent {
    fn from(event: Event) -> Self {
        let (kind, payload) = match event.payload {
            Payload::Acceleration(acceleration) => {
                (EventKind::Acceleration, RawPayload { acceleration })
            }
            Payload::Collision(collision) => (EventKind::Collision, RawPayload { collision }),
            Payload::Stick(stick) => (EventKind::Stick, RawPayload { stick }),
            Payload::Destruction(destruction) => {
                (EventKind::Destruction, RawPayload { destruction })
            }
            Payload::Damage(damage) => (EventKind::Damage, RawPayload { damage }),
            Payload::Teleportation(teleportation) => {
                (EventKind::Teleportation, RawPayload { teleportation })
            }
            Payload::RocketBurn(rocket_burn) => (EventKind::RocketBurn, RawPayload { rocket_burn }),
            Payload::RocketRefuel(rocket_refuel) => {
                (EventKind::RocketRefuel, RawPayload { rocket_refuel })
            }
            Payload::Spawn(spawn) => (EventKind::Spawn, RawPayload { spawn }),
            Payload::SpawnAttempt(spawn_attempt) => {
                (EventKind::SpawnAttempt, RawPayload { spawn_attempt })
            }
        };
        RawEvent {
            id: event.id,
            kind: kind as u32,
            position: event.position,
            payload,
        }
    }
}

impl RawEvent {
    /// Returns None when the discriminator is not a valid event kind.
    pub fn to_event(&self) -> Option<Event> {
        let payload = unsafe {
            match self.kind {
                k if k == EventKind::Acceleration as u32 => {
                    Payload::Acceleration(self.payload.acceleration)
                }
                k if k == EventKind::Collision as u32 => Payload::Collision(self.payload.collision),
                k if k == EventKind::Stick as u32 => Payload::Stick(self.payload.stick),
                k if k == EventKind::Destruction as u32 => {
                    Payload::Destruction(self.payload.destruction)
                }
                k if k == EventKind::Damage as u32 => Payload::Damage(self.payload.damage),
                k if k == EventKind::Teleportation as u32 => {
                    Payload::Teleportation(self.payload.teleportation)
                }
                k if k == EventKind::RocketBurn as u32 => {
                    Payload::RocketBurn(self.payload.rocket_burn)
                }
                k if k == EventKind::RocketRefuel as u32 => {
                    Payload::RocketRefuel(self.payload.rocket_refuel)
                }
                k if k == EventKind::Spawn as u32 => Payload::Spawn(self.payload.spawn),
                k if k == EventKind::SpawnAttempt as u32 => {
                    Payload::SpawnAttempt(self.payload.spawn_attempt)
                }
                _ => return None,
            }
        };
        Some(Event {
            id: self.id,
            position: self.position,
            payload,
        })
    }
}

// FRAME API //

#[no_mangle]
pub unsafe extern "C" fn CreateFrame() -> *mut Frame {
    Box::into_raw(Box::default())
}

#[no_mangle]
pub unsafe extern "C" fn DestroyFrame(frame: *mut Frame) {
    if !frame.is_null() {
        drop(Box::from_raw(frame));
    }
}

/// Raw views into all component vectors of a frame. Every entity has all six
/// required components, so the six required arrays share `object_count` and
/// the entity id is the offset into them. Optional components carry their
/// entity id as the first field and are sorted by it for binary search.
///
/// Pointers are valid until the frame is next mutated. `trigger_data` points
/// at a Rust-layout type and is exposed for completeness only.
#[repr(C)]
pub struct FrameView {
    pub object_count: i32,

    pub transform_data: *mut Transform,
    pub mass_data: *mut Mass,
    pub motion_data: *mut Motion,
    pub collider_data: *mut Collider,
    pub glue_data: *mut Glue,
    pub flags_data: *mut Flags,

    pub orbit_count: i32,
    pub orbit_data: *mut Orbit,

    pub durability_count: i32,
    pub durability_data: *mut Durability,

    pub rocket_count: i32,
    pub rocket_data: *mut Rocket,

    pub trigger_count: i32,
    pub trigger_data: *mut Trigger,

    pub reuse_pool_count: i32,
    pub reuse_pool_data: *mut crate::scene::ReusePool,

    pub reuse_tag_count: i32,
    pub reuse_tag_data: *mut crate::scene::ReuseTag,
}

#[no_mangle]
pub unsafe extern "C" fn FrameSyncView(frame: *mut Frame, out_view: *mut FrameView) {
    let (Some(frame), Some(view)) = (frame.as_mut(), out_view.as_mut()) else {
        return;
    };

    view.object_count = frame.len() as i32;
    view.transform_data = frame.transforms.as_mut_ptr();
    view.mass_data = frame.mass.as_mut_ptr();
    view.motion_data = frame.motion.as_mut_ptr();
    view.collider_data = frame.colliders.as_mut_ptr();
    view.glue_data = frame.glue.as_mut_ptr();
    view.flags_data = frame.flags.as_mut_ptr();

    view.orbit_count = frame.orbits.len() as i32;
    view.orbit_data = frame.orbits.as_mut_ptr();
    view.durability_count = frame.durability.len() as i32;
    view.durability_data = frame.durability.as_mut_ptr();
    view.rocket_count = frame.rockets.len() as i32;
    view.rocket_data = frame.rockets.as_mut_ptr();
    view.trigger_count = frame.triggers.len() as i32;
    view.trigger_data = frame.triggers.as_mut_ptr();
    view.reuse_pool_count = frame.reuse_pools.len() as i32;
    view.reuse_pool_data = frame.reuse_pools.as_mut_ptr();
    view.reuse_tag_count = frame.reuse_tags.len() as i32;
    view.reuse_tag_data = frame.reuse_tags.as_mut_ptr();
}

#[no_mangle]
pub unsafe extern "C" fn FramePush(
    frame: *mut Frame,
    transform: Transform,
    mass: Mass,
    motion: Motion,
    collider: Collider,
    glue: Glue,
    flags: Flags,
) -> i32 {
    let Some(frame) = frame.as_mut() else {
        return -1;
    };
    frame.push(transform, mass, motion, collider, glue, flags).value()
}

/// Builds an object pool and writes the member entity ids to `out_ids`, which
/// must have room for `capacity` values. Returns the pool component index, or
/// -1 on failure.
#[no_mangle]
pub unsafe extern "C" fn FramePushObjectPool(
    frame: *mut Frame,
    pool_id: i32,
    prototype_id: i32,
    capacity: i32,
    out_ids: *mut i32,
) -> i32 {
    let Some(frame) = frame.as_mut() else {
        return -1;
    };
    let pool_id = Entity::new(pool_id);
    let Ok(pool_idx) = initialize_pool(pool_id, Entity::new(prototype_id), capacity, frame) else {
        return -1;
    };

    if !out_ids.is_null() {
        let out = slice::from_raw_parts_mut(out_ids, capacity as usize);
        let mut write = 0;
        let mut id = frame.reuse_pools[pool_idx].first_id;
        while !id.is_nil() && write < out.len() {
            out[write] = id.value();
            write += 1;
            id = find_component(&frame.reuse_tags, id)
                .map(|tag| tag.next_id)
                .unwrap_or(Entity::NIL);
        }
        debug_assert_eq!(write, capacity as usize);
    }

    pool_idx as i32
}

#[no_mangle]
pub unsafe extern "C" fn FrameSetOrbit(frame: *mut Frame, orbit: Orbit) -> i32 {
    let Some(frame) = frame.as_mut() else {
        return -1;
    };
    frame.set_orbit(orbit) as i32
}

#[no_mangle]
pub unsafe extern "C" fn FrameSetDurability(frame: *mut Frame, durability: Durability) -> i32 {
    let Some(frame) = frame.as_mut() else {
        return -1;
    };
    frame.set_durability(durability) as i32
}

#[no_mangle]
pub unsafe extern "C" fn FrameSetRocket(frame: *mut Frame, rocket: Rocket) -> i32 {
    let Some(frame) = frame.as_mut() else {
        return -1;
    };
    frame.set_rocket(rocket) as i32
}

/// Trigger template for collision rules, with the embedded event in wire
/// format. Returns -1 when the event or the enums don't decode.
#[repr(C)]
pub struct RawTrigger {
    pub id: Entity,
    pub condition: u32,
    pub target: u32,
    pub flags: u32,
    pub event: RawEvent,
}

#[no_mangle]
pub unsafe extern "C" fn FrameSetTrigger(frame: *mut Frame, trigger: RawTrigger) -> i32 {
    let Some(frame) = frame.as_mut() else {
        return -1;
    };
    let Some(event) = trigger.event.to_event() else {
        return -1;
    };
    let condition = match trigger.condition {
        0 => TriggerCondition::Collision,
        _ => return -1,
    };
    let target = match trigger.target {
        0 => TriggerTarget::Owner,
        1 => TriggerTarget::CollidingObject,
        _ => return -1,
    };
    frame.set_trigger(Trigger {
        id: trigger.id,
        condition,
        target,
        flags: TriggerFlags::from_bits_truncate(trigger.flags),
        event,
    }) as i32
}

// ORBIT API //

#[no_mangle]
pub unsafe extern "C" fn KeplerEllipticalPosition(kepler: Kepler) -> Vec3 {
    elliptical_position(&kepler)
}

// EVENT BUFFER API //

#[derive(Default)]
pub struct EventBuffer {
    events: Vec<RawEvent>,
}

#[no_mangle]
pub unsafe extern "C" fn CreateEventBuffer() -> *mut EventBuffer {
    Box::into_raw(Box::default())
}

#[no_mangle]
pub unsafe extern "C" fn EventBufferClear(event_buffer: *mut EventBuffer) {
    if let Some(buffer) = event_buffer.as_mut() {
        buffer.events.clear();
    }
}

#[no_mangle]
pub unsafe extern "C" fn EventBufferGetEvents(
    event_buffer: *mut EventBuffer,
    out_count: *mut i32,
) -> *mut RawEvent {
    let Some(buffer) = event_buffer.as_mut() else {
        if let Some(count) = out_count.as_mut() {
            *count = 0;
        }
        return ptr::null_mut();
    };
    if let Some(count) = out_count.as_mut() {
        *count = buffer.events.len() as i32;
    }
    buffer.events.as_mut_ptr()
}

#[no_mangle]
pub unsafe extern "C" fn DestroyEventBuffer(event_buffer: *mut EventBuffer) {
    if !event_buffer.is_null() {
        drop(Box::from_raw(event_buffer));
    }
}

// LAYER MATRIX API //

#[no_mangle]
pub unsafe extern "C" fn CreateLayerMatrix() -> *mut LayerMatrix {
    Box::into_raw(Box::default())
}

#[no_mangle]
pub unsafe extern "C" fn LayerMatrixSet(layer_matrix: *mut LayerMatrix, x: u32, y: u32) {
    if let Some(matrix) = layer_matrix.as_mut() {
        if let Err(err) = matrix.set(x, y, true) {
            log::warn!("LayerMatrixSet({x}, {y}): {err}");
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn DestroyLayerMatrix(layer_matrix: *mut LayerMatrix) {
    if !layer_matrix.is_null() {
        drop(Box::from_raw(layer_matrix));
    }
}

// RULE SET API //

#[repr(C)]
#[derive(Clone, Copy)]
pub union RawEffectParams {
    pub apply_damage: ApplyDamageParams,
    pub bounce: BounceParams,
}

/// Collision effect in wire format. `kind`: 0 destroy, 1 apply damage,
/// 2 bounce, 3 stick, 4 trigger event.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawCollisionEffect {
    pub kind: u32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub min_impactor_energy: f32,
    pub max_impactor_energy: f32,
    pub params: RawEffectParams,
}

impl RawCollisionEffect {
    fn to_effect(self) -> Option<CollisionEffect> {
        let kind = unsafe {
            match self.kind {
                0 => EffectKind::Destroy,
                1 => EffectKind::ApplyDamage(self.params.apply_damage),
                2 => EffectKind::Bounce(self.params.bounce),
                3 => EffectKind::Stick,
                4 => EffectKind::TriggerEvent,
                _ => return None,
            }
        };
        Some(CollisionEffect {
            kind,
            min_speed: self.min_speed,
            max_speed: self.max_speed,
            min_impactor_energy: self.min_impactor_energy,
            max_impactor_energy: self.max_impactor_energy,
        })
    }
}

#[no_mangle]
pub unsafe extern "C" fn CreateRuleSet() -> *mut RuleSet {
    Box::into_raw(Box::default())
}

#[no_mangle]
pub unsafe extern "C" fn RuleSetAdd(
    rule_set: *mut RuleSet,
    target_layer: u32,
    other_layer: u32,
    effect: RawCollisionEffect,
) {
    let Some(rule_set) = rule_set.as_mut() else {
        return;
    };
    let Some(effect) = effect.to_effect() else {
        log::warn!("RuleSetAdd: invalid effect kind");
        return;
    };
    rule_set.add((target_layer, other_layer), effect);
}

#[no_mangle]
pub unsafe extern "C" fn DestroyRuleSet(rule_set: *mut RuleSet) {
    if !rule_set.is_null() {
        drop(Box::from_raw(rule_set));
    }
}

// TIMELINE API //

/// Creates a timeline starting from a copy of `frame` at `first_frame_no`.
/// The matrix and rule set are copied as well and can be destroyed
/// afterwards. Integrator: 0 first-order Euler, 1 velocity Verlet.
#[no_mangle]
pub unsafe extern "C" fn CreateTimeline(
    frame: *mut Frame,
    first_frame_no: i32,
    collision_matrix: *mut LayerMatrix,
    rule_set: *mut RuleSet,
    frame_time: f32,
    key_frame_period: i32,
    integrator: u32,
) -> *mut Timeline {
    let (Some(frame), Some(matrix), Some(rule_set)) =
        (frame.as_ref(), collision_matrix.as_ref(), rule_set.as_ref())
    else {
        return ptr::null_mut();
    };
    let integrator = match integrator {
        0 => Integrator::FirstOrderEuler,
        1 => Integrator::VelocityVerlet,
        _ => return ptr::null_mut(),
    };
    if key_frame_period <= 0 || frame_time <= 0.0 {
        return ptr::null_mut();
    }
    Box::into_raw(Box::new(Timeline::new(
        frame.clone(),
        first_frame_no,
        *matrix,
        rule_set.clone(),
        frame_time,
        key_frame_period,
        integrator,
    )))
}

#[no_mangle]
pub unsafe extern "C" fn DestroyTimeline(timeline: *mut Timeline) {
    if !timeline.is_null() {
        drop(Box::from_raw(timeline));
    }
}

#[no_mangle]
pub unsafe extern "C" fn TimelineInputEvent(
    timeline: *mut Timeline,
    frame_no: i32,
    event: *const RawEvent,
) {
    let (Some(timeline), Some(event)) = (timeline.as_mut(), event.as_ref()) else {
        return;
    };
    let Some(event) = event.to_event() else {
        log::warn!("TimelineInputEvent: invalid event kind");
        return;
    };
    timeline.input_event(frame_no, event);
}

#[no_mangle]
pub unsafe extern "C" fn TimelineInputEventRange(
    timeline: *mut Timeline,
    first_frame_no: i32,
    last_frame_no: i32,
    event: *const RawEvent,
) {
    let (Some(timeline), Some(event)) = (timeline.as_mut(), event.as_ref()) else {
        return;
    };
    let Some(event) = event.to_event() else {
        log::warn!("TimelineInputEventRange: invalid event kind");
        return;
    };
    timeline.input_event_range(first_frame_no, last_frame_no, event);
}

/// Simulates under a wall-clock budget, up to `limit` frames of history.
/// Returns the number of frames simulated and writes the time actually spent
/// to `out_nanos`.
#[no_mangle]
pub unsafe extern "C" fn TimelineSimulate(
    timeline: *mut Timeline,
    time_budget: f32,
    limit: i32,
    out_nanos: *mut u64,
) -> i32 {
    let Some(timeline) = timeline.as_mut() else {
        return 0;
    };
    let (frames, spent) = timeline.simulate_budget(time_budget, limit);
    if let Some(out) = out_nanos.as_mut() {
        *out = duration_nanos(spent);
    }
    frames
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[no_mangle]
pub unsafe extern "C" fn TimelineGetHead(timeline: *mut Timeline) -> i32 {
    timeline.as_ref().map_or(0, Timeline::head)
}

#[no_mangle]
pub unsafe extern "C" fn TimelineGetTail(timeline: *mut Timeline) -> i32 {
    timeline.as_ref().map_or(0, Timeline::tail)
}

#[no_mangle]
pub unsafe extern "C" fn TimelineGetFrame(timeline: *mut Timeline, frame_no: i32) -> *const Frame {
    let Some(timeline) = timeline.as_mut() else {
        return ptr::null();
    };
    match timeline.get_frame(frame_no) {
        Some(frame) => frame as *const Frame,
        None => ptr::null(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn TimelineGetEvents(
    timeline: *mut Timeline,
    frame_no: i32,
    buffer: *mut EventBuffer,
) {
    let (Some(timeline), Some(buffer)) = (timeline.as_ref(), buffer.as_mut()) else {
        return;
    };
    let mut events = Vec::new();
    if timeline.get_events(frame_no, &mut events) {
        buffer.events.extend(events.into_iter().map(RawEvent::from));
    }
}

#[no_mangle]
pub unsafe extern "C" fn TimelineGetEventRange(
    timeline: *mut Timeline,
    first_frame_no: i32,
    last_frame_no: i32,
    buffer: *mut EventBuffer,
) {
    let (Some(timeline), Some(buffer)) = (timeline.as_ref(), buffer.as_mut()) else {
        return;
    };
    let mut events = Vec::new();
    if timeline.get_events_range(first_frame_no, last_frame_no, &mut events) {
        buffer.events.extend(events.into_iter().map(RawEvent::from));
    }
}

#[no_mangle]
pub unsafe extern "C" fn TimelineSetLabel(timeline: *mut Timeline, id: i32, label: i32) {
    if let Some(timeline) = timeline.as_mut() {
        timeline.set_label(Entity::new(id), label);
    }
}

// TIMELINE QUERY API //

#[repr(C)]
pub struct RawTrajectory {
    pub id: i32,
    pub first_frame_offset: i32,
    /// Bit 0 position, bit 1 velocity.
    pub attributes: u32,
    pub buffer_sz: usize,
    pub buffer: *mut Vec3,
}

#[repr(C)]
pub struct TimelineQuery {
    pub resolution: i32,
    pub trajectory_buffer_sz: usize,
    pub trajectory_buffer: *mut RawTrajectory,
}

#[no_mangle]
pub unsafe extern "C" fn TimelineRunQuery(timeline: *mut Timeline, query: *mut TimelineQuery) -> bool {
    let (Some(timeline), Some(query)) = (timeline.as_mut(), query.as_ref()) else {
        return false;
    };
    let raw_trajectories: &mut [RawTrajectory] = if query.trajectory_buffer.is_null() {
        &mut []
    } else {
        slice::from_raw_parts_mut(query.trajectory_buffer, query.trajectory_buffer_sz)
    };

    let mut trajectories = Vec::with_capacity(raw_trajectories.len());
    for raw in raw_trajectories.iter_mut() {
        let buffer: &mut [Vec3] = if raw.buffer.is_null() {
            &mut []
        } else {
            slice::from_raw_parts_mut(raw.buffer, raw.buffer_sz)
        };
        trajectories.push(Trajectory {
            id: Entity::new(raw.id),
            first_frame_offset: raw.first_frame_offset,
            attributes: TrajectoryAttributes::from_bits_truncate(raw.attributes),
            buffer,
        });
    }

    timeline.query(query.resolution, &mut trajectories).is_ok()
}

//! Object pools: reusable entities cloned from a prototype and recycled
//! through a free list.
//!
//! A pool is owned by a pool entity carrying a `ReusePool`; members carry a
//! `ReuseTag` whose `next_id` threads the singly-linked free list. Spawning
//! claims the head of the list and emits a `Spawn` event; destroying a
//! reusable entity pushes it back. `free_count + in_use_count` is invariant
//! and equal to the pool's initial capacity.

use crate::{
    events::{Event, Payload, Spawn},
    geometry::{Quaternion, Vec3},
    scene::{
        copy_component, find_component_index, find_component_mut, set_component, Entity, Flags,
        Frame, Motion, ReusePool, ReuseTag,
    },
    Error, Result,
};

/// Builds a pool of `capacity` entities cloned from the prototype, all
/// starting out destroyed and chained on the free list. Returns the index of
/// the pool's `ReusePool` component.
pub fn initialize_pool(
    pool_id: Entity,
    prototype_id: Entity,
    capacity: i32,
    frame: &mut Frame,
) -> Result<usize> {
    if pool_id == prototype_id {
        return Err(Error::InvalidArgument("pool entity cannot be its own prototype"));
    }
    if capacity <= 0 {
        return Err(Error::InvalidArgument("pool capacity must be positive"));
    }

    let pool_idx = set_component(
        &mut frame.reuse_pools,
        ReusePool {
            id: pool_id,
            first_id: Entity::NIL,
            in_use_count: capacity,
            free_count: 0,
        },
    );
    set_component(
        &mut frame.reuse_tags,
        ReuseTag {
            id: prototype_id,
            pool_id,
            next_id: Entity::NIL,
        },
    );
    frame.flags[prototype_id.index()] |= Flags::REUSABLE | Flags::DESTROYED;

    for _ in 0..capacity - 1 {
        let id = frame.push_default();
        copy_object(id, prototype_id, frame);
        release_object(id, &frame.flags, &mut frame.reuse_pools, &mut frame.reuse_tags);
    }
    release_object(
        prototype_id,
        &frame.flags,
        &mut frame.reuse_pools,
        &mut frame.reuse_tags,
    );

    debug_assert_eq!(frame.reuse_pools[pool_idx].free_count, capacity);
    Ok(pool_idx)
}

/// Returns a reusable entity to its pool's free list. Entities without the
/// reusable flag are left alone.
pub fn release_object(
    id: Entity,
    flags: &[Flags],
    reuse_pools: &mut [ReusePool],
    reuse_tags: &mut [ReuseTag],
) {
    if !flags[id.index()].contains(Flags::REUSABLE) {
        return;
    }
    let Some(tag_idx) = find_component_index(reuse_tags, id) else {
        debug_assert!(false, "reusable entity {} has no reuse tag", id.value());
        return;
    };
    let Some(pool_idx) = find_component_index(reuse_pools, reuse_tags[tag_idx].pool_id) else {
        debug_assert!(false, "reuse tag of {} points at no pool", id.value());
        return;
    };

    debug_assert!(reuse_tags[tag_idx].next_id.is_nil());
    reuse_tags[tag_idx].next_id = reuse_pools[pool_idx].first_id;
    reuse_pools[pool_idx].first_id = reuse_tags[tag_idx].id;
    reuse_pools[pool_idx].free_count += 1;
    reuse_pools[pool_idx].in_use_count -= 1;
}

/// Claims an entity from the pool and returns the `Spawn` event that brings
/// it to life. Fails without mutating anything when the pool entity has no
/// pool component or the free list is empty.
pub fn spawn_event_from_pool(
    pool_id: Entity,
    position: Vec3,
    rotation: Quaternion,
    velocity: Vec3,
    frame: &mut Frame,
) -> Result<Event> {
    let Some(pool_idx) = find_component_index(&frame.reuse_pools, pool_id) else {
        return Err(Error::InvalidArgument("entity has no pool component"));
    };

    let id = claim_from_pool(pool_idx, &mut frame.reuse_pools, &mut frame.reuse_tags);
    if id.is_nil() {
        return Err(Error::ResourceExhausted("no free objects available in the pool"));
    }

    Ok(Event::new(
        id,
        position,
        Spawn {
            pool_id,
            rotation,
            velocity,
        },
    ))
}

/// Converts every `SpawnAttempt` event into a `Spawn` event, appended to
/// `out_events`. Attempts that fail (no pool, pool exhausted) produce no
/// event.
pub fn convert_spawn_attempts(in_events: &[Event], out_events: &mut Vec<Event>, frame: &mut Frame) {
    for event in in_events {
        let Payload::SpawnAttempt(attempt) = event.payload else {
            continue;
        };
        match spawn_event_from_pool(
            event.id,
            event.position,
            attempt.rotation,
            attempt.velocity,
            frame,
        ) {
            Ok(spawn_event) => out_events.push(spawn_event),
            Err(err) => {
                log::debug!("spawn attempt on pool {} failed: {err}", event.id.value());
            }
        }
    }
}

/// Effect of a `Spawn` event: revive the entity at the event position with
/// the recorded rotation and velocity, durability restored.
pub fn spawn_object(id: Entity, position: Vec3, spawn: &Spawn, frame: &mut Frame) {
    let idx = id.index();
    frame.flags[idx] &= !Flags::DESTROYED;
    frame.transforms[idx].position = position;
    frame.transforms[idx].rotation = spawn.rotation;
    frame.motion[idx] = Motion::from_position_and_velocity(position, spawn.velocity);

    if let Some(durability) = find_component_mut(&mut frame.durability, id) {
        durability.value = durability.max;
    }
}

fn claim_from_pool(
    pool_idx: usize,
    reuse_pools: &mut [ReusePool],
    reuse_tags: &mut [ReuseTag],
) -> Entity {
    let id = reuse_pools[pool_idx].first_id;
    if id.is_nil() {
        return Entity::NIL;
    }
    let Some(tag) = find_component_mut(reuse_tags, id) else {
        debug_assert!(false, "pooled entity {} has no reuse tag", id.value());
        return Entity::NIL;
    };
    reuse_pools[pool_idx].first_id = tag.next_id;
    tag.next_id = Entity::NIL;
    reuse_pools[pool_idx].free_count -= 1;
    reuse_pools[pool_idx].in_use_count += 1;
    debug_assert!(
        reuse_pools[pool_idx].free_count == 0 || !reuse_pools[pool_idx].first_id.is_nil()
    );
    id
}

/// Copies every component except transform and motion from the prototype.
fn copy_object(dst: Entity, src: Entity, frame: &mut Frame) {
    frame.mass[dst.index()] = frame.mass[src.index()];
    frame.colliders[dst.index()] = frame.colliders[src.index()];
    frame.glue[dst.index()] = frame.glue[src.index()];
    frame.flags[dst.index()] = frame.flags[src.index()];

    copy_component(&mut frame.orbits, dst, src);
    copy_component(&mut frame.durability, dst, src);
    copy_component(&mut frame.rockets, dst, src);
    copy_component(&mut frame.triggers, dst, src);
    copy_component(&mut frame.reuse_tags, dst, src);
}

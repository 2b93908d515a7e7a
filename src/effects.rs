//! Applies event effects to the scene.
//!
//! This is the single place where events mutate component state, shared by
//! forward simulation and replay. Accelerations and collisions are no-ops
//! here: the former are consumed by motion integration, the latter expand
//! into the other event kinds through the rule engine.

use crate::{
    events::{Damage, Event, Payload, Stick, Teleportation},
    pool::{release_object, spawn_object},
    rocket::apply_rocket_refuel,
    scene::{find_component_mut, Entity, Flags, Frame},
};

pub fn apply_event_effects(events: &[Event], frame: &mut Frame) {
    for event in events {
        match &event.payload {
            Payload::Destruction(_) => handle_destroy(event.id, frame),
            Payload::Stick(stick) => handle_stick(event.id, stick, frame),
            Payload::Damage(damage) => handle_damage(event.id, damage, frame),
            Payload::Teleportation(teleportation) => {
                handle_teleportation(event.id, teleportation, frame)
            }
            Payload::Acceleration(_) => {
                // Already consumed by motion integration.
            }
            Payload::Collision(_) => {
                // Collision effects arrive as separate events from the rule
                // engine.
            }
            Payload::RocketBurn(_) => {
                // Converted to an acceleration before integration.
            }
            Payload::RocketRefuel(refuel) => {
                if let Err(err) =
                    apply_rocket_refuel(event.id, refuel, &mut frame.mass, &mut frame.rockets)
                {
                    log::warn!("skipping refuel on entity {}: {err}", event.id.value());
                }
            }
            Payload::Spawn(spawn) => spawn_object(event.id, event.position, spawn, frame),
            Payload::SpawnAttempt(_) => {
                // Converted to a Spawn (or dropped) before the step.
            }
        }
    }
}

fn handle_destroy(id: Entity, frame: &mut Frame) {
    frame.flags[id.index()] |= Flags::DESTROYED;
    if frame.flags[id.index()].contains(Flags::REUSABLE) {
        release_object(id, &frame.flags, &mut frame.reuse_pools, &mut frame.reuse_tags);
    }
}

fn handle_stick(id: Entity, stick: &Stick, frame: &mut Frame) {
    if !stick.parent_id.is_nil() {
        frame.flags[id.index()] |= Flags::GLUED;
        frame.glue[id.index()].parent_id = stick.parent_id;
    } else {
        frame.flags[id.index()] &= !Flags::GLUED;
        frame.glue[id.index()].parent_id = Entity::new(0);
    }
}

fn handle_damage(id: Entity, damage: &Damage, frame: &mut Frame) {
    let Some(durability) = find_component_mut(&mut frame.durability, id) else {
        return;
    };
    durability.value -= damage.value;
    if durability.value <= 0 {
        handle_destroy(id, frame);
    }
}

fn handle_teleportation(id: Entity, teleportation: &Teleportation, frame: &mut Frame) {
    let idx = id.index();
    frame.transforms[idx].position = teleportation.new_position;
    frame.motion[idx].new_position = teleportation.new_position;
    frame.motion[idx].velocity = teleportation.new_velocity;
    frame.motion[idx].spin = teleportation.new_spin;
}

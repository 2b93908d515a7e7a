//! Motion integration: acceleration inputs, gravity, velocity and the
//! two-phase position update.

use crate::{
    events::{AccelerationFlags, Event, Payload},
    geometry::{Quaternion, Vec3},
    scene::{Entity, Flags, Mass, Motion, Transform},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrator {
    FirstOrderEuler,
    VelocityVerlet,
}

/// Updates `Motion` for every entity that moves freely; entities that are
/// destroyed, glued or on rails are skipped. Does not touch `Transform`
/// ([`update_positions`] commits the result after collision detection).
///
/// `input` must be sorted in ascending order of entity id.
pub fn integrate_motion(
    integrator: Integrator,
    dt: f32,
    input: &[Event],
    transforms: &[Transform],
    mass: &[Mass],
    flags: &[Flags],
    motion: &mut [Motion],
) {
    match integrator {
        Integrator::FirstOrderEuler => {
            integrate_first_order_euler(dt, input, transforms, mass, flags, motion)
        }
        Integrator::VelocityVerlet => {
            integrate_velocity_verlet(dt, input, transforms, mass, flags, motion)
        }
    }
}

pub fn integrate_first_order_euler(
    dt: f32,
    input: &[Event],
    transforms: &[Transform],
    mass: &[Mass],
    flags: &[Flags],
    motion: &mut [Motion],
) {
    let mut cursor = 0;
    for i in 0..transforms.len() {
        if skip_integration(flags[i]) {
            continue;
        }
        let forces = compute_forces(transforms, mass, flags, Entity::new(i as i32), input, &mut cursor);
        motion[i].acceleration = forces.linear;
        motion[i].velocity += forces.impulse + motion[i].acceleration * dt;
        motion[i].new_position = transforms[i].position + motion[i].velocity * dt;
        if forces.angular != Quaternion::IDENTITY {
            motion[i].spin *= Quaternion::interpolate(Quaternion::IDENTITY, forces.angular, dt);
        }
    }
}

pub fn integrate_velocity_verlet(
    dt: f32,
    input: &[Event],
    transforms: &[Transform],
    mass: &[Mass],
    flags: &[Flags],
    motion: &mut [Motion],
) {
    let half_dt = dt * 0.5;
    let mut cursor = 0;
    for i in 0..transforms.len() {
        if skip_integration(flags[i]) {
            continue;
        }
        motion[i].new_position = transforms[i].position
            + motion[i].velocity * dt
            + motion[i].acceleration * (dt * half_dt);

        let forces = compute_forces(transforms, mass, flags, Entity::new(i as i32), input, &mut cursor);
        motion[i].velocity += (forces.linear + motion[i].acceleration) * half_dt + forces.impulse;
        motion[i].acceleration = forces.linear;
        if forces.angular != Quaternion::IDENTITY {
            motion[i].spin *= Quaternion::interpolate(Quaternion::IDENTITY, forces.angular, dt);
        }
    }
}

/// Commits `new_position` (and spin) for every entity that still exists.
pub fn update_positions(dt: f32, motion: &[Motion], flags: &[Flags], transforms: &mut [Transform]) {
    for i in 0..transforms.len() {
        if flags[i].contains(Flags::DESTROYED) {
            continue;
        }
        transforms[i].position = motion[i].new_position;
        if motion[i].spin != Quaternion::IDENTITY {
            transforms[i].rotation *=
                Quaternion::interpolate(Quaternion::IDENTITY, motion[i].spin, dt);
        }
    }
}

/// Gravitational acceleration acting on `id` from every eligible attractor.
pub fn gravity_force_on(
    transforms: &[Transform],
    mass: &[Mass],
    flags: &[Flags],
    id: Entity,
) -> Vec3 {
    gravity_at(transforms, mass, flags, id, None)
}

/// Like [`gravity_force_on`], additionally reporting each attractor's
/// contribution. Useful for hosts that draw force vectors.
pub fn gravity_force_on_with_contributions(
    transforms: &[Transform],
    mass: &[Mass],
    flags: &[Flags],
    id: Entity,
    contributions: &mut Vec<(Entity, Vec3)>,
) -> Vec3 {
    gravity_at(transforms, mass, flags, id, Some(contributions))
}

fn skip_integration(flags: Flags) -> bool {
    flags.intersects(Flags::DESTROYED | Flags::GLUED | Flags::ORBITING)
}

struct Forces {
    linear: Vec3,
    impulse: Vec3,
    angular: Quaternion,
}

/// Folds the acceleration events targeting `id` together with gravity.
/// `cursor` walks the sorted input span once across all entities.
fn compute_forces(
    transforms: &[Transform],
    mass: &[Mass],
    flags: &[Flags],
    id: Entity,
    input: &[Event],
    cursor: &mut usize,
) -> Forces {
    while *cursor < input.len() && input[*cursor].id < id {
        *cursor += 1;
    }

    let mut forces = Forces {
        linear: Vec3::ZERO,
        impulse: Vec3::ZERO,
        angular: Quaternion::IDENTITY,
    };
    while *cursor < input.len() && input[*cursor].id == id {
        if let Payload::Acceleration(acceleration) = input[*cursor].payload {
            let mut value = acceleration.linear;
            if acceleration.flags.contains(AccelerationFlags::FORCE)
                && mass[id.index()].inertial > 0.0
            {
                value = value / mass[id.index()].inertial;
            }
            if acceleration.flags.contains(AccelerationFlags::IMPULSE) {
                forces.impulse += value;
            } else {
                forces.linear += value;
                forces.angular *= acceleration.angular;
            }
        }
        *cursor += 1;
    }

    forces.linear += gravity_at(transforms, mass, flags, id, None);
    forces
}

fn gravity_at(
    transforms: &[Transform],
    mass: &[Mass],
    flags: &[Flags],
    id: Entity,
    mut contributions: Option<&mut Vec<(Entity, Vec3)>>,
) -> Vec3 {
    let mut result = Vec3::ZERO;
    for i in 0..transforms.len() {
        let candidate = Entity::new(i as i32);
        if candidate == id {
            continue;
        }
        if mass[i].active == 0.0 {
            continue;
        }
        if flags[i].intersects(Flags::DESTROYED | Flags::GLUED) {
            continue;
        }
        let f = gravity_contribution(transforms, mass, candidate, transforms[id.index()].position);
        result += f;
        if let Some(contributions) = contributions.as_deref_mut() {
            if f != Vec3::ZERO {
                contributions.push((candidate, f));
            }
        }
    }
    result
}

fn gravity_contribution(
    transforms: &[Transform],
    mass: &[Mass],
    attractor: Entity,
    other_position: Vec3,
) -> Vec3 {
    // The force between two point masses is F = G x ((m_1 x m_2) / r^2), and
    // the acceleration of a point mass under a force is a = F / m. With the
    // convention G = 1 the acceleration due to attractor 1 reduces to
    // a = m_1 / r^2.
    let attractor_idx = attractor.index();
    let d = transforms[attractor_idx].position - other_position;
    let r_square = d.magnitude_squared();
    let cutoff = mass[attractor_idx].cutoff_distance;
    if cutoff != 0.0 && r_square > cutoff * cutoff {
        return Vec3::ZERO;
    }
    d.normalized() * (mass[attractor_idx].active / r_square)
}

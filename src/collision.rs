//! Continuous collision detection over sphere colliders.
//!
//! Broad phase: every entity gets a swept AABB covering its collider at both
//! the committed and the post-integration position; a BVH over those boxes
//! yields candidate pairs. Narrow phase: the earliest contact time within the
//! step is recovered from three samples of the distance function, which for
//! linear motion is either constant, linear, or V-shaped.

use crate::{
    bvh::{Bvh, Kv},
    events::{Collision, Event},
    geometry::{float_eq, Aabb, LayerMatrix, Vec3},
    scene::{Collider, Entity, Flags, Glue, Motion, Transform},
};

#[derive(Debug, Clone)]
pub struct CollisionDetector {
    matrix: LayerMatrix,
    // Rebuilt every step; kept to reuse the allocations.
    bvh: Bvh<Entity>,
    bvh_kvs: Vec<Kv<Entity>>,
    swept_bounds: Vec<Aabb>,
    hits: Vec<Kv<Entity>>,
}

impl CollisionDetector {
    pub fn new(matrix: LayerMatrix) -> Self {
        Self {
            matrix,
            bvh: Bvh::new(),
            bvh_kvs: Vec::new(),
            swept_bounds: Vec::new(),
            hits: Vec::new(),
        }
    }

    pub fn matrix(&self) -> &LayerMatrix {
        &self.matrix
    }

    /// Appends a collision event for every eligible pair that comes into
    /// contact within `dt` seconds.
    pub fn detect_collisions(
        &mut self,
        dt: f32,
        transforms: &[Transform],
        colliders: &[Collider],
        motion: &[Motion],
        flags: &[Flags],
        glue: &[Glue],
        out_events: &mut Vec<Event>,
    ) {
        self.bvh_kvs.clear();
        self.swept_bounds.clear();
        for i in 0..colliders.len() {
            let radius = Vec3::splat(colliders[i].radius);
            let mut bounds = Aabb::from_center_and_half_extents(
                transforms[i].position + colliders[i].center,
                radius,
            );
            bounds.encapsulate(&Aabb::from_center_and_half_extents(
                motion[i].new_position,
                radius,
            ));
            self.bvh_kvs.push(Kv::new(bounds, Entity::new(i as i32)));
            self.swept_bounds.push(bounds);
        }
        self.bvh.rebuild(&mut self.bvh_kvs);

        for i in 0..colliders.len() {
            let a = Entity::new(i as i32);
            self.hits.clear();
            self.bvh.overlap(&self.swept_bounds[i], &mut self.hits);
            for hit in &self.hits {
                let b = hit.value;
                if !eligible(colliders, flags, glue, &self.matrix, a, b) {
                    continue;
                }
                let t = collision_time(transforms, colliders, motion, a, b, dt);
                if t <= dt {
                    out_events.push(Event::collision(
                        collision_location(transforms, colliders, motion, t, a, b),
                        Collision {
                            first_id: a,
                            second_id: b,
                            first_frame_offset_seconds: t,
                        },
                    ));
                }
            }
        }
    }
}

fn eligible(
    colliders: &[Collider],
    flags: &[Flags],
    glue: &[Glue],
    matrix: &LayerMatrix,
    a: Entity,
    b: Entity,
) -> bool {
    // Checked in the other direction, or a self-overlap.
    if b <= a {
        return false;
    }

    let (ai, bi) = (a.index(), b.index());
    if flags[ai].contains(Flags::DESTROYED) || flags[bi].contains(Flags::DESTROYED) {
        return false;
    }
    if !matrix.check(colliders[ai].layer, colliders[bi].layer) {
        return false;
    }
    // Entities glued to each other don't collide.
    if (flags[ai].contains(Flags::GLUED) && glue[ai].parent_id == b)
        || (flags[bi].contains(Flags::GLUED) && glue[bi].parent_id == a)
    {
        return false;
    }

    true
}

fn distance_to_collision(
    transforms: &[Transform],
    colliders: &[Collider],
    motion: &[Motion],
    a: Entity,
    b: Entity,
    t: f32,
) -> f32 {
    let (ai, bi) = (a.index(), b.index());
    let a_pos = transforms[ai].position + motion[ai].velocity * t + colliders[ai].center;
    let b_pos = transforms[bi].position + motion[bi].velocity * t + colliders[bi].center;
    (a_pos - b_pos).magnitude() - colliders[ai].radius - colliders[bi].radius
}

/// Returns the earliest time in `[0, dt]` at which `a` and `b` come into
/// contact given their current velocities, or infinity when they don't.
///
/// The distance-to-collision function
///
///   dc(t) = |(posA + vA*t) - (posB + vB*t)| - rA - rB
///
/// has a closed-form root, but it is unwieldy. Over one step the function can
/// only be constant (parallel trajectories), linear, or a V shape (approach
/// then recede), so three samples at 0, dt/2 and dt pin down which case
/// applies and where the root lies.
fn collision_time(
    transforms: &[Transform],
    colliders: &[Collider],
    motion: &[Motion],
    a: Entity,
    b: Entity,
    dt: f32,
) -> f32 {
    let d0 = distance_to_collision(transforms, colliders, motion, a, b, 0.0);
    // Already in contact.
    if d0 <= 0.0 {
        return 0.0;
    }

    let d1 = distance_to_collision(transforms, colliders, motion, a, b, dt / 2.0);
    let d2 = distance_to_collision(transforms, colliders, motion, a, b, dt);

    if float_eq(d0, d1) && float_eq(d0, d2) {
        // Parallel trajectories at a fixed positive distance.
        return f32::INFINITY;
    }

    if d0 < d1 && float_eq(d0 - d1, d1 - d2) {
        // Linear and receding: d0 was the closest approach.
        return f32::INFINITY;
    }

    if d0 > d1 && float_eq(d0 - d1, d1 - d2) {
        // Linear and approaching.
        if d2 > 0.0 {
            // Contact lies beyond this step.
            return f32::INFINITY;
        }
        let slope = (d0 - d2) / dt;
        // Root of d0 - slope * t; slope is nonzero here.
        return d0 / slope;
    }

    // V-shaped: approach then recede, with symmetrical slopes. Compute the
    // slope from the descending side and test the hypothetical intercept.
    let slope = if d0 > d2 {
        (d1 - d0) / (dt / 2.0)
    } else {
        (d1 - d2) / (dt / 2.0)
    };
    let t = -d0 / slope;
    // Float rounding keeps the sampled value near, but rarely exactly at,
    // zero; nudging the sample point forward lands it on the negative side
    // iff contact actually happens.
    if distance_to_collision(transforms, colliders, motion, a, b, t + f32::EPSILON) < 0.0 {
        return t;
    }

    f32::INFINITY
}

/// Contact point between two spheres, weighted so it sits on the smaller
/// sphere's surface.
fn collision_location(
    transforms: &[Transform],
    colliders: &[Collider],
    motion: &[Motion],
    t: f32,
    a: Entity,
    b: Entity,
) -> Vec3 {
    let (ai, bi) = (a.index(), b.index());
    let a_pos = transforms[ai].position + motion[ai].velocity * t + colliders[ai].center;
    let b_pos = transforms[bi].position + motion[bi].velocity * t + colliders[bi].center;
    (colliders[bi].radius * a_pos + colliders[ai].radius * b_pos)
        / (colliders[ai].radius + colliders[bi].radius)
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use crate::{
        events::Payload,
        scene::{Frame, Mass},
    };

    use super::*;

    fn push_sphere(frame: &mut Frame, position: Vec3, velocity: Vec3, layer: u32) -> Entity {
        frame.push(
            Transform {
                position,
                rotation: Default::default(),
            },
            Mass::default(),
            Motion::from_position_and_velocity(position, velocity),
            Collider {
                layer,
                radius: 0.5,
                center: Vec3::ZERO,
            },
            Glue {
                parent_id: Entity::NIL,
            },
            Flags::default(),
        )
    }

    fn detect(frame: &Frame, dt: f32, pairs: &[(u32, u32)]) -> Vec<Event> {
        let mut detector = CollisionDetector::new(LayerMatrix::new(pairs).unwrap());
        let mut events = Vec::new();
        detector.detect_collisions(
            dt,
            &frame.transforms,
            &frame.colliders,
            &frame.motion,
            &frame.flags,
            &frame.glue,
            &mut events,
        );
        events
    }

    fn collision_of(event: &Event) -> Collision {
        match event.payload {
            Payload::Collision(c) => c,
            ref other => panic!("expected collision, got {other:?}"),
        }
    }

    #[test]
    fn head_on_approach_collides_late_in_the_frame() {
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), 1);
        push_sphere(&mut frame, Vec3::new(10.0, 0.0, 0.0), Vec3::ZERO, 1);

        let events = detect(&frame, 1.0, &[(1, 1)]);
        assert_eq!(events.len(), 1);
        let collision = collision_of(&events[0]);
        assert_eq!(collision.first_id, Entity::new(0));
        assert_eq!(collision.second_id, Entity::new(1));
        assert_approx_eq!(collision.first_frame_offset_seconds, 0.9, 0.005);
    }

    #[test]
    fn fast_mover_is_not_missed() {
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::ZERO, Vec3::new(1_000_000.0, 0.0, 0.0), 1);
        push_sphere(&mut frame, Vec3::new(10.0, 0.0, 0.0), Vec3::ZERO, 1);

        let events = detect(&frame, 1.0 / 60.0, &[(1, 1)]);
        assert_eq!(events.len(), 1);
        let collision = collision_of(&events[0]);
        assert_approx_eq!(collision.first_frame_offset_seconds, 0.0, 0.005);
    }

    #[test]
    fn orthogonal_movers_collide_at_the_predicted_time() {
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::new(-10.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0), 1);
        push_sphere(&mut frame, Vec3::new(0.0, -10.0, 0.0), Vec3::new(0.0, 10.0, 0.0), 1);

        let events = detect(&frame, 1.0, &[(1, 1)]);
        assert_eq!(events.len(), 1);
        // At contact, the segment joining the centers is the hypotenuse of an
        // isosceles right triangle with the corner at the origin, so each
        // center sits 1/sqrt(2) of the combined radius from it.
        let expect = 1.0 - (1.0 / 2.0_f32.sqrt()) / 10.0;
        let collision = collision_of(&events[0]);
        assert_approx_eq!(collision.first_frame_offset_seconds, expect, 0.005);
    }

    #[test]
    fn overlapping_spheres_collide_at_time_zero() {
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::ZERO, Vec3::ZERO, 1);
        push_sphere(&mut frame, Vec3::new(0.5, 0.0, 0.0), Vec3::ZERO, 1);

        let events = detect(&frame, 1.0, &[(1, 1)]);
        assert_eq!(events.len(), 1);
        assert_eq!(collision_of(&events[0]).first_frame_offset_seconds, 0.0);
    }

    #[test]
    fn touching_spheres_exactly_at_radius_sum_collide() {
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::ZERO, Vec3::ZERO, 1);
        push_sphere(&mut frame, Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, 1);

        let events = detect(&frame, 1.0, &[(1, 1)]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn receding_spheres_do_not_collide() {
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::ZERO, Vec3::new(-5.0, 0.0, 0.0), 1);
        push_sphere(&mut frame, Vec3::new(10.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0), 1);

        assert!(detect(&frame, 1.0, &[(1, 1)]).is_empty());
    }

    #[test]
    fn destroyed_entities_do_not_collide() {
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::new(-10.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0), 1);
        push_sphere(&mut frame, Vec3::new(0.0, -10.0, 0.0), Vec3::new(0.0, 10.0, 0.0), 1);
        frame.flags[0] = Flags::DESTROYED;

        assert!(detect(&frame, 1.0, &[(1, 1)]).is_empty());
    }

    #[test]
    fn layer_matrix_filters_pairs() {
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::new(-10.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0), 1);
        push_sphere(&mut frame, Vec3::new(0.0, -10.0, 0.0), Vec3::new(0.0, 10.0, 0.0), 1);

        assert!(detect(&frame, 1.0, &[(1, 2)]).is_empty());
    }

    #[test]
    fn glued_pair_does_not_collide() {
        let mut frame = Frame::default();
        let parent = push_sphere(&mut frame, Vec3::ZERO, Vec3::ZERO, 1);
        let child = push_sphere(&mut frame, Vec3::new(0.25, 0.0, 0.0), Vec3::ZERO, 1);
        frame.flags[child.index()] = Flags::GLUED;
        frame.glue[child.index()].parent_id = parent;

        assert!(detect(&frame, 1.0, &[(1, 1)]).is_empty());
    }
}

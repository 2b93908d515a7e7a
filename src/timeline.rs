//! The timeline: simulated history, externally-supplied inputs, and rewind.
//!
//! The timeline owns the head scene, a key-frame snapshot every
//! `key_frame_period` frames, and an interval tree of every event keyed by
//! the frame range it spans. Simulating forward records all produced events;
//! injecting an input into a past frame truncates the history after it, and
//! any frame can then be re-derived on demand by replaying recorded events
//! from the nearest key-frame. Because a step is a pure function of the scene
//! and its events, replayed frames match the original forward run.

use std::time::{Duration, Instant};

use ahash::AHashMap;
use bitflags::bitflags;

use crate::{
    events::Event,
    geometry::{LayerMatrix, Vec3},
    interval_tree::{Interval, IntervalTree},
    motion::Integrator,
    pipeline::Pipeline,
    pool::convert_spawn_attempts,
    rules::RuleSet,
    scene::{Entity, Frame},
    Error, Result,
};

/// Opaque per-entity metadata slot; the timeline only stores it.
pub type Label = i32;

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct TrajectoryAttributes: u32 {
        const POSITION = 1;
        const VELOCITY = 1 << 1;
    }
}

/// One sampled track of a [`Timeline::query`] call. Samples land in `buffer`
/// in frame order; when both attributes are requested each sample occupies
/// two consecutive slots, position first.
#[derive(Debug)]
pub struct Trajectory<'a> {
    pub id: Entity,
    /// Shifts the sampled frames forward of the tail; must be a multiple of
    /// the query resolution.
    pub first_frame_offset: i32,
    pub attributes: TrajectoryAttributes,
    pub buffer: &'a mut [Vec3],
}

pub struct Timeline {
    frame_time: f32,
    key_frame_period: i32,
    head: i32,
    tail: i32,
    // Frames below this had their events recorded by an earlier forward pass
    // that a rewind has since rolled the head back over. Advancing the head
    // through them re-derives state from the recorded events instead of
    // re-simulating.
    replay_limit: i32,
    key_frames: Vec<Frame>,
    head_frame: Frame,
    // Scratch scene used to answer random-access frame queries.
    scratch_frame: Frame,
    scratch_frame_no: Option<i32>,
    events: IntervalTree<Event>,
    pipeline: Pipeline,
    simulate_buffer: Vec<Event>,
    replay_buffer: Vec<Event>,
    labels: AHashMap<Entity, Label>,
}

impl Timeline {
    pub fn new(
        frame: Frame,
        first_frame_no: i32,
        collision_matrix: LayerMatrix,
        rule_set: RuleSet,
        frame_time: f32,
        key_frame_period: i32,
        integrator: Integrator,
    ) -> Self {
        assert!(key_frame_period > 0);
        Self {
            frame_time,
            key_frame_period,
            head: first_frame_no,
            tail: first_frame_no,
            replay_limit: first_frame_no,
            key_frames: vec![frame.clone()],
            head_frame: frame.clone(),
            scratch_frame: frame,
            scratch_frame_no: Some(first_frame_no),
            events: IntervalTree::new(),
            pipeline: Pipeline::new(collision_matrix, rule_set, integrator),
            simulate_buffer: Vec::new(),
            replay_buffer: Vec::new(),
            labels: AHashMap::new(),
        }
    }

    /// Latest simulated frame.
    pub fn head(&self) -> i32 {
        self.head
    }

    /// First stored frame; fixed at construction.
    pub fn tail(&self) -> i32 {
        self.tail
    }

    pub fn frame_time(&self) -> f32 {
        self.frame_time
    }

    /// Advances the head frame by one step, recording every produced event.
    pub fn simulate(&mut self) {
        self.head += 1;
        self.replay_buffer.clear();
        self.simulate_buffer.clear();

        // Gather everything overlapping the new head. On a first pass these
        // are all caller inputs (outputs of earlier frames never reach past
        // the previous head); after a rewind they also carry the recorded
        // outputs that re-derivation feeds on.
        {
            let events = &self.events;
            let buffer = &mut self.replay_buffer;
            for kv in events.overlap_iter(Interval::point(self.head)) {
                buffer.push(kv.1);
            }
        }

        // Spawn attempts convert ahead of the step so the spawned state is
        // part of this frame and the Spawn itself gets recorded for replay.
        // On the re-derivation path the produced Spawn events are already in
        // the tree; the conversion still runs so the pool's free list
        // advances exactly as it did in the original forward pass.
        convert_spawn_attempts(
            &self.replay_buffer,
            &mut self.simulate_buffer,
            &mut self.head_frame,
        );

        if self.head < self.replay_limit {
            // This frame's events survived the rewind intact: re-derive the
            // state from them. Collision detection and rule evaluation would
            // only reproduce what is already recorded.
            self.pipeline.replay(
                self.frame_time,
                self.head,
                &mut self.head_frame,
                &mut self.replay_buffer,
            );
        } else {
            self.pipeline.step(
                self.frame_time,
                self.head,
                &mut self.head_frame,
                &mut self.replay_buffer,
                &mut self.simulate_buffer,
            );
        }

        for event in &self.simulate_buffer {
            self.events.merge_insert(Interval::point(self.head), *event);
        }

        if (self.head - self.tail) % self.key_frame_period == 0 {
            let idx = ((self.head - self.tail) / self.key_frame_period) as usize;
            debug_assert!(idx <= self.key_frames.len());
            if idx < self.key_frames.len() {
                self.key_frames[idx] = self.head_frame.clone();
            } else {
                self.key_frames.push(self.head_frame.clone());
            }
        }
    }

    /// Runs `simulate` repeatedly until the projected cost of the next step
    /// would exceed the budget, or until the head reaches `frame_limit`.
    /// Returns the number of frames stepped and the wall time spent.
    ///
    /// The per-step cost estimate is conservative: 1.2x the first observed
    /// step.
    pub fn simulate_budget(&mut self, time_budget_seconds: f32, frame_limit: i32) -> (i32, Duration) {
        let max_frames = frame_limit - self.head;
        if max_frames <= 0 {
            return (0, Duration::ZERO);
        }

        let start = Instant::now();
        self.simulate();
        let mut frames = 1;
        let mut now = Instant::now();

        let cost = (now - start).mul_f64(1.2);
        let deadline = start + Duration::from_secs_f32(time_budget_seconds.max(0.0));

        while now + cost < deadline && frames < max_frames {
            self.simulate();
            now = Instant::now();
            frames += 1;
        }

        (frames, now - start)
    }

    /// Injects an event at `frame_no`, truncating any history after it.
    pub fn input_event(&mut self, frame_no: i32, event: Event) {
        self.input_event_range(frame_no, frame_no + 1, event);
    }

    /// Injects an event spanning the half-open frame range `[first, last)`.
    pub fn input_event_range(&mut self, first_frame_no: i32, last_frame_no: i32, event: Event) {
        self.truncate(first_frame_no);
        self.events
            .merge_insert(Interval::new(first_frame_no, last_frame_no), event);
    }

    /// Returns the scene at `frame_no`, or None outside `[tail, head]`.
    /// Frames that are neither the head nor a key-frame are re-derived by
    /// replaying from the nearest key-frame into the scratch scene.
    pub fn get_frame(&mut self, frame_no: i32) -> Option<&Frame> {
        if frame_no == self.head {
            return Some(&self.head_frame);
        }
        if frame_no < self.tail || frame_no > self.head {
            return None;
        }
        let offset = frame_no - self.tail;
        if offset % self.key_frame_period == 0 {
            return Some(&self.key_frames[(offset / self.key_frame_period) as usize]);
        }
        if self.scratch_frame_no != Some(frame_no) {
            self.replay(frame_no);
        }
        Some(&self.scratch_frame)
    }

    /// Copies every event overlapping `frame_no` into `buffer`. Returns false
    /// outside `[tail, head]`.
    pub fn get_events(&self, frame_no: i32, buffer: &mut Vec<Event>) -> bool {
        if frame_no < self.tail || frame_no > self.head {
            return false;
        }
        self.events
            .overlap_values(Interval::point(frame_no), buffer);
        true
    }

    /// Copies every event overlapping `[first, last)` into `buffer`.
    pub fn get_events_range(
        &self,
        first_frame_no: i32,
        last_frame_no: i32,
        buffer: &mut Vec<Event>,
    ) -> bool {
        debug_assert!(last_frame_no > first_frame_no);
        if first_frame_no < self.tail || last_frame_no > self.head {
            return false;
        }
        self.events
            .overlap_values(Interval::new(first_frame_no, last_frame_no), buffer);
        true
    }

    pub fn set_label(&mut self, id: Entity, label: Label) {
        self.labels.insert(id, label);
    }

    pub fn label(&self, id: Entity) -> Option<Label> {
        self.labels.get(&id).copied()
    }

    /// Samples entity attributes over the stored history. Each trajectory
    /// reads frames `tail + offset + k * resolution`; the offset must be a
    /// multiple of the resolution and every sampled frame must be available.
    pub fn query(&mut self, resolution: i32, trajectories: &mut [Trajectory]) -> Result<()> {
        if resolution <= 0 {
            return Err(Error::InvalidArgument("query resolution must be positive"));
        }
        for trajectory in trajectories.iter_mut() {
            let attribute_count = trajectory.attributes.bits().count_ones() as usize;
            if attribute_count == 0 || trajectory.buffer.is_empty() {
                continue;
            }
            // Sampling walks frames from the tail in resolution steps; an
            // offset that is not a multiple of the resolution can never land
            // on them.
            if trajectory.first_frame_offset % resolution != 0 {
                return Err(Error::InvalidArgument(
                    "trajectory offset is not aligned with the query resolution",
                ));
            }
            let samples = trajectory.buffer.len() / attribute_count;
            let mut write = 0;
            for k in 0..samples {
                let frame_no = self.tail + trajectory.first_frame_offset + k as i32 * resolution;
                let id = trajectory.id;
                let Some(frame) = self.get_frame(frame_no) else {
                    return Err(Error::InvalidArgument("sampled frame is not available"));
                };
                if id.index() >= frame.len() {
                    return Err(Error::InvalidArgument("no such entity"));
                }
                if trajectory.attributes.contains(TrajectoryAttributes::POSITION) {
                    trajectory.buffer[write] = frame.transforms[id.index()].position;
                    write += 1;
                }
                if trajectory.attributes.contains(TrajectoryAttributes::VELOCITY) {
                    trajectory.buffer[write] = frame.motion[id.index()].velocity;
                    write += 1;
                }
            }
        }
        Ok(())
    }

    /// Rolls the timeline back so that `new_head` is the next frame to be
    /// re-derived: every event interval at or after `new_head` is dropped
    /// (spanning intervals are clipped), and the head frame falls back to the
    /// key-frame at or before `new_head`.
    fn truncate(&mut self, new_head: i32) {
        if new_head >= self.head {
            return;
        }
        log::debug!("truncating timeline from head {} to {new_head}", self.head);

        let mut to_clip = Vec::new();
        let horizon = self.events.max_point().max(new_head) + 1;
        self.events
            .overlap(Interval::new(new_head, horizon), &mut to_clip);
        for kv in to_clip {
            self.events.delete(&kv);
            if kv.0.low < new_head {
                self.events.insert(Interval::new(kv.0.low, new_head), kv.1);
            }
        }

        let quot = (new_head.max(self.tail) - self.tail) / self.key_frame_period;
        self.key_frames.truncate(quot as usize + 1);
        self.head_frame = self.key_frames[quot as usize].clone();
        self.head = self.tail + quot * self.key_frame_period;
        // Frames between the restored key-frame and the truncation point kept
        // their recorded events and can be re-derived instead of
        // re-simulated.
        self.replay_limit = new_head;
        self.scratch_frame_no = None;
    }

    fn replay(&mut self, frame_no: i32) {
        let quot = (frame_no - self.tail) / self.key_frame_period;
        self.scratch_frame = self.key_frames[quot as usize].clone();
        let start = self.tail + quot * self.key_frame_period;

        let mut discard = Vec::new();
        for f in (start + 1)..=frame_no {
            self.replay_buffer.clear();
            {
                let events = &self.events;
                let buffer = &mut self.replay_buffer;
                for kv in events.overlap_iter(Interval::point(f)) {
                    buffer.push(kv.1);
                }
            }
            // Spawn conversion reproduces the forward run's pool bookkeeping;
            // the produced events duplicate the recorded ones.
            discard.clear();
            convert_spawn_attempts(&self.replay_buffer, &mut discard, &mut self.scratch_frame);
            self.pipeline.replay(
                self.frame_time,
                f,
                &mut self.scratch_frame,
                &mut self.replay_buffer,
            );
        }
        self.scratch_frame_no = Some(frame_no);
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use crate::{
        events::{Acceleration, Destruction, EventKind, Payload, SpawnAttempt},
        pool::initialize_pool,
        rules::{ApplyDamageParams, BounceParams, CollisionEffect, EffectKind},
        scene::{Collider, Durability, Flags, Glue, Mass, Motion, Orbit, Transform},
    };

    use super::*;

    fn push_sphere(frame: &mut Frame, position: Vec3, mass: Mass, radius: f32) -> Entity {
        frame.push(
            Transform {
                position,
                rotation: Default::default(),
            },
            mass,
            Motion::default(),
            Collider {
                layer: 1,
                radius,
                center: Vec3::ZERO,
            },
            Glue {
                parent_id: Entity::NIL,
            },
            Flags::default(),
        )
    }

    fn timeline_of(frame: Frame, dt: f32, rules: RuleSet, integrator: Integrator) -> Timeline {
        Timeline::new(
            frame,
            0,
            LayerMatrix::new(&[(1, 1)]).unwrap(),
            rules,
            dt,
            30,
            integrator,
        )
    }

    #[test]
    fn falling_sphere_history_survives_simulation_past_it() {
        let dt = 0.001;
        let duration = 111.0;

        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::new(0.0, 100.0, 0.0), Mass::default(), 1.0);
        push_sphere(
            &mut frame,
            Vec3::ZERO,
            Mass {
                inertial: 100.0,
                active: 100.0,
                cutoff_distance: 0.0,
            },
            1.0,
        );

        let mut timeline = timeline_of(frame, dt, RuleSet::new(), Integrator::VelocityVerlet);

        let mut frame_no = 0;
        let mut t = 0.0;
        while t < duration {
            timeline.simulate();
            frame_no += 1;
            t += dt;
        }

        let head_y = {
            let frame = timeline.get_frame(frame_no).expect("head frame");
            assert!(frame.transforms[0].position.y < 1.0);
            assert!(frame.transforms[0].position.y > 0.0);
            frame.transforms[0].position.y
        };

        // A collision must have been recorded by now.
        let mut buffer = Vec::new();
        assert!(timeline.get_events(frame_no, &mut buffer));
        let collision = buffer
            .iter()
            .find(|e| e.kind() == EventKind::Collision)
            .expect("a collision event");
        assert_eq!(collision.id, Entity::new(0));

        // Simulate well past the frame, then look back: the replayed frame
        // matches what the head looked like.
        for _ in 0..2000 {
            timeline.simulate();
        }
        let replayed = timeline.get_frame(frame_no).expect("replayed frame");
        assert_approx_eq!(replayed.transforms[0].position.y, head_y, 1e-3);
    }

    #[test]
    fn rewind_with_counter_acceleration_cancels_velocity() {
        let dt = 0.01;
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::new(0.0, 100.0, 0.0), Mass::default(), 1.0);
        push_sphere(&mut frame, Vec3::ZERO, Mass::default(), 1.0);

        let mut timeline = timeline_of(frame, dt, RuleSet::new(), Integrator::VelocityVerlet);

        // One-second, 10 m/s^2 burn towards sphere 1: after it ends, sphere 0
        // moves at 10 m/s.
        timeline.input_event_range(
            1,
            (1.0 / dt) as i32,
            Event::new(
                Entity::new(0),
                Vec3::ZERO,
                Acceleration {
                    linear: Vec3::new(0.0, -10.0, 0.0),
                    ..Default::default()
                },
            ),
        );

        let mut frame_no = 0;
        let mut t = 0.0;
        while t < 2.0 {
            timeline.simulate();
            frame_no += 1;
            t += dt;
        }
        {
            let frame = timeline.get_frame(frame_no).expect("head frame");
            assert_approx_eq!(frame.motion[0].velocity.y, -10.0, 0.2);
        }

        // Rewind to 0.5 s and burn the other way for the rest of the second:
        // the two half-second burns cancel.
        timeline.input_event_range(
            (0.5 / dt) as i32 + 1,
            (1.0 / dt) as i32,
            Event::new(
                Entity::new(0),
                Vec3::ZERO,
                Acceleration {
                    linear: Vec3::new(0.0, 10.0, 0.0),
                    ..Default::default()
                },
            ),
        );

        let frame_no = (2.0 / dt) as i32;
        while timeline.head() < frame_no {
            timeline.simulate();
        }
        let frame = timeline.get_frame(frame_no).expect("resimulated frame");
        assert_approx_eq!(frame.motion[0].velocity.y, 0.0, 0.2);
        assert_approx_eq!(frame.motion[0].velocity.x, 0.0, 1e-5);
    }

    #[test]
    fn destroying_the_attractor_ends_gravity_and_collisions() {
        let dt = 1.0 / 30.0;
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::new(0.0, 100.0, 0.0), Mass::default(), 1.0);
        push_sphere(
            &mut frame,
            Vec3::ZERO,
            Mass {
                inertial: 100.0,
                active: 100.0,
                cutoff_distance: 0.0,
            },
            1.0,
        );

        let mut timeline = timeline_of(frame, dt, RuleSet::new(), Integrator::VelocityVerlet);

        let destruction_frame = (30.0 / dt) as i32;
        timeline.input_event(
            destruction_frame,
            Event::new(Entity::new(1), Vec3::ZERO, Destruction { value: 1 }),
        );

        let mut frame_no = 0;
        let mut t = 0.0;
        while t < 40.0 {
            timeline.simulate();
            frame_no += 1;
            t += dt;
        }

        // On the destruction frame the attractor still pulls (events take
        // effect at the end of the frame).
        {
            let frame = timeline.get_frame(destruction_frame).expect("frame");
            assert!(frame.motion[0].acceleration.y < 0.0);
        }
        {
            let frame = timeline.get_frame(destruction_frame + 1).expect("frame");
            assert!(frame.flags[1].contains(Flags::DESTROYED));
            assert_eq!(frame.motion[0].acceleration, Vec3::ZERO);
        }

        // Sphere 0 keeps coasting through where the attractor used to be, and
        // no collision is ever recorded.
        let mut y = timeline
            .get_frame(frame_no)
            .expect("frame")
            .transforms[0]
            .position
            .y;
        let mut guard = 0;
        while y > 1.0 {
            timeline.simulate();
            frame_no += 1;
            y = timeline.get_frame(frame_no).expect("frame").transforms[0].position.y;
            guard += 1;
            assert!(guard < 40_000, "sphere never passed the attractor");
        }
        assert!(y > 0.0);
        assert!(y < 1.0);

        let mut buffer = Vec::new();
        assert!(timeline.get_events(frame_no, &mut buffer));
        assert!(buffer.iter().all(|e| e.kind() != EventKind::Collision));
    }

    #[test]
    fn pooled_asteroids_recycle_through_damage() {
        let dt = 1.0 / 30.0;
        let mut initial_frame = Frame::default();
        let asteroid_pool_id = initial_frame.push_default();
        let asteroid_prototype_id = push_sphere(
            &mut initial_frame,
            Vec3::ZERO,
            Mass {
                inertial: 10.0,
                ..Default::default()
            },
            0.5,
        );
        initial_frame.set_durability(Durability {
            id: asteroid_prototype_id,
            value: 2,
            max: 2,
        });
        initialize_pool(asteroid_pool_id, asteroid_prototype_id, 8, &mut initial_frame).unwrap();

        // Big attractor in the middle; asteroids bounce off its surface and
        // take damage doing so. The orbit component (with the orbiting flag)
        // pins it in place through collisions.
        let attractor_id = push_sphere(
            &mut initial_frame,
            Vec3::ZERO,
            Mass {
                inertial: 9999.0,
                active: 9999.0,
                cutoff_distance: 1000.0,
            },
            5.0,
        );
        initial_frame.flags[attractor_id.index()] |= Flags::ORBITING;
        initial_frame.set_orbit(Orbit {
            id: attractor_id,
            ..Default::default()
        });

        let mut rules = RuleSet::new();
        rules.add(
            (1, 1),
            CollisionEffect::unfiltered(EffectKind::ApplyDamage(ApplyDamageParams {
                constant: 1,
                from_impactor_energy: 0.0,
            })),
        );
        rules.add(
            (1, 1),
            CollisionEffect::unfiltered(EffectKind::Bounce(BounceParams { elasticity: 1.0 })),
        );

        let mut timeline = timeline_of(initial_frame, dt, rules, Integrator::FirstOrderEuler);

        let mut rng = fastrand::Rng::with_seed(11);
        let mut events = Vec::new();
        let mut collisions = 0;
        let mut spawned = 0;
        let mut hit_points: AHashMap<Entity, i32> = AHashMap::new();

        let mut frame_no = 1;
        while collisions < 100 {
            assert!(
                frame_no < (100.0 / dt) as i32,
                "only {collisions} collisions after 100 simulated seconds"
            );

            // Keep asking for more asteroids while any are missing. Equal
            // attempts in the same frame fuse in the event tree, so spawns
            // trickle in; the pool guarantees we never get more than 8.
            if hit_points.len() < 8 {
                timeline.input_event(
                    frame_no,
                    Event::new(
                        asteroid_pool_id,
                        Vec3::new(
                            rng.f32() * 20.0 - 10.0,
                            rng.f32() * 20.0 - 10.0,
                            rng.f32() * 20.0 - 10.0,
                        ),
                        SpawnAttempt::default(),
                    ),
                );
            }

            timeline.simulate();

            events.clear();
            assert!(timeline.get_events(frame_no, &mut events));

            for event in &events {
                if event.kind() == EventKind::Spawn {
                    hit_points.insert(event.id, 2);
                    spawned += 1;
                }
            }

            // Track outcomes instead of listening for destructions: every
            // asteroid disappears after its second collision.
            for event in &events {
                let Payload::Collision(collision) = event.payload else {
                    continue;
                };
                collisions += 1;
                for id in [collision.first_id, collision.second_id] {
                    if let Some(hp) = hit_points.get_mut(&id) {
                        *hp -= 1;
                        if *hp == 0 {
                            hit_points.remove(&id);
                        }
                    }
                }
            }

            // The pool never leaks: free + in-use stays at capacity, and the
            // live set never exceeds it.
            let head = timeline.head();
            let frame = timeline.get_frame(head).expect("head frame");
            let pool =
                crate::scene::find_component(&frame.reuse_pools, asteroid_pool_id).unwrap();
            assert_eq!(pool.free_count + pool.in_use_count, 8);
            assert!(hit_points.len() <= 8);

            frame_no += 1;
        }
        assert!(spawned > 8, "pool members were never recycled");
    }

    #[test]
    fn future_inputs_apply_when_the_head_arrives() {
        let dt = 0.1;
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::ZERO, Mass::default(), 1.0);

        let mut timeline = timeline_of(frame, dt, RuleSet::new(), Integrator::FirstOrderEuler);
        timeline.input_event(
            5,
            Event::new(
                Entity::new(0),
                Vec3::ZERO,
                Acceleration {
                    linear: Vec3::new(1.0, 0.0, 0.0),
                    ..Default::default()
                },
            ),
        );

        for _ in 0..4 {
            timeline.simulate();
        }
        assert_eq!(
            timeline.get_frame(4).unwrap().motion[0].velocity,
            Vec3::ZERO
        );

        timeline.simulate();
        let velocity = timeline.get_frame(5).unwrap().motion[0].velocity;
        assert_approx_eq!(velocity.x, 1.0 * dt, 1e-6);
    }

    #[test]
    fn get_frame_bounds_and_key_frames() {
        let dt = 0.1;
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::ZERO, Mass::default(), 1.0);
        let mut timeline = timeline_of(frame, dt, RuleSet::new(), Integrator::FirstOrderEuler);

        assert!(timeline.get_frame(-1).is_none());
        assert!(timeline.get_frame(1).is_none());
        assert!(timeline.get_frame(0).is_some());

        for _ in 0..65 {
            timeline.simulate();
        }
        assert!(timeline.get_frame(66).is_none());
        // Key frames at 0, 30 and 60; in-between frames replay.
        for frame_no in [0, 29, 30, 31, 60, 65] {
            assert!(timeline.get_frame(frame_no).is_some(), "frame {frame_no}");
        }
    }

    #[test]
    fn rocket_burns_replay_identically() {
        let dt = 0.1;
        let mut frame = Frame::default();
        let id = push_sphere(
            &mut frame,
            Vec3::ZERO,
            Mass {
                inertial: 10.0,
                ..Default::default()
            },
            1.0,
        );
        frame.set_rocket(crate::scene::Rocket {
            id,
            fuel_tank_count: 1,
            fuel_tanks: {
                let mut tanks = [crate::scene::FuelTank::default(); crate::scene::MAX_FUEL_TANKS];
                tanks[0] = crate::scene::FuelTank {
                    mass_flow_rate: 1.0,
                    fuel: 100.0,
                    thrust: 50.0,
                };
                tanks
            },
        });

        let mut timeline = timeline_of(frame, dt, RuleSet::new(), Integrator::FirstOrderEuler);
        timeline.input_event(
            1,
            Event::new(
                id,
                Vec3::ZERO,
                crate::events::RocketBurn {
                    fuel_tank: 0,
                    thrust: Vec3::new(1.0, 0.0, 0.0),
                },
            ),
        );

        for _ in 0..40 {
            timeline.simulate();
        }
        let head_velocity = timeline.get_frame(40).unwrap().motion[0].velocity;
        let head_fuel = timeline.get_frame(40).unwrap().rockets[0].fuel_tanks[0].fuel;
        assert!(head_velocity.x > 0.0);
        assert!(head_fuel < 100.0);

        // Frame 31 is between key frames 30 and 60, so it replays; frame 1
        // replays the burn conversion itself from key frame 0.
        let replayed_31 = timeline.get_frame(31).unwrap().motion[0].velocity;
        assert_approx_eq!(replayed_31.x, head_velocity.x, 1e-5);
        let replayed_1 = timeline.get_frame(1).unwrap();
        assert_approx_eq!(replayed_1.motion[0].velocity.x, head_velocity.x, 1e-5);
        assert_approx_eq!(
            replayed_1.rockets[0].fuel_tanks[0].fuel,
            head_fuel,
            1e-5
        );
    }

    #[test]
    fn query_samples_positions_and_velocities() {
        let dt = 0.1;
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::new(0.0, 100.0, 0.0), Mass::default(), 1.0);
        push_sphere(
            &mut frame,
            Vec3::ZERO,
            Mass {
                inertial: 10000.0,
                active: 10000.0,
                cutoff_distance: 0.0,
            },
            1.0,
        );
        push_sphere(&mut frame, Vec3::new(100.0, 0.0, 0.0), Mass::default(), 1.0);

        let mut timeline = timeline_of(frame, dt, RuleSet::new(), Integrator::VelocityVerlet);
        for _ in 0..100 {
            timeline.simulate();
        }

        // The attractor itself never moves.
        let mut buffer = vec![Vec3::new(9.0, 9.0, 9.0); 5];
        let mut trajectories = [Trajectory {
            id: Entity::new(1),
            first_frame_offset: 0,
            attributes: TrajectoryAttributes::POSITION,
            buffer: &mut buffer,
        }];
        timeline.query(2, &mut trajectories).unwrap();
        for sample in &buffer {
            assert_eq!(*sample, Vec3::ZERO);
        }

        // A misaligned offset is rejected.
        let mut buffer = vec![Vec3::ZERO; 5];
        let mut trajectories = [Trajectory {
            id: Entity::new(1),
            first_frame_offset: 1,
            attributes: TrajectoryAttributes::POSITION,
            buffer: &mut buffer,
        }];
        assert!(matches!(
            timeline.query(2, &mut trajectories),
            Err(Error::InvalidArgument(_))
        ));

        // Position and velocity interleave, sample by sample. Entity 2 falls
        // towards the attractor at roughly 1 m/s^2 to begin with.
        let mut buffer = vec![Vec3::ZERO; 10];
        let mut trajectories = [Trajectory {
            id: Entity::new(2),
            first_frame_offset: 0,
            attributes: TrajectoryAttributes::POSITION | TrajectoryAttributes::VELOCITY,
            buffer: &mut buffer,
        }];
        timeline.query(10, &mut trajectories).unwrap();

        let expect = [
            (Vec3::new(100.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 0.0)),
            (Vec3::new(99.5, 0.0, 0.0), Vec3::new(-0.95, 0.0, 0.0)),
            (Vec3::new(98.0, 0.0, 0.0), Vec3::new(-2.0, 0.0, 0.0)),
            (Vec3::new(95.6, 0.0, 0.0), Vec3::new(-3.0, 0.0, 0.0)),
            (Vec3::new(92.0, 0.0, 0.0), Vec3::new(-4.1, 0.0, 0.0)),
        ];
        for (i, (position, velocity)) in expect.iter().enumerate() {
            assert_approx_eq!(buffer[i * 2].x, position.x, 0.2);
            assert_approx_eq!(buffer[i * 2 + 1].x, velocity.x, 0.2);
        }
    }

    #[test]
    fn budgeted_simulation_respects_the_frame_limit() {
        let dt = 0.1;
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::ZERO, Mass::default(), 1.0);
        let mut timeline = timeline_of(frame, dt, RuleSet::new(), Integrator::FirstOrderEuler);

        let (frames, _) = timeline.simulate_budget(10.0, 10);
        assert!(frames >= 1);
        assert!(frames <= 10);
        assert_eq!(timeline.head(), frames);

        // The head already sits at the limit: nothing to do.
        let (frames, spent) = timeline.simulate_budget(10.0, timeline.head());
        assert_eq!(frames, 0);
        assert_eq!(spent, Duration::ZERO);
    }

    #[test]
    fn labels_are_stored_verbatim() {
        let mut frame = Frame::default();
        push_sphere(&mut frame, Vec3::ZERO, Mass::default(), 1.0);
        let mut timeline = timeline_of(frame, 0.1, RuleSet::new(), Integrator::FirstOrderEuler);

        assert_eq!(timeline.label(Entity::new(0)), None);
        timeline.set_label(Entity::new(0), 42);
        assert_eq!(timeline.label(Entity::new(0)), Some(42));
    }
}

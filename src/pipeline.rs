//! The frame pipeline: one forward (or replay) advance of a scene by `dt`.

use crate::{
    collision::CollisionDetector,
    effects::apply_event_effects,
    events::{Event, EventKind},
    geometry::LayerMatrix,
    glue::update_glued_motion,
    motion::{integrate_motion, update_positions, Integrator},
    orbit::update_orbital_motion,
    rocket::convert_rocket_burns,
    rules::RuleSet,
    scene::Frame,
};

#[derive(Debug, Clone)]
pub struct Pipeline {
    integrator: Integrator,
    collision_detector: CollisionDetector,
    rule_set: RuleSet,
    // Scratch storage for the replay path, reused across steps.
    event_buffer: Vec<Event>,
}

impl Pipeline {
    pub fn new(collision_matrix: LayerMatrix, rule_set: RuleSet, integrator: Integrator) -> Self {
        Self {
            integrator,
            collision_detector: CollisionDetector::new(collision_matrix),
            rule_set,
            event_buffer: Vec::new(),
        }
    }

    pub fn integrator(&self) -> Integrator {
        self.integrator
    }

    /// Advances `frame` by `dt`, consuming `input` (which is reordered and
    /// converted in place) and appending every produced event to
    /// `out_events`.
    pub fn step(
        &mut self,
        dt: f32,
        frame_no: i32,
        frame: &mut Frame,
        input: &mut [Event],
        out_events: &mut Vec<Event>,
    ) {
        // 1) Closed-form orbital motion.
        update_orbital_motion(
            dt * frame_no as f32,
            &frame.transforms,
            &frame.orbits,
            &mut frame.motion,
        );

        // 2) Rocket burns become force accelerations.
        convert_rocket_burns(dt, input, &mut frame.mass, &mut frame.rockets);

        // 3) The motion system wants input events sorted by entity.
        input.sort_by(|a, b| a.id.cmp(&b.id));

        // 4) Forces, gravity, velocities.
        integrate_motion(
            self.integrator,
            dt,
            input,
            &frame.transforms,
            &frame.mass,
            &frame.flags,
            &mut frame.motion,
        );

        // 5) Glued entities inherit their parent's motion.
        update_glued_motion(&frame.transforms, &frame.glue, &frame.flags, &mut frame.motion);

        // 6) Collision detection. <- SKIPPED ON REPLAY
        self.collision_detector.detect_collisions(
            dt,
            &frame.transforms,
            &frame.colliders,
            &frame.motion,
            &frame.flags,
            &frame.glue,
            out_events,
        );

        // 7) Collisions expand into their effects. <- SKIPPED ON REPLAY
        self.rule_set.apply(
            &frame.transforms,
            &frame.mass,
            &frame.motion,
            &frame.colliders,
            &frame.triggers,
            out_events,
        );

        // 8) Commit positions, then apply all event effects.
        update_positions(dt, &frame.motion, &frame.flags, &mut frame.transforms);
        apply_event_effects(input, frame);
        apply_event_effects(out_events, frame);
    }

    /// Re-derives the frame that `step` produced, from the recorded event
    /// set. Collision detection and rule evaluation are skipped: their
    /// outputs are already present in `events`.
    pub fn replay(&mut self, dt: f32, frame_no: i32, frame: &mut Frame, events: &mut [Event]) {
        update_orbital_motion(
            dt * frame_no as f32,
            &frame.transforms,
            &frame.orbits,
            &mut frame.motion,
        );

        convert_rocket_burns(dt, events, &mut frame.mass, &mut frame.rockets);

        self.event_buffer.clear();
        self.event_buffer.extend(
            events
                .iter()
                .filter(|e| e.kind() == EventKind::Acceleration)
                .copied(),
        );
        self.event_buffer.sort_by(|a, b| a.id.cmp(&b.id));
        integrate_motion(
            self.integrator,
            dt,
            &self.event_buffer,
            &frame.transforms,
            &frame.mass,
            &frame.flags,
            &mut frame.motion,
        );

        update_glued_motion(&frame.transforms, &frame.glue, &frame.flags, &mut frame.motion);

        update_positions(dt, &frame.motion, &frame.flags, &mut frame.transforms);
        apply_event_effects(events, frame);
    }
}

//! Rule-based translation of collisions into effect events.
//!
//! Rules are keyed by ordered layer pairs and are directional: a rule for
//! `(a, b)` acts on the entity on layer `a`. The engine evaluates every
//! collision event twice, once as recorded and once with the entities
//! swapped, so a symmetric effect needs two rules. Effects are not applied
//! here; the engine only emits the events that have the desired effect, which
//! is what makes replay possible.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    events::{
        Collision, Damage, Destruction, Event, Payload, Teleportation, Trigger, TriggerFlags,
        TriggerTarget,
    },
    geometry::{Quaternion, Vec3},
    scene::{find_component, Collider, Mass, Motion, Transform},
};

const SEPARATION_EPSILON: f32 = 0.005;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct ApplyDamageParams {
    pub constant: i32,
    pub from_impactor_energy: f32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct BounceParams {
    /// Coefficient of restitution: 1 is fully elastic.
    pub elasticity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectKind {
    /// Destroy the target. (Results in a Destruction event.)
    Destroy,
    /// Damage the target, if it has a Durability component. (Results in a
    /// Damage event.)
    ApplyDamage(ApplyDamageParams),
    /// Bounce the target using the Newtonian rules for elastic and
    /// semi-elastic collisions. (Results in a Teleportation event.)
    Bounce(BounceParams),
    /// Stick the target to the other entity. Not wired up yet; Stick events
    /// injected directly still work.
    Stick,
    /// Emit the target's Trigger event template, if it has one.
    TriggerEvent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEffect {
    pub kind: EffectKind,
    pub min_speed: f32,
    pub max_speed: f32,
    pub min_impactor_energy: f32,
    pub max_impactor_energy: f32,
}

impl CollisionEffect {
    /// An effect that fires at any speed and energy.
    pub fn unfiltered(kind: EffectKind) -> Self {
        Self {
            kind,
            min_speed: 0.0,
            max_speed: f32::INFINITY,
            min_impactor_energy: 0.0,
            max_impactor_energy: f32::INFINITY,
        }
    }
}

pub type LayerPair = (u32, u32);

#[derive(Debug, Default, Clone)]
pub struct RuleSet {
    rules: AHashMap<LayerPair, SmallVec<[CollisionEffect; 4]>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, layer_pair: LayerPair, effect: CollisionEffect) {
        self.rules.entry(layer_pair).or_default().push(effect);
    }

    /// Expands every collision event in `in_out_events` into its effect
    /// events, appended to the same vector.
    pub fn apply(
        &self,
        transforms: &[Transform],
        mass: &[Mass],
        motion: &[Motion],
        colliders: &[Collider],
        triggers: &[Trigger],
        in_out_events: &mut Vec<Event>,
    ) {
        let limit = in_out_events.len();
        for i in 0..limit {
            let event = in_out_events[i];
            let Payload::Collision(collision) = event.payload else {
                continue;
            };
            // Apply once in either direction.
            self.apply_to_collision(
                transforms,
                mass,
                motion,
                colliders,
                triggers,
                &event,
                &collision,
                in_out_events,
            );
            let (event, collision) = invert_collision(&event, &collision);
            self.apply_to_collision(
                transforms,
                mass,
                motion,
                colliders,
                triggers,
                &event,
                &collision,
                in_out_events,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_to_collision(
        &self,
        transforms: &[Transform],
        mass: &[Mass],
        motion: &[Motion],
        colliders: &[Collider],
        triggers: &[Trigger],
        event: &Event,
        collision: &Collision,
        out_events: &mut Vec<Event>,
    ) {
        let first = collision.first_id.index();
        let second = collision.second_id.index();
        let Some(actions) = self
            .rules
            .get(&(colliders[first].layer, colliders[second].layer))
        else {
            return;
        };

        // These are the same for the inverted event; cheap enough to compute
        // twice.
        let impact_speed_sqr =
            (motion[first].velocity - motion[second].velocity).magnitude_squared();
        let impact_speed = impact_speed_sqr.sqrt();
        let impactor_energy = 0.5 * impact_speed_sqr * mass[second].inertial;

        for action in actions {
            if impact_speed < action.min_speed || impact_speed > action.max_speed {
                continue;
            }
            if impactor_energy < action.min_impactor_energy
                || impactor_energy > action.max_impactor_energy
            {
                continue;
            }

            match action.kind {
                EffectKind::Destroy => {
                    out_events.push(Event::new(event.id, event.position, Destruction { value: 1 }));
                }
                EffectKind::ApplyDamage(params) => {
                    out_events.push(Event::new(
                        event.id,
                        event.position,
                        Damage {
                            value: params.constant
                                + (params.from_impactor_energy * impactor_energy).round() as i32,
                        },
                    ));
                }
                EffectKind::Bounce(params) => {
                    bounce(
                        event, collision, params, transforms, colliders, motion, mass, out_events,
                    );
                }
                EffectKind::Stick => {
                    // Unimplemented rule action; see module docs.
                }
                EffectKind::TriggerEvent => {
                    apply_trigger(event, collision, triggers, out_events);
                }
            }
        }
    }
}

fn invert_collision(event: &Event, collision: &Collision) -> (Event, Collision) {
    let inverted = Collision {
        first_id: collision.second_id,
        second_id: collision.first_id,
        first_frame_offset_seconds: collision.first_frame_offset_seconds,
    };
    (
        Event::new(inverted.first_id, event.position, inverted),
        inverted,
    )
}

#[allow(clippy::too_many_arguments)]
fn bounce(
    event: &Event,
    collision: &Collision,
    params: BounceParams,
    transforms: &[Transform],
    colliders: &[Collider],
    motion: &[Motion],
    mass: &[Mass],
    out_events: &mut Vec<Event>,
) {
    let first = collision.first_id.index();
    let second = collision.second_id.index();

    // v_a is the velocity of the entity this rule acts on, v_b the velocity
    // of the entity being collided with.
    let t = collision.first_frame_offset_seconds;
    let v_a = motion[first].velocity;
    let v_b = motion[second].velocity;

    // Positions at the time of contact.
    let mut a = transforms[first].position + v_a * t;
    let b = transforms[second].position + v_b * t;

    // When A and B nearly coincide the vector math below degenerates, so push
    // them apart along x. The rule may run in both directions, so the
    // entity-id parity decides who moves which way.
    if a.approximately(b) {
        if collision.first_id < collision.second_id {
            a.x += SEPARATION_EPSILON;
        } else {
            a.x -= SEPARATION_EPSILON;
        }
    }

    // The colliders are spheres, so the collision normal lies along the line
    // connecting the second collider's focus with the point of contact.
    let n = a - b;
    let v = v_a - v_b;
    let dot = n.dot(v);

    let mut m_a = mass[first].inertial;
    let mut m_b = mass[second].inertial;
    let mut total_mass = m_a + m_b;
    // Two massless entities bounce as if they had equal, negligible mass.
    if total_mass == 0.0 {
        total_mass = 1.0;
        m_a = 0.5;
        m_b = 0.5;
    }

    // Momentum transfers along the line of collision, but not along the
    // tangent.
    let new_v = v_a - ((2.0 * m_b) / total_mass) * (dot / n.magnitude_squared()) * n;

    // Off-center collisions also exchange angular momentum, by an amount that
    // depends on the angle between the collision normal and the closing
    // velocity: none when parallel, the full L = r_a x m_b x |v| when
    // orthogonal. A real conversion to angular velocity needs the inertia
    // tensor; this is a cheap approximation that reads well on screen.
    let s = v.magnitude();
    let r_a = colliders[first].radius;
    let angle = (dot / (n.magnitude() * s)).acos();
    let rate = angle.sin();
    let mut spin = motion[first].spin;
    if rate > 0.005 {
        let l = r_a * m_b * s;
        let mut axis = v.cross(n).normalized();
        // The rule runs for both sides of the collision with n and v
        // inverted, which would spin both entities the same way. Fixing the
        // axis sign against a global reference direction keeps the two sides
        // counter-rotating deterministically.
        if Vec3::new(1.0, 0.0, 0.0).dot(n) > 0.0 {
            axis = -axis;
        }
        spin *= Quaternion::from_axis_angle(axis, (l / m_a) * rate);
    }

    out_events.push(Event::new(
        event.id,
        event.position,
        Teleportation {
            new_position: a + n.normalized() * SEPARATION_EPSILON,
            new_velocity: params.elasticity * new_v,
            new_spin: spin,
        },
    ));
}

fn apply_trigger(
    event: &Event,
    collision: &Collision,
    triggers: &[Trigger],
    out_events: &mut Vec<Event>,
) {
    let Some(trigger) = find_component(triggers, event.id) else {
        return;
    };
    let mut new_event = trigger.event;
    new_event.position = event.position;
    new_event.id = match trigger.target {
        TriggerTarget::Owner => event.id,
        TriggerTarget::CollidingObject => collision.second_id,
    };
    out_events.push(new_event);

    if trigger.flags.contains(TriggerFlags::DESTROY_TRIGGER) {
        out_events.push(Event::new(
            event.id,
            event.position,
            Destruction { value: 1 },
        ));
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use crate::{
        events::TriggerCondition,
        scene::{Entity, Frame, Glue},
    };

    use super::*;

    fn two_body_frame(
        positions: [Vec3; 2],
        velocities: [Vec3; 2],
        inertial: [f32; 2],
        layers: [u32; 2],
    ) -> Frame {
        let mut frame = Frame::default();
        for i in 0..2 {
            frame.push(
                Transform {
                    position: positions[i],
                    rotation: Default::default(),
                },
                Mass {
                    inertial: inertial[i],
                    ..Default::default()
                },
                Motion {
                    velocity: velocities[i],
                    ..Default::default()
                },
                Collider {
                    layer: layers[i],
                    radius: 1.0,
                    center: Vec3::ZERO,
                },
                Glue {
                    parent_id: Entity::NIL,
                },
                Default::default(),
            );
        }
        frame
    }

    fn collision_event(first: i32, second: i32, position: Vec3) -> Event {
        Event::collision(
            position,
            Collision {
                first_id: Entity::new(first),
                second_id: Entity::new(second),
                first_frame_offset_seconds: 0.0,
            },
        )
    }

    fn apply(rules: &RuleSet, frame: &Frame, input: Vec<Event>) -> Vec<Event> {
        let mut events = input;
        let input_len = events.len();
        rules.apply(
            &frame.transforms,
            &frame.mass,
            &frame.motion,
            &frame.colliders,
            &frame.triggers,
            &mut events,
        );
        events.split_off(input_len)
    }

    #[test]
    fn destruction_rule_is_directional() {
        let frame = two_body_frame(
            [Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)],
            [Vec3::ZERO; 2],
            [1.0, 1.0],
            [0, 1],
        );
        let mut rules = RuleSet::new();
        rules.add((0, 1), CollisionEffect::unfiltered(EffectKind::Destroy));

        let output = apply(
            &rules,
            &frame,
            vec![collision_event(0, 1, Vec3::new(0.5, 0.0, 0.0))],
        );
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].id, Entity::new(0));
        assert!(matches!(output[0].payload, Payload::Destruction(_)));
    }

    #[test]
    fn symmetric_destruction_needs_two_rules() {
        let frame = two_body_frame(
            [Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)],
            [Vec3::ZERO; 2],
            [1.0, 1.0],
            [0, 1],
        );
        let mut rules = RuleSet::new();
        rules.add((0, 1), CollisionEffect::unfiltered(EffectKind::Destroy));
        rules.add((1, 0), CollisionEffect::unfiltered(EffectKind::Destroy));

        let output = apply(
            &rules,
            &frame,
            vec![collision_event(0, 1, Vec3::new(0.5, 0.0, 0.0))],
        );
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].id, Entity::new(0));
        assert_eq!(output[1].id, Entity::new(1));
    }

    #[test]
    fn elastic_head_on_bounce_swaps_velocities() {
        let frame = two_body_frame(
            [Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)],
            [Vec3::new(1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)],
            [1.0, 1.0],
            [0, 0],
        );
        let mut rules = RuleSet::new();
        rules.add(
            (0, 0),
            CollisionEffect::unfiltered(EffectKind::Bounce(BounceParams { elasticity: 1.0 })),
        );

        let output = apply(
            &rules,
            &frame,
            vec![collision_event(0, 1, Vec3::new(1.0, 0.0, 0.0))],
        );
        // Both directions bounce: id 0 takes id 1's velocity and vice versa.
        assert_eq!(output.len(), 2);
        let Payload::Teleportation(first) = output[0].payload else {
            panic!("expected teleportation");
        };
        let Payload::Teleportation(second) = output[1].payload else {
            panic!("expected teleportation");
        };
        assert_eq!(output[0].id, Entity::new(0));
        assert_eq!(output[1].id, Entity::new(1));
        assert_approx_eq!(first.new_velocity.x, -1.0, 1e-5);
        assert_approx_eq!(second.new_velocity.x, 1.0, 1e-5);
    }

    #[test]
    fn inelastic_bounce_scales_by_elasticity() {
        let frame = two_body_frame(
            [Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)],
            [Vec3::new(1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)],
            [1.0, 1.0],
            [0, 0],
        );
        let mut rules = RuleSet::new();
        rules.add(
            (0, 0),
            CollisionEffect::unfiltered(EffectKind::Bounce(BounceParams { elasticity: 0.5 })),
        );

        let output = apply(
            &rules,
            &frame,
            vec![collision_event(0, 1, Vec3::new(1.0, 0.0, 0.0))],
        );
        let Payload::Teleportation(first) = output[0].payload else {
            panic!("expected teleportation");
        };
        assert_approx_eq!(first.new_velocity.x, -0.5, 1e-5);
    }

    #[test]
    fn massless_bounce_substitutes_equal_masses() {
        let frame = two_body_frame(
            [Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)],
            [Vec3::new(1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)],
            [0.0, 0.0],
            [0, 0],
        );
        let mut rules = RuleSet::new();
        rules.add(
            (0, 0),
            CollisionEffect::unfiltered(EffectKind::Bounce(BounceParams { elasticity: 1.0 })),
        );

        let output = apply(
            &rules,
            &frame,
            vec![collision_event(0, 1, Vec3::new(1.0, 0.0, 0.0))],
        );
        let Payload::Teleportation(first) = output[0].payload else {
            panic!("expected teleportation");
        };
        assert_approx_eq!(first.new_velocity.x, -1.0, 1e-5);
        assert!(first.new_velocity.x.is_finite());
    }

    #[test]
    fn coincident_centers_take_the_separation_path() {
        let frame = two_body_frame(
            [Vec3::ZERO, Vec3::ZERO],
            [Vec3::ZERO, Vec3::ZERO],
            [1.0, 1.0],
            [0, 0],
        );
        let mut rules = RuleSet::new();
        rules.add(
            (0, 0),
            CollisionEffect::unfiltered(EffectKind::Bounce(BounceParams { elasticity: 1.0 })),
        );

        let output = apply(&rules, &frame, vec![collision_event(0, 1, Vec3::ZERO)]);
        assert_eq!(output.len(), 2);
        let Payload::Teleportation(first) = output[0].payload else {
            panic!("expected teleportation");
        };
        let Payload::Teleportation(second) = output[1].payload else {
            panic!("expected teleportation");
        };
        // The entities separate in opposite directions along x, without NaNs.
        assert!(first.new_position.x > 0.0);
        assert!(second.new_position.x < 0.0);
        assert!(first.new_position.x.is_finite());
    }

    #[test]
    fn speed_filter_suppresses_slow_collisions() {
        let frame = two_body_frame(
            [Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)],
            [Vec3::new(0.1, 0.0, 0.0), Vec3::ZERO],
            [1.0, 1.0],
            [0, 0],
        );
        let mut rules = RuleSet::new();
        rules.add(
            (0, 0),
            CollisionEffect {
                min_speed: 1.0,
                ..CollisionEffect::unfiltered(EffectKind::Destroy)
            },
        );

        assert!(apply(
            &rules,
            &frame,
            vec![collision_event(0, 1, Vec3::new(1.0, 0.0, 0.0))]
        )
        .is_empty());
    }

    #[test]
    fn damage_scales_with_impactor_energy() {
        let frame = two_body_frame(
            [Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)],
            [Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO],
            [1.0, 4.0],
            [0, 1],
        );
        let mut rules = RuleSet::new();
        rules.add(
            (0, 1),
            CollisionEffect::unfiltered(EffectKind::ApplyDamage(ApplyDamageParams {
                constant: 1,
                from_impactor_energy: 0.5,
            })),
        );

        let output = apply(
            &rules,
            &frame,
            vec![collision_event(0, 1, Vec3::new(1.0, 0.0, 0.0))],
        );
        // Impactor energy = 0.5 * |dv|^2 * m_b = 0.5 * 4 * 4 = 8.
        let Payload::Damage(damage) = output[0].payload else {
            panic!("expected damage");
        };
        assert_eq!(damage.value, 1 + 4);
    }

    #[test]
    fn trigger_fires_at_the_colliding_object() {
        let mut frame = two_body_frame(
            [Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)],
            [Vec3::ZERO; 2],
            [1.0, 1.0],
            [0, 1],
        );
        frame.set_trigger(Trigger {
            id: Entity::new(0),
            condition: TriggerCondition::Collision,
            target: TriggerTarget::CollidingObject,
            flags: TriggerFlags::DESTROY_TRIGGER,
            event: Event::new(Entity::NIL, Vec3::ZERO, Damage { value: 5 }),
        });
        let mut rules = RuleSet::new();
        rules.add((0, 1), CollisionEffect::unfiltered(EffectKind::TriggerEvent));

        let position = Vec3::new(0.5, 0.0, 0.0);
        let output = apply(&rules, &frame, vec![collision_event(0, 1, position)]);
        assert_eq!(output.len(), 2);
        // The template fires at the collision partner, then the trigger owner
        // destroys itself.
        assert_eq!(output[0].id, Entity::new(1));
        assert_eq!(output[0].position, position);
        assert!(matches!(output[0].payload, Payload::Damage(Damage { value: 5 })));
        assert_eq!(output[1].id, Entity::new(0));
        assert!(matches!(output[1].payload, Payload::Destruction(_)));
    }

    #[test]
    fn entity_without_trigger_is_a_no_op() {
        let frame = two_body_frame(
            [Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)],
            [Vec3::ZERO; 2],
            [1.0, 1.0],
            [0, 1],
        );
        let mut rules = RuleSet::new();
        rules.add((0, 1), CollisionEffect::unfiltered(EffectKind::TriggerEvent));

        assert!(apply(
            &rules,
            &frame,
            vec![collision_event(0, 1, Vec3::new(0.5, 0.0, 0.0))]
        )
        .is_empty());
    }
}

//! Rocket burns and refuels.
//!
//! A burn event does not accelerate anything by itself: it is converted in
//! place into a force-flagged acceleration event, debiting fuel and inertial
//! mass as a side effect. The conversion runs before motion integration, so
//! replaying the stored burn event through the same conversion reproduces the
//! original trajectory.

use crate::{
    events::{Acceleration, AccelerationFlags, Event, Payload, RocketBurn, RocketRefuel},
    scene::{find_component_mut, Entity, Mass, Rocket, MAX_FUEL_TANKS},
    Error, Result,
};

/// Converts every `RocketBurn` event in `input` into an `Acceleration` event
/// in place. Burns that cannot be applied (no rocket, bad tank index, dry
/// tank) are skipped and leave the event untouched; downstream stages ignore
/// unconverted burns.
pub fn convert_rocket_burns(
    dt: f32,
    input: &mut [Event],
    mass: &mut [Mass],
    rockets: &mut [Rocket],
) {
    for event in input.iter_mut() {
        let Payload::RocketBurn(burn) = event.payload else {
            continue;
        };
        match apply_rocket_burn(dt, event.id, &burn, mass, rockets) {
            Ok(acceleration) => {
                event.payload = Payload::Acceleration(acceleration);
            }
            Err(err) => {
                log::warn!(
                    "skipping rocket burn on entity {}: {err}",
                    event.id.value()
                );
            }
        }
    }
}

fn apply_rocket_burn(
    dt: f32,
    id: Entity,
    burn: &RocketBurn,
    mass: &mut [Mass],
    rockets: &mut [Rocket],
) -> Result<Acceleration> {
    let Some(rocket) = find_component_mut(rockets, id) else {
        return Err(Error::NotFound("entity has no rocket"));
    };
    if burn.fuel_tank < 0 || burn.fuel_tank as usize >= MAX_FUEL_TANKS {
        return Err(Error::OutOfRange("no such fuel tank"));
    }
    let tank_no = burn.fuel_tank as usize;
    if rocket.fuel_tanks[tank_no].fuel <= 0.0 {
        return Err(Error::ResourceExhausted("fuel tank empty"));
    }

    let throttle = burn.thrust.magnitude();
    let thrust = burn.thrust * rocket.fuel_tanks[tank_no].thrust;
    let fuel_used = throttle * dt;
    let fuel_mass_used = rocket.fuel_tanks[tank_no].mass_flow_rate * fuel_used;

    rocket.fuel_tanks[tank_no].fuel -= fuel_used;
    mass[id.index()].inertial -= fuel_mass_used;

    Ok(Acceleration {
        linear: thrust,
        flags: AccelerationFlags::FORCE,
        angular: Default::default(),
    })
}

/// Overwrites a fuel tank (or fills the first empty one when the event's tank
/// number is negative) and adjusts inertial mass by the fuel mass delta.
pub fn apply_rocket_refuel(
    id: Entity,
    refuel: &RocketRefuel,
    mass: &mut [Mass],
    rockets: &mut [Rocket],
) -> Result<()> {
    let Some(rocket) = find_component_mut(rockets, id) else {
        return Err(Error::NotFound("entity has no rocket"));
    };

    let mut tank_no = refuel.fuel_tank_no;
    if tank_no < 0 {
        for i in 0..rocket.fuel_tank_count {
            if rocket.fuel_tanks[i as usize].fuel <= 0.0 {
                tank_no = i;
                break;
            }
        }
        if tank_no < 0 {
            return Err(Error::OutOfRange("no empty fuel tank"));
        }
    }
    if tank_no as usize >= MAX_FUEL_TANKS {
        return Err(Error::OutOfRange("fuel tank out of allowed range"));
    }

    let tank_no = tank_no as usize;
    mass[id.index()].inertial -=
        rocket.fuel_tanks[tank_no].mass_flow_rate * rocket.fuel_tanks[tank_no].fuel;
    rocket.fuel_tanks[tank_no] = refuel.fuel_tank;
    mass[id.index()].inertial += refuel.fuel_tank.fuel * refuel.fuel_tank.mass_flow_rate;
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use crate::{
        geometry::Vec3,
        scene::{FuelTank, Frame},
    };

    use super::*;

    fn rocket_frame() -> Frame {
        let mut frame = Frame::default();
        let id = frame.push_default();
        frame.mass[id.index()].inertial = 100.0;
        frame.set_rocket(Rocket {
            id,
            fuel_tank_count: 2,
            fuel_tanks: {
                let mut tanks = [FuelTank::default(); MAX_FUEL_TANKS];
                tanks[0] = FuelTank {
                    mass_flow_rate: 2.0,
                    fuel: 10.0,
                    thrust: 100.0,
                };
                tanks
            },
        });
        frame
    }

    fn burn_event(id: Entity, tank: i32, thrust: Vec3) -> Event {
        Event::new(
            id,
            Vec3::ZERO,
            RocketBurn {
                fuel_tank: tank,
                thrust,
            },
        )
    }

    #[test]
    fn burn_converts_to_force_and_debits_fuel_and_mass() {
        let mut frame = rocket_frame();
        let dt = 0.5;
        let mut input = [burn_event(Entity::new(0), 0, Vec3::new(1.0, 0.0, 0.0))];

        convert_rocket_burns(dt, &mut input, &mut frame.mass, &mut frame.rockets);

        let Payload::Acceleration(acceleration) = input[0].payload else {
            panic!("burn was not converted: {:?}", input[0].payload);
        };
        assert_eq!(acceleration.flags, AccelerationFlags::FORCE);
        assert_eq!(acceleration.linear, Vec3::new(100.0, 0.0, 0.0));

        // Full throttle for half a second consumes 0.5 s of fuel, weighing
        // 2 kg/s x 0.5 s.
        assert_approx_eq!(frame.rockets[0].fuel_tanks[0].fuel, 9.5, 1e-6);
        assert_approx_eq!(frame.mass[0].inertial, 99.0, 1e-6);
    }

    #[test]
    fn burn_without_rocket_is_skipped() {
        let mut frame = Frame::default();
        frame.push_default();
        let mut input = [burn_event(Entity::new(0), 0, Vec3::new(1.0, 0.0, 0.0))];
        convert_rocket_burns(1.0, &mut input, &mut frame.mass, &mut frame.rockets);
        assert!(matches!(input[0].payload, Payload::RocketBurn(_)));
    }

    #[test]
    fn burn_with_bad_tank_or_dry_tank_is_skipped() {
        let mut frame = rocket_frame();
        let mut input = [
            burn_event(Entity::new(0), 12, Vec3::new(1.0, 0.0, 0.0)),
            burn_event(Entity::new(0), 1, Vec3::new(1.0, 0.0, 0.0)),
        ];
        convert_rocket_burns(1.0, &mut input, &mut frame.mass, &mut frame.rockets);
        assert!(matches!(input[0].payload, Payload::RocketBurn(_)));
        assert!(matches!(input[1].payload, Payload::RocketBurn(_)));
        assert_eq!(frame.mass[0].inertial, 100.0);
    }

    #[test]
    fn refuel_with_explicit_tank_adjusts_mass_delta() {
        let mut frame = rocket_frame();
        // Tank 0 currently holds 10 s x 2 kg/s = 20 kg of fuel.
        apply_rocket_refuel(
            Entity::new(0),
            &RocketRefuel {
                fuel_tank_no: 0,
                fuel_tank: FuelTank {
                    mass_flow_rate: 1.0,
                    fuel: 5.0,
                    thrust: 50.0,
                },
            },
            &mut frame.mass,
            &mut frame.rockets,
        )
        .unwrap();

        assert_approx_eq!(frame.mass[0].inertial, 100.0 - 20.0 + 5.0, 1e-6);
        assert_eq!(frame.rockets[0].fuel_tanks[0].fuel, 5.0);
    }

    #[test]
    fn refuel_finds_first_empty_tank() {
        let mut frame = rocket_frame();
        let tank = FuelTank {
            mass_flow_rate: 1.0,
            fuel: 3.0,
            thrust: 10.0,
        };
        apply_rocket_refuel(
            Entity::new(0),
            &RocketRefuel {
                fuel_tank_no: -1,
                fuel_tank: tank,
            },
            &mut frame.mass,
            &mut frame.rockets,
        )
        .unwrap();

        // Tank 1 was the first empty one.
        assert_eq!(frame.rockets[0].fuel_tanks[1], tank);
        assert_approx_eq!(frame.mass[0].inertial, 103.0, 1e-6);

        // All tanks full now: refueling fails.
        let result = apply_rocket_refuel(
            Entity::new(0),
            &RocketRefuel {
                fuel_tank_no: -1,
                fuel_tank: tank,
            },
            &mut frame.mass,
            &mut frame.rockets,
        );
        assert!(result.is_err());
    }
}

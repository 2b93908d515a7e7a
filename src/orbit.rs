//! Closed-form Keplerian orbital motion.

use crate::{
    geometry::{Vec3, RADIANS_PER_DEG},
    scene::{Kepler, Motion, Orbit, Transform},
};

/// Solves Kepler's equation to return the orbital position relative to the
/// focus. Only elliptical orbits are supported: eccentricities outside
/// `[0, 1)` yield the zero vector.
pub fn elliptical_position(kepler: &Kepler) -> Vec3 {
    if kepler.eccentricity >= 1.0 || kepler.eccentricity < 0.0 {
        return Vec3::ZERO;
    }

    // For explanation, see: https://ssd.jpl.nasa.gov/txt/aprx_pos_planets.pdf
    // Everything is converted to radians. The one-letter names match the
    // literature on Kepler orbits (such as the link above).
    let a = kepler.semi_major_axis;
    let e = kepler.eccentricity;
    let l = kepler.mean_longitude_deg * RADIANS_PER_DEG;
    let peri = kepler.longitude_of_perihelion_deg * RADIANS_PER_DEG;
    let node = kepler.longitude_of_ascending_node_deg * RADIANS_PER_DEG;
    let incl = kepler.inclination_deg * RADIANS_PER_DEG;

    // Argument of perihelion.
    let w = peri - node;
    // Mean anomaly.
    let m = (l - peri) % (360.0 * RADIANS_PER_DEG) - 180.0 * RADIANS_PER_DEG;

    // Kepler's equation relates the mean anomaly to the eccentric anomaly E:
    //
    //   M = E - e * sin(E)
    //
    // Solve for E with Newton's method, capped at 100 iterations.
    let mut ecc_anomaly = m;
    for _ in 0..100 {
        let delta = (ecc_anomaly - e * ecc_anomaly.sin() - m) / (1.0 - e * ecc_anomaly.cos());
        ecc_anomaly -= delta;
        if delta.abs() < 1e-6 {
            break;
        }
    }

    // Coordinates relative to the focus, in the orbital plane.
    let xp = a * (ecc_anomaly.cos() - e);
    let yp = a * (1.0 - e * e).sqrt() * ecc_anomaly.sin();

    // Rotate into the inclined plane.
    let x = (w.cos() * node.cos() - w.sin() * node.sin() * incl.cos()) * xp
        + (-w.sin() * node.cos() - w.cos() * node.sin() * incl.cos()) * yp;
    let y = (w.cos() * node.sin() - w.sin() * node.cos() * incl.cos()) * xp
        + (-w.sin() * node.sin() - w.cos() * node.cos() * incl.cos()) * yp;
    let z = w.sin() * incl.sin() * xp + w.cos() * incl.sin() * yp;

    Vec3::new(x, y, z)
}

/// Computes the orbital position at time `t` for every entity with an orbit
/// and stores it in `Motion::new_position`, with the velocity set to the
/// frame-over-frame displacement. The position commit pass picks the result
/// up later.
pub fn update_orbital_motion(
    t: f32,
    transforms: &[Transform],
    orbits: &[Orbit],
    motion: &mut [Motion],
) {
    for orbit in orbits {
        let current = orbit.epoch + orbit.delta * t;
        let idx = orbit.id.index();
        motion[idx].new_position = orbit.focus + elliptical_position(&current);
        motion[idx].velocity = motion[idx].new_position - transforms[idx].position;
    }
}

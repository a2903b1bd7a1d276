//! Redshift-space distortion of particle positions.

use crate::domain::{PkError, PkResult};

/// Displaces positions along `axis` by the peculiar-velocity term
/// `v (1+z) / H(z)` and wraps them back into the periodic box.
///
/// Positions are Mpc/h, velocities km/s, `hubble_rate` km/s/(Mpc/h).
pub fn apply_redshift_space(
    positions: &mut [[f32; 3]],
    velocities: &[[f32; 3]],
    box_size: f64,
    hubble_rate: f64,
    redshift: f64,
    axis: usize,
) -> PkResult<()> {
    if axis > 2 {
        return Err(PkError::EstimatorInput {
            reason: format!("redshift-space axis must be 0, 1 or 2, got {axis}"),
        });
    }
    if positions.len() != velocities.len() {
        return Err(PkError::EstimatorInput {
            reason: format!(
                "redshift-space transform got {} velocities for {} positions",
                velocities.len(),
                positions.len()
            ),
        });
    }

    let factor = ((1.0 + redshift) / hubble_rate) as f32;
    let box_size = box_size as f32;
    for (position, velocity) in positions.iter_mut().zip(velocities) {
        let displaced = position[axis] + velocity[axis] * factor;
        position[axis] = displaced.rem_euclid(box_size);
    }
    Ok(())
}

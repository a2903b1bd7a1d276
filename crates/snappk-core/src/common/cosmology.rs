//! Derived cosmological quantities used by the pipeline.

use super::constants::{HUBBLE_100, RHO_CRIT};

/// Hubble rate H(z) in km/s/(Mpc/h) for a flat matter + dark-energy
/// background: `100 * sqrt(Omega_m (1+z)^3 + Omega_l)`.
pub fn hubble_rate(omega_m: f64, omega_l: f64, redshift: f64) -> f64 {
    HUBBLE_100 * (omega_m * (1.0 + redshift).powi(3) + omega_l).sqrt()
}

/// Density parameter of a component with total mass `total_mass` (Msun/h)
/// inside a periodic box of side `box_size` (Mpc/h).
pub fn density_parameter(total_mass: f64, box_size: f64) -> f64 {
    total_mass / (box_size.powi(3) * RHO_CRIT)
}

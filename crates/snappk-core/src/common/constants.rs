//! Cosmological constants and Gadget unit scalings.
//!
//! These values are shared across the snapshot reader and the pipeline to
//! avoid ad hoc per-module literal constants. Lengths are Mpc/h, masses
//! Msun/h, velocities km/s throughout the crate.

/// Critical density of the universe in (Msun/h) / (Mpc/h)^3.
pub const RHO_CRIT: f64 = 2.775_366_27e11;

/// Hubble constant in units of h, km/s/(Mpc/h).
pub const HUBBLE_100: f64 = 100.0;

/// Gadget stores lengths in kpc/h.
pub const GADGET_LENGTH_TO_MPC: f64 = 1.0e-3;

/// Gadget stores masses in units of 1e10 Msun/h.
pub const GADGET_MASS_TO_MSUN: f64 = 1.0e10;

/// Number of particle-type slots in a Gadget header.
pub const NUM_PARTICLE_TYPES: usize = 6;

//! Matter power spectra from Gadget N-body snapshots.
//!
//! The crate reads format-1 Gadget snapshots, deposits particle species onto
//! regular density grids with a cloud-in-cell kernel, and estimates isotropic
//! and redshift-space power-spectrum multipoles per species, per species
//! pair, and for the Ω-weighted total matter field.

pub mod common;
pub mod domain;
pub mod grid;
pub mod numerics;
pub mod pipeline;
pub mod rsd;
pub mod snapshot;
pub mod spectrum;

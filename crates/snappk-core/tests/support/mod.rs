//! Shared fixtures for the pipeline integration tests.

use snappk_core::domain::Species;
use snappk_core::snapshot::SnapshotBuilder;
use std::path::Path;

/// Deterministic 64-bit LCG; good enough for uniform test particles.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed ^ 0x9e37_79b9_7f4a_7c15)
    }

    pub fn next_unit(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1_u64 << 53) as f64
    }
}

pub fn uniform_positions(count: usize, box_size: f64, seed: u64) -> Vec<[f32; 3]> {
    let mut rng = Lcg::new(seed);
    (0..count)
        .map(|_| {
            [
                (rng.next_unit() * box_size) as f32,
                (rng.next_unit() * box_size) as f32,
                (rng.next_unit() * box_size) as f32,
            ]
        })
        .collect()
}

pub fn random_velocities(count: usize, scale: f64, seed: u64) -> Vec<[f32; 3]> {
    let mut rng = Lcg::new(seed);
    (0..count)
        .map(|_| {
            [
                ((rng.next_unit() - 0.5) * scale) as f32,
                ((rng.next_unit() - 0.5) * scale) as f32,
                ((rng.next_unit() - 0.5) * scale) as f32,
            ]
        })
        .collect()
}

/// A box of uniform cold dark matter with a fixed per-particle mass.
pub fn write_cdm_snapshot(path: &Path, count: usize, box_size: f64, redshift: f64) {
    SnapshotBuilder::new(box_size)
        .redshift(redshift)
        .cosmology(0.3, 0.7, 0.67)
        .species_with_table_mass(
            Species::ColdDarkMatter,
            uniform_positions(count, box_size, 11),
            4.0e9,
        )
        .velocities(
            Species::ColdDarkMatter,
            random_velocities(count, 600.0, 23),
        )
        .write(path)
        .expect("synthetic snapshot should be written");
}

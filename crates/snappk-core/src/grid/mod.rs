//! Regular density grids and the cloud-in-cell assignment kernel.

use crate::domain::{PkError, PkResult};
use ndarray::Array3;

/// A `dims^3` real-valued density field over a periodic box.
///
/// Holds raw deposited weight (particle counts or masses) until
/// [`DensityGrid::into_overdensity`] turns it into a density contrast.
#[derive(Debug, Clone)]
pub struct DensityGrid {
    dims: usize,
    box_size: f64,
    data: Array3<f64>,
}

impl DensityGrid {
    pub fn zeros(dims: usize, box_size: f64) -> Self {
        Self {
            dims,
            box_size,
            data: Array3::zeros((dims, dims, dims)),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn box_size(&self) -> f64 {
        self.box_size
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// Total deposited weight. CIC conserves it, so after an unweighted
    /// deposit this equals the particle count up to rounding.
    pub fn total(&self) -> f64 {
        self.data.sum()
    }

    /// Deposits unit weight per particle.
    pub fn deposit(&mut self, positions: &[[f32; 3]]) {
        for position in positions {
            self.deposit_one(position, 1.0);
        }
    }

    /// Deposits per-particle weights (mass-weighted assignment).
    pub fn deposit_weighted(&mut self, positions: &[[f32; 3]], weights: &[f32]) -> PkResult<()> {
        if positions.len() != weights.len() {
            return Err(PkError::EstimatorInput {
                reason: format!(
                    "weighted deposit got {} weights for {} positions",
                    weights.len(),
                    positions.len()
                ),
            });
        }
        for (position, &weight) in positions.iter().zip(weights) {
            self.deposit_one(position, f64::from(weight));
        }
        Ok(())
    }

    /// Cell-centered cloud-in-cell: each particle is an overlap-weighted
    /// cloud of one cell size, wrapped periodically at the box boundary.
    fn deposit_one(&mut self, position: &[f32; 3], weight: f64) {
        let dims = self.dims as isize;
        let inv_cell = self.dims as f64 / self.box_size;

        let mut cells = [[0_usize; 2]; 3];
        let mut fractions = [[0.0_f64; 2]; 3];
        for axis in 0..3 {
            let u = f64::from(position[axis]) * inv_cell - 0.5;
            let low = u.floor();
            let upper_fraction = u - low;
            let low = low as isize;
            cells[axis] = [
                low.rem_euclid(dims) as usize,
                (low + 1).rem_euclid(dims) as usize,
            ];
            fractions[axis] = [1.0 - upper_fraction, upper_fraction];
        }

        for (ix, &fx) in fractions[0].iter().enumerate() {
            for (iy, &fy) in fractions[1].iter().enumerate() {
                for (iz, &fz) in fractions[2].iter().enumerate() {
                    self.data[[cells[0][ix], cells[1][iy], cells[2][iz]]] +=
                        weight * fx * fy * fz;
                }
            }
        }
    }

    /// Consumes the raw field and returns the density contrast
    /// `delta = grid / mean - 1`. The mean must be positive.
    pub fn into_overdensity(self, mean: f64) -> PkResult<Array3<f64>> {
        if mean <= 0.0 {
            return Err(PkError::DivideByZero {
                context: format!("density grid with mean weight {mean} per cell"),
            });
        }
        let mut delta = self.data;
        delta.mapv_inplace(|value| value / mean - 1.0);
        Ok(delta)
    }
}

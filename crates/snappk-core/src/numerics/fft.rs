//! Discrete Fourier transforms for cubic density fields.
//!
//! Iterative radix-2 Cooley-Tukey for power-of-two lengths, with a direct
//! O(n^2) evaluation fallback so arbitrary grid resolutions stay usable.
//! Transforms are unnormalized forward transforms; the spectrum estimator
//! applies the physical normalization.

use ndarray::{Array3, Axis};
use num_complex::Complex64;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Radix2,
    Direct,
}

/// A reusable forward-transform plan for lines of a fixed length.
#[derive(Debug, Clone)]
pub struct FftPlan {
    n: usize,
    /// `twiddles[j] = exp(-2 pi i j / n)`.
    twiddles: Vec<Complex64>,
    strategy: Strategy,
}

impl FftPlan {
    pub fn new(n: usize) -> Self {
        let twiddles = (0..n)
            .map(|j| Complex64::from_polar(1.0, -2.0 * PI * j as f64 / n as f64))
            .collect();
        let strategy = if n.is_power_of_two() {
            Strategy::Radix2
        } else {
            Strategy::Direct
        };
        Self {
            n,
            twiddles,
            strategy,
        }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Unnormalized forward transform of one line, in place.
    pub fn forward(&self, line: &mut [Complex64]) {
        debug_assert_eq!(line.len(), self.n);
        match self.strategy {
            Strategy::Radix2 => self.forward_radix2(line),
            Strategy::Direct => self.forward_direct(line),
        }
    }

    fn forward_radix2(&self, line: &mut [Complex64]) {
        let n = self.n;
        if n < 2 {
            return;
        }
        let shift = usize::BITS - n.trailing_zeros();
        for i in 1..n {
            let j = i.reverse_bits() >> shift;
            if i < j {
                line.swap(i, j);
            }
        }

        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let step = n / len;
            for base in (0..n).step_by(len) {
                for offset in 0..half {
                    let w = self.twiddles[offset * step];
                    let a = line[base + offset];
                    let b = line[base + offset + half] * w;
                    line[base + offset] = a + b;
                    line[base + offset + half] = a - b;
                }
            }
            len *= 2;
        }
    }

    fn forward_direct(&self, line: &mut [Complex64]) {
        let n = self.n;
        let mut transformed = vec![Complex64::ZERO; n];
        for (k, out) in transformed.iter_mut().enumerate() {
            let mut sum = Complex64::ZERO;
            for (j, &value) in line.iter().enumerate() {
                sum += value * self.twiddles[(j * k) % n];
            }
            *out = sum;
        }
        line.copy_from_slice(&transformed);
    }
}

/// Forward transform of a cubic field along all three axes. Lanes are
/// independent, so the per-axis passes run on the current rayon pool;
/// the result does not depend on scheduling.
pub fn forward_3d(field: &mut Array3<Complex64>, plan: &FftPlan) {
    debug_assert_eq!(field.shape(), [plan.len(), plan.len(), plan.len()]);
    for axis in [Axis(0), Axis(1), Axis(2)] {
        field
            .lanes_mut(axis)
            .into_iter()
            .for_each(|mut lane| {
                let mut scratch: Vec<Complex64> = lane.iter().copied().collect();
                plan.forward(&mut scratch);
                for (slot, value) in lane.iter_mut().zip(scratch) {
                    *slot = value;
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::{FftPlan, forward_3d};
    use ndarray::Array3;
    use num_complex::Complex64;
    use std::f64::consts::PI;

    fn wobbly_line(n: usize) -> Vec<Complex64> {
        (0..n)
            .map(|j| {
                let t = j as f64;
                Complex64::new((0.3 * t).sin() + 0.1 * t, (0.7 * t).cos() - 0.05 * t)
            })
            .collect()
    }

    #[test]
    fn impulse_transforms_to_a_flat_spectrum() {
        let plan = FftPlan::new(8);
        let mut line = vec![Complex64::ZERO; 8];
        line[0] = Complex64::ONE;
        plan.forward(&mut line);
        for value in line {
            assert!((value - Complex64::ONE).norm() < 1.0e-12);
        }
    }

    #[test]
    fn constant_line_concentrates_in_the_dc_bin() {
        let plan = FftPlan::new(16);
        let mut line = vec![Complex64::ONE; 16];
        plan.forward(&mut line);
        assert!((line[0] - Complex64::new(16.0, 0.0)).norm() < 1.0e-10);
        for value in &line[1..] {
            assert!(value.norm() < 1.0e-10);
        }
    }

    #[test]
    fn plane_wave_lands_in_its_own_bin() {
        let n = 32;
        let mode = 5;
        let plan = FftPlan::new(n);
        let mut line: Vec<Complex64> = (0..n)
            .map(|j| Complex64::from_polar(1.0, 2.0 * PI * (mode * j) as f64 / n as f64))
            .collect();
        plan.forward(&mut line);
        assert!((line[mode] - Complex64::new(n as f64, 0.0)).norm() < 1.0e-9);
        for (k, value) in line.iter().enumerate() {
            if k != mode {
                assert!(value.norm() < 1.0e-9, "leakage into bin {k}");
            }
        }
    }

    #[test]
    fn radix2_and_direct_evaluation_agree() {
        let n = 16;
        let radix2 = FftPlan::new(n);
        assert_eq!(radix2.strategy, super::Strategy::Radix2);

        let mut direct = radix2.clone();
        direct.strategy = super::Strategy::Direct;

        let mut fast = wobbly_line(n);
        let mut slow = fast.clone();
        radix2.forward(&mut fast);
        direct.forward(&mut slow);
        for (a, b) in fast.iter().zip(&slow) {
            assert!((a - b).norm() < 1.0e-9);
        }
    }

    #[test]
    fn non_power_of_two_lengths_use_the_direct_path() {
        let plan = FftPlan::new(6);
        assert_eq!(plan.strategy, super::Strategy::Direct);
        let mut line = vec![Complex64::ZERO; 6];
        line[0] = Complex64::ONE;
        plan.forward(&mut line);
        for value in line {
            assert!((value - Complex64::ONE).norm() < 1.0e-12);
        }
    }

    #[test]
    fn parseval_holds_for_the_forward_transform() {
        let n = 64;
        let plan = FftPlan::new(n);
        let mut line = wobbly_line(n);
        let time_energy: f64 = line.iter().map(|v| v.norm_sqr()).sum();
        plan.forward(&mut line);
        let freq_energy: f64 = line.iter().map(|v| v.norm_sqr()).sum::<f64>() / n as f64;
        assert!((time_energy - freq_energy).abs() < 1.0e-8 * time_energy);
    }

    #[test]
    fn three_dimensional_impulse_transforms_to_ones() {
        let n = 4;
        let plan = FftPlan::new(n);
        let mut field = Array3::from_elem((n, n, n), Complex64::ZERO);
        field[[0, 0, 0]] = Complex64::ONE;
        forward_3d(&mut field, &plan);
        for value in field.iter() {
            assert!((value - Complex64::ONE).norm() < 1.0e-12);
        }
    }
}

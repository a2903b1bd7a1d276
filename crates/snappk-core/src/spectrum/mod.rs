//! FFT power-spectrum estimation on overdensity fields.
//!
//! Auto- and cross-spectra are accumulated on spherical shells one
//! fundamental mode wide, as Legendre multipoles (monopole, quadrupole,
//! hexadecapole) about a chosen line-of-sight axis. Amplitudes are
//! compensated for the mass-assignment window before binning.

use crate::domain::{PkError, PkResult};
use crate::numerics::fft::{FftPlan, forward_3d};
use ndarray::Array3;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Mass-assignment scheme tag; fixes the order of the sinc window the
/// estimator compensates for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MassAssignment {
    NearestGridPoint,
    CloudInCell,
    TriangularShapedCloud,
}

impl MassAssignment {
    pub const fn window_order(self) -> i32 {
        match self {
            Self::NearestGridPoint => 1,
            Self::CloudInCell => 2,
            Self::TriangularShapedCloud => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NearestGridPoint => "NGP",
            Self::CloudInCell => "CIC",
            Self::TriangularShapedCloud => "TSC",
        }
    }
}

/// Binned auto-spectrum multipoles: one row per wavenumber shell, in
/// strictly increasing k.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSpectrum {
    pub k: Vec<f64>,
    pub monopole: Vec<f64>,
    pub quadrupole: Vec<f64>,
    pub hexadecapole: Vec<f64>,
    pub modes: Vec<u64>,
}

impl PowerSpectrum {
    pub fn bins(&self) -> usize {
        self.k.len()
    }
}

/// Cross-spectrum of a field pair plus both auto-spectra, on shared
/// shells and mode counts.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossSpectrum {
    pub k: Vec<f64>,
    pub cross: Multipoles,
    pub auto1: Multipoles,
    pub auto2: Multipoles,
    pub modes: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Multipoles {
    pub monopole: Vec<f64>,
    pub quadrupole: Vec<f64>,
    pub hexadecapole: Vec<f64>,
}

impl CrossSpectrum {
    pub fn bins(&self) -> usize {
        self.k.len()
    }

    pub fn cross_spectrum(&self) -> PowerSpectrum {
        self.tabulate(&self.cross)
    }

    pub fn first_auto(&self) -> PowerSpectrum {
        self.tabulate(&self.auto1)
    }

    pub fn second_auto(&self) -> PowerSpectrum {
        self.tabulate(&self.auto2)
    }

    fn tabulate(&self, set: &Multipoles) -> PowerSpectrum {
        PowerSpectrum {
            k: self.k.clone(),
            monopole: set.monopole.clone(),
            quadrupole: set.quadrupole.clone(),
            hexadecapole: set.hexadecapole.clone(),
            modes: self.modes.clone(),
        }
    }
}

/// Auto power spectrum of one overdensity field.
///
/// `axis` is the line of sight for the multipole decomposition, `scheme`
/// the assignment window to compensate (None leaves amplitudes as they
/// are), `workers` the rayon pool size for the transform (0 uses the
/// global pool). Blocks until the estimate is complete.
pub fn estimate_pk(
    delta: &Array3<f64>,
    box_size: f64,
    axis: usize,
    scheme: Option<MassAssignment>,
    workers: usize,
) -> PkResult<PowerSpectrum> {
    let dims = validate_field(delta)?;
    validate_axis(axis)?;

    let shells = with_pool(workers, || {
        let mut modes = complex_field(delta);
        forward_3d(&mut modes, &FftPlan::new(dims));
        accumulate_auto(&modes, dims, axis, scheme)
    })?;

    Ok(finalize_auto(shells, dims, box_size))
}

/// Cross spectrum of a field pair plus both auto-spectra. Exactly
/// symmetric under swapping the two fields (the autos swap roles).
pub fn estimate_xpk(
    delta1: &Array3<f64>,
    delta2: &Array3<f64>,
    box_size: f64,
    axis: usize,
    scheme1: Option<MassAssignment>,
    scheme2: Option<MassAssignment>,
    workers: usize,
) -> PkResult<CrossSpectrum> {
    let dims = validate_field(delta1)?;
    let dims2 = validate_field(delta2)?;
    if dims != dims2 {
        return Err(PkError::EstimatorInput {
            reason: format!("paired fields have different resolutions ({dims} vs {dims2})"),
        });
    }
    validate_axis(axis)?;

    let shells = with_pool(workers, || {
        let plan = FftPlan::new(dims);
        let mut modes1 = complex_field(delta1);
        forward_3d(&mut modes1, &plan);
        let mut modes2 = complex_field(delta2);
        forward_3d(&mut modes2, &plan);
        accumulate_cross(&modes1, &modes2, dims, axis, scheme1, scheme2)
    })?;

    Ok(finalize_cross(shells, dims, box_size))
}

fn validate_field(delta: &Array3<f64>) -> PkResult<usize> {
    let shape = delta.shape();
    if shape[0] != shape[1] || shape[0] != shape[2] {
        return Err(PkError::EstimatorInput {
            reason: format!(
                "density field must be cubic, got {}x{}x{}",
                shape[0], shape[1], shape[2]
            ),
        });
    }
    if shape[0] < 2 {
        return Err(PkError::EstimatorInput {
            reason: format!("density field needs at least 2 cells per side, got {}", shape[0]),
        });
    }
    Ok(shape[0])
}

fn validate_axis(axis: usize) -> PkResult<()> {
    if axis > 2 {
        return Err(PkError::EstimatorInput {
            reason: format!("line-of-sight axis must be 0, 1 or 2, got {axis}"),
        });
    }
    Ok(())
}

fn with_pool<T: Send>(workers: usize, task: impl FnOnce() -> T + Send) -> PkResult<T> {
    if workers == 0 {
        return Ok(task());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|source| PkError::EstimatorInput {
            reason: format!("failed to build a {workers}-thread pool: {source}"),
        })?;
    Ok(pool.install(task))
}

fn complex_field(delta: &Array3<f64>) -> Array3<Complex64> {
    delta.mapv(|value| Complex64::new(value, 0.0))
}

/// Per-shell accumulators. Slot layout: auto spectra use [P0, P2, P4];
/// cross runs use [cross P0, P2, P4, auto1 P0, P2, P4, auto2 P0, P2, P4].
#[derive(Debug, Clone)]
struct ShellAccumulator<const SLOTS: usize> {
    k_sum: f64,
    count: u64,
    sums: [f64; SLOTS],
}

impl<const SLOTS: usize> ShellAccumulator<SLOTS> {
    fn empty() -> Self {
        Self {
            k_sum: 0.0,
            count: 0,
            sums: [0.0; SLOTS],
        }
    }
}

fn shell_count(dims: usize) -> usize {
    // Shells reach the corner of the Fourier cube at sqrt(3) * dims/2.
    (3.0_f64.sqrt() * dims as f64 / 2.0).floor() as usize + 2
}

const fn signed_frequency(index: usize, dims: usize) -> i64 {
    if index <= dims / 2 {
        index as i64
    } else {
        index as i64 - dims as i64
    }
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1.0e-12 { 1.0 } else { x.sin() / x }
}

/// Inverse assignment window at one mode; amplitudes are multiplied by
/// this before accumulation.
fn compensation(frequencies: [i64; 3], dims: usize, scheme: Option<MassAssignment>) -> f64 {
    let Some(scheme) = scheme else {
        return 1.0;
    };
    let order = scheme.window_order();
    let mut window = 1.0;
    for frequency in frequencies {
        window *= sinc(PI * frequency as f64 / dims as f64).powi(order);
    }
    1.0 / window
}

fn legendre_2(mu: f64) -> f64 {
    0.5 * (3.0 * mu * mu - 1.0)
}

fn legendre_4(mu: f64) -> f64 {
    let mu2 = mu * mu;
    (35.0 * mu2 * mu2 - 30.0 * mu2 + 3.0) / 8.0
}

/// Serial sweep over the full mode cube; deterministic accumulation
/// order so paired estimates reproduce identical sums.
fn accumulate_auto(
    modes: &Array3<Complex64>,
    dims: usize,
    axis: usize,
    scheme: Option<MassAssignment>,
) -> Vec<ShellAccumulator<3>> {
    let mut shells = vec![ShellAccumulator::empty(); shell_count(dims)];
    sweep_modes(dims, axis, |indices, frequencies, shell, magnitude, mu| {
        let correction = compensation(frequencies, dims, scheme);
        let amplitude = modes[indices] * correction;
        let power = amplitude.norm_sqr();
        let bin = &mut shells[shell];
        bin.k_sum += magnitude;
        bin.count += 1;
        bin.sums[0] += power;
        bin.sums[1] += power * legendre_2(mu);
        bin.sums[2] += power * legendre_4(mu);
    });
    shells
}

fn accumulate_cross(
    modes1: &Array3<Complex64>,
    modes2: &Array3<Complex64>,
    dims: usize,
    axis: usize,
    scheme1: Option<MassAssignment>,
    scheme2: Option<MassAssignment>,
) -> Vec<ShellAccumulator<9>> {
    let mut shells = vec![ShellAccumulator::empty(); shell_count(dims)];
    sweep_modes(dims, axis, |indices, frequencies, shell, magnitude, mu| {
        let first = modes1[indices] * compensation(frequencies, dims, scheme1);
        let second = modes2[indices] * compensation(frequencies, dims, scheme2);
        let cross = first.re * second.re + first.im * second.im;
        let auto1 = first.norm_sqr();
        let auto2 = second.norm_sqr();

        let bin = &mut shells[shell];
        bin.k_sum += magnitude;
        bin.count += 1;
        let l2 = legendre_2(mu);
        let l4 = legendre_4(mu);
        bin.sums[0] += cross;
        bin.sums[1] += cross * l2;
        bin.sums[2] += cross * l4;
        bin.sums[3] += auto1;
        bin.sums[4] += auto1 * l2;
        bin.sums[5] += auto1 * l4;
        bin.sums[6] += auto2;
        bin.sums[7] += auto2 * l2;
        bin.sums[8] += auto2 * l4;
    });
    shells
}

fn sweep_modes(
    dims: usize,
    axis: usize,
    mut visit: impl FnMut([usize; 3], [i64; 3], usize, f64, f64),
) {
    for ix in 0..dims {
        let fx = signed_frequency(ix, dims);
        for iy in 0..dims {
            let fy = signed_frequency(iy, dims);
            for iz in 0..dims {
                let fz = signed_frequency(iz, dims);
                if fx == 0 && fy == 0 && fz == 0 {
                    continue;
                }
                let frequencies = [fx, fy, fz];
                let magnitude =
                    ((fx * fx + fy * fy + fz * fz) as f64).sqrt();
                let shell = (magnitude + 0.5) as usize;
                let mu = frequencies[axis] as f64 / magnitude;
                visit([ix, iy, iz], frequencies, shell, magnitude, mu);
            }
        }
    }
}

fn finalize_auto(
    shells: Vec<ShellAccumulator<3>>,
    dims: usize,
    box_size: f64,
) -> PowerSpectrum {
    let fundamental = 2.0 * PI / box_size;
    let norm = spectrum_norm(dims, box_size);

    let mut spectrum = PowerSpectrum {
        k: Vec::new(),
        monopole: Vec::new(),
        quadrupole: Vec::new(),
        hexadecapole: Vec::new(),
        modes: Vec::new(),
    };
    for shell in shells {
        if shell.count == 0 {
            continue;
        }
        let count = shell.count as f64;
        spectrum.k.push(fundamental * shell.k_sum / count);
        spectrum.monopole.push(norm * shell.sums[0] / count);
        spectrum.quadrupole.push(5.0 * norm * shell.sums[1] / count);
        spectrum.hexadecapole.push(9.0 * norm * shell.sums[2] / count);
        spectrum.modes.push(shell.count);
    }
    spectrum
}

fn finalize_cross(
    shells: Vec<ShellAccumulator<9>>,
    dims: usize,
    box_size: f64,
) -> CrossSpectrum {
    let fundamental = 2.0 * PI / box_size;
    let norm = spectrum_norm(dims, box_size);

    let mut k = Vec::new();
    let mut modes = Vec::new();
    let mut sets = [(); 3].map(|()| Multipoles {
        monopole: Vec::new(),
        quadrupole: Vec::new(),
        hexadecapole: Vec::new(),
    });
    for shell in shells {
        if shell.count == 0 {
            continue;
        }
        let count = shell.count as f64;
        k.push(fundamental * shell.k_sum / count);
        modes.push(shell.count);
        for (set, base) in sets.iter_mut().zip([0_usize, 3, 6]) {
            set.monopole.push(norm * shell.sums[base] / count);
            set.quadrupole.push(5.0 * norm * shell.sums[base + 1] / count);
            set.hexadecapole.push(9.0 * norm * shell.sums[base + 2] / count);
        }
    }

    let [cross, auto1, auto2] = sets;
    CrossSpectrum {
        k,
        cross,
        auto1,
        auto2,
        modes,
    }
}

/// `L^3 / dims^6`: unnormalized-FFT amplitudes to physical power, such
/// that a Poisson field of N particles has monopole ~ L^3 / N.
fn spectrum_norm(dims: usize, box_size: f64) -> f64 {
    let cells = (dims * dims * dims) as f64;
    box_size.powi(3) / (cells * cells)
}

#[cfg(test)]
mod tests {
    use super::{MassAssignment, estimate_pk, estimate_xpk};
    use crate::domain::PkError;
    use ndarray::Array3;
    use std::f64::consts::PI;

    const BOX: f64 = 100.0;

    fn plane_wave(dims: usize, mode: usize) -> Array3<f64> {
        Array3::from_shape_fn((dims, dims, dims), |(ix, _, _)| {
            2.0 * (2.0 * PI * (mode * ix) as f64 / dims as f64).cos()
        })
    }

    fn lumpy_field(dims: usize, seed: f64) -> Array3<f64> {
        let mut field = Array3::from_shape_fn((dims, dims, dims), |(ix, iy, iz)| {
            let t = (ix * 61 + iy * 17 + iz * 5) as f64 + seed;
            (t * 0.37).sin() + 0.5 * (t * 0.11).cos()
        });
        let mean = field.mean().expect("field is non-empty");
        field.mapv_inplace(|value| value - mean);
        field
    }

    fn loudest_bin(monopole: &[f64]) -> usize {
        let mut loudest = 0;
        for (bin, &power) in monopole.iter().enumerate() {
            if power > monopole[loudest] {
                loudest = bin;
            }
        }
        loudest
    }

    #[test]
    fn plane_wave_power_lands_in_its_shell() {
        let dims = 16;
        let spectrum = estimate_pk(&plane_wave(dims, 3), BOX, 2, None, 0)
            .expect("estimate should succeed");

        // The +/- carrier pair contributes power L^3 each; the shell
        // average spreads it over every mode in the shell.
        let shell = loudest_bin(&spectrum.monopole);
        let fundamental = 2.0 * PI / BOX;
        assert!((spectrum.k[shell] / fundamental - 3.0).abs() < 0.5);

        let count = spectrum.modes[shell] as f64;
        let expected = 2.0 * BOX.powi(3) / count;
        assert!(
            (spectrum.monopole[shell] - expected).abs() < 1.0e-6 * expected,
            "monopole was {}, expected {expected}",
            spectrum.monopole[shell]
        );

        for (bin, &power) in spectrum.monopole.iter().enumerate() {
            if bin != shell {
                assert!(power.abs() < 1.0e-6, "leakage into bin {bin}: {power}");
            }
        }
    }

    #[test]
    fn transverse_wave_has_negative_quadrupole() {
        let dims = 16;
        // Wave along x, line of sight along z: mu = 0 at the carriers,
        // so the quadrupole picks up the full L2(0) = -1/2 weight.
        let spectrum = estimate_pk(&plane_wave(dims, 3), BOX, 2, None, 0)
            .expect("estimate should succeed");
        let shell = loudest_bin(&spectrum.monopole);
        let expected = -2.5 * spectrum.monopole[shell];
        assert!(
            (spectrum.quadrupole[shell] - expected).abs()
                < 1.0e-6 * expected.abs(),
            "quadrupole was {}, expected {expected}",
            spectrum.quadrupole[shell]
        );
    }

    #[test]
    fn wavenumbers_increase_strictly() {
        let spectrum = estimate_pk(&lumpy_field(12, 0.0), BOX, 0, Some(MassAssignment::CloudInCell), 0)
            .expect("estimate should succeed");
        assert!(spectrum.bins() > 3);
        for pair in spectrum.k.windows(2) {
            assert!(pair[0] < pair[1], "k bins must increase: {pair:?}");
        }
        assert_eq!(spectrum.k.len(), spectrum.monopole.len());
        assert_eq!(spectrum.k.len(), spectrum.modes.len());
    }

    #[test]
    fn uniform_field_has_no_power() {
        let delta = Array3::zeros((8, 8, 8));
        let spectrum =
            estimate_pk(&delta, BOX, 0, None, 0).expect("estimate should succeed");
        assert!(spectrum.monopole.iter().all(|&power| power.abs() < 1.0e-15));
    }

    #[test]
    fn cross_of_a_field_with_itself_matches_its_auto_spectrum() {
        let field = lumpy_field(8, 1.0);
        let auto = estimate_pk(&field, BOX, 1, Some(MassAssignment::CloudInCell), 0)
            .expect("auto estimate should succeed");
        let paired = estimate_xpk(
            &field,
            &field,
            BOX,
            1,
            Some(MassAssignment::CloudInCell),
            Some(MassAssignment::CloudInCell),
            0,
        )
        .expect("paired estimate should succeed");

        assert_eq!(auto.k, paired.k);
        assert_eq!(auto.modes, paired.modes);
        for (a, c) in auto.monopole.iter().zip(&paired.cross.monopole) {
            assert!((a - c).abs() <= 1.0e-12 * a.abs().max(1.0));
        }
    }

    #[test]
    fn paired_estimation_is_symmetric_in_the_field_order() {
        let first = lumpy_field(8, 1.0);
        let second = lumpy_field(8, 4.5);
        let forward = estimate_xpk(&first, &second, BOX, 2, None, None, 0)
            .expect("forward order should succeed");
        let reversed = estimate_xpk(&second, &first, BOX, 2, None, None, 0)
            .expect("reversed order should succeed");

        assert_eq!(forward.cross.monopole, reversed.cross.monopole);
        assert_eq!(forward.cross.quadrupole, reversed.cross.quadrupole);
        assert_eq!(forward.auto1.monopole, reversed.auto2.monopole);
        assert_eq!(forward.auto2.monopole, reversed.auto1.monopole);
        assert_eq!(forward.modes, reversed.modes);
    }

    #[test]
    fn worker_pool_does_not_change_the_result() {
        let field = lumpy_field(8, 2.0);
        let serial = estimate_pk(&field, BOX, 0, None, 0).expect("serial estimate");
        let pooled = estimate_pk(&field, BOX, 0, None, 2).expect("pooled estimate");
        assert_eq!(serial.monopole, pooled.monopole);
    }

    #[test]
    fn non_cubic_fields_are_rejected() {
        let delta = Array3::zeros((8, 8, 4));
        let error = estimate_pk(&delta, BOX, 0, None, 0).expect_err("non-cubic should fail");
        assert!(matches!(error, PkError::EstimatorInput { .. }));
    }

    #[test]
    fn paired_fields_must_share_a_resolution() {
        let a = Array3::zeros((8, 8, 8));
        let b = Array3::zeros((4, 4, 4));
        let error = estimate_xpk(&a, &b, BOX, 0, None, None, 0)
            .expect_err("resolution mismatch should fail");
        assert!(matches!(error, PkError::EstimatorInput { .. }));
    }

    #[test]
    fn out_of_range_axis_is_rejected() {
        let delta = Array3::zeros((4, 4, 4));
        let error = estimate_pk(&delta, BOX, 3, None, 0).expect_err("axis 3 should fail");
        assert!(matches!(error, PkError::EstimatorInput { .. }));
    }
}

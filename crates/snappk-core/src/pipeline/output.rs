//! Spectrum artifact naming and text serialization.

use crate::domain::{PkError, PkResult, SpaceMode};
use crate::spectrum::PowerSpectrum;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Output file name for a species (or pair, or combined) label:
/// `Pk_CDM_z=0.000.dat`, or `Pk_GAS_RS_axis=2_z=1.000.dat` in redshift
/// space. The redshift tag keeps three decimals.
pub fn spectrum_file_name(label: &str, space: SpaceMode, redshift: f64) -> String {
    match space {
        SpaceMode::Real => format!("Pk_{label}_z={redshift:.3}.dat"),
        SpaceMode::Redshift { axis } => {
            format!("Pk_{label}_RS_axis={axis}_z={redshift:.3}.dat")
        }
    }
}

/// Shortest-round-trip scientific rendering, right-aligned.
pub fn format_scientific_f64(value: f64, width: usize) -> String {
    format!("{value:>width$e}")
}

/// Writes one row per wavenumber bin with five whitespace-separated
/// columns: k, monopole, quadrupole, hexadecapole, mode count. Floats use
/// the shortest representation that parses back to the same bits.
pub fn write_spectrum_table(path: &Path, spectrum: &PowerSpectrum) -> PkResult<()> {
    let mut content = String::new();
    for bin in 0..spectrum.bins() {
        let _ = writeln!(
            content,
            "{} {} {} {} {:>10}",
            format_scientific_f64(spectrum.k[bin], 24),
            format_scientific_f64(spectrum.monopole[bin], 24),
            format_scientific_f64(spectrum.quadrupole[bin], 24),
            format_scientific_f64(spectrum.hexadecapole[bin], 24),
            spectrum.modes[bin],
        );
    }
    fs::write(path, content).map_err(|source| PkError::io("write spectrum table to", path, source))
}

/// Parses a table written by [`write_spectrum_table`] back into memory.
pub fn read_spectrum_table(path: &Path) -> PkResult<PowerSpectrum> {
    let content = fs::read_to_string(path)
        .map_err(|source| PkError::io("read spectrum table from", path, source))?;

    let mut spectrum = PowerSpectrum {
        k: Vec::new(),
        monopole: Vec::new(),
        quadrupole: Vec::new(),
        hexadecapole: Vec::new(),
        modes: Vec::new(),
    };
    for (line_number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(PkError::TableFormat {
                path: path.to_path_buf(),
                reason: format!(
                    "line {} has {} columns, expected 5",
                    line_number + 1,
                    fields.len()
                ),
            });
        }
        let float = |column: usize| -> PkResult<f64> {
            fields[column].parse().map_err(|_| PkError::TableFormat {
                path: path.to_path_buf(),
                reason: format!(
                    "line {} column {} is not a float: '{}'",
                    line_number + 1,
                    column + 1,
                    fields[column]
                ),
            })
        };
        spectrum.k.push(float(0)?);
        spectrum.monopole.push(float(1)?);
        spectrum.quadrupole.push(float(2)?);
        spectrum.hexadecapole.push(float(3)?);
        spectrum
            .modes
            .push(fields[4].parse().map_err(|_| PkError::TableFormat {
                path: path.to_path_buf(),
                reason: format!(
                    "line {} mode count is not an integer: '{}'",
                    line_number + 1,
                    fields[4]
                ),
            })?);
    }
    Ok(spectrum)
}

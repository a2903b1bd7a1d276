//! The pipeline driver: snapshot plus species list in, spectrum files out.

mod output;

pub use output::{
    format_scientific_f64, read_spectrum_table, spectrum_file_name, write_spectrum_table,
};

use crate::common::cosmology::density_parameter;
use crate::domain::{PkArtifact, PkError, PkRequest, PkResult, SpaceMode, Species};
use crate::grid::DensityGrid;
use crate::rsd::apply_redshift_space;
use crate::snapshot::SnapshotReader;
use crate::spectrum::{MassAssignment, PowerSpectrum, estimate_pk, estimate_xpk};
use ndarray::Array3;
use std::collections::BTreeSet;
use std::fs;
use tracing::{info, warn};

/// The pipeline always deposits with cloud-in-cell.
const SCHEME: MassAssignment = MassAssignment::CloudInCell;

/// Relative Ω mismatch between the per-component sum and the header value
/// that triggers a (non-fatal) warning.
const OMEGA_MISMATCH_WARN: f64 = 0.01;

/// Computes and writes the spectrum of a single species selector.
pub fn species_spectrum(request: &PkRequest, species: Species) -> PkResult<PkArtifact> {
    let reader = SnapshotReader::open(&request.snapshot)?;
    single_spectrum(request, &reader, species)
}

/// Computes auto-, cross- and combined spectra for a species list.
///
/// A single-element list delegates to [`species_spectrum`] and produces
/// byte-identical output. Longer lists must name distinct concrete
/// species; every unordered pair yields a pair file plus two auto files,
/// and the Ω-weighted combination of all requested species yields one
/// final `+`-joined file.
pub fn species_spectra(request: &PkRequest, selections: &[Species]) -> PkResult<Vec<PkArtifact>> {
    match selections {
        [] => Err(PkError::InvalidSpecies {
            selector: "(empty species list)".to_string(),
        }),
        [single] => Ok(vec![species_spectrum(request, *single)?]),
        _ => multi_spectra(request, selections),
    }
}

fn single_spectrum(
    request: &PkRequest,
    reader: &SnapshotReader,
    species: Species,
) -> PkResult<PkArtifact> {
    let header = reader.header();
    let box_size = header.box_size_mpc();
    info!(
        species = species.label(),
        dims = request.dims,
        box_size,
        redshift = header.redshift,
        "computing power spectrum"
    );

    let delta = load_overdensity(request, reader, species)?;
    let spectrum = estimate_pk(
        &delta,
        box_size,
        request.space.estimator_axis(),
        Some(SCHEME),
        request.workers,
    )?;
    drop(delta);

    write_artifact(request, header.redshift, species.label(), &spectrum)
}

fn multi_spectra(request: &PkRequest, selections: &[Species]) -> PkResult<Vec<PkArtifact>> {
    validate_selections(selections)?;

    let reader = SnapshotReader::open(&request.snapshot)?;
    let header = reader.header().clone();
    let box_size = header.box_size_mpc();
    let axis = request.space.estimator_axis();

    // Component census against the header, diagnostic only.
    let mut omega_sum = 0.0;
    let mut overdensities = SpeciesOverdensities::new();
    for component in Species::COMPONENTS {
        let omega = density_parameter(reader.total_mass(component)?, box_size);
        info!(component = component.label(), omega, "density parameter");
        omega_sum += omega;
        if selections.contains(&component) {
            overdensities.set_weight(component, omega);
        }
    }
    info!(
        omega_components = omega_sum,
        omega_header = header.omega_m,
        "density parameter cross-check"
    );
    if header.omega_m > 0.0
        && ((omega_sum - header.omega_m) / header.omega_m).abs() > OMEGA_MISMATCH_WARN
    {
        warn!(
            omega_components = omega_sum,
            omega_header = header.omega_m,
            "component densities disagree with the snapshot header"
        );
    }

    // One overdensity grid per species; particle arrays are dropped as
    // soon as their grid is deposited.
    for &species in selections {
        let delta = load_overdensity(request, &reader, species)?;
        overdensities.set_field(species, delta);
    }

    let mut artifacts = Vec::new();
    for (index, &first) in selections.iter().enumerate() {
        for &second in &selections[index + 1..] {
            let pair_label =
                Species::pair_label(first, second).ok_or_else(|| PkError::InvalidSpecies {
                    selector: format!("{first}+{second}"),
                })?;
            info!(
                first = first.label(),
                second = second.label(),
                "computing auto- and cross-power spectra"
            );

            let paired = estimate_xpk(
                overdensities.field(first)?,
                overdensities.field(second)?,
                box_size,
                axis,
                Some(SCHEME),
                Some(SCHEME),
                request.workers,
            )?;

            // The auto files are rewritten for every pair the species
            // appears in; the content is identical each time.
            artifacts.push(write_artifact(
                request,
                header.redshift,
                pair_label,
                &paired.cross_spectrum(),
            )?);
            artifacts.push(write_artifact(
                request,
                header.redshift,
                first.label(),
                &paired.first_auto(),
            )?);
            artifacts.push(write_artifact(
                request,
                header.redshift,
                second.label(),
                &paired.second_auto(),
            )?);
        }
    }

    let combined_label = selections
        .iter()
        .map(|species| species.label())
        .collect::<Vec<_>>()
        .join("+");
    info!(label = combined_label.as_str(), "computing combined matter spectrum");
    let combined = overdensities.combined()?;
    let spectrum = estimate_pk(&combined, box_size, axis, Some(SCHEME), request.workers)?;
    artifacts.push(write_artifact(
        request,
        header.redshift,
        &combined_label,
        &spectrum,
    )?);

    Ok(artifacts)
}

fn validate_selections(selections: &[Species]) -> PkResult<()> {
    let mut seen = BTreeSet::new();
    for &species in selections {
        if species == Species::Matter {
            return Err(PkError::InvalidSpecies {
                selector: "matter (the aggregate cannot join a multi-species list)".to_string(),
            });
        }
        if !seen.insert(species) {
            return Err(PkError::InvalidSpecies {
                selector: format!("{species} (listed twice)"),
            });
        }
    }
    Ok(())
}

/// Positions for one selector, moved to redshift space when requested.
/// Velocities are loaded only for the transform and dropped right after.
fn load_positions(
    request: &PkRequest,
    reader: &SnapshotReader,
    species: Species,
) -> PkResult<Vec<[f32; 3]>> {
    let mut positions = reader.positions(species)?;
    if let SpaceMode::Redshift { axis } = request.space {
        let velocities = reader.velocities(species)?;
        let header = reader.header();
        apply_redshift_space(
            &mut positions,
            &velocities,
            header.box_size_mpc(),
            header.hubble_rate(),
            header.redshift,
            axis,
        )?;
    }
    Ok(positions)
}

/// Deposits one selector onto a fresh grid and normalizes to a density
/// contrast. The all-matter aggregate deposits mass-weighted; single
/// species deposit plain counts (uniform mass within a species).
fn load_overdensity(
    request: &PkRequest,
    reader: &SnapshotReader,
    species: Species,
) -> PkResult<Array3<f64>> {
    let header = reader.header();
    let positions = load_positions(request, reader, species)?;
    let mut grid = DensityGrid::zeros(request.dims, header.box_size_mpc());
    let cells = (request.dims * request.dims * request.dims) as f64;

    let mean = if species == Species::Matter {
        let masses = if request.hydro {
            reader.masses(Species::Matter)?
        } else {
            reader.table_masses(Species::Matter)?
        };
        grid.deposit_weighted(&positions, &masses)?;
        let total: f64 = masses.iter().map(|&mass| f64::from(mass)).sum();
        total / cells
    } else {
        grid.deposit(&positions);
        positions.len() as f64 / cells
    };
    drop(positions);

    grid.into_overdensity(mean)
}

fn write_artifact(
    request: &PkRequest,
    redshift: f64,
    label: &str,
    spectrum: &PowerSpectrum,
) -> PkResult<PkArtifact> {
    fs::create_dir_all(&request.output_dir)
        .map_err(|source| PkError::io("create output directory", &request.output_dir, source))?;

    let file_name = spectrum_file_name(label, request.space, redshift);
    let path = request.output_dir.join(&file_name);
    write_spectrum_table(&path, spectrum)?;
    info!(file = file_name.as_str(), bins = spectrum.bins(), "wrote spectrum");

    Ok(PkArtifact {
        relative_path: file_name.into(),
        species_label: label.to_string(),
        bins: spectrum.bins(),
    })
}

/// Per-species overdensity grids plus their Ω weights, accumulated before
/// the pairwise and combined steps. The explicit [`Self::combined`]
/// finalize step consumes the map.
#[derive(Debug, Default)]
pub struct SpeciesOverdensities {
    entries: Vec<(Species, f64, Option<Array3<f64>>)>,
}

impl SpeciesOverdensities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_weight(&mut self, species: Species, omega: f64) {
        match self.entry_mut(species) {
            Some(entry) => entry.1 = omega,
            None => self.entries.push((species, omega, None)),
        }
    }

    pub fn set_field(&mut self, species: Species, field: Array3<f64>) {
        match self.entry_mut(species) {
            Some(entry) => entry.2 = Some(field),
            None => self.entries.push((species, 0.0, Some(field))),
        }
    }

    pub fn field(&self, species: Species) -> PkResult<&Array3<f64>> {
        self.entries
            .iter()
            .find(|entry| entry.0 == species)
            .and_then(|entry| entry.2.as_ref())
            .ok_or_else(|| PkError::EstimatorInput {
                reason: format!("no overdensity field deposited for {species}"),
            })
    }

    fn entry_mut(&mut self, species: Species) -> Option<&mut (Species, f64, Option<Array3<f64>>)> {
        self.entries.iter_mut().find(|entry| entry.0 == species)
    }

    /// Ω-weighted combination `Σ Ω_s δ_s / Σ Ω_s` over every deposited
    /// field, in insertion order. Fails before dividing when the summed
    /// weight is zero.
    pub fn combined(self) -> PkResult<Array3<f64>> {
        let omega_total: f64 = self
            .entries
            .iter()
            .filter(|entry| entry.2.is_some())
            .map(|entry| entry.1)
            .sum();
        if omega_total == 0.0 {
            return Err(PkError::DivideByZero {
                context: "combined matter field with zero total density parameter".to_string(),
            });
        }

        let mut sum: Option<Array3<f64>> = None;
        for (_, omega, field) in self.entries {
            let Some(field) = field else { continue };
            match &mut sum {
                Some(sum) => *sum += &(&field * omega),
                None => sum = Some(field * omega),
            }
        }
        let mut combined = sum.ok_or_else(|| PkError::EstimatorInput {
            reason: "no overdensity fields were deposited".to_string(),
        })?;
        combined.mapv_inplace(|value| value / omega_total);
        Ok(combined)
    }
}

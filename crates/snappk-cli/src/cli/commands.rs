use super::CliError;
use anyhow::Context;
use serde::Serialize;
use snappk_core::domain::{PkArtifact, PkRequest, PkResult, SpaceMode, Species};
use snappk_core::pipeline::species_spectra;
use snappk_core::snapshot::{SnapshotHeader, SnapshotReader};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(clap::Args)]
pub(super) struct PkArgs {
    /// Gadget format-1 snapshot file
    #[arg(long)]
    snapshot: PathBuf,

    /// Species selectors: names (gas, cdm, nu, stars, matter) or Gadget
    /// type numbers
    #[arg(long = "species", required = true, num_args = 1..)]
    species: Vec<String>,

    /// Grid cells per side; the density field has grid^3 cells
    #[arg(long)]
    grid: usize,

    /// Displace positions into redshift space along this axis before
    /// gridding
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    rsd_axis: Option<u8>,

    /// Treat the snapshot as hydrodynamic: the all-matter field reads
    /// per-particle masses instead of the header mass table
    #[arg(long)]
    hydro: bool,

    /// Estimator worker threads; 0 uses the global pool
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Directory the spectrum files are written to
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Also write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct HeaderArgs {
    /// Gadget format-1 snapshot file
    #[arg(long)]
    snapshot: PathBuf,
}

#[derive(Serialize)]
struct RunReport {
    snapshot: String,
    box_size_mpc: f64,
    redshift: f64,
    omega_m: f64,
    omega_l: f64,
    hubble: f64,
    grid: usize,
    rsd_axis: Option<u8>,
    hydro: bool,
    species: Vec<String>,
    artifacts: Vec<ReportArtifact>,
}

#[derive(Serialize)]
struct ReportArtifact {
    file: String,
    label: String,
    bins: usize,
}

pub(super) fn run_pk_command(args: PkArgs) -> Result<i32, CliError> {
    let species = args
        .species
        .iter()
        .map(|selector| Species::parse(selector))
        .collect::<PkResult<Vec<_>>>()?;

    let request = PkRequest {
        snapshot: args.snapshot.clone(),
        dims: args.grid,
        space: match args.rsd_axis {
            Some(axis) => SpaceMode::Redshift {
                axis: axis as usize,
            },
            None => SpaceMode::Real,
        },
        hydro: args.hydro,
        workers: args.threads,
        output_dir: args.output_dir.clone(),
    };

    let artifacts = species_spectra(&request, &species)?;
    for artifact in &artifacts {
        println!(
            "Wrote {} ({} bins).",
            artifact.relative_path.display(),
            artifact.bins
        );
    }
    println!(
        "Completed {} spectrum file(s) in '{}'.",
        artifacts.len(),
        args.output_dir.display()
    );

    if let Some(report_path) = &args.report {
        let header = SnapshotReader::open(&args.snapshot)?.header().clone();
        let report = build_report(&args, &species, &header, &artifacts);
        write_report(report_path, &report)?;
        println!("JSON report: {}", report_path.display());
    }

    Ok(0)
}

pub(super) fn run_header_command(args: HeaderArgs) -> Result<i32, CliError> {
    let reader = SnapshotReader::open(&args.snapshot)?;
    let header = reader.header();

    println!("Snapshot '{}'", args.snapshot.display());
    println!("  box size:  {:.3} Mpc/h", header.box_size_mpc());
    println!(
        "  redshift:  {:.4} (a = {:.6})",
        header.redshift, header.time
    );
    println!("  omega_m:   {:.4}", header.omega_m);
    println!("  omega_l:   {:.4}", header.omega_l);
    println!("  h:         {:.4}", header.hubble);
    println!("  H(z):      {:.3} km/s/(Mpc/h)", header.hubble_rate());
    println!("  files:     {}", header.num_files);
    for (slot, &count) in header.npart.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let mass = if header.mass_table[slot] > 0.0 {
            format!("{:.6e} Msun/h each", header.species_mass_msun(slot))
        } else {
            "per-particle masses".to_string()
        };
        println!("  type {slot} ({}): {count} particles, {mass}", slot_name(slot));
    }
    println!("  total particles: {}", header.total_particles());

    Ok(0)
}

fn slot_name(slot: usize) -> &'static str {
    match slot {
        0 => "gas",
        1 => "cdm",
        2 => "nu",
        4 => "stars",
        _ => "unused",
    }
}

fn build_report(
    args: &PkArgs,
    species: &[Species],
    header: &SnapshotHeader,
    artifacts: &[PkArtifact],
) -> RunReport {
    RunReport {
        snapshot: args.snapshot.display().to_string(),
        box_size_mpc: header.box_size_mpc(),
        redshift: header.redshift,
        omega_m: header.omega_m,
        omega_l: header.omega_l,
        hubble: header.hubble,
        grid: args.grid,
        rsd_axis: args.rsd_axis,
        hydro: args.hydro,
        species: species.iter().map(|s| s.label().to_string()).collect(),
        artifacts: artifacts
            .iter()
            .map(|artifact| ReportArtifact {
                file: artifact.relative_path.display().to_string(),
                label: artifact.species_label.clone(),
                bins: artifact.bins,
            })
            .collect(),
    }
}

fn write_report(path: &Path, report: &RunReport) -> Result<(), CliError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create report directory '{}'", parent.display())
        })?;
    }
    let payload =
        serde_json::to_string_pretty(report).context("failed to serialize run report")?;
    fs::write(path, payload)
        .with_context(|| format!("failed to write run report '{}'", path.display()))?;
    Ok(())
}

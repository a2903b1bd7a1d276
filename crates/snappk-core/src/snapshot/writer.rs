use super::header::SnapshotHeader;
use crate::common::constants::{
    GADGET_LENGTH_TO_MPC, GADGET_MASS_TO_MSUN, NUM_PARTICLE_TYPES,
};
use crate::domain::{PkError, PkResult, Species};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
enum SpeciesMass {
    /// Constant mass per particle, Msun/h; goes into the header table.
    Table(f64),
    /// Per-particle masses, Msun/h; emitted as a MASS block.
    PerParticle(Vec<f32>),
}

#[derive(Debug, Clone)]
struct SpeciesData {
    positions: Vec<[f32; 3]>,
    velocities: Option<Vec<[f32; 3]>>,
    mass: SpeciesMass,
}

/// Assembles a single-file format-1 Gadget snapshot.
///
/// The builder thinks in pipeline units (Mpc/h, km/s, Msun/h) and converts
/// to file units on write. Species given a constant mass land in the header
/// mass table; species given explicit mass arrays get a MASS block entry.
/// Velocities default to zero when not provided.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    box_size_mpc: f64,
    redshift: f64,
    omega_m: f64,
    omega_l: f64,
    hubble: f64,
    species: [Option<SpeciesData>; NUM_PARTICLE_TYPES],
    rejected_selector: Option<String>,
}

impl SnapshotBuilder {
    pub fn new(box_size_mpc: f64) -> Self {
        Self {
            box_size_mpc,
            redshift: 0.0,
            omega_m: 0.3,
            omega_l: 0.7,
            hubble: 0.7,
            species: [const { None }; NUM_PARTICLE_TYPES],
            rejected_selector: None,
        }
    }

    pub fn redshift(mut self, redshift: f64) -> Self {
        self.redshift = redshift;
        self
    }

    pub fn cosmology(mut self, omega_m: f64, omega_l: f64, hubble: f64) -> Self {
        self.omega_m = omega_m;
        self.omega_l = omega_l;
        self.hubble = hubble;
        self
    }

    /// Adds a species whose particles share one mass (Msun/h).
    pub fn species_with_table_mass(
        mut self,
        species: Species,
        positions: Vec<[f32; 3]>,
        mass_msun: f64,
    ) -> Self {
        match species.type_index() {
            Some(slot) => {
                self.species[slot] = Some(SpeciesData {
                    positions,
                    velocities: None,
                    mass: SpeciesMass::Table(mass_msun),
                });
            }
            None => self.reject(species),
        }
        self
    }

    /// Adds a species with per-particle masses (Msun/h).
    pub fn species_with_particle_masses(
        mut self,
        species: Species,
        positions: Vec<[f32; 3]>,
        masses_msun: Vec<f32>,
    ) -> Self {
        match species.type_index() {
            Some(slot) => {
                self.species[slot] = Some(SpeciesData {
                    positions,
                    velocities: None,
                    mass: SpeciesMass::PerParticle(masses_msun),
                });
            }
            None => self.reject(species),
        }
        self
    }

    /// Peculiar velocities in km/s for an already added species.
    pub fn velocities(mut self, species: Species, velocities: Vec<[f32; 3]>) -> Self {
        match species.type_index() {
            Some(slot) => match self.species[slot].as_mut() {
                Some(data) => data.velocities = Some(velocities),
                None => self.rejected_selector = Some(format!(
                    "velocities for {species} given before its positions"
                )),
            },
            None => self.reject(species),
        }
        self
    }

    fn reject(&mut self, species: Species) {
        self.rejected_selector = Some(species.label().to_string());
    }

    pub fn write(&self, path: impl Into<PathBuf>) -> PkResult<SnapshotHeader> {
        let path = path.into();
        if let Some(selector) = &self.rejected_selector {
            return Err(PkError::InvalidSpecies {
                selector: selector.clone(),
            });
        }
        for (slot, data) in self.species.iter().enumerate() {
            let Some(data) = data else { continue };
            if let Some(velocities) = &data.velocities
                && velocities.len() != data.positions.len()
            {
                return Err(PkError::EstimatorInput {
                    reason: format!(
                        "slot {slot}: {} velocities for {} positions",
                        velocities.len(),
                        data.positions.len()
                    ),
                });
            }
            if let SpeciesMass::PerParticle(masses) = &data.mass
                && masses.len() != data.positions.len()
            {
                return Err(PkError::EstimatorInput {
                    reason: format!(
                        "slot {slot}: {} masses for {} positions",
                        masses.len(),
                        data.positions.len()
                    ),
                });
            }
        }

        let header = self.build_header();
        let file = File::create(&path).map_err(|source| PkError::io("create", &path, source))?;
        let mut out = BufWriter::new(file);

        write_record(&mut out, &path, &header.to_bytes())?;
        self.write_vector_block(&mut out, &path, |data| Some(&data.positions), |value| {
            value / GADGET_LENGTH_TO_MPC as f32
        })?;
        let velocity_scale = 1.0 / header.time.sqrt() as f32;
        self.write_vector_block(
            &mut out,
            &path,
            |data| data.velocities.as_deref(),
            |value| value * velocity_scale,
        )?;
        self.write_id_block(&mut out, &path)?;
        self.write_mass_block(&mut out, &path)?;

        out.flush()
            .map_err(|source| PkError::io("flush", &path, source))?;
        Ok(header)
    }

    fn build_header(&self) -> SnapshotHeader {
        let mut npart = [0_u32; NUM_PARTICLE_TYPES];
        let mut mass_table = [0.0_f64; NUM_PARTICLE_TYPES];
        for (slot, data) in self.species.iter().enumerate() {
            let Some(data) = data else { continue };
            npart[slot] = data.positions.len() as u32;
            if let SpeciesMass::Table(mass_msun) = data.mass {
                mass_table[slot] = mass_msun / GADGET_MASS_TO_MSUN;
            }
        }
        SnapshotHeader {
            npart,
            mass_table,
            time: 1.0 / (1.0 + self.redshift),
            redshift: self.redshift,
            npart_total: npart,
            num_files: 1,
            box_size: self.box_size_mpc / GADGET_LENGTH_TO_MPC,
            omega_m: self.omega_m,
            omega_l: self.omega_l,
            hubble: self.hubble,
        }
    }

    fn write_vector_block(
        &self,
        out: &mut BufWriter<File>,
        path: &Path,
        select: impl Fn(&SpeciesData) -> Option<&[[f32; 3]]>,
        scale: impl Fn(f32) -> f32,
    ) -> PkResult<()> {
        let mut payload = Vec::new();
        for data in self.species.iter().flatten() {
            match select(data) {
                Some(vectors) => {
                    for vector in vectors {
                        for &component in vector {
                            payload.extend_from_slice(&scale(component).to_le_bytes());
                        }
                    }
                }
                None => payload.extend(
                    std::iter::repeat_n(0_u8, 12 * data.positions.len()),
                ),
            }
        }
        write_record(out, path, &payload)
    }

    fn write_id_block(&self, out: &mut BufWriter<File>, path: &Path) -> PkResult<()> {
        let total: usize = self
            .species
            .iter()
            .flatten()
            .map(|data| data.positions.len())
            .sum();
        let mut payload = Vec::with_capacity(4 * total);
        for id in 1..=total as u32 {
            payload.extend_from_slice(&id.to_le_bytes());
        }
        write_record(out, path, &payload)
    }

    fn write_mass_block(&self, out: &mut BufWriter<File>, path: &Path) -> PkResult<()> {
        let mut payload = Vec::new();
        for data in self.species.iter().flatten() {
            if let SpeciesMass::PerParticle(masses) = &data.mass {
                for &mass in masses {
                    let file_mass = mass / GADGET_MASS_TO_MSUN as f32;
                    payload.extend_from_slice(&file_mass.to_le_bytes());
                }
            }
        }
        if payload.is_empty() {
            return Ok(());
        }
        write_record(out, path, &payload)
    }
}

fn write_record(out: &mut BufWriter<File>, path: &Path, payload: &[u8]) -> PkResult<()> {
    let marker = (payload.len() as u32).to_le_bytes();
    out.write_all(&marker)
        .and_then(|()| out.write_all(payload))
        .and_then(|()| out.write_all(&marker))
        .map_err(|source| PkError::io("write record to", path, source))
}

#[cfg(test)]
mod tests {
    use super::SnapshotBuilder;
    use crate::domain::{PkError, Species};
    use crate::snapshot::SnapshotReader;
    use tempfile::TempDir;

    fn cdm_positions() -> Vec<[f32; 3]> {
        vec![[1.0, 2.0, 3.0], [50.0, 60.0, 70.0], [99.0, 0.5, 12.0]]
    }

    #[test]
    fn written_snapshot_round_trips_through_the_reader() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("snap_000");

        SnapshotBuilder::new(100.0)
            .redshift(1.0)
            .cosmology(0.3, 0.7, 0.67)
            .species_with_table_mass(Species::ColdDarkMatter, cdm_positions(), 4.0e9)
            .velocities(
                Species::ColdDarkMatter,
                vec![[100.0, 0.0, 0.0], [0.0, -250.0, 0.0], [0.0, 0.0, 40.0]],
            )
            .write(&path)
            .expect("snapshot should be written");

        let reader = SnapshotReader::open(&path).expect("snapshot should open");
        let header = reader.header();
        assert_eq!(header.npart, [0, 3, 0, 0, 0, 0]);
        assert!((header.box_size_mpc() - 100.0).abs() < 1.0e-9);
        assert!((header.redshift - 1.0).abs() < 1.0e-12);
        assert!((header.time - 0.5).abs() < 1.0e-12);
        assert!((header.species_mass_msun(1) - 4.0e9).abs() < 1.0);

        let positions = reader
            .positions(Species::ColdDarkMatter)
            .expect("positions should read");
        assert_eq!(positions.len(), 3);
        assert!((positions[1][2] - 70.0).abs() < 1.0e-3);

        let velocities = reader
            .velocities(Species::ColdDarkMatter)
            .expect("velocities should read");
        assert!((velocities[1][1] - -250.0).abs() < 1.0e-2);

        let masses = reader
            .masses(Species::ColdDarkMatter)
            .expect("masses should read");
        assert_eq!(masses.len(), 3);
        assert!((masses[0] - 4.0e9).abs() < 1.0);
    }

    #[test]
    fn per_particle_masses_land_in_a_mass_block() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("snap_hydro");

        SnapshotBuilder::new(50.0)
            .species_with_particle_masses(
                Species::Gas,
                vec![[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]],
                vec![1.5e8, 2.5e8],
            )
            .species_with_table_mass(Species::Stars, vec![[3.0, 3.0, 3.0]], 1.0e8)
            .write(&path)
            .expect("snapshot should be written");

        let reader = SnapshotReader::open(&path).expect("snapshot should open");
        assert_eq!(reader.header().mass_table[0], 0.0);
        assert!(reader.header().has_mass_block());

        let gas = reader.masses(Species::Gas).expect("gas masses should read");
        assert!((gas[0] - 1.5e8).abs() < 32.0);
        assert!((gas[1] - 2.5e8).abs() < 32.0);

        let all = reader.masses(Species::Matter).expect("all masses should read");
        assert_eq!(all.len(), 3);
        assert!((all[2] - 1.0e8).abs() < 32.0);

        let total = reader
            .total_mass(Species::Matter)
            .expect("total mass should accumulate");
        assert!((total - 5.0e8).abs() < 64.0);
    }

    #[test]
    fn table_masses_reject_variable_mass_species() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("snap_var");

        SnapshotBuilder::new(50.0)
            .species_with_particle_masses(
                Species::Gas,
                vec![[1.0, 1.0, 1.0]],
                vec![1.0e8],
            )
            .write(&path)
            .expect("snapshot should be written");

        let reader = SnapshotReader::open(&path).expect("snapshot should open");
        let error = reader
            .table_masses(Species::Matter)
            .expect_err("table-only masses should fail for variable-mass gas");
        assert!(matches!(
            error,
            PkError::MissingMassData {
                species: Species::Gas
            }
        ));
    }

    #[test]
    fn aggregate_selector_cannot_define_a_species() {
        let temp = TempDir::new().expect("tempdir should be created");
        let error = SnapshotBuilder::new(50.0)
            .species_with_table_mass(Species::Matter, vec![[0.0, 0.0, 0.0]], 1.0e8)
            .write(temp.path().join("snap_bad"))
            .expect_err("matter aggregate should be rejected");
        assert!(matches!(error, PkError::InvalidSpecies { .. }));
    }

    #[test]
    fn missing_velocities_default_to_zero() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("snap_still");

        SnapshotBuilder::new(25.0)
            .species_with_table_mass(Species::ColdDarkMatter, cdm_positions(), 1.0e9)
            .write(&path)
            .expect("snapshot should be written");

        let reader = SnapshotReader::open(&path).expect("snapshot should open");
        let velocities = reader
            .velocities(Species::ColdDarkMatter)
            .expect("velocities should read");
        assert!(velocities.iter().all(|v| v == &[0.0, 0.0, 0.0]));
    }
}

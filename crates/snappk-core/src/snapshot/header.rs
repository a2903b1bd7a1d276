use crate::common::constants::{
    GADGET_LENGTH_TO_MPC, GADGET_MASS_TO_MSUN, NUM_PARTICLE_TYPES,
};
use crate::common::cosmology::hubble_rate;

/// Size of the HEAD record payload.
pub const HEADER_BYTES: usize = 256;

const NPART_OFFSET: usize = 0;
const MASS_TABLE_OFFSET: usize = 24;
const TIME_OFFSET: usize = 72;
const REDSHIFT_OFFSET: usize = 80;
const NPART_TOTAL_OFFSET: usize = 96;
const NUM_FILES_OFFSET: usize = 124;
const BOX_SIZE_OFFSET: usize = 128;
const OMEGA_M_OFFSET: usize = 136;
const OMEGA_L_OFFSET: usize = 144;
const HUBBLE_OFFSET: usize = 152;

/// Parsed Gadget snapshot header, in file units (lengths kpc/h, masses
/// 1e10 Msun/h). Read once per invocation and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotHeader {
    pub npart: [u32; NUM_PARTICLE_TYPES],
    /// Mass per particle and type; zero means the snapshot stores
    /// per-particle masses for that type in a MASS block.
    pub mass_table: [f64; NUM_PARTICLE_TYPES],
    /// Scale factor a = 1/(1+z).
    pub time: f64,
    pub redshift: f64,
    pub npart_total: [u32; NUM_PARTICLE_TYPES],
    pub num_files: i32,
    pub box_size: f64,
    pub omega_m: f64,
    pub omega_l: f64,
    pub hubble: f64,
}

impl SnapshotHeader {
    pub fn from_bytes(payload: &[u8]) -> Result<Self, String> {
        if payload.len() != HEADER_BYTES {
            return Err(format!(
                "header record is {} bytes, expected {HEADER_BYTES}",
                payload.len()
            ));
        }

        let mut npart = [0_u32; NUM_PARTICLE_TYPES];
        let mut mass_table = [0.0_f64; NUM_PARTICLE_TYPES];
        let mut npart_total = [0_u32; NUM_PARTICLE_TYPES];
        for slot in 0..NUM_PARTICLE_TYPES {
            npart[slot] = read_u32(payload, NPART_OFFSET + 4 * slot);
            mass_table[slot] = read_f64(payload, MASS_TABLE_OFFSET + 8 * slot);
            npart_total[slot] = read_u32(payload, NPART_TOTAL_OFFSET + 4 * slot);
        }

        Ok(Self {
            npart,
            mass_table,
            time: read_f64(payload, TIME_OFFSET),
            redshift: read_f64(payload, REDSHIFT_OFFSET),
            npart_total,
            num_files: read_u32(payload, NUM_FILES_OFFSET) as i32,
            box_size: read_f64(payload, BOX_SIZE_OFFSET),
            omega_m: read_f64(payload, OMEGA_M_OFFSET),
            omega_l: read_f64(payload, OMEGA_L_OFFSET),
            hubble: read_f64(payload, HUBBLE_OFFSET),
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_BYTES] {
        let mut payload = [0_u8; HEADER_BYTES];
        for slot in 0..NUM_PARTICLE_TYPES {
            write_u32(&mut payload, NPART_OFFSET + 4 * slot, self.npart[slot]);
            write_f64(
                &mut payload,
                MASS_TABLE_OFFSET + 8 * slot,
                self.mass_table[slot],
            );
            write_u32(
                &mut payload,
                NPART_TOTAL_OFFSET + 4 * slot,
                self.npart_total[slot],
            );
        }
        write_f64(&mut payload, TIME_OFFSET, self.time);
        write_f64(&mut payload, REDSHIFT_OFFSET, self.redshift);
        write_u32(&mut payload, NUM_FILES_OFFSET, self.num_files as u32);
        write_f64(&mut payload, BOX_SIZE_OFFSET, self.box_size);
        write_f64(&mut payload, OMEGA_M_OFFSET, self.omega_m);
        write_f64(&mut payload, OMEGA_L_OFFSET, self.omega_l);
        write_f64(&mut payload, HUBBLE_OFFSET, self.hubble);
        payload
    }

    /// Box side in Mpc/h.
    pub fn box_size_mpc(&self) -> f64 {
        self.box_size * GADGET_LENGTH_TO_MPC
    }

    /// Mass per particle of a type slot in Msun/h; zero when the type
    /// stores per-particle masses.
    pub fn species_mass_msun(&self, slot: usize) -> f64 {
        self.mass_table[slot] * GADGET_MASS_TO_MSUN
    }

    pub fn total_particles(&self) -> u64 {
        self.npart.iter().map(|&n| u64::from(n)).sum()
    }

    /// H(z) in km/s/(Mpc/h) from the stored density parameters.
    pub fn hubble_rate(&self) -> f64 {
        hubble_rate(self.omega_m, self.omega_l, self.redshift)
    }

    /// Whether a MASS block is present: some type has particles but no
    /// mass-table entry.
    pub fn has_mass_block(&self) -> bool {
        self.variable_mass_particles() > 0
    }

    /// Number of entries in the MASS block.
    pub fn variable_mass_particles(&self) -> u64 {
        (0..NUM_PARTICLE_TYPES)
            .filter(|&slot| self.mass_table[slot] == 0.0)
            .map(|slot| u64::from(self.npart[slot]))
            .sum()
    }
}

fn read_u32(payload: &[u8], offset: usize) -> u32 {
    let mut raw = [0_u8; 4];
    raw.copy_from_slice(&payload[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn read_f64(payload: &[u8], offset: usize) -> f64 {
    let mut raw = [0_u8; 8];
    raw.copy_from_slice(&payload[offset..offset + 8]);
    f64::from_le_bytes(raw)
}

fn write_u32(payload: &mut [u8], offset: usize, value: u32) {
    payload[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_f64(payload: &mut [u8], offset: usize, value: f64) {
    payload[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::{HEADER_BYTES, SnapshotHeader};

    fn sample_header() -> SnapshotHeader {
        SnapshotHeader {
            npart: [8, 64, 0, 0, 4, 0],
            mass_table: [0.0, 0.05, 0.0, 0.0, 0.002, 0.0],
            time: 0.5,
            redshift: 1.0,
            npart_total: [8, 64, 0, 0, 4, 0],
            num_files: 1,
            box_size: 100_000.0,
            omega_m: 0.3,
            omega_l: 0.7,
            hubble: 0.67,
        }
    }

    #[test]
    fn byte_round_trip_preserves_every_field() {
        let header = sample_header();
        let payload = header.to_bytes();
        let parsed = SnapshotHeader::from_bytes(&payload).expect("payload should parse");
        assert_eq!(parsed, header);
    }

    #[test]
    fn short_payload_is_rejected() {
        let error = SnapshotHeader::from_bytes(&[0_u8; HEADER_BYTES - 1])
            .expect_err("short payload should fail");
        assert!(error.contains("255"));
    }

    #[test]
    fn accessors_convert_to_pipeline_units() {
        let header = sample_header();
        assert!((header.box_size_mpc() - 100.0).abs() < 1.0e-12);
        assert!((header.species_mass_msun(1) - 5.0e8).abs() < 1.0e-3);
        assert_eq!(header.total_particles(), 76);
    }

    #[test]
    fn mass_block_bookkeeping_counts_variable_mass_types() {
        let header = sample_header();
        // Gas has particles but no table entry; slots 2, 3 and 5 are empty.
        assert!(header.has_mass_block());
        assert_eq!(header.variable_mass_particles(), 8);

        let mut fixed = header;
        fixed.mass_table[0] = 0.01;
        assert!(!fixed.has_mass_block());
    }
}

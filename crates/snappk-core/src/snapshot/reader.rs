use super::header::{HEADER_BYTES, SnapshotHeader};
use crate::common::constants::{
    GADGET_LENGTH_TO_MPC, GADGET_MASS_TO_MSUN, NUM_PARTICLE_TYPES,
};
use crate::domain::{PkError, PkResult, Species};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Payload location of one Fortran record inside the snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordSpan {
    offset: u64,
    len: u64,
}

#[derive(Debug, Clone, Copy)]
struct BlockTable {
    positions: RecordSpan,
    velocities: RecordSpan,
    masses: Option<RecordSpan>,
}

/// Read access to a single-file format-1 Gadget snapshot.
///
/// The header and the record table are scanned once at `open`; block
/// accessors reopen the file and read only the requested species' slice.
/// All returned values are in pipeline units: Mpc/h, km/s, Msun/h.
#[derive(Debug)]
pub struct SnapshotReader {
    path: PathBuf,
    header: SnapshotHeader,
    blocks: BlockTable,
}

impl SnapshotReader {
    pub fn open(path: impl Into<PathBuf>) -> PkResult<Self> {
        let path = path.into();
        let mut file = File::open(&path).map_err(|source| PkError::io("open", &path, source))?;
        let file_len = file
            .metadata()
            .map_err(|source| PkError::io("stat", &path, source))?
            .len();

        let spans = scan_records(&mut file, &path, file_len)?;
        let head = spans.first().ok_or_else(|| {
            PkError::snapshot_format(&path, "file contains no records".to_string())
        })?;
        if head.len != HEADER_BYTES as u64 {
            return Err(PkError::snapshot_format(
                &path,
                format!(
                    "first record is {} bytes, expected a {HEADER_BYTES}-byte header \
                     (format-2 snapshots are not supported)",
                    head.len
                ),
            ));
        }

        let payload = read_span(&mut file, &path, *head)?;
        let header = SnapshotHeader::from_bytes(&payload)
            .map_err(|reason| PkError::snapshot_format(&path, reason))?;
        if header.num_files != 1 {
            return Err(PkError::snapshot_format(
                &path,
                format!(
                    "snapshot is split across {} files; only single-file snapshots are supported",
                    header.num_files
                ),
            ));
        }

        let blocks = locate_blocks(&path, &header, &spans)?;
        Ok(Self {
            path,
            header,
            blocks,
        })
    }

    pub fn header(&self) -> &SnapshotHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Particle positions in Mpc/h for the selected species.
    pub fn positions(&self, selection: Species) -> PkResult<Vec<[f32; 3]>> {
        let scale = GADGET_LENGTH_TO_MPC as f32;
        self.read_vectors(self.blocks.positions, selection, scale)
    }

    /// Peculiar velocities in km/s for the selected species. Gadget stores
    /// `u = v / sqrt(a)`, so values are rescaled by `sqrt(a)` on read.
    pub fn velocities(&self, selection: Species) -> PkResult<Vec<[f32; 3]>> {
        let scale = self.header.time.sqrt() as f32;
        self.read_vectors(self.blocks.velocities, selection, scale)
    }

    /// Per-particle masses in Msun/h: constant-filled from the header mass
    /// table where the entry is positive, read from the MASS block where it
    /// is zero.
    pub fn masses(&self, selection: Species) -> PkResult<Vec<f32>> {
        let capacity = self.selection_count(selection);
        let mut masses = Vec::with_capacity(capacity);
        for slot in selection_slots(selection) {
            let count = self.header.npart[slot] as usize;
            if count == 0 {
                continue;
            }
            if self.header.mass_table[slot] > 0.0 {
                let mass = self.header.species_mass_msun(slot) as f32;
                masses.extend(std::iter::repeat_n(mass, count));
            } else {
                let block = self.mass_block_slice(slot)?;
                masses.extend(block);
            }
        }
        Ok(masses)
    }

    /// Masses from the header table only; a zero entry with particles
    /// present is an error. Used by the non-hydrodynamic all-matter path.
    pub fn table_masses(&self, selection: Species) -> PkResult<Vec<f32>> {
        let capacity = self.selection_count(selection);
        let mut masses = Vec::with_capacity(capacity);
        for slot in selection_slots(selection) {
            let count = self.header.npart[slot] as usize;
            if count == 0 {
                continue;
            }
            if self.header.mass_table[slot] == 0.0 {
                return Err(PkError::MissingMassData {
                    species: species_for_slot(slot),
                });
            }
            let mass = self.header.species_mass_msun(slot) as f32;
            masses.extend(std::iter::repeat_n(mass, count));
        }
        Ok(masses)
    }

    /// Total mass of the selection in Msun/h, accumulated in f64.
    pub fn total_mass(&self, selection: Species) -> PkResult<f64> {
        let mut total = 0.0_f64;
        for slot in selection_slots(selection) {
            let count = self.header.npart[slot] as usize;
            if count == 0 {
                continue;
            }
            if self.header.mass_table[slot] > 0.0 {
                total += self.header.species_mass_msun(slot) * count as f64;
            } else {
                let block = self.mass_block_slice(slot)?;
                total += block.iter().map(|&m| f64::from(m)).sum::<f64>();
            }
        }
        Ok(total)
    }

    fn selection_count(&self, selection: Species) -> usize {
        selection_slots(selection)
            .map(|slot| self.header.npart[slot] as usize)
            .sum()
    }

    fn read_vectors(
        &self,
        span: RecordSpan,
        selection: Species,
        scale: f32,
    ) -> PkResult<Vec<[f32; 3]>> {
        let (start, count) = match selection.type_index() {
            Some(slot) => (self.particle_offset(slot), self.header.npart[slot] as usize),
            None => (0, self.header.total_particles() as usize),
        };

        let raw = self.read_f32_range(span, 3 * start, 3 * count)?;
        let mut vectors = Vec::with_capacity(count);
        for triple in raw.chunks_exact(3) {
            vectors.push([triple[0] * scale, triple[1] * scale, triple[2] * scale]);
        }
        Ok(vectors)
    }

    /// MASS-block slice for one variable-mass type slot, in Msun/h.
    fn mass_block_slice(&self, slot: usize) -> PkResult<Vec<f32>> {
        let span = self.blocks.masses.ok_or(PkError::MissingMassData {
            species: species_for_slot(slot),
        })?;
        let start: usize = (0..slot)
            .filter(|&s| self.header.mass_table[s] == 0.0)
            .map(|s| self.header.npart[s] as usize)
            .sum();
        let count = self.header.npart[slot] as usize;
        let mut block = self.read_f32_range(span, start, count)?;
        for mass in &mut block {
            *mass *= GADGET_MASS_TO_MSUN as f32;
        }
        Ok(block)
    }

    fn particle_offset(&self, slot: usize) -> usize {
        self.header.npart[..slot]
            .iter()
            .map(|&n| n as usize)
            .sum()
    }

    fn read_f32_range(
        &self,
        span: RecordSpan,
        start_elem: usize,
        count: usize,
    ) -> PkResult<Vec<f32>> {
        let byte_offset = span.offset + 4 * start_elem as u64;
        let byte_len = 4 * count;
        debug_assert!(byte_offset + byte_len as u64 <= span.offset + span.len);

        let mut file =
            File::open(&self.path).map_err(|source| PkError::io("open", &self.path, source))?;
        file.seek(SeekFrom::Start(byte_offset))
            .map_err(|source| PkError::io("seek", &self.path, source))?;
        let mut raw = vec![0_u8; byte_len];
        file.read_exact(&mut raw)
            .map_err(|source| PkError::io("read block from", &self.path, source))?;

        let mut values = Vec::with_capacity(count);
        for bytes in raw.chunks_exact(4) {
            values.push(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
        }
        Ok(values)
    }
}

fn selection_slots(selection: Species) -> impl Iterator<Item = usize> {
    let (start, end) = match selection.type_index() {
        Some(slot) => (slot, slot + 1),
        None => (0, NUM_PARTICLE_TYPES),
    };
    start..end
}

fn species_for_slot(slot: usize) -> Species {
    match slot {
        0 => Species::Gas,
        1 => Species::ColdDarkMatter,
        2 => Species::Neutrino,
        4 => Species::Stars,
        _ => Species::Matter,
    }
}

fn scan_records(file: &mut File, path: &Path, file_len: u64) -> PkResult<Vec<RecordSpan>> {
    let mut spans = Vec::new();
    let mut cursor = 0_u64;
    while cursor + 4 <= file_len {
        let lead = read_marker(file, path, cursor)?;
        let payload_offset = cursor + 4;
        let payload_len = u64::from(lead);
        let trail_offset = payload_offset + payload_len;
        if trail_offset + 4 > file_len {
            return Err(PkError::snapshot_format(
                path,
                format!("record at byte {cursor} overruns the file (length {lead})"),
            ));
        }
        let trail = read_marker(file, path, trail_offset)?;
        if trail != lead {
            return Err(PkError::snapshot_format(
                path,
                format!(
                    "record at byte {cursor} has mismatched markers ({lead} vs {trail})"
                ),
            ));
        }
        spans.push(RecordSpan {
            offset: payload_offset,
            len: payload_len,
        });
        cursor = trail_offset + 4;
    }
    if cursor != file_len {
        return Err(PkError::snapshot_format(
            path,
            format!("{} trailing bytes after the last record", file_len - cursor),
        ));
    }
    Ok(spans)
}

fn read_marker(file: &mut File, path: &Path, offset: u64) -> PkResult<u32> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|source| PkError::io("seek", path, source))?;
    let mut raw = [0_u8; 4];
    file.read_exact(&mut raw)
        .map_err(|source| PkError::io("read record marker from", path, source))?;
    Ok(u32::from_le_bytes(raw))
}

fn read_span(file: &mut File, path: &Path, span: RecordSpan) -> PkResult<Vec<u8>> {
    file.seek(SeekFrom::Start(span.offset))
        .map_err(|source| PkError::io("seek", path, source))?;
    let mut payload = vec![0_u8; span.len as usize];
    file.read_exact(&mut payload)
        .map_err(|source| PkError::io("read record from", path, source))?;
    Ok(payload)
}

/// Maps the scanned records onto the fixed format-1 block order
/// HEAD, POS, VEL, IDS, then MASS when the header calls for one.
fn locate_blocks(
    path: &Path,
    header: &SnapshotHeader,
    spans: &[RecordSpan],
) -> PkResult<BlockTable> {
    let total = header.total_particles();
    let vector_len = 12 * total;

    let positions = *spans.get(1).ok_or_else(|| {
        PkError::snapshot_format(path, "missing POS record".to_string())
    })?;
    if positions.len != vector_len {
        return Err(PkError::snapshot_format(
            path,
            format!(
                "POS record is {} bytes, expected {vector_len} for {total} particles",
                positions.len
            ),
        ));
    }

    let velocities = *spans.get(2).ok_or_else(|| {
        PkError::snapshot_format(path, "missing VEL record".to_string())
    })?;
    if velocities.len != vector_len {
        return Err(PkError::snapshot_format(
            path,
            format!(
                "VEL record is {} bytes, expected {vector_len} for {total} particles",
                velocities.len
            ),
        ));
    }

    if let Some(ids) = spans.get(3) {
        if ids.len != 4 * total && ids.len != 8 * total {
            return Err(PkError::snapshot_format(
                path,
                format!("IDS record is {} bytes for {total} particles", ids.len),
            ));
        }
    }

    let variable = header.variable_mass_particles();
    let masses = if variable > 0 {
        let span = *spans.get(4).ok_or_else(|| {
            PkError::snapshot_format(
                path,
                format!("header expects a MASS block for {variable} particles, none found"),
            )
        })?;
        if span.len != 4 * variable {
            return Err(PkError::snapshot_format(
                path,
                format!(
                    "MASS record is {} bytes, expected {} for {variable} particles",
                    span.len,
                    4 * variable
                ),
            ));
        }
        Some(span)
    } else {
        None
    };

    Ok(BlockTable {
        positions,
        velocities,
        masses,
    })
}

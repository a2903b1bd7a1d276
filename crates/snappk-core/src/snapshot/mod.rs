//! Single-file format-1 Gadget snapshot I/O.

mod header;
mod reader;
mod writer;

pub use header::{HEADER_BYTES, SnapshotHeader};
pub use reader::SnapshotReader;
pub use writer::SnapshotBuilder;

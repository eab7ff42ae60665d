//! Low-level MPEG-2 Program Stream framing used by the `.sub` container.

pub mod clock;
pub mod packetizer;

pub use packetizer::{read_subpicture, write_subpicture, ReadSubpicture, WriteSpec, PACK_SIZE};

//! Reads and writes DVD subtitles in `VobSub` format.  These are
//! typically stored as two files: an `*.idx` file summarizing the
//! subtitles, and an MPEG-2 Program Stream containing the actual
//! subtitle packets.
//!
//! ## Example code
//!
//! ```no_run
//! let idx = vobsub_codec::vobsub::Index::open("./fixtures/example.idx").unwrap();
//! for sub in idx.subtitles().unwrap() {
//!     let sub = sub.unwrap();
//!     println!("Time: {}-{} (90kHz ticks)", sub.start_pts, sub.end_pts);
//!     println!("Always show: {:?}", sub.forced);
//!     println!("At: {}, {}", sub.image_x, sub.image_y);
//!     println!("Size: {}x{}", sub.image_width, sub.image_height);
//! }
//! ```
//!
//! ## Background & References
//!
//! `VobSub` subtitles consist of a simple textual `*.idx` file, and a
//! binary `*.sub` file.  The binary `*.sub` file is essentially an
//! MPEG-2 Program Stream containing Packetized Elementary Stream data,
//! but only for a single subtitle track.
//!
//! Useful references include:
//!
//! - [Program Stream](https://en.wikipedia.org/wiki/MPEG_program_stream) (PS)
//! - [Packetized Elementary Stream][PES] (PES)
//! - [DVD subtitles](http://sam.zoy.org/writings/dvd/subtitles/)
//! - [System Time Clock](http://www.bretl.com/mpeghtml/STC.HTM)
//!
//! [PES]: http://dvd.sourceforge.net/dvdinfo/pes-hdr.html
//!
//! There are two closely-related formats that this crate could be
//! extended to parse without too much work:
//!
//! - Subtitles embedded in DVD-format video.  These contain the same
//!   subtitle packet format, but the `*.idx` file is replaced by data
//!   stored in an `IFO` file.
//! - Subtitles stored in the Matroska container format.  Again, these
//!   use the same basic subtitle format, but the `*.idx` file is
//!   replaced by an internal, stripped-down version of the same data
//!   in text format.

mod byte_buffer;
mod decoder;
mod idx;
mod img;
mod language;
mod mpeg2;
mod probe;
mod reader;
mod rle;
mod spu;
mod stream;
mod subpicture;
mod writer;

pub use byte_buffer::ByteBuffer;
pub use decoder::VobSubDecoder;
pub use idx::{IdxParser, IdxWriter, TimestampEntry};
pub use img::to_rgba_image;
pub use language::{code_for_index, is_known_code, name_for_code, LanguageEntry, LANGUAGES};
pub use probe::{is_idx_file, is_sub_file};
pub use reader::SubpictureReader;
pub use rle::{decode_image, encode_lines, DvdRleCodec, RleCodec};
pub use spu::{parse as parse_control_sequence, serialize as serialize_control_sequence};
pub use spu::{ControlHeaderSpec, ParsedControl};
pub use stream::{Index, Subtitles};
pub use subpicture::{IdxHeader, RleFragment, SubPicture};
pub use writer::{write_subpicture, SubpictureWriteSpec};

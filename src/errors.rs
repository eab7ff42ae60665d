//! Custom error types.
//!
//! Error kinds follow the three-way split of the codec core:
//! [`IdxError`] for the textual sidecar, [`BufferError`] for the
//! underlying file I/O, and [`FormatError`] for everything that can go
//! wrong while walking the binary `.sub` stream. [`VobSubError`] is the
//! outer enum most public functions actually return.

use std::path::PathBuf;
use thiserror::Error;

/// Errors parsing the textual `*.idx` sidecar. These are fatal: the
/// parser aborts on the first one.
#[derive(Debug, Error)]
pub enum IdxError {
    /// `size:` value was not parseable as `WxH`.
    #[error("invalid size value {0:?}")]
    InvalidSize(String),

    /// `org:` value was not parseable as `X, Y`.
    #[error("invalid org value {0:?}")]
    InvalidOrigin(String),

    /// `time offset:` value was neither a plain integer nor `hh:mm:ss:ms`.
    #[error("invalid time offset {0:?}")]
    InvalidTimeOffset(String),

    /// A `palette:` entry was not a valid hex RGB triple, or the
    /// palette did not have between 1 and 16 entries.
    #[error("invalid palette entry {0:?}")]
    InvalidPalette(String),

    /// `timestamp:` line had no `filepos:` field.
    #[error("timestamp line missing 'filepos:'")]
    MissingFilepos,

    /// `filepos:` value was not a valid hex file offset.
    #[error("invalid filepos value {0:?}")]
    InvalidFilepos(String),

    /// An I/O error while reading the `.idx` file.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Underlying error.
        source: std::io::Error,
        /// Path being read.
        path: PathBuf,
    },
}

/// Errors reading the underlying `.sub` file through a [`crate::vobsub::ByteBuffer`].
#[derive(Debug, Error)]
pub enum BufferError {
    /// A read would have gone past the end of the buffer.
    #[error("read of {len} bytes at offset 0x{offset:x} exceeds buffer size {size}")]
    OutOfRange {
        /// Offset requested.
        offset: u64,
        /// Number of bytes requested.
        len: usize,
        /// Total size of the buffer.
        size: u64,
    },

    /// The underlying file could not be opened or read.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Underlying error.
        source: std::io::Error,
        /// Path being read.
        path: PathBuf,
    },
}

/// Errors walking the binary MPEG Program Stream / SP_DCSQ structure of
/// a single subpicture. These are fatal *for that subpicture*; a driver
/// may log and continue with the next one.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Expected a pack header (`00 00 01 BA`) at this offset.
    #[error("expected pack header 0x000001BA at offset 0x{0:x}")]
    MissingPackHeader(u64),

    /// Expected a private-stream-1 PES header (`00 00 01 BD`) at this offset.
    #[error("expected private stream header 0x000001BD at offset 0x{0:x}")]
    MissingPesHeader(u64),

    /// The control-header size computed from the SPU size fields was negative.
    #[error(
        "control size {ctrl_size} computed from total {total} and ctrl_rel {ctrl_rel} is invalid"
    )]
    InvalidControlSize {
        /// Total SPU size field.
        total: i64,
        /// Control-offset-relative field.
        ctrl_rel: i64,
        /// Computed (invalid) control size.
        ctrl_size: i64,
    },

    /// The control command stream ended before an `0xFF` terminator.
    #[error("control sequence ran past the end of the control buffer")]
    TruncatedControlSequence,

    /// RLE offsets in control command `0x06` were inconsistent with the
    /// reassembled RLE buffer.
    #[error("even/odd RLE offsets ({even}, {odd}) inconsistent with rle_size {rle_size}")]
    InvalidRleOffsets {
        /// Even-field offset.
        even: u16,
        /// Odd-field offset.
        odd: u16,
        /// Total reassembled RLE byte count.
        rle_size: u32,
    },

    /// The display-area command (`0x05`) described a rectangle with a
    /// non-positive width or height.
    #[error("invalid display area ({x1},{y1})-({x2},{y2})")]
    InvalidArea {
        /// Left edge.
        x1: u16,
        /// Top edge.
        y1: u16,
        /// Right edge (inclusive).
        x2: u16,
        /// Bottom edge (inclusive).
        y2: u16,
    },

    /// A control header never carried one of the commands a subpicture
    /// requires (palette `0x03` or display area `0x05`).
    #[error("control header never set required field {0:?}")]
    MissingControlCommand(&'static str),

    /// Underlying buffer access failed.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// The even/odd RLE bitstream underflowed or overflowed relative to
    /// the declared image dimensions.
    #[error("RLE decode error: {0}")]
    Rle(String),
}

/// A non-fatal condition encountered while reading a subpicture. These
/// are never returned as errors; they are logged via [`log::warn!`] at
/// the call site and decoding continues. This enum exists so call sites
/// format a consistent message and so tests can assert on the variant
/// that would have been logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatWarning {
    /// A packet belonging to a different logical stream was skipped.
    WrongStream {
        /// Stream ID found.
        found: u8,
        /// Stream ID expected.
        expected: u8,
    },
    /// The next-fragment offset was not 2048-aligned; it was rounded up.
    MisalignedFragment {
        /// Offset as read from the stream.
        offset: u64,
        /// Offset after rounding up to the next 2048-byte boundary.
        aligned: u64,
    },
    /// The control buffer was not completely filled from the reassembled
    /// fragments; the remainder was padded with `0xFF`.
    ShortControlBuffer {
        /// Bytes actually collected.
        collected: usize,
        /// Bytes expected.
        expected: usize,
    },
    /// An unrecognized control command byte was encountered.
    UnknownCommand(u8),
    /// The end-sequence offset fell outside the control buffer and was clamped.
    InvalidEndSequenceOffset {
        /// Offset as parsed.
        offset: i64,
        /// Control buffer size it was clamped to.
        clamped_to: usize,
    },
    /// All four alpha indices were zero; the invisible-caption fallback applied.
    InvisibleCaptionByZeroAlpha,
    /// A color/alpha update command (`0x07`) was seen.
    PaletteAlphaUpdate,
    /// More than two chained control sequences were found.
    TooManyChainedSequences {
        /// Number found.
        count: usize,
    },
}

impl std::fmt::Display for FormatWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongStream { found, expected } => write!(
                f,
                "skipped packet for stream 0x{found:x}, expected 0x{expected:x}"
            ),
            Self::MisalignedFragment { offset, aligned } => write!(
                f,
                "misaligned next-fragment offset 0x{offset:x}, rounded up to 0x{aligned:x}"
            ),
            Self::ShortControlBuffer {
                collected,
                expected,
            } => write!(
                f,
                "control buffer only {collected} of {expected} bytes, padding with 0xFF"
            ),
            Self::UnknownCommand(cmd) => write!(f, "unknown control command 0x{cmd:02x}"),
            Self::InvalidEndSequenceOffset { offset, clamped_to } => write!(
                f,
                "end-sequence offset {offset} out of range, clamped to {clamped_to}"
            ),
            Self::InvisibleCaptionByZeroAlpha => {
                write!(f, "zero alpha sum; reused previous subpicture's alpha")
            }
            Self::PaletteAlphaUpdate => write!(f, "palette/alpha update command seen (erratic)"),
            Self::TooManyChainedSequences { count } => write!(
                f,
                "found {count} chained control sequences, result may be erratic"
            ),
        }
    }
}

/// The crate-wide error type. Most public functions return this, or a
/// more specific kind above that converts into it via `?`.
#[derive(Debug, Error)]
pub enum VobSubError {
    /// See [`IdxError`].
    #[error(transparent)]
    Idx(#[from] IdxError),

    /// See [`FormatError`].
    #[error(transparent)]
    Format(#[from] FormatError),

    /// See [`BufferError`].
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// A generic I/O error not otherwise classified above.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

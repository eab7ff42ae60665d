//! Reads and writes the `VobSub` (DVD subpicture) `.sub`/`.idx` stream
//! pair: the MPEG-2 Program-Stream de/multiplexer, the SP_DCSQ control
//! sequence codec, and the textual `.idx` sidecar.
//!
//! Picks up where the earlier [`vobsub`](https://crates.io/crates/vobsub)
//! crate ([repository](https://github.com/emk/subtitles-rs)) left off,
//! adding a writer alongside the reader.
//!
//! ## Example
//!
//! ```no_run
//! let idx = vobsub_codec::vobsub::Index::open("./fixtures/example.idx").unwrap();
//! for sub in idx.subtitles().unwrap() {
//!     let sub = sub.unwrap();
//!     println!("PTS: {}-{}", sub.start_pts, sub.end_pts);
//!     println!("Forced: {}", sub.forced);
//! }
//! ```

#![warn(missing_docs)]

mod content;
pub mod errors;
mod util;
pub mod vobsub;

pub use errors::VobSubError;

/// A short alias for `Result<T, VobSubError>`.
pub type Result<T> = std::result::Result<T, VobSubError>;

//! A capability-defining output trait, so a caller can project a
//! decoded [`super::SubPicture`] into its own bitmap/subtitle type
//! without this crate depending on that type.
//!
//! A DVD subtitle stream is one implementation of a broader "subtitle
//! stream" capability set (`decode`, `get_image`, `get_palette`, ...).
//! `VobSubDecoder` is the output half of that: it doesn't drive
//! decoding itself (that's [`super::SubpictureReader`]/[`super::Index`]),
//! it just lets a caller receive the decoded fields in whatever shape
//! it wants, keeping `image::RgbaImage` production decoupled from
//! parsing.

/// Implemented by a caller-supplied type that wants to receive decoded
/// subpicture data without going through [`super::SubPicture`]
/// directly.
pub trait VobSubDecoder {
    /// The caller's own representation of a decoded subpicture.
    type Output;

    /// Build `Self::Output` from one subpicture's decoded fields.
    ///
    /// `start_pts`/`end_pts` are 90 kHz ticks, matching
    /// [`super::SubPicture`]; `raw_image` is row-major, one byte per
    /// pixel, values `0..=3` indexing into `palette`/`alpha`.
    fn from_data(
        start_pts: i64,
        end_pts: i64,
        forced: bool,
        image_x: u16,
        image_y: u16,
        image_width: u16,
        image_height: u16,
        palette: [u8; 4],
        alpha: [u8; 4],
        raw_image: Vec<u8>,
    ) -> Self::Output;
}

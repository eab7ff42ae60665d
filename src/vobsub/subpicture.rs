//! The data model shared by every stage of the codec: the seed a
//! `.idx` line produces, the fully-decoded subpicture a reader
//! produces, and the sidecar header.

/// Where to find one fragment of a subpicture's RLE payload in the
/// source `.sub` file. Populated only during a read; the writer derives
/// its own packet layout independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RleFragment {
    /// Absolute byte offset in the `.sub` file.
    pub absolute_offset: u64,
    /// Number of bytes belonging to this fragment.
    pub length: usize,
}

/// One displayed DVD caption, after its control sequence has been
/// parsed and its RLE buffer reassembled.
///
/// `SubPicture` is created by [`super::idx::IdxParser`] carrying only
/// `file_offset`/`start_pts`/`width`/`height` (the "seed" fields), then
/// populated once by [`super::reader::SubpictureReader`] and never
/// mutated again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPicture {
    /// Byte position of this subpicture's first pack header in the
    /// `.sub` file.
    pub file_offset: u64,
    /// Start of display, in 90 kHz ticks.
    pub start_pts: i64,
    /// End of display, in 90 kHz ticks. Equals `start_pts` if no end
    /// sequence was present.
    pub end_pts: i64,
    /// Screen width, copied from the `.idx` header.
    pub width: u16,
    /// Screen height, copied from the `.idx` header.
    pub height: u16,
    /// Top-left display X, already offset by the global `org`.
    pub image_x: u16,
    /// Top-left display Y, already offset by the global `org`.
    pub image_y: u16,
    /// Width of the bitmap's bounding rectangle.
    pub image_width: u16,
    /// Height of the bitmap's bounding rectangle.
    pub image_height: u16,
    /// Four indices into the 16-entry master palette.
    pub palette_indices: [u8; 4],
    /// Four 4-bit alpha values (0 = transparent, 15 = opaque).
    pub alpha_indices: [u8; 4],
    /// Must this caption display even when the player's subtitle toggle is off?
    pub forced: bool,
    /// Byte offset, from the start of the RLE buffer, to the even-field
    /// RLE stream.
    pub even_offset: u16,
    /// Byte offset, from the start of the RLE buffer, to the odd-field
    /// RLE stream.
    pub odd_offset: u16,
    /// Fragments making up the RLE buffer in the source file. Empty
    /// until a read has populated this subpicture.
    pub rle_fragments: Vec<RleFragment>,
    /// Total reassembled RLE byte count.
    pub rle_size: u32,
    /// Snapshot of `palette_indices` as originally parsed, kept so a
    /// caller can detect and re-encode after user edits.
    pub original_palette_indices: [u8; 4],
    /// Snapshot of `alpha_indices` as originally parsed.
    pub original_alpha_indices: [u8; 4],
    /// Snapshot of `(image_x, image_y)` as originally parsed.
    pub original_position: (u16, u16),
}

impl SubPicture {
    /// Construct the seed record an [`super::idx::IdxParser`] produces
    /// for one `timestamp:` line, before a read has populated the image
    /// and control fields.
    #[must_use]
    pub const fn seed(file_offset: u64, start_pts: i64, width: u16, height: u16) -> Self {
        Self {
            file_offset,
            start_pts,
            end_pts: start_pts,
            width,
            height,
            image_x: 0,
            image_y: 0,
            image_width: 0,
            image_height: 0,
            palette_indices: [0; 4],
            alpha_indices: [0; 4],
            forced: false,
            even_offset: 0,
            odd_offset: 0,
            rle_fragments: Vec::new(),
            rle_size: 0,
            original_palette_indices: [0; 4],
            original_alpha_indices: [0; 4],
            original_position: (0, 0),
        }
    }

    /// `image_x + image_width <= width` and `image_y + image_height <= height`.
    #[must_use]
    pub const fn fits_on_screen(&self) -> bool {
        self.image_x + self.image_width <= self.width
            && self.image_y + self.image_height <= self.height
    }
}

/// The parsed header portion of a `.idx` file: everything that isn't a
/// per-caption `timestamp:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdxHeader {
    /// Screen width, from `size:`.
    pub screen_width: u16,
    /// Screen height, from `size:`.
    pub screen_height: u16,
    /// Global X origin, from `org:`.
    pub global_x_ofs: u16,
    /// Global Y origin, from `org:`.
    pub global_y_ofs: u16,
    /// Global delay, in 90 kHz ticks (`time offset:` in ms, times 90).
    pub global_delay_pts: i64,
    /// The 16-entry master RGB palette.
    pub palette: [(u8, u8, u8); 16],
    /// Raw value of the `langidx:` key: the logical substream selector
    /// an `id:`'s `index:` must match for its `timestamp:` lines (and,
    /// on read, its PES substream ID, `0x20 + active_stream_id`) to be
    /// active.
    pub active_stream_id: u8,
    /// Index into [`super::language::LANGUAGES`] for the stream
    /// selected by `langidx:`, used only to emit a name/code pair on
    /// write. Distinct from `active_stream_id`: this is a position in
    /// our own table, not the numeric selector the disc itself uses.
    pub active_language_index: u8,
}

impl Default for IdxHeader {
    fn default() -> Self {
        Self {
            screen_width: 720,
            screen_height: 480,
            global_x_ofs: 0,
            global_y_ofs: 0,
            global_delay_pts: 0,
            palette: [(0, 0, 0); 16],
            active_stream_id: 0,
            active_language_index: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_has_sensible_defaults() {
        let sp = SubPicture::seed(0x1234, 945_000, 720, 576);
        assert_eq!(sp.file_offset, 0x1234);
        assert_eq!(sp.start_pts, 945_000);
        assert_eq!(sp.end_pts, 945_000);
        assert_eq!(sp.width, 720);
        assert_eq!(sp.height, 576);
        assert!(sp.rle_fragments.is_empty());
    }

    #[test]
    fn fits_on_screen_checks_bounds() {
        let mut sp = SubPicture::seed(0, 0, 100, 100);
        sp.image_x = 90;
        sp.image_width = 10;
        sp.image_y = 90;
        sp.image_height = 10;
        assert!(sp.fits_on_screen());
        sp.image_width = 11;
        assert!(!sp.fits_on_screen());
    }
}

//! Drives [`super::mpeg2::packetizer`] and [`super::spu`] to populate a
//! single [`SubPicture`] seed with its image and control fields.
//!
//! `last_alpha` and `num_forced` live on the reader instance rather
//! than as process-wide state, so that two readers (or two sequential
//! passes over the same file) never observe each other's history.

use log::warn;

use crate::content::Area;
use crate::errors::{FormatError, FormatWarning, VobSubError};
use crate::vobsub::byte_buffer::ByteBuffer;
use crate::vobsub::mpeg2::packetizer;
use crate::vobsub::spu;
use crate::vobsub::subpicture::SubPicture;

const DEFAULT_LAST_ALPHA: [u8; 4] = [0, 15, 15, 15];

/// Reads subpicture packets out of a `.sub` [`ByteBuffer`] and fills in
/// the image/control fields of a seed [`SubPicture`].
#[derive(Debug)]
pub struct SubpictureReader {
    /// Private-stream-1 sub-stream ID this reader follows (`0x20 + langidx`).
    active_stream_id: u8,
    /// Reuse the previous subpicture's alpha when the current one sums to zero.
    fix_zero_alpha: bool,
    /// Global X origin from the `.idx` header, added to every subpicture's position.
    org_x: u16,
    /// Global Y origin from the `.idx` header, added to every subpicture's position.
    org_y: u16,
    /// Alpha indices carried over from the most recently read subpicture.
    last_alpha: [u8; 4],
    /// Count of subpictures read with the forced bit set.
    num_forced: usize,
}

impl SubpictureReader {
    /// Build a reader for the given sub-stream, with the `.idx` header's
    /// global origin offsets.
    #[must_use]
    pub const fn new(active_stream_id: u8, fix_zero_alpha: bool, org_x: u16, org_y: u16) -> Self {
        Self {
            active_stream_id,
            fix_zero_alpha,
            org_x,
            org_y,
            last_alpha: DEFAULT_LAST_ALPHA,
            num_forced: 0,
        }
    }

    /// Number of subpictures read so far with the forced bit set.
    #[must_use]
    pub const fn num_forced(&self) -> usize {
        self.num_forced
    }

    /// Reset `last_alpha` to its documented default (`[0,15,15,15]`), for
    /// callers that want an isolated decode unaffected by prior reads.
    pub fn reset_last_alpha(&mut self) {
        self.last_alpha = DEFAULT_LAST_ALPHA;
    }

    /// Populate `pic`'s image and control fields by walking the packs in
    /// `[pic.file_offset, end_offset)`.
    ///
    /// # Errors
    /// Returns [`VobSubError`] if the pack/PES framing or control header
    /// is malformed. Non-fatal anomalies (misaligned fragments, unknown
    /// commands, zero alpha, chained-sequence overflow) are logged via
    /// [`log::warn!`] and do not abort the read.
    #[profiling::function]
    pub fn read(
        &mut self,
        buf: &mut ByteBuffer,
        pic: &mut SubPicture,
        end_offset: u64,
    ) -> Result<(), VobSubError> {
        let read = packetizer::read_subpicture(
            buf,
            pic.file_offset,
            end_offset,
            self.active_stream_id,
        )?;

        let control = spu::parse(&read.control_bytes, read.ctrl_offset_relative)?;

        if control.even_offset > control.odd_offset
            || u32::from(control.odd_offset) > read.rle_size
        {
            return Err(VobSubError::Format(FormatError::InvalidRleOffsets {
                even: control.even_offset,
                odd: control.odd_offset,
                rle_size: read.rle_size,
            }));
        }

        let alpha_sum: u32 = control.alpha_indices.iter().map(|&v| u32::from(v)).sum();
        let alpha_indices = if alpha_sum == 0 {
            warn!("{}", FormatWarning::InvisibleCaptionByZeroAlpha);
            if self.fix_zero_alpha {
                self.last_alpha
            } else {
                control.alpha_indices
            }
        } else {
            control.alpha_indices
        };

        let area = control.area;
        pic.rle_fragments = read.rle_fragments;
        pic.rle_size = read.rle_size;
        pic.even_offset = control.even_offset;
        pic.odd_offset = control.odd_offset;
        pic.palette_indices = control.palette_indices;
        pic.alpha_indices = alpha_indices;
        pic.forced = control.forced;
        pic.end_pts = if control.duration_ticks == 0 {
            pic.start_pts
        } else {
            pic.start_pts + control.duration_ticks
        };
        self.apply_area(pic, &area);

        pic.original_palette_indices = pic.palette_indices;
        pic.original_alpha_indices = pic.alpha_indices;
        pic.original_position = (pic.image_x, pic.image_y);

        if control.forced {
            self.num_forced += 1;
        }
        self.last_alpha = pic.alpha_indices;

        Ok(())
    }

    /// Apply the parsed display rectangle to `pic`, adding the global
    /// origin offset. This happens only on read; the writer does not
    /// subtract it back out again — an intentionally preserved
    /// asymmetry from the original codec this one replaces.
    fn apply_area(&self, pic: &mut SubPicture, area: &Area) {
        pic.image_x = area.left().saturating_add(self.org_x);
        pic.image_y = area.top().saturating_add(self.org_y);
        pic.image_width = area.width();
        pic.image_height = area.height();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vobsub::mpeg2::packetizer::WriteSpec;
    use crate::vobsub::rle::{DvdRleCodec, RleCodec};
    use crate::vobsub::spu::ControlHeaderSpec;
    use crate::content::AreaValues;
    use std::fs::File;
    use std::io::Write as _;

    struct TempFile(std::path::PathBuf);
    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn fixture(bytes: &[u8]) -> (TempFile, ByteBuffer) {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "vobsub_codec_reader_test_{:x}",
            std::ptr::addr_of!(bytes[0]) as usize
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        drop(f);
        let buf = ByteBuffer::open(&path).unwrap();
        (TempFile(path), buf)
    }

    fn build_spu(alpha: [u8; 4], forced: bool) -> Vec<u8> {
        let codec = DvdRleCodec;
        let width = 16;
        let height = 4;
        let pixels = vec![1u8; width * height];
        let even = codec.encode_lines(&pixels, width, height, true);
        let odd = codec.encode_lines(&pixels, width, height, false);
        let mut rle = even.clone();
        rle.extend_from_slice(&odd);
        let ctrl_offset_relative = rle.len() as u16 + 2;
        let ctrl = spu::serialize(
            &ControlHeaderSpec {
                palette_indices: [0, 1, 2, 3],
                alpha_indices: alpha,
                area: AreaValues {
                    x1: 0,
                    y1: 0,
                    x2: (width - 1) as u16,
                    y2: (height - 1) as u16,
                },
                even_len: even.len() as u16,
                odd_offset: even.len() as u16,
                forced,
                duration_ticks: 0,
            },
            ctrl_offset_relative,
        );
        packetizer::write_subpicture(&WriteSpec {
            rle_bytes: &rle,
            control_bytes: &ctrl,
            start_pts: 90_000,
            stream_id: 0,
        })
    }

    #[test]
    fn reads_a_subpicture_and_applies_org_offset() {
        let bytes = build_spu([15, 15, 15, 15], false);
        let (_guard, mut buf) = fixture(&bytes);
        let mut pic = SubPicture::seed(0, 90_000, 720, 480);
        let mut reader = SubpictureReader::new(0, true, 10, 20);
        reader.read(&mut buf, &mut pic, bytes.len() as u64).unwrap();
        assert_eq!(pic.image_x, 10);
        assert_eq!(pic.image_y, 20);
        assert_eq!(pic.palette_indices, [0, 1, 2, 3]);
        assert_eq!(pic.alpha_indices, [15, 15, 15, 15]);
        assert!(!pic.forced);
        assert_eq!(reader.num_forced(), 0);
    }

    #[test]
    fn zero_alpha_falls_back_to_last_alpha_when_fix_is_enabled() {
        let first = build_spu([0, 8, 15, 15], false);
        let second = build_spu([0, 0, 0, 0], false);
        let mut combined = first.clone();
        combined.extend_from_slice(&second);

        let (_guard, mut buf) = fixture(&combined);
        let mut reader = SubpictureReader::new(0, true, 0, 0);

        let mut pic1 = SubPicture::seed(0, 90_000, 720, 480);
        reader
            .read(&mut buf, &mut pic1, first.len() as u64)
            .unwrap();
        assert_eq!(pic1.alpha_indices, [0, 8, 15, 15]);

        let mut pic2 = SubPicture::seed(first.len() as u64, 90_000, 720, 480);
        reader
            .read(&mut buf, &mut pic2, combined.len() as u64)
            .unwrap();
        assert_eq!(pic2.alpha_indices, [0, 8, 15, 15]);
    }

    #[test]
    fn forced_bit_increments_the_counter() {
        let bytes = build_spu([15, 15, 15, 15], true);
        let (_guard, mut buf) = fixture(&bytes);
        let mut pic = SubPicture::seed(0, 90_000, 720, 480);
        let mut reader = SubpictureReader::new(0, true, 0, 0);
        reader.read(&mut buf, &mut pic, bytes.len() as u64).unwrap();
        assert!(pic.forced);
        assert_eq!(reader.num_forced(), 1);
    }
}

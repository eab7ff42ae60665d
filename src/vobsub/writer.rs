//! Serializes a subpicture's encoded RLE bytes and display metadata
//! back into a `.sub` pack stream.

use crate::content::AreaValues;
use crate::vobsub::mpeg2::packetizer::{self, WriteSpec};
use crate::vobsub::spu::{self, ControlHeaderSpec};

/// Everything needed to re-emit one subpicture.
#[derive(Debug, Clone)]
pub struct SubpictureWriteSpec {
    /// Encoded even-field RLE bytes.
    pub even_rle: Vec<u8>,
    /// Encoded odd-field RLE bytes.
    pub odd_rle: Vec<u8>,
    /// Four indices into the master palette.
    pub palette_indices: [u8; 4],
    /// Four 4-bit alpha values.
    pub alpha_indices: [u8; 4],
    /// Display rectangle, already including any origin offset.
    pub image_x: u16,
    /// See [`Self::image_x`].
    pub image_y: u16,
    /// Width of the bitmap's bounding rectangle.
    pub image_width: u16,
    /// Height of the bitmap's bounding rectangle.
    pub image_height: u16,
    /// Must this caption display regardless of the player's subtitle toggle?
    pub forced: bool,
    /// Start of display, in 90 kHz ticks.
    pub start_pts: i64,
    /// End of display, in 90 kHz ticks. Equal to `start_pts` for no end sequence.
    pub end_pts: i64,
    /// Sub-stream ID to tag every pack with.
    pub stream_id: u8,
    /// Screen height, needed to clamp the cropped Y position.
    pub screen_height: u16,
}

/// Serialize a subpicture into a buffer of 2048-byte packs.
///
/// The crop offset is applied only to `y`, per the documented behavior
/// of the original codec this one replaces: `y = clamp(image_y -
/// crop_offset_y, 0, screen_height - image_height - 2*crop_offset_y)`.
/// `x` is written back out unmodified.
#[must_use]
#[profiling::function]
pub fn write_subpicture(spec: &SubpictureWriteSpec, crop_offset_y: u16) -> Vec<u8> {
    let cropped_y = clamp_cropped_y(spec, crop_offset_y);

    let mut rle_bytes = Vec::with_capacity(spec.even_rle.len() + spec.odd_rle.len());
    rle_bytes.extend_from_slice(&spec.even_rle);
    rle_bytes.extend_from_slice(&spec.odd_rle);

    let duration_ticks = if spec.end_pts > spec.start_pts {
        spec.end_pts - spec.start_pts
    } else {
        0
    };

    let ctrl_offset_relative = rle_bytes.len() as u16 + 2;
    let control_bytes = spu::serialize(
        &ControlHeaderSpec {
            palette_indices: spec.palette_indices,
            alpha_indices: spec.alpha_indices,
            area: AreaValues {
                x1: spec.image_x,
                y1: cropped_y,
                x2: spec.image_x + spec.image_width.saturating_sub(1),
                y2: cropped_y + spec.image_height.saturating_sub(1),
            },
            even_len: spec.even_rle.len() as u16,
            odd_offset: spec.even_rle.len() as u16,
            forced: spec.forced,
            duration_ticks,
        },
        ctrl_offset_relative,
    );

    packetizer::write_subpicture(&WriteSpec {
        rle_bytes: &rle_bytes,
        control_bytes: &control_bytes,
        start_pts: spec.start_pts,
        stream_id: spec.stream_id,
    })
}

fn clamp_cropped_y(spec: &SubpictureWriteSpec, crop_offset_y: u16) -> u16 {
    let lowered = spec.image_y.saturating_sub(crop_offset_y);
    let max_y = spec
        .screen_height
        .saturating_sub(spec.image_height)
        .saturating_sub(2 * crop_offset_y);
    lowered.min(max_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> SubpictureWriteSpec {
        SubpictureWriteSpec {
            even_rle: vec![0xAA; 20],
            odd_rle: vec![0xBB; 20],
            palette_indices: [0, 1, 2, 3],
            alpha_indices: [15, 15, 15, 15],
            image_x: 100,
            image_y: 400,
            image_width: 200,
            image_height: 40,
            forced: false,
            start_pts: 90_000,
            end_pts: 90_000,
            stream_id: 0,
            screen_height: 480,
        }
    }

    #[test]
    fn produces_a_multiple_of_2048() {
        let bytes = write_subpicture(&sample_spec(), 0);
        assert_eq!(bytes.len() % 2048, 0);
    }

    #[test]
    fn crop_offset_only_affects_y() {
        let spec = sample_spec();
        let uncropped_x = spec.image_x;
        let cropped_y = clamp_cropped_y(&spec, 8);
        assert_eq!(uncropped_x, 100);
        assert_eq!(cropped_y, 392);
    }

    #[test]
    fn crop_offset_clamps_to_zero_at_the_top_of_the_screen() {
        let mut spec = sample_spec();
        spec.image_y = 2;
        let cropped_y = clamp_cropped_y(&spec, 8);
        assert_eq!(cropped_y, 0);
    }
}

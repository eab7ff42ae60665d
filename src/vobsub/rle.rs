//! Run-length image codec for the even/odd interleaved DVD subpicture
//! bitmap.
//!
//! Per the classic DVD subtitle RLE scheme (documented at
//! <http://sam.zoy.org/writings/dvd/subtitles/> and implemented by
//! every VobSub-compatible decoder): each scan line is a sequence of
//! `(run_length, 2-bit pixel value)` pairs. The run length is encoded
//! in one of four bit widths depending on its magnitude, each
//! distinguished on read by a leading run of zero bits (tried
//! longest-prefix-first), and a run length of zero means "fill to the
//! end of the line". The two fields (even/odd scan lines) are stored
//! as separate byte streams, with each line byte-aligned.
//!
//! This is the crate's one concrete implementation of the
//! `encode_lines`/`decode_image` service, kept behind the [`RleCodec`]
//! trait so callers with their own RLE engine can bypass it entirely
//! and hand [`super::writer`]/[`super::reader`] pre-encoded or
//! pre-decoded bytes.

use nom::bits::complete::{tag as tag_bits, take as take_bits};
use nom::branch::alt;
use nom::sequence::{pair, preceded};
use nom::{IResult, Parser as _};

use crate::errors::FormatError;

/// A 2-bit-per-pixel bitmap codec operating on the even/odd
/// interleaved byte streams DVD subpictures use.
pub trait RleCodec {
    /// Encode every other scan line of `pixels` (row-major, one byte
    /// per pixel, values `0..=3`) into the packed RLE format, choosing
    /// the even (`y % 2 == 0`) or odd lines per `even_field`.
    fn encode_lines(&self, pixels: &[u8], width: usize, height: usize, even_field: bool)
        -> Vec<u8>;

    /// Decode the even/odd RLE streams back into a row-major,
    /// one-byte-per-pixel bitmap of the given size.
    ///
    /// # Errors
    /// Returns [`FormatError::Rle`] if a line's encoded run lengths
    /// don't add up to exactly `width` pixels.
    fn decode_image(
        &self,
        width: usize,
        height: usize,
        even: &[u8],
        odd: &[u8],
    ) -> Result<Vec<u8>, FormatError>;
}

/// The standard DVD subtitle RLE codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct DvdRleCodec;

impl RleCodec for DvdRleCodec {
    fn encode_lines(
        &self,
        pixels: &[u8],
        width: usize,
        height: usize,
        even_field: bool,
    ) -> Vec<u8> {
        encode_lines(pixels, width, height, even_field)
    }

    fn decode_image(
        &self,
        width: usize,
        height: usize,
        even: &[u8],
        odd: &[u8],
    ) -> Result<Vec<u8>, FormatError> {
        decode_image(width, height, even, odd)
    }
}

struct BitWriter {
    bytes: Vec<u8>,
    cur: u8,
    nbits: u8,
}

impl BitWriter {
    const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            cur: 0,
            nbits: 0,
        }
    }

    fn push_bits(&mut self, value: u32, width: u8) {
        for i in (0..width).rev() {
            let bit = ((value >> i) & 1) as u8;
            self.cur = (self.cur << 1) | bit;
            self.nbits += 1;
            if self.nbits == 8 {
                self.bytes.push(self.cur);
                self.cur = 0;
                self.nbits = 0;
            }
        }
    }

    /// Pad the current byte with zero bits, matching the decoder's
    /// line-boundary convention.
    fn align_to_byte(&mut self) {
        if self.nbits > 0 {
            self.cur <<= 8 - self.nbits;
            self.bytes.push(self.cur);
            self.cur = 0;
            self.nbits = 0;
        }
    }
}

/// A bit-level cursor into an RLE field, the shape `nom::bits` parsers
/// operate on: remaining bytes plus a bit offset into the first one.
type BitInput<'a> = (&'a [u8], usize);

/// A decoded `(run_length, pixel_value)` pair. `count == 0` means "fill
/// to the end of the line".
#[derive(Clone, Copy)]
struct Run {
    count: u16,
    val: u8,
}

/// Thresholds at which the run-length count widens to the next field
/// size, per the DVD subtitle RLE convention.
const COUNT4_MIN: u32 = 0x40;
const COUNT3_MIN: u32 = 0x10;
const COUNT2_MIN: u32 = 0x04;

fn encode_run(w: &mut BitWriter, count: u32, val: u8) {
    debug_assert!(count > 0);
    let mut remaining = count;
    while remaining > 0 {
        if remaining >= COUNT4_MIN {
            let chunk = remaining.min(0xFF);
            w.push_bits(0, 6);
            w.push_bits(chunk, 8);
            w.push_bits(u32::from(val), 2);
            remaining -= chunk;
        } else if remaining >= COUNT3_MIN {
            let chunk = remaining.min(0x3F);
            w.push_bits(0, 4);
            w.push_bits(chunk, 6);
            w.push_bits(u32::from(val), 2);
            remaining -= chunk;
        } else if remaining >= COUNT2_MIN {
            let chunk = remaining.min(0x0F);
            w.push_bits(0, 2);
            w.push_bits(chunk, 4);
            w.push_bits(u32::from(val), 2);
            remaining -= chunk;
        } else {
            w.push_bits(remaining, 2);
            w.push_bits(u32::from(val), 2);
            remaining = 0;
        }
    }
}

fn encode_fill(w: &mut BitWriter, val: u8) {
    w.push_bits(0, 14);
    w.push_bits(u32::from(val), 2);
}

fn encode_scan_line(w: &mut BitWriter, line: &[u8]) {
    let width = line.len();
    let mut x = 0;
    while x < width {
        let val = line[x];
        let mut run = 1;
        while x + run < width && line[x + run] == val {
            run += 1;
        }
        if x + run == width {
            encode_fill(w, val);
        } else {
            encode_run(w, run as u32, val);
        }
        x += run;
    }
    w.align_to_byte();
}

/// Encode every other scan line of `pixels` (one byte per pixel, row
/// major, values `0..=3`) into a packed RLE byte stream.
#[must_use]
#[profiling::function]
pub fn encode_lines(pixels: &[u8], width: usize, height: usize, even_field: bool) -> Vec<u8> {
    let mut w = BitWriter::new();
    let start = usize::from(!even_field);
    let mut y = start;
    while y < height {
        encode_scan_line(&mut w, &pixels[y * width..(y + 1) * width]);
        y += 2;
    }
    w.align_to_byte();
    w.bytes
}

/// "Fill to end of line": 14 zero bits, no count field at all.
fn end_of_line(input: BitInput) -> IResult<BitInput, u16> {
    nom::combinator::value(0u16, tag_bits(0u8, 14usize)).parse(input)
}

/// 6 zero bits + an 8-bit count.
fn count4(input: BitInput) -> IResult<BitInput, u16> {
    preceded(tag_bits(0u8, 6usize), take_bits(8usize)).parse(input)
}

/// 4 zero bits + a 6-bit count.
fn count3(input: BitInput) -> IResult<BitInput, u16> {
    preceded(tag_bits(0u8, 4usize), take_bits(6usize)).parse(input)
}

/// 2 zero bits + a 4-bit count.
fn count2(input: BitInput) -> IResult<BitInput, u16> {
    preceded(tag_bits(0u8, 2usize), take_bits(4usize)).parse(input)
}

/// A plain 2-bit count, tried last since it has no leading-zero
/// requirement to disambiguate it from the wider forms.
fn count1(input: BitInput) -> IResult<BitInput, u16> {
    take_bits(2usize).parse(input)
}

fn count(input: BitInput) -> IResult<BitInput, u16> {
    alt((end_of_line, count4, count3, count2, count1)).parse(input)
}

fn pixel_value(input: BitInput) -> IResult<BitInput, u8> {
    take_bits(2usize).parse(input)
}

fn rle(input: BitInput) -> IResult<BitInput, Run> {
    let (input, (count, val)) = pair(count, pixel_value).parse(input)?;
    Ok((input, Run { count, val }))
}

/// Decode one scan line out of `pos`, threading the bit cursor across
/// every run in the line, and byte-align it before returning.
fn decode_scan_line<'a>(
    mut pos: BitInput<'a>,
    out: &mut [u8],
) -> Result<BitInput<'a>, FormatError> {
    let width = out.len();
    let mut x = 0;
    while x < width {
        let (next_pos, run) =
            rle(pos).map_err(|_| FormatError::Rle("ran past end of RLE field".into()))?;
        pos = next_pos;
        let count = if run.count == 0 {
            width - x
        } else {
            run.count as usize
        };
        if x + count > width {
            return Err(FormatError::Rle("scan line decoded past its width".into()));
        }
        out[x..x + count].fill(run.val);
        x += count;
    }
    if pos.1 > 0 {
        pos = (&pos.0[1..], 0);
    }
    Ok(pos)
}

/// Decode the even/odd RLE streams into a row-major, one-byte-per-pixel
/// bitmap.
///
/// # Errors
/// Returns [`FormatError::Rle`] if either field's encoded run lengths
/// don't sum to exactly `width` pixels for one of its lines, or if a
/// field runs out of bytes mid-line.
pub fn decode_image(
    width: usize,
    height: usize,
    even: &[u8],
    odd: &[u8],
) -> Result<Vec<u8>, FormatError> {
    let mut img = vec![0u8; width * height];
    let mut even_pos: BitInput = (even, 0);
    let mut odd_pos: BitInput = (odd, 0);
    for y in 0..height {
        let row = &mut img[y * width..(y + 1) * width];
        if y % 2 == 0 {
            even_pos = decode_scan_line(even_pos, row)?;
        } else {
            odd_pos = decode_scan_line(odd_pos, row)?;
        }
    }
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_solid_bitmap() {
        let width = 16;
        let height = 8;
        let pixels = vec![2u8; width * height];
        let even = encode_lines(&pixels, width, height, true);
        let odd = encode_lines(&pixels, width, height, false);
        let decoded = decode_image(width, height, &even, &odd).unwrap();
        assert_eq!(decoded, pixels);
    }

    #[test]
    fn roundtrips_a_varied_bitmap() {
        let width = 20;
        let height = 6;
        let mut pixels = vec![0u8; width * height];
        for (i, p) in pixels.iter_mut().enumerate() {
            *p = (i % 4) as u8;
        }
        let even = encode_lines(&pixels, width, height, true);
        let odd = encode_lines(&pixels, width, height, false);
        let decoded = decode_image(width, height, &even, &odd).unwrap();
        assert_eq!(decoded, pixels);
    }

    #[test]
    fn roundtrips_long_runs_spanning_multiple_count_widths() {
        let width = 400;
        let height = 2;
        let mut pixels = vec![1u8; width * height];
        // A long run that must be split across several RLE chunks.
        for p in pixels.iter_mut().take(300) {
            *p = 3;
        }
        let even = encode_lines(&pixels, width, height, true);
        let odd = encode_lines(&pixels, width, height, false);
        let decoded = decode_image(width, height, &even, &odd).unwrap();
        assert_eq!(decoded, pixels);
    }

    #[test]
    fn fill_to_end_of_line_uses_zero_count() {
        let mut w = BitWriter::new();
        encode_scan_line(&mut w, &[1, 1, 1, 1]);
        let (_rest, run) = rle((&w.bytes, 0)).unwrap();
        assert_eq!(run.count, 0);
        assert_eq!(run.val, 1);
    }
}

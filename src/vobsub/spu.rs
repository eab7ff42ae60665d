//! The SP_DCSQ control header: the part of a reassembled subpicture
//! that carries palette, alpha, position, RLE offsets, the forced bit
//! and the display-duration chain.
//!
//! A control header is a chain of records. The first record is just a
//! raw `end_seq` `u16` followed directly by commands; every later
//! record is `(delay: u16, next: u16, commands...)`. Both `end_seq`
//! and `next` are encoded the same way: the absolute byte offset (from
//! the start of the enclosing SPU, not the control buffer) of where
//! the following record begins, so recovering a buffer-local index
//! means subtracting back out `ctrl_offset_relative` (the control
//! buffer's own SPU-relative start, plus the 2 bytes `end_seq`/`next`
//! itself occupies).

use log::warn;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_until};
use nom::combinator::{map, value};
use nom::multi::many_till;
use nom::number::complete::{be_u16, be_u8};
use nom::sequence::preceded;
use nom::{IResult, Parser as _};

use crate::content::{Area, AreaValues};
use crate::errors::{FormatError, FormatWarning};

/// Everything [`parse`] recovers from a control buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedControl {
    /// Four indices into the master palette.
    pub palette_indices: [u8; 4],
    /// Four 4-bit alpha values.
    pub alpha_indices: [u8; 4],
    /// The display rectangle.
    pub area: Area,
    /// Byte offset to the even-field RLE stream, relative to the RLE buffer.
    pub even_offset: u16,
    /// Byte offset to the odd-field RLE stream, relative to the RLE buffer.
    pub odd_offset: u16,
    /// Was the forced (`0x00`) command present?
    pub forced: bool,
    /// Display duration in 90 kHz ticks, `0` if there was no chained stop sequence.
    pub duration_ticks: i64,
}

/// Parameters needed to serialize a control header back to bytes. This
/// is the write-side mirror of [`ParsedControl`], minus the bookkeeping
/// ([`ParsedControl::duration_ticks`] becomes an input parameter named
/// for clarity).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlHeaderSpec {
    /// Four indices into the master palette.
    pub palette_indices: [u8; 4],
    /// Four 4-bit alpha values.
    pub alpha_indices: [u8; 4],
    /// The display rectangle.
    pub area: AreaValues,
    /// Length, in bytes, of the even-field RLE stream (used to compute the odd offset).
    pub even_len: u16,
    /// Byte offset to the odd-field RLE stream, relative to the RLE buffer.
    pub odd_offset: u16,
    /// Emit the forced (`0x00`) command?
    pub forced: bool,
    /// Display duration in 90 kHz ticks. `0` emits no stop sequence.
    pub duration_ticks: i64,
}

/// Unpack two packed 4-bit-pair bytes into `[p0, p1, p2, p3]`, matching
/// control commands `0x03` and `0x04`.
fn unpack_nibble_pairs(hi: u8, lo: u8) -> [u8; 4] {
    [lo & 0x0F, lo >> 4, hi & 0x0F, hi >> 4]
}

/// Inverse of [`unpack_nibble_pairs`].
fn pack_nibble_pairs(v: [u8; 4]) -> (u8, u8) {
    ((v[3] << 4) | (v[2] & 0x0F), (v[1] << 4) | (v[0] & 0x0F))
}

fn parse_area(b: &[u8]) -> AreaValues {
    debug_assert_eq!(b.len(), 6);
    let bits: u64 = (u64::from(b[0]) << 40)
        | (u64::from(b[1]) << 32)
        | (u64::from(b[2]) << 24)
        | (u64::from(b[3]) << 16)
        | (u64::from(b[4]) << 8)
        | u64::from(b[5]);
    let x1 = ((bits >> 36) & 0xFFF) as u16;
    let x2 = ((bits >> 24) & 0xFFF) as u16;
    let y1 = ((bits >> 12) & 0xFFF) as u16;
    let y2 = (bits & 0xFFF) as u16;
    AreaValues { x1, y1, x2, y2 }
}

fn serialize_area(a: &AreaValues) -> [u8; 6] {
    let bits: u64 = (u64::from(a.x1 & 0xFFF) << 36)
        | (u64::from(a.x2 & 0xFFF) << 24)
        | (u64::from(a.y1 & 0xFFF) << 12)
        | u64::from(a.y2 & 0xFFF);
    let raw = bits.to_be_bytes();
    [raw[2], raw[3], raw[4], raw[5], raw[6], raw[7]]
}

/// One decoded command inside a control record. `Unknown` carries
/// whatever bytes preceded the terminator so the caller can still
/// locate it, even though it doesn't know how to interpret them.
#[derive(Clone, Debug)]
enum Command<'a> {
    Forced,
    StartDisplay,
    StopDisplay,
    Palette([u8; 4]),
    Alpha([u8; 4]),
    Area(AreaValues),
    RleOffsets([u16; 2]),
    ColorAlphaUpdate([u8; 12]),
    Unknown(&'a [u8]),
}

fn nibble_pair(input: &[u8]) -> IResult<&[u8], [u8; 4]> {
    let (input, hi) = be_u8(input)?;
    let (input, lo) = be_u8(input)?;
    Ok((input, unpack_nibble_pairs(hi, lo)))
}

fn area_command(input: &[u8]) -> IResult<&[u8], AreaValues> {
    map(nom::bytes::complete::take(6usize), parse_area).parse(input)
}

fn rle_offsets_command(input: &[u8]) -> IResult<&[u8], [u16; 2]> {
    let (input, (even, odd)) = (be_u16, be_u16).parse(input)?;
    Ok((input, [even.saturating_sub(4), odd.saturating_sub(4)]))
}

fn color_alpha_update_command(input: &[u8]) -> IResult<&[u8], [u8; 12]> {
    map(nom::bytes::complete::take(12usize), |b: &[u8]| {
        let mut out = [0u8; 12];
        out.copy_from_slice(b);
        out
    })
    .parse(input)
}

/// Parse a single command. Anything outside the closed opcode set is
/// swallowed up to the terminator as [`Command::Unknown`], so the
/// caller can always find the record boundary even for a command it
/// doesn't understand.
fn control_command(input: &[u8]) -> IResult<&[u8], Command<'_>> {
    alt((
        value(Command::Forced, tag(&[0x00][..])),
        value(Command::StartDisplay, tag(&[0x01][..])),
        value(Command::StopDisplay, tag(&[0x02][..])),
        map(preceded(tag(&[0x03][..]), nibble_pair), Command::Palette),
        map(preceded(tag(&[0x04][..]), nibble_pair), Command::Alpha),
        map(preceded(tag(&[0x05][..]), area_command), Command::Area),
        map(
            preceded(tag(&[0x06][..]), rle_offsets_command),
            Command::RleOffsets,
        ),
        map(
            preceded(tag(&[0x07][..]), color_alpha_update_command),
            Command::ColorAlphaUpdate,
        ),
        map(take_until(&[0xFF][..]), Command::Unknown),
    ))
    .parse(input)
}

fn control_command_end(input: &[u8]) -> IResult<&[u8], &[u8]> {
    tag(&[0xFF][..])(input)
}

/// Parse every command up to and including the `0xFF` terminator,
/// returning the commands and the number of bytes consumed (including
/// the terminator).
fn command_list(input: &[u8]) -> Result<(Vec<Command<'_>>, usize), FormatError> {
    let (rest, (commands, _)) = many_till(control_command, control_command_end)
        .parse(input)
        .map_err(|_| FormatError::TruncatedControlSequence)?;
    Ok((commands, input.len() - rest.len()))
}

/// Accumulated record state, shared by whichever record(s) happen to
/// carry palette/alpha/area/RLE-offset commands.
#[derive(Default)]
struct State {
    palette: Option<[u8; 4]>,
    alpha: Option<[u8; 4]>,
    area: Option<AreaValues>,
    even_offset: Option<u16>,
    odd_offset: Option<u16>,
    forced: bool,
}

/// Apply one record's decoded commands to `state`. Returns once an
/// unknown command or a `0x07` update is hit, matching the documented
/// "stop parsing further commands in this record" behavior.
fn apply_commands(commands: &[Command<'_>], state: &mut State) {
    for command in commands {
        match command {
            Command::Forced => state.forced = true,
            Command::StartDisplay | Command::StopDisplay => {}
            Command::Palette(p) => {
                state.palette.get_or_insert(*p);
            }
            Command::Alpha(a) => {
                state.alpha.get_or_insert(*a);
            }
            Command::Area(a) => {
                state.area.get_or_insert(*a);
            }
            Command::RleOffsets([even, odd]) => {
                state.even_offset = Some(*even);
                state.odd_offset = Some(*odd);
            }
            Command::ColorAlphaUpdate(bytes) => {
                warn!("{}", FormatWarning::PaletteAlphaUpdate);
                let new_palette = unpack_nibble_pairs(bytes[8], bytes[9]);
                let new_alpha = unpack_nibble_pairs(bytes[10], bytes[11]);
                let new_sum: u32 = new_alpha.iter().map(|&v| u32::from(v)).sum();
                let cur_sum: u32 = state
                    .alpha
                    .map(|a: [u8; 4]| a.iter().map(|&v| u32::from(v)).sum())
                    .unwrap_or(0);
                if new_sum > cur_sum {
                    state.palette = Some(new_palette);
                    state.alpha = Some(new_alpha);
                }
                break;
            }
            Command::Unknown(bytes) => {
                if let Some(&opcode) = bytes.first() {
                    warn!("{}", FormatWarning::UnknownCommand(opcode));
                }
                break;
            }
        }
    }
}

/// Rebase a raw SPU-absolute `end_seq`/`next` field into a
/// control-buffer-local index, per the `- ctrl_offset_relative - 2`
/// convention shared by both fields.
fn rebase(raw: u16, ctrl_offset_relative: u16) -> i64 {
    i64::from(raw) - i64::from(ctrl_offset_relative) - 2
}

/// Parse a full control header, following the chained-record structure
/// described in the module documentation.
///
/// `ctrl_offset_relative` is the control buffer's own offset from the
/// start of the enclosing SPU (the `ctrl_rel` field read by
/// [`super::mpeg2::packetizer::read_subpicture`]), needed to rebase the
/// chain's SPU-absolute offsets back into this buffer's own indices.
///
/// # Errors
/// Returns [`FormatError`] if the buffer is truncated or a required
/// command never appeared.
pub fn parse(buf: &[u8], ctrl_offset_relative: u16) -> Result<ParsedControl, FormatError> {
    let ctrl_size = buf.len();
    if ctrl_size < 2 {
        return Err(FormatError::TruncatedControlSequence);
    }
    let raw_end_seq = u16::from_be_bytes([buf[0], buf[1]]);
    let end_seq_ofs = rebase(raw_end_seq, ctrl_offset_relative);
    if end_seq_ofs < 0 || end_seq_ofs as usize > ctrl_size {
        warn!(
            "{}",
            FormatWarning::InvalidEndSequenceOffset {
                offset: end_seq_ofs,
                clamped_to: ctrl_size,
            }
        );
    }

    let mut state = State::default();
    let (commands, consumed) = command_list(&buf[2..])?;
    apply_commands(&commands, &mut state);

    let mut sequence_count = 1usize;
    let mut sequence_delays: Vec<i64> = Vec::new();

    if end_seq_ofs != ctrl_size as i64 {
        let mut record_start = 2 + consumed;
        loop {
            if record_start + 4 > ctrl_size {
                break;
            }
            let delay = u16::from_be_bytes([buf[record_start], buf[record_start + 1]]);
            let raw_next =
                u16::from_be_bytes([buf[record_start + 2], buf[record_start + 3]]);
            let next_idx = rebase(raw_next, ctrl_offset_relative);

            let (commands, consumed) = command_list(&buf[record_start + 4..])?;
            apply_commands(&commands, &mut state);

            sequence_count += 1;
            sequence_delays.push(i64::from(delay));

            if next_idx == record_start as i64 {
                // Points back at its own start: last record in the chain.
                break;
            }
            if next_idx < 0 || next_idx as usize > ctrl_size {
                break;
            }
            record_start = record_start + 4 + consumed;
        }
    }

    if sequence_count > 2 {
        warn!(
            "{}",
            FormatWarning::TooManyChainedSequences {
                count: sequence_count
            }
        );
    }

    let palette_indices = state
        .palette
        .ok_or(FormatError::MissingControlCommand("palette (0x03)"))?;
    let alpha_indices = state.alpha.unwrap_or([0; 4]);
    let area_values = state
        .area
        .ok_or(FormatError::MissingControlCommand("display area (0x05)"))?;
    let area = Area::try_from(area_values)?;
    let (even_offset, odd_offset) = (
        state.even_offset.unwrap_or(0),
        state.odd_offset.unwrap_or(0),
    );

    let duration_ticks = sequence_delays.last().map_or(0, |d| d * 1024);

    Ok(ParsedControl {
        palette_indices,
        alpha_indices,
        area,
        even_offset,
        odd_offset,
        forced: state.forced,
        duration_ticks,
    })
}

/// Serialize a control header from [`ControlHeaderSpec`], producing the
/// exact byte layout [`parse`] expects. When `forced` is set the first
/// record's commands begin with the `0x00` command before `0x01`; when
/// `duration_ticks` is nonzero a second chained record carrying the
/// `0x02` (stop) command is appended, and its `next` field repeats the
/// same SPU-absolute value as the leading `end_seq` field, making it
/// point back at its own start once rebased.
///
/// `ctrl_offset_relative` must be the same value the buffer will
/// eventually be framed at (`rle_size + 2`), so the emitted offsets
/// rebase correctly on the read side.
#[must_use]
pub fn serialize(spec: &ControlHeaderSpec, ctrl_offset_relative: u16) -> Vec<u8> {
    let mut commands = Vec::new();
    if spec.forced {
        commands.push(0x00);
    }
    commands.push(0x01);
    commands.push(0x03);
    let (hi, lo) = pack_nibble_pairs(spec.palette_indices);
    commands.extend_from_slice(&[hi, lo]);
    commands.push(0x04);
    let (hi, lo) = pack_nibble_pairs(spec.alpha_indices);
    commands.extend_from_slice(&[hi, lo]);
    commands.push(0x05);
    commands.extend_from_slice(&serialize_area(&spec.area));
    commands.push(0x06);
    commands.extend_from_slice(&4u16.to_be_bytes());
    commands.extend_from_slice(&(spec.odd_offset + 4).to_be_bytes());
    commands.push(0xFF);

    let record1_len = 2 + commands.len();

    // The raw (SPU-absolute) value that rebases to `record1_len`, the
    // buffer-local index right after the first record's terminator.
    let next_record_raw =
        (record1_len as i64 + i64::from(ctrl_offset_relative) + 2) as u16;
    // And the raw value that rebases to `ctrl_size` itself, used when
    // there's no chain at all: the buffer ends exactly where the first
    // record does.
    let end_of_buffer_raw =
        (record1_len as i64 + i64::from(ctrl_offset_relative) + 2) as u16;

    let mut out = Vec::with_capacity(record1_len + 16);
    if spec.duration_ticks == 0 {
        out.extend_from_slice(&end_of_buffer_raw.to_be_bytes());
        out.extend_from_slice(&commands);
    } else {
        out.extend_from_slice(&next_record_raw.to_be_bytes());
        out.extend_from_slice(&commands);

        let delay = u16::try_from(spec.duration_ticks / 1024).unwrap_or(u16::MAX);
        out.extend_from_slice(&delay.to_be_bytes());
        out.extend_from_slice(&next_record_raw.to_be_bytes());
        out.push(0x02); // stop display
        out.push(0xFF);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec(forced: bool, duration_ticks: i64) -> ControlHeaderSpec {
        ControlHeaderSpec {
            palette_indices: [0, 1, 2, 3],
            alpha_indices: [15, 15, 15, 0],
            area: AreaValues {
                x1: 0,
                y1: 0,
                x2: 15,
                y2: 31,
            },
            even_len: 12,
            odd_offset: 12,
            forced,
            duration_ticks,
        }
    }

    const CTRL_OFFSET_RELATIVE: u16 = 0x0802;

    #[test]
    fn roundtrips_without_end_sequence() {
        let spec = sample_spec(false, 0);
        let bytes = serialize(&spec, CTRL_OFFSET_RELATIVE);
        let parsed = parse(&bytes, CTRL_OFFSET_RELATIVE).unwrap();
        assert_eq!(parsed.palette_indices, spec.palette_indices);
        assert_eq!(parsed.alpha_indices, spec.alpha_indices);
        assert_eq!(parsed.area, Area::try_from(spec.area).unwrap());
        assert_eq!(parsed.even_offset, 0);
        assert_eq!(parsed.odd_offset, 12);
        assert!(!parsed.forced);
        assert_eq!(parsed.duration_ticks, 0);
    }

    #[test]
    fn roundtrips_with_chained_end_sequence() {
        let spec = sample_spec(true, 25 * 1024);
        let bytes = serialize(&spec, CTRL_OFFSET_RELATIVE);
        let parsed = parse(&bytes, CTRL_OFFSET_RELATIVE).unwrap();
        assert!(parsed.forced);
        assert_eq!(parsed.duration_ticks, 25 * 1024);
    }

    #[test]
    fn palette_and_alpha_nibble_packing_matches_spec_table() {
        // p3<<4|p2, p1<<4|p0
        assert_eq!(unpack_nibble_pairs(0x32, 0x10), [0, 1, 2, 3]);
        assert_eq!(pack_nibble_pairs([0, 1, 2, 3]), (0x32, 0x10));
    }

    #[test]
    fn unknown_command_without_a_required_field_is_an_error() {
        // end_seq == ctrl_size (no chain), then an unknown 0x09 opcode
        // with nothing after it but the terminator.
        let buf = vec![0x08, 0x04, 0x09, 0xFF];
        assert!(matches!(
            parse(&buf, CTRL_OFFSET_RELATIVE),
            Err(FormatError::MissingControlCommand(_))
        ));
    }

    /// A fixed control header whose chain offsets are encoded the way a
    /// real disc does it: SPU-absolute, rebased via
    /// `ctrl_offset_relative`. Exercises the exact layout documented in
    /// the module comment rather than this module's own serializer.
    #[test]
    fn parses_a_two_sequence_header_with_absolute_chain_offsets() {
        let ctrl_offset_relative: u16 = 0x0800;
        #[rustfmt::skip]
        let buf: Vec<u8> = vec![
            0x00, 0x04,
            0x01,
            0x03, 0x32, 0x10,
            0x04, 0xFF, 0xFF,
            0x05, 0x00, 0x01, 0x00, 0x00, 0x02, 0x00,
            0x06, 0x00, 0x04, 0x00, 0x10,
            0xFF,
            0x00, 0x19,
            0x00, 0x04,
            0x02,
            0xFF,
        ];
        let parsed = parse(&buf, ctrl_offset_relative).unwrap();
        assert_eq!(parsed.palette_indices, [0, 1, 2, 3]);
        assert_eq!(parsed.alpha_indices, [15, 15, 15, 15]);
        assert_eq!(parsed.area, Area::try_from(AreaValues { x1: 0, y1: 0, x2: 15, y2: 31 }).unwrap());
        assert_eq!(parsed.even_offset, 0);
        assert_eq!(parsed.odd_offset, 12);
        assert!(!parsed.forced);
        assert_eq!(parsed.duration_ticks, 25 * 1024);
    }
}

//! Splits/concatenates an SPU payload (`rle_bytes || control_header_bytes`)
//! into the 2048-byte MPEG-2 Program-Stream packs a `.sub` file is made
//! of, and the inverse reassembly on read.
//!
//! A single logical subpicture is scattered across one or more packs,
//! each carrying a `0x000001BA` pack header followed by a
//! `0x000001BD` private-stream-1 PES header. Only the first pack of a
//! subpicture carries the PTS and the SPU's total-size/control-offset
//! fields; every pack (first or not) may carry RLE bytes, control
//! bytes, or both, and the control header may straddle a pack boundary.

use log::warn;
use nom::bytes::complete::{tag, take};
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use super::clock::encode_pts;
use crate::errors::{FormatError, FormatWarning};
use crate::vobsub::byte_buffer::ByteBuffer;
use crate::vobsub::subpicture::RleFragment;

/// Size of every pack in a `.sub` file, including padding packets.
pub const PACK_SIZE: u64 = 2048;

const PACK_TAG: u32 = 0x0000_01BA;
const PES_TAG: u32 = 0x0000_01BD;
const PADDING_TAG: u32 = 0x0000_01BE;

/// 14-byte fixed PACK header: start code, an arbitrary SCR/mux-rate
/// region this codec doesn't need to round-trip meaningfully, and a
/// trailing stuffing-length byte whose low 3 bits absorb small gaps
/// when padding a final pack (`stuffing_count`).
const PACK_HEADER_LEN: u64 = 14;

/// PES header carried by the first pack of an SPU: tag(4) +
/// packet_length(2) + flags1(1) + flags2(1, bit7 = first-pack) +
/// pts_length(1) + pts(5) + stream_id(1) + total_size(2) +
/// ctrl_offset_relative(2) = 19 bytes.
const FIRST_PES_HEADER_LEN: u64 = 19;

/// PES header carried by every subsequent pack of the same SPU:
/// tag(4) + packet_length(2) + flags1(1) + flags2(1) + pts_length(1,
/// always 0) + stream_id(1) = 10 bytes.
const CONT_PES_HEADER_LEN: u64 = 10;

fn round_up_to_pack(offset: u64) -> u64 {
    offset.div_ceil(PACK_SIZE) * PACK_SIZE
}

/// A window of bytes read up front from a pack's start, large enough to
/// hold the widest possible pack + first-pack PES header
/// (`14 + 7` stuffing `+ 19`), with margin.
const HEADER_WINDOW_LEN: usize = 48;

/// Parse the 14+-byte PACK header: start code, SCR/mux-rate region this
/// codec doesn't round-trip, and the stuffing-length byte plus its
/// stuffing bytes.
fn pack_header(input: &[u8]) -> IResult<&[u8], ()> {
    let (input, _) = tag(&PACK_TAG.to_be_bytes()[..])(input)?;
    let (input, _) = take(9usize)(input)?;
    let (input, stuffing_byte) = be_u8(input)?;
    let (input, _) = take(usize::from(stuffing_byte & 0x07))(input)?;
    Ok((input, ()))
}

/// Fields common to every pack's PES header, through the sub-stream ID
/// byte. `rest` is not stored; callers read it off the parser's return
/// value instead, since a continuation pack's header ends here while a
/// first pack's carries two more fields.
struct PesHeaderCommon {
    packet_length: u16,
    first_pack_in_spu: bool,
    pts: Option<[u8; 5]>,
    stream_id: u8,
}

fn pes_header_common(input: &[u8]) -> IResult<&[u8], PesHeaderCommon> {
    let (input, _) = tag(&PES_TAG.to_be_bytes()[..])(input)?;
    let (input, packet_length) = be_u16(input)?;
    let (input, _flags1) = be_u8(input)?;
    let (input, flags2) = be_u8(input)?;
    let first_pack_in_spu = flags2 & 0x80 != 0;
    let (input, pts_length) = be_u8(input)?;
    let (input, pts) = if pts_length == 5 {
        let (input, bytes) = take(5usize)(input)?;
        let mut arr = [0u8; 5];
        arr.copy_from_slice(bytes);
        (input, Some(arr))
    } else {
        let (input, _) = take(usize::from(pts_length))(input)?;
        (input, None)
    };
    let (input, raw_stream_id) = be_u8(input)?;
    Ok((
        input,
        PesHeaderCommon {
            packet_length,
            first_pack_in_spu,
            pts,
            stream_id: raw_stream_id.wrapping_sub(0x20),
        },
    ))
}

/// The two extra fields only the first pack of an SPU carries: the
/// SPU's total size and the control header's offset relative to it.
fn first_pack_extra(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    let (input, total_size) = be_u16(input)?;
    let (input, ctrl_rel) = be_u16(input)?;
    Ok((input, (total_size, ctrl_rel)))
}

/// Everything [`read_subpicture`] recovers from walking the packs of
/// one subpicture.
#[derive(Debug, Clone)]
pub struct ReadSubpicture {
    /// Where the RLE bytes live in the source file, in order.
    pub rle_fragments: Vec<RleFragment>,
    /// Total RLE byte count across all fragments.
    pub rle_size: u32,
    /// The reassembled control header bytes (SP_DCSQ).
    pub control_bytes: Vec<u8>,
    /// The PTS carried by the first pack, as written by the encoder.
    pub pts: i64,
    /// The control buffer's own offset from the start of the SPU
    /// (`ctrl_rel` from the first pack's PES header), needed to rebase
    /// the control header's SPU-absolute chain offsets.
    pub ctrl_offset_relative: u16,
    /// Byte offset one past the last pack belonging to this subpicture.
    pub end_offset: u64,
}

/// Read one subpicture's packs starting at `file_offset`, stopping once
/// the control buffer has been completely reassembled or `end_offset`
/// (the next subpicture's start, or EOF) is reached.
///
/// # Errors
/// Returns [`FormatError`] if a pack or PES header is malformed, or if
/// the SPU's declared total size produces a negative control size.
pub fn read_subpicture(
    buf: &mut ByteBuffer,
    file_offset: u64,
    end_offset: u64,
    active_stream_id: u8,
) -> Result<ReadSubpicture, FormatError> {
    let mut cursor = file_offset;
    let mut rle_fragments = Vec::new();
    let mut rle_remaining: u32 = 0;
    let mut ctrl_remaining: i64 = -1; // -1 until the first pack sets it.
    let mut control_bytes = Vec::new();
    let mut pts = 0i64;
    let mut ctrl_offset_relative: u16 = 0;
    let mut started = false;

    loop {
        if cursor >= end_offset {
            break;
        }
        let pack_start = cursor;
        let window_len = HEADER_WINDOW_LEN.min((buf.size().saturating_sub(pack_start)) as usize);
        let window = buf.read_bytes(pack_start, window_len)?;

        let rest_after_pack = pack_header(&window)
            .map(|(rest, ())| rest)
            .map_err(|_: nom::Err<nom::error::Error<&[u8]>>| {
                FormatError::MissingPackHeader(pack_start)
            })?;
        let after_pack_len = window.len() - rest_after_pack.len();
        let pes_tag_offset = pack_start + after_pack_len as u64;

        let (rest_after_common, common) = pes_header_common(rest_after_pack)
            .map_err(|_: nom::Err<nom::error::Error<&[u8]>>| {
                FormatError::MissingPesHeader(pes_tag_offset)
            })?;
        let len_field_offset = pes_tag_offset + 4;
        let next_pack_offset = len_field_offset + 2 + u64::from(common.packet_length);

        let mut field_cursor =
            pack_start + (window.len() - rest_after_common.len()) as u64;
        let first_pack_in_spu = common.first_pack_in_spu;
        if !started && common.pts.is_some() {
            pts = super::clock::decode_pts(&common.pts.unwrap_or([0; 5])) as i64;
        }
        let stream_id = common.stream_id;

        if stream_id != active_stream_id {
            if started {
                // An interleaved pack for another stream showed up in the
                // middle of this SPU; unusual but not fatal, other
                // streams are routinely interleaved between pack
                // boundaries belonging to ours.
                warn!(
                    "{}",
                    FormatWarning::WrongStream {
                        found: stream_id,
                        expected: active_stream_id,
                    }
                );
            }
            let aligned = round_up_to_pack(next_pack_offset);
            if aligned != next_pack_offset {
                warn!(
                    "{}",
                    FormatWarning::MisalignedFragment {
                        offset: next_pack_offset,
                        aligned,
                    }
                );
            }
            cursor = aligned.max(pack_start + PACK_SIZE);
            continue;
        }

        if !started {
            if !first_pack_in_spu {
                warn!("first pack for stream 0x{stream_id:x} did not set the first-pack flag");
            }
            let (rest_after_extra, (total_size_u16, ctrl_rel_u16)) =
                first_pack_extra(rest_after_common).map_err(
                    |_: nom::Err<nom::error::Error<&[u8]>>| {
                        FormatError::MissingPesHeader(pes_tag_offset)
                    },
                )?;
            field_cursor = pack_start + (window.len() - rest_after_extra.len()) as u64;
            let total_size = i64::from(total_size_u16);
            let ctrl_rel = i64::from(ctrl_rel_u16);
            let rle_size_signed = ctrl_rel - 2;
            let ctrl_size = total_size - ctrl_rel - 2;
            if ctrl_size < 0 || rle_size_signed < 0 {
                return Err(FormatError::InvalidControlSize {
                    total: total_size,
                    ctrl_rel,
                    ctrl_size,
                });
            }
            rle_remaining = rle_size_signed as u32;
            ctrl_remaining = ctrl_size;
            ctrl_offset_relative = ctrl_rel as u16;
            started = true;
        }

        let payload_start = field_cursor;
        let payload_len = next_pack_offset.saturating_sub(payload_start);

        let rle_take = u64::from(rle_remaining).min(payload_len);
        if rle_take > 0 {
            rle_fragments.push(RleFragment {
                absolute_offset: payload_start,
                length: rle_take as usize,
            });
            rle_remaining -= rle_take as u32;
        }
        let ctrl_budget = u64::try_from(ctrl_remaining).unwrap_or(0);
        let ctrl_take = ctrl_budget.min(payload_len - rle_take);
        if ctrl_take > 0 {
            let bytes = buf.read_bytes(payload_start + rle_take, ctrl_take as usize)?;
            control_bytes.extend_from_slice(&bytes);
            ctrl_remaining -= ctrl_take as i64;
        }

        if ctrl_remaining <= 0 && started {
            cursor = next_pack_offset;
            break;
        }

        let aligned = round_up_to_pack(next_pack_offset);
        if aligned != next_pack_offset {
            warn!(
                "{}",
                FormatWarning::MisalignedFragment {
                    offset: next_pack_offset,
                    aligned,
                }
            );
        }
        cursor = aligned.max(pack_start + PACK_SIZE);
    }

    let expected_ctrl_len = if started {
        (ctrl_remaining.max(0) + control_bytes.len() as i64) as usize
    } else {
        control_bytes.len()
    };
    if control_bytes.len() < expected_ctrl_len {
        warn!(
            "{}",
            FormatWarning::ShortControlBuffer {
                collected: control_bytes.len(),
                expected: expected_ctrl_len,
            }
        );
        control_bytes.resize(expected_ctrl_len, 0xFF);
    }

    let rle_size = rle_fragments.iter().map(|f| f.length as u32).sum();

    Ok(ReadSubpicture {
        rle_fragments,
        rle_size,
        control_bytes,
        pts,
        ctrl_offset_relative,
        end_offset: cursor,
    })
}

/// Parameters needed to serialize a subpicture's pack stream.
#[derive(Debug, Clone, Copy)]
pub struct WriteSpec<'a> {
    /// Concatenated even+odd RLE bytes.
    pub rle_bytes: &'a [u8],
    /// Serialized SP_DCSQ control header bytes.
    pub control_bytes: &'a [u8],
    /// Start PTS, 90 kHz ticks.
    pub start_pts: i64,
    /// Logical private-stream-1 sub-stream ID (`0x20..=0x3F`, typically
    /// `0x20 + language_index`).
    pub stream_id: u8,
}

/// Serialize an SPU's RLE and control bytes into a byte buffer made of
/// 2048-byte packs, padding the final pack so the total length is a
/// multiple of 2048.
#[must_use]
pub fn write_subpicture(spec: &WriteSpec) -> Vec<u8> {
    let mut payload = Vec::with_capacity(spec.rle_bytes.len() + spec.control_bytes.len());
    payload.extend_from_slice(spec.rle_bytes);
    payload.extend_from_slice(spec.control_bytes);

    let total_size = (spec.rle_bytes.len() + spec.control_bytes.len() + 4) as u16;
    let ctrl_rel = (spec.rle_bytes.len() + 2) as u16;

    let mut out = Vec::new();
    let mut remaining: &[u8] = &payload;
    let mut first = true;
    loop {
        let pes_header_len = if first {
            FIRST_PES_HEADER_LEN
        } else {
            CONT_PES_HEADER_LEN
        };
        let overhead = PACK_HEADER_LEN + pes_header_len;
        let capacity = (PACK_SIZE - overhead) as usize;
        let take = capacity.min(remaining.len());
        let chunk = &remaining[..take];
        remaining = &remaining[take..];

        write_pack_header(&mut out, 0);
        if first {
            write_first_pes_header(&mut out, take as u64, spec, total_size, ctrl_rel);
        } else {
            write_cont_pes_header(&mut out, take as u64, spec.stream_id);
        }
        out.extend_from_slice(chunk);

        first = false;
        if remaining.is_empty() {
            break;
        }
    }

    pad_to_pack_boundary(&mut out);
    out
}

fn write_pack_header(out: &mut Vec<u8>, stuffing_count: u8) {
    out.extend_from_slice(&PACK_TAG.to_be_bytes());
    out.extend(std::iter::repeat(0u8).take(9));
    out.push(stuffing_count & 0x07);
    out.extend(std::iter::repeat(0xFFu8).take(usize::from(stuffing_count & 0x07)));
}

fn write_first_pes_header(
    out: &mut Vec<u8>,
    payload_len: u64,
    spec: &WriteSpec,
    total_size: u16,
    ctrl_rel: u16,
) {
    let packet_length = (13 + payload_len) as u16;
    out.extend_from_slice(&PES_TAG.to_be_bytes());
    out.extend_from_slice(&packet_length.to_be_bytes());
    out.push(0x81); // flags1, unused by the reader.
    out.push(0x80); // flags2, bit7 = first pack in SPU.
    out.push(5); // pts_length.
    out.extend_from_slice(&encode_pts(spec.start_pts as u64));
    out.push(0x20 + spec.stream_id);
    out.extend_from_slice(&total_size.to_be_bytes());
    out.extend_from_slice(&ctrl_rel.to_be_bytes());
}

fn write_cont_pes_header(out: &mut Vec<u8>, payload_len: u64, stream_id: u8) {
    let packet_length = (4 + payload_len) as u16;
    out.extend_from_slice(&PES_TAG.to_be_bytes());
    out.extend_from_slice(&packet_length.to_be_bytes());
    out.push(0x81);
    out.push(0x00); // flags2, bit7 clear: not the first pack.
    out.push(0); // pts_length: no PTS on continuation packs.
    out.push(0x20 + stream_id);
}

/// Pad `out` up to the next 2048-byte boundary. Gaps of 6 bytes or more
/// become a `0x000001BE` padding packet; smaller gaps (which can't hold
/// a padding packet's own 6-byte header) are absorbed as raw filler,
/// since nothing downstream needs to interpret trailing bytes once the
/// control buffer has been fully collected.
fn pad_to_pack_boundary(out: &mut Vec<u8>) {
    let target = round_up_to_pack(out.len() as u64) as usize;
    let gap = target - out.len();
    if gap == 0 {
        return;
    }
    if gap >= 6 {
        out.extend_from_slice(&PADDING_TAG.to_be_bytes());
        let fill_len = (gap - 6) as u16;
        out.extend_from_slice(&fill_len.to_be_bytes());
        out.extend(std::iter::repeat(0xFFu8).take(usize::from(fill_len)));
    } else {
        out.extend(std::iter::repeat(0xFFu8).take(gap));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
            "vobsub_codec_packetizer_test_{:x}",
            std::ptr::addr_of!(bytes[0]) as usize
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        drop(f);
        let buf = ByteBuffer::open(&path).unwrap();
        (TempFile(path), buf)
    }

    #[test]
    fn writes_a_multiple_of_2048() {
        let rle = vec![0xAB; 100];
        let ctrl = vec![0xCD; 20];
        let spec = WriteSpec {
            rle_bytes: &rle,
            control_bytes: &ctrl,
            start_pts: 945_000,
            stream_id: 0,
        };
        let out = write_subpicture(&spec);
        assert_eq!(out.len() % 2048, 0);
    }

    #[test]
    fn roundtrips_a_small_single_pack_spu() {
        let rle = vec![0x11; 40];
        let ctrl = vec![0x22; 10];
        let spec = WriteSpec {
            rle_bytes: &rle,
            control_bytes: &ctrl,
            start_pts: 12_345,
            stream_id: 0,
        };
        let bytes = write_subpicture(&spec);
        let (_guard, mut buf) = fixture(&bytes);
        let result = read_subpicture(&mut buf, 0, bytes.len() as u64, 0).unwrap();
        assert_eq!(result.control_bytes, ctrl);
        assert_eq!(result.rle_size, rle.len() as u32);
        let mut collected = Vec::new();
        for frag in &result.rle_fragments {
            let chunk = buf.read_bytes(frag.absolute_offset, frag.length).unwrap();
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, rle);
        assert_eq!(result.pts, 12_345);
    }

    #[test]
    fn roundtrips_a_multi_pack_spu() {
        let rle = vec![0x33; 5000];
        let ctrl = vec![0x44; 28];
        let spec = WriteSpec {
            rle_bytes: &rle,
            control_bytes: &ctrl,
            start_pts: 945_000,
            stream_id: 0,
        };
        let bytes = write_subpicture(&spec);
        assert_eq!(bytes.len() % 2048, 0);
        assert!(bytes.len() >= 3 * 2048);
        let (_guard, mut buf) = fixture(&bytes);
        let result = read_subpicture(&mut buf, 0, bytes.len() as u64, 0).unwrap();
        assert_eq!(result.control_bytes, ctrl);
        let mut collected = Vec::new();
        for frag in &result.rle_fragments {
            let chunk = buf.read_bytes(frag.absolute_offset, frag.length).unwrap();
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, rle);
    }

    #[test]
    fn skips_packs_for_a_different_stream() {
        let rle = vec![0x55; 30];
        let ctrl = vec![0x66; 8];
        let spec = WriteSpec {
            rle_bytes: &rle,
            control_bytes: &ctrl,
            start_pts: 1,
            stream_id: 3,
        };
        let bytes = write_subpicture(&spec);
        let (_guard, mut buf) = fixture(&bytes);
        // Looking for stream 0 should skip every pack (all for stream 3)
        // and reach end_offset without finding any.
        let result = read_subpicture(&mut buf, 0, bytes.len() as u64, 0).unwrap();
        assert!(result.control_bytes.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn missing_pack_tag_is_a_format_error() {
        let bytes = vec![0u8; 2048];
        let (_guard, mut buf) = fixture(&bytes);
        assert!(matches!(
            read_subpicture(&mut buf, 0, 2048, 0),
            Err(FormatError::MissingPackHeader(0))
        ));
    }
}

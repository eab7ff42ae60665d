//! MPEG-2 PTS (presentation timestamp) packing: the 5-byte field a
//! pack's first PES header carries, interleaving 33 value bits with
//! marker bits per the MPEG-2 spec.

/// Pack a 33-bit PTS-only value into the 5-byte field used by a `PES`
/// header's `PTS` (no `DTS`), per the MPEG-2 bit layout: a leading
/// marker nibble plus three 1-bit markers interleaved with the 33 value
/// bits (`0010 PTS[32..30] 1 | PTS[29..22] | PTS[21..15] 1 | PTS[14..7] |
/// PTS[6..0] 1`).
#[must_use]
pub fn encode_pts(pts: u64) -> [u8; 5] {
    let pts = pts & 0x1_FFFF_FFFF;
    [
        0x21 | (((pts >> 30) & 0x07) << 1) as u8,
        ((pts >> 22) & 0xFF) as u8,
        ((((pts >> 15) & 0x7F) << 1) | 1) as u8,
        ((pts >> 7) & 0xFF) as u8,
        (((pts & 0x7F) << 1) | 1) as u8,
    ]
}

/// Inverse of [`encode_pts`]. Ignores the marker bits rather than
/// validating them, matching the packetizer's tolerant read path.
#[must_use]
pub fn decode_pts(bytes: &[u8; 5]) -> u64 {
    (u64::from((bytes[0] >> 1) & 0x07) << 30)
        | (u64::from(bytes[1]) << 22)
        | (u64::from(bytes[2] >> 1) << 15)
        | (u64::from(bytes[3]) << 7)
        | u64::from(bytes[4] >> 1)
}

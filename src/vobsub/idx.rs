//! Parse and emit the textual `.idx` sidecar that accompanies a `.sub`
//! file: screen geometry, palette, language streams, and the
//! `(pts, file_offset)` seed for every caption.

use std::fs;
use std::io::{self, BufRead};
use std::path::Path;
use std::sync::OnceLock;

use log::{trace, warn};
use regex::Regex;

use crate::errors::IdxError;
use crate::util::parse_int_literal;
use crate::vobsub::language;
use crate::vobsub::subpicture::{IdxHeader, SubPicture};

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([A-Za-z0-9 /_]+?)\s*:\s*(.*?)\s*$").unwrap())
}

fn size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(\d+)\s*x\s*(\d+)$").unwrap())
}

fn org_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\s*,\s*(\d+)$").unwrap())
}

fn hms_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(-?\d+):(\d{2}):(\d{2}):(\d{3})$").unwrap())
}

fn id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^([A-Za-z]{2})\s*,\s*index:\s*(-?\d+)").unwrap())
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(-?\d+):(\d{2}):(\d{2}):(\d{3})\s*,\s*filepos:\s*([0-9A-Fa-f]+)$").unwrap()
    })
}

/// Parses a `.idx` sidecar into its header and the seed subpictures for
/// whichever language stream `langidx:` selects.
#[derive(Debug, Default)]
pub struct IdxParser;

impl IdxParser {
    /// Parse the file at `path`.
    ///
    /// # Errors
    /// Returns [`IdxError`] on an I/O failure or a malformed value for a
    /// recognized key.
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<(IdxHeader, Vec<SubPicture>), IdxError> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|source| IdxError::Io {
            source,
            path: path.to_owned(),
        })?;
        let reader = io::BufReader::new(file);

        let mut header = IdxHeader::default();
        let mut active_langidx: i64 = 0;
        let mut current_stream_active = false;
        let mut seeds = Vec::new();

        for line in reader.lines() {
            let line = line.map_err(|source| IdxError::Io {
                source,
                path: path.to_owned(),
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some(caps) = key_value_re().captures(trimmed) else {
                trace!("idx line without a recognizable 'key: value' shape: {trimmed:?}");
                continue;
            };
            let key = caps[1].to_ascii_lowercase();
            let value = caps[2].trim();

            match key.as_str() {
                "size" => {
                    let caps = size_re()
                        .captures(value)
                        .ok_or_else(|| IdxError::InvalidSize(value.to_owned()))?;
                    header.screen_width = caps[1]
                        .parse()
                        .map_err(|_| IdxError::InvalidSize(value.to_owned()))?;
                    header.screen_height = caps[2]
                        .parse()
                        .map_err(|_| IdxError::InvalidSize(value.to_owned()))?;
                }
                "org" => {
                    let caps = org_re()
                        .captures(value)
                        .ok_or_else(|| IdxError::InvalidOrigin(value.to_owned()))?;
                    header.global_x_ofs = caps[1]
                        .parse()
                        .map_err(|_| IdxError::InvalidOrigin(value.to_owned()))?;
                    header.global_y_ofs = caps[2]
                        .parse()
                        .map_err(|_| IdxError::InvalidOrigin(value.to_owned()))?;
                }
                "time offset" => {
                    header.global_delay_pts = parse_time_offset_ms(value)? * 90;
                }
                "palette" => {
                    header.palette = parse_palette(value)?;
                }
                "langidx" => {
                    active_langidx = parse_int_literal(value);
                    header.active_stream_id = u8::try_from(active_langidx.max(0)).unwrap_or(0);
                }
                "id" => {
                    let caps = id_re().captures(value);
                    match caps {
                        Some(caps) => {
                            let code = &caps[1];
                            let stream_index: i64 = caps[2].parse().unwrap_or(-1);
                            current_stream_active = stream_index == active_langidx;
                            if current_stream_active {
                                match language::LANGUAGES
                                    .iter()
                                    .position(|(_, c)| c.eq_ignore_ascii_case(code))
                                {
                                    Some(pos) => {
                                        header.active_language_index = pos as u8;
                                    }
                                    None => {
                                        warn!(
                                            "unrecognized language code in idx 'id:' line: {code:?}"
                                        );
                                        header.active_language_index = 0;
                                    }
                                }
                            }
                        }
                        None => {
                            trace!("idx 'id:' line did not match the expected shape: {value:?}");
                            current_stream_active = false;
                        }
                    }
                }
                "timestamp" => {
                    if !current_stream_active {
                        continue;
                    }
                    let caps = timestamp_re()
                        .captures(value)
                        .ok_or_else(|| IdxError::InvalidTimeOffset(value.to_owned()))?;
                    let h: i64 = caps[1].parse().unwrap_or(0);
                    let m: i64 = caps[2].parse().unwrap_or(0);
                    let s: i64 = caps[3].parse().unwrap_or(0);
                    let ms: i64 = caps[4].parse().unwrap_or(0);
                    let total_ms = ((h * 60 + m) * 60 + s) * 1000 + ms;
                    let start_pts = total_ms * 90 + header.global_delay_pts;
                    let file_offset = u64::from_str_radix(&caps[5], 16)
                        .map_err(|_| IdxError::InvalidFilepos(caps[5].to_string()))?;
                    seeds.push(SubPicture::seed(
                        file_offset,
                        start_pts,
                        header.screen_width,
                        header.screen_height,
                    ));
                }
                "scale" | "alpha" | "smooth" | "fadein/out" | "fadein" | "fadeout" | "align"
                | "forced subs" | "custom colors" | "alt" => {
                    // Recognized and deliberately ignored; the core has no
                    // model for rendering hints or alternate-id bookkeeping.
                }
                other => trace!("unrecognized idx key: {other:?}"),
            }
        }

        Ok((header, seeds))
    }
}

fn parse_time_offset_ms(value: &str) -> Result<i64, IdxError> {
    if let Some(caps) = hms_re().captures(value) {
        let h: i64 = caps[1].parse().unwrap_or(0);
        let m: i64 = caps[2].parse().unwrap_or(0);
        let s: i64 = caps[3].parse().unwrap_or(0);
        let ms: i64 = caps[4].parse().unwrap_or(0);
        let sign = if h < 0 { -1 } else { 1 };
        return Ok(sign * (((h.abs() * 60 + m) * 60 + s) * 1000 + ms));
    }
    value
        .parse::<i64>()
        .map_err(|_| IdxError::InvalidTimeOffset(value.to_owned()))
}

fn parse_palette(value: &str) -> Result<[(u8, u8, u8); 16], IdxError> {
    let mut out = [(0u8, 0u8, 0u8); 16];
    let mut count = 0;
    for (i, entry) in value.split(',').enumerate() {
        let entry = entry.trim();
        if i >= 16 {
            break;
        }
        if entry.len() != 6 || !entry.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IdxError::InvalidPalette(entry.to_owned()));
        }
        let rgb = u32::from_str_radix(entry, 16)
            .map_err(|_| IdxError::InvalidPalette(entry.to_owned()))?;
        out[i] = (
            ((rgb >> 16) & 0xFF) as u8,
            ((rgb >> 8) & 0xFF) as u8,
            (rgb & 0xFF) as u8,
        );
        count += 1;
    }
    if count == 0 {
        return Err(IdxError::InvalidPalette(value.to_owned()));
    }
    Ok(out)
}

/// Emits the textual `.idx` sidecar in the layout real VobSub tooling
/// produces: a fixed preamble, screen/origin/palette and other
/// rendering-hint keys (most written with fixed defaults this core
/// doesn't model), the active language's `langidx`/`id` pair, and one
/// `timestamp:`/`filepos:` line per caption.
#[derive(Debug, Default)]
pub struct IdxWriter;

/// One caption's emitted position, as recorded by
/// [`super::writer::write_subpicture`] during encoding.
#[derive(Debug, Clone, Copy)]
pub struct TimestampEntry {
    /// Start of display, in 90 kHz ticks.
    pub start_pts: i64,
    /// Absolute byte offset of this caption's first pack in the `.sub` file.
    pub file_offset: u64,
}

impl IdxWriter {
    /// Render `header` and `entries` into the `.idx` text format.
    ///
    /// `crop_offset_y` is subtracted twice from the emitted screen
    /// height, matching the cropping convention
    /// [`super::writer::write_subpicture`] applies to each caption's `y`.
    #[must_use]
    pub fn write(header: &IdxHeader, entries: &[TimestampEntry], crop_offset_y: u16) -> String {
        let mut out = String::new();
        out.push_str("# VobSub index file, v7 (do not modify this line!)\n");
        out.push_str("#\n");
        out.push_str("# To repair desynchronization, you can insert gaps this way:\n");
        out.push_str("# (it usually follows a vob id change)\n");
        out.push_str("#\n");
        out.push_str(&format!(
            "size: {}x{}\n",
            header.screen_width,
            header.screen_height.saturating_sub(2 * crop_offset_y)
        ));
        out.push_str(&format!(
            "org: {}, {}\n",
            header.global_x_ofs, header.global_y_ofs
        ));
        out.push_str("scale: 100%, 100%\n");
        out.push_str("alpha: 100%\n");
        out.push_str("smooth: OFF\n");
        out.push_str("fadein/out: 50, 50\n");
        out.push_str("align: OFF at LEFT TOP\n");
        out.push_str(&format!("time offset: {}\n", header.global_delay_pts / 90));
        out.push_str("forced subs: OFF\n");
        out.push_str("palette: ");
        out.push_str(
            &header
                .palette
                .iter()
                .map(|(r, g, b)| format!("{r:02x}{g:02x}{b:02x}"))
                .collect::<Vec<_>>()
                .join(", "),
        );
        out.push('\n');
        out.push_str("custom colors: OFF, tridx: 1000, colors: 000000, 000000, 000000, 000000\n");
        out.push('\n');
        // The original writer hardcodes langidx to 0 regardless of the
        // configured active language index; preserved here rather than
        // fixed, per the documented known inconsistency.
        out.push_str("langidx: 0\n");
        let code =
            language::code_for_index(usize::from(header.active_language_index)).unwrap_or("en");
        let name = language::name_for_code(code).unwrap_or("Unknown");
        out.push_str(&format!("# {name}\n"));
        out.push_str(&format!("id: {code}, index: 0\n"));
        for entry in entries {
            out.push_str(&format!(
                "timestamp: {}, filepos: {:09x}\n",
                format_hms(entry.start_pts),
                entry.file_offset
            ));
        }
        out
    }
}

fn format_hms(pts: i64) -> String {
    let total_ms = pts / 90;
    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;
    let s = total_s % 60;
    let total_m = total_s / 60;
    let m = total_m % 60;
    let h = total_m / 60;
    format!("{h:02}:{m:02}:{s:02}:{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    struct TempFile(std::path::PathBuf);
    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn fixture(contents: &str) -> (TempFile, std::path::PathBuf) {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "vobsub_codec_idx_test_{:x}",
            std::ptr::addr_of!(contents) as usize
        ));
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (TempFile(path.clone()), path)
    }

    const SAMPLE: &str = "\
# VobSub index file, v7 (do not modify this line!)
size: 720x576
org: 0, 0
time offset: 0
palette: 000000, 828282, ffffff
langidx: 0
id: en, index: 0
timestamp: 00:00:01:000, filepos: 000000000
";

    #[test]
    fn parses_the_s1_scenario() {
        let _ = env_logger::try_init();
        let (_guard, path) = fixture(SAMPLE);
        let (header, seeds) = IdxParser::parse(&path).unwrap();
        assert_eq!(header.screen_width, 720);
        assert_eq!(header.screen_height, 576);
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].start_pts, 90_000);
        assert_eq!(seeds[0].file_offset, 0);
        assert_eq!(seeds[0].width, 720);
        assert_eq!(seeds[0].height, 576);
    }

    #[test]
    fn s4_time_offset_scenario() {
        let sample = "\
size: 720x576
org: 0, 0
time offset: 500
palette: 000000
langidx: 0
id: en, index: 0
timestamp: 00:00:10:000, filepos: 000000000
";
        let (_guard, path) = fixture(sample);
        let (_header, seeds) = IdxParser::parse(&path).unwrap();
        assert_eq!(seeds[0].start_pts, 945_000);
    }

    #[test]
    fn timestamps_for_an_inactive_language_are_skipped() {
        let sample = "\
size: 720x576
org: 0, 0
time offset: 0
palette: 000000
langidx: 1
id: en, index: 0
timestamp: 00:00:01:000, filepos: 000000000
id: fr, index: 1
timestamp: 00:00:02:000, filepos: 000000800
";
        let (_guard, path) = fixture(sample);
        let (header, seeds) = IdxParser::parse(&path).unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].file_offset, 0x800);
        assert_eq!(
            header.active_language_index,
            language::LANGUAGES
                .iter()
                .position(|(_, c)| *c == "fr")
                .unwrap() as u8
        );
    }

    #[test]
    fn invalid_size_is_an_error() {
        let sample = "size: not-a-size\n";
        let (_guard, path) = fixture(sample);
        assert!(matches!(
            IdxParser::parse(&path),
            Err(IdxError::InvalidSize(_))
        ));
    }

    #[test]
    fn invalid_palette_entry_is_an_error() {
        let sample = "palette: zzzzzz\n";
        let (_guard, path) = fixture(sample);
        assert!(matches!(
            IdxParser::parse(&path),
            Err(IdxError::InvalidPalette(_))
        ));
    }

    #[test]
    fn ignored_keys_do_not_error() {
        let sample = "\
scale: 100%, 100%
alpha: 100%
smooth: OFF
fadein/out: 50, 50
align: OFF at LEFT TOP
forced subs: OFF
custom colors: OFF, tridx: 1000, colors: 000000, 000000, 000000, 000000
alt: whatever
";
        let (_guard, path) = fixture(sample);
        assert!(IdxParser::parse(&path).is_ok());
    }

    #[test]
    fn writer_round_trips_screen_size_and_filepos() {
        let header = IdxHeader {
            screen_width: 720,
            screen_height: 480,
            global_x_ofs: 0,
            global_y_ofs: 0,
            global_delay_pts: 0,
            palette: [(0, 0, 0); 16],
            active_stream_id: 0,
            active_language_index: 0,
        };
        let entries = [TimestampEntry {
            start_pts: 90_000,
            file_offset: 0x800,
        }];
        let text = IdxWriter::write(&header, &entries, 0);
        assert!(text.contains("size: 720x480"));
        assert!(text.contains("timestamp: 00:00:01:000, filepos: 000000800"));
        assert!(text.starts_with("# VobSub index file, v7"));
    }

    #[test]
    fn writer_applies_crop_offset_to_height_only() {
        let header = IdxHeader {
            screen_width: 720,
            screen_height: 480,
            ..IdxHeader::default()
        };
        let text = IdxWriter::write(&header, &[], 10);
        assert!(text.contains("size: 720x460"));
    }
}

//! Miscellaneous utilities.

use std::fmt;

/// Wrapper to force a `&[u8]` to display as nicely-formatted hexadecimal
/// bytes with only the the first line or so of bytes shown.
pub struct BytesFormatter<'a>(pub &'a [u8]);

impl fmt::Debug for BytesFormatter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let BytesFormatter(bytes) = *self;
        for byte in bytes.iter().take(16) {
            write!(f, "{byte:02x} ")?;
        }
        write!(f, "({} bytes)", bytes.len())?;
        Ok(())
    }
}

/// Parse an integer literal the way `.idx` values (and other config
/// values in this ecosystem) are parsed:
///
/// - empty/null → `-1`
/// - `"0"` → `0`
/// - leading `0x` → base 16
/// - leading `0b` → base 2
/// - otherwise leading `0` → base 8
/// - otherwise base 10; on parse failure → `0`
#[must_use]
pub fn parse_int_literal(s: &str) -> i64 {
    let s = s.trim();
    if s.is_empty() {
        return -1;
    }
    if s == "0" {
        return 0;
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        return i64::from_str_radix(bin, 2).unwrap_or(0);
    }
    if let Some(oct) = s.strip_prefix('0') {
        return i64::from_str_radix(oct, 8).unwrap_or(0);
    }
    s.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documented_examples() {
        assert_eq!(parse_int_literal("0x10"), 16);
        assert_eq!(parse_int_literal("0b10"), 2);
        assert_eq!(parse_int_literal("010"), 8);
        assert_eq!(parse_int_literal("10"), 10);
        assert_eq!(parse_int_literal(""), -1);
        assert_eq!(parse_int_literal("abc"), 0);
        assert_eq!(parse_int_literal("0"), 0);
    }

    #[test]
    fn negative_values_parse_as_base_10() {
        assert_eq!(parse_int_literal("-5"), -5);
    }
}

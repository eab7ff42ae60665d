//! The built-in table of `(english_name, iso_639_1_code)` pairs used to
//! recognize `id:` lines on read and to emit the active language's name
//! and code on write.

/// One row of the language table.
pub type LanguageEntry = (&'static str, &'static str);

/// A representative slice of ISO 639-1 languages, in the order DVD
/// authoring tools commonly list them. Not exhaustive — an `id:` code
/// that isn't in this table is still accepted (see
/// [`super::idx::IdxParser`]), just with a logged warning, since the
/// `.idx` format doesn't require the reader to know every language name.
pub const LANGUAGES: &[LanguageEntry] = &[
    ("English", "en"),
    ("French", "fr"),
    ("German", "de"),
    ("Spanish", "es"),
    ("Italian", "it"),
    ("Dutch", "nl"),
    ("Portuguese", "pt"),
    ("Japanese", "ja"),
    ("Chinese", "zh"),
    ("Korean", "ko"),
    ("Russian", "ru"),
    ("Swedish", "sv"),
    ("Norwegian", "no"),
    ("Danish", "da"),
    ("Finnish", "fi"),
    ("Polish", "pl"),
    ("Greek", "el"),
    ("Turkish", "tr"),
    ("Arabic", "ar"),
    ("Hebrew", "he"),
    ("Hindi", "hi"),
    ("Thai", "th"),
    ("Vietnamese", "vi"),
    ("Czech", "cs"),
    ("Hungarian", "hu"),
    ("Romanian", "ro"),
    ("Bulgarian", "bg"),
    ("Croatian", "hr"),
    ("Indonesian", "id"),
    ("Icelandic", "is"),
];

/// Look up the English name for a two-letter ISO 639-1 code.
#[must_use]
pub fn name_for_code(code: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|(_, c)| c.eq_ignore_ascii_case(code))
        .map(|(name, _)| *name)
}

/// Look up the ISO 639-1 code for a table row index.
#[must_use]
pub fn code_for_index(index: usize) -> Option<&'static str> {
    LANGUAGES.get(index).map(|(_, code)| *code)
}

/// Is `code` present in the built-in table?
#[must_use]
pub fn is_known_code(code: &str) -> bool {
    name_for_code(code).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_known_codes() {
        assert_eq!(name_for_code("en"), Some("English"));
        assert_eq!(name_for_code("EN"), Some("English"));
        assert!(is_known_code("fr"));
    }

    #[test]
    fn unknown_codes_are_not_known() {
        assert_eq!(name_for_code("xx"), None);
        assert!(!is_known_code("xx"));
    }
}

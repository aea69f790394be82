//! System name parsing and sector filename derivation
//!
//! A "standard" system name carries a mass-code token of two uppercase
//! letters, a dash and one uppercase letter (`OD-T`). Everything before the
//! token is the sector name. This classification decides which records seed
//! sectors in the first build pass, so it must stay byte-for-byte stable.

use regex::Regex;
use std::sync::OnceLock;

const MASS_CODE_PATTERN: &str = r"\b([A-Z]{2}-[A-Z])\b";

fn mass_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MASS_CODE_PATTERN).expect("mass code pattern is valid"))
}

/// Result of parsing a standard system name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName<'a> {
    /// Trimmed text before the mass-code token (may be empty)
    pub sector: &'a str,
    /// The matched token, e.g. `OD-T`
    pub mass_code: &'a str,
}

/// Parse a system name into sector prefix and mass code.
///
/// Returns `None` when the name has no mass-code token.
pub fn parse_system_name(name: &str) -> Option<ParsedName<'_>> {
    let captures = mass_code_regex().captures(name)?;
    let token = captures.get(1)?;
    Some(ParsedName {
        sector: name[..token.start()].trim(),
        mass_code: token.as_str(),
    })
}

/// Sector a record belongs to by name alone.
///
/// A token at the very start of the name leaves an empty prefix; such records
/// are treated as non-standard and placed by position instead.
pub fn sector_of(name: &str) -> Option<&str> {
    parse_system_name(name)
        .map(|parsed| parsed.sector)
        .filter(|sector| !sector.is_empty())
}

/// Convert a sector name into a file stem.
///
/// Every character outside `[A-Za-z0-9_]` (spaces included) becomes `_`,
/// runs of underscores collapse to one, and leading/trailing underscores are
/// stripped.
///
/// Dashes and non-ASCII letters are replaced too, so a sector such as
/// `Wregoe-Sector` maps to `Wregoe_Sector`. Stores whose files were named
/// with those characters kept do not match these names and must be rebuilt.
pub fn sanitize_filename(sector_name: &str) -> String {
    let mut out = String::with_capacity(sector_name.len());
    for ch in sector_name.chars() {
        let mapped = if ch.is_ascii_alphanumeric() { ch } else { '_' };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }
    out.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_names() {
        let parsed = parse_system_name("Aaekaae OD-T d3-0").unwrap();
        assert_eq!(parsed.sector, "Aaekaae");
        assert_eq!(parsed.mass_code, "OD-T");

        let parsed = parse_system_name("Aaekaae OD-T a1-2").unwrap();
        assert_eq!(parsed.sector, "Aaekaae");

        let parsed = parse_system_name("Eol Prou LW-L c8-127").unwrap();
        assert_eq!(parsed.sector, "Eol Prou");
        assert_eq!(parsed.mass_code, "LW-L");
    }

    #[test]
    fn test_non_standard_names() {
        assert_eq!(parse_system_name("Some Random Star"), None);
        assert_eq!(parse_system_name("Sol"), None);
        // lowercase and extra letters do not match
        assert_eq!(parse_system_name("Foo od-t d3"), None);
        assert_eq!(parse_system_name("Foo ABC-D d3"), None);
        assert_eq!(parse_system_name("Foo AB-CD d3"), None);
    }

    #[test]
    fn test_first_token_wins() {
        let parsed = parse_system_name("Xyz AB-C QR-S").unwrap();
        assert_eq!(parsed.sector, "Xyz");
        assert_eq!(parsed.mass_code, "AB-C");
    }

    #[test]
    fn test_empty_prefix_is_not_a_sector() {
        let parsed = parse_system_name("AB-C d1").unwrap();
        assert_eq!(parsed.sector, "");
        assert_eq!(sector_of("AB-C d1"), None);
        assert_eq!(sector_of("Aaekaae OD-T d3-0"), Some("Aaekaae"));
    }

    #[test]
    fn test_parse_is_deterministic() {
        for name in ["Aaekaae OD-T d3-0", "HIP 1234", "Col 285 Sector AB-C a1", ""] {
            assert_eq!(parse_system_name(name), parse_system_name(name));
        }
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_filename("Eol Prou"), "Eol_Prou");
        assert_eq!(sanitize_filename("Col 285 Sector"), "Col_285_Sector");
        assert_eq!(sanitize_filename("  a/b\\c  "), "a_b_c");
        assert_eq!(sanitize_filename("__x__y__"), "x_y");
        assert_eq!(sanitize_filename("Wregoe-Sector"), "Wregoe_Sector");
        assert_eq!(sanitize_filename("Ögmundr's Reach"), "gmundr_s_Reach");
        assert_eq!(sanitize_filename("!!!"), "");
    }

    #[test]
    fn test_sanitize_idempotent() {
        let samples = [
            "Eol Prou",
            " _weird__ name ",
            "a..b",
            "Synuefe  XR",
            "Ögmundr's Reach",
            "x_ _y",
            "-dash-",
        ];
        for sample in samples {
            let once = sanitize_filename(sample);
            assert_eq!(sanitize_filename(&once), once, "not idempotent for {:?}", sample);
            assert!(!once.starts_with('_') && !once.ends_with('_'));
            assert!(!once.contains("__"));
            assert!(once
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
    }
}

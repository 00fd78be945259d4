//! Input validation and bulk-load field normalization.
//!
//! Everything here is pure. Region codes are the only hard gate: a value
//! that is not two ASCII letters after trimming and uppercasing never reaches
//! the engine, either from an HTTP caller or from the store.

use std::fmt;
use std::sync::LazyLock;

use regex_lite::Regex;

static REGION_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}$").expect("static pattern compiles"));

/// Placeholder for a field that would otherwise be empty on the wire.
const EMPTY_FIELD: &str = "-";

/// A validated two-letter region code (e.g. `SP`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionCode(String);

impl RegionCode {
    /// Trim, uppercase and check against `^[A-Z]{2}$`.
    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim().to_uppercase();
        REGION_CODE.is_match(&code).then_some(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row as it comes out of the store, before any sanitization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawIndicator {
    pub region_code: String,
    pub sub_region: String,
    pub value_region: f64,
    pub value_macro_region: f64,
    pub value_national: f64,
    pub reference_date: String,
    pub updated_date: String,
}

/// A row that is safe to put on the pipe as an `L` command.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRecord {
    pub region_code: RegionCode,
    pub sub_region: String,
    pub value_region: f64,
    pub value_macro_region: f64,
    pub value_national: f64,
    pub reference_date: String,
    pub updated_date: String,
}

impl LoadRecord {
    /// Normalize a store row. Returns `None` when the region code is invalid.
    pub fn from_raw(raw: &RawIndicator) -> Option<Self> {
        let region_code = RegionCode::parse(&raw.region_code)?;
        Some(Self {
            region_code,
            sub_region: normalize_label(&raw.sub_region),
            value_region: raw.value_region,
            value_macro_region: raw.value_macro_region,
            value_national: raw.value_national,
            reference_date: normalize_label(&raw.reference_date),
            updated_date: normalize_label(&raw.updated_date),
        })
    }
}

/// Trim and replace whitespace with underscores so the value stays one
/// space-delimited field on the wire.
pub fn normalize_label(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return EMPTY_FIELD.to_string();
    }
    trimmed
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(code: &str, sub_region: &str) -> RawIndicator {
        RawIndicator {
            region_code: code.to_string(),
            sub_region: sub_region.to_string(),
            value_region: 1.0,
            value_macro_region: 2.0,
            value_national: 3.0,
            reference_date: "202310".to_string(),
            updated_date: "20231101".to_string(),
        }
    }

    #[test]
    fn accepts_lowercase_and_padding() {
        assert_eq!(RegionCode::parse("sp").unwrap().as_str(), "SP");
        assert_eq!(RegionCode::parse("  rj ").unwrap().as_str(), "RJ");
        assert_eq!(RegionCode::parse("Mg").unwrap().as_str(), "MG");
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(RegionCode::parse("S").is_none());
        assert!(RegionCode::parse("SPX").is_none());
        assert!(RegionCode::parse("").is_none());
        assert!(RegionCode::parse("   ").is_none());
    }

    #[test]
    fn rejects_names_and_non_letters() {
        assert!(RegionCode::parse("São Paulo").is_none());
        assert!(RegionCode::parse("S1").is_none());
        assert!(RegionCode::parse("S P").is_none());
        assert!(RegionCode::parse("SP\nQ RJ").is_none());
        // Non-ASCII letters uppercase fine but are outside [A-Z].
        assert!(RegionCode::parse("sã").is_none());
    }

    #[test]
    fn label_spaces_become_underscores() {
        assert_eq!(normalize_label(" Grande  Sao Paulo "), "Grande__Sao_Paulo");
        assert_eq!(normalize_label("Norte"), "Norte");
        assert_eq!(normalize_label("a\tb"), "a_b");
    }

    #[test]
    fn empty_label_gets_placeholder() {
        assert_eq!(normalize_label(""), "-");
        assert_eq!(normalize_label("   "), "-");
    }

    #[test]
    fn record_from_valid_row() {
        let record = LoadRecord::from_raw(&raw(" sp ", "Baixada Santista")).unwrap();
        assert_eq!(record.region_code.as_str(), "SP");
        assert_eq!(record.sub_region, "Baixada_Santista");
        assert_eq!(record.reference_date, "202310");
    }

    #[test]
    fn record_from_invalid_row_is_dropped() {
        assert!(LoadRecord::from_raw(&raw("São Paulo", "x")).is_none());
        assert!(LoadRecord::from_raw(&raw("BRA", "x")).is_none());
    }
}

//! Stateless sanitization helpers used by the batch driver.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::conf::{C_FILENAME_FALLBACK_PREFIX, N_LEN_FILENAME_MAX};
use crate::spec::{EnumCellValue, SpecIdentifierCollision, SpecPlaceholderMapping, SpecRecord};

static RE_NON_IDENTIFIER_CHAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}_]").expect("valid identifier regex"));
static RE_NON_FILENAME_CHAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}_\s-]").expect("valid filename regex"));
static RE_WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Largest magnitude printed as an integer when the value has no fraction.
const N_INTEGRAL_TEXT_MAX: f64 = 1e15;

////////////////////////////////////////////////////////////////////////////////
// #region IdentifierSanitization

/// Replace every char outside letter/digit/underscore with `_`.
///
/// One replacement per char, so the result has the same char count as `name`.
pub fn sanitize_identifier(name: &str) -> String {
    RE_NON_IDENTIFIER_CHAR.replace_all(name, "_").into_owned()
}

/// Build the placeholder mapping of one record.
///
/// Columns are visited in record order; when two columns sanitize to the same
/// identifier, the later column's value is kept.
pub fn build_placeholder_mapping(record: &SpecRecord) -> SpecPlaceholderMapping {
    let mut dict_mapping = SpecPlaceholderMapping::new();
    for (c_column, value) in &record.fields {
        dict_mapping.insert(sanitize_identifier(c_column), value.clone());
    }
    dict_mapping
}

/// Report every sanitized identifier shared by two or more columns.
pub fn find_identifier_collisions(columns: &[String]) -> Vec<SpecIdentifierCollision> {
    let mut dict_sources: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for c_column in columns {
        dict_sources
            .entry(sanitize_identifier(c_column))
            .or_default()
            .push(c_column.clone());
    }

    dict_sources
        .into_iter()
        .filter(|(_, l_columns)| l_columns.len() > 1)
        .map(|(identifier, columns)| SpecIdentifierCollision {
            identifier,
            columns,
        })
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FilenameDerivation

/// Derive a path-safe archive entry base name for one row.
///
/// Present values keep letters, digits, `_`, `-` and whitespace; the result is
/// trimmed and each whitespace run becomes one `_`. Absent values, and values
/// that sanitize to nothing, fall back to `document_<fallback_index>`.
pub fn derive_filename(display_value: Option<&str>, fallback_index: usize) -> String {
    let c_fallback = format!("{C_FILENAME_FALLBACK_PREFIX}_{fallback_index}");
    let Some(display_value) = display_value else {
        return c_fallback;
    };

    let c_stripped = RE_NON_FILENAME_CHAR.replace_all(display_value, "");
    let c_joined = RE_WHITESPACE_RUN.replace_all(c_stripped.trim(), "_");
    let c_name: String = c_joined.chars().take(N_LEN_FILENAME_MAX).collect();

    if c_name.is_empty() { c_fallback } else { c_name }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ValueText

/// Convert a cell value to the text substituted into documents and filenames.
pub fn convert_cell_value_to_text(value: &EnumCellValue) -> String {
    match value {
        EnumCellValue::None => String::new(),
        EnumCellValue::String(s) => s.clone(),
        EnumCellValue::Number(n) => match derive_integral_value(*n) {
            Some(n_int) => n_int.to_string(),
            None => n.to_string(),
        },
    }
}

/// `Some` when `n` is a whole number small enough to print without a decimal.
pub(crate) fn derive_integral_value(n: f64) -> Option<i64> {
    (n.is_finite() && n.fract() == 0.0 && n.abs() < N_INTEGRAL_TEXT_MAX).then_some(n as i64)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region HeaderNormalization

/// Normalize raw header cells into unique column names.
///
/// Blank headers become `Unnamed: <idx>`; repeated names get `.1`, `.2`, ...
pub fn derive_unique_column_names(raw_headers: &[String]) -> Vec<String> {
    let mut dict_seen: BTreeMap<String, usize> = BTreeMap::new();
    let mut l_names = Vec::with_capacity(raw_headers.len());

    for (n_idx, c_raw) in raw_headers.iter().enumerate() {
        let c_base = if c_raw.trim().is_empty() {
            format!("Unnamed: {n_idx}")
        } else {
            c_raw.clone()
        };

        let mut c_name = c_base.clone();
        if let Some(&n_dup_seen) = dict_seen.get(&c_base) {
            let mut n_dup = n_dup_seen;
            loop {
                n_dup += 1;
                c_name = format!("{c_base}.{n_dup}");
                if !dict_seen.contains_key(&c_name) {
                    break;
                }
            }
            dict_seen.insert(c_base, n_dup);
        }
        dict_seen.insert(c_name.clone(), 0);
        l_names.push(c_name);
    }

    l_names
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn is_identifier_char(c: char) -> bool {
        c.is_alphanumeric() || c == '_'
    }

    #[test]
    fn sanitize_identifier_replaces_each_char_once() {
        assert_eq!(sanitize_identifier("Product Name"), "Product_Name");
        assert_eq!(sanitize_identifier("Price ($)"), "Price____");
        assert_eq!(sanitize_identifier("a--b"), "a__b");
        assert_eq!(sanitize_identifier(""), "");
        assert_eq!(sanitize_identifier("Größe"), "Größe");
    }

    #[test]
    fn sanitize_identifier_preserves_length_and_charset() {
        for c_name in [
            "Product Name",
            "  leading",
            "tab\tsep",
            "Name!",
            "Name?",
            "Café crème",
            "价格 (元)",
            "emoji 🚀 here",
            "line\nbreak",
            "__already_ok__",
        ] {
            let c_sanitized = sanitize_identifier(c_name);
            assert_eq!(c_sanitized.chars().count(), c_name.chars().count(), "{c_name:?}");
            assert!(c_sanitized.chars().all(is_identifier_char), "{c_name:?}");
        }
    }

    #[test]
    fn sanitize_identifier_is_idempotent() {
        for c_name in ["Product Name", "Name!", "x-y z", "价格 (元)", "🚀"] {
            let c_once = sanitize_identifier(c_name);
            assert_eq!(sanitize_identifier(&c_once), c_once);
        }
    }

    #[test]
    fn build_placeholder_mapping_later_column_wins() {
        let record = SpecRecord::new(
            0,
            vec![
                ("Name!".to_string(), EnumCellValue::String("first".to_string())),
                ("Name?".to_string(), EnumCellValue::String("second".to_string())),
                ("Price".to_string(), EnumCellValue::Number(3.5)),
            ],
        );

        let dict_mapping = build_placeholder_mapping(&record);
        assert_eq!(dict_mapping.len(), 2);
        assert_eq!(
            dict_mapping["Name_"],
            EnumCellValue::String("second".to_string())
        );
        assert_eq!(dict_mapping["Price"], EnumCellValue::Number(3.5));
    }

    #[test]
    fn find_identifier_collisions_lists_columns_in_order() {
        let l_columns = vec![
            "Name!".to_string(),
            "Price".to_string(),
            "Name?".to_string(),
            "Name_".to_string(),
        ];
        assert_eq!(
            find_identifier_collisions(&l_columns),
            vec![SpecIdentifierCollision {
                identifier: "Name_".to_string(),
                columns: vec![
                    "Name!".to_string(),
                    "Name?".to_string(),
                    "Name_".to_string()
                ],
            }]
        );
        assert!(find_identifier_collisions(&["A".to_string(), "B".to_string()]).is_empty());
    }

    #[test]
    fn derive_filename_strips_punctuation() {
        assert_eq!(derive_filename(Some("Widget #1 (Blue)"), 0), "Widget_1_Blue");
        assert_eq!(derive_filename(Some("a/b\\c:d"), 0), "abcd");
        assert_eq!(derive_filename(Some("keep-dash_and_underscore"), 0), "keep-dash_and_underscore");
    }

    #[test]
    fn derive_filename_collapses_whitespace_runs() {
        assert_eq!(derive_filename(Some("  Acme  Corp  "), 0), "Acme_Corp");
        assert_eq!(derive_filename(Some("a \t b\nc"), 0), "a_b_c");
    }

    #[test]
    fn derive_filename_fallbacks() {
        for n_idx in [0_usize, 1, 7, 12_345] {
            assert_eq!(derive_filename(None, n_idx), format!("document_{n_idx}"));
        }
        assert_eq!(derive_filename(Some("!!! ???"), 4), "document_4");
        assert_eq!(derive_filename(Some("   "), 2), "document_2");
    }

    #[test]
    fn derive_filename_is_single_safe_segment() {
        let c_long = "x".repeat(N_LEN_FILENAME_MAX + 50);
        assert_eq!(
            derive_filename(Some(&c_long), 0).chars().count(),
            N_LEN_FILENAME_MAX
        );

        for c_value in ["../../etc/passwd", "C:\\temp\\x", "a\u{1}b\u{7f}c", ".."] {
            let c_name = derive_filename(Some(c_value), 9);
            assert!(!c_name.is_empty());
            assert!(!c_name.contains('/') && !c_name.contains('\\'));
            assert!(!c_name.chars().any(char::is_control), "{c_value:?}");
        }
    }

    #[test]
    fn convert_cell_value_to_text_formats_each_kind() {
        assert_eq!(convert_cell_value_to_text(&EnumCellValue::None), "");
        assert_eq!(convert_cell_value_to_text(&EnumCellValue::Number(10.0)), "10");
        assert_eq!(convert_cell_value_to_text(&EnumCellValue::Number(-3.0)), "-3");
        assert_eq!(convert_cell_value_to_text(&EnumCellValue::Number(19.99)), "19.99");
        assert_eq!(convert_cell_value_to_text(&EnumCellValue::Number(f64::NAN)), "NaN");
        assert_eq!(
            convert_cell_value_to_text(&EnumCellValue::String("x".to_string())),
            "x"
        );
    }

    #[test]
    fn derive_unique_column_names_fills_and_suffixes() {
        let l_raw = vec![
            "Price".to_string(),
            "".to_string(),
            "Price".to_string(),
            "Price".to_string(),
            "Price.1".to_string(),
        ];
        assert_eq!(
            derive_unique_column_names(&l_raw),
            vec!["Price", "Unnamed: 1", "Price.1", "Price.2", "Price.1.1"]
        );
    }
}

//! Card labels and artifact names.
//!
//! Recognized titles become file names, so they are normalized and stripped of
//! characters that are illegal on common filesystems. The start row is always
//! appended: it is the only key that stays unique when labels collide or come
//! back unknown.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Label used when recognition fails or returns nothing.
pub const UNKNOWN_LABEL: &str = "Unknown";

const MAX_LABEL_CHARS: usize = 50;

static ILLEGAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|]"#).expect("static regex"));

/// Turn raw recognizer output into a filesystem-safe label.
pub fn sanitize_label(text: &str) -> String {
    let normalized: String = text.nfc().collect();
    let replaced = ILLEGAL_CHARS.replace_all(&normalized, "_");
    let single_line: String = replaced.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
    let label: String = single_line.trim().chars().take(MAX_LABEL_CHARS).collect();
    let label = label.trim_end().to_string();

    if label.is_empty() {
        UNKNOWN_LABEL.to_string()
    } else {
        label
    }
}

/// `None`, empty, or whitespace-only recognition results become [`UNKNOWN_LABEL`].
pub fn label_or_unknown(text: Option<&str>) -> String {
    match text {
        Some(t) if !t.trim().is_empty() => sanitize_label(t),
        _ => UNKNOWN_LABEL.to_string(),
    }
}

pub fn card_file_name(label: &str, start_y: u32) -> String {
    format!("{label}_{start_y}.png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_characters_replaced() {
        assert_eq!(sanitize_label(r#"a/b\c:d*e?f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_newlines_removed_and_trimmed() {
        assert_eq!(sanitize_label("  Aspirin\r\nTablets \n"), "AspirinTablets");
    }

    #[test]
    fn test_truncated_to_fifty_chars() {
        let long = "x".repeat(80);
        assert_eq!(sanitize_label(&long).chars().count(), 50);
    }

    #[test]
    fn test_cjk_kept_and_counted_by_char() {
        let label = sanitize_label("阿司匹林肠溶片");
        assert_eq!(label, "阿司匹林肠溶片");
        assert_eq!(sanitize_label(&"药".repeat(60)).chars().count(), 50);
    }

    #[test]
    fn test_nfc_normalization() {
        // "e" followed by a combining acute accent composes to "é".
        assert_eq!(sanitize_label("Caf\u{0065}\u{0301}"), "Caf\u{00E9}");
    }

    #[test]
    fn test_empty_becomes_unknown() {
        assert_eq!(sanitize_label(""), UNKNOWN_LABEL);
        assert_eq!(sanitize_label(" \n "), UNKNOWN_LABEL);
        assert_eq!(label_or_unknown(None), UNKNOWN_LABEL);
        assert_eq!(label_or_unknown(Some("   ")), UNKNOWN_LABEL);
        assert_eq!(label_or_unknown(Some("Ibuprofen")), "Ibuprofen");
    }

    #[test]
    fn test_card_file_name() {
        assert_eq!(card_file_name("Ibuprofen", 1234), "Ibuprofen_1234.png");
        assert_eq!(card_file_name(UNKNOWN_LABEL, 0), "Unknown_0.png");
    }
}

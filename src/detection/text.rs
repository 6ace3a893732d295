//! Text channel: OCR plus the resi grammar applied to the recognized text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::detection::ocr::TextRecognizer;
use crate::error::Result;
use crate::models::{BinarizedRaster, CandidateSet, ResiNumber};

/// Keyword that introduces a resi number on a label line
const RESI_KEYWORD: &str = "resi";

/// "JP" followed by at least nine digits
static RESI_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"JP[0-9]{9,}").expect("static regex"));

/// Run OCR over the binarized raster and harvest candidates from the text
pub fn extract_text_candidates(
    recognizer: &dyn TextRecognizer,
    binarized: &BinarizedRaster,
) -> Result<(CandidateSet, String)> {
    let text = recognizer.recognize(binarized.as_image())?;
    tracing::debug!(engine = recognizer.name(), chars = text.len(), "OCR finished");
    Ok((candidates_from_text(&text), text))
}

/// Apply both grammar rules to a block of recognized text
pub fn candidates_from_text(text: &str) -> CandidateSet {
    let mut candidates = keyword_candidates(text);
    candidates.extend(pattern_candidates(text));
    candidates
}

/// Token following any token that contains "resi" (case-insensitive), with
/// colons stripped from both ends
pub fn keyword_candidates(text: &str) -> CandidateSet {
    let mut candidates = CandidateSet::new();

    for line in text.lines() {
        if !line.to_lowercase().contains(RESI_KEYWORD) {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        for pair in tokens.windows(2) {
            if !pair[0].to_lowercase().contains(RESI_KEYWORD) {
                continue;
            }
            let value = pair[1].trim_matches(':').trim();
            if !value.is_empty() {
                candidates.insert(ResiNumber::new(value));
            }
        }
    }

    candidates
}

/// Every non-overlapping `JP` + 9 or more digits match in the block
pub fn pattern_candidates(text: &str) -> CandidateSet {
    RESI_PATTERN
        .find_iter(text)
        .map(|m| ResiNumber::new(m.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> CandidateSet {
        items.iter().map(|s| ResiNumber::from(*s)).collect()
    }

    #[test]
    fn resi_line_with_colon() {
        let text = "PT Kurir Cepat\nResi: JP123456789\nBerat 1kg";
        assert!(candidates_from_text(text).contains(&ResiNumber::from("JP123456789")));
    }

    #[test]
    fn keyword_is_case_insensitive_and_may_sit_inside_a_token() {
        let text = "NO.RESI ABC-001\nnoresi: XYZ:";
        assert_eq!(keyword_candidates(text), set(&["ABC-001", "XYZ"]));
    }

    #[test]
    fn keyword_at_end_of_line_yields_nothing() {
        assert!(keyword_candidates("nomor resi").is_empty());
        assert!(keyword_candidates("resi :").is_empty());
    }

    #[test]
    fn bare_pattern_without_keyword() {
        let text = "kode JP000000000 dikirim";
        assert_eq!(candidates_from_text(text), set(&["JP000000000"]));
    }

    #[test]
    fn pattern_needs_nine_digits_and_uppercase_prefix() {
        assert!(pattern_candidates("JP12345678").is_empty());
        assert!(pattern_candidates("jp123456789").is_empty());
        assert_eq!(pattern_candidates("JP1234567890123"), set(&["JP1234567890123"]));
    }

    #[test]
    fn both_rules_union_and_dedupe() {
        let text = "Resi: JP111111111\nJP111111111 JP222222222\nresi B-7";
        assert_eq!(
            candidates_from_text(text),
            set(&["B-7", "JP111111111", "JP222222222"])
        );
    }

    #[test]
    fn lowercase_ocr_output_is_not_normalized() {
        let text = "resi jp123456789";
        assert_eq!(candidates_from_text(text), set(&["jp123456789"]));
    }
}

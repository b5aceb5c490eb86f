//! Provider results and text extraction from their blocks.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// One recognized element of a page.
///
/// Only the type tag and the text are interpreted; confidence, geometry,
/// relationships and any other provider fields are kept as-is for raw output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "BlockType", default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<String>,
    #[serde(rename = "Text", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Block {
    pub fn new(block_type: &str, text: Option<&str>) -> Self {
        Self {
            block_type: Some(block_type.to_string()),
            text: text.map(str::to_string),
            extra: Map::new(),
        }
    }
}

/// The provider's answer for one unit: blocks in provider order plus
/// everything else it returned (document metadata, model version, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "Blocks", default)]
    pub blocks: Vec<Block>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnalysisResult {
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            extra: Map::new(),
        }
    }
}

/// Recognition level text is extracted at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Granularity {
    #[default]
    Word,
    Line,
}

impl Granularity {
    /// The provider's block type tag for this level.
    pub fn block_type(&self) -> &'static str {
        match self {
            Granularity::Word => "WORD",
            Granularity::Line => "LINE",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.block_type())
    }
}

#[derive(Debug, Error)]
#[error("Unknown granularity '{0}', expected WORD or LINE")]
pub struct UnknownGranularity(pub String);

impl FromStr for Granularity {
    type Err = UnknownGranularity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "WORD" => Ok(Granularity::Word),
            "LINE" => Ok(Granularity::Line),
            _ => Err(UnknownGranularity(s.to_string())),
        }
    }
}

/// True when the text has characters and all of them are ASCII punctuation.
fn is_punctuation_only(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_punctuation())
}

/// All distinct texts at the requested granularity, in first-seen order.
///
/// Blocks of other types, blocks without text, empty texts and texts made only
/// of punctuation are skipped. Deduplication is exact and case-sensitive.
pub fn extract(result: &AnalysisResult, granularity: Granularity) -> Vec<String> {
    let wanted = granularity.block_type();
    let mut seen = HashSet::new();

    result
        .blocks
        .iter()
        .filter(|b| b.block_type.as_deref() == Some(wanted))
        .filter_map(|b| b.text.as_deref())
        .filter(|text| !text.is_empty() && !is_punctuation_only(text))
        .filter(|text| seen.insert(*text))
        .map(str::to_string)
        .collect()
}

/// [`extract`] joined with a separator.
pub fn extract_joined(result: &AnalysisResult, granularity: Granularity, separator: &str) -> String {
    extract(result, granularity).join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str) -> Block {
        Block::new("WORD", Some(text))
    }

    fn line(text: &str) -> Block {
        Block::new("LINE", Some(text))
    }

    fn sample() -> AnalysisResult {
        AnalysisResult::from_blocks(vec![
            Block::new("PAGE", None),
            line("Invoice 2024-001"),
            word("Invoice"),
            word("2024-001"),
            line("Total: 42.00 EUR"),
            word("Total:"),
            word("42.00"),
            word("EUR"),
            word("Invoice"),
            word("invoice"),
            word("..."),
            word(":"),
            word(""),
            Block::new("WORD", None),
            Block::new("CELL", Some("42.00")),
        ])
    }

    #[test]
    fn test_extract_words() {
        let words = extract(&sample(), Granularity::Word);
        assert_eq!(
            words,
            vec!["Invoice", "2024-001", "Total:", "42.00", "EUR", "invoice"]
        );
    }

    #[test]
    fn test_extract_lines() {
        let lines = extract(&sample(), Granularity::Line);
        assert_eq!(lines, vec!["Invoice 2024-001", "Total: 42.00 EUR"]);
    }

    #[test]
    fn test_extract_never_returns_noise_or_duplicates() {
        for granularity in [Granularity::Word, Granularity::Line] {
            let texts = extract(&sample(), granularity);
            let unique: HashSet<&String> = texts.iter().collect();
            assert_eq!(unique.len(), texts.len());
            for text in &texts {
                assert!(!text.is_empty());
                assert!(!is_punctuation_only(text));
            }
        }
    }

    #[test]
    fn test_extract_joined() {
        let joined = extract_joined(&sample(), Granularity::Line, "\n");
        assert_eq!(joined, "Invoice 2024-001\nTotal: 42.00 EUR");
        assert_eq!(extract_joined(&AnalysisResult::default(), Granularity::Word, "\n"), "");
    }

    #[test]
    fn test_unicode_punctuation_is_kept() {
        let result = AnalysisResult::from_blocks(vec![word("«»"), word("—")]);
        assert_eq!(extract(&result, Granularity::Word), vec!["«»", "—"]);
    }

    #[test]
    fn test_granularity_parsing() {
        assert_eq!("WORD".parse::<Granularity>().unwrap(), Granularity::Word);
        assert_eq!(" line ".parse::<Granularity>().unwrap(), Granularity::Line);
        assert!("PAGE".parse::<Granularity>().is_err());
        assert_eq!(Granularity::default(), Granularity::Word);
    }

    #[test]
    fn test_result_keeps_unknown_fields() {
        let json = serde_json::json!({
            "DocumentMetadata": {"Pages": 1},
            "Blocks": [
                {"BlockType": "WORD", "Text": "Hello", "Confidence": 99.5, "Page": 1}
            ]
        });
        let result: AnalysisResult = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(result.blocks[0].text.as_deref(), Some("Hello"));
        assert_eq!(result.blocks[0].extra["Confidence"], 99.5);
        assert_eq!(serde_json::to_value(&result).unwrap(), json);
    }
}

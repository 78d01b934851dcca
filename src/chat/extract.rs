//! Reply text extraction
//!
//! Provider responses do not always carry text where expected, so several
//! strategies are tried in order. The first non-empty trimmed result wins.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::provider::GenerateResponse;

static TEXT_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""text":"([^"]+)""#).expect("valid regex"));

/// Finish reasons that still carry a usable answer
const ACCEPTED_FINISH_REASONS: [&str; 2] = ["STOP", "MAX_TOKENS"];

/// One way of pulling reply text out of a response
pub trait ReplyExtractor: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Extract raw (untrimmed) reply text, if this strategy applies
    fn extract(&self, response: &GenerateResponse) -> Option<String>;
}

fn first_candidate(response: &GenerateResponse) -> Option<&Value> {
    response.raw.get("candidates")?.get(0)
}

fn candidate_parts(response: &GenerateResponse) -> Option<&Vec<Value>> {
    first_candidate(response)?
        .get("content")?
        .get("parts")?
        .as_array()
}

/// Concatenated text of the first candidate
///
/// Refuses blocked prompts and candidates that stopped for safety or
/// recitation reasons.
#[derive(Debug, Default)]
pub struct TextAccessor;

impl ReplyExtractor for TextAccessor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extract(&self, response: &GenerateResponse) -> Option<String> {
        if response.block_reason().is_some() {
            return None;
        }

        let candidate = first_candidate(response)?;
        if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
            if !ACCEPTED_FINISH_REASONS.contains(&reason) {
                return None;
            }
        }

        let text: String = candidate_parts(response)?
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        Some(text)
    }
}

/// Text of the first part of the first candidate
#[derive(Debug, Default)]
pub struct FirstPartText;

impl ReplyExtractor for FirstPartText {
    fn name(&self) -> &'static str {
        "first-part"
    }

    fn extract(&self, response: &GenerateResponse) -> Option<String> {
        candidate_parts(response)?
            .first()?
            .get("text")?
            .as_str()
            .map(ToString::to_string)
    }
}

/// Non-empty text parts of the first candidate, one per line
#[derive(Debug, Default)]
pub struct JoinedParts;

impl ReplyExtractor for JoinedParts {
    fn name(&self) -> &'static str {
        "joined-parts"
    }

    fn extract(&self, response: &GenerateResponse) -> Option<String> {
        let parts: Vec<&str> = candidate_parts(response)?
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .filter(|text| !text.is_empty())
            .collect();
        Some(parts.join("\n"))
    }
}

/// Last resort: scrape the first `"text"` field from the serialized response
#[derive(Debug, Default)]
pub struct RegexScrape;

impl ReplyExtractor for RegexScrape {
    fn name(&self) -> &'static str {
        "regex-scrape"
    }

    fn extract(&self, response: &GenerateResponse) -> Option<String> {
        let serialized = serde_json::to_string(&response.raw).ok()?;
        TEXT_FIELD
            .captures(&serialized)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Ordered list of extractors
pub struct ExtractorChain {
    extractors: Vec<Box<dyn ReplyExtractor>>,
}

impl std::fmt::Debug for ExtractorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.extractors.iter().map(|e| e.name()).collect();
        f.debug_struct("ExtractorChain")
            .field("extractors", &names)
            .finish()
    }
}

impl Default for ExtractorChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(TextAccessor),
            Box::new(FirstPartText),
            Box::new(JoinedParts),
            Box::new(RegexScrape),
        ])
    }
}

impl ExtractorChain {
    #[must_use]
    pub fn new(extractors: Vec<Box<dyn ReplyExtractor>>) -> Self {
        Self { extractors }
    }

    /// First non-empty trimmed text any strategy yields
    #[must_use]
    pub fn extract(&self, response: &GenerateResponse) -> Option<String> {
        for extractor in &self.extractors {
            if let Some(text) = extractor.extract(response) {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    tracing::trace!(strategy = extractor.name(), "extracted reply text");
                    return Some(trimmed.to_string());
                }
            }
            tracing::debug!(strategy = extractor.name(), "extraction strategy yielded nothing");
        }
        None
    }
}

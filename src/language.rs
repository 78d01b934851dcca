//! Best-effort language detection
//!
//! Asks the provider to classify the text and falls back to a keyword
//! heuristic for Somali, which the classifier tends to miss. Detection never
//! fails; every error path degrades to [`DetectedLanguage::unknown`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chat::extract::ExtractorChain;
use crate::prompt;
use crate::provider::{GenerateRequest, GenerationConfig, Provider};

/// Texts shorter than this (in characters, after trimming) are not classified
const MIN_DETECTION_CHARS: usize = 3;

/// Classifier confidence below which the keyword heuristic is consulted
const CONFIDENCE_FLOOR: f64 = 0.5;

/// Common Somali function words
const SOMALI_WORDS: [&str; 10] = [
    "aan", "ka", "waxaan", "ku", "in", "kale", "ma", "wax", "qof", "noqon",
];

/// Minimum distinct Somali words for the heuristic to fire
const SOMALI_MIN_MATCHES: usize = 2;

/// Result of classifying a piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedLanguage {
    pub detected_language: String,
    pub language_code: String,
    pub is_african_language: bool,
    pub confidence: f64,
}

impl DetectedLanguage {
    /// The default when nothing better is known
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            detected_language: "Unknown".to_string(),
            language_code: "en".to_string(),
            is_african_language: false,
            confidence: 0.0,
        }
    }

    fn somali() -> Self {
        Self {
            detected_language: "Somali".to_string(),
            language_code: "so".to_string(),
            is_african_language: true,
            confidence: 0.7,
        }
    }

    /// Whether the classifier's answer is weak enough to second-guess
    fn is_inconclusive(&self) -> bool {
        self.confidence < CONFIDENCE_FLOOR
            || self.detected_language == "Unknown"
            || self.detected_language == "English"
    }
}

impl Default for DetectedLanguage {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Classifier reply; every field is optional
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassifierReply {
    #[serde(default)]
    detected_language: Option<String>,
    #[serde(default)]
    language_code: Option<String>,
    #[serde(default)]
    is_african_language: Option<bool>,
    #[serde(default)]
    confidence: Option<f64>,
}

impl From<ClassifierReply> for DetectedLanguage {
    fn from(reply: ClassifierReply) -> Self {
        Self {
            detected_language: reply
                .detected_language
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            language_code: reply
                .language_code
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "en".to_string()),
            is_african_language: reply.is_african_language.unwrap_or(false),
            confidence: reply.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        }
    }
}

/// Classifies text via the provider
#[derive(Clone)]
pub struct LanguageDetector {
    provider: Arc<dyn Provider>,
    extractors: Arc<ExtractorChain>,
}

impl std::fmt::Debug for LanguageDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageDetector")
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}

impl LanguageDetector {
    /// Create a detector backed by `provider`
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            extractors: Arc::new(ExtractorChain::default()),
        }
    }

    /// Detect the language of `text`
    pub async fn detect(&self, text: &str) -> DetectedLanguage {
        if text.trim().chars().count() < MIN_DETECTION_CHARS {
            return DetectedLanguage::unknown();
        }

        let request =
            GenerateRequest::prompt(prompt::language_detection(text), GenerationConfig::classification());

        let response = match self.provider.generate(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "language detection request failed");
                return DetectedLanguage::unknown();
            }
        };

        let parsed = self
            .extractors
            .extract(&response)
            .and_then(|reply| parse_classifier_reply(&reply));

        match parsed {
            Some(detected) if !detected.is_inconclusive() => detected,
            Some(detected) => heuristic_fallback(text).unwrap_or(detected),
            None => {
                tracing::debug!("could not parse language detection reply");
                heuristic_fallback(text).unwrap_or_default()
            }
        }
    }
}

/// Parse the first balanced JSON object in a classifier reply
fn parse_classifier_reply(reply: &str) -> Option<DetectedLanguage> {
    let json = first_json_object(reply)?;
    match serde_json::from_str::<ClassifierReply>(json) {
        Ok(parsed) => Some(parsed.into()),
        Err(e) => {
            tracing::debug!(error = %e, "language detection reply is not valid JSON");
            None
        }
    }
}

fn heuristic_fallback(text: &str) -> Option<DetectedLanguage> {
    looks_somali(text).then(|| {
        tracing::debug!("keyword heuristic identified Somali");
        DetectedLanguage::somali()
    })
}

/// Whether at least two distinct Somali function words appear as whole words
#[must_use]
pub fn looks_somali(text: &str) -> bool {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    SOMALI_WORDS
        .iter()
        .filter(|candidate| words.contains(candidate))
        .count()
        >= SOMALI_MIN_MATCHES
}

/// Find the first balanced `{...}` substring, skipping braces inside strings
#[must_use]
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::provider::{GenerateResponse, ProviderError};

    struct ScriptedProvider {
        reply: Result<String, ProviderError>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(ProviderError::Network("unreachable".to_string())),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn generate(
            &self,
            _request: &GenerateRequest,
        ) -> Result<GenerateResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .map(|text| GenerateResponse::from_text(&text))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn short_text_skips_provider() {
        let provider = ScriptedProvider::replying("{}");
        let detector = LanguageDetector::new(provider.clone());

        for text in ["", "hi", "  a  ", "ṣé"] {
            assert_eq!(detector.detect(text).await, DetectedLanguage::unknown());
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn parses_json_wrapped_in_prose() {
        let provider = ScriptedProvider::replying(
            "Sure! Here it is:\n```json\n{\"detectedLanguage\": \"Swahili\", \"languageCode\": \"sw\", \"isAfricanLanguage\": true, \"confidence\": 0.93}\n```\nHope that helps {not json}",
        );
        let detector = LanguageDetector::new(provider);

        let detected = detector.detect("Habari za asubuhi rafiki").await;

        assert_eq!(detected.detected_language, "Swahili");
        assert_eq!(detected.language_code, "sw");
        assert!(detected.is_african_language);
        assert!((detected.confidence - 0.93).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn low_confidence_english_falls_back_to_somali_heuristic() {
        let provider = ScriptedProvider::replying(
            r#"{"detectedLanguage":"English","languageCode":"en","isAfricanLanguage":false,"confidence":0.4}"#,
        );
        let detector = LanguageDetector::new(provider);

        let detected = detector.detect("Waxaan rabaa in aan wax barto").await;

        assert_eq!(detected.language_code, "so");
        assert!((detected.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn confident_english_is_kept_without_somali_words() {
        let provider = ScriptedProvider::replying(
            r#"{"detectedLanguage":"English","languageCode":"en","isAfricanLanguage":false,"confidence":0.99}"#,
        );
        let detector = LanguageDetector::new(provider);

        let detected = detector.detect("Tell me about Great Zimbabwe").await;

        assert_eq!(detected.detected_language, "English");
        assert!(!detected.is_african_language);
    }

    #[tokio::test]
    async fn unparsable_reply_degrades_to_default() {
        let provider = ScriptedProvider::replying("I think it's Yoruba");
        let detector = LanguageDetector::new(provider);

        assert_eq!(
            detector.detect("Bawo ni, se daadaa ni").await,
            DetectedLanguage::unknown()
        );
    }

    #[tokio::test]
    async fn unparsable_reply_still_tries_heuristic() {
        let provider = ScriptedProvider::replying("no idea");
        let detector = LanguageDetector::new(provider);

        assert_eq!(detector.detect("ma wax kale").await.language_code, "so");
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_default() {
        let detector = LanguageDetector::new(ScriptedProvider::failing());

        assert_eq!(
            detector.detect("Waxaan rabaa in aan wax barto").await,
            DetectedLanguage::unknown()
        );
    }

    #[tokio::test]
    async fn missing_fields_take_defaults() {
        let provider = ScriptedProvider::replying(r#"{"detectedLanguage":"Hausa","confidence":0.8}"#);
        let detector = LanguageDetector::new(provider);

        let detected = detector.detect("Sannu da zuwa").await;

        assert_eq!(detected.detected_language, "Hausa");
        assert_eq!(detected.language_code, "en");
        assert!(!detected.is_african_language);
    }

    #[test]
    fn somali_heuristic_needs_whole_words() {
        assert!(looks_somali("Waxaan ku jeclahay"));
        // Substrings of English words do not count
        assert!(!looks_somali("making inroads into kansas"));
        // One match is not enough
        assert!(!looks_somali("ma"));
    }

    #[test]
    fn first_json_object_handles_nesting_and_strings() {
        assert_eq!(first_json_object("x {\"a\":{\"b\":1}} y {}"), Some("{\"a\":{\"b\":1}}"));
        assert_eq!(
            first_json_object(r#"{"note":"a } brace \" quote"}"#),
            Some(r#"{"note":"a } brace \" quote"}"#)
        );
        assert_eq!(first_json_object("{ unbalanced"), None);
        assert_eq!(first_json_object("no json"), None);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(DetectedLanguage::unknown()).unwrap();
        assert_eq!(json["detectedLanguage"], "Unknown");
        assert_eq!(json["languageCode"], "en");
        assert_eq!(json["isAfricanLanguage"], false);
    }
}

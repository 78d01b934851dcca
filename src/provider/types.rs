//! Gemini wire types for `generateContent`

use serde::{Deserialize, Serialize};

/// Conversation role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One part of a content turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A user turn holding a single text part
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// A model turn holding a single text part
    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self::text(Role::Model, text)
    }

    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }
}

/// Sampling parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl GenerationConfig {
    /// Parameters for conversational replies
    #[must_use]
    pub const fn chat() -> Self {
        Self {
            temperature: Some(0.7),
            top_k: Some(1),
            top_p: Some(0.95),
            max_output_tokens: Some(800),
        }
    }

    /// Low-temperature parameters for classification prompts
    #[must_use]
    pub const fn classification() -> Self {
        Self {
            temperature: Some(0.1),
            top_k: None,
            top_p: Some(0.1),
            max_output_tokens: Some(300),
        }
    }
}

/// Harm category subject to a safety threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmCategory {
    HarmCategoryHarassment,
    HarmCategoryHateSpeech,
    HarmCategorySexuallyExplicit,
    HarmCategoryDangerousContent,
}

/// Blocking threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockLowAndAbove,
    BlockMediumAndAbove,
    BlockOnlyHigh,
    BlockNone,
}

/// Safety threshold for one category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

/// The four categories blocked at medium and above
#[must_use]
pub fn default_safety_settings() -> Vec<SafetySetting> {
    [
        HarmCategory::HarmCategoryHarassment,
        HarmCategory::HarmCategoryHateSpeech,
        HarmCategory::HarmCategorySexuallyExplicit,
        HarmCategory::HarmCategoryDangerousContent,
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category,
        threshold: HarmBlockThreshold::BlockMediumAndAbove,
    })
    .collect()
}

/// Request body for `models/{model}:generateContent`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub safety_settings: Vec<SafetySetting>,
}

impl GenerateRequest {
    /// A single-turn prompt with no conversation history
    #[must_use]
    pub fn prompt(text: impl Into<String>, generation_config: GenerationConfig) -> Self {
        Self {
            contents: vec![Content::user(text)],
            generation_config,
            safety_settings: Vec::new(),
        }
    }

    /// Text of the most recent user turn
    #[must_use]
    pub fn last_user_text(&self) -> Option<&str> {
        self.contents
            .iter()
            .rev()
            .find(|c| c.role == Role::User)
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.as_deref())
    }
}

/// Raw provider response
///
/// Kept as untyped JSON: reply extraction tolerates several response shapes.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct GenerateResponse {
    pub raw: serde_json::Value,
}

impl GenerateResponse {
    /// Wrap a raw JSON response
    #[must_use]
    pub const fn new(raw: serde_json::Value) -> Self {
        Self { raw }
    }

    /// Build a response carrying one candidate with the given text
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self::new(serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        }))
    }

    /// The first candidate's content, if it parses as a conversation turn
    #[must_use]
    pub fn first_content(&self) -> Option<Content> {
        let content = self.raw.get("candidates")?.get(0)?.get("content")?;
        serde_json::from_value(content.clone()).ok()
    }

    /// Block reason reported for the prompt, if any
    #[must_use]
    pub fn block_reason(&self) -> Option<&str> {
        self.raw
            .get("promptFeedback")?
            .get("blockReason")?
            .as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_camel_case() {
        let request = GenerateRequest {
            contents: vec![Content::user("hi")],
            generation_config: GenerationConfig::chat(),
            safety_settings: default_safety_settings(),
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 800);
        assert_eq!(json["generationConfig"]["topK"], 1);
        assert_eq!(
            json["safetySettings"][0]["category"],
            "HARM_CATEGORY_HARASSMENT"
        );
        assert_eq!(
            json["safetySettings"][3]["threshold"],
            "BLOCK_MEDIUM_AND_ABOVE"
        );
    }

    #[test]
    fn classification_omits_top_k() {
        let json = serde_json::to_value(GenerationConfig::classification()).unwrap();
        assert!(json.get("topK").is_none());
        assert_eq!(json["maxOutputTokens"], 300);
    }

    #[test]
    fn first_content_reads_candidate() {
        let response = GenerateResponse::from_text("Jambo!");
        let content = response.first_content().unwrap();
        assert_eq!(content.role, Role::Model);
        assert_eq!(content.parts[0].text.as_deref(), Some("Jambo!"));
    }

    #[test]
    fn block_reason_from_prompt_feedback() {
        let response = GenerateResponse::new(serde_json::json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }));
        assert_eq!(response.block_reason(), Some("SAFETY"));
        assert!(response.first_content().is_none());
    }

    #[test]
    fn last_user_text_skips_model_turns() {
        let request = GenerateRequest {
            contents: vec![
                Content::user("first"),
                Content::model("reply"),
                Content::user("second"),
                Content::model("trailing"),
            ],
            generation_config: GenerationConfig::default(),
            safety_settings: Vec::new(),
        };
        assert_eq!(request.last_user_text(), Some("second"));
    }
}

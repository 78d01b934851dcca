//! Keyword intents recognised before a message reaches the model

use std::sync::LazyLock;

use regex::Regex;

static LANGUAGE_QUESTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)what language|which language|identify language").expect("valid regex")
});

static BILINGUAL_REQUEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)in english|translate|both languages").expect("valid regex")
});

/// What the user is asking for, as far as keywords tell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Asks which language they are writing in
    IdentifyLanguage,
    /// Wants the answer in their language and in English
    Bilingual,
    /// Anything else
    Converse,
}

impl Intent {
    /// Classify a user message
    #[must_use]
    pub fn of(message: &str) -> Self {
        if LANGUAGE_QUESTION.is_match(message) {
            Self::IdentifyLanguage
        } else if BILINGUAL_REQUEST.is_match(message) {
            Self::Bilingual
        } else {
            Self::Converse
        }
    }
}

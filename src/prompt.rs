//! Fixed prompts sent to the provider

/// Maximum characters of user text included in a classification prompt
const DETECTION_TEXT_LIMIT: usize = 300;

/// Seeds every conversation as its first user turn
pub const SYSTEM_INSTRUCTION: &str = "You are Africon, an AI assistant specialized in conversations about Africa.

Your primary capabilities include:
1. Expert knowledge about African languages, history, cultures, and current affairs
2. Ability to recognize and respond in multiple African languages, especially Somali
3. Providing helpful, accurate, and culturally sensitive information
4. Conversing naturally with a warm, friendly tone

When responding:
- Respond *only* in the language detected in the user's last message.
- DO NOT add an English translation or explanation unless the user explicitly asks for one (e.g., using phrases like \"in English\", \"translate\", \"in both languages\").
- Be respectful of African cultures and traditions
- Provide detailed, educational responses about African topics
- Add relevant African proverbs or sayings when appropriate
- For complex questions, break down your responses clearly
- If a question is unclear, politely ask for clarification
- If you don't know something, be honest and don't make up information
- Keep historical and cultural information accurate

Always maintain a friendly, culturally-aware tone that respects the diversity of African perspectives.";

/// Model turn that follows the system instruction in a fresh conversation
pub const GREETING: &str = "I am Africon, your voice assistant for African languages, history, and culture. How can I assist you today?";

/// Periodic nudge against behavioural drift in long conversations
pub const REMINDER: &str = "Remember your system instructions and purpose.";

/// Prepended to a message when the user asks for a two-language answer
pub const BILINGUAL_INSTRUCTION: &str = "For this response only, please respond in both the detected language and English, clearly separating the two parts.";

/// Build the language classification prompt for `text`
#[must_use]
pub fn language_detection(text: &str) -> String {
    let mut excerpt: String = text.chars().take(DETECTION_TEXT_LIMIT).collect();
    if text.chars().count() > DETECTION_TEXT_LIMIT {
        excerpt.push_str("...");
    }

    format!(
        r#"Analyze the following text and determine the language with high precision.
If it's in an African language, please be very specific about which one, including dialect if possible.
Focus on accurately identifying these African languages:
- Somali (so)
- Swahili (sw)
- Yoruba (yo)
- Hausa (ha)
- Amharic (am)
- Zulu (zu)
- Xhosa (xh)
- Igbo (ig)
- Akan/Twi (ak)
- Wolof (wo)
- Oromo (om)
- Tigrinya (ti)

If the text contains even a few words in Somali, identify it as Somali.
Be very accurate with language detection, especially for African languages that may be less common.

Return only a JSON object with these properties:
- detectedLanguage: The full name of the language (e.g. "Somali", "Swahili", "English", "Yoruba")
- languageCode: The ISO 639-1 code (e.g. "so" for Somali, "sw" for Swahili, "en" for English)
- isAfricanLanguage: Boolean whether it's an African language
- confidence: Number from 0-1 indicating confidence level

Text to analyze: "{excerpt}"

JSON response:"#
    )
}

/// Prefix the bilingual instruction onto a user message
#[must_use]
pub fn with_bilingual_instruction(message: &str) -> String {
    format!("{BILINGUAL_INSTRUCTION}\n\n{message}")
}

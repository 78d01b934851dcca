//! Voice selection for spoken replies

use serde::{Deserialize, Serialize};

use crate::language::looks_somali;

/// A synthesis voice offered by an engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    /// BCP 47 tag, e.g. `en-NG`
    pub lang: String,
}

impl Voice {
    #[must_use]
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// Closest widely available voice locale for each language
const LANGUAGE_VOICE_MAP: [(&str, &str); 20] = [
    ("sw", "sw"),
    ("yo", "en-NG"),
    ("ha", "en-NG"),
    ("ig", "en-NG"),
    ("am", "am"),
    ("zu", "en-ZA"),
    ("xh", "en-ZA"),
    ("sn", "en-ZA"),
    ("st", "en-ZA"),
    ("tn", "en-ZA"),
    ("af", "af"),
    ("wo", "fr-SN"),
    ("so", "ar"),
    ("ln", "fr-CD"),
    ("mg", "fr"),
    ("ny", "en-MW"),
    ("om", "am"),
    ("ti", "am"),
    ("rw", "fr-RW"),
    ("lg", "en-UG"),
];

/// Greeting and courtesy words per language, checked in order
const KEYWORD_PATTERNS: [(&str, &[&str]); 7] = [
    ("sw", &["habari", "asante", "jambo", "karibu", "hakuna", "matata", "kwaheri"]),
    ("yo", &["bawo", "ṣe", "jọwọ", "pẹlẹ", "kí", "ní", "ilé"]),
    ("ha", &["sannu", "yaya", "kana", "lafiya", "nagode", "madalla"]),
    ("am", &["selam", "aderesachu", "tedenagarku", "betam", "ameseginalew"]),
    ("zu", &["sawubona", "unjani", "yebo", "ngiyabonga", "hamba"]),
    ("xh", &["molo", "ewe", "enkosi", "sala"]),
    ("af", &["hallo", "totsiens", "dankie", "asseblief", "goeie"]),
];

/// Map a detected language code to the locale used for voice lookup
#[must_use]
pub fn map_language_code(code: &str) -> String {
    let lower = code.to_lowercase();
    LANGUAGE_VOICE_MAP
        .iter()
        .find(|(from, _)| *from == lower)
        .map_or(lower, |(_, to)| (*to).to_string())
}

/// Guess a language from keywords when none was detected
#[must_use]
pub fn guess_language_code(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    KEYWORD_PATTERNS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| words.contains(k)))
        .map(|(code, _)| *code)
        .or_else(|| looks_somali(text).then_some("so"))
}

/// Locale to speak `text` in, from the detected code or a keyword guess
#[must_use]
pub fn target_locale(text: &str, language: Option<&str>) -> String {
    let code = language
        .filter(|c| !c.is_empty())
        .or_else(|| guess_language_code(text))
        .unwrap_or("en");
    map_language_code(code)
}

/// Base language of a locale (`en-NG` → `en`)
#[must_use]
pub fn base_language(locale: &str) -> &str {
    locale.split('-').next().unwrap_or(locale)
}

/// Pick the best voice for `target`
///
/// Exact locale, then base language, then (for non-English targets) an
/// English voice with an African accent or any English voice. `None` means
/// the engine default should be used.
#[must_use]
pub fn select_voice<'a>(voices: &'a [Voice], target: &str) -> Option<&'a Voice> {
    let target = target.to_lowercase();
    let base = base_language(&target);

    if let Some(voice) = voices.iter().find(|v| v.lang.to_lowercase() == target) {
        return Some(voice);
    }
    if let Some(voice) = voices
        .iter()
        .find(|v| v.lang.to_lowercase().starts_with(base))
    {
        return Some(voice);
    }
    if target == "en" {
        return None;
    }

    let english: Vec<&Voice> = voices
        .iter()
        .filter(|v| v.lang.to_lowercase().starts_with("en"))
        .collect();

    ["africa", "nigeria", "kenya"]
        .iter()
        .find_map(|accent| {
            english
                .iter()
                .find(|v| v.name.to_lowercase().contains(accent))
                .copied()
        })
        .or_else(|| english.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voices() -> Vec<Voice> {
        vec![
            Voice::new("Google US English", "en-US"),
            Voice::new("Microsoft Ezinne Online (Nigeria)", "en-NG"),
            Voice::new("Google français", "fr-FR"),
            Voice::new("Microsoft Rehema Online (Tanzania)", "sw-TZ"),
        ]
    }

    #[test]
    fn maps_known_codes() {
        assert_eq!(map_language_code("yo"), "en-NG");
        assert_eq!(map_language_code("SO"), "ar");
        assert_eq!(map_language_code("wo"), "fr-SN");
        assert_eq!(map_language_code("lg"), "en-UG");
        assert_eq!(map_language_code("de"), "de");
    }

    #[test]
    fn guesses_from_keywords() {
        assert_eq!(guess_language_code("Habari rafiki"), Some("sw"));
        assert_eq!(guess_language_code("Sawubona baba"), Some("zu"));
        assert_eq!(guess_language_code("Waxaan ku jeclahay"), Some("so"));
        assert_eq!(guess_language_code("Tell me about Timbuktu"), None);
        // A single shared function word is not enough for Somali
        assert_eq!(guess_language_code("stay in the car"), None);
    }

    #[test]
    fn detected_code_wins_over_guess() {
        assert_eq!(target_locale("Habari", Some("yo")), "en-NG");
        assert_eq!(target_locale("Habari", None), "sw");
        assert_eq!(target_locale("Hello there", Some("")), "en");
    }

    #[test]
    fn exact_then_prefix_match() {
        let voices = voices();
        assert_eq!(select_voice(&voices, "en-NG").unwrap().lang, "en-NG");
        assert_eq!(select_voice(&voices, "sw").unwrap().lang, "sw-TZ");
        assert_eq!(select_voice(&voices, "fr-SN").unwrap().lang, "fr-FR");
    }

    #[test]
    fn falls_back_to_accented_english() {
        let voices = voices();
        let voice = select_voice(&voices, "ar").unwrap();
        assert!(voice.name.contains("Nigeria"));
    }

    #[test]
    fn falls_back_to_first_english_voice() {
        let voices = vec![Voice::new("Alex", "en-US"), Voice::new("Anna", "de-DE")];
        assert_eq!(select_voice(&voices, "am").unwrap().name, "Alex");
    }

    #[test]
    fn no_voice_means_engine_default() {
        assert!(select_voice(&[], "sw").is_none());
        let voices = vec![Voice::new("Anna", "de-DE")];
        assert!(select_voice(&voices, "en").is_none());
    }
}

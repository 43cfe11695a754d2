pub const LANGUAGES: [&str; 16] = [
    "English",
    "Hebrew",
    "Spanish",
    "French",
    "Russian",
    "Chinese",
    "Japanese",
    "Arabic",
    "German",
    "Italian",
    "Portuguese",
    "Korean",
    "Dutch",
    "Polish",
    "Turkish",
    "Hindi",
];

pub const DEFAULT_LANGUAGE: &str = "Hebrew";
pub const FALLBACK_LOCALE: &str = "en-US";

const RTL_LANGUAGES: [&str; 7] = [
    "Arabic", "Hebrew", "Urdu", "Persian", "Farsi", "Pashto", "Kurdish",
];

/// Maps a language name to the locale handed to the speech engine.
/// Unknown languages fall back to `en-US`.
pub fn locale_for(language: &str) -> &'static str {
    match language {
        "English" => "en-US",
        "Hebrew" => "he-IL",
        "Spanish" => "es-ES",
        "French" => "fr-FR",
        "Russian" => "ru-RU",
        "Chinese" => "zh-CN",
        "Japanese" => "ja-JP",
        "Arabic" => "ar-SA",
        "German" => "de-DE",
        "Italian" => "it-IT",
        "Portuguese" => "pt-PT",
        "Korean" => "ko-KR",
        "Dutch" => "nl-NL",
        "Polish" => "pl-PL",
        "Turkish" => "tr-TR",
        "Hindi" => "hi-IN",
        _ => FALLBACK_LOCALE,
    }
}

pub fn is_rtl(language: &str) -> bool {
    RTL_LANGUAGES.contains(&language)
}

pub fn is_supported(language: &str) -> bool {
    LANGUAGES.contains(&language)
}

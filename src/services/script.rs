//! Prompt construction and response parsing for screenplay generation.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use crate::core::language;
use crate::core::state::{GenerationRequest, Screenplay};

const PITCH_MIN_CHARS: usize = 10;
const PITCH_MAX_CHARS: usize = 200;
const MIN_LINES_RANGE: std::ops::RangeInclusive<u32> = 1..=200;

impl GenerationRequest {
    pub fn validate(&self) -> Result<()> {
        let pitch_len = self.story_pitch.trim().chars().count();
        if pitch_len > 0 && !(PITCH_MIN_CHARS..=PITCH_MAX_CHARS).contains(&pitch_len) {
            bail!(
                "story pitch must be between {} and {} characters (got {})",
                PITCH_MIN_CHARS,
                PITCH_MAX_CHARS,
                pitch_len
            );
        }
        if self.dialog_languages.is_empty() {
            bail!("at least one dialog language is required");
        }
        if let Some(unknown) = self
            .dialog_languages
            .iter()
            .chain(std::iter::once(&self.default_screenplay_language))
            .find(|l| !language::is_supported(l))
        {
            bail!("unsupported language: {}", unknown);
        }
        if !MIN_LINES_RANGE.contains(&self.min_lines_per_dialog) {
            bail!(
                "min_lines_per_dialog must be within {:?} (got {})",
                MIN_LINES_RANGE,
                self.min_lines_per_dialog
            );
        }
        Ok(())
    }
}

pub fn system_prompt() -> String {
    "You are a screenwriter. Reply only with a JSON document matching the provided schema."
        .to_string()
}

pub fn user_prompt(request: &GenerationRequest) -> String {
    let langs = request.dialog_languages.join(", ");
    let base = if request.story_pitch.trim().is_empty() {
        "Create a creative original screenplay.".to_string()
    } else {
        format!(
            "Create a screenplay based on this pitch: {}",
            request.story_pitch.trim()
        )
    };
    format!(
        "{} Use these languages for character dialogue: {}. \
         The default screenplay language (for all text except character dialogue) should be: {}. \
         Every dialog should have at least {} lines. \
         When a line is not in the default language, put its translation into the default language in \"translation\".",
        base, langs, request.default_screenplay_language, request.min_lines_per_dialog
    )
}

/// JSON schema sent as the structured-output response format. Request values are injected
/// as schema defaults so providers that honour them echo the request back.
pub fn screenplay_schema(request: &GenerationRequest) -> Value {
    let languages: Vec<&str> = language::LANGUAGES.to_vec();
    json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" },
            "story_pitch": { "type": "string", "default": request.story_pitch },
            "exposition": { "type": "string" },
            "dialog_languages": {
                "type": "array",
                "items": { "type": "string", "enum": languages },
                "default": request.dialog_languages,
            },
            "default_screenplay_language": {
                "type": "string",
                "enum": languages,
                "default": request.default_screenplay_language,
            },
            "cast": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "description": { "type": "string" }
                    },
                    "required": ["name"]
                }
            },
            "scenes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "scene_heading": { "type": "string" },
                        "scene": { "type": "string" },
                        "transition": { "type": "string" },
                        "dialogue": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "character": { "type": "string" },
                                    "language": { "type": "string", "enum": languages },
                                    "text": { "type": "string" },
                                    "translation": { "type": "string" },
                                    "parenthetical": { "type": "string" },
                                    "action": { "type": "string" }
                                },
                                "required": ["character", "language", "text"]
                            }
                        }
                    },
                    "required": ["scene", "dialogue"]
                }
            }
        },
        "required": ["story_pitch", "dialog_languages", "default_screenplay_language", "cast", "scenes"]
    })
}

pub fn parse_screenplay(response: &str) -> Result<Screenplay> {
    let clean_json = strip_code_blocks(response);
    let screenplay: Screenplay = serde_json::from_str(&clean_json)
        .with_context(|| format!("Failed to parse screenplay JSON: {}", clean_json))?;
    if screenplay.scenes.is_empty() {
        bail!("screenplay contains no scenes");
    }
    Ok(screenplay)
}

pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if s.starts_with("```json") {
        s.trim_start_matches("```json")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else if s.starts_with("```") {
        s.trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else {
        s.to_string()
    }
}

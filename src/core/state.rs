use serde::{Deserialize, Serialize};

/// A generated screenplay. Scene and line order is playback order.
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct Screenplay {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub story_pitch: Option<String>,
    #[serde(default)]
    pub exposition: Option<String>,
    #[serde(default, alias = "languages_used")]
    pub dialog_languages: Vec<String>,
    #[serde(default)]
    pub default_screenplay_language: Option<String>,
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct CastMember {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct Scene {
    #[serde(default)]
    pub scene_heading: Option<String>,
    /// Descriptive text read by the narrator.
    #[serde(rename = "scene", default)]
    pub description: String,
    #[serde(default)]
    pub transition: Option<String>,
    #[serde(default)]
    pub dialogue: Vec<DialogueLine>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct DialogueLine {
    #[serde(default)]
    pub character: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub translation: Option<String>,
    #[serde(default)]
    pub parenthetical: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

impl Screenplay {
    pub fn line_count(&self) -> usize {
        self.scenes.iter().map(|s| s.dialogue.len()).sum()
    }

    /// Label used in menus and logs.
    pub fn label(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return title.to_string();
        }
        match self.story_pitch.as_deref() {
            Some(pitch) if !pitch.trim().is_empty() => pitch.chars().take(60).collect(),
            _ => format!("Untitled ({} scenes)", self.scenes.len()),
        }
    }
}

/// Parameters of one generation request, shared by every target of a fan-out.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    #[serde(default)]
    pub story_pitch: String,
    pub dialog_languages: Vec<String>,
    pub default_screenplay_language: String,
    #[serde(default = "default_min_lines")]
    pub min_lines_per_dialog: u32,
}

fn default_min_lines() -> u32 {
    50
}

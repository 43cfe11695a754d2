use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::language::DEFAULT_LANGUAGE;
use crate::core::state::GenerationRequest;
use crate::services::llm::LlmConfig;
use crate::services::models::CatalogConfig;
use crate::services::playback::PlaybackOptions;
use crate::services::speech::command::SpeechConfig;

const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_history")]
    pub history_folder: String,

    #[serde(default)]
    pub unattended: bool,

    pub llm: LlmConfig,

    #[serde(default = "default_generation")]
    pub generation: GenerationRequest,

    #[serde(default)]
    pub playback: PlaybackOptions,

    #[serde(default)]
    pub speech: SpeechConfig,

    #[serde(default)]
    pub models: CatalogConfig,
}

fn default_history() -> String {
    "history".to_string()
}

fn default_generation() -> GenerationRequest {
    GenerationRequest {
        story_pitch:
            "Create a conversation between an adult and a child playing a guessing game"
                .to_string(),
        dialog_languages: vec!["Arabic".to_string(), "Hebrew".to_string()],
        default_screenplay_language: DEFAULT_LANGUAGE.to_string(),
        min_lines_per_dialog: 50,
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = serde_yaml_ng::from_str(content)?;
        config.generation.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(CONFIG_FILE, content).context("Failed to write config.yml")?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.history_folder)?;
        Ok(())
    }
}

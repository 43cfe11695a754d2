use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::io::Storage;
use crate::core::state::{GenerationRequest, Screenplay};

pub const MAX_HISTORY: usize = 20;
const HISTORY_FILE: &str = "screenplay_history.json";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub screenplay: Screenplay,
    pub params: HistoryParams,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct HistoryParams {
    #[serde(default)]
    pub story_pitch: String,
    #[serde(default)]
    pub dialog_languages: Vec<String>,
    #[serde(default)]
    pub default_screenplay_language: String,
    #[serde(default)]
    pub model: String,
}

impl HistoryParams {
    pub fn new(request: &GenerationRequest, model: &str) -> Self {
        Self {
            story_pitch: request.story_pitch.clone(),
            dialog_languages: request.dialog_languages.clone(),
            default_screenplay_language: request.default_screenplay_language.clone(),
            model: model.to_string(),
        }
    }
}

/// Generated screenplays, newest first, capped at [`MAX_HISTORY`].
pub struct HistoryStore {
    storage: Arc<dyn Storage>,
    path: String,
}

impl HistoryStore {
    pub fn new(storage: Arc<dyn Storage>, folder: &str) -> Self {
        let path = std::path::Path::new(folder)
            .join(HISTORY_FILE)
            .to_string_lossy()
            .to_string();
        Self { storage, path }
    }

    /// A corrupt file is dropped and treated as an empty history.
    pub async fn list(&self) -> Result<Vec<HistoryEntry>> {
        if !self.storage.exists(&self.path).await? {
            return Ok(Vec::new());
        }
        let bytes = self.storage.read(&self.path).await?;
        match serde_json::from_slice(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!("Discarding unreadable history {}: {}", self.path, e);
                self.storage.delete(&self.path).await?;
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, entries: &[HistoryEntry]) -> Result<()> {
        let content = serde_json::to_vec_pretty(entries)?;
        self.storage
            .write(&self.path, &content)
            .await
            .with_context(|| format!("Failed to write {}", self.path))
    }

    pub async fn add(&self, screenplay: Screenplay, params: HistoryParams) -> Result<HistoryEntry> {
        let mut entries = self.list().await?;
        let now = Utc::now();
        // Ids are creation millis, bumped when two saves land in the same millisecond.
        let id = entries
            .first()
            .map(|e| e.id + 1)
            .unwrap_or(i64::MIN)
            .max(now.timestamp_millis());
        let entry = HistoryEntry {
            id,
            timestamp: now,
            screenplay,
            params,
        };
        entries.insert(0, entry.clone());
        entries.truncate(MAX_HISTORY);
        self.save(&entries).await?;
        info!("Added screenplay to history. Total: {}", entries.len());
        Ok(entry)
    }

    pub async fn remove(&self, id: i64) -> Result<bool> {
        let mut entries = self.list().await?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.save(&entries).await?;
        info!("Removed screenplay from history. Total: {}", entries.len());
        Ok(true)
    }

    pub async fn get(&self, id: i64) -> Result<Option<HistoryEntry>> {
        Ok(self.list().await?.into_iter().find(|e| e.id == id))
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage.delete(&self.path).await?;
        info!("Cleared all screenplays from history");
        Ok(())
    }

    /// Bytes used by the history file.
    pub async fn usage(&self) -> Result<u64> {
        self.storage.usage(&self.path).await
    }
}

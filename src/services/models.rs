//! Catalog of free models that support structured output, fetched from OpenRouter.

use anyhow::{anyhow, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_ttl")]
    pub cache_ttl_seconds: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            cache_ttl_seconds: default_ttl(),
        }
    }
}

fn default_url() -> String {
    "https://openrouter.ai/api/frontend/models/find?fmt=table&max_price=0&order=newest&supported_parameters=structured_outputs%2Cmax_tokens%2Cresponse_format".to_string()
}

fn default_ttl() -> u64 {
    3600
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

pub struct ModelCatalog {
    config: CatalogConfig,
    client: reqwest::Client,
    cache: Mutex<Option<(Instant, Vec<ModelInfo>)>>,
}

impl ModelCatalog {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            cache: Mutex::new(None),
        }
    }

    /// Returns the cached list while it is younger than the TTL, otherwise refetches.
    pub async fn models(&self) -> Result<Vec<ModelInfo>> {
        let mut cache = self.cache.lock().await;
        let ttl = Duration::from_secs(self.config.cache_ttl_seconds);
        if let Some((fetched_at, models)) = cache.as_ref() {
            if fetched_at.elapsed() < ttl {
                debug!("Serving {} cached models", models.len());
                return Ok(models.clone());
            }
        }

        info!("Fetching models from OpenRouter...");
        let resp = self
            .client
            .get(&self.config.url)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("OpenRouter API returned {}", resp.status()));
        }
        let body: Value = resp.json().await?;
        let models = extract_models(&body);
        info!("Fetched {} models", models.len());
        *cache = Some((Instant::now(), models.clone()));
        Ok(models)
    }
}

/// Pulls model ids out of the catalog response. The endpoint has shipped the list bare, under
/// `data` and under `data.models`, so all three are accepted.
pub fn extract_models(body: &Value) -> Vec<ModelInfo> {
    let list = body
        .pointer("/data/models")
        .or_else(|| body.get("data"))
        .unwrap_or(body);
    let Some(entries) = list.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let id = entry
                .get("slug")
                .or_else(|| entry.get("id"))
                .and_then(Value::as_str)?;
            let name = entry
                .get("name")
                .or_else(|| entry.get("short_name"))
                .and_then(Value::as_str)
                .unwrap_or(id);
            Some(ModelInfo {
                id: id.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_models_nested() {
        let body = json!({
            "data": {
                "models": [
                    { "slug": "allenai/olmo-3.1-32b-think", "name": "Olmo 3.1 32B Think" },
                    { "slug": "vendor/no-name" },
                    { "name": "missing id" }
                ]
            }
        });
        let models = extract_models(&body);
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "allenai/olmo-3.1-32b-think");
        assert_eq!(models[0].name, "Olmo 3.1 32B Think");
        assert_eq!(models[1].name, "vendor/no-name");
    }

    #[test]
    fn test_extract_models_flat_shapes() {
        let data = json!({ "data": [ { "id": "a/b:free", "name": "B" } ] });
        assert_eq!(extract_models(&data)[0].id, "a/b:free");

        let bare = json!([ { "id": "c/d" } ]);
        assert_eq!(extract_models(&bare)[0].id, "c/d");

        assert!(extract_models(&json!({ "error": "nope" })).is_empty());
    }

    #[tokio::test]
    async fn test_fresh_cache_is_served_without_network() {
        let catalog = ModelCatalog::new(CatalogConfig {
            url: "http://127.0.0.1:9/unreachable".to_string(),
            cache_ttl_seconds: 3600,
        });
        let cached = vec![ModelInfo {
            id: "x/y".to_string(),
            name: "Y".to_string(),
        }];
        *catalog.cache.lock().await = Some((Instant::now(), cached.clone()));

        assert_eq!(catalog.models().await.unwrap(), cached);
    }
}

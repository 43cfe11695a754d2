use anyhow::Result;
use std::sync::Arc;

use screenplay2speech::core::config::Config;
use screenplay2speech::core::io::{NativeStorage, Storage};
use screenplay2speech::services::llm;
use screenplay2speech::services::speech::command::CommandSpeechEngine;
use screenplay2speech::services::workflow::WorkflowManager;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            eprintln!("Please ensure 'config.yml' exists with at least an `llm.provider`.");
            return Err(e);
        }
    };

    config.ensure_directories()?;

    let generator = llm::create_generator(&config)?;
    let engine = Arc::new(CommandSpeechEngine::detect(config.speech.clone()).await?);
    let storage: Arc<dyn Storage> = Arc::new(NativeStorage::new());

    let mut manager = WorkflowManager::new(config, generator, engine, storage);
    manager.run().await?;

    Ok(())
}

//! Interactive prompts that collect what a generation run needs.

use anyhow::Result;
use inquire::{CustomType, MultiSelect, Select, Text};
use log::warn;

use crate::core::config::Config;
use crate::core::language::LANGUAGES;
use crate::core::state::GenerationRequest;
use crate::services::history::HistoryEntry;
use crate::services::models::ModelCatalog;

pub fn prompt_request(config: &Config) -> Result<GenerationRequest> {
    let defaults = &config.generation;
    if config.unattended {
        return Ok(defaults.clone());
    }

    loop {
        let story_pitch = Text::new("Story pitch (leave empty for a surprise):")
            .with_default(&defaults.story_pitch)
            .prompt()?;

        let preselected: Vec<usize> = LANGUAGES
            .iter()
            .enumerate()
            .filter(|(_, l)| defaults.dialog_languages.iter().any(|d| d == *l))
            .map(|(i, _)| i)
            .collect();
        let dialog_languages: Vec<String> =
            MultiSelect::new("Dialog languages:", LANGUAGES.to_vec())
                .with_default(&preselected)
                .prompt()?
                .into_iter()
                .map(str::to_string)
                .collect();

        let default_index = LANGUAGES
            .iter()
            .position(|l| *l == defaults.default_screenplay_language)
            .unwrap_or(0);
        let default_screenplay_language =
            Select::new("Default screenplay language:", LANGUAGES.to_vec())
                .with_starting_cursor(default_index)
                .prompt()?
                .to_string();

        let min_lines_per_dialog = CustomType::<u32>::new("Minimum lines per dialog:")
            .with_default(defaults.min_lines_per_dialog)
            .prompt()?;

        let request = GenerationRequest {
            story_pitch,
            dialog_languages,
            default_screenplay_language,
            min_lines_per_dialog,
        };
        match request.validate() {
            Ok(()) => return Ok(request),
            Err(e) => println!("{}. Let's try again.", e),
        }
    }
}

/// Targets for one fan-out. Unattended runs use the configured list or the default model.
/// `None` when the user picked nothing.
pub async fn prompt_targets(
    config: &Config,
    catalog: &ModelCatalog,
) -> Result<Option<Vec<String>>> {
    let llm = &config.llm;
    let configured = if llm.targets.is_empty() {
        vec![llm.default_model.clone()]
    } else {
        llm.targets.clone()
    };
    if config.unattended {
        return Ok(Some(configured));
    }

    let mut options: Vec<String> = match catalog.models().await {
        Ok(models) => models.into_iter().map(|m| m.id).collect(),
        Err(e) => {
            warn!("Model catalog unavailable: {:#}", e);
            Vec::new()
        }
    };
    for target in configured.iter().rev() {
        if !options.contains(target) {
            options.insert(0, target.clone());
        }
    }

    let preselected: Vec<usize> = options
        .iter()
        .enumerate()
        .filter(|(_, o)| configured.contains(o))
        .map(|(i, _)| i)
        .collect();
    let targets = MultiSelect::new("Models to generate with:", options)
        .with_default(&preselected)
        .prompt()?;
    Ok(picked(targets))
}

fn picked(targets: Vec<String>) -> Option<Vec<String>> {
    if targets.is_empty() {
        println!("No models selected.");
        return None;
    }
    Some(targets)
}

/// Lets the user pick a stored screenplay. `None` when history is empty.
pub fn select_history(entries: &[HistoryEntry]) -> Result<Option<HistoryEntry>> {
    if entries.is_empty() {
        println!("History is empty.");
        return Ok(None);
    }
    let labels: Vec<String> = entries.iter().map(history_label).collect();
    let choice = Select::new("Screenplay:", labels).raw_prompt()?;
    Ok(entries.get(choice.index).cloned())
}

fn history_label(entry: &HistoryEntry) -> String {
    format!(
        "{} | {} | {} ({} lines)",
        entry.timestamp.format("%Y-%m-%d %H:%M"),
        entry.params.model,
        entry.screenplay.label(),
        entry.screenplay.line_count()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::models::CatalogConfig;

    #[test]
    fn test_empty_selection_is_not_an_error() {
        assert_eq!(picked(Vec::new()), None);
        assert_eq!(
            picked(vec!["m/one".to_string()]),
            Some(vec!["m/one".to_string()])
        );
    }

    #[tokio::test]
    async fn test_unattended_targets() -> Result<()> {
        let catalog = ModelCatalog::new(CatalogConfig::default());
        let mut config = Config::parse("unattended: true\nllm:\n  provider: openrouter\n")?;
        assert_eq!(
            prompt_targets(&config, &catalog).await?,
            Some(vec![config.llm.default_model.clone()])
        );

        config.llm.targets = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            prompt_targets(&config, &catalog).await?,
            Some(vec!["a".to_string(), "b".to_string()])
        );
        Ok(())
    }
}

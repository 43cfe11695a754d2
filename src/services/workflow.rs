use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use inquire::{Confirm, Select};
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::core::config::Config;
use crate::core::io::Storage;
use crate::core::language;
use crate::core::state::Screenplay;
use crate::services::history::{HistoryParams, HistoryStore};
use crate::services::llm::ScreenplayGenerator;
use crate::services::models::ModelCatalog;
use crate::services::orchestrator::{AggregateResults, GenerationOrchestrator};
use crate::services::playback::{
    ContentKind, Cue, NarrationPlayer, PlaybackOutcome, PlaybackSink, PlaybackState,
};
use crate::services::requests::RequestState;
use crate::services::setup;
use crate::services::speech::SpeechEngine;

const MENU_GENERATE: &str = "Generate a screenplay";
const MENU_PLAY: &str = "Play from history";
const MENU_DELETE: &str = "Delete from history";
const MENU_CLEAR: &str = "Clear history";
const MENU_QUIT: &str = "Quit";

pub struct WorkflowManager {
    config: Config,
    orchestrator: GenerationOrchestrator,
    player: NarrationPlayer,
    history: HistoryStore,
    catalog: ModelCatalog,
}

impl WorkflowManager {
    pub fn new(
        config: Config,
        generator: Arc<dyn ScreenplayGenerator>,
        engine: Arc<dyn SpeechEngine>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let history = HistoryStore::new(storage, &config.history_folder);
        let catalog = ModelCatalog::new(config.models.clone());
        Self {
            orchestrator: GenerationOrchestrator::new(generator),
            player: NarrationPlayer::new(engine),
            history,
            catalog,
            config,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        if self.config.unattended {
            if let Some(screenplay) = self.generate().await? {
                self.narrate(screenplay).await?;
            }
            return Ok(());
        }

        loop {
            let entries = self.history.list().await?;
            let usage = self.history.usage().await?;
            println!(
                "History: {} screenplays ({:.2} KB)",
                entries.len(),
                usage as f64 / 1024.0
            );

            let choice = Select::new(
                "What next?",
                vec![MENU_GENERATE, MENU_PLAY, MENU_DELETE, MENU_CLEAR, MENU_QUIT],
            )
            .prompt()?;

            match choice {
                MENU_GENERATE => {
                    let Some(screenplay) = self.generate().await? else {
                        continue;
                    };
                    let play = Confirm::new("Narrate the primary result now?")
                        .with_default(true)
                        .prompt()?;
                    if play {
                        self.narrate(screenplay).await?;
                    }
                }
                MENU_PLAY => {
                    if let Some(entry) = setup::select_history(&entries)? {
                        self.narrate(entry.screenplay).await?;
                    }
                }
                MENU_DELETE => {
                    if let Some(entry) = setup::select_history(&entries)? {
                        self.history.remove(entry.id).await?;
                    }
                }
                MENU_CLEAR => {
                    let sure = Confirm::new("Delete every stored screenplay?")
                        .with_default(false)
                        .prompt()?;
                    if sure {
                        self.history.clear().await?;
                    }
                }
                _ => {
                    println!("Bye.");
                    return Ok(());
                }
            }
        }
    }

    /// Fans the request out, saves every success to history and returns the primary result.
    async fn generate(&self) -> Result<Option<Screenplay>> {
        let request = setup::prompt_request(&self.config)?;
        let Some(targets) = setup::prompt_targets(&self.config, &self.catalog).await? else {
            return Ok(None);
        };
        let tracker = self.orchestrator.tracker();
        tracker.clear_history();

        let progress = MultiProgress::new();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?;
        let bars: BTreeMap<String, ProgressBar> = targets
            .iter()
            .map(|target| {
                let pb = progress.add(ProgressBar::new_spinner());
                pb.set_style(style.clone());
                pb.set_message(format!("{} pending", target));
                pb.enable_steady_tick(Duration::from_millis(120));
                (target.clone(), pb)
            })
            .collect();

        let on_complete = |target: &str, screenplay: &Screenplay| {
            if let Some(pb) = bars.get(target) {
                pb.finish_with_message(format!(
                    "{} done: {} ({} scenes, {} lines)",
                    target,
                    screenplay.label(),
                    screenplay.scenes.len(),
                    screenplay.line_count()
                ));
            }
        };

        println!("Generating with {} models. Ctrl-C cancels all of them.", targets.len());
        let run = self
            .orchestrator
            .generate_for_targets(&request, &targets, Some(&on_complete));
        tokio::pin!(run);
        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        let results = loop {
            tokio::select! {
                results = &mut run => break results,
                _ = tokio::signal::ctrl_c() => {
                    if tracker.has_active_requests() {
                        println!("Cancelling {} requests...", tracker.active_targets().len());
                        self.orchestrator.cancel_all();
                    }
                }
                _ = ticker.tick() => {
                    for (target, status) in tracker.snapshot() {
                        if status.state != RequestState::Pending {
                            continue;
                        }
                        if let Some(pb) = bars.get(&target) {
                            let waited = chrono::Utc::now() - status.started_at;
                            pb.set_message(format!(
                                "{} pending {:.1}s",
                                target,
                                waited.num_milliseconds() as f64 / 1000.0
                            ));
                        }
                    }
                }
            }
        };

        finish_failed_bars(&bars, &results);
        for (target, result) in &results {
            if let Some(screenplay) = &result.data {
                self.history
                    .add(screenplay.clone(), HistoryParams::new(&request, target))
                    .await?;
            }
        }

        Ok(self.orchestrator.primary().map(|(target, screenplay)| {
            println!("Primary result: {} from {}", screenplay.label(), target);
            screenplay
        }))
    }

    /// Plays `screenplay`, reading p / r / s / `speed <language> <x>` from stdin meanwhile.
    /// Ctrl-C stops the narration.
    async fn narrate(&self, screenplay: Screenplay) -> Result<()> {
        let options = self.config.playback.for_document(&screenplay);
        let document = Arc::new(screenplay);
        let sink = Arc::new(ConsoleSink {
            document: document.clone(),
        });
        let mut states = self.player.subscribe_state();
        let interactive = !self.config.unattended;
        if interactive {
            println!("Commands: p = pause, r = resume, s = stop, speed <language> <x>");
        }

        let play = self.player.play(document, options, sink);
        tokio::pin!(play);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = interactive;

        let outcome = loop {
            tokio::select! {
                outcome = &mut play => break outcome?,
                _ = tokio::signal::ctrl_c() => self.player.stop(),
                Ok(()) = states.changed() => {
                    let state = *states.borrow_and_update();
                    if state != PlaybackState::Stopped {
                        println!("[{:?}]", state);
                    }
                }
                line = lines.next_line(), if stdin_open => match line? {
                    Some(command) => self.handle_command(command.trim()),
                    None => stdin_open = false,
                },
            }
        };

        match outcome {
            PlaybackOutcome::Completed => println!("Narration finished."),
            PlaybackOutcome::Stopped => println!("Narration stopped."),
        }
        if stdin_open {
            // Consume the read still pending on stdin before prompts take the terminal back.
            println!("Press Enter to return to the menu.");
            lines.next_line().await?;
        }
        Ok(())
    }

    fn handle_command(&self, command: &str) {
        let mut parts = command.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("p" | "pause"), None, None) => self.player.pause(),
            (Some("r" | "resume"), None, None) => self.player.resume(),
            (Some("s" | "stop"), None, None) => self.player.stop(),
            (Some("speed"), Some(lang), Some(value)) => match value.parse::<f32>() {
                Ok(speed) if language::is_supported(lang) => {
                    self.player.set_language_speed(lang, speed);
                    println!("{} speed set for the next segment.", lang);
                }
                Ok(_) => println!("Unknown language: {}", lang),
                Err(_) => println!("Not a number: {}", value),
            },
            (None, _, _) => {}
            _ => println!("Commands: p, r, s, speed <language> <x>"),
        }
    }
}

fn finish_failed_bars(bars: &BTreeMap<String, ProgressBar>, results: &AggregateResults) {
    for (target, result) in results {
        let Some(pb) = bars.get(target) else {
            continue;
        };
        if result.cancelled {
            pb.abandon_with_message(format!("{} cancelled", target));
        } else if !result.success {
            pb.abandon_with_message(format!(
                "{} failed: {}",
                target,
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
}

/// Prints each line as it starts. Word progress goes to the debug log.
struct ConsoleSink {
    document: Arc<Screenplay>,
}

impl PlaybackSink for ConsoleSink {
    fn on_line_start(&self, cue: Option<Cue>) {
        let Some(cue) = cue else {
            return;
        };
        let Some(line) = cue
            .line
            .and_then(|l| self.document.scenes.get(cue.scene)?.dialogue.get(l))
        else {
            return;
        };
        let direction = match line.language.as_deref() {
            Some(lang) if language::is_rtl(lang) => " (rtl)",
            _ => "",
        };
        println!("  {}{}: {}", line.character, direction, line.text);
        if let Some(translation) = &line.translation {
            println!("    {}", translation);
        }
    }

    fn on_word_start(&self, word: Option<&str>, kind: Option<ContentKind>, cue: Option<Cue>) {
        if let Some(word) = word {
            debug!("{:?} {:?}: {}", cue, kind, word);
        }
    }

    fn on_language_change(&self, language: &str) {
        info!("Speaking {}", language);
    }
}

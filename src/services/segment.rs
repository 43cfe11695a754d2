use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::core::cancel::{until_cancelled, CancellationToken};
use crate::core::language;
use crate::services::speech::{select_voice, SpeechEngine, SpeechRequest};
use crate::services::timing::estimate_word_timings;

/// Receives each simulated word, then `None` once the segment is over.
pub type WordCallback = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// Speaks one text segment at a time and simulates word-level progress for it.
pub struct SegmentPlayer {
    engine: Arc<dyn SpeechEngine>,
    next_generation: AtomicU64,
    /// Generation allowed to emit highlights. 0 when nothing is playing.
    active: Arc<Mutex<u64>>,
}

impl SegmentPlayer {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            engine,
            next_generation: AtomicU64::new(1),
            active: Arc::new(Mutex::new(0)),
        }
    }

    /// Plays `text` and resolves when the engine is done with it.
    ///
    /// Engine errors count as completion. If `token` fires first the utterance is aborted
    /// and no further callbacks are made.
    pub async fn play<S>(
        &self,
        text: &str,
        language: &str,
        speed: f32,
        token: &CancellationToken,
        on_word: WordCallback,
        on_start: S,
    ) where
        S: FnOnce() + Send,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        *self.lock_active() = generation;

        let locale = language::locale_for(language);
        let request = SpeechRequest {
            text: text.to_string(),
            locale: locale.to_string(),
            voice: select_voice(&self.engine.voices(), locale),
            rate: speed,
        };
        debug!(
            "Segment {} [{} x{:.2}]: {}",
            generation, locale, speed, request.text
        );

        let (started_tx, started_rx) = oneshot::channel();
        let engine = self.engine.clone();
        let mut utterance = tokio::spawn(async move { engine.speak(request, started_tx).await });

        let mut highlighter: Option<JoinHandle<()>> = None;
        let outcome = until_cancelled(token, async {
            if started_rx.await.is_ok() {
                on_start();
                highlighter = Some(self.spawn_highlighter(
                    generation,
                    token.clone(),
                    text,
                    speed,
                    on_word.clone(),
                ));
            }
            (&mut utterance).await
        })
        .await;

        self.retire(generation);
        if let Some(handle) = highlighter {
            handle.abort();
        }

        let Some(outcome) = outcome else {
            // A stop() that landed before the engine was polled never reaches it.
            utterance.abort();
            debug!("Segment {} abandoned after cancellation", generation);
            return;
        };
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Speech synthesis failed, skipping segment: {:#}", e),
            Err(e) => warn!("Speech task ended abnormally: {}", e),
        }
        on_word(None);
    }

    fn spawn_highlighter(
        &self,
        generation: u64,
        token: CancellationToken,
        text: &str,
        speed: f32,
        on_word: WordCallback,
    ) -> JoinHandle<()> {
        let timings = estimate_word_timings(text, speed);
        let active = self.active.clone();
        let origin = Instant::now();
        tokio::spawn(async move {
            for timing in timings {
                let due = tokio::time::sleep_until(origin + timing.at);
                if until_cancelled(&token, due).await.is_none() {
                    return;
                }
                let current = active.lock().unwrap_or_else(PoisonError::into_inner);
                if *current != generation || token.is_cancelled() {
                    return;
                }
                on_word(Some(&timing.word));
            }
        })
    }

    fn retire(&self, generation: u64) {
        let mut active = self.lock_active();
        if *active == generation {
            *active = 0;
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, u64> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

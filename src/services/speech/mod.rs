pub mod command;
#[cfg(test)]
pub(crate) mod testing;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};

#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub name: String,
    pub locale: String,
    pub gender: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub locale: String,
    pub voice: Option<Voice>,
    /// Rate multiplier, 1.0 is the engine's normal speed.
    pub rate: f32,
}

/// Pause state changes pushed by engines that can report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    Paused,
    Resumed,
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn voices(&self) -> Vec<Voice>;

    /// Speaks one utterance and resolves once it is finished or stopped.
    ///
    /// `started` is signalled when audio output actually begins. Engines that fail before
    /// starting drop it.
    async fn speak(&self, request: SpeechRequest, started: oneshot::Sender<()>) -> Result<()>;

    fn pause(&self);
    fn resume(&self);
    /// Hard stop of the current utterance.
    fn stop(&self);
    fn is_paused(&self) -> bool;
    fn is_speaking(&self) -> bool;

    fn events(&self) -> Option<broadcast::Receiver<EngineEvent>> {
        None
    }
}

/// Picks the voice for `locale`: exact match, then same language family (`ar` for
/// `ar-SA`), then whatever voice comes first.
pub fn select_voice(voices: &[Voice], locale: &str) -> Option<Voice> {
    let family = locale.split('-').next().unwrap_or(locale);
    voices
        .iter()
        .find(|v| v.locale.eq_ignore_ascii_case(locale))
        .or_else(|| {
            voices.iter().find(|v| {
                v.locale
                    .split('-')
                    .next()
                    .is_some_and(|f| f.eq_ignore_ascii_case(family))
            })
        })
        .or_else(|| voices.first())
        .cloned()
}

//! Scripted engine shared by the playback tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, Notify};

use super::{EngineEvent, SpeechEngine, SpeechRequest, Voice};

pub(crate) struct ScriptedEngine {
    utterance: Duration,
    failing: Vec<String>,
    with_events: bool,
    spoken: Mutex<Vec<SpeechRequest>>,
    paused: AtomicBool,
    speaking: AtomicBool,
    halt: Notify,
    events: broadcast::Sender<EngineEvent>,
}

impl ScriptedEngine {
    pub(crate) fn new(utterance: Duration) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            utterance,
            failing: Vec::new(),
            with_events: false,
            spoken: Mutex::new(Vec::new()),
            paused: AtomicBool::new(false),
            speaking: AtomicBool::new(false),
            halt: Notify::new(),
            events,
        }
    }

    pub(crate) fn failing(mut self, text: &str) -> Self {
        self.failing.push(text.to_string());
        self
    }

    pub(crate) fn with_events(mut self) -> Self {
        self.with_events = true;
        self
    }

    pub(crate) fn spoken(&self) -> Vec<SpeechRequest> {
        self.spoken.lock().unwrap().clone()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.spoken().into_iter().map(|r| r.text).collect()
    }
}

#[async_trait]
impl SpeechEngine for ScriptedEngine {
    fn voices(&self) -> Vec<Voice> {
        ["en-US", "he-IL", "ar-SA"]
            .iter()
            .map(|locale| Voice {
                name: format!("voice-{}", locale),
                locale: locale.to_string(),
                gender: None,
            })
            .collect()
    }

    async fn speak(&self, request: SpeechRequest, started: oneshot::Sender<()>) -> Result<()> {
        let halt = self.halt.notified();
        tokio::pin!(halt);
        halt.as_mut().enable();

        let text = request.text.clone();
        self.spoken.lock().unwrap().push(request);
        if self.failing.contains(&text) {
            bail!("synthesis failed for {:?}", text);
        }

        self.speaking.store(true, Ordering::SeqCst);
        let _ = started.send(());
        tokio::select! {
            _ = tokio::time::sleep(self.utterance) => {}
            _ = &mut halt => {}
        }
        self.speaking.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(EngineEvent::Paused);
        }
    }

    fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(EngineEvent::Resumed);
        }
    }

    fn stop(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.speaking.store(false, Ordering::SeqCst);
        self.halt.notify_waiters();
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    fn events(&self) -> Option<broadcast::Receiver<EngineEvent>> {
        self.with_events.then(|| self.events.subscribe())
    }
}

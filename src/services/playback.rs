//! Narration of a whole screenplay: planning which sub-segments are spoken, sequencing them
//! through the [`SegmentPlayer`] and keeping an observable playback state.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::core::cancel::CancellationToken;
use crate::core::language::{self, DEFAULT_LANGUAGE};
use crate::core::state::Screenplay;
use crate::services::segment::{SegmentPlayer, WordCallback};
use crate::services::speech::SpeechEngine;

pub const SPEED_RANGE: RangeInclusive<f32> = 0.5..=2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationTiming {
    Before,
    After,
    Both,
}

impl TranslationTiming {
    fn before(self) -> bool {
        matches!(self, Self::Before | Self::Both)
    }

    fn after(self) -> bool {
        matches!(self, Self::After | Self::Both)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaybackOptions {
    #[serde(default)]
    pub language_speeds: HashMap<String, f32>,
    #[serde(default = "default_speed")]
    pub default_speed: f32,
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Speak each line's text in the line's own language.
    #[serde(default = "enabled")]
    pub character_mode: bool,
    #[serde(default = "enabled")]
    pub include_narrator: bool,
    #[serde(default = "enabled")]
    pub include_character: bool,
    #[serde(default = "enabled")]
    pub include_text: bool,
    #[serde(default = "enabled")]
    pub include_translation: bool,
    #[serde(default = "enabled")]
    pub include_action: bool,
    #[serde(default)]
    pub include_parenthetical: bool,
    #[serde(default = "default_timing")]
    pub translation_timing: TranslationTiming,
    /// How often engine flags are polled when the engine has no event stream.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            language_speeds: HashMap::new(),
            default_speed: default_speed(),
            default_language: default_language(),
            character_mode: true,
            include_narrator: true,
            include_character: true,
            include_text: true,
            include_translation: true,
            include_action: true,
            include_parenthetical: false,
            translation_timing: default_timing(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl PlaybackOptions {
    /// Options for `document`: its own default language wins when it is a supported one.
    pub fn for_document(&self, document: &Screenplay) -> Self {
        let mut options = self.clone();
        match document.default_screenplay_language.as_deref() {
            Some(lang) if language::is_supported(lang) => {
                options.default_language = lang.to_string();
            }
            Some(lang) => debug!(
                "Unsupported screenplay language {:?}, keeping {}",
                lang, options.default_language
            ),
            None => {}
        }
        options
    }
}

fn default_speed() -> f32 {
    1.0
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn enabled() -> bool {
    true
}

fn default_timing() -> TranslationTiming {
    TranslationTiming::Both
}

fn default_poll_interval() -> u64 {
    100
}

/// Clamps a speed multiplier into [`SPEED_RANGE`]. Garbage becomes 1.0.
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_finite() {
        speed.clamp(*SPEED_RANGE.start(), *SPEED_RANGE.end())
    } else {
        1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Stopped,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("playback already active ({0:?})")]
    AlreadyActive(PlaybackState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Scene,
    Character,
    Parenthetical,
    Translation,
    Text,
    Action,
}

/// Position of the segment being spoken. `line` is `None` for scene narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cue {
    pub scene: usize,
    pub line: Option<usize>,
}

/// Progress observer. Calls are fire-and-forget and must not block.
pub trait PlaybackSink: Send + Sync {
    fn on_line_start(&self, _cue: Option<Cue>) {}
    fn on_word_start(&self, _word: Option<&str>, _kind: Option<ContentKind>, _cue: Option<Cue>) {}
    fn on_language_change(&self, _language: &str) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSegment {
    pub kind: ContentKind,
    pub text: String,
    pub language: String,
    pub cue: Cue,
}

/// Flattens a screenplay into the ordered segments `options` asks for.
pub fn plan(document: &Screenplay, options: &PlaybackOptions) -> Vec<PlannedSegment> {
    let default = options.default_language.as_str();
    let mut segments = Vec::new();
    let mut push = |kind: ContentKind, text: &str, language: &str, cue: Cue| {
        if !text.trim().is_empty() {
            segments.push(PlannedSegment {
                kind,
                text: text.to_string(),
                language: language.to_string(),
                cue,
            });
        }
    };

    for (scene_index, scene) in document.scenes.iter().enumerate() {
        if options.include_narrator {
            let cue = Cue {
                scene: scene_index,
                line: None,
            };
            push(ContentKind::Scene, &scene.description, default, cue);
        }

        for (line_index, line) in scene.dialogue.iter().enumerate() {
            let cue = Cue {
                scene: scene_index,
                line: Some(line_index),
            };
            let translation = line.translation.as_deref().unwrap_or_default();
            let text_language = match line.language.as_deref() {
                Some(lang) if options.character_mode => lang,
                _ => default,
            };

            if options.include_character {
                push(ContentKind::Character, &line.character, default, cue);
            }
            if options.include_parenthetical {
                let parenthetical = line.parenthetical.as_deref().unwrap_or_default();
                push(ContentKind::Parenthetical, parenthetical, default, cue);
            }
            if options.include_translation && options.translation_timing.before() {
                push(ContentKind::Translation, translation, default, cue);
            }
            if options.include_text {
                push(ContentKind::Text, &line.text, text_language, cue);
            }
            if options.include_translation && options.translation_timing.after() {
                push(ContentKind::Translation, translation, default, cue);
            }
            if options.include_action {
                let action = line.action.as_deref().unwrap_or_default();
                push(ContentKind::Action, action, default, cue);
            }
        }
    }
    segments
}

#[derive(Default)]
struct Session {
    id: u64,
    token: Option<CancellationToken>,
    cue: Option<Cue>,
    word: Option<String>,
}

struct Inner {
    engine: Arc<dyn SpeechEngine>,
    segments: SegmentPlayer,
    session: Mutex<Session>,
    speeds: RwLock<HashMap<String, f32>>,
    state: watch::Sender<PlaybackState>,
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn speed_for(&self, language: &str, fallback: f32) -> f32 {
        let speeds = self.speeds.read().unwrap_or_else(PoisonError::into_inner);
        clamp_speed(speeds.get(language).copied().unwrap_or(fallback))
    }

    /// Mirrors the engine's pause flag. Never leaves or enters `Stopped`.
    fn reconcile(&self) {
        let paused = self.engine.is_paused();
        self.state.send_if_modified(|state| match (*state, paused) {
            (PlaybackState::Playing, true) => {
                *state = PlaybackState::Paused;
                true
            }
            (PlaybackState::Paused, false) => {
                *state = PlaybackState::Playing;
                true
            }
            _ => false,
        });
    }

    fn mark(&self, session_id: u64, cue: Option<Cue>, word: Option<&str>) {
        let mut session = self.session();
        if session.id == session_id && session.token.is_some() {
            session.cue = cue;
            session.word = word.map(str::to_string);
        }
    }

    fn finish(&self, session_id: u64) {
        let mut session = self.session();
        if session.id != session_id || session.token.is_none() {
            return;
        }
        session.token = None;
        session.cue = None;
        session.word = None;
        self.state.send_replace(PlaybackState::Stopped);
    }
}

/// Plays screenplays through a [`SpeechEngine`], one session at a time.
#[derive(Clone)]
pub struct NarrationPlayer {
    inner: Arc<Inner>,
}

impl NarrationPlayer {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        let (state, _) = watch::channel(PlaybackState::Stopped);
        Self {
            inner: Arc::new(Inner {
                segments: SegmentPlayer::new(engine.clone()),
                engine,
                session: Mutex::new(Session::default()),
                speeds: RwLock::new(HashMap::new()),
                state,
            }),
        }
    }

    /// Narrates `document` to the end or until [`stop`](Self::stop) is called.
    pub async fn play(
        &self,
        document: Arc<Screenplay>,
        options: PlaybackOptions,
        sink: Arc<dyn PlaybackSink>,
    ) -> Result<PlaybackOutcome, PlaybackError> {
        let (session_id, token) = {
            let mut session = self.inner.session();
            let state = *self.inner.state.borrow();
            if state != PlaybackState::Stopped {
                return Err(PlaybackError::AlreadyActive(state));
            }
            session.id += 1;
            let token = CancellationToken::new();
            session.token = Some(token.clone());
            session.cue = None;
            session.word = None;
            self.inner.state.send_replace(PlaybackState::Playing);
            (session.id, token)
        };
        *self
            .inner
            .speeds
            .write()
            .unwrap_or_else(PoisonError::into_inner) = options.language_speeds.clone();

        let segments = plan(&document, &options);
        info!(
            "Narrating {:?}: {} segments (session {})",
            document.label(),
            segments.len(),
            session_id
        );

        let reconciler_token = token.child_token();
        let reconciler = self.spawn_reconciler(
            reconciler_token.clone(),
            Duration::from_millis(options.poll_interval_ms.max(1)),
        );

        let mut language: Option<&str> = None;
        for segment in &segments {
            if token.is_cancelled() {
                break;
            }
            if language != Some(segment.language.as_str()) {
                sink.on_language_change(&segment.language);
                language = Some(segment.language.as_str());
            }
            self.inner.mark(session_id, Some(segment.cue), None);

            let speed = self
                .inner
                .speed_for(&segment.language, options.default_speed);
            let on_word = self.word_callback(session_id, segment, sink.clone());
            let line_sink = sink.clone();
            let (kind, cue) = (segment.kind, segment.cue);
            let on_start = move || {
                if kind == ContentKind::Text {
                    line_sink.on_line_start(Some(cue));
                }
            };

            self.inner
                .segments
                .play(
                    &segment.text,
                    &segment.language,
                    speed,
                    &token,
                    on_word,
                    on_start,
                )
                .await;
        }

        reconciler_token.cancel();
        if let Err(e) = reconciler.await {
            debug!("State reconciler ended abnormally: {}", e);
        }

        if token.is_cancelled() {
            info!("Narration session {} stopped", session_id);
            return Ok(PlaybackOutcome::Stopped);
        }
        sink.on_line_start(None);
        sink.on_word_start(None, None, None);
        self.inner.finish(session_id);
        info!("Narration session {} completed", session_id);
        Ok(PlaybackOutcome::Completed)
    }

    fn word_callback(
        &self,
        session_id: u64,
        segment: &PlannedSegment,
        sink: Arc<dyn PlaybackSink>,
    ) -> WordCallback {
        let inner = self.inner.clone();
        let (kind, cue) = (segment.kind, segment.cue);
        Arc::new(move |word: Option<&str>| {
            inner.mark(session_id, Some(cue), word);
            sink.on_word_start(word, Some(kind), Some(cue));
        })
    }

    fn spawn_reconciler(&self, token: CancellationToken, poll: Duration) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let events = inner.engine.events();
        tokio::spawn(async move {
            inner.reconcile();
            match events {
                Some(mut events) => loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        event = events.recv() => match event {
                            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => inner.reconcile(),
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                    }
                },
                None => {
                    let mut ticker = tokio::time::interval(poll);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                    loop {
                        tokio::select! {
                            biased;
                            _ = token.cancelled() => break,
                            _ = ticker.tick() => inner.reconcile(),
                        }
                    }
                }
            }
        })
    }

    pub fn pause(&self) {
        if self.state() == PlaybackState::Playing {
            self.inner.engine.pause();
        }
    }

    pub fn resume(&self) {
        if self.state() == PlaybackState::Paused {
            self.inner.engine.resume();
        }
    }

    /// Cancels the session, hard-stops the engine and returns to `Stopped` at once.
    pub fn stop(&self) {
        let token = {
            let mut session = self.inner.session();
            session.cue = None;
            session.word = None;
            session.token.take()
        };
        if let Some(token) = token {
            info!("Stopping narration");
            token.cancel();
        }
        self.inner.engine.stop();
        self.inner.state.send_replace(PlaybackState::Stopped);
    }

    /// Changes the speed of `language`. Applies from the next segment on.
    pub fn set_language_speed(&self, language: &str, speed: f32) {
        let speed = clamp_speed(speed);
        debug!("Speed for {} set to {:.2}", language, speed);
        self.inner
            .speeds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(language.to_string(), speed);
    }

    pub fn state(&self) -> PlaybackState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state.subscribe()
    }

    pub fn position(&self) -> Option<Cue> {
        self.inner.session().cue
    }

    pub fn current_word(&self) -> Option<String> {
        self.inner.session().word.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{DialogueLine, Scene};
    use crate::services::speech::testing::ScriptedEngine;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Line(Option<Cue>),
        Word(Option<String>, Option<ContentKind>),
        Language(String),
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl PlaybackSink for RecordingSink {
        fn on_line_start(&self, cue: Option<Cue>) {
            self.events.lock().unwrap().push(Event::Line(cue));
        }

        fn on_word_start(&self, word: Option<&str>, kind: Option<ContentKind>, _cue: Option<Cue>) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Word(word.map(str::to_string), kind));
        }

        fn on_language_change(&self, language: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Language(language.to_string()));
        }
    }

    fn line(scene: usize, line: usize) -> DialogueLine {
        DialogueLine {
            character: format!("name{}{}", scene, line),
            language: Some("Arabic".to_string()),
            text: format!("text{}{}", scene, line),
            translation: Some(format!("translation{}{}", scene, line)),
            parenthetical: Some(format!("parenthetical{}{}", scene, line)),
            action: Some(format!("action{}{}", scene, line)),
        }
    }

    fn document() -> Screenplay {
        Screenplay {
            scenes: (0..2)
                .map(|s| Scene {
                    description: format!("scene{}", s),
                    dialogue: (0..2).map(|l| line(s, l)).collect(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn all_on() -> PlaybackOptions {
        PlaybackOptions {
            include_parenthetical: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_order_with_everything_enabled() {
        let texts: Vec<String> = plan(&document(), &all_on())
            .into_iter()
            .map(|s| s.text)
            .collect();

        let mut expected = Vec::new();
        for s in 0..2 {
            expected.push(format!("scene{}", s));
            for l in 0..2 {
                for part in [
                    "name",
                    "parenthetical",
                    "translation",
                    "text",
                    "translation",
                    "action",
                ] {
                    expected.push(format!("{}{}{}", part, s, l));
                }
            }
        }
        assert_eq!(texts, expected);
    }

    #[test]
    fn test_plan_languages_and_gating() {
        let mut document = document();
        document.scenes[0].dialogue[0].action = Some("   ".to_string());

        let options = PlaybackOptions {
            include_narrator: false,
            include_character: false,
            translation_timing: TranslationTiming::After,
            ..Default::default()
        };
        let segments = plan(&document, &options);
        assert_eq!(segments[0].text, "text00");
        assert_eq!(segments[0].language, "Arabic");
        assert_eq!(segments[1].text, "translation00");
        assert_eq!(segments[1].language, "Hebrew");
        // Blank action skipped, parenthetical off by default.
        assert_eq!(segments[2].text, "text01");

        let narrated = PlaybackOptions {
            character_mode: false,
            ..options
        };
        assert!(plan(&document, &narrated)
            .iter()
            .all(|s| s.language == "Hebrew"));
    }

    #[test]
    fn test_document_language_overrides_default() {
        let options = PlaybackOptions::default();
        let mut spanish = document();
        spanish.default_screenplay_language = Some("Spanish".to_string());

        let overridden = options.for_document(&spanish);
        assert_eq!(overridden.default_language, "Spanish");
        let narration = plan(&spanish, &overridden);
        assert_eq!(narration[0].kind, ContentKind::Scene);
        assert_eq!(narration[0].language, "Spanish");

        spanish.default_screenplay_language = Some("Klingon".to_string());
        assert_eq!(options.for_document(&spanish).default_language, DEFAULT_LANGUAGE);
        spanish.default_screenplay_language = None;
        assert_eq!(options.for_document(&spanish).default_language, DEFAULT_LANGUAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_speaks_every_segment_in_order() {
        let engine = Arc::new(ScriptedEngine::new(Duration::from_millis(100)));
        let player = NarrationPlayer::new(engine.clone());
        let sink = Arc::new(RecordingSink::default());
        let document = Arc::new(document());

        let outcome = player
            .play(document.clone(), all_on(), sink.clone())
            .await
            .unwrap();

        assert_eq!(outcome, PlaybackOutcome::Completed);
        let expected: Vec<String> = plan(&document, &all_on())
            .into_iter()
            .map(|s| s.text)
            .collect();
        assert_eq!(engine.texts(), expected);
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.position(), None);

        let events = sink.events();
        assert_eq!(events[0], Event::Language("Hebrew".to_string()));
        assert_eq!(
            events[events.len() - 2..],
            [Event::Line(None), Event::Word(None, None)]
        );
        let line_starts: Vec<&Event> = events
            .iter()
            .filter(|e| matches!(e, Event::Line(Some(_))))
            .collect();
        assert_eq!(line_starts.len(), 4);
        assert_eq!(
            *line_starts[0],
            Event::Line(Some(Cue {
                scene: 0,
                line: Some(0)
            }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_words_arrive_in_order_before_segment_end() {
        let engine = Arc::new(ScriptedEngine::new(Duration::from_secs(3)));
        let player = NarrationPlayer::new(engine);
        let sink = Arc::new(RecordingSink::default());
        let document = Screenplay {
            scenes: vec![Scene {
                description: "a quiet street".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };

        player
            .play(Arc::new(document), PlaybackOptions::default(), sink.clone())
            .await
            .unwrap();

        let words: Vec<Event> = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::Word(_, Some(_))))
            .collect();
        let scene = Some(ContentKind::Scene);
        assert_eq!(
            words,
            vec![
                Event::Word(Some("a".to_string()), scene),
                Event::Word(Some("quiet".to_string()), scene),
                Event::Word(Some("street".to_string()), scene),
                Event::Word(None, scene),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_play_is_rejected() {
        let engine = Arc::new(ScriptedEngine::new(Duration::from_secs(1)));
        let player = NarrationPlayer::new(engine);
        let sink: Arc<dyn PlaybackSink> = Arc::new(RecordingSink::default());
        let document = Arc::new(document());

        let first = tokio::spawn({
            let player = player.clone();
            let document = document.clone();
            let sink = sink.clone();
            async move { player.play(document, all_on(), sink).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = player
            .play(document, all_on(), sink)
            .await
            .unwrap_err();
        assert_eq!(err, PlaybackError::AlreadyActive(PlaybackState::Playing));

        player.stop();
        assert_eq!(first.await.unwrap(), Ok(PlaybackOutcome::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_replay_starts_from_the_top() {
        let engine = Arc::new(ScriptedEngine::new(Duration::from_secs(1)));
        let player = NarrationPlayer::new(engine.clone());
        let sink: Arc<dyn PlaybackSink> = Arc::new(RecordingSink::default());
        let document = Arc::new(document());

        let first = tokio::spawn({
            let player = player.clone();
            let document = document.clone();
            let sink = sink.clone();
            async move { player.play(document, all_on(), sink).await }
        });
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(engine.texts().len(), 4);
        assert!(player.position().is_some());

        player.stop();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.position(), None);
        assert_eq!(first.await.unwrap(), Ok(PlaybackOutcome::Stopped));
        assert_eq!(engine.texts().len(), 4);

        let second = tokio::spawn({
            let player = player.clone();
            async move { player.play(document, all_on(), sink).await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(engine.texts()[4], "scene0");
        assert_eq!(
            player.position(),
            Some(Cue {
                scene: 0,
                line: None
            })
        );

        player.stop();
        assert_eq!(second.await.unwrap(), Ok(PlaybackOutcome::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_change_applies_to_next_segment() {
        let engine = Arc::new(ScriptedEngine::new(Duration::from_secs(1)));
        let player = NarrationPlayer::new(engine.clone());
        let sink: Arc<dyn PlaybackSink> = Arc::new(RecordingSink::default());
        let document = Screenplay {
            scenes: vec![Scene {
                description: "Night".to_string(),
                dialogue: vec![line(0, 0)],
                ..Default::default()
            }],
            ..Default::default()
        };
        let options = PlaybackOptions {
            include_character: false,
            include_translation: false,
            include_action: false,
            language_speeds: HashMap::from([("Hebrew".to_string(), 1.25)]),
            ..Default::default()
        };

        let handle = tokio::spawn({
            let player = player.clone();
            async move { player.play(Arc::new(document), options, sink).await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        player.set_language_speed("Arabic", 1.5);
        player.set_language_speed("Hebrew", 9.0);
        handle.await.unwrap().unwrap();

        let spoken = engine.spoken();
        assert_eq!(spoken.len(), 2);
        assert_eq!(spoken[0].text, "Night");
        assert_eq!(spoken[0].rate, 1.25);
        assert_eq!(spoken[1].text, "text00");
        assert_eq!(spoken[1].locale, "ar-SA");
        assert_eq!(spoken[1].rate, 1.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthesis_error_does_not_halt_narration() {
        let engine = Arc::new(ScriptedEngine::new(Duration::from_millis(50)).failing("text00"));
        let player = NarrationPlayer::new(engine.clone());
        let sink = Arc::new(RecordingSink::default());

        let outcome = player
            .play(Arc::new(document()), all_on(), sink.clone())
            .await
            .unwrap();

        assert_eq!(outcome, PlaybackOutcome::Completed);
        assert_eq!(engine.texts().len(), 26);
        // The failed line never reported its start.
        assert!(!sink.events().contains(&Event::Line(Some(Cue {
            scene: 0,
            line: Some(0)
        }))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_state_follows_engine_by_polling() {
        let engine = Arc::new(ScriptedEngine::new(Duration::from_secs(10)));
        let player = NarrationPlayer::new(engine.clone());
        let sink: Arc<dyn PlaybackSink> = Arc::new(RecordingSink::default());

        let handle = tokio::spawn({
            let player = player.clone();
            async move { player.play(Arc::new(document()), all_on(), sink).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(player.state(), PlaybackState::Playing);

        player.pause();
        assert!(engine.is_paused());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(player.state(), PlaybackState::Paused);

        player.resume();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(player.state(), PlaybackState::Playing);

        player.stop();
        assert_eq!(handle.await.unwrap(), Ok(PlaybackOutcome::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_state_follows_engine_events() {
        let engine = Arc::new(ScriptedEngine::new(Duration::from_secs(10)).with_events());
        let player = NarrationPlayer::new(engine.clone());
        let sink: Arc<dyn PlaybackSink> = Arc::new(RecordingSink::default());
        let mut states = player.subscribe_state();

        let handle = tokio::spawn({
            let player = player.clone();
            async move { player.play(Arc::new(document()), all_on(), sink).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        player.pause();
        states
            .wait_for(|s| *s == PlaybackState::Paused)
            .await
            .unwrap();

        engine.resume();
        states
            .wait_for(|s| *s == PlaybackState::Playing)
            .await
            .unwrap();

        player.stop();
        assert_eq!(handle.await.unwrap(), Ok(PlaybackOutcome::Stopped));
    }
}

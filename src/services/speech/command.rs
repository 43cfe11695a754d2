//! Speech engine backed by an external synthesizer process (espeak-ng by default).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use tokio::process::Command;
use tokio::sync::{broadcast, oneshot, Notify};

use super::{EngineEvent, SpeechEngine, SpeechRequest, Voice};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_wpm")]
    pub words_per_minute: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            words_per_minute: default_wpm(),
        }
    }
}

fn default_program() -> String {
    "espeak-ng".to_string()
}

fn default_wpm() -> u32 {
    175
}

const MIN_WPM: f32 = 80.0;
const MAX_WPM: f32 = 450.0;

#[derive(Default)]
struct ProcessState {
    pid: Option<u32>,
    paused: bool,
}

pub struct CommandSpeechEngine {
    config: SpeechConfig,
    voices: Vec<Voice>,
    state: Mutex<ProcessState>,
    halt: Notify,
    events: broadcast::Sender<EngineEvent>,
}

impl CommandSpeechEngine {
    pub fn new(config: SpeechConfig, voices: Vec<Voice>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            config,
            voices,
            state: Mutex::new(ProcessState::default()),
            halt: Notify::new(),
            events,
        }
    }

    /// Builds an engine with the voice list reported by `<program> --voices`.
    pub async fn detect(config: SpeechConfig) -> Result<Self> {
        let output = Command::new(&config.program)
            .arg("--voices")
            .output()
            .await
            .with_context(|| format!("Failed to run {} --voices", config.program))?;
        if !output.status.success() {
            bail!("{} --voices exited with {}", config.program, output.status);
        }
        let voices = parse_voices(&String::from_utf8_lossy(&output.stdout));
        info!("{} reports {} voices", config.program, voices.len());
        Ok(Self::new(config, voices))
    }

    fn words_per_minute(&self, rate: f32) -> u32 {
        let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        (self.config.words_per_minute as f32 * rate).clamp(MIN_WPM, MAX_WPM) as u32
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProcessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parses the voice table printed by `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  ar              --/M      Arabic             sem/ar
/// ```
pub fn parse_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            let gender = fields[2]
                .rsplit('/')
                .next()
                .filter(|g| !g.is_empty() && *g != "-")
                .map(str::to_string);
            Some(Voice {
                name: fields[3].to_string(),
                locale: fields[1].to_string(),
                gender,
            })
        })
        .collect()
}

/// Forgets the running pid when `speak` ends, including when its task is aborted.
struct PidGuard<'a>(&'a CommandSpeechEngine);

impl Drop for PidGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().pid = None;
    }
}

#[cfg(unix)]
fn signal_process(pid: u32, suspend: bool) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let signal = if suspend {
        Signal::SIGSTOP
    } else {
        Signal::SIGCONT
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), signal) {
        warn!("Failed to send {:?} to synthesizer {}: {}", signal, pid, e);
    }
}

#[cfg(not(unix))]
fn signal_process(pid: u32, _suspend: bool) {
    warn!("Pausing synthesizer {} is not supported on this platform", pid);
}

#[async_trait]
impl SpeechEngine for CommandSpeechEngine {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    async fn speak(&self, request: SpeechRequest, started: oneshot::Sender<()>) -> Result<()> {
        let voice = request
            .voice
            .as_ref()
            .map(|v| v.locale.clone())
            .unwrap_or_else(|| request.locale.to_lowercase());
        let wpm = self.words_per_minute(request.rate);
        debug!("{} -v {} -s {}: {}", self.config.program, voice, wpm, request.text);

        // Registered before spawning so a stop() racing the spawn is not lost.
        let halt = self.halt.notified();
        tokio::pin!(halt);
        halt.as_mut().enable();

        let mut child = Command::new(&self.config.program)
            .arg("-v")
            .arg(&voice)
            .arg("-s")
            .arg(wpm.to_string())
            .arg(&request.text)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.config.program))?;

        let guard = PidGuard(self);
        {
            let mut state = self.lock();
            state.pid = child.id();
            if let (true, Some(pid)) = (state.paused, state.pid) {
                signal_process(pid, true);
            }
        }
        let _ = started.send(());

        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = &mut halt => None,
        };
        drop(guard);

        match finished {
            Some(status) => {
                let status = status.context("Failed to wait for synthesizer")?;
                if !status.success() {
                    bail!("{} exited with {}", self.config.program, status);
                }
            }
            None => {
                if let Err(e) = child.kill().await {
                    debug!("Synthesizer already gone: {}", e);
                }
            }
        }
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.lock();
        if state.paused {
            return;
        }
        state.paused = true;
        if let Some(pid) = state.pid {
            signal_process(pid, true);
        }
        let _ = self.events.send(EngineEvent::Paused);
    }

    fn resume(&self) {
        let mut state = self.lock();
        if !state.paused {
            return;
        }
        state.paused = false;
        if let Some(pid) = state.pid {
            signal_process(pid, false);
        }
        let _ = self.events.send(EngineEvent::Resumed);
    }

    fn stop(&self) {
        let was_paused = {
            let mut state = self.lock();
            if let (true, Some(pid)) = (state.paused, state.pid) {
                signal_process(pid, false);
            }
            std::mem::take(&mut state.paused)
        };
        self.halt.notify_waiters();
        if was_paused {
            let _ = self.events.send(EngineEvent::Resumed);
        }
    }

    fn is_paused(&self) -> bool {
        self.lock().paused
    }

    fn is_speaking(&self) -> bool {
        self.lock().pid.is_some()
    }

    fn events(&self) -> Option<broadcast::Receiver<EngineEvent>> {
        Some(self.events.subscribe())
    }
}

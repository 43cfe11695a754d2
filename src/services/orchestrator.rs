use chrono::{DateTime, Utc};
use futures_util::stream::{FuturesUnordered, StreamExt};
use log::{error, info, warn};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::cancel::until_cancelled;
use crate::core::state::{GenerationRequest, Screenplay};
use crate::services::llm::ScreenplayGenerator;
use crate::services::requests::RequestTracker;

#[derive(Debug, Clone, PartialEq)]
pub struct TargetResult {
    pub success: bool,
    pub data: Option<Screenplay>,
    pub error: Option<String>,
    pub cancelled: bool,
    pub completed_at: DateTime<Utc>,
}

impl TargetResult {
    fn succeeded(data: Screenplay) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            cancelled: false,
            completed_at: Utc::now(),
        }
    }

    fn failed(error: String, cancelled: bool) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            cancelled,
            completed_at: Utc::now(),
        }
    }
}

pub type AggregateResults = BTreeMap<String, TargetResult>;

pub type CompletionCallback<'a> = &'a (dyn Fn(&str, &Screenplay) + Send + Sync);

/// Fans one generation request out to several targets at once.
pub struct GenerationOrchestrator {
    generator: Arc<dyn ScreenplayGenerator>,
    tracker: Arc<RequestTracker>,
    results: Mutex<AggregateResults>,
    primary: Mutex<Option<(String, Screenplay)>>,
}

enum Settled {
    Done(anyhow::Result<Screenplay>),
    Cancelled,
}

impl GenerationOrchestrator {
    pub fn new(generator: Arc<dyn ScreenplayGenerator>) -> Self {
        Self {
            generator,
            tracker: Arc::new(RequestTracker::new()),
            results: Mutex::new(BTreeMap::new()),
            primary: Mutex::new(None),
        }
    }

    pub fn tracker(&self) -> Arc<RequestTracker> {
        self.tracker.clone()
    }

    fn results_mut(&self) -> MutexGuard<'_, AggregateResults> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn primary_mut(&self) -> MutexGuard<'_, Option<(String, Screenplay)>> {
        self.primary.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `request` against every target concurrently and resolves once all of them have
    /// settled. Individual failures and cancellations end up in the returned map.
    ///
    /// `on_each_complete` runs for each successful target as soon as it settles.
    pub async fn generate_for_targets(
        &self,
        request: &GenerationRequest,
        targets: &[String],
        on_each_complete: Option<CompletionCallback<'_>>,
    ) -> AggregateResults {
        self.results_mut().clear();
        *self.primary_mut() = None;

        let mut seen = HashSet::new();
        let mut in_flight = FuturesUnordered::new();
        for target in targets {
            if !seen.insert(target.as_str()) {
                continue;
            }
            let Some(token) = self.tracker.register(target) else {
                warn!("{} already has a request in flight, skipping", target);
                self.results_mut().insert(
                    target.clone(),
                    TargetResult::failed("request already in flight".to_string(), false),
                );
                continue;
            };
            let generator = self.generator.clone();
            in_flight.push(async move {
                let call = generator.generate(target, request, token.clone());
                let settled = match until_cancelled(&token, call).await {
                    Some(_) if token.is_cancelled() => Settled::Cancelled,
                    Some(result) => Settled::Done(result),
                    None => Settled::Cancelled,
                };
                (target, settled)
            });
        }
        info!("Generating with {} targets", in_flight.len());

        let mut order = Vec::new();
        while let Some((target, settled)) = in_flight.next().await {
            let result = match settled {
                Settled::Done(Ok(screenplay)) => {
                    info!("{} finished: {:?}", target, screenplay.label());
                    self.tracker.complete(target, true, None);
                    TargetResult::succeeded(screenplay)
                }
                Settled::Done(Err(e)) => {
                    error!("{} failed: {:#}", target, e);
                    let message = format!("{:#}", e);
                    self.tracker.complete(target, false, Some(message.clone()));
                    TargetResult::failed(message, false)
                }
                Settled::Cancelled => {
                    info!("{} was cancelled", target);
                    TargetResult::failed("request cancelled".to_string(), true)
                }
            };

            let data = result.data.clone();
            order.push(target);
            self.results_mut().insert(target.clone(), result);
            // The map already holds this target when the callback looks at it.
            if let (Some(callback), Some(data)) = (on_each_complete, data.as_ref()) {
                callback(target.as_str(), data);
            }
        }

        let results = self.results_mut().clone();
        let primary = order.into_iter().find_map(|target| {
            results
                .get(target)
                .and_then(|r| r.data.clone())
                .map(|data| (target.clone(), data))
        });
        match &primary {
            Some((target, _)) => info!("Primary result from {}", target),
            None => warn!("No target produced a screenplay"),
        }
        *self.primary_mut() = primary;
        results
    }

    /// Partial view of the current fan-out.
    pub fn results(&self) -> AggregateResults {
        self.results_mut().clone()
    }

    pub fn primary(&self) -> Option<(String, Screenplay)> {
        self.primary_mut().clone()
    }

    pub fn cancel(&self, target: &str) {
        self.tracker.cancel(target);
    }

    pub fn cancel_all(&self) {
        self.tracker.cancel_all();
    }
}

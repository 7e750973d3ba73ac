//! Repeating readiness checks for documents the backend renders asynchronously.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::PollingConfig;
use crate::error::ApiError;
use crate::modules::api::ApiClient;
use crate::modules::models::PdfStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Pending { attempts: u32 },
    Ready { url: String },
    Failed { reason: String },
}

impl Readiness {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Readiness::Pending { .. })
    }
}

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn check(&self) -> Result<PdfStatus, ApiError>;
}

/// PDF status of one quote.
pub struct QuotePdfSource {
    api: ApiClient,
    quote_id: u64,
}

impl QuotePdfSource {
    pub fn new(api: ApiClient, quote_id: u64) -> Self {
        Self { api, quote_id }
    }
}

#[async_trait]
impl StatusSource for QuotePdfSource {
    async fn check(&self) -> Result<PdfStatus, ApiError> {
        self.api.quote_pdf_status(self.quote_id).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
}

impl From<&PollingConfig> for PollSettings {
    fn from(cfg: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.interval_secs.max(1)),
            max_attempts: (cfg.max_attempts > 0).then_some(cfg.max_attempts),
        }
    }
}

/// Owner side of a running poll. Dropping it stops the task.
pub struct PollHandle {
    state: watch::Receiver<Readiness>,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn state(&self) -> Readiness {
        self.state.borrow().clone()
    }

    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    /// Resolves with the terminal state, or the last state seen if the task was cancelled.
    pub async fn wait(mut self) -> Readiness {
        while !self.state.borrow().is_terminal() {
            if self.state.changed().await.is_err() {
                break;
            }
        }
        self.state()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
        self.task.abort();
    }
}

pub fn spawn<S: StatusSource + 'static>(source: S, settings: PollSettings) -> PollHandle {
    let (state_tx, state_rx) = watch::channel(Readiness::Pending { attempts: 0 });
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let task = tokio::spawn(drive(source, settings, state_tx, cancel_rx));
    PollHandle {
        state: state_rx,
        cancel: Some(cancel_tx),
        task,
    }
}

async fn drive<S: StatusSource>(
    source: S,
    settings: PollSettings,
    state: watch::Sender<Readiness>,
    mut cancel: oneshot::Receiver<()>,
) {
    let mut ticker = time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempts = 0u32;

    loop {
        tokio::select! {
            _ = &mut cancel => {
                debug!(attempts, "readiness poll cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        attempts += 1;
        let next = match source.check().await {
            Ok(PdfStatus { ready: true, pdf_url: Some(url) }) => Readiness::Ready { url },
            Ok(PdfStatus { ready: true, pdf_url: None }) => Readiness::Failed {
                reason: "document reported ready without a URL".to_string(),
            },
            Ok(_) => Readiness::Pending { attempts },
            Err(err) if err.is_auth_failure() => Readiness::Failed { reason: err.to_string() },
            Err(err) => {
                warn!(attempts, error = %err, "readiness check failed");
                Readiness::Pending { attempts }
            }
        };

        let next = match (next, settings.max_attempts) {
            (Readiness::Pending { .. }, Some(max)) if attempts >= max => Readiness::Failed {
                reason: format!("not ready after {attempts} checks"),
            },
            (other, _) => other,
        };

        let done = next.is_terminal();
        if done {
            info!(attempts, state = ?next, "readiness poll finished");
        }
        state.send_replace(next);
        if done {
            return;
        }
    }
}

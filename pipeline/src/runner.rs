//! Foreground handle that starts, observes and cancels analysis runs.

use std::sync::Arc;

use charsim_embeddings::{EmbeddingProvider, HttpEmbeddingClient};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::progress::{Outbox, ProgressReporter};
use crate::protocol::{Envelope, RunRequest, WorkerMessage};
use crate::worker::{Worker, prepare_jobs};

/// Lifecycle of the most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Whether the run has ended.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Where a run gets its embedding provider from.
enum ProviderSource {
    /// Build an HTTP client from each request's connection settings.
    Http,
    /// Use the same provider for every run.
    Fixed(Arc<dyn EmbeddingProvider>),
}

struct ActiveRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl ActiveRun {
    fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// Runs analyses in the background and relays their messages.
///
/// At most one run is active. Starting another one cancels it; messages of
/// the superseded run are never returned from [`TaskRunner::next_message`].
pub struct TaskRunner {
    provider: ProviderSource,
    generation: u64,
    state: TaskState,
    active: Option<ActiveRun>,
}

impl TaskRunner {
    /// Create a runner that talks to the endpoint named in each request.
    pub fn new() -> Self {
        Self {
            provider: ProviderSource::Http,
            generation: 0,
            state: TaskState::Idle,
            active: None,
        }
    }

    /// Create a runner that always uses `provider`.
    pub fn with_provider(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider: ProviderSource::Fixed(provider),
            generation: 0,
            state: TaskState::Idle,
            active: None,
        }
    }

    /// State of the most recent run.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Generation number of the most recent run; 0 before the first one.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a run, cancelling the one in flight.
    ///
    /// Configuration problems and requests without embeddable records are
    /// reported here and no worker is started.
    pub fn start(&mut self, request: RunRequest) -> Result<u64> {
        request.validate()?;
        let jobs = prepare_jobs(&request.records, &request.options.fields)?;

        let provider: Arc<dyn EmbeddingProvider> = match &self.provider {
            ProviderSource::Http => Arc::new(HttpEmbeddingClient::new(&request.config)?),
            ProviderSource::Fixed(provider) => Arc::clone(provider),
        };

        if self.stop_active() {
            debug!("Superseding run {}", self.generation);
        }

        self.generation += 1;
        let generation = self.generation;

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let reporter = ProgressReporter::new(Outbox::new(generation, tx, cancel.clone()));

        info!(
            "Starting analysis run {generation} for {} of {} records",
            jobs.len(),
            request.records.len()
        );

        let worker = Worker::new(
            provider,
            jobs,
            request.config.model.clone(),
            request.threshold,
            request.options,
            reporter,
        );
        let handle = tokio::spawn(worker.run());

        self.active = Some(ActiveRun { cancel, handle, rx });
        self.state = TaskState::Running;

        Ok(generation)
    }

    /// Cancel the run in flight. Returns `false` if nothing was running.
    pub fn cancel(&mut self) -> bool {
        if !self.stop_active() {
            return false;
        }
        info!("Cancelled analysis run {}", self.generation);
        self.state = TaskState::Cancelled;
        true
    }

    /// Wait for the next message of the current run.
    ///
    /// Returns `None` once the run has finished or been cancelled. The
    /// terminal `Result` or `Error` message is always the last one returned.
    pub async fn next_message(&mut self) -> Option<WorkerMessage> {
        loop {
            let active = self.active.as_mut()?;

            let Some(envelope) = active.rx.recv().await else {
                // Worker dropped its sender without a terminal message.
                self.active = None;
                self.state = TaskState::Failed;
                let err = PipelineError::WorkerLost;
                return Some(WorkerMessage::error(err.kind(), err.to_string()));
            };

            if envelope.generation != self.generation {
                debug!("Ignoring message from stale run {}", envelope.generation);
                continue;
            }

            match &envelope.message {
                WorkerMessage::Progress { .. } => {}
                WorkerMessage::Result(_) => self.finish(TaskState::Completed),
                WorkerMessage::Error { .. } => self.finish(TaskState::Failed),
            }

            return Some(envelope.message);
        }
    }

    /// Collect every remaining message of the current run.
    pub async fn drain(&mut self) -> Vec<WorkerMessage> {
        let mut messages = Vec::new();
        while let Some(message) = self.next_message().await {
            messages.push(message);
        }
        messages
    }

    fn finish(&mut self, state: TaskState) {
        self.active = None;
        self.state = state;
    }

    fn stop_active(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                active.stop();
                true
            }
            None => false,
        }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.stop_active();
    }
}

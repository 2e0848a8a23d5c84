//! Progress reporting from the worker to the foreground.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::protocol::{Envelope, WorkerMessage};

/// Share of the progress bar spent fetching embeddings.
pub const FETCH_RANGE: (f32, f32) = (0.0, 50.0);

/// Share of the progress bar spent comparing pairs.
pub const COMPARE_RANGE: (f32, f32) = (50.0, 95.0);

/// Share of the progress bar spent clustering.
pub const CLUSTER_RANGE: (f32, f32) = (95.0, 100.0);

/// Position `done / total` of the way through `range`.
pub fn scale(range: (f32, f32), done: usize, total: usize) -> f32 {
    if total == 0 {
        return range.1;
    }
    let fraction = (done as f32 / total as f32).clamp(0.0, 1.0);
    range.0 + (range.1 - range.0) * fraction
}

/// Sending half of a run's message channel.
///
/// Nothing is delivered once the run's cancellation token fires.
#[derive(Debug, Clone)]
pub(crate) struct Outbox {
    generation: u64,
    tx: mpsc::UnboundedSender<Envelope>,
    cancel: CancellationToken,
}

impl Outbox {
    pub(crate) fn new(
        generation: u64,
        tx: mpsc::UnboundedSender<Envelope>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            generation,
            tx,
            cancel,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Deliver a message. Returns `false` if nobody is listening any more.
    pub(crate) fn send(&self, message: WorkerMessage) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let envelope = Envelope {
            generation: self.generation,
            message,
        };
        self.tx.send(envelope).is_ok()
    }
}

/// Emits non-decreasing progress updates for one run.
///
/// A clone continues from the percentage reached so far.
#[derive(Debug, Clone)]
pub(crate) struct ProgressReporter {
    outbox: Outbox,
    last_percent: f32,
}

impl ProgressReporter {
    pub(crate) fn new(outbox: Outbox) -> Self {
        Self {
            outbox,
            last_percent: 0.0,
        }
    }

    pub(crate) fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Report progress, clamped to `[last reported, 100]`.
    ///
    /// Returns `false` once the run has been cancelled or abandoned.
    pub(crate) fn report(&mut self, percent: f32, message: impl Into<String>) -> bool {
        let percent = if percent.is_nan() {
            self.last_percent
        } else {
            percent.clamp(self.last_percent, 100.0)
        };
        self.last_percent = percent;

        let message = message.into();
        debug!("Progress {percent:.1}%: {message}");
        self.outbox.send(WorkerMessage::progress(percent, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reporter() -> (
        ProgressReporter,
        mpsc::UnboundedReceiver<Envelope>,
        CancellationToken,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let outbox = Outbox::new(7, tx, cancel.clone());
        (ProgressReporter::new(outbox), rx, cancel)
    }

    fn percent(envelope: &Envelope) -> f32 {
        match &envelope.message {
            WorkerMessage::Progress { percent, .. } => *percent,
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_scale() {
        assert_eq!(scale(FETCH_RANGE, 0, 4), 0.0);
        assert_eq!(scale(FETCH_RANGE, 2, 4), 25.0);
        assert_eq!(scale(COMPARE_RANGE, 10, 10), 95.0);
        assert_eq!(scale(COMPARE_RANGE, 0, 0), 95.0);
    }

    #[test]
    fn test_progress_never_decreases() {
        let (mut reporter, mut rx, _cancel) = reporter();

        assert!(reporter.report(10.0, "a"));
        assert!(reporter.report(5.0, "b"));
        assert!(reporter.report(150.0, "c"));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.generation, 7);
        assert_eq!(percent(&first), 10.0);
        assert_eq!(percent(&rx.try_recv().unwrap()), 10.0);
        assert_eq!(percent(&rx.try_recv().unwrap()), 100.0);
    }

    #[test]
    fn test_nothing_sent_after_cancel() {
        let (mut reporter, mut rx, cancel) = reporter();

        cancel.cancel();
        assert!(!reporter.report(10.0, "late"));
        assert!(reporter.outbox().is_cancelled());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_receiver_stops_reporting() {
        let (mut reporter, rx, _cancel) = reporter();
        drop(rx);
        assert!(!reporter.report(10.0, "nobody listening"));
    }
}

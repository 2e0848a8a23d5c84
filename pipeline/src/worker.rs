//! The background half of a run: fetch, compare, cluster.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use charsim_analysis::{
    ClusteringEngine, EmbeddingSet, Record, compute_centroid, compute_pairwise_matrix,
    compute_uniqueness, rank_uniqueness,
};
use charsim_embeddings::{EmbeddingError, EmbeddingProvider, EmbeddingRequest};
use tracing::{debug, info, warn};

use crate::config::{FetchFailurePolicy, RunOptions};
use crate::error::{PipelineError, Result};
use crate::progress::{CLUSTER_RANGE, COMPARE_RANGE, FETCH_RANGE, ProgressReporter, scale};
use crate::protocol::{RunOutcome, WorkerMessage};

/// One record that has text to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EmbedJob {
    pub id: String,
    pub name: String,
    pub text: String,
}

/// Compose the embedded text of every record, dropping records without any.
pub(crate) fn prepare_jobs(records: &[Record], fields: &[String]) -> Result<Vec<EmbedJob>> {
    if records.is_empty() {
        return Err(EmbeddingError::EmptyInput("no records to analyse".to_string()).into());
    }

    let mut seen = HashSet::with_capacity(records.len());
    if let Some(duplicate) = records.iter().find(|r| !seen.insert(r.id.as_str())) {
        return Err(PipelineError::Config(format!(
            "record id {} appears more than once",
            duplicate.id
        )));
    }

    let jobs: Vec<EmbedJob> = records
        .iter()
        .filter_map(|record| match record.combined_text(fields) {
            Some(text) => Some(EmbedJob {
                id: record.id.clone(),
                name: record.name.clone(),
                text,
            }),
            None => {
                debug!("Skipping {} as it has no text to embed", record.name);
                None
            }
        })
        .collect();

    if jobs.is_empty() {
        return Err(EmbeddingError::EmptyInput(format!(
            "none of the {} records has text to embed",
            records.len()
        ))
        .into());
    }

    Ok(jobs)
}

pub(crate) struct Worker {
    provider: Arc<dyn EmbeddingProvider>,
    jobs: Vec<EmbedJob>,
    model: Option<String>,
    threshold: f32,
    options: RunOptions,
    reporter: ProgressReporter,
}

impl Worker {
    pub(crate) fn new(
        provider: Arc<dyn EmbeddingProvider>,
        jobs: Vec<EmbedJob>,
        model: Option<String>,
        threshold: f32,
        options: RunOptions,
        reporter: ProgressReporter,
    ) -> Self {
        Self {
            provider,
            jobs,
            model,
            threshold,
            options,
            reporter,
        }
    }

    /// Run to completion, sending exactly one terminal message unless cancelled.
    pub(crate) async fn run(mut self) {
        let outcome = self.execute().await;
        let outbox = self.reporter.outbox();

        match outcome {
            Ok(Some(outcome)) => {
                info!(
                    "Analysis finished: {} records, {} clusters",
                    outcome.uniqueness.len(),
                    outcome.clusters.len()
                );
                outbox.send(WorkerMessage::Result(outcome));
            }
            Ok(None) => debug!("Analysis cancelled"),
            Err(e) if outbox.is_cancelled() => debug!("Discarding error from cancelled run: {e}"),
            Err(e) => {
                warn!("Analysis failed: {e}");
                outbox.send(WorkerMessage::error(e.kind(), e.to_string()));
            }
        }
    }

    /// `Ok(None)` means the run was cancelled.
    async fn execute(&mut self) -> Result<Option<RunOutcome>> {
        let Some(set) = self.fetch_embeddings().await? else {
            return Ok(None);
        };

        if set.is_empty() {
            let err = EmbeddingError::EmptyInput("no embeddings could be fetched".to_string());
            return Err(err.into());
        }

        // CPU-bound from here on: runs on the blocking pool and checks for
        // cancellation at every progress tick.
        let threshold = self.threshold;
        let options = self.options.clone();
        let mut reporter = self.reporter.clone();
        tokio::task::spawn_blocking(move || analyse(&set, threshold, &options, &mut reporter))
            .await
            .map_err(|e| {
                warn!("Comparison task ended abnormally: {e}");
                PipelineError::WorkerLost
            })?
    }

    /// Fetch embeddings one record at a time. `Ok(None)` means cancelled.
    async fn fetch_embeddings(&mut self) -> Result<Option<EmbeddingSet>> {
        let total = self.jobs.len();
        let mut set = EmbeddingSet::new();

        info!(
            "Fetching {total} embeddings via {} provider",
            self.provider.name()
        );

        for (i, job) in self.jobs.iter().enumerate() {
            let message = format!("Fetching embedding for {} ({}/{total})", job.name, i + 1);
            if !self.reporter.report(scale(FETCH_RANGE, i, total), message) {
                return Ok(None);
            }

            let mut request = EmbeddingRequest::new(job.text.clone());
            if let Some(ref model) = self.model {
                request = request.with_model(model.clone());
            }

            let cancel = self.reporter.outbox().cancel_token().clone();
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                fetched = self.provider.embed(request) => fetched,
            };

            let response = match fetched {
                Ok(response) => response,
                Err(e) if self.options.fetch_failure == FetchFailurePolicy::Skip => {
                    warn!("Skipping {}: failed to fetch embedding: {e}", job.name);
                    continue;
                }
                Err(e) => {
                    return Err(PipelineError::Embedding(annotate(e, &job.name)));
                }
            };

            set.insert(job.id.clone(), response.embedding)?;
        }

        Ok(Some(set))
    }
}

/// Score, compare and cluster fetched embeddings. `Ok(None)` means cancelled.
fn analyse(
    set: &EmbeddingSet,
    threshold: f32,
    options: &RunOptions,
    reporter: &mut ProgressReporter,
) -> Result<Option<RunOutcome>> {
    let centroid = compute_centroid(set)?;
    let mut uniqueness = compute_uniqueness(set, &centroid)?;
    rank_uniqueness(&mut uniqueness, options.uniqueness_order);

    let matrix = compute_pairwise_matrix(set, options.progress_interval, |done, total| {
        let percent = scale(COMPARE_RANGE, done, total);
        if reporter.report(percent, format!("Comparing pairs ({done}/{total})")) {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    })?;
    let Some(matrix) = matrix else {
        return Ok(None);
    };

    if !reporter.report(CLUSTER_RANGE.0, format!("Clustering {} records", set.len())) {
        return Ok(None);
    }

    let clusters = ClusteringEngine::new(threshold)?.cluster(set, &matrix, &centroid)?;
    let pairs = matrix.top_pairs(set, options.max_reported_pairs);

    if !reporter.report(CLUSTER_RANGE.1, "Analysis complete") {
        return Ok(None);
    }

    Ok(Some(RunOutcome {
        uniqueness,
        clusters,
        pairs,
    }))
}

/// Attach the failing record's name to errors that carry free text.
fn annotate(error: EmbeddingError, name: &str) -> EmbeddingError {
    match error {
        EmbeddingError::ResponseShape(msg) => {
            EmbeddingError::ResponseShape(format!("{msg} (record {name})"))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Outbox;
    use async_trait::async_trait;
    use charsim_embeddings::EmbeddingResponse;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    /// Embeds `r{i}` as a deterministic 16-dimensional vector derived from `i`.
    struct IndexedProvider;

    #[async_trait]
    impl EmbeddingProvider for IndexedProvider {
        fn name(&self) -> &str {
            "indexed"
        }

        async fn embed(
            &self,
            request: EmbeddingRequest,
        ) -> charsim_embeddings::Result<EmbeddingResponse> {
            let i: usize = request
                .text
                .trim_start_matches('r')
                .parse()
                .map_err(|_| EmbeddingError::ResponseShape(request.text.clone()))?;
            let embedding: Vec<f32> = (0..16)
                .map(|d| ((i * 31 + d * 7) % 97) as f32 + 1.0)
                .collect();
            Ok(EmbeddingResponse {
                dimension: embedding.len(),
                embedding,
                model: None,
            })
        }
    }

    fn fields() -> Vec<String> {
        vec!["name".to_string(), "description".to_string()]
    }

    #[test]
    fn test_prepare_jobs_skips_blank_records() {
        let records = vec![
            Record::new("a", "Alice").with_field("description", "A bard"),
            Record::new("b", " "),
            Record::new("c", "Carol"),
        ];

        let jobs = prepare_jobs(&records, &fields()).unwrap();
        assert_eq!(
            jobs,
            vec![
                EmbedJob {
                    id: "a".into(),
                    name: "Alice".into(),
                    text: "Alice\nA bard".into(),
                },
                EmbedJob {
                    id: "c".into(),
                    name: "Carol".into(),
                    text: "Carol".into(),
                },
            ]
        );
    }

    #[test]
    fn test_prepare_jobs_empty_input() {
        let err = prepare_jobs(&[], &fields()).unwrap_err();
        assert_eq!(err.kind(), "empty_input");

        let err = prepare_jobs(&[Record::new("a", "")], &fields()).unwrap_err();
        assert_eq!(err.kind(), "empty_input");
    }

    #[test]
    fn test_prepare_jobs_rejects_duplicate_ids() {
        let records = vec![
            Record::new("a.png", "Alice"),
            Record::new("b.png", "Bob"),
            Record::new("a.png", "Alice again"),
        ];

        let err = prepare_jobs(&records, &fields()).unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains("a.png"));
    }

    #[tokio::test]
    async fn test_comparison_streams_progress_and_stops_on_cancel() {
        let records: Vec<Record> = (0..800)
            .map(|i| Record::new(format!("r{i}.png"), format!("r{i}")))
            .collect();
        let jobs = prepare_jobs(&records, &fields()).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let reporter = ProgressReporter::new(Outbox::new(1, tx, cancel.clone()));
        let options = RunOptions {
            progress_interval: 100,
            ..RunOptions::default()
        };
        let worker = Worker::new(
            Arc::new(IndexedProvider),
            jobs,
            None,
            0.95,
            options,
            reporter,
        );
        let handle = tokio::spawn(worker.run());

        // The first pair update must arrive while the matrix is still being built.
        loop {
            let envelope = rx.recv().await.unwrap();
            assert!(!envelope.message.is_terminal(), "{:?}", envelope.message);
            if matches!(
                &envelope.message,
                WorkerMessage::Progress { message, .. } if message.starts_with("Comparing pairs")
            ) {
                break;
            }
        }

        cancel.cancel();
        handle.await.unwrap();

        while let Ok(envelope) = rx.try_recv() {
            assert!(!envelope.message.is_terminal(), "{:?}", envelope.message);
        }
    }
}

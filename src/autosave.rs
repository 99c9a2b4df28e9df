//! Debounced persistence of manual rubric selections.
//!
//! Each toggle hands the full selection set to [`SelectionAutosave::update`].
//! After a quiet period the latest set is scored against the rubric and
//! written to the submission; intermediate sets are never persisted.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::grading::{score_selections, GradeOutcome};
use crate::rubric::Rubric;
use crate::store::{record_grade, RecordStore, StoreError};

enum Command {
    Update(BTreeSet<String>),
    Flush(oneshot::Sender<Result<Option<GradeOutcome>, StoreError>>),
}

/// Save counts reported when the worker shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutosaveStats {
    pub saves: usize,
    pub failures: usize,
}

pub struct SelectionAutosave {
    tx: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<AutosaveStats>,
}

struct Worker {
    store: Arc<dyn RecordStore>,
    submission_id: String,
    rubric: Rubric,
    stats: AutosaveStats,
}

impl Worker {
    async fn save(&mut self, selected: &BTreeSet<String>) -> Result<GradeOutcome, StoreError> {
        let outcome = score_selections(selected, &self.rubric);
        match record_grade(self.store.as_ref(), &self.submission_id, &outcome).await {
            Ok(_) => {
                self.stats.saves += 1;
                debug!(
                    submission = %self.submission_id,
                    selected = selected.len(),
                    total = outcome.total,
                    "selection autosaved"
                );
                Ok(outcome)
            }
            Err(err) => {
                self.stats.failures += 1;
                warn!(submission = %self.submission_id, error = %err, "selection autosave failed");
                Err(err)
            }
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>, delay: Duration) -> AutosaveStats {
        let mut pending: Option<BTreeSet<String>> = None;
        loop {
            let next = if pending.is_some() {
                match timeout(delay, rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        if let Some(selected) = pending.take() {
                            let _ = self.save(&selected).await;
                        }
                        continue;
                    }
                }
            } else {
                rx.recv().await
            };

            match next {
                Some(Command::Update(selected)) => pending = Some(selected),
                Some(Command::Flush(ack)) => {
                    let result = match pending.take() {
                        Some(selected) => self.save(&selected).await.map(Some),
                        None => Ok(None),
                    };
                    let _ = ack.send(result);
                }
                None => {
                    if let Some(selected) = pending.take() {
                        let _ = self.save(&selected).await;
                    }
                    return self.stats;
                }
            }
        }
    }
}

impl SelectionAutosave {
    /// Start the background saver for one submission. Must be called inside a
    /// tokio runtime.
    pub fn spawn(
        store: Arc<dyn RecordStore>,
        submission_id: impl Into<String>,
        rubric: Rubric,
        delay: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            store,
            submission_id: submission_id.into(),
            rubric,
            stats: AutosaveStats::default(),
        };
        let worker = tokio::spawn(worker.run(rx, delay));
        Self { tx, worker }
    }

    /// Replace the pending selection set and restart the quiet period.
    pub fn update(&self, selected: BTreeSet<String>) {
        if self.tx.send(Command::Update(selected)).is_err() {
            warn!("selection autosave worker has stopped; update dropped");
        }
    }

    /// Save the pending set now. `Ok(None)` when nothing was pending.
    pub async fn flush(&self) -> Result<Option<GradeOutcome>, StoreError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack))
            .map_err(|_| StoreError::Join("autosave worker stopped".to_string()))?;
        done.await
            .map_err(|_| StoreError::Join("autosave worker dropped flush".to_string()))?
    }

    /// Save anything pending and stop the worker.
    pub async fn close(self) -> Result<AutosaveStats, StoreError> {
        drop(self.tx);
        self.worker
            .await
            .map_err(|e| StoreError::Join(e.to_string()))
    }
}

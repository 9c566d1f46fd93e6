//! Bounded asynchronous ingestion of usage drafts
//!
//! Callers that must never block on metering submit drafts here. The queue
//! is bounded and lossy by contract: when it is full the draft is dropped
//! and counted, the caller is never back-pressured.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::usage::UsageDraft;

use super::recorder::UsageRecorder;

/// Handle to the background recording worker
#[derive(Debug)]
pub struct UsageSideChannel {
    tx: mpsc::Sender<UsageDraft>,
    worker: JoinHandle<()>,
}

impl UsageSideChannel {
    /// Start the worker with the given queue depth
    pub fn spawn(recorder: Arc<UsageRecorder>, queue_depth: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<UsageDraft>(queue_depth);

        let worker = tokio::spawn(async move {
            while let Some(draft) = rx.recv().await {
                recorder.log_usage_best_effort(draft).await;
            }

            info!("Usage side channel drained and stopped");
        });

        Self { tx, worker }
    }

    /// Enqueue a draft. Returns whether it was accepted; a full queue drops
    /// the draft.
    pub fn submit(&self, draft: UsageDraft) -> bool {
        match self.tx.try_send(draft) {
            Ok(()) => {
                counter!("metering_side_channel_accepted_total").increment(1);

                true
            }
            Err(mpsc::error::TrySendError::Full(draft)) => {
                warn!(
                    call_type = %draft.call_type,
                    bucket = %draft.bucket,
                    "Usage side channel full, dropping draft"
                );
                counter!("metering_side_channel_dropped_total").increment(1);

                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Usage side channel already shut down, dropping draft");
                counter!("metering_side_channel_dropped_total").increment(1);

                false
            }
        }
    }

    /// Stop accepting drafts and wait for the queue to drain
    pub async fn shutdown(self) {
        drop(self.tx);

        if let Err(e) = self.worker.await {
            warn!(error = %e, "Usage side channel worker ended abnormally");
        }
    }
}

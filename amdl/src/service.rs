//! Inbound entry point: concurrency-capped acquisitions, one task per request.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info_span};

use crate::error::PipelineError;
use crate::pipeline::{Pipeline, PipelineResult};

/// Who asked for a track. Only used for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Runs pipelines off the caller's task while capping how many run at once.
#[derive(Clone)]
pub struct AcquireService {
    pipeline: Arc<Pipeline>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl AcquireService {
    /// `max_concurrent` of zero is treated as one.
    pub fn new(pipeline: Arc<Pipeline>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Runs currently holding a slot.
    pub fn active(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }

    /// Acquire the track behind `url` on behalf of `user`.
    ///
    /// The run executes on its own tokio task; this future only waits for it.
    pub async fn acquire(&self, url: &str, user: UserContext) -> PipelineResult {
        let span = info_span!("acquire", user_id = %user.user_id, url = %url);
        let pipeline = self.pipeline.clone();
        let permits = self.permits.clone();
        let url = url.to_string();

        let task = tokio::spawn(
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::Aborted(e.to_string()))?;
                debug!("Acquisition slot granted");
                pipeline.run(&url).await
            }
            .instrument(span),
        );

        match task.await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::Aborted(e.to_string())),
        }
    }
}

impl std::fmt::Debug for AcquireService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquireService")
            .field("max_concurrent", &self.max_concurrent)
            .field("active", &self.active())
            .finish()
    }
}

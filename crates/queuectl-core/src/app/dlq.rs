//! Dead letter queue façade.

use std::sync::Arc;

use tracing::info;

use crate::domain::{Job, JobId, JobState};
use crate::error::QueueError;
use crate::ports::JobStore;

/// Read and reinstate `dead` jobs.
#[derive(Clone)]
pub struct DlqManager {
    store: Arc<dyn JobStore>,
}

impl DlqManager {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<Job>, QueueError> {
        self.store.list_by_state(Some(JobState::Dead), None).await
    }

    /// Move a dead job back to `pending` with attempts reset.
    ///
    /// `NotFound` and `NotDead` are returned unchanged so callers can tell them apart.
    pub async fn retry(&self, id: &JobId) -> Result<(), QueueError> {
        self.store.reinstate(id).await?;
        info!(job.id = %id, "job reinstated from dead letter queue");
        Ok(())
    }
}

//! Status views (counts per state).

use serde::{Deserialize, Serialize};

use crate::domain::JobState;

/// Number of jobs in each state (`summaryByState`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSummary {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub dead: u64,
}

impl StateSummary {
    pub fn add(&mut self, state: JobState, count: u64) {
        *self.slot(state) += count;
    }

    pub fn get(&self, state: JobState) -> u64 {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Dead => self.dead,
        }
    }

    pub fn total(&self) -> u64 {
        JobState::ALL.into_iter().map(|state| self.get(state)).sum()
    }

    /// `(state, count)` pairs in lifecycle order.
    pub fn iter(&self) -> impl Iterator<Item = (JobState, u64)> + '_ {
        JobState::ALL.into_iter().map(|state| (state, self.get(state)))
    }

    fn slot(&mut self, state: JobState) -> &mut u64 {
        match state {
            JobState::Pending => &mut self.pending,
            JobState::Processing => &mut self.processing,
            JobState::Completed => &mut self.completed,
            JobState::Failed => &mut self.failed,
            JobState::Dead => &mut self.dead,
        }
    }
}

impl FromIterator<JobState> for StateSummary {
    fn from_iter<I: IntoIterator<Item = JobState>>(iter: I) -> Self {
        let mut summary = StateSummary::default();
        for state in iter {
            summary.add(state, 1);
        }
        summary
    }
}

//! Domain model (IDs, job record, state machine, outcomes, decisions, worker records).

pub mod decision;
pub mod ids;
pub mod job;
pub mod outcome;
pub mod state;
pub mod worker;

pub use decision::Decision;
pub use ids::{JobId, WorkerId};
pub use job::{Job, JobSubmission, NewJob};
pub use outcome::{EXIT_NOT_RUN, EXIT_TIMED_OUT, ExecOutcome};
pub use state::{JobState, Priority};
pub use worker::WorkerRecord;

pub mod apply;
pub mod classify;
pub mod ingest;
pub mod labels;
pub mod parse;
pub mod prompt;
pub mod review;

use thiserror::Error;

use crate::store::StoreError;
use crate::tracker::TrackerError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("Issue #{0} is not in the record store")]
    IssueNotFound(u64),

    #[error("Interactive prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),
}

//! Module containing the universal error type
use thiserror::Error;

/// Universal error type for this crate
#[derive(Error, Debug)]
pub enum Error {
    /// More points were requested from a batch than were staged
    #[error("batch size ({0}) exceeds staged point count ({1})")]
    BadBatchSize(usize, usize),
}

//! The segmented transfer engine.
//!
//! A resource is split into [`ByteRange`]s by the [`ChunkPlanner`], fetched
//! by a [`ConnectionWorkerPool`] and, for servers that ignore ranges,
//! downloaded by the [`SingleStreamFallback`] instead.

pub mod chunk;
pub mod fallback;
pub mod planner;
pub mod pool;
pub mod queue;
pub mod range;

pub use chunk::{ChunkState, ChunkStatus, RetrySettings, RetryState};
pub use fallback::SingleStreamFallback;
pub use planner::{ChunkPlan, ChunkPlanner};
pub use pool::ConnectionWorkerPool;
pub use range::ByteRange;

use crate::error::{Error, TransferError};

/// How a single attempt ended when it did not succeed.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// Worth another attempt.
    Transient(TransferError),
    /// Retrying cannot help.
    Fatal(Error),
}

impl From<TransferError> for AttemptError {
    fn from(e: TransferError) -> Self {
        AttemptError::Transient(e)
    }
}

//! Pool error types.

use sqlsession_types::TypeError;
use thiserror::Error;

/// Errors that can occur during pool operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoolError {
    /// The arena was closed; its session tree is gone.
    #[error("value arena is closed")]
    ArenaClosed,

    /// A driver value could not be scanned into a slot.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),
}

//! Session error types.

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;

use parking_lot::Mutex;
use sqlsession_pool::PoolError;
use sqlsession_types::TypeError;
use thiserror::Error;

/// Boxed error as returned by drivers and hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A handle that can be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// A session.
    Session,
    /// A cursor over a result set.
    Cursor,
    /// The value arena of a session tree.
    Arena,
    /// The database handle.
    Database,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Session => "session",
            Self::Cursor => "cursor",
            Self::Arena => "value arena",
            Self::Database => "database",
        })
    }
}

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The resource was used after close.
    #[error("{0} is closed")]
    Closed(Resource),

    /// Commit or rollback on a session that is not in a transaction.
    #[error("not in transaction")]
    NotInTransaction,

    /// The transaction was already committed or rolled back.
    #[error("transaction has already been committed or rolled back")]
    TransactionDone,

    /// Error reported by the driver, passed through unchanged.
    #[error(transparent)]
    Driver(BoxError),

    /// A panic inside a transaction callback, caught and converted.
    #[error(transparent)]
    Recovered(Box<RecoveredPanic>),

    /// A pre-hook refused the operation.
    #[error("aborted by hook: {0}")]
    Hook(BoxError),

    /// A single-row query returned nothing.
    #[error("no rows in result set")]
    NoRows,

    /// A row has no column with the requested name or index.
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// Type conversion error.
    #[error("type error: {0}")]
    Type(#[from] TypeError),

    /// The context deadline passed before the driver answered.
    #[error("command timed out")]
    CommandTimeout,

    /// The context was cancelled before the driver answered.
    #[error("operation cancelled")]
    Cancelled,

    /// A spawned operation ended without delivering a result.
    #[error("background task failed: {0}")]
    TaskFailed(String),

    /// Pool error.
    #[error("pool error: {0}")]
    Pool(PoolError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::ArenaClosed => Self::Closed(Resource::Arena),
            PoolError::Type(err) => Self::Type(err),
            other => Self::Pool(other),
        }
    }
}

impl Error {
    /// Wrap a driver error.
    pub fn driver(err: impl Into<BoxError>) -> Self {
        Self::Driver(err.into())
    }

    /// Build the error a pre-hook returns to abort an operation.
    pub fn hook(err: impl Into<BoxError>) -> Self {
        Self::Hook(err.into())
    }

    /// Check if this is the not-in-transaction sentinel.
    #[must_use]
    pub fn is_not_in_transaction(&self) -> bool {
        matches!(self, Self::NotInTransaction)
    }

    /// Check if this error means the transaction already finished.
    #[must_use]
    pub fn is_transaction_done(&self) -> bool {
        matches!(self, Self::TransactionDone)
    }

    /// Check if a closed resource was used.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    /// Check if this error is transient and may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::CommandTimeout | Self::TaskFailed(_))
    }

    /// Downcast a driver error to its concrete type.
    #[must_use]
    pub fn driver_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Self::Driver(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// The caught panic, if this error came from one.
    #[must_use]
    pub fn recovered(&self) -> Option<&RecoveredPanic> {
        match self {
            Self::Recovered(panic) => Some(&**panic),
            _ => None,
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A panic caught at a transaction boundary.
///
/// Keeps the panic message, the original payload and a backtrace captured
/// where the panic was caught. A payload that is itself an [`Error`] or a
/// [`BoxError`] becomes the [`source`](std::error::Error::source) of this
/// error instead of being kept as a payload.
pub struct RecoveredPanic {
    message: String,
    cause: Option<BoxError>,
    payload: Mutex<Option<Box<dyn Any + Send>>>,
    backtrace: Backtrace,
}

impl RecoveredPanic {
    /// Convert a payload obtained from `catch_unwind`.
    #[must_use]
    pub fn new(payload: Box<dyn Any + Send>) -> Self {
        let backtrace = Backtrace::force_capture();

        let payload = match payload.downcast::<Error>() {
            Ok(err) => return Self::from_cause(*err, backtrace),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<BoxError>() {
            Ok(err) => return Self::from_cause(*err, backtrace),
            Err(payload) => payload,
        };

        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        Self {
            message,
            cause: None,
            payload: Mutex::new(Some(payload)),
            backtrace,
        }
    }

    fn from_cause(cause: impl Into<BoxError>, backtrace: Backtrace) -> Self {
        let cause = cause.into();
        Self {
            message: cause.to_string(),
            cause: Some(cause),
            payload: Mutex::new(None),
            backtrace,
        }
    }

    /// The panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Backtrace captured where the panic was caught.
    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Take the original payload, e.g. to re-raise with
    /// [`std::panic::resume_unwind`]. Returns `None` on the second call or
    /// when the payload was an error.
    pub fn take_payload(&self) -> Option<Box<dyn Any + Send>> {
        self.payload.lock().take()
    }
}

impl fmt::Display for RecoveredPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "recovered from panic: {}", self.message)
    }
}

impl fmt::Debug for RecoveredPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveredPanic")
            .field("message", &self.message)
            .field("cause", &self.cause)
            .field("backtrace", &self.backtrace.status())
            .finish_non_exhaustive()
    }
}

impl std::error::Error for RecoveredPanic {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

//! Failure taxonomy for dispatched units of work.
//!
//! Every unit either produces a value or a [`Fault`]. Downstream consumers only
//! learn that the unit did not produce a usable value; the fault itself keeps
//! the originating error so it can be logged or downcast.

use std::any::Any;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

/// Error type produced by user calculations.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Resolved state of one unit: its value or the fault that replaced it.
pub type Outcome<T> = Result<T, Fault>;

/// Why a unit did not produce a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Fault {
    /// The calculation itself returned an error or panicked.
    #[error("{0}")]
    Business(Arc<dyn Error + Send + Sync>),
    /// The time budget ran out before the unit completed.
    #[error("timed out after {waited:?}")]
    Timeout { waited: Duration },
    /// The unit was cancelled, by the collector or externally.
    #[error("cancelled")]
    Cancelled,
}

impl Fault {
    pub fn business(err: impl Into<BoxError>) -> Self {
        let err: BoxError = err.into();
        Fault::Business(Arc::from(err))
    }

    /// Build a business fault from a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Fault::business(Panicked(message))
    }

    /// The calculation's own error, if this is a business fault.
    pub fn business_error(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            Fault::Business(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Downcast the business error to a concrete type.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.business_error().and_then(|e| e.downcast_ref::<E>())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Fault::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Fault::Cancelled)
    }
}

impl From<WaitError> for Fault {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::TimedOut(waited) => Fault::Timeout { waited },
            WaitError::Cancelled => Fault::Cancelled,
        }
    }
}

/// Raised by a bounded wait instead of reporting a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("no completion within {0:?}")]
    TimedOut(Duration),
    #[error("work was cancelled")]
    Cancelled,
}

/// A calculation panicked on its worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("calculation panicked: {0}")]
pub struct Panicked(pub String);

/// The value of a work handle was already handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("value already taken from work handle")]
pub struct ValueTaken;

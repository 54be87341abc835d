//! Error types for the presentation core
//!
//! Recoverable conditions (pool empty, sample not yet due) are not errors;
//! they are absorbed inside the component that observes them. What remains
//! here is either a caller mistake or a condition that makes correct
//! presentation impossible.

use thiserror::Error;

use crate::state::RenderState;
use crate::types::SampleToken;

/// Errors returned by the sample pool
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Token was never issued by this pool or has already been returned
    #[error("Sample token {0} is not checked out of the pool")]
    InvalidToken(SampleToken),

    /// Token was outstanding when the pool was cleared and has been written off
    #[error("Sample token {0} was abandoned when the pool was cleared")]
    Abandoned(SampleToken),

    /// Pool cannot be initialized without surfaces
    #[error("Sample pool requires at least one surface")]
    ZeroCapacity,
}

/// Errors reported by the display backend when presenting or allocating
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The presentation surface is temporarily unavailable; retry later
    #[error("Presentation surface unavailable")]
    SurfaceUnavailable,

    /// The backend failed permanently
    #[error("Display backend failed: {0}")]
    Failed(String),
}

/// Errors reported by the upstream mixer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MixerError {
    #[error("Mixer failed: {0}")]
    Failed(String),

    /// The mixer rejected the proposed output type
    #[error("Mixer rejected output type: {0}")]
    TypeRejected(String),
}

/// Top-level presenter error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PresenterError {
    /// Operation is not legal in the current render state (including after shutdown)
    #[error("Cannot {operation} while presenter is {state}")]
    InvalidState {
        operation: &'static str,
        state: RenderState,
    },

    /// Caller supplied an out-of-range argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Backend returned a token the pool does not know about
    #[error(transparent)]
    InvalidToken(#[from] PoolError),

    /// Operation needs a negotiated media type
    #[error("No media type has been negotiated")]
    NoMediaType,

    /// None of the mixer's output types is acceptable to the backend
    #[error("Format negotiation failed: {0}")]
    FormatNegotiation(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Mixer(#[from] MixerError),

    /// Surface stayed unavailable for more attempts than the retry budget allows
    #[error("Sample {token} could not be presented after {attempts} attempts")]
    RetryBudgetExceeded { token: SampleToken, attempts: u32 },

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Scheduler worker thread could not be started
    #[error("Scheduler worker error: {0}")]
    Worker(String),
}

impl PresenterError {
    /// Whether this error makes further correct presentation impossible
    ///
    /// Fatal errors are surfaced on the event bus and stop playback.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PresenterError::InvalidToken(PoolError::InvalidToken(_))
                | PresenterError::FormatNegotiation(_)
                | PresenterError::Backend(BackendError::Failed(_))
                | PresenterError::Mixer(_)
                | PresenterError::RetryBudgetExceeded { .. }
        )
    }
}

/// Result type for presenter operations
pub type PresenterResult<T> = Result<T, PresenterError>;

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PresenterError::InvalidState {
            operation: "flush",
            state: RenderState::Shutdown,
        };
        assert_eq!(err.to_string(), "Cannot flush while presenter is shutdown");

        let err = PresenterError::from(PoolError::InvalidToken(SampleToken(7)));
        assert!(err.to_string().contains("#7"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PresenterError::from(BackendError::Failed("lost".into())).is_fatal());
        assert!(!PresenterError::from(BackendError::SurfaceUnavailable).is_fatal());
        assert!(!PresenterError::from(PoolError::Abandoned(SampleToken(1))).is_fatal());
        assert!(PresenterError::from(PoolError::InvalidToken(SampleToken(1))).is_fatal());
        assert!(!PresenterError::InvalidState {
            operation: "step",
            state: RenderState::Stopped
        }
        .is_fatal());
    }
}

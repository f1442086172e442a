use thiserror::Error;

/// Errors raised by membership, commission and withdrawal operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MembershipError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Referral already set: {0}")]
    AlreadySet(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Amount below minimum withdrawal: {0}")]
    InsufficientAmount(String),

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Price source unreachable. Recovered by the fallback oracle.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for membership operations
pub type MembershipResult<T> = Result<T, MembershipError>;

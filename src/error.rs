//! Error types for bet operations
//!
//! `Display` output is what the requesting user sees, so the messages are
//! written for the chat channel rather than for logs.

use thiserror::Error;

/// Failures encoding or decoding the stored guess payload
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encryption key must be 16, 24 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("guess payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by the bet lifecycle service
#[derive(Debug, Error)]
pub enum BetError {
    #[error("You are not authorized to {action}.")]
    Unauthorized { action: &'static str },

    #[error("There is a bet in progress, please finish it first.")]
    BetInProgress,

    #[error("There is no active bet right now.")]
    NoBetInProgress,

    #[error("No such bet exists.")]
    NoSuchBet,

    #[error("No bet exists")]
    NoBetExists,

    #[error("No bet found for {0}.")]
    MonthNotFound(String),

    #[error("you cannot query who wins for an active bet!")]
    ActiveBetQuery,

    #[error("Bet storage is unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("Stored bet data is unreadable: {0}")]
    Codec(#[from] CodecError),
}

pub type BetResult<T> = std::result::Result<T, BetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let err = BetError::Unauthorized { action: "start a bet" };
        assert_eq!(err.to_string(), "You are not authorized to start a bet.");
        assert_eq!(
            BetError::MonthNotFound("March".to_string()).to_string(),
            "No bet found for March."
        );
    }

    #[test]
    fn test_store_errors_convert() {
        let err: BetError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, BetError::StoreUnavailable(_)));
    }
}

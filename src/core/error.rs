use chrono::{DateTime, Utc};
use thiserror::Error;

/// Coarse classification used by callers that only need to branch on the
/// error family (HTTP mapping, logging level).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Unauthorized,
    Forbidden,
    Exhausted,
    Internal,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid handle '{0}': use 1-32 characters from a-z, 0-9, '_' or '-'")]
    InvalidHandle(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("Code '{0}' not found")]
    CodeNotFound(String),

    #[error("Code '{0}' has already been used")]
    CodeAlreadyUsed(String),

    #[error("Code '{0}' has expired")]
    CodeExpired(String),

    #[error("Insufficient points: {available} available, {required} required")]
    InsufficientPoints { available: f64, required: f64 },

    #[error("Already checked in, next check-in available at {next_check_in_at}")]
    CheckInCooldown { next_check_in_at: DateTime<Utc> },

    #[error("Handle '{0}' is already taken")]
    HandleTaken(String),

    #[error("Registration is closed; a valid invite code is required")]
    RegistrationClosed,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account '{0}' is banned")]
    Banned(String),

    #[error("Could not generate a unique code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidHandle(_)
            | Self::InvalidAmount(_)
            | Self::InvalidBatch(_)
            | Self::WeakPassword(_)
            | Self::Validation(_) => ErrorKind::Validation,
            Self::UserNotFound(_) | Self::CodeNotFound(_) => ErrorKind::NotFound,
            Self::CodeAlreadyUsed(_)
            | Self::CodeExpired(_)
            | Self::InsufficientPoints { .. }
            | Self::CheckInCooldown { .. }
            | Self::HandleTaken(_) => ErrorKind::Conflict,
            Self::InvalidCredentials => ErrorKind::Unauthorized,
            Self::RegistrationClosed | Self::Banned(_) => ErrorKind::Forbidden,
            Self::CodeSpaceExhausted { .. } => ErrorKind::Exhausted,
            Self::Storage(_) | Self::LockError(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidHandle(_) => "invalid_handle",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidBatch(_) => "invalid_batch",
            Self::WeakPassword(_) => "weak_password",
            Self::Validation(_) => "validation_error",
            Self::UserNotFound(_) => "user_not_found",
            Self::CodeNotFound(_) => "code_not_found",
            Self::CodeAlreadyUsed(_) => "code_already_used",
            Self::CodeExpired(_) => "code_expired",
            Self::InsufficientPoints { .. } => "insufficient_points",
            Self::CheckInCooldown { .. } => "check_in_cooldown",
            Self::HandleTaken(_) => "handle_taken",
            Self::RegistrationClosed => "registration_closed",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Banned(_) => "banned",
            Self::CodeSpaceExhausted { .. } => "code_space_exhausted",
            Self::Storage(_) => "storage_error",
            Self::LockError(_) => "lock_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl<T> From<std::sync::PoisonError<T>> for LedgerError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("Failed to (de)serialize record: {}", err))
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_follow_taxonomy() {
        assert_eq!(LedgerError::InvalidHandle("A".into()).kind(), ErrorKind::Validation);
        assert_eq!(LedgerError::CodeNotFound("X".into()).kind(), ErrorKind::NotFound);
        assert_eq!(LedgerError::CodeAlreadyUsed("X".into()).kind(), ErrorKind::Conflict);
        assert_eq!(
            LedgerError::CodeSpaceExhausted { attempts: 10 }.kind(),
            ErrorKind::Exhausted
        );
        assert_eq!(LedgerError::Storage("disk".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_cooldown_message_reports_next_slot() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let err = LedgerError::CheckInCooldown { next_check_in_at: at };
        assert!(err.to_string().contains("2024-03-01 10:00:00 UTC"));
        assert_eq!(err.code(), "check_in_cooldown");
    }
}

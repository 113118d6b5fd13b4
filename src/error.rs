//! Error taxonomy shared by every component.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FridgeError {
    /// Missing, malformed, forged, wrong-kind or dead token (or bad credentials).
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Valid token, but the subject does not own the target fridge.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Referenced user, fridge or product does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Rejected before any write: out-of-range reading, zero quantity, bad field.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A movement would drive the stock of a product below zero.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Unique constraint hit (duplicate email).
    #[error("conflict: {0}")]
    Conflict(String),
    /// Backing store failure.
    #[error("storage error: {0}")]
    Storage(String),
}

pub type FridgeResult<T> = Result<T, FridgeError>;

impl FridgeError {
    /// `InvalidState` is the ledger flavour of invalid input: both are rejected before writing.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, FridgeError::InvalidInput(_) | FridgeError::InvalidState(_))
    }

    /// Stable machine-readable code for transports.
    pub fn code(&self) -> &'static str {
        match self {
            FridgeError::Unauthorized(_) => "UNAUTHORIZED",
            FridgeError::Forbidden(_) => "FORBIDDEN",
            FridgeError::NotFound(_) => "NOT_FOUND",
            FridgeError::InvalidInput(_) => "INVALID_INPUT",
            FridgeError::InvalidState(_) => "INVALID_STATE",
            FridgeError::Conflict(_) => "CONFLICT",
            FridgeError::Storage(_) => "STORAGE",
        }
    }
}

impl From<DieselError> for FridgeError {
    fn from(value: DieselError) -> Self {
        match value {
            DieselError::NotFound => FridgeError::NotFound("row not found".to_string()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                FridgeError::Conflict(info.message().to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                FridgeError::NotFound(info.message().to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, info) => {
                FridgeError::InvalidInput(info.message().to_string())
            }
            other => FridgeError::Storage(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for FridgeError {
    fn from(value: diesel::r2d2::PoolError) -> Self {
        FridgeError::Storage(format!("connection pool: {}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_counts_as_invalid_input() {
        assert!(FridgeError::InvalidState("x".into()).is_invalid_input());
        assert!(FridgeError::InvalidInput("x".into()).is_invalid_input());
        assert!(!FridgeError::Forbidden("x".into()).is_invalid_input());
    }

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err: FridgeError = DieselError::NotFound.into();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}

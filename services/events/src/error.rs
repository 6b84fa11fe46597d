//! Error types for the events service
//!
//! `StorageError` covers infrastructure failures behind the storage port,
//! `EventError` is the typed result of every core operation, and `ApiError`
//! maps both onto HTTP responses.

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::{CacheError, DatabaseError};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Failure behind the storage port
#[derive(Error, Debug)]
pub enum StorageError {
    /// Relational backend failure
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Document backend failure
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// The call did not complete within the configured bound
    #[error("Storage call timed out after {0:?}")]
    Timeout(Duration),

    /// A stored row or document could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A uniqueness guarantee was contended and the write was refused
    #[error("Write conflict: {0}")]
    Conflict(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Corrupt(err.to_string())
    }
}

/// Type alias for storage results
pub type StorageResult<T> = Result<T, StorageError>;

/// Which kind of record a lookup missed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Event,
    User,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Event => f.write_str("Event"),
            Entity::User => f.write_str("User"),
        }
    }
}

/// Typed outcome of a failed core operation
#[derive(Error, Debug)]
pub enum EventError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: Uuid },

    #[error("Only the event creator can modify this event")]
    Unauthorized,

    #[error("This event has reached maximum capacity")]
    EventFull,

    #[error("You are already attending this event")]
    AlreadyJoined,

    #[error("You are not attending this event")]
    NotAttending,

    #[error("Event date cannot be in the past")]
    InvalidDate,

    #[error("Please provide at least one field to update")]
    NoUpdates,

    #[error("Capacity {capacity} is below the {attendees} current attendees")]
    CapacityBelowAttendance { capacity: u32, attendees: u32 },

    #[error("The event creator cannot leave their own event")]
    CreatorCannotLeave,

    #[error("Conflicting write: {0}")]
    ConstraintConflict(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl EventError {
    pub fn event_not_found(id: Uuid) -> Self {
        EventError::NotFound {
            entity: Entity::Event,
            id,
        }
    }

    pub fn user_not_found(id: Uuid) -> Self {
        EventError::NotFound {
            entity: Entity::User,
            id,
        }
    }

    /// Only transient storage failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, EventError::Storage(_))
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            EventError::NotFound { .. } => "NOT_FOUND",
            EventError::Unauthorized => "UNAUTHORIZED",
            EventError::EventFull => "EVENT_FULL",
            EventError::AlreadyJoined => "ALREADY_JOINED",
            EventError::NotAttending => "NOT_ATTENDING",
            EventError::InvalidDate => "INVALID_DATE",
            EventError::NoUpdates => "NO_UPDATES",
            EventError::CapacityBelowAttendance { .. } => "CAPACITY_BELOW_ATTENDANCE",
            EventError::CreatorCannotLeave => "CREATOR_CANNOT_LEAVE",
            EventError::ConstraintConflict(_) => "CONSTRAINT_CONFLICT",
            EventError::Storage(_) => "STORAGE_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EventError::NotFound { .. } => StatusCode::NOT_FOUND,
            EventError::Unauthorized => StatusCode::FORBIDDEN,
            EventError::EventFull
            | EventError::AlreadyJoined
            | EventError::NotAttending
            | EventError::InvalidDate
            | EventError::NoUpdates
            | EventError::CapacityBelowAttendance { .. }
            | EventError::CreatorCannotLeave => StatusCode::BAD_REQUEST,
            EventError::ConstraintConflict(_) => StatusCode::CONFLICT,
            EventError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<StorageError> for EventError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(reason) => EventError::ConstraintConflict(reason),
            StorageError::Database(db_err) if db_err.is_unique_violation() => {
                EventError::ConstraintConflict(db_err.to_string())
            }
            other => EventError::Storage(other),
        }
    }
}

/// Type alias for core results
pub type EventResult<T> = Result<T, EventError>;

/// Custom error type for the HTTP layer
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or invalid bearer token
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Core operation failure
    #[error(transparent)]
    Event(#[from] EventError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Please provide a valid authentication token".to_string(),
            ),
            ApiError::Event(EventError::Storage(e)) => {
                tracing::error!(error = %e, "Storage failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORAGE_ERROR",
                    "A storage error occurred, please retry".to_string(),
                )
            }
            ApiError::Event(e) => (e.status_code(), e.code(), e.to_string()),
        };

        let body = Json(json!({
            "error": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_storage_errors_are_retryable() {
        let timeout = EventError::from(StorageError::Timeout(Duration::from_millis(10)));
        assert!(timeout.is_retryable());
        assert_eq!(timeout.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        for terminal in [
            EventError::EventFull,
            EventError::AlreadyJoined,
            EventError::NotAttending,
            EventError::InvalidDate,
            EventError::NoUpdates,
            EventError::Unauthorized,
            EventError::event_not_found(Uuid::new_v4()),
        ] {
            assert!(!terminal.is_retryable(), "{terminal:?} must be terminal");
        }
    }

    #[test]
    fn test_storage_conflict_becomes_constraint_conflict() {
        let err = EventError::from(StorageError::Conflict("event document contended".into()));
        assert!(matches!(err, EventError::ConstraintConflict(_)));
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_api_error_status() {
        let response = ApiError::from(EventError::Unauthorized).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = ApiError::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

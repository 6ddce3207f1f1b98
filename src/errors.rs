use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::ride::RideStatus;
use crate::models::user::Role;

/// Main error type for the ride lifecycle coordinator
#[derive(Debug)]
pub enum RideError {
    // Ride Service rejections
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    InternalServer(String),
    ServiceUnavailable(String),

    // Network and HTTP client errors
    NetworkTimeout,
    NetworkConnection(String),
    HttpClient(String),
    InvalidUrl(String),

    // Serialization and parsing errors
    JsonParsing(String),
    JsonSerialization(String),
    InvalidFormat(String),

    // Lifecycle errors
    RideNotFound(String),
    RideAlreadyAssigned,
    FeedbackAlreadySubmitted,
    IllegalTransition { from: RideStatus, to: RideStatus, role: Role },

    // Validation errors
    ValidationFailed(Vec<ValidationError>),
    MissingRequiredField(String),
    InvalidFieldValue { field: String, value: String, reason: String },

    // Configuration errors
    InvalidConfiguration(String),
}

/// Client-observable error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Payload failed local checks and never left the client.
    Validation,
    /// The actor or current state does not allow the mutation.
    Precondition,
    /// The request did not complete or the response was unusable.
    Network,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for RideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RideError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            RideError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            RideError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            RideError::NotFound(msg) => write!(f, "Not found: {}", msg),
            RideError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            RideError::InternalServer(msg) => write!(f, "Internal server error: {}", msg),
            RideError::ServiceUnavailable(service) => write!(f, "Service unavailable: {}", service),

            RideError::NetworkTimeout => write!(f, "Network request timed out"),
            RideError::NetworkConnection(msg) => write!(f, "Network connection error: {}", msg),
            RideError::HttpClient(msg) => write!(f, "HTTP client error: {}", msg),
            RideError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),

            RideError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),
            RideError::JsonSerialization(msg) => write!(f, "JSON serialization error: {}", msg),
            RideError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),

            RideError::RideNotFound(id) => write!(f, "Ride not found: {}", id),
            RideError::RideAlreadyAssigned => write!(f, "Ride is already assigned to another driver"),
            RideError::FeedbackAlreadySubmitted => write!(f, "Feedback was already submitted for this ride"),
            RideError::IllegalTransition { from, to, role } => {
                write!(f, "{} may not move a ride from {} to {}", role, from, to)
            }

            RideError::ValidationFailed(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            RideError::MissingRequiredField(field) => write!(f, "Missing required field: {}", field),
            RideError::InvalidFieldValue { field, value, reason } => {
                write!(f, "Invalid value '{}' for field '{}': {}", value, field, reason)
            }

            RideError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for RideError {}

// Convenience type alias for Results
pub type RideResult<T> = Result<T, RideError>;

impl From<reqwest::Error> for RideError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RideError::NetworkTimeout
        } else if err.is_connect() {
            RideError::NetworkConnection(err.to_string())
        } else if err.is_decode() {
            RideError::JsonParsing(err.to_string())
        } else {
            RideError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RideError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            RideError::JsonParsing(err.to_string())
        } else {
            RideError::JsonSerialization(err.to_string())
        }
    }
}

impl From<uuid::Error> for RideError {
    fn from(err: uuid::Error) -> Self {
        RideError::InvalidFormat(format!("Invalid UUID: {}", err))
    }
}

impl From<chrono::ParseError> for RideError {
    fn from(err: chrono::ParseError) -> Self {
        RideError::InvalidFormat(format!("Invalid date/time format: {}", err))
    }
}

impl RideError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        RideError::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        RideError::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        RideError::Conflict(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        RideError::InternalServer(msg.into())
    }

    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        RideError::ValidationFailed(vec![ValidationError {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn ride_not_found(ride_id: impl Into<String>) -> Self {
        RideError::RideNotFound(ride_id.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RideError::ValidationFailed(_)
            | RideError::MissingRequiredField(_)
            | RideError::InvalidFieldValue { .. } => ErrorKind::Validation,

            RideError::BadRequest(_)
            | RideError::Unauthorized(_)
            | RideError::Forbidden(_)
            | RideError::NotFound(_)
            | RideError::Conflict(_)
            | RideError::RideNotFound(_)
            | RideError::RideAlreadyAssigned
            | RideError::FeedbackAlreadySubmitted
            | RideError::IllegalTransition { .. } => ErrorKind::Precondition,

            _ => ErrorKind::Network,
        }
    }

    /// Text shown to the user when a mutation fails.
    pub fn toast_message(&self) -> String {
        match self {
            RideError::BadRequest(msg)
            | RideError::Unauthorized(msg)
            | RideError::Forbidden(msg)
            | RideError::NotFound(msg)
            | RideError::Conflict(msg) => msg.clone(),
            RideError::ValidationFailed(errors) => errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "Please check the form".to_string()),
            RideError::RideAlreadyAssigned
            | RideError::FeedbackAlreadySubmitted
            | RideError::RideNotFound(_)
            | RideError::IllegalTransition { .. }
            | RideError::MissingRequiredField(_)
            | RideError::InvalidFieldValue { .. } => self.to_string(),
            _ => "Something went wrong".to_string(),
        }
    }
}

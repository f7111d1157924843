//! Error taxonomy for conversion and settings traffic

use std::fmt::Display;
use thiserror::Error;

/// Coarse classification used for user messages and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    ServiceUnavailable,
    InvalidRequest,
    Server,
    Unknown,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ErrorKind::Network => "network",
                ErrorKind::ServiceUnavailable => "service_unavailable",
                ErrorKind::InvalidRequest => "invalid_request",
                ErrorKind::Server => "server",
                ErrorKind::Unknown => "unknown",
            }
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl ConversionError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Maps a non-success HTTP status and its body onto the taxonomy.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = extract_message(body).unwrap_or_else(|| format!("HTTP status {status}"));
        match status {
            400 => Self::InvalidRequest { message },
            503 => Self::ServiceUnavailable { message },
            500..=599 => Self::Server { status, message },
            _ => Self::Unknown { message },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::Server { .. } => ErrorKind::Server,
            Self::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Whether repeating the same request can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::ServiceUnavailable { .. })
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Network { .. } => {
                "Unable to reach the currency service. Check your connection.".to_string()
            }
            Self::ServiceUnavailable { .. } => {
                "Currency conversion is temporarily unavailable. Please try again later."
                    .to_string()
            }
            Self::InvalidRequest { message } => format!("Invalid conversion request: {message}"),
            Self::Server { .. } => {
                "The currency service encountered an error. Please try again.".to_string()
            }
            Self::Unknown { .. } => "An unexpected error occurred during conversion.".to_string(),
        }
    }
}

// Backend errors come back as `{"message": ...}` or `{"error": ...}`.
fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|field| value.get(field).and_then(|v| v.as_str()))
        .map(str::to_string)
}

impl From<reqwest::Error> for ConversionError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), "");
        }
        if err.is_connect() || err.is_timeout() || err.is_request() {
            Self::network(err.to_string())
        } else {
            Self::unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ConversionError {
    fn from(err: serde_json::Error) -> Self {
        Self::unknown(format!("Unexpected response shape: {err}"))
    }
}

/// Outcome of a caller-initiated retry that did not succeed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetryError {
    #[error("A retry is already in progress")]
    InProgress,

    #[error("Maximum retry attempts exceeded ({attempts})")]
    Exhausted { attempts: u32 },

    #[error(transparent)]
    Failed(#[from] ConversionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert_eq!(
            ConversionError::from_status(400, r#"{"message": "bad currency"}"#),
            ConversionError::InvalidRequest {
                message: "bad currency".to_string()
            }
        );
        assert_eq!(
            ConversionError::from_status(503, "").kind(),
            ErrorKind::ServiceUnavailable
        );
        assert_eq!(
            ConversionError::from_status(502, r#"{"error": "upstream"}"#),
            ConversionError::Server {
                status: 502,
                message: "upstream".to_string()
            }
        );
        assert_eq!(ConversionError::from_status(404, "").kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_transient_errors() {
        assert!(ConversionError::network("down").is_transient());
        assert!(ConversionError::from_status(503, "").is_transient());
        assert!(!ConversionError::from_status(500, "").is_transient());
        assert!(!ConversionError::invalid("nope").is_transient());
    }

    #[test]
    fn test_malformed_json_is_unknown() {
        let err: ConversionError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.to_string().contains("Unexpected response shape"));
    }
}

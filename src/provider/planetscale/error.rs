//! PlanetScale API error taxonomy.

use serde::Deserialize;
use thiserror::Error;

use crate::controller::context::Interrupted;

/// Errors returned by a [`PlanetScaleApi`](super::PlanetScaleApi) implementation
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("PlanetScale API returned {status}: {message}")]
    Http {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Error body returned by the PlanetScale API
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Classify a non-success HTTP response
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = parsed
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.trim().to_string());
        let code = parsed.code;

        match (status, code.as_deref()) {
            (404, _) | (_, Some("not_found")) => Self::NotFound(message),
            (409, _) | (_, Some("already_exists")) => Self::AlreadyExists(message),
            (401 | 403, _) | (_, Some("unauthorized" | "forbidden")) => {
                Self::Unauthorized(message)
            }
            _ => Self::Http {
                status,
                code,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_status() {
        let err = ApiError::from_response(404, r#"{"code":"not_found","message":"Not Found"}"#);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: Not Found");
    }

    #[test]
    fn test_already_exists_by_code() {
        let err = ApiError::from_response(
            422,
            r#"{"code":"already_exists","message":"Name has already been taken"}"#,
        );
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_conflict_status_is_already_exists() {
        assert!(ApiError::from_response(409, "").is_already_exists());
    }

    #[test]
    fn test_forbidden_is_unauthorized() {
        let err = ApiError::from_response(403, r#"{"message":"token lacks access"}"#);
        assert!(matches!(err, ApiError::Unauthorized(ref m) if m == "token lacks access"));
    }

    #[test]
    fn test_server_error_keeps_plain_body() {
        let err = ApiError::from_response(502, "bad gateway\n");
        match err {
            ApiError::Http {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 502);
                assert_eq!(code, None);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

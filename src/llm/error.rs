use thiserror::Error;

/// Failure reported by a generation backend.
///
/// Classification happens once, at the adapter that talked to the wire.
/// Everything above it only asks [`GenerationError::is_retryable`].
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Rate limited by {provider}: {details}")]
    RateLimited { provider: String, details: String },

    #[error("Quota exhausted for {provider}: {details}")]
    QuotaExhausted { provider: String, details: String },

    #[error("{provider} server error (Status: {status_code}): {details}")]
    Server {
        provider: String,
        status_code: u16,
        details: String,
    },

    #[error("Authentication failed for {provider}: {details}")]
    Authentication { provider: String, details: String },

    #[error("Invalid request to {provider}: {details}")]
    InvalidRequest { provider: String, details: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to parse response from {provider}: {details}")]
    ResponseParsing { provider: String, details: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GenerationError {
    /// Rate limiting, quota exhaustion and server faults are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::QuotaExhausted { .. } | Self::Server { .. }
        )
    }

    /// Map a non-success HTTP status and its body to an error.
    pub fn from_status(provider: &str, status: u16, body: String) -> Self {
        let provider = provider.to_string();
        if body.contains("RESOURCE_EXHAUSTED") || body.to_lowercase().contains("quota") {
            return Self::QuotaExhausted {
                provider,
                details: body,
            };
        }
        match status {
            429 => Self::RateLimited {
                provider,
                details: body,
            },
            401 | 403 => Self::Authentication {
                provider,
                details: body,
            },
            500..=599 => Self::Server {
                provider,
                status_code: status,
                details: body,
            },
            _ => Self::InvalidRequest {
                provider,
                details: format!("status {}: {}", status, body),
            },
        }
    }

    pub fn parsing(provider: &str, details: impl Into<String>) -> Self {
        Self::ResponseParsing {
            provider: provider.to_string(),
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(GenerationError::from_status("gemini", 429, "slow down".into()).is_retryable());
        assert!(GenerationError::from_status("gemini", 500, "oops".into()).is_retryable());
        assert!(GenerationError::from_status("gemini", 503, "busy".into()).is_retryable());
        assert!(!GenerationError::from_status("gemini", 401, "bad key".into()).is_retryable());
        assert!(!GenerationError::from_status("gemini", 400, "bad".into()).is_retryable());
    }

    #[test]
    fn test_quota_body_is_retryable_regardless_of_status() {
        let err = GenerationError::from_status(
            "gemini",
            400,
            r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#.into(),
        );
        assert!(matches!(err, GenerationError::QuotaExhausted { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_parsing_and_config_are_terminal() {
        assert!(!GenerationError::parsing("gemini", "bad json").is_retryable());
        assert!(!GenerationError::Configuration("no key".into()).is_retryable());
    }
}

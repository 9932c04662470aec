//! API error types shared by the registration and location providers

use std::collections::BTreeMap;
use std::fmt;

/// Errors that can occur when talking to an external service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 401 Unauthorized - key invalid or expired
    Unauthorized { provider: String },
    /// 403 Forbidden - key lacks required permissions
    Forbidden { provider: String },
    /// 429 Rate Limited
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },
    /// Connection failure or transport error
    NetworkError { provider: String, message: String },
    /// Request did not complete in time
    Timeout { provider: String, secs: u64 },
    /// Other HTTP errors
    HttpError {
        provider: String,
        status: u16,
        message: String,
    },
    /// Server refused the request with a structured error body
    Rejected {
        provider: String,
        code: String,
        message: String,
        errors: BTreeMap<String, String>,
    },
    /// Response body could not be decoded
    Decode { provider: String, message: String },
    /// Provider not configured (no key in environment)
    NotConfigured { provider: String },
}

impl ApiError {
    /// Check if this is an authentication error (401 or 403)
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. } | ApiError::Forbidden { .. }
        )
    }

    /// Failures worth retrying: transport errors, timeouts, 429 and 5xx
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::NetworkError { .. }
            | ApiError::Timeout { .. }
            | ApiError::RateLimited { .. } => true,
            ApiError::HttpError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Get the provider name for this error
    pub fn provider_name(&self) -> &str {
        match self {
            ApiError::Unauthorized { provider }
            | ApiError::Forbidden { provider }
            | ApiError::RateLimited { provider, .. }
            | ApiError::NetworkError { provider, .. }
            | ApiError::Timeout { provider, .. }
            | ApiError::HttpError { provider, .. }
            | ApiError::Rejected { provider, .. }
            | ApiError::Decode { provider, .. }
            | ApiError::NotConfigured { provider } => provider,
        }
    }

    /// Check if this is a rate limiting error
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }

    /// Get retry-after seconds if rate limited
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    /// Per-field messages attached by the server, keyed by wire field name
    pub fn field_errors(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            ApiError::Rejected { errors, .. } if !errors.is_empty() => Some(errors),
            _ => None,
        }
    }

    /// Message suitable for an alert banner
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected { message, .. } => message.clone(),
            ApiError::NetworkError { .. } => "Network error. Please try again.".to_string(),
            ApiError::Timeout { .. } => {
                "The server took too long to respond. Please try again.".to_string()
            }
            _ => "An unexpected error occurred. Please try again.".to_string(),
        }
    }

    pub fn unauthorized(provider: impl Into<String>) -> Self {
        ApiError::Unauthorized {
            provider: provider.into(),
        }
    }

    pub fn forbidden(provider: impl Into<String>) -> Self {
        ApiError::Forbidden {
            provider: provider.into(),
        }
    }

    pub fn rate_limited(provider: impl Into<String>, retry_after: Option<u64>) -> Self {
        ApiError::RateLimited {
            provider: provider.into(),
            retry_after_secs: retry_after,
        }
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::NetworkError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn timeout(provider: impl Into<String>, secs: u64) -> Self {
        ApiError::Timeout {
            provider: provider.into(),
            secs,
        }
    }

    pub fn http(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ApiError::HttpError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    pub fn rejected(
        provider: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ApiError::Rejected {
            provider: provider.into(),
            code: code.into(),
            message: message.into(),
            errors: BTreeMap::new(),
        }
    }

    pub fn decode(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Decode {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn not_configured(provider: impl Into<String>) -> Self {
        ApiError::NotConfigured {
            provider: provider.into(),
        }
    }

    /// Attach per-field messages to a `Rejected` error
    pub fn with_field_errors(self, field_errors: BTreeMap<String, String>) -> Self {
        match self {
            ApiError::Rejected {
                provider,
                code,
                message,
                ..
            } => ApiError::Rejected {
                provider,
                code,
                message,
                errors: field_errors,
            },
            other => other,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized { provider } => {
                write!(f, "{}: Unauthorized (401) - check the API key", provider)
            }
            ApiError::Forbidden { provider } => {
                write!(
                    f,
                    "{}: Forbidden (403) - insufficient permissions",
                    provider
                )
            }
            ApiError::RateLimited {
                provider,
                retry_after_secs,
            } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "{}: Rate limited - retry after {}s", provider, secs)
                } else {
                    write!(f, "{}: Rate limited", provider)
                }
            }
            ApiError::NetworkError { provider, message } => {
                write!(f, "{}: Network error - {}", provider, message)
            }
            ApiError::Timeout { provider, secs } => {
                write!(f, "{}: Timed out after {}s", provider, secs)
            }
            ApiError::HttpError {
                provider,
                status,
                message,
            } => {
                write!(f, "{}: HTTP {} - {}", provider, status, message)
            }
            ApiError::Rejected {
                provider,
                code,
                message,
                ..
            } => {
                write!(f, "{}: {} - {}", provider, code, message)
            }
            ApiError::Decode { provider, message } => {
                write!(f, "{}: Unexpected response - {}", provider, message)
            }
            ApiError::NotConfigured { provider } => {
                write!(f, "{}: Not configured (no API key)", provider)
            }
        }
    }
}

impl std::error::Error for ApiError {}

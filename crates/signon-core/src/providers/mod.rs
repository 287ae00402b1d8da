//! Identity-provider contract and types shared across client backends.

use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::{SessionEvent, UserIdentity};

pub mod cache;
pub mod loopback;
pub mod rest;

/// Standard User-Agent header for signon API requests.
pub const USER_AGENT: &str = concat!("signon/", env!("CARGO_PKG_VERSION"));

/// Environment variable overriding the configured API key.
pub const API_KEY_ENV: &str = "SIGNON_API_KEY";

/// Environment variable overriding the configured endpoint.
pub const BASE_URL_ENV: &str = "SIGNON_BASE_URL";

/// Environment variable that suppresses browser launches (tests, CI).
pub const NO_BROWSER_ENV: &str = "SIGNON_NO_BROWSER";

/// Endpoint used when neither env nor config provides one.
pub const DEFAULT_BASE_URL: &str = "https://identitytoolkit.googleapis.com";

// ============================================================================
// Config resolution helpers
// ============================================================================

/// Resolves the API key with precedence: config > env.
///
/// # Errors
/// Returns an error if neither source provides a key.
pub fn resolve_api_key(config_api_key: Option<&str>) -> Result<String> {
    // Try config value first
    if let Some(key) = config_api_key {
        let trimmed = key.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    // Fall back to env var
    std::env::var(API_KEY_ENV).context(format!(
        "No API key available. Set {API_KEY_ENV} or api_key in [provider]."
    ))
}

/// Resolves the endpoint base URL with precedence: env > config > default.
///
/// # Errors
/// Returns an error if the winning value is not a well-formed URL.
pub fn resolve_base_url(config_base_url: Option<&str>) -> Result<String> {
    // Try env var first
    if let Ok(env_url) = std::env::var(BASE_URL_ENV) {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.to_string());
        }
    }

    // Try config value
    if let Some(config_url) = config_base_url {
        let trimmed = config_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.to_string());
        }
    }

    // Default
    Ok(DEFAULT_BASE_URL.to_string())
}

/// Validates that a URL is well-formed.
fn validate_url(url: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid provider base URL: {url}"))?;
    Ok(())
}

// ============================================================================
// Errors
// ============================================================================

/// Categories of provider failures for consistent recovery handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The provider understood the request and declined it (wrong
    /// password, code mismatch, rate limit, account conflict).
    Rejected,
    /// The provider could not be reached or answered 5xx.
    Unavailable,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::Rejected => write!(f, "rejected"),
            ProviderErrorKind::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Structured error from the provider with kind and details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    /// Error category
    pub kind: ProviderErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl ProviderError {
    /// Creates a new provider error.
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates a rejection error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Rejected, message)
    }

    /// Creates an unavailability error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unavailable, message)
    }

    /// Creates an error from an HTTP status response.
    ///
    /// 5xx maps to [`ProviderErrorKind::Unavailable`], everything else to
    /// [`ProviderErrorKind::Rejected`].
    pub fn http_status(status: u16, body: &str) -> Self {
        let kind = if status >= 500 {
            ProviderErrorKind::Unavailable
        } else {
            ProviderErrorKind::Rejected
        };
        let message = format!("HTTP {status}");
        let details = if body.is_empty() {
            None
        } else {
            // Try to extract a cleaner error message from JSON
            if let Ok(json) = serde_json::from_str::<Value>(body)
                && let Some(error_obj) = json.get("error")
                && let Some(msg) = error_obj.get("message").and_then(|v| v.as_str())
            {
                return Self {
                    kind,
                    message: format!("HTTP {status}: {msg}"),
                    details: Some(body.to_string()),
                };
            }
            Some(body.to_string())
        };
        Self {
            kind,
            message,
            details,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Result type for provider operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

// ============================================================================
// Contract
// ============================================================================

/// Confirmation handle returned when a verification code is sent.
///
/// Opaque to the flow; the provider round-trips it on confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpTicket {
    pub session_info: String,
}

/// Boxed stream of ambient session events.
pub type SessionStream = BoxStream<'static, SessionEvent>;

/// Contract every identity backend implements.
///
/// All operations are asynchronous and fallible; failures are locally
/// recoverable and never tear down the flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Signs into an existing email account.
    ///
    /// # Errors
    /// Returns an error if the operation fails.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> ProviderResult<UserIdentity>;

    /// Creates a fresh email account.
    ///
    /// # Errors
    /// Returns an error if the operation fails.
    async fn create_account_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> ProviderResult<UserIdentity>;

    /// Runs a federated login round-trip and returns the identity.
    ///
    /// # Errors
    /// Returns an error if the operation fails.
    async fn begin_federated_login(&self) -> ProviderResult<UserIdentity>;

    /// Sends a one-time code to `phone_number`. The challenge token proves
    /// a human solved the widget.
    ///
    /// # Errors
    /// Returns an error if the operation fails.
    async fn send_verification_code(
        &self,
        phone_number: &str,
        challenge_token: &str,
    ) -> ProviderResult<OtpTicket>;

    /// Confirms the code the user entered against an outstanding ticket.
    ///
    /// # Errors
    /// Returns an error if the operation fails.
    async fn confirm_verification_code(
        &self,
        ticket: &OtpTicket,
        code: &str,
    ) -> ProviderResult<UserIdentity>;

    /// Starts linking an email address to an existing account. The
    /// provider sends a verification message; the session itself is not
    /// mutated here.
    ///
    /// # Errors
    /// Returns an error if the operation fails.
    async fn associate_email(&self, user_id: &str, email: &str) -> ProviderResult<()>;

    /// Ambient session transitions, emitted in provider order.
    fn session_events(&self) -> SessionStream;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: 4xx responses become rejections with the body's message.
    #[test]
    fn http_status_rejection_extracts_message() {
        let err = ProviderError::http_status(
            400,
            r#"{"error":{"code":400,"message":"INVALID_PASSWORD"}}"#,
        );
        assert_eq!(err.kind, ProviderErrorKind::Rejected);
        assert_eq!(err.message, "HTTP 400: INVALID_PASSWORD");
        assert!(err.details.is_some());
    }

    /// Test: 5xx responses become unavailability.
    #[test]
    fn http_status_maps_5xx_to_unavailable() {
        let err = ProviderError::http_status(503, "");
        assert_eq!(err.kind, ProviderErrorKind::Unavailable);
        assert_eq!(err.message, "HTTP 503");
        assert_eq!(err.details, None);
    }

    /// Test: non-JSON bodies are kept verbatim as details.
    #[test]
    fn http_status_keeps_opaque_body() {
        let err = ProviderError::http_status(429, "slow down");
        assert_eq!(err.kind, ProviderErrorKind::Rejected);
        assert_eq!(err.message, "HTTP 429");
        assert_eq!(err.details.as_deref(), Some("slow down"));
    }

    /// Test: config key wins over the environment; whitespace is ignored.
    #[test]
    fn api_key_prefers_config() {
        assert_eq!(resolve_api_key(Some("km-123")).unwrap(), "km-123");
        assert_eq!(resolve_api_key(Some("  km-456  ")).unwrap(), "km-456");
    }

    /// Test: empty config falls through to the env var, absence errors.
    #[test]
    fn api_key_env_fallback() {
        unsafe {
            std::env::remove_var(API_KEY_ENV);
        }
        assert!(resolve_api_key(Some("   ")).is_err());

        unsafe {
            std::env::set_var(API_KEY_ENV, "env-key");
        }
        assert_eq!(resolve_api_key(None).unwrap(), "env-key");
        unsafe {
            std::env::remove_var(API_KEY_ENV);
        }
    }

    /// Test: base URL precedence is env > config > default, with
    /// validation on the winner.
    #[test]
    fn base_url_precedence() {
        unsafe {
            std::env::remove_var(BASE_URL_ENV);
        }
        assert_eq!(resolve_base_url(None).unwrap(), DEFAULT_BASE_URL);
        assert_eq!(
            resolve_base_url(Some("https://emulator.local:9099")).unwrap(),
            "https://emulator.local:9099"
        );
        assert!(resolve_base_url(Some("not a url")).is_err());

        unsafe {
            std::env::set_var(BASE_URL_ENV, "https://env.example.com");
        }
        assert_eq!(
            resolve_base_url(Some("https://config.example.com")).unwrap(),
            "https://env.example.com"
        );
        unsafe {
            std::env::remove_var(BASE_URL_ENV);
        }
    }
}

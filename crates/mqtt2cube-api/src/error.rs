use thiserror::Error;

/// Hub error code for "no such device" on directory operations.
pub const HUB_NOT_FOUND: i64 = 110_000;

/// Top-level error type for the `mqtt2cube-api` crate.
///
/// Covers every failure mode of the hub's open API: authorization,
/// transport, envelope errors, and third-party event rejections.
/// `mqtt2cube-core` maps these into bridge-level outcomes.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The hub rejected the bearer token (envelope 400/401, HTTP 401,
    /// or an `Authorization is invalid` event response).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Open API envelope ───────────────────────────────────────────
    /// Non-zero `error` in the `{error, data, message}` envelope.
    #[error("Hub API error {code}: {message}")]
    Hub { code: i64, message: String },

    // ── Third-party events ──────────────────────────────────────────
    /// The hub refused the event payload (`INVALID_PARAMETERS`).
    #[error("Hub rejected event parameters: {description}")]
    InvalidParameters { description: String },

    /// Any other `ErrorResponse` to a third-party event.
    #[error("Hub returned {kind}: {description}")]
    EventRejected { kind: String, description: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the stored token is no longer accepted and
    /// must be cleared.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if the hub could not be reached at all.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the hub reported the device as unknown.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Hub { code, .. } => *code == HUB_NOT_FOUND,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }

    /// Extract the hub's numeric error code, if available.
    pub fn hub_error_code(&self) -> Option<i64> {
        match self {
            Self::Hub { code, .. } => Some(*code),
            _ => None,
        }
    }
}

use thiserror::Error;

/// Top-level error type for the `ihcbridge-api` crate.
///
/// Covers every failure mode of the IHC SOAP services: authentication,
/// transport, SOAP faults, and response decoding. `ihcbridge-core` maps
/// these into bridge-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected, or a call was refused because the session is gone.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-success HTTP status from a SOAP endpoint.
    #[error("{action} returned HTTP {status}")]
    Http { action: String, status: u16 },

    // ── SOAP ────────────────────────────────────────────────────────
    /// The controller answered with a SOAP `Fault` element.
    #[error("SOAP fault from {action}: {message}")]
    Fault { action: String, message: String },

    /// The response body was not the envelope we expected, with the raw
    /// body for debugging.
    #[error("Malformed {action} response: {message}")]
    Deserialization {
        action: String,
        message: String,
        body: String,
    },

    // ── Project ─────────────────────────────────────────────────────
    /// The project payload could not be base64/gzip decoded.
    #[error("Project decode failed: {0}")]
    ProjectDecode(String),
}

impl Error {
    /// Returns `true` if re-authenticating might resolve this error.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

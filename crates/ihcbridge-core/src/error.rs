// ── Core error types ──
//
// Bridge-level errors. Consumers never see SOAP faults or HTTP status
// codes directly; the `From<ihcbridge_api::Error>` impl translates
// transport-layer errors into these variants.

use std::path::PathBuf;

use thiserror::Error;

use crate::gateway::GatewayState;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Project description ──────────────────────────────────────────
    #[error("Project description is not well-formed XML: {reason}")]
    MalformedProject { reason: String },

    #[error("Project node <{node}> is missing required attribute '{attribute}'")]
    MalformedProjectNode {
        node: String,
        attribute: &'static str,
    },

    #[error("Malformed resource id '{raw}': expected a type character followed by hex digits")]
    MalformedResourceId { raw: String },

    #[error("Resource id '{raw}' ({id}) appears more than once in the project")]
    DuplicateResourceId { raw: String, id: u32 },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Cannot connect to controller at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Cannot connect to MQTT broker at {address}: {reason}")]
    BrokerConnect { address: String, reason: String },

    #[error("MQTT broker error: {message}")]
    Broker { message: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("TLS setup failed: {reason}")]
    Tls { reason: String },

    // ── Setup errors ─────────────────────────────────────────────────
    #[error("Cannot write mapping log {}: {source}", path.display())]
    AuditLogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot {operation} while the gateway is {state}")]
    InvalidState {
        operation: &'static str,
        state: GatewayState,
    },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation rejected by controller: {message}")]
    Rejected { message: String },

    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Errors caused by the project description rather than by a
    /// collaborator.
    pub fn is_project_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedProject { .. }
                | Self::MalformedProjectNode { .. }
                | Self::MalformedResourceId { .. }
                | Self::DuplicateResourceId { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ihcbridge_api::Error> for CoreError {
    fn from(err: ihcbridge_api::Error) -> Self {
        match err {
            ihcbridge_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            ihcbridge_api::Error::Transport(ref e) => {
                let url = e
                    .url()
                    .map_or_else(|| "<unknown>".into(), ToString::to_string);
                if e.is_timeout() {
                    CoreError::Timeout { url }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url,
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ihcbridge_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ihcbridge_api::Error::Tls(reason) => CoreError::Tls { reason },
            ihcbridge_api::Error::Http { action, status } => CoreError::Api {
                message: format!("{action} failed"),
                status: Some(status),
            },
            ihcbridge_api::Error::Fault { action, message } => CoreError::Api {
                message: format!("{action}: {message}"),
                status: None,
            },
            ihcbridge_api::Error::Deserialization { action, message, body: _ } => {
                CoreError::Internal(format!("Unreadable {action} response: {message}"))
            }
            ihcbridge_api::Error::ProjectDecode(reason) => CoreError::MalformedProject { reason },
        }
    }
}

impl From<rumqttc::ClientError> for CoreError {
    fn from(err: rumqttc::ClientError) -> Self {
        CoreError::Broker {
            message: err.to_string(),
        }
    }
}

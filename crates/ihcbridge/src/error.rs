//! CLI error types with miette diagnostics.
//!
//! Maps config and core errors into user-facing errors with actionable
//! help text and a distinct process exit code per failure class.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use ihcbridge_config::ConfigError;
use ihcbridge_core::CoreError;

/// Process exit codes. Usage errors exit with 2 from clap itself.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 3;
    pub const AUTH: i32 = 4;
    pub const CONNECTION: i32 = 5;
    pub const PROJECT: i32 = 6;
    pub const MAPPING_LOG: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(ihcbridge::config),
        help(
            "Required keys: broker_host, broker_port, controller_url,\n\
             controller_username, controller_password.\n\
             Set them in the config file (-c) or as IHCBRIDGE_<KEY> variables."
        )
    )]
    Config(#[from] ConfigError),

    #[error("Invalid setting: {message}")]
    #[diagnostic(code(ihcbridge::invalid_setting))]
    InvalidSetting { message: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(ihcbridge::auth_failed),
        help(
            "Check controller_username and controller_password.\n\
             The password may also live in the system keyring under\n\
             service 'ihcbridge', account '<username>@<controller host>'."
        )
    )]
    AuthFailed { message: String },

    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach {target}: {reason}")]
    #[diagnostic(
        code(ihcbridge::connection_failed),
        help("Check that the host is running and reachable from this machine.")
    )]
    ConnectionFailed { target: String, reason: String },

    // ── Project / mapping ────────────────────────────────────────────

    #[error("Unusable project description: {message}")]
    #[diagnostic(
        code(ihcbridge::project),
        help(
            "The controller's project could not be turned into topics.\n\
             Re-export it from the IHC tool."
        )
    )]
    Project { message: String },

    #[error("Cannot write mapping log {}", path.display())]
    #[diagnostic(
        code(ihcbridge::mapping_log),
        help("Check that the directory exists and is writable, or drop the mapfile setting.")
    )]
    MappingLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Everything else ──────────────────────────────────────────────

    #[error("{message}")]
    #[diagnostic(code(ihcbridge::bridge))]
    Bridge { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Cannot render JSON: {0}")]
    #[diagnostic(code(ihcbridge::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::InvalidSetting { .. } => exit_code::CONFIG,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Project { .. } => exit_code::PROJECT,
            Self::MappingLog { .. } => exit_code::MAPPING_LOG,
            Self::Bridge { .. } | Self::Io(_) | Self::Json(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        if err.is_project_error() {
            return CliError::Project {
                message: err.to_string(),
            };
        }

        match err {
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                target: url,
                reason,
            },

            CoreError::BrokerConnect { address, reason } => CliError::ConnectionFailed {
                target: format!("MQTT broker {address}"),
                reason,
            },

            CoreError::Broker { message } => CliError::ConnectionFailed {
                target: "MQTT broker".into(),
                reason: message,
            },

            CoreError::Timeout { url } => CliError::ConnectionFailed {
                target: url,
                reason: "request timed out".into(),
            },

            CoreError::Tls { reason } => CliError::InvalidSetting {
                message: format!("controller TLS: {reason}"),
            },

            CoreError::AuditLogWrite { path, source } => CliError::MappingLog { path, source },

            CoreError::Config { message } => CliError::InvalidSetting { message },

            other => CliError::Bridge {
                message: other.to_string(),
            },
        }
    }
}

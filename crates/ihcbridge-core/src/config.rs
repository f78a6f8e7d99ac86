// ── Runtime connection configuration ──
//
// These types describe *how* to reach the controller and the broker and
// how to name topics. They carry credential data and connection tuning,
// but never touch disk. The binary builds them through `ihcbridge-config`
// and hands them in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// Topic prefix used when none is configured.
pub const DEFAULT_TOPIC_PREFIX: &str = "house";

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs). Default for IHC controllers.
    #[default]
    DangerAcceptInvalid,
}

/// Configuration for connecting to one IHC controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Controller URL (e.g., `https://192.168.1.100`).
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Request timeout. Must exceed `notify_wait_secs`.
    pub timeout: Duration,
    /// Server-side wait per notification long-poll (seconds).
    pub notify_wait_secs: u32,
}

/// Configuration for connecting to one MQTT broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// MQTT client id. Defaults to `ihcbridge-<pid>`.
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub keep_alive: Duration,
    /// How long `connect` waits for the broker's CONNACK.
    pub connect_timeout: Duration,
    /// Publish state messages with the retain flag.
    pub retain: bool,
}

impl BrokerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: None,
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            retain: false,
        }
    }

    /// `host:port`, for logs and errors.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn effective_client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("ihcbridge-{}", std::process::id()))
    }
}

/// Naming and auditing settings owned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    pub topic_prefix: String,
    /// Optional mapping log, rewritten on every controller attachment.
    pub mapping_log: Option<PathBuf>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            topic_prefix: DEFAULT_TOPIC_PREFIX.into(),
            mapping_log: None,
        }
    }
}

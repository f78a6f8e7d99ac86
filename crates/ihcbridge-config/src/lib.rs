//! Configuration for the ihcbridge gateway.
//!
//! One flat set of keys, read from a TOML file (`*.toml`) or a legacy
//! `key=value` properties file, overridden by `IHCBRIDGE_<KEY>`
//! environment variables and finally by command-line values. The merged
//! [`RawConfig`] is validated as a unit into [`Settings`], the runtime
//! configuration `ihcbridge-core` consumes.

mod lenient;
pub mod properties;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use ihcbridge_core::{BridgeSettings, BrokerConfig, ControllerConfig, TlsVerification};
use ihcbridge_core::config::DEFAULT_TOPIC_PREFIX;

/// Environment variable prefix for every key.
pub const ENV_PREFIX: &str = "IHCBRIDGE_";
/// Keyring service under which controller passwords are stored.
pub const KEYRING_SERVICE: &str = "ihcbridge";

const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;
const MIN_KEEP_ALIVE_SECS: u64 = 5;
const DEFAULT_CONTROLLER_TIMEOUT_SECS: u64 = 30;
/// Server-side wait of each notification long-poll.
const NOTIFY_WAIT_SECS: u32 = 10;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", keys.join(", "))]
    MissingKeys { keys: Vec<&'static str> },

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Raw configuration ───────────────────────────────────────────────

/// Every key as text, exactly as the sources provided it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RawConfig {
    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub broker_host: Option<String>,
    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub broker_port: Option<String>,
    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub broker_username: Option<String>,
    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub broker_password: Option<String>,
    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub broker_client_id: Option<String>,
    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub broker_keep_alive: Option<String>,
    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub retain: Option<String>,

    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub controller_url: Option<String>,
    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub controller_username: Option<String>,
    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub controller_password: Option<String>,
    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub controller_insecure: Option<String>,
    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub controller_ca_cert: Option<String>,
    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub controller_timeout: Option<String>,

    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub topic_prefix: Option<String>,
    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub mapfile: Option<String>,
}

/// Values given on the command line. They override every other source.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapfile: Option<String>,
}

// ── Validated settings ──────────────────────────────────────────────

/// Runtime configuration for one gateway process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub broker: BrokerConfig,
    pub controller: ControllerConfig,
    pub bridge: BridgeSettings,
}

// ── Config file path ────────────────────────────────────────────────

/// Default config file location via XDG / platform conventions.
pub fn default_config_path() -> PathBuf {
    ProjectDirs::from("org", "ihcbridge", "ihcbridge").map_or_else(
        || PathBuf::from("ihcbridge.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

// ── Loading ─────────────────────────────────────────────────────────

/// Merge file, environment and overrides into a [`RawConfig`].
///
/// An explicit `path` must exist. Without one, the default path is used
/// when present and skipped otherwise.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<RawConfig, ConfigError> {
    let file = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::NotFound {
                path: p.to_path_buf(),
            });
        }
        Some(p) => Some(p.to_path_buf()),
        None => Some(default_config_path()).filter(|p| p.exists()),
    };

    let mut figment = Figment::new();
    if let Some(file) = &file {
        debug!(path = %file.display(), "reading config file");
        figment = if is_toml(file) {
            figment.merge(Toml::file(file))
        } else {
            let text = std::fs::read_to_string(file)?;
            figment.merge(Serialized::defaults(properties::parse(&text)))
        };
    }

    let config = figment
        .merge(Serialized::defaults(env_layer()))
        .merge(Serialized::defaults(overrides))
        .extract()?;
    Ok(config)
}

/// `IHCBRIDGE_<KEY>` variables as text, exactly as set.
///
/// figment's `Env` provider parses values, turning `007` into `7`; the raw
/// pairs keep secrets and topic prefixes verbatim.
fn env_layer() -> BTreeMap<String, String> {
    Env::prefixed(ENV_PREFIX)
        .ignore(&["config"])
        .iter()
        .map(|(key, value)| (key.as_str().to_ascii_lowercase(), value))
        .collect()
}

/// Load and validate in one step, with keyring lookup for the password.
pub fn load_settings(path: Option<&Path>, overrides: &Overrides) -> Result<Settings, ConfigError> {
    load(path, overrides)?.validate()
}

// ── Validation ──────────────────────────────────────────────────────

impl RawConfig {
    /// Validate, falling back to the system keyring for a missing
    /// controller password.
    pub fn validate(self) -> Result<Settings, ConfigError> {
        self.validate_with(keyring_password)
    }

    /// Validate with a custom password lookup `(service, account) -> password`.
    ///
    /// Reports every missing mandatory key at once, then checks values.
    pub fn validate_with<F>(self, password_lookup: F) -> Result<Settings, ConfigError>
    where
        F: Fn(&str, &str) -> Option<String>,
    {
        let controller_password = self.controller_password.clone().or_else(|| {
            let username = self.controller_username.as_deref()?;
            let url = Url::parse(self.controller_url.as_deref()?).ok()?;
            let account = format!("{username}@{}", url.host_str()?);
            let found = password_lookup(KEYRING_SERVICE, &account);
            if found.is_some() {
                debug!(account = %account, "controller password taken from keyring");
            }
            found
        });

        let mut missing = Vec::new();
        for (key, value) in [
            ("broker_host", &self.broker_host),
            ("broker_port", &self.broker_port),
            ("controller_url", &self.controller_url),
            ("controller_username", &self.controller_username),
            ("controller_password", &controller_password),
        ] {
            if value.is_none() {
                missing.push(key);
            }
        }

        let (
            Some(broker_host),
            Some(broker_port),
            Some(controller_url),
            Some(controller_username),
            Some(controller_password),
        ) = (
            self.broker_host,
            self.broker_port,
            self.controller_url,
            self.controller_username,
            controller_password,
        )
        else {
            return Err(ConfigError::MissingKeys { keys: missing });
        };

        let url = Url::parse(&controller_url).map_err(|e| ConfigError::Validation {
            field: "controller_url",
            reason: format!("'{controller_url}' is not a URL: {e}"),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation {
                field: "controller_url",
                reason: format!("expected an http or https URL, got '{controller_url}'"),
            });
        }
        let port = parse_number::<u16>("broker_port", &broker_port)?;
        if port == 0 {
            return Err(ConfigError::Validation {
                field: "broker_port",
                reason: "port must be between 1 and 65535".into(),
            });
        }

        let keep_alive = optional_number("broker_keep_alive", self.broker_keep_alive.as_deref())?
            .unwrap_or(DEFAULT_KEEP_ALIVE_SECS);
        if keep_alive < MIN_KEEP_ALIVE_SECS {
            return Err(ConfigError::Validation {
                field: "broker_keep_alive",
                reason: format!("must be at least {MIN_KEEP_ALIVE_SECS} seconds"),
            });
        }
        let timeout = optional_number("controller_timeout", self.controller_timeout.as_deref())?
            .unwrap_or(DEFAULT_CONTROLLER_TIMEOUT_SECS);
        if timeout <= u64::from(NOTIFY_WAIT_SECS) {
            return Err(ConfigError::Validation {
                field: "controller_timeout",
                reason: format!("must exceed the {NOTIFY_WAIT_SECS}s notification wait"),
            });
        }
        let retain = optional_bool("retain", self.retain.as_deref())?.unwrap_or(false);
        let insecure = optional_bool("controller_insecure", self.controller_insecure.as_deref())?
            .unwrap_or(true);

        // A CA certificate implies verification.
        let tls = match self.controller_ca_cert {
            Some(ca) => TlsVerification::CustomCa(PathBuf::from(ca)),
            None if insecure => TlsVerification::DangerAcceptInvalid,
            None => TlsVerification::SystemDefaults,
        };

        let broker = BrokerConfig {
            client_id: self.broker_client_id,
            username: self.broker_username,
            password: self.broker_password.map(SecretString::from),
            keep_alive: Duration::from_secs(keep_alive),
            retain,
            ..BrokerConfig::new(broker_host, port)
        };

        let controller = ControllerConfig {
            url,
            username: controller_username,
            password: SecretString::from(controller_password),
            tls,
            timeout: Duration::from_secs(timeout),
            notify_wait_secs: NOTIFY_WAIT_SECS,
        };

        let bridge = BridgeSettings {
            topic_prefix: self
                .topic_prefix
                .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_owned()),
            mapping_log: self.mapfile.map(PathBuf::from),
        };

        Ok(Settings {
            broker,
            controller,
            bridge,
        })
    }
}

fn keyring_password(service: &str, account: &str) -> Option<String> {
    keyring::Entry::new(service, account)
        .ok()?
        .get_password()
        .ok()
}

fn parse_number<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field,
        reason: format!("expected a number, got '{raw}'"),
    })
}

fn optional_number(field: &'static str, raw: Option<&str>) -> Result<Option<u64>, ConfigError> {
    raw.map(|r| parse_number(field, r)).transpose()
}

fn optional_bool(field: &'static str, raw: Option<&str>) -> Result<Option<bool>, ConfigError> {
    raw.map(|r| match r.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::Validation {
            field,
            reason: format!("expected true or false, got '{r}'"),
        }),
    })
    .transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn complete() -> RawConfig {
        RawConfig {
            broker_host: Some("localhost".into()),
            broker_port: Some("1883".into()),
            controller_url: Some("https://192.168.1.100".into()),
            controller_username: Some("admin".into()),
            controller_password: Some("secret".into()),
            ..RawConfig::default()
        }
    }

    fn no_keyring(_: &str, _: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_fill_optional_keys() {
        let settings = complete().validate_with(no_keyring).unwrap();
        assert_eq!(settings.broker.address(), "localhost:1883");
        assert_eq!(settings.broker.keep_alive, Duration::from_secs(30));
        assert!(!settings.broker.retain);
        assert!(settings.broker.client_id.is_none());
        assert_eq!(settings.controller.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(settings.controller.timeout, Duration::from_secs(30));
        assert_eq!(settings.bridge, BridgeSettings::default());
    }

    #[test]
    fn all_missing_keys_are_reported_together() {
        let err = RawConfig {
            broker_host: Some("localhost".into()),
            ..RawConfig::default()
        }
        .validate_with(no_keyring)
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required configuration: broker_port, controller_url, \
             controller_username, controller_password"
        );
    }

    #[test]
    fn password_falls_back_to_keyring() {
        let raw = RawConfig {
            controller_password: None,
            ..complete()
        };
        let settings = raw
            .validate_with(|service, account| {
                assert_eq!(service, "ihcbridge");
                (account == "admin@192.168.1.100").then(|| "from-keyring".to_owned())
            })
            .unwrap();
        assert_eq!(settings.controller.password.expose_secret(), "from-keyring");
    }

    #[test]
    fn configured_password_wins_over_keyring() {
        let settings = complete()
            .validate_with(|_, _| Some("keyring".into()))
            .unwrap();
        assert_eq!(settings.controller.password.expose_secret(), "secret");
    }

    #[test]
    fn bad_values_name_their_key() {
        let cases: [(fn(&mut RawConfig), &str); 7] = [
            (|r| r.broker_port = Some("abc".into()), "broker_port"),
            (|r| r.broker_port = Some("0".into()), "broker_port"),
            (|r| r.controller_url = Some("not a url".into()), "controller_url"),
            (|r| r.controller_url = Some("ftp://x".into()), "controller_url"),
            (|r| r.retain = Some("maybe".into()), "retain"),
            (|r| r.controller_timeout = Some("10".into()), "controller_timeout"),
            (|r| r.broker_keep_alive = Some("2".into()), "broker_keep_alive"),
        ];
        for (spoil, expected) in cases {
            let mut raw = complete();
            spoil(&mut raw);
            match raw.validate_with(no_keyring) {
                Err(ConfigError::Validation { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected validation error for {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn ca_cert_enables_verification() {
        let settings = RawConfig {
            controller_ca_cert: Some("/etc/ihc/ca.pem".into()),
            ..complete()
        }
        .validate_with(no_keyring)
        .unwrap();
        assert_eq!(
            settings.controller.tls,
            TlsVerification::CustomCa("/etc/ihc/ca.pem".into())
        );

        let settings = RawConfig {
            controller_insecure: Some("false".into()),
            ..complete()
        }
        .validate_with(no_keyring)
        .unwrap();
        assert_eq!(settings.controller.tls, TlsVerification::SystemDefaults);
    }

    #[test]
    fn toml_extension_is_case_insensitive() {
        assert!(is_toml(Path::new("/etc/ihcbridge/config.TOML")));
        assert!(!is_toml(Path::new("/etc/ihcbridge/gateway.properties")));
        assert!(!is_toml(Path::new("/etc/ihcbridge/gateway")));
    }
}

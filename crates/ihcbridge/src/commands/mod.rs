//! Command handlers.

pub mod run;
pub mod topics;

use ihcbridge_config::{Overrides, Settings};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve settings from the config file, environment and global flags.
fn load_settings(global: &GlobalOpts) -> Result<Settings, CliError> {
    let overrides = Overrides {
        topic_prefix: global.topic_prefix.clone(),
        mapfile: global
            .mapfile
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned()),
    };
    let settings = ihcbridge_config::load_settings(global.config.as_deref(), &overrides)?;
    tracing::debug!(
        broker = %settings.broker.address(),
        controller = %settings.controller.url,
        prefix = %settings.bridge.topic_prefix,
        "configuration resolved"
    );
    Ok(settings)
}

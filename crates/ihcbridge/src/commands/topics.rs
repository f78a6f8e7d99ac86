//! `topics`: print the resource/topic mapping without touching MQTT.

use ihcbridge_core::{ControllerLink, IhcController, TopicNamespace, load_bridge_table};

use crate::cli::{GlobalOpts, TopicsArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: &TopicsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = super::load_settings(global)?;
    let namespace = TopicNamespace::new(settings.bridge.topic_prefix.clone());

    let controller = IhcController::new(settings.controller)?;
    let loaded = load_bridge_table(&controller, &namespace, true).await;
    if let Err(e) = controller.disconnect().await {
        tracing::warn!(error = %e, "controller did not disconnect cleanly");
    }
    let table = loaded?;

    if let Some(path) = &settings.bridge.mapping_log {
        ihcbridge_core::audit::write_mapping_log(path, &table)?;
    }

    let rendered = output::render_bindings(args.output, table.as_slice())?;
    output::print_output(&rendered);
    Ok(())
}

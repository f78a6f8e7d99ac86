// ── Collaborator seams ──
//
// The gateway talks to the controller and the broker only through these
// traits. Concrete implementations live in `controller` (IHC SOAP) and
// `broker` (MQTT); tests substitute recording fakes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::model::ResourceId;

/// Receives controller value changes.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    async fn on_change(&self, resource: ResourceId, value: bool);
}

/// Receives inbound broker messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn on_message(&self, topic: &str, payload: &[u8]);
}

/// An authenticated-on-demand connection to one home-automation controller.
#[async_trait]
pub trait ControllerLink: Send + Sync {
    /// Log in. `Ok(false)` means the controller rejected the credentials.
    async fn authenticate(&self) -> Result<bool, CoreError>;

    /// The project description as XML text.
    async fn project_description(&self) -> Result<String, CoreError>;

    /// Deliver changes of `resource` to `sink`.
    ///
    /// With `deliver_initial` the current value is delivered as soon as
    /// the controller reports it; otherwise only later changes are.
    /// Registering the same resource again replaces the previous sink.
    fn register_change_handler(
        &self,
        resource: ResourceId,
        sink: Arc<dyn ChangeSink>,
        deliver_initial: bool,
    );

    async fn write_bool(&self, resource: ResourceId, value: bool) -> Result<(), CoreError>;

    /// Stop delivering changes and end the session.
    async fn disconnect(&self) -> Result<(), CoreError>;
}

/// A connected publish/subscribe client with a running delivery loop.
#[async_trait]
pub trait BrokerLink: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), CoreError>;

    /// Route messages on exactly `topic` to `sink`. A later registration
    /// for the same topic replaces the earlier one.
    fn register_topic_handler(&self, topic: &str, sink: Arc<dyn MessageSink>);

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), CoreError>;

    /// Stop the delivery loop and disconnect.
    async fn stop(&self) -> Result<(), CoreError>;
}

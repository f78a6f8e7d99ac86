//! Bridge core between an IHC controller and an MQTT broker.
//!
//! - **[`Gateway`]** owns the broker and controller handles and drives the
//!   `Empty → BrokerAttached → Bridged → Closed` lifecycle. Attaching a
//!   controller authenticates, downloads the project description, extracts
//!   the [`BridgeTable`], writes the optional mapping log and registers
//!   every [`Binding`] through one shared [`Router`].
//!
//! - **Collaborator seams** ([`ControllerLink`], [`BrokerLink`]) keep the
//!   core independent of the wire protocols. [`IhcController`] and
//!   [`MqttBroker`] are the production implementations.
//!
//! - **Naming** ([`sanitize`], [`TopicNamespace`]) maps the project
//!   hierarchy onto `<prefix>/<group>/<product>-<position>/<point>/state`
//!   and `.../command` topics.

pub mod audit;
pub mod broker;
pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod link;
pub mod model;
pub mod project;
pub mod registrar;
pub mod sanitize;
pub mod topic;

// ── Primary re-exports ──────────────────────────────────────────────
pub use broker::MqttBroker;
pub use config::{BridgeSettings, BrokerConfig, ControllerConfig, TlsVerification};
pub use controller::IhcController;
pub use error::CoreError;
pub use gateway::{Gateway, GatewayState, load_bridge_table};
pub use link::{BrokerLink, ChangeSink, ControllerLink, MessageSink};
pub use model::{Binding, BridgeTable, Direction, HierarchyPath, ResourceId, ResourceRef};
pub use project::extract_bindings;
pub use registrar::Router;
pub use sanitize::sanitize;
pub use topic::TopicNamespace;

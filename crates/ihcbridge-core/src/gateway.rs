// ── Gateway lifecycle ──
//
// Owns the broker and controller handles and the current bridge table.
// The broker must be attached before the controller for commands to be
// bridged; a controller attached alone is bridged publish-side only, and
// its state deliveries are dropped.
//
//   Empty ──attach_broker──▶ BrokerAttached ──attach_controller──▶ Bridged
//     └──────────────attach_controller──────────────────────────────┘
//   any ──close──▶ Closed

use std::sync::Arc;

use strum::Display;
use tracing::{error, info, warn};

use crate::audit::write_mapping_log;
use crate::broker::MqttBroker;
use crate::config::{BridgeSettings, BrokerConfig, ControllerConfig};
use crate::controller::IhcController;
use crate::error::CoreError;
use crate::link::{BrokerLink, ControllerLink};
use crate::model::BridgeTable;
use crate::project::extract_bindings;
use crate::registrar::{Router, register_bindings};
use crate::topic::TopicNamespace;

/// Lifecycle stage of a [`Gateway`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum GatewayState {
    Empty,
    BrokerAttached,
    Bridged,
    Closed,
}

/// Authenticate against `controller`, download its project and extract
/// the bridge table. Nothing is registered.
pub async fn load_bridge_table(
    controller: &dyn ControllerLink,
    namespace: &TopicNamespace,
    commands_enabled: bool,
) -> Result<BridgeTable, CoreError> {
    if !controller.authenticate().await? {
        return Err(CoreError::AuthenticationFailed {
            message: "controller rejected the credentials".into(),
        });
    }
    let xml = controller.project_description().await?;
    extract_bindings(&xml, namespace, commands_enabled)
}

/// The bridge between one controller and one broker.
pub struct Gateway {
    settings: BridgeSettings,
    namespace: TopicNamespace,
    state: GatewayState,
    broker: Option<Arc<dyn BrokerLink>>,
    controller: Option<Arc<dyn ControllerLink>>,
    router: Option<Arc<Router>>,
    table: Option<Arc<BridgeTable>>,
}

impl Gateway {
    pub fn new(settings: BridgeSettings) -> Self {
        let namespace = TopicNamespace::new(settings.topic_prefix.clone());
        Self {
            settings,
            namespace,
            state: GatewayState::Empty,
            broker: None,
            controller: None,
            router: None,
            table: None,
        }
    }

    pub fn state(&self) -> GatewayState {
        self.state
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn namespace(&self) -> &TopicNamespace {
        &self.namespace
    }

    /// The bridge table of the current controller attachment.
    pub fn table(&self) -> Option<Arc<BridgeTable>> {
        self.table.clone()
    }

    pub fn has_broker(&self) -> bool {
        self.broker.is_some()
    }

    pub fn has_controller(&self) -> bool {
        self.controller.is_some()
    }

    // ── Broker ───────────────────────────────────────────────────────

    /// Connect an MQTT broker and attach it.
    pub async fn connect_broker(&mut self, config: &BrokerConfig) -> Result<(), CoreError> {
        self.check_broker_attachable()?;
        let broker = MqttBroker::connect(config).await?;
        self.attach_broker(Arc::new(broker)).await
    }

    /// Attach a connected broker. A previously attached broker is stopped.
    pub async fn attach_broker(&mut self, broker: Arc<dyn BrokerLink>) -> Result<(), CoreError> {
        self.check_broker_attachable()?;
        if let Some(previous) = self.broker.replace(broker) {
            if let Err(e) = previous.stop().await {
                warn!(error = %e, "failed to stop replaced broker");
            }
        }
        self.state = GatewayState::BrokerAttached;
        info!("broker attached");
        Ok(())
    }

    fn check_broker_attachable(&self) -> Result<(), CoreError> {
        match self.state {
            GatewayState::Empty | GatewayState::BrokerAttached => Ok(()),
            state => Err(CoreError::InvalidState {
                operation: "attach a broker",
                state,
            }),
        }
    }

    // ── Controller ───────────────────────────────────────────────────

    /// Build an IHC controller client and attach it.
    pub async fn connect_controller(&mut self, config: ControllerConfig) -> Result<(), CoreError> {
        self.check_controller_attachable()?;
        info!(url = %config.url, username = %config.username, "connecting to controller");
        let controller = IhcController::new(config)?;
        self.attach_controller(Arc::new(controller)).await
    }

    /// Authenticate, extract the project, write the mapping log and
    /// register every binding.
    ///
    /// On a bridged gateway this is a reconnection: the previous router is
    /// closed and the previous controller disconnected once the new table
    /// is ready. Re-attaching the controller that is already bridged keeps
    /// its session and only swaps the router. Errors before that point
    /// leave the gateway unchanged.
    pub async fn attach_controller(
        &mut self,
        controller: Arc<dyn ControllerLink>,
    ) -> Result<(), CoreError> {
        self.check_controller_attachable()?;
        let reattach = self
            .controller
            .as_ref()
            .is_some_and(|current| same_link(current, &controller));

        let table = match self.prepare(controller.as_ref()).await {
            Ok(table) => Arc::new(table),
            Err(e) => {
                if matches!(e, CoreError::AuthenticationFailed { .. }) {
                    error!(error = %e, "cannot authenticate to controller");
                }
                if !reattach {
                    if let Err(disconnect_err) = controller.disconnect().await {
                        warn!(error = %disconnect_err, "failed to release rejected controller");
                    }
                }
                return Err(e);
            }
        };

        if reattach {
            // Same session: registrations are replaced below, not torn down.
            if let Some(router) = self.router.take() {
                router.close();
            }
            self.controller = None;
        } else {
            self.release_controller().await;
        }

        let router = Arc::new(Router::new(&table, &controller, self.broker.as_ref()));
        register_bindings(&table, &router, controller.as_ref(), self.broker.as_deref()).await;

        info!(
            bindings = table.len(),
            commands = table.command_bindings().count(),
            "controller bridged"
        );
        self.controller = Some(controller);
        self.router = Some(router);
        self.table = Some(table);
        self.state = GatewayState::Bridged;
        Ok(())
    }

    fn check_controller_attachable(&self) -> Result<(), CoreError> {
        match self.state {
            GatewayState::Closed => Err(CoreError::InvalidState {
                operation: "attach a controller",
                state: self.state,
            }),
            _ => Ok(()),
        }
    }

    /// Everything that can fail without side effects on the gateway.
    async fn prepare(&self, controller: &dyn ControllerLink) -> Result<BridgeTable, CoreError> {
        let table = load_bridge_table(controller, &self.namespace, self.broker.is_some()).await?;
        if let Some(path) = &self.settings.mapping_log {
            write_mapping_log(path, &table)?;
        }
        Ok(table)
    }

    /// Close the current router and disconnect the current controller.
    async fn release_controller(&mut self) {
        if let Some(router) = self.router.take() {
            router.close();
        }
        if let Some(controller) = self.controller.take() {
            if let Err(e) = controller.disconnect().await {
                warn!(error = %e, "controller disconnect failed");
            }
        }
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Release both collaborators. Closing a closed gateway does nothing.
    ///
    /// A failing controller disconnect is logged and does not keep the
    /// broker running; a failing broker stop is returned after the gateway
    /// has moved to `Closed`.
    pub async fn close(&mut self) -> Result<(), CoreError> {
        if self.state == GatewayState::Closed {
            return Ok(());
        }
        info!(state = %self.state, "closing gateway");

        self.release_controller().await;
        let result = match self.broker.take() {
            Some(broker) => broker.stop().await,
            None => Ok(()),
        };

        self.state = GatewayState::Closed;
        info!("gateway closed");
        result
    }
}

/// Whether two handles point at the same collaborator. Data pointers only;
/// vtable pointers are not unique per type.
fn same_link(a: &Arc<dyn ControllerLink>, b: &Arc<dyn ControllerLink>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("state", &self.state)
            .field("prefix", &self.namespace.prefix())
            .field("bindings", &self.table.as_ref().map(|t| t.len()))
            .finish_non_exhaustive()
    }
}

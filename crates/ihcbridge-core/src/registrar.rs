// ── Bridge registrar ──
//
// One `Router` per bridge table holds a route record for every binding
// and is registered with both collaborators as their sink. The router
// only keeps weak handles to the collaborators; once the gateway drops
// them, or closes the router, deliveries become no-ops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::link::{BrokerLink, ChangeSink, ControllerLink, MessageSink};
use crate::model::{BridgeTable, ResourceId};

const ON: &str = "ON";
const OFF: &str = "OFF";

/// Broker payload for a controller value.
pub fn state_payload(value: bool) -> &'static str {
    if value { ON } else { OFF }
}

/// Controller value for a command payload. Only the exact bytes `ON`
/// mean `true`; anything else, including `on` and empty payloads, is `false`.
pub fn command_value(payload: &[u8]) -> bool {
    payload == ON.as_bytes()
}

/// Controller → broker route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRoute {
    pub resource: ResourceId,
    pub topic: String,
}

/// Broker → controller route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRoute {
    pub topic: String,
    pub resource: ResourceId,
}

/// Dispatcher shared by every handler of one bridge table.
pub struct Router {
    states: HashMap<ResourceId, StateRoute>,
    commands: HashMap<String, CommandRoute>,
    controller: Weak<dyn ControllerLink>,
    broker: Option<Weak<dyn BrokerLink>>,
    closed: AtomicBool,
}

impl Router {
    pub fn new(
        table: &BridgeTable,
        controller: &Arc<dyn ControllerLink>,
        broker: Option<&Arc<dyn BrokerLink>>,
    ) -> Self {
        let states = table
            .iter()
            .map(|b| {
                let route = StateRoute {
                    resource: b.id(),
                    topic: b.state_topic.clone(),
                };
                (b.id(), route)
            })
            .collect();

        // Later bindings overwrite earlier ones on a shared topic.
        let commands = table
            .command_bindings()
            .filter_map(|b| {
                let topic = b.command_topic.clone()?;
                let route = CommandRoute {
                    topic: topic.clone(),
                    resource: b.id(),
                };
                Some((topic, route))
            })
            .collect();

        Self {
            states,
            commands,
            controller: Arc::downgrade(controller),
            broker: broker.map(Arc::downgrade),
            closed: AtomicBool::new(false),
        }
    }

    pub fn state_route(&self, resource: ResourceId) -> Option<&StateRoute> {
        self.states.get(&resource)
    }

    pub fn command_route(&self, topic: &str) -> Option<&CommandRoute> {
        self.commands.get(topic)
    }

    /// Stop acting on deliveries. Irreversible.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ChangeSink for Router {
    async fn on_change(&self, resource: ResourceId, value: bool) {
        if self.is_closed() {
            return;
        }
        let Some(route) = self.states.get(&resource) else {
            trace!(%resource, "change for unbound resource");
            return;
        };
        let Some(broker) = self.broker.as_ref().and_then(Weak::upgrade) else {
            trace!(%resource, "no broker attached, change dropped");
            return;
        };

        let payload = state_payload(value);
        if let Err(e) = broker.publish(&route.topic, payload).await {
            warn!(
                resource_id = %resource,
                topic = %route.topic,
                error = %e,
                "state publish failed"
            );
        }
    }
}

#[async_trait]
impl MessageSink for Router {
    async fn on_message(&self, topic: &str, payload: &[u8]) {
        if self.is_closed() {
            return;
        }
        let Some(route) = self.commands.get(topic) else {
            trace!(topic, "message on unrouted topic");
            return;
        };
        let Some(controller) = self.controller.upgrade() else {
            return;
        };

        let value = command_value(payload);
        if let Err(e) = controller.write_bool(route.resource, value).await {
            warn!(resource_id = %route.resource, topic, error = %e, "controller write failed");
        }
    }
}

/// Register every binding of `table` with the collaborators, in table order.
///
/// State handlers are always registered. Command handlers are registered,
/// then subscribed, only for bindings that carry a command topic and only
/// when a broker is present. A failed subscription is logged and leaves
/// the remaining bindings unaffected.
pub async fn register_bindings(
    table: &BridgeTable,
    router: &Arc<Router>,
    controller: &dyn ControllerLink,
    broker: Option<&dyn BrokerLink>,
) {
    for binding in table {
        let sink: Arc<dyn ChangeSink> = Arc::clone(router) as Arc<dyn ChangeSink>;
        controller.register_change_handler(binding.id(), sink, true);
        debug!(
            resource = %binding.resource,
            resource_id = %binding.id(),
            topic = %binding.state_topic,
            direction = %binding.direction,
            "state handler registered"
        );

        let (Some(broker), Some(topic)) = (broker, binding.command_topic.as_deref()) else {
            continue;
        };
        let sink: Arc<dyn MessageSink> = Arc::clone(router) as Arc<dyn MessageSink>;
        broker.register_topic_handler(topic, sink);
        match broker.subscribe(topic).await {
            Ok(()) => debug!(resource_id = %binding.id(), topic, "command topic subscribed"),
            Err(e) => warn!(resource_id = %binding.id(), topic, error = %e, "subscribe failed"),
        }
    }
}

#![allow(clippy::unwrap_used)]
// Gateway lifecycle tests against recording collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use ihcbridge_core::{
    BridgeSettings, BrokerLink, ChangeSink, ControllerLink, CoreError, Gateway, GatewayState,
    MessageSink, ResourceId,
};

const PROJECT: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<utcs_project>
  <group name="Ground Floor">
    <product_dataline name="Lamp" position="2">
      <dataline_output name="On/Off" id="O1A"/>
      <dataline_input name="Button" id="I0F"/>
    </product_dataline>
  </group>
</utcs_project>"#;

const LAMP_STATE: &str = "house/GroundFloor/Lamp-2/OnOff/state";
const LAMP_COMMAND: &str = "house/GroundFloor/Lamp-2/OnOff/command";
const BUTTON_STATE: &str = "house/GroundFloor/Lamp-2/Button/state";

// ── Fakes ───────────────────────────────────────────────────────────

type Handler = (ResourceId, Arc<dyn ChangeSink>, bool);

struct FakeController {
    accept: bool,
    project: Mutex<String>,
    fail_disconnect: bool,
    handlers: Mutex<Vec<Handler>>,
    writes: Mutex<Vec<(u32, bool)>>,
    disconnects: AtomicUsize,
}

impl FakeController {
    fn new(project: &str) -> Arc<Self> {
        Arc::new(Self {
            accept: true,
            project: Mutex::new(project.to_owned()),
            fail_disconnect: false,
            handlers: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
        })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            accept: false,
            ..Arc::into_inner(Self::new(PROJECT)).unwrap()
        })
    }

    /// Serve a different project from now on.
    fn set_project(&self, project: &str) {
        *self.project.lock().unwrap() = project.to_owned();
    }

    /// Simulate the controller reporting a value.
    async fn fire(&self, id: u32, value: bool) {
        let sinks: Vec<_> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _, _)| r.get() == id)
            .map(|(_, s, _)| Arc::clone(s))
            .collect();
        for sink in sinks {
            sink.on_change(ResourceId::new(id), value).await;
        }
    }

    fn registered_ids(&self) -> Vec<u32> {
        self.handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(r, _, _)| r.get())
            .collect()
    }

    fn writes(&self) -> Vec<(u32, bool)> {
        self.writes.lock().unwrap().clone()
    }

    fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControllerLink for FakeController {
    async fn authenticate(&self) -> Result<bool, CoreError> {
        Ok(self.accept)
    }

    async fn project_description(&self) -> Result<String, CoreError> {
        Ok(self.project.lock().unwrap().clone())
    }

    fn register_change_handler(&self, id: ResourceId, sink: Arc<dyn ChangeSink>, initial: bool) {
        self.handlers.lock().unwrap().push((id, sink, initial));
    }

    async fn write_bool(&self, id: ResourceId, value: bool) -> Result<(), CoreError> {
        self.writes.lock().unwrap().push((id.get(), value));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), CoreError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.fail_disconnect {
            return Err(CoreError::Internal("session already gone".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeBroker {
    subscriptions: Mutex<Vec<String>>,
    handlers: Mutex<HashMap<String, Arc<dyn MessageSink>>>,
    published: Mutex<Vec<(String, String)>>,
    stops: AtomicUsize,
}

impl FakeBroker {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Simulate an inbound message.
    async fn deliver(&self, topic: &str, payload: &[u8]) {
        let sink = self.handlers.lock().unwrap().get(topic).cloned();
        if let Some(sink) = sink {
            sink.on_message(topic, payload).await;
        }
    }

    fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }

    fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerLink for FakeBroker {
    async fn subscribe(&self, topic: &str) -> Result<(), CoreError> {
        self.subscriptions.lock().unwrap().push(topic.to_owned());
        Ok(())
    }

    fn register_topic_handler(&self, topic: &str, sink: Arc<dyn MessageSink>) {
        self.handlers.lock().unwrap().insert(topic.to_owned(), sink);
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), CoreError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_owned(), payload.to_owned()));
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn bridged(settings: BridgeSettings) -> (Gateway, Arc<FakeController>, Arc<FakeBroker>) {
    let controller = FakeController::new(PROJECT);
    let broker = FakeBroker::new();
    let mut gateway = Gateway::new(settings);
    gateway.attach_broker(broker.clone()).await.unwrap();
    gateway.attach_controller(controller.clone()).await.unwrap();
    (gateway, controller, broker)
}

// ── Bridging ────────────────────────────────────────────────────────

#[tokio::test]
async fn controller_change_publishes_state() {
    let (gateway, controller, broker) = bridged(BridgeSettings::default()).await;
    assert_eq!(gateway.state(), GatewayState::Bridged);

    controller.fire(26, true).await;
    controller.fire(15, false).await;

    assert_eq!(
        broker.published(),
        vec![
            (LAMP_STATE.to_owned(), "ON".to_owned()),
            (BUTTON_STATE.to_owned(), "OFF".to_owned()),
        ]
    );
}

#[tokio::test]
async fn only_outputs_are_subscribed() {
    let (gateway, controller, broker) = bridged(BridgeSettings::default()).await;

    assert_eq!(broker.subscriptions(), vec![LAMP_COMMAND.to_owned()]);
    assert_eq!(controller.registered_ids(), vec![26, 15]);
    assert!(controller.handlers.lock().unwrap().iter().all(|(_, _, initial)| *initial));
    assert_eq!(gateway.table().unwrap().len(), 2);
}

#[tokio::test]
async fn commands_decode_exact_on_only() {
    let (_gateway, controller, broker) = bridged(BridgeSettings::default()).await;

    for payload in [&b"ON"[..], b"OFF", b"on", b"", &[0xc3, 0x28]] {
        broker.deliver(LAMP_COMMAND, payload).await;
    }

    assert_eq!(
        controller.writes(),
        vec![(26, true), (26, false), (26, false), (26, false), (26, false)]
    );
}

#[tokio::test]
async fn controller_without_broker_registers_state_handlers_only() {
    let controller = FakeController::new(PROJECT);
    let mut gateway = Gateway::new(BridgeSettings::default());

    gateway.attach_controller(controller.clone()).await.unwrap();

    assert_eq!(gateway.state(), GatewayState::Bridged);
    let table = gateway.table().unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.command_bindings().count(), 0);
    assert_eq!(controller.registered_ids(), vec![26, 15]);

    // No broker: the handler runs and does nothing.
    controller.fire(26, true).await;
    assert!(controller.writes().is_empty());
}

#[tokio::test]
async fn colliding_command_topics_route_to_last_binding() {
    let xml = r#"<group name="g"><product_dataline name="p" position="1">
        <dataline_output name="A/B" id="O01"/>
        <dataline_output name="AB" id="O02"/>
    </product_dataline></group>"#;
    let controller = FakeController::new(xml);
    let broker = FakeBroker::new();
    let mut gateway = Gateway::new(BridgeSettings::default());
    gateway.attach_broker(broker.clone()).await.unwrap();
    gateway.attach_controller(controller.clone()).await.unwrap();

    broker.deliver("house/g/p-1/AB/command", b"ON").await;
    assert_eq!(controller.writes(), vec![(2, true)]);
}

// ── Setup failures ──────────────────────────────────────────────────

#[tokio::test]
async fn rejected_credentials_leave_gateway_unchanged() {
    let controller = FakeController::rejecting();
    let broker = FakeBroker::new();
    let mut gateway = Gateway::new(BridgeSettings::default());
    gateway.attach_broker(broker.clone()).await.unwrap();

    let err = gateway.attach_controller(controller.clone()).await.unwrap_err();

    assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    assert_eq!(gateway.state(), GatewayState::BrokerAttached);
    assert!(gateway.table().is_none());
    assert!(controller.registered_ids().is_empty());
    assert!(broker.subscriptions().is_empty());
    assert_eq!(controller.disconnects(), 1);
}

#[tokio::test]
async fn malformed_resource_id_aborts_without_registrations() {
    let xml = r#"<group name="g"><product_dataline name="p" position="1">
        <dataline_output name="ok" id="O01"/>
        <dataline_input name="bad" id="IZZ"/>
    </product_dataline></group>"#;
    let controller = FakeController::new(xml);
    let mut gateway = Gateway::new(BridgeSettings::default());

    let err = gateway.attach_controller(controller.clone()).await.unwrap_err();

    assert!(matches!(err, CoreError::MalformedResourceId { ref raw } if raw == "IZZ"));
    assert_eq!(gateway.state(), GatewayState::Empty);
    assert!(controller.registered_ids().is_empty());
}

// ── Mapping log ─────────────────────────────────────────────────────

#[tokio::test]
async fn mapping_log_lists_every_topic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ihc-mqtt.map");
    let settings = BridgeSettings {
        topic_prefix: "home/ihc".into(),
        mapping_log: Some(path.clone()),
    };

    let (_gateway, _controller, _broker) = bridged(settings).await;

    insta::assert_snapshot!(std::fs::read_to_string(&path).unwrap(), @r"
    O1A, 26, home/ihc/GroundFloor/Lamp-2/OnOff/state
    O1A, 26, home/ihc/GroundFloor/Lamp-2/OnOff/command
    I0F, 15, home/ihc/GroundFloor/Lamp-2/Button/state
    ");
}

#[tokio::test]
async fn unwritable_mapping_log_aborts_before_registration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("map.txt");
    let settings = BridgeSettings {
        mapping_log: Some(path),
        ..BridgeSettings::default()
    };
    let controller = FakeController::new(PROJECT);
    let broker = FakeBroker::new();
    let mut gateway = Gateway::new(settings);
    gateway.attach_broker(broker.clone()).await.unwrap();

    let err = gateway.attach_controller(controller.clone()).await.unwrap_err();

    assert!(matches!(err, CoreError::AuditLogWrite { .. }));
    assert!(controller.registered_ids().is_empty());
    assert!(broker.subscriptions().is_empty());
    assert_eq!(gateway.state(), GatewayState::BrokerAttached);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn close_releases_both_handles_and_silences_handlers() {
    let (mut gateway, controller, broker) = bridged(BridgeSettings::default()).await;

    gateway.close().await.unwrap();

    assert_eq!(gateway.state(), GatewayState::Closed);
    assert!(!gateway.has_broker());
    assert!(!gateway.has_controller());
    assert_eq!(controller.disconnects(), 1);
    assert_eq!(broker.stops.load(Ordering::SeqCst), 1);

    controller.fire(26, true).await;
    broker.deliver(LAMP_COMMAND, b"ON").await;
    assert!(broker.published().is_empty());
    assert!(controller.writes().is_empty());

    // Closing twice is harmless.
    gateway.close().await.unwrap();
    assert_eq!(broker.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_controller_disconnect_still_stops_broker() {
    let controller = Arc::new(FakeController {
        fail_disconnect: true,
        ..Arc::into_inner(FakeController::new(PROJECT)).unwrap()
    });
    let broker = FakeBroker::new();
    let mut gateway = Gateway::new(BridgeSettings::default());
    gateway.attach_broker(broker.clone()).await.unwrap();
    gateway.attach_controller(controller.clone()).await.unwrap();

    gateway.close().await.unwrap();

    assert_eq!(broker.stops.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.state(), GatewayState::Closed);
}

#[tokio::test]
async fn attach_after_close_is_invalid() {
    let mut gateway = Gateway::new(BridgeSettings::default());
    gateway.close().await.unwrap();

    let err = gateway.attach_broker(FakeBroker::new()).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::InvalidState { state: GatewayState::Closed, .. }
    ));
    let err = gateway
        .attach_controller(FakeController::new(PROJECT))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot attach a controller while the gateway is closed"
    );
}

#[tokio::test]
async fn broker_cannot_be_attached_once_bridged() {
    let (mut gateway, _controller, _broker) = bridged(BridgeSettings::default()).await;
    let err = gateway.attach_broker(FakeBroker::new()).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::InvalidState { state: GatewayState::Bridged, .. }
    ));
}

#[tokio::test]
async fn reattaching_a_controller_replaces_the_bridge() {
    let (mut gateway, old, broker) = bridged(BridgeSettings::default()).await;
    let new = FakeController::new(PROJECT);

    gateway.attach_controller(new.clone()).await.unwrap();

    assert_eq!(old.disconnects(), 1);
    assert_eq!(gateway.state(), GatewayState::Bridged);

    old.fire(26, true).await;
    assert!(broker.published().is_empty());

    new.fire(26, false).await;
    broker.deliver(LAMP_COMMAND, b"ON").await;
    assert_eq!(broker.published(), vec![(LAMP_STATE.to_owned(), "OFF".to_owned())]);
    assert!(old.writes().is_empty());
    assert_eq!(new.writes(), vec![(26, true)]);
}

#[tokio::test]
async fn reattaching_the_same_controller_keeps_its_session() {
    let (mut gateway, controller, broker) = bridged(BridgeSettings::default()).await;

    gateway.attach_controller(controller.clone()).await.unwrap();

    assert_eq!(controller.disconnects(), 0);
    assert_eq!(gateway.state(), GatewayState::Bridged);
    assert!(gateway.has_controller());

    // Both routers are still registered with the fake; only the new one acts.
    controller.fire(26, true).await;
    broker.deliver(LAMP_COMMAND, b"ON").await;
    assert_eq!(broker.published(), vec![(LAMP_STATE.to_owned(), "ON".to_owned())]);
    assert_eq!(controller.writes(), vec![(26, true)]);

    gateway.close().await.unwrap();
    assert_eq!(controller.disconnects(), 1);
}

#[tokio::test]
async fn failed_reattach_of_the_same_controller_keeps_the_bridge() {
    let (mut gateway, controller, broker) = bridged(BridgeSettings::default()).await;
    controller.set_project(
        r#"<group name="g"><product_dataline name="p" position="1">
            <dataline_output name="bad" id="OZZ"/>
        </product_dataline></group>"#,
    );

    let err = gateway.attach_controller(controller.clone()).await.unwrap_err();

    assert!(matches!(err, CoreError::MalformedResourceId { .. }));
    assert_eq!(controller.disconnects(), 0);
    assert_eq!(gateway.state(), GatewayState::Bridged);
    assert_eq!(gateway.table().unwrap().len(), 2);

    controller.fire(26, false).await;
    assert_eq!(broker.published(), vec![(LAMP_STATE.to_owned(), "OFF".to_owned())]);
}

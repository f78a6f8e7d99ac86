// ── IHC controller collaborator ──
//
// `ControllerLink` over the SOAP client. A successful login starts one
// background task that enables notifications for newly registered
// resources and long-polls the controller for value changes, handing
// boolean changes to the registered sinks in the order received.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use ihcbridge_api::transport::{TlsMode, TransportConfig};
use ihcbridge_api::IhcClient;

use crate::config::{ControllerConfig, TlsVerification};
use crate::error::CoreError;
use crate::link::{ChangeSink, ControllerLink};
use crate::model::ResourceId;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Pause before enabling freshly registered resources, so a burst of
/// registrations goes out as one request.
const REGISTRATION_SETTLE: Duration = Duration::from_millis(200);

struct Registration {
    sink: Arc<dyn ChangeSink>,
    deliver_initial: bool,
    /// Set once the first value after (re-)enabling has been seen.
    primed: AtomicBool,
}

/// Controller collaborator backed by [`IhcClient`].
///
/// Cheaply cloneable via `Arc<ControllerInner>`. The notification task
/// keeps the inner state alive until [`disconnect`](ControllerLink::disconnect)
/// is called.
#[derive(Clone)]
pub struct IhcController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    client: IhcClient,
    registrations: DashMap<ResourceId, Registration>,
    /// Registered but not yet enabled on the controller.
    pending: DashSet<ResourceId>,
    wake: Notify,
    /// Token of the running notification task, replaced on restart.
    cancel: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl IhcController {
    /// Build the client. Does not contact the controller.
    pub fn new(config: ControllerConfig) -> Result<Self, CoreError> {
        if config.timeout <= Duration::from_secs(u64::from(config.notify_wait_secs)) {
            return Err(CoreError::Config {
                message: format!(
                    "controller timeout ({}s) must exceed the notification wait ({}s)",
                    config.timeout.as_secs(),
                    config.notify_wait_secs
                ),
            });
        }

        let transport = build_transport(&config);
        let client = IhcClient::new(config.url.clone(), &transport)?;
        Ok(Self::with_client(config, client))
    }

    /// Use a pre-built client (tests, custom transports).
    pub fn with_client(config: ControllerConfig, client: IhcClient) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                config,
                client,
                registrations: DashMap::new(),
                pending: DashSet::new(),
                wake: Notify::new(),
                cancel: Mutex::new(CancellationToken::new()),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Number of resources with a registered change handler.
    pub fn registered(&self) -> usize {
        self.inner.registrations.len()
    }

    async fn spawn_notify_task(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        handles.retain(|h| !h.is_finished());
        if !handles.is_empty() {
            return;
        }

        let cancel = CancellationToken::new();
        *self.inner.cancel.lock().await = cancel.clone();
        handles.push(tokio::spawn(notify_task(Arc::clone(&self.inner), cancel)));
        debug!("notification task started");
    }
}

fn build_transport(config: &ControllerConfig) -> TransportConfig {
    let tls = match &config.tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    };
    TransportConfig {
        tls,
        timeout: config.timeout,
        cookie_jar: None,
    }
}

#[async_trait]
impl ControllerLink for IhcController {
    async fn authenticate(&self) -> Result<bool, CoreError> {
        let config = &self.inner.config;
        let ok = self
            .inner
            .client
            .authenticate(&config.username, &config.password)
            .await?;
        if ok {
            info!(url = %config.url, username = %config.username, "authenticated to controller");
            self.spawn_notify_task().await;
        }
        Ok(ok)
    }

    async fn project_description(&self) -> Result<String, CoreError> {
        Ok(self.inner.client.project().await?)
    }

    fn register_change_handler(
        &self,
        resource: ResourceId,
        sink: Arc<dyn ChangeSink>,
        deliver_initial: bool,
    ) {
        self.inner.registrations.insert(
            resource,
            Registration {
                sink,
                deliver_initial,
                primed: AtomicBool::new(false),
            },
        );
        self.inner.pending.insert(resource);
        self.inner.wake.notify_one();
    }

    async fn write_bool(&self, resource: ResourceId, value: bool) -> Result<(), CoreError> {
        let acknowledged = self.inner.client.set_bool(resource.get(), value).await?;
        if acknowledged {
            trace!(resource_id = %resource, value, "resource written");
            Ok(())
        } else {
            Err(CoreError::Rejected {
                message: format!("write of {value} to resource {resource} not acknowledged"),
            })
        }
    }

    async fn disconnect(&self) -> Result<(), CoreError> {
        self.inner.cancel.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "notification task ended abnormally");
            }
        }

        self.inner.registrations.clear();
        self.inner.pending.clear();
        info!(url = %self.inner.config.url, "controller disconnected");
        Ok(())
    }
}

// ── Notification task ────────────────────────────────────────────────

async fn notify_task(inner: Arc<ControllerInner>, cancel: CancellationToken) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if inner.registrations.is_empty() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = inner.wake.notified() => {}
            }
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            r = poll_once(&inner) => r,
        };

        match result {
            Ok(()) => backoff = INITIAL_BACKOFF,
            Err(e) => {
                warn!(error = %e, retry_in_secs = backoff.as_secs(), "notification poll failed");
                if e.is_auth_expired() {
                    reauthenticate(&inner).await;
                }
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }

    debug!("notification task stopped");
}

/// Enable pending resources, wait for one batch of changes and deliver it.
async fn poll_once(inner: &ControllerInner) -> Result<(), ihcbridge_api::Error> {
    if !inner.pending.is_empty() {
        tokio::time::sleep(REGISTRATION_SETTLE).await;
        let ids: Vec<ResourceId> = inner.pending.iter().map(|id| *id).collect();
        for id in &ids {
            inner.pending.remove(id);
        }
        let raw: Vec<u32> = ids.iter().map(|id| id.get()).collect();
        if let Err(e) = inner.client.enable_notifications(&raw).await {
            for id in ids {
                inner.pending.insert(id);
            }
            return Err(e);
        }
        debug!(count = raw.len(), "notifications enabled");
    }

    let changes = inner
        .client
        .wait_for_changes(inner.config.notify_wait_secs)
        .await?;

    for change in changes {
        let resource = ResourceId::new(change.resource_id);
        let Some(value) = change.value.as_bool() else {
            trace!(resource_id = %resource, value = ?change.value, "non-boolean value ignored");
            continue;
        };

        // Clone out of the map so no shard lock is held across the await.
        let target = inner.registrations.get(&resource).and_then(|reg| {
            let first = !reg.primed.swap(true, Ordering::AcqRel);
            (!first || reg.deliver_initial).then(|| Arc::clone(&reg.sink))
        });
        if let Some(sink) = target {
            sink.on_change(resource, value).await;
        }
    }
    Ok(())
}

/// Log in again after the session expired and re-enable every resource.
async fn reauthenticate(inner: &ControllerInner) {
    let config = &inner.config;
    match inner.client.authenticate(&config.username, &config.password).await {
        Ok(true) => {
            for entry in &inner.registrations {
                entry.primed.store(false, Ordering::Release);
                inner.pending.insert(*entry.key());
            }
            info!("controller session renewed");
        }
        Ok(false) => warn!(username = %config.username, "controller rejected renewed login"),
        Err(e) => warn!(error = %e, "controller login renewal failed"),
    }
}

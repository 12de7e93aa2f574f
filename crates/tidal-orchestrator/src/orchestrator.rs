//! Registration barrier, telemetry consumers, liveness sweep and trigger
//! sequencing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tidal_bus::{Bus, TypedSubscription};
use tidal_store::{append_json, get_json, keys, set_json, StateStore};
use tidal_types::{
    ConfigAckMessage, HeartbeatMessage, MetricsMessage, RegisterMessage, TestConfigMessage,
    TestType, TriggerMessage, WireMessage, SETTLE_DELAY,
};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ack::AckTracker;
use crate::error::{Error, Result};
use crate::quorum::{Quorum, QuorumPolicy};
use crate::registry::{Registry, Touch};

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Registrations required before telemetry consumers start.
    pub drivers: usize,
    pub quorum_policy: QuorumPolicy,
    /// A node silent for longer than this is marked dead.
    pub heartbeat_timeout: Duration,
    pub sweep_interval: Duration,
    /// Longest wait for config acknowledgements before triggering.
    pub settle_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            drivers: 8,
            quorum_policy: QuorumPolicy::default(),
            heartbeat_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(150),
            settle_delay: SETTLE_DELAY,
        }
    }
}

/// What a consumer did with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Accepted,
    /// The sender is not registered; nothing was recorded.
    Rejected,
}

/// Parameters of a load test requested through the control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTestRequest {
    pub test_type: TestType,
    pub test_server: String,
    pub test_message_delay: u64,
    pub message_count_per_driver: u64,
}

/// Result of a trigger sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerOutcome {
    pub test_id: String,
    /// Alive nodes whose acknowledgement was awaited.
    pub expected: usize,
    /// Of those, how many acknowledged before the trigger went out.
    pub acknowledged: usize,
}

/// Central coordinator. Sole writer of the state store.
pub struct Orchestrator {
    bus: Bus,
    store: Arc<dyn StateStore>,
    registry: Registry,
    acks: AckTracker,
    /// Set once the telemetry consumers are subscribed, or from the start
    /// when no registrations are required. Runs are refused before.
    quorum_reached: AtomicBool,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(bus: Bus, store: Arc<dyn StateStore>, config: OrchestratorConfig) -> Self {
        Self {
            bus,
            store,
            registry: Registry::new(),
            acks: AckTracker::new(),
            quorum_reached: AtomicBool::new(config.drivers == 0),
            config,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Whether the registration barrier has released and runs may be triggered.
    pub fn quorum_reached(&self) -> bool {
        self.quorum_reached.load(Ordering::Acquire)
    }

    /// Run until `shutdown` fires: wait for the registration quorum, then
    /// consume heartbeats, metrics and acknowledgements and sweep liveness.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        let mut registrations = self.bus.subscribe::<RegisterMessage>().await?;
        if !self.await_registrations(&mut registrations, &shutdown).await? {
            info!("Shutdown before registration quorum was reached");
            return Ok(());
        }

        let mut tasks = self.clone().start(registrations, &shutdown).await?;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Orchestrator task failed: {e}");
            }
        }
        info!("Orchestrator stopped");
        Ok(())
    }

    /// Block until the registration quorum is reached.
    ///
    /// Returns false if `shutdown` fired first.
    pub async fn await_registrations(
        &self,
        registrations: &mut TypedSubscription<RegisterMessage>,
        shutdown: &CancellationToken,
    ) -> Result<bool> {
        let mut quorum = Quorum::new(self.config.quorum_policy, self.config.drivers);
        info!(
            "Waiting for {} driver registration(s) ({})",
            quorum.required(),
            self.config.quorum_policy
        );

        while !quorum.is_reached() {
            let Some(register) = next_message(registrations, shutdown).await else {
                if shutdown.is_cancelled() {
                    return Ok(false);
                }
                return Err(Error::BusClosed("waiting for registrations"));
            };
            quorum.observe(&register.node_id);
            self.handle_register(register).await?;
            info!("Registrations: {}/{}", quorum.progress(), quorum.required());
        }

        info!("Registration quorum reached");
        Ok(true)
    }

    /// Spawn every post-barrier task: registration, heartbeat, metrics and
    /// acknowledgement consumers plus the liveness sweep.
    pub async fn start(
        self: Arc<Self>,
        registrations: TypedSubscription<RegisterMessage>,
        shutdown: &CancellationToken,
    ) -> Result<JoinSet<()>> {
        let heartbeats = self.bus.subscribe::<HeartbeatMessage>().await?;
        let metrics = self.bus.subscribe::<MetricsMessage>().await?;
        let acks = self.bus.subscribe::<ConfigAckMessage>().await?;
        self.quorum_reached.store(true, Ordering::Release);

        let mut tasks = JoinSet::new();
        tasks.spawn(self.clone().consume_registrations(registrations, shutdown.clone()));
        tasks.spawn(self.clone().consume_heartbeats(heartbeats, shutdown.clone()));
        tasks.spawn(self.clone().consume_metrics(metrics, shutdown.clone()));
        tasks.spawn(self.clone().consume_acks(acks, shutdown.clone()));
        tasks.spawn(self.run_liveness_sweep(shutdown.clone()));
        Ok(tasks)
    }

    async fn consume_registrations(
        self: Arc<Self>,
        mut sub: TypedSubscription<RegisterMessage>,
        shutdown: CancellationToken,
    ) {
        while let Some(register) = next_message(&mut sub, &shutdown).await {
            if let Err(e) = self.handle_register(register).await {
                error!("Failed to record registration: {e}");
            }
        }
    }

    async fn consume_heartbeats(
        self: Arc<Self>,
        mut sub: TypedSubscription<HeartbeatMessage>,
        shutdown: CancellationToken,
    ) {
        while let Some(heartbeat) = next_message(&mut sub, &shutdown).await {
            if let Err(e) = self.handle_heartbeat(heartbeat).await {
                error!("Failed to record heartbeat: {e}");
            }
        }
    }

    async fn consume_metrics(
        self: Arc<Self>,
        mut sub: TypedSubscription<MetricsMessage>,
        shutdown: CancellationToken,
    ) {
        while let Some(metrics) = next_message(&mut sub, &shutdown).await {
            if let Err(e) = self.handle_metrics(metrics).await {
                error!("Failed to record metrics: {e}");
            }
        }
    }

    async fn consume_acks(
        self: Arc<Self>,
        mut sub: TypedSubscription<ConfigAckMessage>,
        shutdown: CancellationToken,
    ) {
        while let Some(ack) = next_message(&mut sub, &shutdown).await {
            self.handle_ack(&ack);
        }
    }

    /// Periodically mark silent nodes dead until `shutdown` fires.
    pub async fn run_liveness_sweep(self: Arc<Self>, shutdown: CancellationToken) {
        let period = self.config.sweep_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }
    }

    /// One liveness pass. Returns the nodes that were just marked dead.
    pub fn sweep(&self) -> Vec<String> {
        let expired = self
            .registry
            .sweep_at(Instant::now(), self.config.heartbeat_timeout);
        for node_id in &expired {
            warn!(
                "Node {node_id} marked dead: no heartbeat within {:?}",
                self.config.heartbeat_timeout
            );
        }
        expired
    }

    /// Record a registration in the registry and the durable log.
    pub async fn handle_register(&self, register: RegisterMessage) -> Result<()> {
        self.registry.register(&register.node_id, &register.node_ip);
        info!("Registered node {} ({})", register.node_id, register.node_ip);
        append_json(self.store.as_ref(), keys::REGISTER, register).await?;
        Ok(())
    }

    pub async fn handle_heartbeat(&self, heartbeat: HeartbeatMessage) -> Result<HandleOutcome> {
        match self.registry.touch(&heartbeat.node_id) {
            Touch::Unknown => {
                warn!("Dropping heartbeat from unregistered node {}", heartbeat.node_id);
                return Ok(HandleOutcome::Rejected);
            }
            Touch::Revived => info!("Node {} is alive again", heartbeat.node_id),
            Touch::Refreshed => debug!("Heartbeat from {}", heartbeat.node_id),
        }

        let key = keys::heartbeat(&heartbeat.node_id);
        append_json(self.store.as_ref(), &key, heartbeat).await?;
        Ok(HandleOutcome::Accepted)
    }

    /// Persist the latest metrics snapshot of a registered node.
    pub async fn handle_metrics(&self, metrics: MetricsMessage) -> Result<HandleOutcome> {
        if !self.registry.contains(&metrics.node_id) {
            warn!("Dropping metrics from unregistered node {}", metrics.node_id);
            return Ok(HandleOutcome::Rejected);
        }

        debug!("Metrics from {} for test {}", metrics.node_id, metrics.test_id);
        set_json(self.store.as_ref(), &keys::metrics(&metrics.node_id), &metrics).await?;
        Ok(HandleOutcome::Accepted)
    }

    pub fn handle_ack(&self, ack: &ConfigAckMessage) -> HandleOutcome {
        if !self.registry.contains(&ack.node_id) {
            warn!("Dropping config acknowledgement from unregistered node {}", ack.node_id);
            return HandleOutcome::Rejected;
        }
        self.acks.record(&ack.test_id, &ack.node_id);
        HandleOutcome::Accepted
    }

    /// Publish a new test config, wait for the alive nodes to acknowledge
    /// it (bounded by the settle delay), then publish its trigger.
    ///
    /// Refused until the registration barrier has released, since the
    /// telemetry of the run would otherwise go unrecorded. Publish failures
    /// are returned to the caller.
    pub async fn trigger_load_test(&self, request: LoadTestRequest) -> Result<TriggerOutcome> {
        if !self.quorum_reached() {
            return Err(Error::QuorumNotReached {
                registered: self.registry.len(),
                required: self.config.drivers,
            });
        }

        let config = TestConfigMessage::new(
            request.test_type,
            request.test_server,
            request.test_message_delay,
            request.message_count_per_driver,
        );
        let test_id = config.test_id.clone();
        let expected = self.registry.alive_ids();
        info!(
            "Triggering {} load test {test_id} ({} request(s) per driver, {} driver(s))",
            config.test_type,
            config.message_count_per_driver,
            expected.len()
        );

        self.acks.open(&test_id);
        let report = self.bus.publish_one(&config).await;
        if !report.is_ok() {
            self.acks.close(&test_id);
            return Err(Error::Publish {
                kind: TestConfigMessage::KIND,
                enqueued: report.enqueued,
                errors: report.errors,
            });
        }

        let persisted = set_json(self.store.as_ref(), keys::TEST_CONFIGS, &vec![config]).await;
        if let Err(e) = persisted {
            self.acks.close(&test_id);
            return Err(e.into());
        }

        let all_acked = self
            .acks
            .wait_for(&test_id, &expected, self.config.settle_delay)
            .await;
        let acked = self.acks.close(&test_id);
        let acknowledged = expected.iter().filter(|id| acked.contains(*id)).count();
        if all_acked {
            info!("All {} driver(s) acknowledged test {test_id}", expected.len());
        } else if !expected.is_empty() {
            warn!(
                "{acknowledged}/{} driver(s) acknowledged test {test_id} before the settle delay",
                expected.len()
            );
        }

        let report = self.bus.publish_one(&TriggerMessage::new(&test_id)).await;
        if !report.is_ok() {
            return Err(Error::Publish {
                kind: TriggerMessage::KIND,
                enqueued: report.enqueued,
                errors: report.errors,
            });
        }

        info!("Trigger published for test {test_id}");
        Ok(TriggerOutcome {
            test_id,
            expected: expected.len(),
            acknowledged,
        })
    }

    pub async fn registrations(&self) -> Result<Vec<RegisterMessage>> {
        required_json(self.store.as_ref(), keys::REGISTER).await
    }

    pub async fn test_configs(&self) -> Result<Vec<TestConfigMessage>> {
        required_json(self.store.as_ref(), keys::TEST_CONFIGS).await
    }

    pub async fn metrics_for(&self, node_id: &str) -> Result<MetricsMessage> {
        required_json(self.store.as_ref(), &keys::metrics(node_id)).await
    }

    pub async fn heartbeats_for(&self, node_id: &str) -> Result<Vec<HeartbeatMessage>> {
        required_json(self.store.as_ref(), &keys::heartbeat(node_id)).await
    }

    /// Latest metrics of every registered node. Nodes that have not
    /// reported yet are skipped.
    pub async fn all_metrics(&self) -> Result<Vec<MetricsMessage>> {
        let mut all = Vec::new();
        for node_id in self.registry.node_ids() {
            if let Some(metrics) =
                get_json::<MetricsMessage>(self.store.as_ref(), &keys::metrics(&node_id)).await?
            {
                all.push(metrics);
            }
        }
        Ok(all)
    }
}

async fn required_json<T: serde::de::DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> Result<T> {
    get_json(store, key)
        .await?
        .ok_or_else(|| tidal_store::Error::NotFound(key.to_string()).into())
}

/// Next decodable message, or None on shutdown or bus closure.
async fn next_message<T: WireMessage>(
    sub: &mut TypedSubscription<T>,
    shutdown: &CancellationToken,
) -> Option<T> {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return None,
            next = sub.next() => match next {
                Some(Ok(message)) => return Some(message),
                Some(Err(e)) => warn!("Skipping {} message: {e}", T::KIND),
                None => {
                    info!("Bus closed, {} consumer stopping", T::KIND);
                    return None;
                }
            },
        }
    }
}

//! Test acquisition and execution for one driver process.

use reqwest::Client;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tidal_bus::{Bus, TypedSubscription};
use tidal_types::{
    ConfigAckMessage, RegisterMessage, TestConfigMessage, TestType, TriggerMessage, WireMessage,
    CONFIG_WAIT, HEARTBEAT_INTERVAL, METRICS_INTERVAL,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::load::{LoadGenerator, LoadStats};
use crate::metrics::MetricsAggregator;
use crate::node::{DriverNode, DriverState};
use crate::reporting::{publish_final_metrics, send_heartbeats, stream_metrics};

/// Driver settings.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Address announced in the registration.
    pub node_ip: String,
    /// How long to wait for a test config before giving up.
    pub config_timeout: Duration,
    /// Re-enter AWAITING_CONFIG after each run instead of idling.
    pub rearm: bool,
    pub heartbeat_interval: Duration,
    pub metrics_interval: Duration,
    /// Per-request timeout against the target server.
    pub request_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            node_ip: "localhost".to_string(),
            config_timeout: CONFIG_WAIT,
            rearm: false,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            metrics_interval: METRICS_INTERVAL,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of waiting for a test config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionOutcome {
    Configured(TestConfigMessage),
    TimedOut,
    Cancelled,
}

/// What happened during one executed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub test_id: String,
    pub test_type: TestType,
    pub load: LoadStats,
    /// Intermediate metrics reports enqueued while the load was active.
    pub periodic_reports: usize,
    pub heartbeats: usize,
    /// Whether the final metrics report was enqueued.
    pub final_published: bool,
    pub metrics: tidal_types::MetricsData,
}

/// A driver node: registers once, then acquires and executes test runs.
pub struct Driver {
    node_id: String,
    bus: Bus,
    config: DriverConfig,
    client: Client,
    node: Mutex<DriverNode>,
    state: watch::Sender<DriverState>,
    last_run: Mutex<Option<RunReport>>,
}

impl Driver {
    /// Create a driver with a freshly generated node id.
    pub fn new(bus: Bus, config: DriverConfig) -> Result<Self> {
        Self::with_node_id(Uuid::new_v4().to_string(), bus, config)
    }

    pub fn with_node_id(node_id: impl Into<String>, bus: Bus, config: DriverConfig) -> Result<Self> {
        let node_id = node_id.into();
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let node = DriverNode::new(&node_id, &config.node_ip);
        let (state, _) = watch::channel(DriverState::Registered);

        Ok(Self {
            node_id,
            bus,
            config,
            client,
            node: Mutex::new(node),
            state,
            last_run: Mutex::new(None),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Snapshot of the node and its current run parameters.
    pub fn node(&self) -> DriverNode {
        self.node.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn state(&self) -> DriverState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    /// Report of the most recently completed run.
    pub fn last_run(&self) -> Option<RunReport> {
        self.last_run.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_state(&self, next: DriverState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!("Driver {} state: {previous} -> {next}", self.node_id);
        }
    }

    /// Run the driver until `shutdown` fires.
    ///
    /// Registers once, then loops through acquisition and execution. Without
    /// rearm the driver idles after its first run (or after a config
    /// timeout) until shutdown.
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<()> {
        let mut configs = self.bus.subscribe::<TestConfigMessage>().await?;
        self.register().await?;

        loop {
            let config = match self.await_config(&mut configs, shutdown).await? {
                AcquisitionOutcome::Configured(config) => config,
                AcquisitionOutcome::Cancelled => return Ok(()),
                AcquisitionOutcome::TimedOut if self.config.rearm => {
                    configs = self.bus.subscribe().await?;
                    continue;
                }
                AcquisitionOutcome::TimedOut => {
                    self.set_state(DriverState::Idle);
                    shutdown.cancelled().await;
                    return Ok(());
                }
            };

            let mut triggers = self.bus.subscribe::<TriggerMessage>().await?;
            self.configure(&config);
            self.acknowledge(&config).await;

            if !self
                .await_trigger(&mut triggers, &config.test_id, shutdown)
                .await?
            {
                return Ok(());
            }
            drop(triggers);

            self.execute(&config, shutdown).await;

            if shutdown.is_cancelled() {
                return Ok(());
            }
            if !self.config.rearm {
                info!("Driver {} finished its run, idling until shutdown", self.node_id);
                shutdown.cancelled().await;
                return Ok(());
            }
            configs = self.bus.subscribe().await?;
        }
    }

    /// Announce this node on the register topic.
    pub async fn register(&self) -> Result<()> {
        let message = RegisterMessage::new(&self.node_id, &self.config.node_ip);
        let report = self.bus.publish_one(&message).await;
        if !report.is_ok() {
            return Err(Error::Publish {
                kind: RegisterMessage::KIND,
                errors: report.errors,
            });
        }
        info!("Registered driver {} ({})", self.node_id, self.config.node_ip);
        self.set_state(DriverState::Registered);
        Ok(())
    }

    /// Wait for the first decodable test config, up to the configured timeout.
    pub async fn await_config(
        &self,
        configs: &mut TypedSubscription<TestConfigMessage>,
        shutdown: &CancellationToken,
    ) -> Result<AcquisitionOutcome> {
        self.set_state(DriverState::AwaitingConfig);
        let deadline = tokio::time::sleep(self.config.config_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(AcquisitionOutcome::Cancelled),
                _ = &mut deadline => {
                    warn!(
                        "No test config received within {:?}, driver {} stays idle",
                        self.config.config_timeout, self.node_id
                    );
                    return Ok(AcquisitionOutcome::TimedOut);
                }
                next = configs.next() => match next {
                    Some(Ok(config)) => {
                        info!("Received test config {} ({})", config.test_id, config.test_type);
                        return Ok(AcquisitionOutcome::Configured(config));
                    }
                    Some(Err(e)) => warn!("Skipping test config message: {e}"),
                    None => return Err(Error::BusClosed("waiting for a test config")),
                },
            }
        }
    }

    /// Wait for the trigger matching `test_id`.
    ///
    /// Triggers for other runs are dropped. Returns `false` if shutdown
    /// fired first.
    pub async fn await_trigger(
        &self,
        triggers: &mut TypedSubscription<TriggerMessage>,
        test_id: &str,
        shutdown: &CancellationToken,
    ) -> Result<bool> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(false),
                next = triggers.next() => match next {
                    Some(Ok(trigger)) if trigger.test_id == test_id => {
                        info!("Trigger received for test {test_id}");
                        return Ok(true);
                    }
                    Some(Ok(trigger)) => {
                        warn!("Ignoring trigger for test {} (expecting {test_id})", trigger.test_id);
                    }
                    Some(Err(e)) => warn!("Skipping trigger message: {e}"),
                    None => return Err(Error::BusClosed("waiting for a trigger")),
                },
            }
        }
    }

    fn configure(&self, config: &TestConfigMessage) {
        self.node
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .apply_config(config);
        self.set_state(DriverState::Configured);
    }

    async fn acknowledge(&self, config: &TestConfigMessage) {
        let ack = ConfigAckMessage {
            node_id: self.node_id.clone(),
            test_id: config.test_id.clone(),
        };
        if !self.bus.publish_one(&ack).await.is_ok() {
            warn!("Config acknowledgement for test {} was not published", config.test_id);
        }
    }

    /// Execute one run: load, streaming metrics and heartbeats, then the
    /// final metrics report.
    pub async fn execute(&self, config: &TestConfigMessage, shutdown: &CancellationToken) -> RunReport {
        self.set_state(DriverState::Running);
        let done = shutdown.child_token();
        let aggregator = Arc::new(MetricsAggregator::new());

        let streamer = tokio::spawn(stream_metrics(
            self.bus.clone(),
            self.node_id.clone(),
            config.test_id.clone(),
            aggregator.clone(),
            self.config.metrics_interval,
            done.clone(),
        ));
        let heartbeats = tokio::spawn(send_heartbeats(
            self.bus.clone(),
            self.node_id.clone(),
            self.config.heartbeat_interval,
            done.clone(),
        ));

        info!("Starting {} load test {}", config.test_type, config.test_id);
        let generator = LoadGenerator::new(self.client.clone(), &config.test_server, aggregator.clone());
        let load = match config.test_type {
            TestType::Avalanche => {
                generator
                    .avalanche(config.message_count_per_driver, &done)
                    .await
            }
            TestType::Tsunami => {
                generator
                    .tsunami(
                        config.message_count_per_driver,
                        Duration::from_millis(config.test_message_delay),
                        &done,
                    )
                    .await
            }
        };
        done.cancel();

        let periodic_reports = streamer.await.unwrap_or_else(|e| {
            warn!("Metrics producer failed: {e}");
            0
        });
        let heartbeats = heartbeats.await.unwrap_or_else(|e| {
            warn!("Heartbeat producer failed: {e}");
            0
        });
        let final_report =
            publish_final_metrics(&self.bus, &self.node_id, &config.test_id, &aggregator).await;
        debug!("Driver node info: {:?}", self.node());

        let report = RunReport {
            test_id: config.test_id.clone(),
            test_type: config.test_type,
            load,
            periodic_reports,
            heartbeats,
            final_published: final_report.is_ok(),
            metrics: aggregator.metrics_data(),
        };
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(report.clone());
        self.set_state(DriverState::Done);
        report
    }
}

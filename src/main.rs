//! Command-line interface for tidal
//!
//! # Usage Examples
//!
//! ## Bootstrap
//! ```bash
//! # Create every protocol topic on the brokers
//! tidal create-topics --brokers localhost:9092 --partitions 1
//! ```
//!
//! ## Orchestrator
//! ```bash
//! # Wait for three distinct drivers, mark nodes dead after 90s of silence
//! tidal orchestrator \
//!   --drivers 3 --quorum-policy distinct-nodes \
//!   --heartbeat-timeout 90s \
//!   --listen 0.0.0.0:8081 --data-dir ./data
//!
//! # Trigger a run once the quorum is reached
//! curl -X POST localhost:8081/trigger-load-test \
//!   -H 'content-type: application/json' \
//!   -d '{"test_type":"TSUNAMI","test_server":"http://target:8080/ping",
//!        "test_message_delay":100,"message_count_per_driver":50}'
//! ```
//!
//! ## Driver
//! ```bash
//! # Run once, then idle
//! tidal driver --node-ip 10.0.0.12
//!
//! # Keep accepting new runs
//! tidal driver --node-ip 10.0.0.12 --rearm --config-timeout 10m
//! ```
//!
//! ## Target
//! ```bash
//! tidal target --listen 0.0.0.0:8080 --delay 1s
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tidal::{parse_duration, BusArgs, TopicArgs};
use tidal_bus::KafkaBus;
use tidal_driver::{Driver, DriverConfig};
use tidal_orchestrator::{Orchestrator, OrchestratorConfig, QuorumPolicy};
use tidal_store::RedbStore;
use tidal_types::TopicNames;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tidal")]
#[command(about = "Distributed HTTP load testing coordinated over a message bus")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator: registration barrier, telemetry consumers and HTTP API
    Orchestrator {
        #[command(flatten)]
        bus: BusArgs,

        #[command(flatten)]
        topics: TopicArgs,

        /// Directory holding the state database
        #[arg(long, env = "TIDAL_DATA_DIR", default_value = "./data")]
        data_dir: PathBuf,

        /// Address of the control and query API
        #[arg(long, env = "TIDAL_LISTEN", default_value = "0.0.0.0:8081")]
        listen: SocketAddr,

        /// Registrations required before telemetry is consumed
        #[arg(long, env = "TIDAL_DRIVERS", default_value = "8")]
        drivers: usize,

        /// How registrations count towards the quorum (count-events, distinct-nodes)
        #[arg(long, default_value = "count-events", value_parser = QuorumPolicy::from_str)]
        quorum_policy: QuorumPolicy,

        /// Silence after which a node is marked dead (e.g. "5m", "90s", "1h")
        #[arg(long, env = "TIDAL_HEARTBEAT_TIMEOUT", default_value = "5m", value_parser = parse_duration)]
        heartbeat_timeout: Duration,

        /// Liveness sweep period (default: half the heartbeat timeout, at least 1s)
        #[arg(long, value_parser = parse_duration)]
        sweep_interval: Option<Duration>,

        /// Longest wait for config acknowledgements before triggering
        #[arg(long, default_value = "5s", value_parser = parse_duration)]
        settle_delay: Duration,
    },

    /// Run a driver node
    Driver {
        #[command(flatten)]
        bus: BusArgs,

        #[command(flatten)]
        topics: TopicArgs,

        /// Address announced in the registration
        #[arg(long, env = "TIDAL_NODE_IP", default_value = "localhost")]
        node_ip: String,

        /// How long to wait for a test config
        #[arg(long, default_value = "1m", value_parser = parse_duration)]
        config_timeout: Duration,

        /// Wait for another config after each run instead of idling
        #[arg(long)]
        rearm: bool,

        /// Per-request timeout against the target server
        #[arg(long, default_value = "30s", value_parser = parse_duration)]
        request_timeout: Duration,
    },

    /// Serve a stand-in target with a fixed response delay
    Target {
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: SocketAddr,

        /// Delay before each /ping response
        #[arg(long, default_value = "1s", value_parser = parse_duration)]
        delay: Duration,
    },

    /// Create every protocol topic on the Kafka brokers
    CreateTopics {
        #[command(flatten)]
        bus: BusArgs,

        #[command(flatten)]
        topics: TopicArgs,

        /// Partitions per topic
        #[arg(long, default_value = "1")]
        partitions: i32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let shutdown = shutdown_on_ctrl_c();

    match cli.command {
        Commands::Orchestrator {
            bus,
            topics,
            data_dir,
            listen,
            drivers,
            quorum_policy,
            heartbeat_timeout,
            sweep_interval,
            settle_delay,
        } => {
            let config = OrchestratorConfig {
                drivers,
                quorum_policy,
                heartbeat_timeout,
                sweep_interval: sweep_interval
                    .unwrap_or_else(|| default_sweep_interval(heartbeat_timeout)),
                settle_delay,
            };
            run_orchestrator(&bus, &topics, data_dir, listen, config, shutdown).await?;
        }
        Commands::Driver {
            bus,
            topics,
            node_ip,
            config_timeout,
            rearm,
            request_timeout,
        } => {
            let config = DriverConfig {
                node_ip,
                config_timeout,
                rearm,
                request_timeout,
                ..Default::default()
            };
            run_driver(&bus, &topics, config, shutdown).await?;
        }
        Commands::Target { listen, delay } => {
            tidal::target::serve(listen, delay, shutdown).await?;
        }
        Commands::CreateTopics {
            bus,
            topics,
            partitions,
        } => {
            let names = TopicNames::from(&topics);
            let kafka = KafkaBus::new(bus.kafka_config())
                .with_context(|| format!("Failed to connect to Kafka at {}", bus.brokers))?;
            kafka
                .create_topics(&names.all(), partitions)
                .await
                .context("Failed to create topics")?;
            println!("Created topics: {}", names.all().join(", "));
        }
    }

    Ok(())
}

async fn run_orchestrator(
    bus: &BusArgs,
    topics: &TopicArgs,
    data_dir: PathBuf,
    listen: SocketAddr,
    config: OrchestratorConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    let store = RedbStore::open(&data_dir)
        .with_context(|| format!("Failed to open state store in {}", data_dir.display()))?;
    let bus = bus.connect(TopicNames::from(topics))?;

    info!(
        "Starting orchestrator: {} driver(s), heartbeat timeout {:?}, sweep every {:?}",
        config.drivers, config.heartbeat_timeout, config.sweep_interval
    );
    let orchestrator = Arc::new(Orchestrator::new(bus, Arc::new(store), config));

    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;
    info!("HTTP API listening on {}", listener.local_addr()?);
    let app = tidal_orchestrator::http::router(orchestrator.clone());
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
    });

    let result = orchestrator.run(shutdown.clone()).await;
    // A fatal orchestrator error takes the API down with it
    shutdown.cancel();
    match server.await {
        Ok(Err(e)) => error!("HTTP server failed: {e}"),
        Err(e) => error!("HTTP server task failed: {e}"),
        Ok(Ok(())) => {}
    }
    result.context("Orchestrator failed")
}

async fn run_driver(
    bus: &BusArgs,
    topics: &TopicArgs,
    config: DriverConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let bus = bus.connect(TopicNames::from(topics))?;
    let driver = Driver::new(bus, config).context("Failed to create driver")?;
    info!("Starting driver {}", driver.node_id());
    driver.run(&shutdown).await.context("Driver failed")?;
    info!("Driver {} stopped in state {}", driver.node_id(), driver.state());
    Ok(())
}

fn default_sweep_interval(heartbeat_timeout: Duration) -> Duration {
    (heartbeat_timeout / 2).max(Duration::from_secs(1))
}

/// Token cancelled on the first Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            return;
        }
        info!("Interrupted, shutting down");
        cancel.cancel();
    });
    token
}

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use config::Config;
use marathon_bus::{BusConsumer, BusMode, KafkaConfig, MemoryBus, StubBus};
use marathon_clients::{ChallengeClient, SubmissionClient, TokenConfig, TokenProvider};
use marathon_processor::{ConsumerHarness, EventRouter, RoundOrchestrator, TopicRouting};
use marathon_storage::SledStorage;
use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Application configuration
#[derive(Debug, Clone)]
struct AppConfig {
    // Storage
    database_url: String,

    // Bus
    bus_mode: BusMode,
    kafka: KafkaConfig,

    // Token minting
    auth0_url: String,
    auth0_audience: String,
    auth0_client_id: String,
    auth0_client_secret: String,
    token_cache_time_ms: u64,

    // v5 API
    v5_api_url: String,

    // Observability
    healthcheck_port: u16,
    prometheus_enabled: bool,

    // Logging
    log_level: String,
    log_format: String,
}

impl AppConfig {
    fn load() -> Result<Self> {
        // Load from environment variables with defaults
        let config = Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        let kafka = KafkaConfig {
            url: config
                .get_string("KAFKA_URL")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
            group_id: config
                .get_string("KAFKA_GROUP_ID")
                .unwrap_or_else(|_| "marathon-rating-processor".to_string()),
            client_cert: config.get_string("KAFKA_CLIENT_CERT").ok(),
            client_cert_key: config.get_string("KAFKA_CLIENT_CERT_KEY").ok(),
            autopilot_topic: config
                .get_string("KAFKA_AUTOPILOT_NOTIFICATIONS_TOPIC")
                .unwrap_or_else(|_| "notifications.autopilot.events".to_string()),
            rating_service_topic: config
                .get_string("KAFKA_RATING_SERVICE_TOPIC")
                .unwrap_or_else(|_| "ratings.calculation.service".to_string()),
        };

        Ok(Self {
            database_url: config
                .get_string("DATABASE_URL")
                .unwrap_or_else(|_| "./data/ratings-db".to_string()),
            bus_mode: BusMode::from_env(
                &config.get_string("BUS_MODE").unwrap_or_default(),
            ),
            kafka,
            auth0_url: config.get_string("AUTH0_URL").unwrap_or_default(),
            auth0_audience: config.get_string("AUTH0_AUDIENCE").unwrap_or_default(),
            auth0_client_id: config.get_string("AUTH0_CLIENT_ID").unwrap_or_default(),
            auth0_client_secret: config.get_string("AUTH0_CLIENT_SECRET").unwrap_or_default(),
            token_cache_time_ms: config
                .get_string("TOKEN_CACHE_TIME")
                .unwrap_or_else(|_| "86400000".to_string())
                .parse()?,
            v5_api_url: config
                .get_string("V5_API_URL")
                .unwrap_or_else(|_| "https://api.topcoder-dev.com/v5".to_string()),
            healthcheck_port: config
                .get_string("HEALTHCHECK_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            prometheus_enabled: config.get_bool("PROMETHEUS_ENABLED").unwrap_or(false),
            log_level: config
                .get_string("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string()),
            log_format: config
                .get_string("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string()),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let matches = Command::new("marathon-node")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Marathon match rating processor")
        .arg(
            Arg::new("database-url")
                .short('d')
                .long("database-url")
                .value_name("PATH")
                .help("Rating database path"),
        )
        .arg(
            Arg::new("dev")
                .long("dev")
                .action(ArgAction::SetTrue)
                .help("Run with debug logging"),
        )
        .get_matches();

    // Load configuration
    let mut config = AppConfig::load()?;

    // Override with command line arguments
    if let Some(database_url) = matches.get_one::<String>("database-url") {
        config.database_url = database_url.clone();
    }
    if matches.get_flag("dev") {
        config.log_level = "debug".to_string();
        config.log_format = "pretty".to_string();
    }

    // Initialize logging
    init_logging(&config)?;

    // Initialize metrics exporter
    let _prometheus_handle = init_metrics(&config);

    info!("Starting marathon rating processor");
    info!("Database: {}", config.database_url);
    info!(
        "Bus: {} (group {}, topics {} / {})",
        config.kafka.url,
        config.kafka.group_id,
        config.kafka.autopilot_topic,
        config.kafka.rating_service_topic
    );

    // Initialize storage. Unreachable storage is a fatal startup error.
    let storage = Arc::new(SledStorage::new(&config.database_url)?);
    info!("Storage initialized at {}", config.database_url);

    // Wire the v5 API clients behind the shared token cache.
    let tokens = Arc::new(TokenProvider::new(TokenConfig {
        auth_url: config.auth0_url.clone(),
        audience: config.auth0_audience.clone(),
        client_id: config.auth0_client_id.clone(),
        client_secret: config.auth0_client_secret.clone(),
        cache_time: Duration::from_millis(config.token_cache_time_ms),
    })?);
    let challenges = Arc::new(ChallengeClient::new(&config.v5_api_url, tokens.clone())?);
    let submissions = Arc::new(SubmissionClient::new(&config.v5_api_url, tokens)?);

    let orchestrator = Arc::new(RoundOrchestrator::new(storage.clone(), submissions));
    let router = Arc::new(EventRouter::new(
        orchestrator,
        challenges,
        TopicRouting {
            autopilot: config.kafka.autopilot_topic.clone(),
            rating_service: config.kafka.rating_service_topic.clone(),
        },
    ));

    // Select the bus consumer. The external Kafka client plugs in here; the
    // stub keeps the processor alive without deliveries.
    let bus: Box<dyn BusConsumer + Send> = match config.bus_mode {
        BusMode::Stub => {
            warn!("Bus mode set to stub; no messages will be delivered");
            Box::new(StubBus::new())
        }
        BusMode::Memory => {
            warn!("Bus mode set to memory; no producer is attached");
            let (_handle, bus) = MemoryBus::channel();
            Box::new(bus)
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let harness = ConsumerHarness::new(bus, router, shutdown_rx);
    let harness_handle = tokio::spawn(harness.run());

    // Health endpoint
    let health_addr = format!("0.0.0.0:{}", config.healthcheck_port);
    let health_listener = TcpListener::bind(&health_addr).await?;
    let health_app = axum::Router::new().route("/health", axum::routing::get(health));
    let health_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(health_listener, health_app).await {
            error!("Health endpoint error: {}", e);
        }
    });
    info!("Health endpoint on http://{}/health", health_addr);

    gauge!("marathon_processor_up").set(1.0);
    info!("Marathon rating processor is ready");

    // Keep the processor running
    tokio::signal::ctrl_c().await?;
    info!("Shutting down marathon rating processor");

    // In-flight round calculations complete; new messages stop.
    shutdown_tx.send(true)?;
    match tokio::time::timeout(Duration::from_secs(30), harness_handle).await {
        Ok(joined) => joined??,
        Err(_) => warn!("Consumer harness did not stop within 30s"),
    }
    health_handle.abort();

    storage.flush()?;
    info!("Marathon rating processor shutdown complete");

    Ok(())
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "marathon-rating-processor"
    }))
}

fn init_metrics(config: &AppConfig) -> Option<PrometheusHandle> {
    if !config.prometheus_enabled {
        info!("Prometheus metrics exporter disabled via configuration");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics exporter registered");
            describe_gauge!(
                "marathon_processor_up",
                "Overall processor health indicator (1 = healthy)"
            );
            describe_counter!(
                "marathon_messages_consumed",
                "Bus messages consumed and committed"
            );
            describe_counter!(
                "marathon_messages_dropped",
                "Bus messages dropped as malformed or irrelevant"
            );
            describe_counter!("marathon_rounds_rated", "Rounds successfully rated");
            Some(handle)
        }
        Err(err) => {
            warn!("Failed to install Prometheus metrics exporter: {}", err);
            None
        }
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    Ok(())
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockpile_api::config::ServerConfig;
use stockpile_api::router::build_app_router;
use stockpile_api::state::AppState;
use stockpile_core::event::event_channel;
use stockpile_db::repositories::AssetRepo;
use stockpile_db::store::StoreFactory;
use stockpile_events::{EventProcessor, EventSink, LogSink, PersistenceSink};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env().unwrap_or_else(|e| panic!("Invalid configuration: {e}"));
    tracing::info!(
        host = %config.host,
        port = %config.port,
        datastore = %config.datastore,
        api_prefix = %config.api_prefix,
        "Loaded server configuration"
    );

    let schema = config
        .load_asset_schema()
        .unwrap_or_else(|e| panic!("Failed to load asset config: {e}"));
    tracing::info!(
        required = schema.required_fields.len(),
        enforced = schema.enforced_fields.len(),
        "Loaded asset field rules"
    );

    // --- Datastore ---
    let opened = StoreFactory::create(&config.store_config())
        .await
        .unwrap_or_else(|e| panic!("Failed to open datastore: {e}"));
    opened
        .store
        .ping()
        .await
        .unwrap_or_else(|e| panic!("Datastore health check failed: {e}"));
    tracing::info!(backend = opened.store.backend_name(), "Datastore ready");

    // --- Events ---
    let (events, receiver) = event_channel(config.event_queue_capacity);
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(LogSink)];
    if let Some(pool) = &opened.pool {
        sinks.push(Arc::new(PersistenceSink::new(pool.clone())));
    }
    let processor = EventProcessor::new(sinks);
    tracing::info!(
        sinks = processor.sink_count(),
        capacity = config.event_queue_capacity,
        "Event queue ready"
    );
    let processor_handle = tokio::spawn(processor.run(receiver));

    // --- App state ---
    let repo = AssetRepo::new(opened.store, schema, config.default_result_size, events);
    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // The router (and every event sender it held) is gone; let the processor
    // drain what is left in the queue.
    tracing::info!("Server stopped accepting connections, draining events");
    match tokio::time::timeout(Duration::from_secs(5), processor_handle).await {
        Ok(Ok(processed)) => tracing::info!(processed, "Event processor stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Event processor task failed"),
        Err(_) => tracing::warn!("Event processor did not stop in time"),
    }

    tracing::info!("Graceful shutdown complete");
}

/// Install the tracing subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "stockpile_api=debug,stockpile_db=debug,stockpile_events=info,tower_http=debug"
                    .into()
            }),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

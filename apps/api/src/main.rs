use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{
    InMemoryReservationStore, InMemorySlotStore, InMemoryUserDirectory, LoggingNotifier, Notifier,
    ReservationStore, SchedulingEngine, SlotStore, SupabaseReservationStore, SupabaseSlotStore,
    SupabaseUserDirectory, UserDirectory, WebhookNotifier,
};
use deferred_task_cell::{DeferredTaskManager, SystemClock, TaskManagerConfig};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting wellbeing scheduling API server");

    // Load configuration
    let config = AppConfig::from_env();

    // Storage backends
    let slots: Arc<dyn SlotStore>;
    let reservations: Arc<dyn ReservationStore>;
    let users: Arc<dyn UserDirectory>;
    if config.is_database_configured() {
        let supabase = Arc::new(SupabaseClient::new(&config));
        info!("Using Supabase storage at {}", supabase.get_base_url());
        slots = Arc::new(SupabaseSlotStore::new(Arc::clone(&supabase)));
        reservations = Arc::new(SupabaseReservationStore::new(Arc::clone(&supabase)));
        users = Arc::new(SupabaseUserDirectory::new(supabase));
    } else {
        warn!("Using in-memory storage");
        slots = Arc::new(InMemorySlotStore::new());
        reservations = Arc::new(InMemoryReservationStore::new());
        users = Arc::new(InMemoryUserDirectory::new());
    }

    let notifier: Arc<dyn Notifier> = match &config.notifier_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LoggingNotifier),
    };

    let tasks = DeferredTaskManager::new(
        TaskManagerConfig {
            pool_size: config.task_pool_size,
        },
        Arc::new(SystemClock),
    );

    let engine = Arc::new(SchedulingEngine::new(
        slots,
        reservations,
        users,
        notifier,
        tasks.clone(),
    ));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(engine)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tasks.shutdown().await;
    info!("Deferred tasks stopped, bye");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

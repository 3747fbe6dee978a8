use clap::Parser;
use dotenvy::dotenv;
use secure_upload::config::{RunMode, UploadConfig};
use secure_upload::infrastructure::{analyzer, storage};
use secure_upload::services::intake::IntakeService;
use secure_upload::services::storage::StorageService;
use secure_upload::services::storage_lifecycle::StorageLifecycleService;
use secure_upload::services::worker::BackgroundWorker;
use secure_upload::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service type to run
    #[arg(short, long, value_enum, default_value_t = RunMode::All)]
    mode: RunMode,

    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secure_upload=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting secure upload service [Mode: {:?}]...", args.mode);

    let config = UploadConfig::from_env();
    config.validate()?;
    info!(
        "🛡️  Upload Config: Max Size={}MB, Max Files={}, Dir={}, Max Age={}min",
        config.max_file_size / 1024 / 1024,
        config.max_files,
        config.upload_dir,
        config.cleanup_max_age_minutes
    );

    // 2. Storage; anything left by a previous API run is stale
    let storage_service = storage::setup_storage(&config).await?;
    let storage_dyn: Arc<dyn StorageService> = storage_service.clone();
    let lifecycle = Arc::new(StorageLifecycleService::new(storage_dyn.clone()));
    if args.mode.owns_upload_dir() {
        let wiped = lifecycle.wipe_all().await;
        if wiped > 0 {
            info!("🧹 Removed {} stale upload(s) from a previous run", wiped);
        }
    }

    // 3. Shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut handles = Vec::new();

    // 4. Age sweep worker
    if args.mode.runs_worker() {
        let worker = BackgroundWorker::new(
            lifecycle.clone(),
            config.cleanup_max_age(),
            config.cleanup_interval(),
            shutdown_rx.clone(),
        );
        handles.push(tokio::spawn(worker.run()));
        info!("👷 Worker service initialized.");
    }

    // 5. API server
    if args.mode.serves_requests() {
        let analyzer_service = analyzer::setup_analyzer(&config);
        let intake = Arc::new(IntakeService::new(
            storage_dyn.clone(),
            lifecycle.clone(),
            analyzer_service,
            config.clone(),
        ));

        let state = AppState {
            storage: storage_dyn.clone(),
            lifecycle: lifecycle.clone(),
            intake,
            config: config.clone(),
        };

        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            );

        let app = create_app(state).layer(trace_layer);
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
        info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

        let mut server_shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.changed().await;
                })
                .await
            {
                error!("❌ Server runtime error: {}", e);
            }
        }));
    }

    // 6. Wait for a signal, then stop every service before the final wipe
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    info!("🛑 Shutting down services...");
    for handle in handles {
        let _ = handle.await;
    }

    if args.mode.owns_upload_dir() {
        let wiped = lifecycle.wipe_all().await;
        info!("🧹 Shutdown wipe removed {} upload(s)", wiped);
    }
    info!("👋 Service exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use photo_pipeline::app_state::AppState;
use photo_pipeline::config::AppConfig;
use photo_pipeline::models::job::JobKind;
use photo_pipeline::services::delegate::DelegateRunner;
use photo_pipeline::services::face_crop::{BlockVarianceDetector, FaceCropEngine};
use photo_pipeline::services::processors::{BackgroundRemovalProcessor, FaceCropProcessor};
use photo_pipeline::services::queue::JobQueue;
use photo_pipeline::services::scheduler::Scheduler;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing photo-pipeline server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("photo_jobs_submitted_total", "Total jobs submitted");
    metrics::describe_counter!("photo_jobs_completed_total", "Total jobs completed");
    metrics::describe_counter!(
        "photo_jobs_failed_total",
        "Total jobs that failed permanently"
    );
    metrics::describe_histogram!(
        "photo_job_processing_seconds",
        "Time to process one job attempt"
    );
    metrics::describe_gauge!(
        "photo_queue_waiting",
        "Current number of jobs waiting for dispatch"
    );

    // Queue and detection strategies, owned here and shared by reference
    let queue = Arc::new(JobQueue::new());
    let output_dir = PathBuf::from(&config.output_dir);

    // The detector backend is loaded once and injected into the engine
    let engine = Arc::new(FaceCropEngine::new(Arc::new(
        BlockVarianceDetector::default(),
    )));

    // Register processors and start the scheduler
    let mut scheduler = Scheduler::new(
        Arc::clone(&queue),
        config.concurrency_limit,
        Duration::from_millis(config.dispatch_interval_ms),
    );

    scheduler.register(
        JobKind::FaceCrop,
        Arc::new(FaceCropProcessor::new(
            Arc::clone(&engine),
            config.crop_options(),
            output_dir.clone(),
        )),
    );

    match &config.delegate_bin {
        Some(bin) => {
            tracing::info!(delegate = %bin, "External detector enabled");
            scheduler.register(
                JobKind::BackgroundRemoval,
                Arc::new(BackgroundRemovalProcessor::new(
                    Arc::new(DelegateRunner::new(bin)),
                    output_dir,
                    config.delegate_padding,
                )),
            );
        }
        None => {
            tracing::warn!("DELEGATE_BIN not set; background-removal jobs will fail");
        }
    }

    scheduler.spawn();

    // Build API routes
    let state = AppState::new(Arc::clone(&queue));
    let app = photo_pipeline::api_router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            axum::routing::get(photo_pipeline::routes::metrics::prometheus_metrics)
                .with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024)); // 2 MB limit

    tracing::info!("Starting photo-pipeline on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use dotenvy::dotenv;
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ideagraph::{
    AppState,
    ai::{OpenAiModels, ResponsesClient},
    config::{AppConfig, load_config},
    evidence::{ExcerptRule, LocatorBackfill, PageSource, default_text_layer},
    pipeline::{
        ExtractionConfig, ExtractionOrchestrator, JobTracker, LinkingConfig, LinkingOrchestrator,
        SourceFiles, TaskScheduler, UploadsDirectory, Workers,
    },
    routes,
    storage::{GraphStore, GraphStoreConfig, StorageManager},
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(error = %err, "Service crashed");
        eprintln!("Service crashed: {err:#}");
    }
}

async fn run() -> Result<()> {
    init_tracing();
    if let Err(err) = dotenv() {
        warn!(error = %err, "No .env file loaded");
    }
    let api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;

    let config = load_config()
        .await
        .context("Failed to load application configuration")?;

    let store = Arc::new(GraphStore::new(GraphStoreConfig {
        working_dir: PathBuf::from(&config.working_dir),
        workspace: config.effective_workspace(),
    }));
    let mut storage_manager = StorageManager::new();
    storage_manager.register_all(store.storages());
    storage_manager.initialize_all().await?;

    let jobs = Arc::new(JobTracker::new(store.clone(), config.pipeline.stale_timeout()));
    let (scheduler, worker) = TaskScheduler::start(
        build_workers(&config, &api_key, store.clone(), jobs.clone()),
        config.pipeline.scheduler_capacity,
    );

    let state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        store: store.clone(),
        jobs,
        scheduler,
    });

    let addr_string = format!("{}:{}", config.server.host, config.server.port);
    let addr = addr_string
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid server address: {addr_string}"))?;
    info!(host = %config.server.host, port = config.server.port, "Loaded configuration");

    let app = Router::new()
        .route("/health", get(health))
        .merge(routes::project_routes())
        .merge(routes::job_routes())
        .merge(routes::graph_routes())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener on {addr}"))?;
    info!(%addr, "Server listening");

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // In-flight tasks are abandoned here; the staleness projection reports them.
    worker.abort();
    if let Err(err) = storage_manager.finalize_all().await {
        warn!(error = %err, "Failed to finalize storages");
    }

    server_result.context("Server encountered a fatal error")?;
    Ok(())
}

fn build_workers(
    config: &AppConfig,
    api_key: &str,
    store: Arc<GraphStore>,
    jobs: Arc<JobTracker>,
) -> Workers {
    let pipeline = &config.pipeline;
    let client = Arc::new(ResponsesClient::new(
        api_key.to_string(),
        config.models.api_base.clone(),
    ));
    let models = Arc::new(OpenAiModels::new(
        client,
        config.models.clone(),
        pipeline.max_ideas_per_document,
    ));

    let files: Arc<dyn SourceFiles> = Arc::new(UploadsDirectory::new(&config.uploads_dir));
    let pages = PageSource::new(files, default_text_layer());
    let excerpt_rule = ExcerptRule {
        min_chars: pipeline.excerpt_min_chars,
        max_chars: pipeline.excerpt_max_chars,
    };

    let mut extraction = ExtractionOrchestrator::new(
        store.clone(),
        jobs.clone(),
        models.clone(),
        ExtractionConfig {
            max_ideas: pipeline.max_ideas_per_document,
            excerpt_rule,
        },
    );
    if pipeline.locate_inline {
        extraction = extraction.with_inline_locating(pages.clone());
    }

    let linking = LinkingOrchestrator::new(
        store.clone(),
        jobs.clone(),
        models.clone(),
        models,
        LinkingConfig {
            duplicate_threshold: pipeline.duplicate_threshold,
            candidate_threshold: pipeline.candidate_threshold,
            batch_size: pipeline.batch_size,
            min_edge_confidence: pipeline.min_edge_confidence,
            excerpt_rule,
        },
    );

    let backfill = LocatorBackfill::new(store, jobs, pages, pipeline.backfill_fetch_concurrency);

    Workers {
        extraction: Arc::new(extraction),
        linking: Arc::new(linking),
        backfill: Arc::new(backfill),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[inline]
async fn health() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                if stream.recv().await.is_some() {
                    info!("Received SIGTERM");
                }
            }
            Err(err) => warn!(error = %err, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received termination signal (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received termination signal (SIGTERM)");
        }
    }
}

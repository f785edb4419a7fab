use std::{process, sync::Arc};

use hybrid_cache::{
    application::{error::AppError, forecast::ForecastService},
    cache::{
        CacheConfig, HybridCache, MemorySharedStore, MemoryStore, ResponseCacheState, SharedStore,
    },
    config,
    infra::{
        cache_sweeper::{spawn_sweeper, sweep_once},
        db::PostgresCacheStore,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::Sweep(_) => run_sweep(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);

    let db = match settings.database.url.as_deref() {
        Some(url) => Some(Arc::new(connect_store(url, &settings, true).await?)),
        None => {
            warn!(
                "database url is not configured; using an in-process shared tier, \
                 cached responses will not be shared between instances"
            );
            None
        }
    };

    let shared: Arc<dyn SharedStore> = match db.as_ref() {
        Some(store) => store.clone(),
        None => Arc::new(MemorySharedStore::new()),
    };
    let local = Arc::new(MemoryStore::new(cache_config.local_capacity));
    let cache = HybridCache::new(local, shared.clone(), cache_config.shared_store_policy);

    info!(
        enabled = cache_config.enabled,
        ttl_seconds = cache_config.response_ttl.as_secs(),
        local_capacity = cache_config.local_capacity.get(),
        policy = %cache_config.shared_store_policy,
        "response cache configured"
    );

    let sweeper = spawn_sweeper(shared, cache_config.sweep_interval);

    let state = HttpState {
        forecast: Arc::new(ForecastService::default()),
        db,
        cache: ResponseCacheState {
            config: cache_config,
            cache,
        },
    };

    let result = serve_http(&settings, state).await;

    sweeper.abort();
    let _ = sweeper.await;

    result
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let url = require_database_url(&settings)?;
    connect_store(url, &settings, true).await?;
    info!("migrations applied");
    Ok(())
}

async fn run_sweep(settings: config::Settings) -> Result<(), AppError> {
    let url = require_database_url(&settings)?;
    let store = connect_store(url, &settings, false).await?;
    let deleted = sweep_once(&store).await.map_err(InfraError::from)?;
    info!(deleted, "sweep finished");
    Ok(())
}

fn require_database_url(settings: &config::Settings) -> Result<&str, AppError> {
    settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured").into())
}

async fn connect_store(
    url: &str,
    settings: &config::Settings,
    migrate: bool,
) -> Result<PostgresCacheStore, AppError> {
    let pool = PostgresCacheStore::connect(url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;

    if migrate {
        PostgresCacheStore::run_migrations(&pool)
            .await
            .map_err(InfraError::from)?;
    }

    Ok(PostgresCacheStore::new(pool))
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(addr = %settings.server.addr, "listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

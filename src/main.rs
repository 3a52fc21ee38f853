use std::{process, sync::Arc};

use todos::{
    application::{
        cache::CacheStore,
        error::AppError,
        todos::{CachePolicy, TodoService},
    },
    config::{self, CacheBackend, Command, ServeArgs, Settings},
    infra::{
        cache::{MemoryCache, RedisCache},
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        telemetry,
    },
};
use tokio::sync::watch;
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
    let dotenv = dotenvy::dotenv();

    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match dotenv {
        Ok(path) => info!(target: "todos::config", path = %path.display(), "loaded .env"),
        Err(err) if err.not_found() => {
            info!(target: "todos::config", "no .env file found; using process environment")
        }
        Err(err) => warn!(target: "todos::config", error = %err, "failed to read .env"),
    }

    match command {
        Command::Serve(_) => run_serve(settings).await,
        Command::Migrate(_) => run_migrate(settings).await,
        Command::Check(_) => run_check(settings).await,
    }
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings, settings.database.run_migrations).await?;

    repositories
        .health_check()
        .await
        .map_err(|err| {
            AppError::from(InfraError::database(format!(
                "startup probe failed: {err}"
            )))
        })?;
    info!(target: "todos::serve", "database connection verified");

    let cache = init_cache(&settings).await;
    let policy = CachePolicy {
        ttl: settings.cache.ttl,
        invalidate_on_write: settings.cache.invalidate_on_write,
    };
    let todos = TodoService::new(repositories.clone(), repositories.clone())
        .with_cache_opt(cache, policy);

    let state = ApiState {
        todos: Arc::new(todos),
        db: repositories.clone(),
    };

    let result = serve_http(&settings, state).await;

    repositories.close().await;
    info!(target: "todos::serve", "database pool closed");

    result
}

async fn run_migrate(settings: Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings, true).await?;
    repositories.close().await;
    info!(target: "todos::migrate", "migrations applied");
    Ok(())
}

async fn run_check(settings: Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings, false).await?;
    let probe = repositories.health_check().await;
    repositories.close().await;

    if settings.cache.enabled && settings.cache.backend == CacheBackend::Redis {
        let url = RedisCache::url_for(&settings.cache.host, settings.cache.port);
        match RedisCache::connect(&url).await {
            Ok(cache) => match cache.ping().await {
                Ok(()) => info!(target: "todos::check", %url, "cache reachable"),
                Err(err) => warn!(target: "todos::check", %url, error = %err, "cache ping failed"),
            },
            Err(err) => warn!(target: "todos::check", %url, error = %err, "cache unreachable"),
        }
    }

    probe.map_err(|err| AppError::from(InfraError::database(format!("probe failed: {err}"))))?;
    info!(target: "todos::check", "database reachable");
    Ok(())
}

async fn init_repositories(
    settings: &Settings,
    run_migrations: bool,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| {
            InfraError::configuration(
                "database.url",
                "not configured; set SUPABASE_URL, TODOS__DATABASE__URL or --database-url",
            )
        })
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, &settings.database)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    if run_migrations {
        PostgresRepositories::run_migrations(&pool)
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    }

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

/// The store is the source of truth, so an unreachable cache only disables
/// caching for this process.
async fn init_cache(settings: &Settings) -> Option<Arc<dyn CacheStore>> {
    if !settings.cache.enabled {
        info!(target: "todos::serve", "todo cache disabled");
        return None;
    }

    match settings.cache.backend {
        CacheBackend::Memory => {
            info!(target: "todos::serve", "using in-process todo cache");
            Some(Arc::new(MemoryCache::new()))
        }
        CacheBackend::Redis => {
            let url = RedisCache::url_for(&settings.cache.host, settings.cache.port);
            let cache = match RedisCache::connect(&url).await {
                Ok(cache) => cache,
                Err(err) => {
                    warn!(
                        target: "todos::serve",
                        %url,
                        error = %err,
                        "cache unreachable; serving without cache"
                    );
                    return None;
                }
            };
            if let Err(err) = cache.ping().await {
                warn!(
                    target: "todos::serve",
                    %url,
                    error = %err,
                    "cache ping failed; serving without cache"
                );
                return None;
            }
            info!(target: "todos::serve", %url, "cache connected");
            Some(Arc::new(cache))
        }
    }
}

async fn serve_http(settings: &Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target: "todos::serve", addr = %settings.server.addr, "listening");

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(true);
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    let deadline = async move {
        let _ = stop_rx.wait_for(|stopping| *stopping).await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
            info!(target: "todos::serve", "server stopped");
        }
        _ = deadline => {
            warn!(
                target: "todos::serve",
                grace_secs = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target: "todos::serve", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target: "todos::serve", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(target: "todos::serve", "received ctrl-c; shutting down"),
        _ = terminate => info!(target: "todos::serve", "received SIGTERM; shutting down"),
    }
}

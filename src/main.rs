use std::{net::SocketAddr, process, sync::Arc};

use strato::{
    cache::{CacheConfig, TileCache},
    catalog::{Catalog, FilterPolicy},
    config,
    infra::{
        db::{Connection, DuckdbConnection},
        error::InfraError,
        http::{self, AdminState, PublicState, RouterState},
        telemetry,
    },
};
use tokio::net::TcpListener;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const SOURCE: &str = "strato::main";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &InfraError) {
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

async fn run() -> Result<(), InfraError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;
    settings.log_summary();

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), InfraError> {
    let database_path = settings.database.path.clone();
    let policy = FilterPolicy::from(&settings.database);

    // DuckDB introspection is synchronous, keep it off the runtime workers.
    let catalog = tokio::task::spawn_blocking(move || -> Result<Catalog, InfraError> {
        let connection: Arc<dyn Connection> = Arc::new(DuckdbConnection::open(&database_path)?);
        Ok(Catalog::build(connection, policy)?)
    })
    .await??;

    let catalog = Arc::new(catalog);
    let cache = Arc::new(TileCache::new(CacheConfig::from(&settings.cache)));

    if settings.cache.disable_api {
        info!(target = SOURCE, "cache admin API disabled by configuration");
    }
    if settings.server.disable_ui {
        info!(target = SOURCE, "map viewer disabled by configuration");
    }

    let router_state = RouterState {
        public: PublicState {
            catalog: catalog.clone(),
            metadata: settings.metadata.clone(),
            website: settings.website.clone(),
            base_path: settings.server.base_path.clone(),
            browser_cache_max_age: settings.cache.browser_cache_max_age,
        },
        admin: AdminState {
            catalog: catalog.clone(),
            cache: cache.clone(),
            api_key: settings.cache.api_key.clone(),
        },
    };

    let router = http::build_router(router_state, &settings.server, !settings.cache.disable_api);

    serve(&settings, router).await
}

async fn serve(settings: &config::Settings, router: axum::Router) -> Result<(), InfraError> {
    let listener = TcpListener::bind(settings.server.addr).await?;
    info!(
        target = SOURCE,
        addr = %settings.server.addr,
        base_path = %settings.server.base_path,
        "listening"
    );

    let grace = settings.server.graceful_shutdown;
    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = drain_tx.send(());
    });

    // The drain timer only starts once the shutdown signal has fired.
    tokio::select! {
        result = server => Ok(result?),
        _ = async {
            let _ = drain_rx.await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = SOURCE,
                grace_secs = grace.as_secs(),
                "graceful shutdown window elapsed, exiting with connections open"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = SOURCE, error = %err, "failed to install interrupt handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = SOURCE, error = %err, "failed to install terminate handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!(target = SOURCE, "shutdown signal received");
}

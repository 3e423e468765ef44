/*
 * Responsibility
 * - tracing / panic hook 初期化
 * - Config読み込み → 依存生成 (store, auth gate) → Router 組み立て
 * - Middleware の適用 (HTTP / CORS / security headers)
 * - axum::serve() で起動 (Ctrl+C / SIGTERM で graceful shutdown)
 */
use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    api,
    config::Config,
    middleware,
    repos::volcano_repo::{InMemoryVolcanoStore, PgVolcanoStore, VolcanoStore},
    services::auth::build_auth_gate,
    state::AppState,
};

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,volcano_api=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // development: crash the whole process; production: default hook, keep serving.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env().context("loading configuration")?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting API in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config).await?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    tracing::info!("shut down");
    Ok(())
}

async fn build_state(config: &Config) -> Result<AppState> {
    let store: Arc<dyn VolcanoStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("connecting to DATABASE_URL")?;
            let store = PgVolcanoStore::new(pool);
            store
                .ensure_schema()
                .await
                .context("preparing volcanoes table")?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; volcano documents are kept in memory");
            Arc::new(InMemoryVolcanoStore::new())
        }
    };

    // Metadata is resolved lazily on the first authorized request.
    let auth = build_auth_gate(config).context("building auth gate")?;
    tracing::info!(
        tenant = %config.auth_tenant,
        authority = %config.auth_authority,
        store = store.backend(),
        "services ready"
    );

    Ok(AppState::new(store, auth))
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .nest("/api/v1", api::v1::routes(state.clone()))
        .with_state(state);

    let router = middleware::security_headers::apply(router, config);
    let router = middleware::cors::apply(router, config);
    middleware::http::apply(router)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

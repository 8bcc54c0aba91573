use crate::{
    app_state::AppState,
    axum_http::{default_routers, routers},
};
use anyhow::Result;
use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{info, warn};

pub fn build_router(state: &AppState) -> Result<Router> {
    let config = &state.config;
    let allowed_origins = vec![
        "http://localhost".parse()?,
        "http://127.0.0.1".parse()?,
        "http://localhost:3000".parse()?,
        "http://127.0.0.1:3000".parse()?,
    ];

    let app = Router::new()
        .fallback(default_routers::not_found)
        .nest(
            "/internal/v1/bots",
            routers::bots::routes(Arc::clone(config), Arc::clone(&state.orchestrator)),
        )
        .nest(
            "/internal/v1/admin",
            routers::admin::routes(Arc::clone(config), Arc::clone(&state.orchestrator)),
        )
        .nest(
            "/internal/v1/payments",
            routers::payments::routes(Arc::clone(config), Arc::clone(&state.payment_events)),
        )
        .nest(
            "/internal/v1/activity",
            routers::activity::routes(Arc::clone(config), Arc::clone(&state.activity)),
        )
        .nest(
            "/internal/v1/guilds",
            routers::guild_settings::routes(Arc::clone(config), Arc::clone(&state.guild_settings)),
        )
        .route("/health-check", get(default_routers::health_check))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.worker_server.timeout,
        )))
        .layer(RequestBodyLimitLayer::new(
            (config.worker_server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::PUT])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_origin(allowed_origins),
        )
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

pub async fn start(state: AppState) -> Result<()> {
    let app = build_router(&state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.worker_server.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "http: worker server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("http: worker server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "http: failed to install ctrl+c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                warn!(%error, "http: failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("http: received ctrl+c"),
        _ = terminate => info!("http: received terminate signal"),
    }
}

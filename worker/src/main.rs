use anyhow::Result;
use crates::{
    domain::repositories::{operator_channel::OperatorChannel, token_cipher::TokenCipher},
    infra::{crypto::aes_token_cipher::AesTokenCipher, db::postgres::postgres_connection},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use worker::{
    app_state::AppState,
    axum_http, config,
    services::worker_loop::{run_health_loop, run_idle_loop, run_reconcile_loop},
};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(error) = run().await {
        error!("Worker exited with error: {}", error);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    crates::observability::init_observability("worker")?;

    let dotenvy_env = Arc::new(config::config_loader::load()?);
    info!(stage = %dotenvy_env.stage, "ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(
        &dotenvy_env.database.url,
        dotenvy_env.database.max_connections,
    )?;
    info!("Postgres connection has been established");

    let operator: Arc<dyn OperatorChannel + Send + Sync> =
        Arc::new(crates::observability::operator_notifier("worker")?);

    let tokens: Arc<dyn TokenCipher + Send + Sync> = Arc::new(AesTokenCipher::new(
        &dotenvy_env.bot_tokens.encryption_key,
    )?);

    let state = AppState::build(
        Arc::clone(&dotenvy_env),
        Arc::new(postgres_pool),
        operator,
        tokens,
    );

    // Bring workers back in line with persisted intent before taking traffic.
    match state.orchestrator.reconcile_all().await {
        Ok(summary) => info!(
            accounts = summary.accounts,
            changed = summary.changed,
            failed = summary.failed,
            "startup reconcile finished"
        ),
        Err(err) => error!(error = %err, "startup reconcile failed"),
    }

    let cancel = CancellationToken::new();
    let orchestrator_config = &dotenvy_env.orchestrator;

    let reconcile_loop = tokio::spawn(run_reconcile_loop(
        Arc::clone(&state.orchestrator),
        orchestrator_config.reconcile_interval,
        cancel.child_token(),
    ));
    let health_loop = tokio::spawn(run_health_loop(
        Arc::clone(&state.orchestrator),
        dotenvy_env.supervisor.heartbeat_interval,
        cancel.child_token(),
    ));
    let idle_loop = tokio::spawn(run_idle_loop(
        Arc::clone(&state.orchestrator),
        orchestrator_config.idle_sweep_interval,
        cancel.child_token(),
    ));

    let orchestrator = Arc::clone(&state.orchestrator);
    let server = tokio::spawn(axum_http::http_serve::start(state));

    let served = server.await;

    info!("shutting down background loops");
    cancel.cancel();
    let (reconcile, health, idle) = tokio::join!(reconcile_loop, health_loop, idle_loop);
    for joined in [reconcile, health, idle] {
        if let Err(err) = joined {
            error!(error = %err, "background loop panicked");
        }
    }

    orchestrator.shutdown().await;
    info!("all supervised instances stopped");

    served??;
    Ok(())
}

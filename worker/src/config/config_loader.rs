use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};

use super::config_model::{
    BackoffConfig, BotRuntime, BotTokens, Database, DotEnvyConfig, InternalApi,
    OrchestratorConfig, SupervisorConfig, WorkerServer,
};
use crate::config::stage::Stage;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let stage = get_stage();

    let worker_server = WorkerServer {
        port: parse_or("SERVER_PORT_WORKER", 8090)?,
        body_limit: parse_or("SERVER_BODY_LIMIT", 1)?,
        timeout: parse_or("SERVER_TIMEOUT", 90)?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").context("DATABASE_URL is invalid")?,
        max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
    };

    let internal_api = InternalApi {
        token: std::env::var("INTERNAL_API_TOKEN").ok().and_then(|v| {
            let trimmed = v.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        }),
    };

    // Workers share the orchestrator's database and cache.
    let mut pass_through_env = vec![("NODE_ENV".to_string(), stage.runtime_mode().to_string())];
    for key in ["DATABASE_URL", "REDIS_URL"] {
        if let Ok(value) = std::env::var(key) {
            pass_through_env.push((key.to_string(), value));
        }
    }

    let bot_runtime = BotRuntime {
        program: std::env::var("BOT_RUNTIME_PROGRAM").unwrap_or_else(|_| "node".to_string()),
        args: std::env::var("BOT_RUNTIME_ARGS")
            .unwrap_or_else(|_| "bot/index.js".to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect(),
        working_dir: std::env::var("BOT_RUNTIME_WORKDIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from),
        pass_through_env,
    };

    let bot_tokens = BotTokens {
        encryption_key: std::env::var("ENCRYPTION_KEY").context("ENCRYPTION_KEY is invalid")?,
    };
    if bot_tokens.encryption_key.len() != 32 {
        anyhow::bail!("ENCRYPTION_KEY must be exactly 32 bytes long");
    }

    let supervisor_defaults = SupervisorConfig::default();
    let supervisor = SupervisorConfig {
        ready_timeout: secs_or("BOT_READY_TIMEOUT_SECS", supervisor_defaults.ready_timeout)?,
        stop_grace: secs_or("BOT_STOP_GRACE_SECS", supervisor_defaults.stop_grace)?,
        poll_interval: Duration::from_millis(parse_or(
            "BOT_POLL_INTERVAL_MS",
            supervisor_defaults.poll_interval.as_millis() as u64,
        )?),
        heartbeat_interval: secs_or(
            "BOT_HEARTBEAT_INTERVAL_SECS",
            supervisor_defaults.heartbeat_interval,
        )?,
        max_missed_heartbeats: parse_or(
            "BOT_MAX_MISSED_HEARTBEATS",
            supervisor_defaults.max_missed_heartbeats,
        )?,
    };

    let backoff_defaults = BackoffConfig::default();
    let backoff = BackoffConfig {
        base: secs_or("RESTART_BACKOFF_BASE_SECS", backoff_defaults.base)?,
        cap: secs_or("RESTART_BACKOFF_CAP_SECS", backoff_defaults.cap)?,
        healthy_reset: secs_or("RESTART_HEALTHY_RESET_SECS", backoff_defaults.healthy_reset)?,
        crash_loop_ceiling: parse_or("CRASH_LOOP_CEILING", backoff_defaults.crash_loop_ceiling)?,
    };
    if backoff.cap < backoff.base {
        anyhow::bail!("RESTART_BACKOFF_CAP_SECS must not be below RESTART_BACKOFF_BASE_SECS");
    }

    let orchestrator_defaults = OrchestratorConfig::default();
    let orchestrator = OrchestratorConfig {
        reconcile_interval: secs_or(
            "RECONCILE_INTERVAL_SECS",
            orchestrator_defaults.reconcile_interval,
        )?,
        idle_sweep_interval: secs_or(
            "IDLE_SWEEP_INTERVAL_SECS",
            orchestrator_defaults.idle_sweep_interval,
        )?,
        idle_threshold: secs_or("IDLE_THRESHOLD_SECS", orchestrator_defaults.idle_threshold)?,
        persist_retries: parse_or("PERSIST_RETRIES", orchestrator_defaults.persist_retries)?,
        reconcile_concurrency: parse_or(
            "RECONCILE_CONCURRENCY",
            orchestrator_defaults.reconcile_concurrency,
        )?
        .max(1),
        backoff,
    };

    Ok(DotEnvyConfig {
        stage,
        worker_server,
        database,
        internal_api,
        bot_runtime,
        bot_tokens,
        supervisor,
        orchestrator,
    })
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or("".to_string());
    Stage::try_from(&stage_str).unwrap_or_default()
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} is invalid")),
        _ => Ok(default),
    }
}

fn secs_or(key: &str, default: Duration) -> Result<Duration> {
    parse_or(key, default.as_secs()).map(Duration::from_secs)
}

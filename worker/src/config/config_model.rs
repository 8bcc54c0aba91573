use std::{path::PathBuf, time::Duration};

use crate::config::stage::Stage;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub stage: Stage,
    pub worker_server: WorkerServer,
    pub database: Database,
    pub internal_api: InternalApi,
    pub bot_runtime: BotRuntime,
    pub bot_tokens: BotTokens,
    pub supervisor: SupervisorConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerServer {
    pub port: u16,
    pub timeout: u64,
    pub body_limit: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct InternalApi {
    /// Bearer token for `/internal/v1/*`. Routes answer 503 when unset.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BotRuntime {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub pass_through_env: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct BotTokens {
    /// Raw 32-byte AES-256 key the stored bot tokens are sealed with.
    pub encryption_key: String,
}

impl std::fmt::Debug for BotTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotTokens")
            .field("encryption_key", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub ready_timeout: Duration,
    pub stop_grace: Duration,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub max_missed_heartbeats: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(60),
            stop_grace: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
            heartbeat_interval: Duration::from_secs(15),
            max_missed_heartbeats: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub base: Duration,
    pub cap: Duration,
    /// Uptime after which the crash counter is forgotten.
    pub healthy_reset: Duration,
    pub crash_loop_ceiling: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            cap: Duration::from_secs(300),
            healthy_reset: Duration::from_secs(600),
            crash_loop_ceiling: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub reconcile_interval: Duration,
    pub idle_sweep_interval: Duration,
    pub idle_threshold: Duration,
    pub persist_retries: u32,
    pub reconcile_concurrency: usize,
    pub backoff: BackoffConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(180),
            idle_sweep_interval: Duration::from_secs(60),
            idle_threshold: Duration::from_secs(300),
            persist_retries: 3,
            reconcile_concurrency: 16,
            backoff: BackoffConfig::default(),
        }
    }
}

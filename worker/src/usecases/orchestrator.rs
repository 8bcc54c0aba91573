use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use crates::domain::{
    entities::audit_records::NewAuditRecord,
    repositories::{
        audit::AuditRepository, bot_instances::BotInstanceRepository,
        entitlements::EntitlementRepository, operator_channel::OperatorChannel,
        token_cipher::TokenCipher,
    },
    value_objects::{
        bot_instances::{InstanceRecord, InstanceStateUpdate, LaunchSpec, ProcessRef, SaveOutcome},
        entitlements::{Entitlement, EntitlementState, GuildEntitlement},
        enums::{bot_statuses::BotStatus, transition_causes::TransitionCause},
        operator_alerts::OperatorAlert,
        plans::{Capability, FeatureCeiling},
    },
};
use futures_util::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::config_model::OrchestratorConfig,
    services::{
        backoff::{RestartBackoff, RestartDecision},
        keyed_locks::KeyedLocks,
        supervisor::{StateTransition, SupervisedState, Supervisor, SupervisorError},
    },
    usecases::{
        activity_tracker::idle_for,
        entitlement_engine::{EntitlementEngine, EntitlementError, effective_ceiling},
    },
};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("account not found")]
    AccountNotFound,
    #[error("bot instance not found")]
    InstanceNotFound,
    #[error("no free bot slot ({remaining} of {slots_total} remaining)")]
    QuotaExceeded { remaining: u32, slots_total: u32 },
    #[error("account is not entitled to run a bot")]
    NotEntitled,
    #[error("bot instance is disabled")]
    InstanceDisabled,
    #[error("bot instance is busy; retry shortly")]
    InstanceBusy,
    #[error("state could not be persisted: {0}")]
    PartialFailure(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl OrchestratorError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            OrchestratorError::AccountNotFound | OrchestratorError::InstanceNotFound => {
                StatusCode::NOT_FOUND
            }
            OrchestratorError::QuotaExceeded { .. }
            | OrchestratorError::NotEntitled
            | OrchestratorError::InstanceDisabled => StatusCode::FORBIDDEN,
            OrchestratorError::InstanceBusy => StatusCode::CONFLICT,
            OrchestratorError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::PartialFailure(_) | OrchestratorError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::AccountNotFound => "account_not_found",
            OrchestratorError::InstanceNotFound => "instance_not_found",
            OrchestratorError::QuotaExceeded { .. } => "quota_exceeded",
            OrchestratorError::NotEntitled => "not_entitled",
            OrchestratorError::InstanceDisabled => "instance_disabled",
            OrchestratorError::InstanceBusy => "instance_busy",
            OrchestratorError::PartialFailure(_) => "partial_failure",
            OrchestratorError::InvalidRequest(_) => "invalid_request",
            OrchestratorError::Internal(_) => "internal_error",
        }
    }
}

impl From<EntitlementError> for OrchestratorError {
    fn from(err: EntitlementError) -> Self {
        match err {
            EntitlementError::AccountNotFound => OrchestratorError::AccountNotFound,
            EntitlementError::GuildNotFound => {
                OrchestratorError::InvalidRequest("unknown guild".to_string())
            }
            EntitlementError::Internal(err) => OrchestratorError::Internal(err),
        }
    }
}

impl From<SupervisorError> for OrchestratorError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::AlreadyRunning | SupervisorError::Busy => {
                OrchestratorError::InstanceBusy
            }
            SupervisorError::Disabled => OrchestratorError::InstanceDisabled,
            SupervisorError::Internal(err) => OrchestratorError::Internal(err),
        }
    }
}

pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileTrigger {
    Timer,
    PaymentSucceeded,
    IdleSweep,
    HealthSweep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    None,
    Started,
    Stopped,
    Restarted,
    /// Restart held back by the crash backoff.
    Suppressed,
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub account_id: Uuid,
    pub instance_id: Uuid,
    pub action: ReconcileAction,
    pub status: BotStatus,
    pub transitions: Vec<StateTransition>,
    pub slots_used: u32,
    pub slots_total: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatusView {
    pub account_id: Uuid,
    pub instance_id: Uuid,
    pub persisted_status: BotStatus,
    pub supervised_status: BotStatus,
    pub process_ref: Option<ProcessRef>,
    pub wants_running: bool,
    pub running_for_secs: Option<u64>,
    pub consecutive_crashes: u32,
    pub entitlement: Entitlement,
    pub guild: Option<GuildEntitlement>,
    pub effective_ceiling: FeatureCeiling,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub accounts: usize,
    pub changed: usize,
    pub failed: usize,
}

/// Re-evaluates one account against its entitlement. Payment handling depends on this
/// rather than on the concrete orchestrator.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait AccountReconciler: Send + Sync {
    async fn reconcile_account(
        &self,
        account_id: Uuid,
        trigger: ReconcileTrigger,
    ) -> OrchestratorResult<ReconcileOutcome>;
}

pub struct Orchestrator<I, A, E>
where
    I: BotInstanceRepository + Send + Sync + 'static,
    A: AuditRepository + Send + Sync + 'static,
    E: EntitlementRepository + Send + Sync + 'static,
{
    instance_repo: Arc<I>,
    audit_repo: Arc<A>,
    entitlements: Arc<EntitlementEngine<E>>,
    supervisor: Arc<dyn Supervisor + Send + Sync>,
    operator: Arc<dyn OperatorChannel + Send + Sync>,
    tokens: Arc<dyn TokenCipher + Send + Sync>,
    backoff: RestartBackoff,
    locks: KeyedLocks,
    config: OrchestratorConfig,
}

impl<I, A, E> Orchestrator<I, A, E>
where
    I: BotInstanceRepository + Send + Sync + 'static,
    A: AuditRepository + Send + Sync + 'static,
    E: EntitlementRepository + Send + Sync + 'static,
{
    pub fn new(
        instance_repo: Arc<I>,
        audit_repo: Arc<A>,
        entitlements: Arc<EntitlementEngine<E>>,
        supervisor: Arc<dyn Supervisor + Send + Sync>,
        operator: Arc<dyn OperatorChannel + Send + Sync>,
        tokens: Arc<dyn TokenCipher + Send + Sync>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            instance_repo,
            audit_repo,
            entitlements,
            supervisor,
            operator,
            tokens,
            backoff: RestartBackoff::new(config.backoff.clone()),
            locks: KeyedLocks::new(),
            config,
        }
    }

    pub async fn request_start(&self, account_id: Uuid) -> OrchestratorResult<ReconcileOutcome> {
        let instance_id = self.load_by_account(account_id).await?.id;
        let _guard = self.locks.acquire(instance_id).await;
        let record = self.reload(instance_id).await?;

        let actual = self.supervisor.current_state(instance_id).await;
        if record.status == BotStatus::Disabled || actual.status == BotStatus::Disabled {
            return Err(OrchestratorError::InstanceDisabled);
        }

        let entitlement = self
            .entitlements
            .resolve(
                account_id,
                u32::from(actual.status.occupies_slot()),
                Utc::now(),
            )
            .await?;

        if actual.status.occupies_slot() {
            info!(%account_id, %instance_id, status = %actual.status, "orchestrator: start requested but instance already up");
            let status = self.persist(&record, true, &[]).await?;
            return Ok(outcome(&record, ReconcileAction::None, status, Vec::new(), &entitlement));
        }

        if entitlement.state == EntitlementState::Inconsistent {
            return Err(OrchestratorError::NotEntitled);
        }
        if !entitlement.entitled() || !entitlement.has_free_slot() {
            info!(
                %account_id,
                plan = %entitlement.plan,
                slots_total = entitlement.slots_total,
                "orchestrator: start rejected; no free slot"
            );
            return Err(OrchestratorError::QuotaExceeded {
                remaining: entitlement.remaining_slots(),
                slots_total: entitlement.slots_total,
            });
        }

        self.backoff.reset(instance_id).await;
        let transitions = self
            .launch(&record, &entitlement, TransitionCause::UserRequest)
            .await?;
        self.note_crashes(&record, &transitions).await;
        let status = self.persist(&record, true, &transitions).await?;

        info!(%account_id, %instance_id, %status, "orchestrator: instance started");
        Ok(outcome(&record, ReconcileAction::Started, status, transitions, &entitlement))
    }

    pub async fn request_stop(&self, account_id: Uuid) -> OrchestratorResult<ReconcileOutcome> {
        let instance_id = self.load_by_account(account_id).await?.id;
        // An in-flight start holds the lock; ask it to give up first.
        let cancelled = self.supervisor.cancel_start(instance_id).await;
        let _guard = self.locks.acquire(instance_id).await;
        let record = self.reload(instance_id).await?;

        let transitions = self
            .supervisor
            .stop(instance_id, TransitionCause::UserRequest)
            .await?;
        let status = self.persist(&record, false, &transitions).await?;
        let entitlement = self.entitlements.resolve(account_id, 0, Utc::now()).await?;

        let action = if transitions.is_empty() && !cancelled {
            ReconcileAction::None
        } else {
            info!(%account_id, %instance_id, "orchestrator: instance stopped");
            ReconcileAction::Stopped
        };
        Ok(outcome(&record, action, status, transitions, &entitlement))
    }

    pub async fn request_restart(&self, account_id: Uuid) -> OrchestratorResult<ReconcileOutcome> {
        let instance_id = self.load_by_account(account_id).await?.id;
        self.supervisor.cancel_start(instance_id).await;
        let _guard = self.locks.acquire(instance_id).await;
        let record = self.reload(instance_id).await?;

        if record.status == BotStatus::Disabled {
            return Err(OrchestratorError::InstanceDisabled);
        }

        // The restarting instance frees its own slot first.
        let entitlement = self.entitlements.resolve(account_id, 0, Utc::now()).await?;
        if entitlement.state == EntitlementState::Inconsistent {
            return Err(OrchestratorError::NotEntitled);
        }
        if !entitlement.entitled() {
            return Err(OrchestratorError::QuotaExceeded {
                remaining: entitlement.remaining_slots(),
                slots_total: entitlement.slots_total,
            });
        }

        let mut transitions = self
            .supervisor
            .stop(instance_id, TransitionCause::UserRequest)
            .await?;
        self.backoff.reset(instance_id).await;
        transitions.extend(
            self.launch(&record, &entitlement, TransitionCause::UserRequest)
                .await?,
        );
        self.note_crashes(&record, &transitions).await;
        let status = self.persist(&record, true, &transitions).await?;

        info!(%account_id, %instance_id, %status, "orchestrator: instance restarted");
        Ok(outcome(&record, ReconcileAction::Restarted, status, transitions, &entitlement))
    }

    pub async fn disable(
        &self,
        account_id: Uuid,
        reason: &str,
    ) -> OrchestratorResult<ReconcileOutcome> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "a reason is required".to_string(),
            ));
        }

        let instance_id = self.load_by_account(account_id).await?.id;
        self.supervisor.cancel_start(instance_id).await;
        let _guard = self.locks.acquire(instance_id).await;
        let record = self.reload(instance_id).await?;

        let transitions = self
            .supervisor
            .disable(instance_id, TransitionCause::AdminDisable)
            .await?;
        self.backoff.reset(instance_id).await;
        let status = self.persist(&record, false, &transitions).await?;

        if !transitions.is_empty() {
            warn!(%account_id, %instance_id, reason, "orchestrator: instance disabled");
            self.operator.notify(OperatorAlert::InstanceDisabled {
                instance_id,
                account_id,
                reason: reason.to_string(),
            });
        }

        let entitlement = self.entitlements.resolve(account_id, 0, Utc::now()).await?;
        Ok(outcome(&record, ReconcileAction::Disabled, status, transitions, &entitlement))
    }

    pub async fn enable(&self, account_id: Uuid) -> OrchestratorResult<ReconcileOutcome> {
        let instance_id = self.load_by_account(account_id).await?.id;
        let _guard = self.locks.acquire(instance_id).await;
        let record = self.reload(instance_id).await?;
        let entitlement = self.entitlements.resolve(account_id, 0, Utc::now()).await?;

        let actual = self.supervisor.current_state(instance_id).await;
        if record.status != BotStatus::Disabled && actual.status != BotStatus::Disabled {
            let status = self.persist(&record, record.wants_running, &[]).await?;
            return Ok(outcome(&record, ReconcileAction::None, status, Vec::new(), &entitlement));
        }

        let mut transitions = Vec::new();
        if actual.status != BotStatus::Disabled {
            // The disable predates this daemon run.
            transitions.extend(
                self.supervisor
                    .disable(instance_id, TransitionCause::Resync)
                    .await?,
            );
        }
        transitions.extend(self.supervisor.enable(instance_id).await?);
        self.backoff.reset(instance_id).await;
        let status = self.persist(&record, false, &transitions).await?;

        info!(%account_id, %instance_id, "orchestrator: instance enabled");
        Ok(outcome(&record, ReconcileAction::Enabled, status, transitions, &entitlement))
    }

    pub async fn status(
        &self,
        account_id: Uuid,
        guild_id: Option<&str>,
    ) -> OrchestratorResult<InstanceStatusView> {
        let record = self.load_by_account(account_id).await?;
        let actual = self.supervisor.current_state(record.id).await;
        let now = Utc::now();

        let entitlement = self
            .entitlements
            .resolve(account_id, u32::from(actual.status.occupies_slot()), now)
            .await?;
        let guild = match guild_id {
            Some(guild_id) => Some(self.entitlements.resolve_guild(guild_id, 0, now).await?),
            None => None,
        };
        let effective_ceiling = effective_ceiling(&entitlement, guild.as_ref());

        Ok(InstanceStatusView {
            account_id,
            instance_id: record.id,
            persisted_status: record.status,
            supervised_status: actual.status,
            process_ref: actual.process_ref,
            wants_running: record.wants_running,
            running_for_secs: actual.running_for.map(|d| d.as_secs()),
            consecutive_crashes: self.backoff.consecutive_crashes(record.id).await,
            entitlement,
            guild,
            effective_ceiling,
        })
    }

    /// One pass over every account that owns an instance.
    pub async fn reconcile_all(&self) -> OrchestratorResult<ReconcileSummary> {
        let account_ids = self.instance_repo.list_account_ids().await?;
        let accounts = account_ids.len();
        let changed = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        futures_util::stream::iter(account_ids)
            .for_each_concurrent(self.config.reconcile_concurrency.max(1), |account_id| {
                let changed = &changed;
                let failed = &failed;
                async move {
                    match self
                        .reconcile_account(account_id, ReconcileTrigger::Timer)
                        .await
                    {
                        Ok(outcome) if outcome.action != ReconcileAction::None => {
                            changed.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(_) => {}
                        Err(err) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            warn!(%account_id, error = %err, "orchestrator: reconcile failed");
                        }
                    }
                }
            })
            .await;

        Ok(ReconcileSummary {
            accounts,
            changed: changed.into_inner(),
            failed: failed.into_inner(),
        })
    }

    /// Probes running workers and gives crashed ones a chance to restart.
    pub async fn health_sweep(&self) -> usize {
        let changed = AtomicUsize::new(0);
        let candidates = self
            .supervisor
            .supervised_instances()
            .await
            .into_iter()
            .filter(|(_, status)| matches!(status, BotStatus::Running | BotStatus::Crashed));

        futures_util::stream::iter(candidates)
            .for_each_concurrent(self.config.reconcile_concurrency.max(1), |(instance_id, _)| {
                let changed = &changed;
                async move {
                    match self.health_check_locked(instance_id).await {
                        Ok(true) => {
                            changed.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(false) => {}
                        Err(err) => {
                            warn!(%instance_id, error = %err, "orchestrator: health check failed")
                        }
                    }
                }
            })
            .await;

        changed.into_inner()
    }

    async fn health_check_locked(&self, instance_id: Uuid) -> OrchestratorResult<bool> {
        let _guard = self.locks.acquire(instance_id).await;

        let transitions = self.supervisor.health_check(instance_id).await?;
        if !transitions.is_empty() {
            let record = self.reload(instance_id).await?;
            self.note_crashes(&record, &transitions).await;
            self.persist(&record, record.wants_running, &transitions)
                .await?;
        }

        let crashed = self.supervisor.current_state(instance_id).await.status == BotStatus::Crashed;
        if crashed {
            let outcome = self
                .reconcile_locked(instance_id, ReconcileTrigger::HealthSweep)
                .await?;
            return Ok(!transitions.is_empty() || outcome.action != ReconcileAction::None);
        }
        Ok(!transitions.is_empty())
    }

    /// Stops running workers nobody has used for a while.
    pub async fn idle_sweep(&self) -> usize {
        let stopped = AtomicUsize::new(0);
        let running = self
            .supervisor
            .supervised_instances()
            .await
            .into_iter()
            .filter(|(_, status)| *status == BotStatus::Running);

        futures_util::stream::iter(running)
            .for_each_concurrent(self.config.reconcile_concurrency.max(1), |(instance_id, _)| {
                let stopped = &stopped;
                async move {
                    let _guard = self.locks.acquire(instance_id).await;
                    match self
                        .reconcile_locked(instance_id, ReconcileTrigger::IdleSweep)
                        .await
                    {
                        Ok(outcome) if outcome.action == ReconcileAction::Stopped => {
                            stopped.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(%instance_id, error = %err, "orchestrator: idle check failed")
                        }
                    }
                }
            })
            .await;

        stopped.into_inner()
    }

    /// Stops every supervised worker. Owners' intent is kept so the next run restarts them.
    pub async fn shutdown(&self) {
        let instances = self.supervisor.supervised_instances().await;
        info!(count = instances.len(), "orchestrator: stopping supervised instances");

        for (instance_id, _) in instances {
            self.supervisor.cancel_start(instance_id).await;
            let _guard = self.locks.acquire(instance_id).await;
            let transitions = match self
                .supervisor
                .stop(instance_id, TransitionCause::Shutdown)
                .await
            {
                Ok(transitions) => transitions,
                Err(err) => {
                    error!(%instance_id, error = %err, "orchestrator: shutdown stop failed");
                    continue;
                }
            };
            match self.reload(instance_id).await {
                Ok(record) => {
                    if let Err(err) = self
                        .persist(&record, record.wants_running, &transitions)
                        .await
                    {
                        error!(%instance_id, error = %err, "orchestrator: shutdown persist failed");
                    }
                }
                Err(err) => error!(%instance_id, error = %err, "orchestrator: shutdown reload failed"),
            }
        }
    }

    async fn reconcile_locked(
        &self,
        instance_id: Uuid,
        trigger: ReconcileTrigger,
    ) -> OrchestratorResult<ReconcileOutcome> {
        let record = self.reload(instance_id).await?;
        let actual = self.supervisor.current_state(instance_id).await;
        let now = Utc::now();
        let entitlement = self
            .entitlements
            .resolve(
                record.account_id,
                u32::from(actual.status.occupies_slot()),
                now,
            )
            .await?;

        let mut wants_running = record.wants_running;
        let mut transitions = Vec::new();
        let mut action = ReconcileAction::None;

        if record.status == BotStatus::Disabled && actual.status != BotStatus::Disabled {
            transitions.extend(
                self.supervisor
                    .disable(instance_id, TransitionCause::Resync)
                    .await?,
            );
            action = ReconcileAction::Disabled;
        } else {
            match actual.status {
                BotStatus::Disabled | BotStatus::Starting | BotStatus::Stopping => {}
                status if !entitlement.entitled() && !status.is_at_rest() => {
                    info!(
                        account_id = %record.account_id,
                        %instance_id,
                        state = ?entitlement.state,
                        "orchestrator: entitlement gone; stopping instance"
                    );
                    transitions.extend(
                        self.supervisor
                            .stop(instance_id, TransitionCause::EntitlementRevoked)
                            .await?,
                    );
                    action = ReconcileAction::Stopped;
                }
                BotStatus::Running => {
                    if !wants_running {
                        transitions.extend(
                            self.supervisor
                                .stop(instance_id, TransitionCause::Resync)
                                .await?,
                        );
                        action = ReconcileAction::Stopped;
                    } else if self.is_idle(&record, &actual, &entitlement, now) {
                        info!(
                            account_id = %record.account_id,
                            %instance_id,
                            "orchestrator: instance idle; stopping"
                        );
                        transitions.extend(
                            self.supervisor
                                .stop(instance_id, TransitionCause::IdleTimeout)
                                .await?,
                        );
                        wants_running = false;
                        action = ReconcileAction::Stopped;
                    } else if let Some(running_for) = actual.running_for {
                        if self.backoff.record_uptime(instance_id, running_for).await {
                            debug!(%instance_id, "orchestrator: crash history cleared after healthy run");
                        }
                    }
                }
                BotStatus::Crashed if !wants_running => {
                    transitions.extend(
                        self.supervisor
                            .stop(instance_id, TransitionCause::Resync)
                            .await?,
                    );
                    action = ReconcileAction::Stopped;
                }
                BotStatus::Crashed => match self.backoff.restart_decision(instance_id).await {
                    RestartDecision::Allowed => {
                        transitions.extend(
                            self.launch(&record, &entitlement, TransitionCause::AutoHeal)
                                .await?,
                        );
                        action = ReconcileAction::Restarted;
                    }
                    RestartDecision::Wait { remaining } => {
                        debug!(
                            %instance_id,
                            remaining_ms = remaining.as_millis() as u64,
                            "orchestrator: restart held by backoff"
                        );
                        action = ReconcileAction::Suppressed;
                    }
                    RestartDecision::CrashLoop { consecutive } => {
                        debug!(%instance_id, consecutive, "orchestrator: crash loop; not restarting");
                        action = ReconcileAction::Suppressed;
                    }
                },
                BotStatus::Stopped
                    if wants_running && entitlement.entitled() && entitlement.has_free_slot() =>
                {
                    let cause = match trigger {
                        ReconcileTrigger::PaymentSucceeded => TransitionCause::PaymentSucceeded,
                        _ => TransitionCause::AutoHeal,
                    };
                    transitions.extend(self.launch(&record, &entitlement, cause).await?);
                    action = ReconcileAction::Started;
                }
                _ => {}
            }
        }

        self.note_crashes(&record, &transitions).await;
        let status = self.persist(&record, wants_running, &transitions).await?;
        if action != ReconcileAction::None {
            debug!(
                account_id = %record.account_id,
                %instance_id,
                ?trigger,
                ?action,
                %status,
                "orchestrator: reconciled"
            );
        }
        Ok(outcome(&record, action, status, transitions, &entitlement))
    }

    fn is_idle(
        &self,
        record: &InstanceRecord,
        actual: &SupervisedState,
        entitlement: &Entitlement,
        now: chrono::DateTime<Utc>,
    ) -> bool {
        let persistent =
            record.enable_247 && entitlement.feature_ceiling.allows(Capability::PersistentPresence);
        !persistent && idle_for(record.last_activity, actual.running_for, now) > self.config.idle_threshold
    }

    async fn launch(
        &self,
        record: &InstanceRecord,
        entitlement: &Entitlement,
        cause: TransitionCause,
    ) -> OrchestratorResult<Vec<StateTransition>> {
        if !entitlement.has_free_slot() {
            return Err(OrchestratorError::QuotaExceeded {
                remaining: entitlement.remaining_slots(),
                slots_total: entitlement.slots_total,
            });
        }

        let mut launch = LaunchSpec::for_instance(record, &entitlement.feature_ceiling);
        launch.bot_token = self.tokens.reveal(&record.bot_token).map_err(|err| {
            error!(
                account_id = %record.account_id,
                instance_id = %record.id,
                error = %err,
                "orchestrator: stored bot token cannot be decrypted"
            );
            OrchestratorError::Internal(err.context("bot token could not be decrypted"))
        })?;
        match self.supervisor.start(launch, cause).await {
            Ok(transitions) => Ok(transitions),
            Err(SupervisorError::AlreadyRunning) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn note_crashes(&self, record: &InstanceRecord, transitions: &[StateTransition]) {
        for transition in transitions.iter().filter(|t| t.to == BotStatus::Crashed) {
            let verdict = self.backoff.record_crash(record.id).await;
            warn!(
                account_id = %record.account_id,
                instance_id = %record.id,
                cause = %transition.cause,
                consecutive = verdict.consecutive,
                retry_in_secs = verdict.delay.as_secs(),
                "orchestrator: instance crashed"
            );
            if verdict.newly_looping {
                self.operator.notify(OperatorAlert::CrashLoop {
                    instance_id: record.id,
                    account_id: record.account_id,
                    crashes: verdict.consecutive,
                });
            }
        }
    }

    /// Audits each transition, then writes the supervisor's view with a version check.
    async fn persist(
        &self,
        record: &InstanceRecord,
        wants_running: bool,
        transitions: &[StateTransition],
    ) -> OrchestratorResult<BotStatus> {
        let attempts = self.config.persist_retries.max(1);
        let mut failures = Vec::new();

        for transition in transitions {
            if !self.audit(record, transition, attempts).await {
                failures.push(format!(
                    "audit {}→{} ({})",
                    transition.from, transition.to, transition.cause
                ));
            }
        }

        let actual = self.supervisor.current_state(record.id).await;
        let update = InstanceStateUpdate {
            status: actual.status,
            process_ref: actual.process_ref,
            wants_running,
        };

        if update != record.state_update() {
            let mut expected_version = record.version;
            let mut saved = false;
            for attempt in 1..=attempts {
                match self
                    .instance_repo
                    .save_instance_state(record.id, expected_version, update.clone())
                    .await
                {
                    Ok(SaveOutcome::Saved { version }) => {
                        debug!(instance_id = %record.id, version, status = %update.status, "orchestrator: state saved");
                        saved = true;
                        break;
                    }
                    Ok(SaveOutcome::Conflict) => {
                        warn!(instance_id = %record.id, attempt, "orchestrator: version conflict on save");
                        if let Ok(Some(fresh)) = self.instance_repo.get_instance(record.id).await {
                            expected_version = fresh.version;
                        }
                    }
                    Err(err) => {
                        warn!(instance_id = %record.id, attempt, error = ?err, "orchestrator: save failed")
                    }
                }
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
                }
            }
            if !saved {
                failures.push(format!("save status {}", update.status));
            }
        }

        if failures.is_empty() {
            return Ok(update.status);
        }

        let detail = failures.join("; ");
        error!(
            account_id = %record.account_id,
            instance_id = %record.id,
            detail,
            "orchestrator: persistence exhausted retries"
        );
        self.operator.notify(OperatorAlert::PartialFailure {
            instance_id: record.id,
            account_id: record.account_id,
            detail: detail.clone(),
        });
        Err(OrchestratorError::PartialFailure(detail))
    }

    async fn audit(&self, record: &InstanceRecord, transition: &StateTransition, attempts: u32) -> bool {
        for attempt in 1..=attempts {
            let row = NewAuditRecord::transition(
                record.id,
                record.account_id,
                transition.from,
                transition.to,
                transition.cause,
                transition.process_ref.as_ref(),
            );
            match self.audit_repo.record_transition(row).await {
                Ok(()) => return true,
                Err(err) => warn!(instance_id = %record.id, attempt, error = ?err, "orchestrator: audit write failed"),
            }
        }
        false
    }

    async fn load_by_account(&self, account_id: Uuid) -> OrchestratorResult<InstanceRecord> {
        self.instance_repo
            .find_by_account(account_id)
            .await?
            .ok_or(OrchestratorError::InstanceNotFound)
    }

    async fn reload(&self, instance_id: Uuid) -> OrchestratorResult<InstanceRecord> {
        self.instance_repo
            .get_instance(instance_id)
            .await?
            .ok_or(OrchestratorError::InstanceNotFound)
    }
}

#[async_trait]
impl<I, A, E> AccountReconciler for Orchestrator<I, A, E>
where
    I: BotInstanceRepository + Send + Sync + 'static,
    A: AuditRepository + Send + Sync + 'static,
    E: EntitlementRepository + Send + Sync + 'static,
{
    async fn reconcile_account(
        &self,
        account_id: Uuid,
        trigger: ReconcileTrigger,
    ) -> OrchestratorResult<ReconcileOutcome> {
        let instance_id = self.load_by_account(account_id).await?.id;
        let _guard = self.locks.acquire(instance_id).await;
        self.reconcile_locked(instance_id, trigger).await
    }
}

fn outcome(
    record: &InstanceRecord,
    action: ReconcileAction,
    status: BotStatus,
    transitions: Vec<StateTransition>,
    entitlement: &Entitlement,
) -> ReconcileOutcome {
    ReconcileOutcome {
        account_id: record.account_id,
        instance_id: record.id,
        action,
        status,
        transitions,
        slots_used: u32::from(status.occupies_slot()),
        slots_total: entitlement.slots_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use crates::domain::repositories::{
        audit::MockAuditRepository, bot_instances::MockBotInstanceRepository,
        entitlements::MockEntitlementRepository,
    };

    use crate::{
        config::config_model::{BackoffConfig, SupervisorConfig},
        services::supervisor::{MockSupervisor, ProcessSupervisor},
        test_support::{
            FakeProcessManager, InMemoryEntitlements, InMemoryInstances, PlainTokens,
            RecordingAudit, RecordingOperator, free_account, instance_record, premium_until,
        },
    };

    struct Harness {
        orchestrator: Orchestrator<InMemoryInstances, RecordingAudit, InMemoryEntitlements>,
        pm: Arc<FakeProcessManager>,
        instances: Arc<InMemoryInstances>,
        audit: Arc<RecordingAudit>,
        entitlements: Arc<InMemoryEntitlements>,
        operator: Arc<RecordingOperator>,
        account_id: Uuid,
        instance_id: Uuid,
    }

    impl Harness {
        fn new(config: OrchestratorConfig, configure: impl FnOnce(&mut InstanceRecord)) -> Self {
            Self::with_tokens(config, configure, Arc::new(PlainTokens))
        }

        fn with_tokens(
            config: OrchestratorConfig,
            configure: impl FnOnce(&mut InstanceRecord),
            tokens: Arc<dyn TokenCipher + Send + Sync>,
        ) -> Self {
            let account_id = Uuid::new_v4();
            let mut record = instance_record(account_id);
            configure(&mut record);
            let instance_id = record.id;

            let pm = Arc::new(FakeProcessManager::new());
            let instances = Arc::new(InMemoryInstances::with([record]));
            let audit = Arc::new(RecordingAudit::default());
            let entitlements = Arc::new(InMemoryEntitlements::default());
            entitlements.set_account(free_account(account_id));
            let operator = Arc::new(RecordingOperator::default());
            let supervisor = Arc::new(ProcessSupervisor::new(
                Arc::clone(&pm) as _,
                SupervisorConfig::default(),
            ));

            let orchestrator = Orchestrator::new(
                Arc::clone(&instances),
                Arc::clone(&audit),
                Arc::new(EntitlementEngine::new(Arc::clone(&entitlements))),
                supervisor,
                Arc::clone(&operator) as _,
                tokens,
                config,
            );

            Self {
                orchestrator,
                pm,
                instances,
                audit,
                entitlements,
                operator,
                account_id,
                instance_id,
            }
        }

        fn standard() -> Self {
            Self::new(OrchestratorConfig::default(), |_| {})
        }

        fn grant_premium(&self) {
            self.entitlements
                .set_account(premium_until(self.account_id, Utc::now() + ChronoDuration::days(30)));
        }

        fn expire_premium(&self) {
            self.entitlements
                .set_account(premium_until(self.account_id, Utc::now() - ChronoDuration::hours(1)));
        }

        fn persisted(&self) -> InstanceRecord {
            self.instances.record(self.instance_id)
        }

        fn audit_rows(&self) -> Vec<(String, String, String)> {
            self.audit.rows()
        }
    }

    fn row(from: &str, to: &str, cause: &str) -> (String, String, String) {
        (from.to_string(), to.to_string(), cause.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn free_account_start_is_rejected_with_no_remaining_slots() {
        let h = Harness::standard();

        let err = h.orchestrator.request_start(h.account_id).await.unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::QuotaExceeded {
                remaining: 0,
                slots_total: 0
            }
        ));
        assert_eq!(h.pm.spawn_count(), 0);
        assert!(h.audit_rows().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn upgrade_then_start_walks_through_starting_to_running() {
        let h = Harness::standard();
        assert!(h.orchestrator.request_start(h.account_id).await.is_err());

        h.grant_premium();
        let outcome = h.orchestrator.request_start(h.account_id).await.unwrap();

        assert_eq!(outcome.action, ReconcileAction::Started);
        assert_eq!(outcome.status, BotStatus::Running);
        assert_eq!(
            h.audit_rows(),
            vec![
                row("stopped", "starting", "user_request"),
                row("starting", "running", "user_request"),
            ]
        );
        let persisted = h.persisted();
        assert_eq!(persisted.status, BotStatus::Running);
        assert!(persisted.wants_running);
        assert!(persisted.process_ref.is_some());
        assert!(outcome.slots_used <= outcome.slots_total);
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_a_no_op() {
        let h = Harness::standard();
        h.grant_premium();

        h.orchestrator.request_start(h.account_id).await.unwrap();
        let second = h.orchestrator.request_start(h.account_id).await.unwrap();

        assert_eq!(second.action, ReconcileAction::None);
        assert_eq!(second.status, BotStatus::Running);
        assert_eq!(h.pm.spawn_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_twice_yields_stopped_without_error() {
        let h = Harness::standard();
        h.grant_premium();
        h.orchestrator.request_start(h.account_id).await.unwrap();

        let first = h.orchestrator.request_stop(h.account_id).await.unwrap();
        let second = h.orchestrator.request_stop(h.account_id).await.unwrap();

        assert_eq!(first.status, BotStatus::Stopped);
        assert_eq!(second.status, BotStatus::Stopped);
        assert_eq!(second.action, ReconcileAction::None);
        assert!(!h.persisted().wants_running);
        assert_eq!(h.pm.alive_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_premium_is_stopped_in_one_pass_and_resumes_on_payment() {
        let h = Harness::standard();
        h.grant_premium();
        h.orchestrator.request_start(h.account_id).await.unwrap();

        h.expire_premium();
        let summary = h.orchestrator.reconcile_all().await.unwrap();

        assert_eq!(summary, ReconcileSummary { accounts: 1, changed: 1, failed: 0 });
        let persisted = h.persisted();
        assert_eq!(persisted.status, BotStatus::Stopped);
        // Owner intent survives an expiry.
        assert!(persisted.wants_running);
        assert!(h
            .audit_rows()
            .contains(&row("running", "stopping", "entitlement_revoked")));

        h.grant_premium();
        let outcome = h
            .orchestrator
            .reconcile_account(h.account_id, ReconcileTrigger::PaymentSucceeded)
            .await
            .unwrap();

        assert_eq!(outcome.action, ReconcileAction::Started);
        assert_eq!(outcome.status, BotStatus::Running);
        assert!(outcome.slots_used <= outcome.slots_total);
        assert_eq!(
            h.audit_rows().last(),
            Some(&row("starting", "running", "payment_succeeded"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_leaves_free_accounts_stopped() {
        let h = Harness::new(OrchestratorConfig::default(), |r| r.wants_running = true);

        let outcome = h
            .orchestrator
            .reconcile_account(h.account_id, ReconcileTrigger::Timer)
            .await
            .unwrap();

        assert_eq!(outcome.action, ReconcileAction::None);
        assert_eq!(outcome.slots_used, 0);
        assert_eq!(outcome.slots_total, 0);
        assert_eq!(h.pm.spawn_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missed_heartbeats_crash_then_backoff_suppresses_the_second_crash() {
        let h = Harness::standard();
        h.grant_premium();
        h.orchestrator.request_start(h.account_id).await.unwrap();

        h.orchestrator.health_sweep().await;
        h.orchestrator.health_sweep().await;
        h.orchestrator.health_sweep().await;

        assert_eq!(h.persisted().status, BotStatus::Crashed);
        assert!(h
            .audit_rows()
            .contains(&row("running", "crashed", "heartbeat_missed")));

        tokio::time::advance(Duration::from_secs(5)).await;
        h.orchestrator.health_sweep().await;
        assert_eq!(h.persisted().status, BotStatus::Running);
        assert_eq!(h.pm.spawn_count(), 2);

        h.pm.crash_all();
        h.orchestrator.health_sweep().await;

        assert_eq!(h.persisted().status, BotStatus::Crashed);
        assert_eq!(h.pm.spawn_count(), 2);
        assert!(h
            .audit_rows()
            .contains(&row("running", "crashed", "process_exited")));
        let status = h.orchestrator.status(h.account_id, None).await.unwrap();
        assert_eq!(status.consecutive_crashes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn crash_loop_is_reported_once_and_halts_restarts() {
        let config = OrchestratorConfig {
            backoff: BackoffConfig {
                crash_loop_ceiling: 2,
                ..BackoffConfig::default()
            },
            ..OrchestratorConfig::default()
        };
        let h = Harness::new(config, |_| {});
        h.grant_premium();
        h.orchestrator.request_start(h.account_id).await.unwrap();

        h.pm.crash_all();
        h.orchestrator.health_sweep().await;
        tokio::time::advance(Duration::from_secs(5)).await;
        h.orchestrator.health_sweep().await;
        assert_eq!(h.pm.spawn_count(), 2);

        h.pm.crash_all();
        h.orchestrator.health_sweep().await;
        tokio::time::advance(Duration::from_secs(600)).await;
        h.orchestrator.health_sweep().await;

        assert_eq!(h.pm.spawn_count(), 2);
        assert_eq!(h.persisted().status, BotStatus::Crashed);
        let loops: Vec<_> = h
            .operator
            .alerts()
            .into_iter()
            .filter(|a| a.kind() == "crash_loop")
            .collect();
        assert_eq!(loops.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stop_has_the_same_audit_shape_as_a_user_stop() {
        let h = Harness::standard();
        h.grant_premium();
        h.orchestrator.request_start(h.account_id).await.unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;
        let stopped = h.orchestrator.idle_sweep().await;

        assert_eq!(stopped, 1);
        let rows = h.audit_rows();
        assert_eq!(
            rows[rows.len() - 2..],
            [
                row("running", "stopping", "idle_timeout"),
                row("stopping", "stopped", "idle_timeout"),
            ]
        );
        assert!(!h.persisted().wants_running);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_presence_is_exempt_from_idle_stop() {
        let h = Harness::new(OrchestratorConfig::default(), |r| r.enable_247 = true);
        let mut account = premium_until(h.account_id, Utc::now() + ChronoDuration::days(30));
        account.premium_plus = true;
        h.entitlements.set_account(account);
        h.orchestrator.request_start(h.account_id).await.unwrap();

        tokio::time::advance(Duration::from_secs(3600)).await;

        assert_eq!(h.orchestrator.idle_sweep().await, 0);
        assert_eq!(h.persisted().status, BotStatus::Running);
        assert!(h.pm.last_spawn().unwrap().enable_247);
    }

    #[tokio::test(start_paused = true)]
    async fn premium_tier_247_flag_still_idles_out() {
        let h = Harness::new(OrchestratorConfig::default(), |r| r.enable_247 = true);
        h.grant_premium();
        h.orchestrator.request_start(h.account_id).await.unwrap();

        tokio::time::advance(Duration::from_secs(3600)).await;

        assert_eq!(h.orchestrator.idle_sweep().await, 1);
        assert_eq!(h.persisted().status, BotStatus::Stopped);
        assert!(!h.pm.last_spawn().unwrap().enable_247);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_instance_refuses_start_until_enabled() {
        let h = Harness::standard();
        h.grant_premium();
        h.orchestrator.request_start(h.account_id).await.unwrap();

        let disabled = h
            .orchestrator
            .disable(h.account_id, "token leaked")
            .await
            .unwrap();
        assert_eq!(disabled.status, BotStatus::Disabled);
        assert!(matches!(
            h.orchestrator.request_start(h.account_id).await,
            Err(OrchestratorError::InstanceDisabled)
        ));
        assert_eq!(h.operator.alerts()[0].kind(), "instance_disabled");

        // Timer passes leave a disabled instance alone.
        let outcome = h
            .orchestrator
            .reconcile_account(h.account_id, ReconcileTrigger::Timer)
            .await
            .unwrap();
        assert_eq!(outcome.action, ReconcileAction::None);

        let enabled = h.orchestrator.enable(h.account_id).await.unwrap();
        assert_eq!(enabled.status, BotStatus::Stopped);
        let started = h.orchestrator.request_start(h.account_id).await.unwrap();
        assert_eq!(started.status, BotStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_requires_a_reason() {
        let h = Harness::standard();
        let err = h.orchestrator.disable(h.account_id, "  ").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn persisted_disable_is_reapplied_after_daemon_restart() {
        let h = Harness::new(OrchestratorConfig::default(), |r| {
            r.status = BotStatus::Disabled;
            r.wants_running = true;
        });
        h.grant_premium();

        let outcome = h
            .orchestrator
            .reconcile_account(h.account_id, ReconcileTrigger::Timer)
            .await
            .unwrap();

        assert_eq!(outcome.action, ReconcileAction::Disabled);
        assert_eq!(outcome.status, BotStatus::Disabled);
        assert_eq!(h.pm.spawn_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_the_running_process() {
        let h = Harness::standard();
        h.grant_premium();
        h.orchestrator.request_start(h.account_id).await.unwrap();

        let outcome = h.orchestrator.request_restart(h.account_id).await.unwrap();

        assert_eq!(outcome.action, ReconcileAction::Restarted);
        assert_eq!(outcome.status, BotStatus::Running);
        assert_eq!(h.pm.spawn_count(), 2);
        assert_eq!(h.pm.alive_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_an_in_flight_start() {
        let h = Arc::new(Harness::standard());
        h.grant_premium();
        h.pm.set_ready_on_spawn(false);

        let starting = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.orchestrator.request_start(h.account_id).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        let stopped = h.orchestrator.request_stop(h.account_id).await.unwrap();
        let started = starting.await.unwrap().unwrap();

        assert_eq!(started.status, BotStatus::Stopped);
        assert_eq!(stopped.status, BotStatus::Stopped);
        assert!(!h.persisted().wants_running);
        assert!(h
            .audit_rows()
            .iter()
            .all(|(_, to, _)| to != "running"));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_start_does_not_strand_the_instance() {
        let h = Arc::new(Harness::standard());
        h.grant_premium();
        h.pm.set_ready_on_spawn(false);

        let starting = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.orchestrator.request_start(h.account_id).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        starting.abort();
        assert!(starting.await.unwrap_err().is_cancelled());

        let stopped = h.orchestrator.request_stop(h.account_id).await.unwrap();

        assert_eq!(stopped.action, ReconcileAction::Stopped);
        assert_eq!(stopped.status, BotStatus::Stopped);
        assert_eq!(h.persisted().status, BotStatus::Stopped);
        assert_eq!(h.pm.alive_count(), 0);
        assert!(h
            .audit_rows()
            .contains(&row("stopping", "stopped", "start_cancelled")));

        let disabled = h.orchestrator.disable(h.account_id, "abuse").await.unwrap();
        assert_eq!(disabled.status, BotStatus::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn sealed_token_is_revealed_only_for_launch() {
        use crates::{
            domain::value_objects::bot_instances::BotToken,
            infra::crypto::aes_token_cipher::AesTokenCipher,
        };

        let cipher = AesTokenCipher::new("0123456789abcdef0123456789abcdef").unwrap();
        let sealed = cipher.seal("MTIz.real.token", [9; 16]);
        let h = Harness::with_tokens(
            OrchestratorConfig::default(),
            |r| r.bot_token = BotToken::new(sealed.clone()),
            Arc::new(cipher),
        );
        h.grant_premium();

        h.orchestrator.request_start(h.account_id).await.unwrap();

        assert_eq!(h.pm.last_spawn().unwrap().bot_token.expose(), "MTIz.real.token");
        assert_eq!(h.persisted().bot_token.expose(), sealed);
    }

    #[tokio::test(start_paused = true)]
    async fn undecryptable_token_never_spawns() {
        use crates::infra::crypto::aes_token_cipher::AesTokenCipher;

        let h = Harness::with_tokens(
            OrchestratorConfig::default(),
            |_| {},
            Arc::new(AesTokenCipher::new("0123456789abcdef0123456789abcdef").unwrap()),
        );
        h.grant_premium();

        let err = h.orchestrator.request_start(h.account_id).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::Internal(_)));
        assert_eq!(h.pm.spawn_count(), 0);
        assert_eq!(h.persisted().status, BotStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn version_conflicts_are_retried() {
        let h = Harness::standard();
        h.grant_premium();
        h.instances.force_conflicts(2);

        let outcome = h.orchestrator.request_start(h.account_id).await.unwrap();

        assert_eq!(outcome.status, BotStatus::Running);
        assert_eq!(h.persisted().status, BotStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_save_retries_surface_a_partial_failure() {
        let h = Harness::new(OrchestratorConfig::default(), |r| r.wants_running = true);
        h.grant_premium();
        h.instances.force_conflicts(3);

        let err = h.orchestrator.request_start(h.account_id).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::PartialFailure(_)));
        assert_eq!(h.operator.alerts()[0].kind(), "partial_failure");
        // The process action stands; the next pass re-reads it as ground truth.
        assert_eq!(h.pm.alive_count(), 1);
        let outcome = h
            .orchestrator
            .reconcile_account(h.account_id, ReconcileTrigger::Timer)
            .await
            .unwrap();
        assert_eq!(outcome.status, BotStatus::Running);
        assert_eq!(h.persisted().status, BotStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_everything_but_keeps_intent() {
        let h = Harness::standard();
        h.grant_premium();
        h.orchestrator.request_start(h.account_id).await.unwrap();

        h.orchestrator.shutdown().await;

        let persisted = h.persisted();
        assert_eq!(persisted.status, BotStatus::Stopped);
        assert!(persisted.wants_running);
        assert_eq!(h.pm.alive_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_guild_widened_ceiling() {
        use crates::domain::value_objects::{
            entitlements::GuildEntitlementRecord, enums::premium_plans::PremiumPlan,
        };

        let h = Harness::standard();
        h.entitlements.set_guild(GuildEntitlementRecord {
            guild_id: "42".to_string(),
            premium_plan: PremiumPlan::PremiumPlus,
            premium_slots: 1,
            premium_from: None,
            premium_to: Some(Utc::now() + ChronoDuration::days(3)),
        });

        let view = h.orchestrator.status(h.account_id, Some("42")).await.unwrap();

        assert_eq!(view.supervised_status, BotStatus::Stopped);
        assert_eq!(view.entitlement.slots_total, 0);
        assert!(view.effective_ceiling.allows(Capability::CustomName));
        assert!(matches!(
            h.orchestrator.status(h.account_id, Some("unknown")).await,
            Err(OrchestratorError::InvalidRequest(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn health_sweep_probes_instances_concurrently() {
        let running: Vec<(Uuid, BotStatus)> =
            (0..4).map(|_| (Uuid::new_v4(), BotStatus::Running)).collect();
        let mut supervisor = MockSupervisor::new();
        supervisor.expect_supervised_instances().returning(move || {
            let running = running.clone();
            Box::pin(async move { running })
        });
        supervisor.expect_health_check().times(4).returning(|_| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Vec::new())
            })
        });
        supervisor.expect_current_state().returning(|_| {
            Box::pin(async move {
                SupervisedState {
                    status: BotStatus::Running,
                    ..SupervisedState::default()
                }
            })
        });

        let orchestrator = Orchestrator::new(
            Arc::new(MockBotInstanceRepository::new()),
            Arc::new(MockAuditRepository::new()),
            Arc::new(EntitlementEngine::new(Arc::new(
                MockEntitlementRepository::new(),
            ))),
            Arc::new(supervisor),
            Arc::new(RecordingOperator::default()),
            Arc::new(PlainTokens),
            OrchestratorConfig::default(),
        );

        let began = tokio::time::Instant::now();
        assert_eq!(orchestrator.health_sweep().await, 0);
        assert!(began.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn unknown_account_is_reported_before_touching_the_supervisor() {
        let mut instances = MockBotInstanceRepository::new();
        instances
            .expect_find_by_account()
            .returning(|_| Box::pin(async move { Ok(None) }));
        let mut supervisor = MockSupervisor::new();
        supervisor.expect_start().never();
        supervisor.expect_cancel_start().never();

        let orchestrator = Orchestrator::new(
            Arc::new(instances),
            Arc::new(MockAuditRepository::new()),
            Arc::new(EntitlementEngine::new(Arc::new(
                MockEntitlementRepository::new(),
            ))),
            Arc::new(supervisor),
            Arc::new(RecordingOperator::default()),
            Arc::new(PlainTokens),
            OrchestratorConfig::default(),
        );

        assert!(matches!(
            orchestrator.request_start(Uuid::new_v4()).await,
            Err(OrchestratorError::InstanceNotFound)
        ));
        assert!(matches!(
            orchestrator.request_stop(Uuid::new_v4()).await,
            Err(OrchestratorError::InstanceNotFound)
        ));
    }
}

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use crates::domain::{
    repositories::process_manager::ProcessManager,
    value_objects::{
        bot_instances::{LaunchSpec, ProcessProbe, ProcessRef},
        enums::{bot_statuses::BotStatus, transition_causes::TransitionCause},
    },
};
use mockall::automock;
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::{Mutex, oneshot},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::config_model::SupervisorConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub instance_id: Uuid,
    pub from: BotStatus,
    pub to: BotStatus,
    pub process_ref: Option<ProcessRef>,
    pub cause: TransitionCause,
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("instance is already running")]
    AlreadyRunning,
    #[error("instance is disabled")]
    Disabled,
    #[error("instance is mid-transition")]
    Busy,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisedState {
    pub status: BotStatus,
    pub process_ref: Option<ProcessRef>,
    pub running_for: Option<Duration>,
}

/// Lifecycle commands for supervised bot workers. Every mutating call returns the
/// transitions it performed, in order.
#[async_trait]
#[automock]
pub trait Supervisor {
    async fn start(
        &self,
        launch: LaunchSpec,
        cause: TransitionCause,
    ) -> Result<Vec<StateTransition>, SupervisorError>;

    /// Idempotent. Stopping an instance at rest returns no transitions.
    async fn stop(
        &self,
        instance_id: Uuid,
        cause: TransitionCause,
    ) -> Result<Vec<StateTransition>, SupervisorError>;

    async fn health_check(&self, instance_id: Uuid)
    -> Result<Vec<StateTransition>, SupervisorError>;

    async fn disable(
        &self,
        instance_id: Uuid,
        cause: TransitionCause,
    ) -> Result<Vec<StateTransition>, SupervisorError>;

    async fn enable(&self, instance_id: Uuid) -> Result<Vec<StateTransition>, SupervisorError>;

    /// Asks an in-flight start to give up. Returns false when nothing was starting.
    async fn cancel_start(&self, instance_id: Uuid) -> bool;

    async fn current_state(&self, instance_id: Uuid) -> SupervisedState;

    /// Instances that currently hold a process or sit in `Crashed`.
    async fn supervised_instances(&self) -> Vec<(Uuid, BotStatus)>;
}

#[derive(Default)]
struct Supervised {
    status: BotStatus,
    process_ref: Option<ProcessRef>,
    cancel: Option<CancellationToken>,
    running_since: Option<Instant>,
    seen_heartbeats: u64,
    missed_heartbeats: u32,
    /// A start task still owns this entry.
    start_in_flight: bool,
    /// Transitions from a start whose caller went away; handed to the next command.
    unreported: Vec<StateTransition>,
}

enum HealthVerdict {
    Hung(ProcessRef),
    Exited(Option<i32>),
}

/// Owns the instance → process table. The table lock is never held across process I/O.
///
/// Starts run on their own task, so a caller that gives up mid-start cannot strand an
/// entry in `Starting`.
#[derive(Clone)]
pub struct ProcessSupervisor {
    process_manager: Arc<dyn ProcessManager + Send + Sync>,
    config: SupervisorConfig,
    table: Arc<Mutex<HashMap<Uuid, Supervised>>>,
}

impl ProcessSupervisor {
    pub fn new(
        process_manager: Arc<dyn ProcessManager + Send + Sync>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            process_manager,
            config,
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn take_unreported(&self, instance_id: Uuid) -> Vec<StateTransition> {
        let mut table = self.table.lock().await;
        table
            .get_mut(&instance_id)
            .map(|entry| std::mem::take(&mut entry.unreported))
            .unwrap_or_default()
    }

    /// Cancels an in-flight start and waits for its task to release the entry.
    /// Returns whatever that start could not hand back to its own caller.
    async fn settle_start(&self, instance_id: Uuid) -> Vec<StateTransition> {
        let deadline = Instant::now()
            + self.config.ready_timeout
            + self.config.stop_grace
            + self.config.poll_interval * 4;
        loop {
            {
                let mut table = self.table.lock().await;
                let Some(entry) = table.get_mut(&instance_id) else {
                    return Vec::new();
                };
                if !entry.start_in_flight {
                    return std::mem::take(&mut entry.unreported);
                }
                if let Some(token) = &entry.cancel {
                    token.cancel();
                }
            }
            if Instant::now() >= deadline {
                warn!(%instance_id, "supervisor: start task did not settle in time");
                return Vec::new();
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn finish_start(
        &self,
        instance_id: Uuid,
        transitions: Vec<StateTransition>,
        reply: oneshot::Sender<Vec<StateTransition>>,
    ) {
        let mut table = self.table.lock().await;
        let entry = table.entry(instance_id).or_default();
        entry.start_in_flight = false;
        if let Err(transitions) = reply.send(transitions) {
            warn!(
                %instance_id,
                status = %entry.status,
                "supervisor: start caller went away; keeping transitions for the next command"
            );
            entry.unreported.extend(transitions);
        }
    }

    async fn move_to(
        &self,
        instance_id: Uuid,
        to: BotStatus,
        cause: TransitionCause,
        out: &mut Vec<StateTransition>,
    ) {
        let mut table = self.table.lock().await;
        let entry = table.entry(instance_id).or_default();
        let from = entry.status;
        let process_ref = entry.process_ref.clone();

        entry.status = to;
        match to {
            BotStatus::Running => {
                entry.running_since = Some(Instant::now());
                entry.missed_heartbeats = 0;
            }
            BotStatus::Stopped | BotStatus::Crashed | BotStatus::Disabled => {
                entry.process_ref = None;
                entry.cancel = None;
                entry.running_since = None;
                entry.seen_heartbeats = 0;
                entry.missed_heartbeats = 0;
            }
            BotStatus::Starting | BotStatus::Stopping => {}
        }
        drop(table);

        info!(
            %instance_id,
            %from,
            %to,
            %cause,
            pid = process_ref.as_ref().map(|p| p.pid),
            "supervisor: state transition"
        );
        out.push(StateTransition {
            instance_id,
            from,
            to,
            process_ref,
            cause,
        });
    }

    async fn attach_process(&self, instance_id: Uuid, process_ref: &ProcessRef) {
        let mut table = self.table.lock().await;
        let entry = table.entry(instance_id).or_default();
        entry.process_ref = Some(process_ref.clone());
        entry.seen_heartbeats = 0;
    }

    /// SIGTERM, wait out the grace period, then SIGKILL.
    async fn shut_down(&self, process_ref: &ProcessRef) {
        if let Err(err) = self.process_manager.terminate(process_ref.clone()).await {
            warn!(pid = process_ref.pid, error = ?err, "supervisor: graceful terminate failed");
        }

        let deadline = Instant::now() + self.config.stop_grace;
        loop {
            match self.process_manager.probe(process_ref.clone()).await {
                Ok(ProcessProbe::Exited { .. }) | Ok(ProcessProbe::Unknown) => return,
                Ok(ProcessProbe::Alive { .. }) => {}
                Err(err) => {
                    warn!(pid = process_ref.pid, error = ?err, "supervisor: probe during stop failed")
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        warn!(
            pid = process_ref.pid,
            grace_secs = self.config.stop_grace.as_secs(),
            "supervisor: grace period elapsed; killing worker"
        );
        self.force_kill(process_ref).await;
    }

    async fn force_kill(&self, process_ref: &ProcessRef) {
        if let Err(err) = self.process_manager.kill(process_ref.clone()).await {
            warn!(pid = process_ref.pid, error = ?err, "supervisor: kill failed");
        }
    }

    async fn abort_start(
        &self,
        instance_id: Uuid,
        process_ref: &ProcessRef,
        out: &mut Vec<StateTransition>,
    ) {
        self.move_to(instance_id, BotStatus::Stopping, TransitionCause::StartCancelled, out)
            .await;
        self.shut_down(process_ref).await;
        self.move_to(instance_id, BotStatus::Stopped, TransitionCause::StartCancelled, out)
            .await;
    }

    /// Spawn, then wait for READY, cancellation, exit or the ready deadline.
    async fn drive_start(
        &self,
        launch: LaunchSpec,
        cause: TransitionCause,
        token: CancellationToken,
    ) -> Vec<StateTransition> {
        let instance_id = launch.instance_id;
        let mut transitions = Vec::new();
        self.move_to(instance_id, BotStatus::Starting, cause, &mut transitions)
            .await;

        let process_ref = match self.process_manager.spawn(launch).await {
            Ok(process_ref) => process_ref,
            Err(err) => {
                warn!(%instance_id, error = ?err, "supervisor: spawn failed");
                self.move_to(
                    instance_id,
                    BotStatus::Crashed,
                    TransitionCause::SpawnFailed,
                    &mut transitions,
                )
                .await;
                return transitions;
            }
        };
        self.attach_process(instance_id, &process_ref).await;

        let deadline = Instant::now() + self.config.ready_timeout;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    self.abort_start(instance_id, &process_ref, &mut transitions).await;
                    return transitions;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            match self.process_manager.probe(process_ref.clone()).await {
                Ok(ProcessProbe::Alive {
                    ready: true,
                    heartbeats,
                }) => {
                    // Cancellation wins over a late READY.
                    if token.is_cancelled() {
                        self.abort_start(instance_id, &process_ref, &mut transitions)
                            .await;
                        return transitions;
                    }
                    if let Some(entry) = self.table.lock().await.get_mut(&instance_id) {
                        entry.seen_heartbeats = heartbeats;
                    }
                    self.move_to(instance_id, BotStatus::Running, cause, &mut transitions)
                        .await;
                    return transitions;
                }
                Ok(ProcessProbe::Alive { ready: false, .. }) => {}
                Ok(ProcessProbe::Exited { code }) => {
                    warn!(%instance_id, ?code, "supervisor: worker exited before ready");
                    self.move_to(
                        instance_id,
                        BotStatus::Crashed,
                        TransitionCause::ProcessExited,
                        &mut transitions,
                    )
                    .await;
                    return transitions;
                }
                Ok(ProcessProbe::Unknown) => {
                    warn!(%instance_id, "supervisor: worker vanished before ready");
                    self.move_to(
                        instance_id,
                        BotStatus::Crashed,
                        TransitionCause::ProcessExited,
                        &mut transitions,
                    )
                    .await;
                    return transitions;
                }
                Err(err) => warn!(%instance_id, error = ?err, "supervisor: probe failed"),
            }

            if Instant::now() >= deadline {
                warn!(
                    %instance_id,
                    timeout_secs = self.config.ready_timeout.as_secs(),
                    "supervisor: worker never reported ready"
                );
                self.force_kill(&process_ref).await;
                self.move_to(
                    instance_id,
                    BotStatus::Crashed,
                    TransitionCause::ReadyTimeout,
                    &mut transitions,
                )
                .await;
                return transitions;
            }
        }
    }
}

#[async_trait]
impl Supervisor for ProcessSupervisor {
    async fn start(
        &self,
        launch: LaunchSpec,
        cause: TransitionCause,
    ) -> Result<Vec<StateTransition>, SupervisorError> {
        let instance_id = launch.instance_id;
        let (token, mut transitions) = {
            let mut table = self.table.lock().await;
            let entry = table.entry(instance_id).or_default();
            match entry.status {
                BotStatus::Running | BotStatus::Starting | BotStatus::Stopping => {
                    return Err(SupervisorError::AlreadyRunning);
                }
                BotStatus::Disabled => return Err(SupervisorError::Disabled),
                BotStatus::Stopped | BotStatus::Crashed => {}
            }
            let token = CancellationToken::new();
            entry.cancel = Some(token.clone());
            entry.start_in_flight = true;
            (token, std::mem::take(&mut entry.unreported))
        };

        let (reply, outcome) = oneshot::channel();
        let supervisor = self.clone();
        tokio::spawn(async move {
            let transitions = supervisor.drive_start(launch, cause, token).await;
            supervisor.finish_start(instance_id, transitions, reply).await;
        });

        let started = outcome
            .await
            .map_err(|_| anyhow::anyhow!("start task for {instance_id} ended without a result"))?;
        transitions.extend(started);
        Ok(transitions)
    }

    async fn stop(
        &self,
        instance_id: Uuid,
        cause: TransitionCause,
    ) -> Result<Vec<StateTransition>, SupervisorError> {
        // A pending start tears itself down once cancelled; its transitions come first.
        let mut transitions = self.settle_start(instance_id).await;
        let (status, process_ref) = {
            let table = self.table.lock().await;
            let Some(entry) = table.get(&instance_id) else {
                return Ok(transitions);
            };
            match entry.status {
                BotStatus::Stopped | BotStatus::Disabled | BotStatus::Stopping => {
                    return Ok(transitions);
                }
                BotStatus::Starting => return Err(SupervisorError::Busy),
                BotStatus::Running | BotStatus::Crashed => {
                    (entry.status, entry.process_ref.clone())
                }
            }
        };

        if status == BotStatus::Crashed {
            if let Some(process_ref) = &process_ref {
                self.force_kill(process_ref).await;
            }
            self.move_to(instance_id, BotStatus::Stopped, cause, &mut transitions)
                .await;
            return Ok(transitions);
        }

        self.move_to(instance_id, BotStatus::Stopping, cause, &mut transitions)
            .await;
        if let Some(process_ref) = &process_ref {
            self.shut_down(process_ref).await;
        }
        self.move_to(instance_id, BotStatus::Stopped, cause, &mut transitions)
            .await;
        Ok(transitions)
    }

    async fn health_check(
        &self,
        instance_id: Uuid,
    ) -> Result<Vec<StateTransition>, SupervisorError> {
        let mut transitions = self.take_unreported(instance_id).await;
        let process_ref = {
            let table = self.table.lock().await;
            match table.get(&instance_id) {
                Some(entry) if entry.status == BotStatus::Running => entry.process_ref.clone(),
                _ => None,
            }
        };
        let Some(process_ref) = process_ref else {
            return Ok(transitions);
        };

        let probe = self.process_manager.probe(process_ref.clone()).await;

        let verdict = {
            let mut table = self.table.lock().await;
            let Some(entry) = table.get_mut(&instance_id) else {
                return Ok(transitions);
            };
            if entry.status != BotStatus::Running {
                return Ok(transitions);
            }

            match probe {
                Ok(ProcessProbe::Alive { heartbeats, .. }) if heartbeats > entry.seen_heartbeats => {
                    entry.seen_heartbeats = heartbeats;
                    entry.missed_heartbeats = 0;
                    return Ok(transitions);
                }
                Ok(ProcessProbe::Exited { code }) => HealthVerdict::Exited(code),
                Ok(ProcessProbe::Unknown) => HealthVerdict::Exited(None),
                other => {
                    if let Err(err) = other {
                        warn!(%instance_id, error = ?err, "supervisor: health probe failed");
                    }
                    entry.missed_heartbeats += 1;
                    if entry.missed_heartbeats < self.config.max_missed_heartbeats {
                        debug!(
                            %instance_id,
                            missed = entry.missed_heartbeats,
                            "supervisor: heartbeat missed"
                        );
                        return Ok(transitions);
                    }
                    HealthVerdict::Hung(process_ref)
                }
            }
        };

        match verdict {
            HealthVerdict::Hung(process_ref) => {
                warn!(
                    %instance_id,
                    missed = self.config.max_missed_heartbeats,
                    "supervisor: heartbeats stopped; treating worker as crashed"
                );
                self.force_kill(&process_ref).await;
                self.move_to(
                    instance_id,
                    BotStatus::Crashed,
                    TransitionCause::HeartbeatMissed,
                    &mut transitions,
                )
                .await;
            }
            HealthVerdict::Exited(code) => {
                warn!(%instance_id, ?code, "supervisor: worker exited unexpectedly");
                self.move_to(
                    instance_id,
                    BotStatus::Crashed,
                    TransitionCause::ProcessExited,
                    &mut transitions,
                )
                .await;
            }
        }
        Ok(transitions)
    }

    async fn disable(
        &self,
        instance_id: Uuid,
        cause: TransitionCause,
    ) -> Result<Vec<StateTransition>, SupervisorError> {
        let mut transitions = self.settle_start(instance_id).await;
        let (status, process_ref) = {
            let mut table = self.table.lock().await;
            let entry = table.entry(instance_id).or_default();
            match entry.status {
                BotStatus::Disabled => return Ok(transitions),
                BotStatus::Starting | BotStatus::Stopping => return Err(SupervisorError::Busy),
                status => (status, entry.process_ref.clone()),
            }
        };

        if status == BotStatus::Running {
            self.move_to(instance_id, BotStatus::Stopping, cause, &mut transitions)
                .await;
            if let Some(process_ref) = &process_ref {
                self.shut_down(process_ref).await;
            }
        } else if let Some(process_ref) = &process_ref {
            self.force_kill(process_ref).await;
        }
        self.move_to(instance_id, BotStatus::Disabled, cause, &mut transitions)
            .await;
        Ok(transitions)
    }

    async fn enable(&self, instance_id: Uuid) -> Result<Vec<StateTransition>, SupervisorError> {
        let disabled = self
            .table
            .lock()
            .await
            .get(&instance_id)
            .is_some_and(|entry| entry.status == BotStatus::Disabled);

        let mut transitions = self.take_unreported(instance_id).await;
        if disabled {
            self.move_to(
                instance_id,
                BotStatus::Stopped,
                TransitionCause::AdminEnable,
                &mut transitions,
            )
            .await;
        }
        Ok(transitions)
    }

    async fn cancel_start(&self, instance_id: Uuid) -> bool {
        let table = self.table.lock().await;
        match table.get(&instance_id) {
            Some(entry) if entry.status == BotStatus::Starting => match &entry.cancel {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    async fn current_state(&self, instance_id: Uuid) -> SupervisedState {
        let table = self.table.lock().await;
        table
            .get(&instance_id)
            .map(|entry| SupervisedState {
                status: entry.status,
                process_ref: entry.process_ref.clone(),
                running_for: entry.running_since.map(|since| since.elapsed()),
            })
            .unwrap_or_default()
    }

    async fn supervised_instances(&self) -> Vec<(Uuid, BotStatus)> {
        let table = self.table.lock().await;
        let mut instances: Vec<_> = table
            .iter()
            .filter(|(_, entry)| !entry.status.is_at_rest())
            .map(|(id, entry)| (*id, entry.status))
            .collect();
        instances.sort_by_key(|(id, _)| *id);
        instances
    }
}

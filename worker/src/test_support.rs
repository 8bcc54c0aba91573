//! In-memory fakes shared by the worker's unit and scenario tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use crates::domain::{
    entities::{
        audit_records::NewAuditRecord,
        payments::{NewPaymentEntity, PaymentEntity},
    },
    repositories::{
        audit::AuditRepository, bot_instances::BotInstanceRepository,
        entitlements::EntitlementRepository, guild_activity::GuildActivityRepository,
        operator_channel::OperatorChannel, payments::PaymentRepository,
        process_manager::ProcessManager, token_cipher::TokenCipher,
    },
    value_objects::{
        bot_instances::{
            BotToken, InstanceRecord, InstanceStateUpdate, LaunchSpec, ProcessProbe, ProcessRef,
            SaveOutcome,
        },
        entitlements::{EntitlementRecord, GuildEntitlementRecord},
        enums::{bot_statuses::BotStatus, premium_plans::PremiumPlan},
        operator_alerts::OperatorAlert,
    },
};
use uuid::Uuid;

pub(crate) fn launch_spec() -> LaunchSpec {
    let account_id = Uuid::new_v4();
    LaunchSpec {
        instance_id: Uuid::new_v4(),
        account_id,
        process_name: ProcessRef::process_name(account_id),
        bot_token: BotToken::new("token"),
        application_id: "1234".to_string(),
        bot_name: "Music Bot".to_string(),
        bot_activity: None,
        default_volume: 100,
        enable_247: false,
        enable_autoplay: false,
    }
}

pub(crate) fn instance_record(account_id: Uuid) -> InstanceRecord {
    InstanceRecord {
        id: Uuid::new_v4(),
        account_id,
        bot_token: BotToken::new("token"),
        application_id: "1234".to_string(),
        bot_name: None,
        bot_activity: None,
        status: BotStatus::Stopped,
        process_ref: None,
        default_volume: 100,
        enable_247: false,
        enable_autoplay: false,
        wants_running: false,
        last_activity: None,
        version: 1,
        updated_at: Utc::now(),
    }
}

pub(crate) fn premium_until(account_id: Uuid, until: DateTime<Utc>) -> EntitlementRecord {
    EntitlementRecord {
        account_id,
        premium_plan: PremiumPlan::Premium,
        premium_plus: false,
        premium_from: Some(until - ChronoDuration::days(30)),
        premium_to: Some(until),
    }
}

pub(crate) fn free_account(account_id: Uuid) -> EntitlementRecord {
    EntitlementRecord {
        account_id,
        premium_plan: PremiumPlan::Free,
        premium_plus: false,
        premium_from: None,
        premium_to: None,
    }
}

struct FakeProcess {
    alive: bool,
    ready: bool,
    heartbeats: u64,
}

#[derive(Default)]
struct FakeProcessState {
    next_pid: u32,
    processes: HashMap<u32, FakeProcess>,
    spawned: Vec<LaunchSpec>,
    terminated: Vec<u32>,
    killed: Vec<u32>,
    spawn_fails: bool,
    not_ready: bool,
    ignore_sigterm: bool,
}

/// Process manager that never touches the OS.
#[derive(Default)]
pub(crate) struct FakeProcessManager {
    state: Mutex<FakeProcessState>,
}

impl FakeProcessManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_ready_on_spawn(&self, ready: bool) {
        self.state.lock().unwrap().not_ready = !ready;
    }

    pub(crate) fn set_spawn_fails(&self, fails: bool) {
        self.state.lock().unwrap().spawn_fails = fails;
    }

    pub(crate) fn set_ignore_sigterm(&self, ignore: bool) {
        self.state.lock().unwrap().ignore_sigterm = ignore;
    }

    pub(crate) fn spawn_count(&self) -> usize {
        self.state.lock().unwrap().spawned.len()
    }

    pub(crate) fn last_spawn(&self) -> Option<LaunchSpec> {
        self.state.lock().unwrap().spawned.last().cloned()
    }

    pub(crate) fn terminated_count(&self) -> usize {
        self.state.lock().unwrap().terminated.len()
    }

    pub(crate) fn killed_count(&self) -> usize {
        self.state.lock().unwrap().killed.len()
    }

    pub(crate) fn alive_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .processes
            .values()
            .filter(|p| p.alive)
            .count()
    }

    pub(crate) fn beat_all(&self) {
        for process in self.state.lock().unwrap().processes.values_mut() {
            process.heartbeats += 1;
        }
    }

    pub(crate) fn crash_all(&self) {
        for process in self.state.lock().unwrap().processes.values_mut() {
            process.alive = false;
        }
    }
}

#[async_trait]
impl ProcessManager for FakeProcessManager {
    async fn spawn(&self, launch: LaunchSpec) -> Result<ProcessRef> {
        let mut state = self.state.lock().unwrap();
        if state.spawn_fails {
            return Err(anyhow!("spawn refused"));
        }
        state.next_pid += 1;
        let pid = 1000 + state.next_pid;
        let ready = !state.not_ready;
        state.processes.insert(
            pid,
            FakeProcess {
                alive: true,
                ready,
                heartbeats: 0,
            },
        );
        let name = launch.process_name.clone();
        state.spawned.push(launch);
        Ok(ProcessRef { pid, name })
    }

    async fn probe(&self, process_ref: ProcessRef) -> Result<ProcessProbe> {
        let state = self.state.lock().unwrap();
        Ok(match state.processes.get(&process_ref.pid) {
            Some(p) if p.alive => ProcessProbe::Alive {
                ready: p.ready,
                heartbeats: p.heartbeats,
            },
            Some(_) => ProcessProbe::Exited { code: Some(1) },
            None => ProcessProbe::Unknown,
        })
    }

    async fn terminate(&self, process_ref: ProcessRef) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.terminated.push(process_ref.pid);
        let ignore = state.ignore_sigterm;
        if let Some(p) = state.processes.get_mut(&process_ref.pid) {
            if !ignore {
                p.alive = false;
            }
        }
        Ok(())
    }

    async fn kill(&self, process_ref: ProcessRef) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.killed.push(process_ref.pid);
        if let Some(p) = state.processes.get_mut(&process_ref.pid) {
            p.alive = false;
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryInstances {
    records: Mutex<HashMap<Uuid, InstanceRecord>>,
    forced_conflicts: Mutex<u32>,
}

impl InMemoryInstances {
    pub(crate) fn with(records: impl IntoIterator<Item = InstanceRecord>) -> Self {
        let repo = Self::default();
        {
            let mut map = repo.records.lock().unwrap();
            for record in records {
                map.insert(record.id, record);
            }
        }
        repo
    }

    pub(crate) fn record(&self, instance_id: Uuid) -> InstanceRecord {
        self.records.lock().unwrap()[&instance_id].clone()
    }

    /// The next `n` saves report a version conflict.
    pub(crate) fn force_conflicts(&self, n: u32) {
        *self.forced_conflicts.lock().unwrap() = n;
    }
}

#[async_trait]
impl BotInstanceRepository for InMemoryInstances {
    async fn get_instance(&self, instance_id: Uuid) -> Result<Option<InstanceRecord>> {
        Ok(self.records.lock().unwrap().get(&instance_id).cloned())
    }

    async fn find_by_account(&self, account_id: Uuid) -> Result<Option<InstanceRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.account_id == account_id)
            .cloned())
    }

    async fn list_account_ids(&self) -> Result<Vec<Uuid>> {
        let mut ids: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .values()
            .map(|r| r.account_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn save_instance_state(
        &self,
        instance_id: Uuid,
        expected_version: i64,
        update: InstanceStateUpdate,
    ) -> Result<SaveOutcome> {
        {
            let mut forced = self.forced_conflicts.lock().unwrap();
            if *forced > 0 {
                *forced -= 1;
                return Ok(SaveOutcome::Conflict);
            }
        }
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&instance_id)
            .ok_or_else(|| anyhow!("no instance {instance_id}"))?;
        if record.version != expected_version {
            return Ok(SaveOutcome::Conflict);
        }
        record.status = update.status;
        record.process_ref = update.process_ref;
        record.wants_running = update.wants_running;
        record.version += 1;
        record.updated_at = Utc::now();
        Ok(SaveOutcome::Saved {
            version: record.version,
        })
    }
}

#[derive(Default)]
pub(crate) struct InMemoryEntitlements {
    accounts: Mutex<HashMap<Uuid, EntitlementRecord>>,
    guilds: Mutex<HashMap<String, GuildEntitlementRecord>>,
}

impl InMemoryEntitlements {
    pub(crate) fn set_account(&self, record: EntitlementRecord) {
        self.accounts
            .lock()
            .unwrap()
            .insert(record.account_id, record);
    }

    pub(crate) fn set_guild(&self, record: GuildEntitlementRecord) {
        self.guilds
            .lock()
            .unwrap()
            .insert(record.guild_id.clone(), record);
    }

    pub(crate) fn account(&self, account_id: Uuid) -> Option<EntitlementRecord> {
        self.accounts.lock().unwrap().get(&account_id).cloned()
    }
}

#[async_trait]
impl EntitlementRepository for InMemoryEntitlements {
    async fn get_account_entitlement(
        &self,
        account_id: Uuid,
    ) -> Result<Option<EntitlementRecord>> {
        Ok(self.account(account_id))
    }

    async fn get_guild_entitlement(
        &self,
        guild_id: String,
    ) -> Result<Option<GuildEntitlementRecord>> {
        Ok(self.guilds.lock().unwrap().get(&guild_id).cloned())
    }

    async fn save_account_premium(&self, record: EntitlementRecord) -> Result<()> {
        self.set_account(record);
        Ok(())
    }
}

/// Stored tokens are already plaintext in tests.
pub(crate) struct PlainTokens;

impl TokenCipher for PlainTokens {
    fn reveal(&self, sealed: &BotToken) -> Result<BotToken> {
        Ok(sealed.clone())
    }
}

/// Yields inside `record_payment` so concurrent deliveries interleave like real I/O.
#[derive(Default)]
pub(crate) struct InMemoryPayments {
    payments: Mutex<Vec<PaymentEntity>>,
}

impl InMemoryPayments {
    pub(crate) fn insert(&self, payment: PaymentEntity) {
        self.payments.lock().unwrap().push(payment);
    }

    pub(crate) fn count(&self) -> usize {
        self.payments.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPayments {
    async fn record_payment(&self, payment: NewPaymentEntity) -> Result<Uuid> {
        tokio::task::yield_now().await;
        let id = Uuid::new_v4();
        self.insert(PaymentEntity {
            id,
            user_id: payment.user_id,
            plan_id: payment.plan_id,
            amount_minor: payment.amount_minor,
            duration_days: payment.duration_days,
            status: payment.status,
            provider_payment_id: payment.provider_payment_id,
            paid_through: payment.paid_through,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn find_by_provider_payment_id(
        &self,
        provider_payment_id: String,
    ) -> Result<Option<PaymentEntity>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.provider_payment_id.as_deref() == Some(provider_payment_id.as_str()))
            .cloned())
    }
}

#[derive(Default)]
pub(crate) struct RecordingAudit {
    records: Mutex<Vec<NewAuditRecord>>,
}

impl RecordingAudit {
    /// `(from, to, cause)` for every row, oldest first.
    pub(crate) fn rows(&self) -> Vec<(String, String, String)> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.from_status.clone(), r.to_status.clone(), r.cause.clone()))
            .collect()
    }
}

#[async_trait]
impl AuditRepository for RecordingAudit {
    async fn record_transition(&self, record: NewAuditRecord) -> Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingOperator {
    alerts: Mutex<Vec<OperatorAlert>>,
}

impl RecordingOperator {
    pub(crate) fn alerts(&self) -> Vec<OperatorAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl OperatorChannel for RecordingOperator {
    fn notify(&self, alert: OperatorAlert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

#[derive(Default)]
pub(crate) struct InMemoryActivity {
    known_guilds: Mutex<HashSet<String>>,
    touched: Mutex<Vec<Uuid>>,
}

impl InMemoryActivity {
    pub(crate) fn with_guild(guild_id: &str) -> Self {
        let activity = Self::default();
        activity
            .known_guilds
            .lock()
            .unwrap()
            .insert(guild_id.to_string());
        activity
    }

    pub(crate) fn touched(&self) -> Vec<Uuid> {
        self.touched.lock().unwrap().clone()
    }
}

#[async_trait]
impl GuildActivityRepository for InMemoryActivity {
    async fn record_guild_command(&self, guild_id: String, _at: DateTime<Utc>) -> Result<bool> {
        Ok(self.known_guilds.lock().unwrap().contains(&guild_id))
    }

    async fn touch_instance_activity(&self, instance_id: Uuid, _at: DateTime<Utc>) -> Result<()> {
        self.touched.lock().unwrap().push(instance_id);
        Ok(())
    }
}

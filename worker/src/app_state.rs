use std::sync::Arc;

use crates::{
    domain::repositories::{
        operator_channel::OperatorChannel, process_manager::ProcessManager,
        token_cipher::TokenCipher,
    },
    infra::{
        db::{
            postgres::postgres_connection::PgPoolSquad,
            repositories::{
                audit::AuditPostgres, bot_instances::BotInstancePostgres,
                entitlements::EntitlementPostgres, guild_activity::GuildActivityPostgres,
                guild_bot_settings::GuildBotSettingsPostgres, payments::PaymentPostgres,
                plans::PlanPostgres,
            },
        },
        process::tokio_process_manager::{TokioProcessManager, WorkerCommand},
    },
};

use crate::{
    config::config_model::DotEnvyConfig,
    services::supervisor::ProcessSupervisor,
    usecases::{
        activity_tracker::GuildActivityTracker, entitlement_engine::EntitlementEngine,
        guild_settings::GuildSettingsUseCase, orchestrator::Orchestrator,
        payment_events::PaymentEventsUseCase,
    },
};

pub type PgOrchestrator = Orchestrator<BotInstancePostgres, AuditPostgres, EntitlementPostgres>;
pub type PgPaymentEvents =
    PaymentEventsUseCase<PlanPostgres, PaymentPostgres, EntitlementPostgres, PgOrchestrator>;
pub type PgGuildSettings = GuildSettingsUseCase<GuildBotSettingsPostgres, EntitlementPostgres>;
pub type PgActivityTracker = GuildActivityTracker<GuildActivityPostgres>;

/// Everything the HTTP surface and the timer loops share.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DotEnvyConfig>,
    pub orchestrator: Arc<PgOrchestrator>,
    pub payment_events: Arc<PgPaymentEvents>,
    pub guild_settings: Arc<PgGuildSettings>,
    pub activity: Arc<PgActivityTracker>,
}

impl AppState {
    pub fn build(
        config: Arc<DotEnvyConfig>,
        db_pool: Arc<PgPoolSquad>,
        operator: Arc<dyn OperatorChannel + Send + Sync>,
        tokens: Arc<dyn TokenCipher + Send + Sync>,
    ) -> Self {
        let entitlement_repository = Arc::new(EntitlementPostgres::new(Arc::clone(&db_pool)));
        let entitlement_engine = Arc::new(EntitlementEngine::new(Arc::clone(
            &entitlement_repository,
        )));

        let runtime = &config.bot_runtime;
        let process_manager: Arc<dyn ProcessManager + Send + Sync> =
            Arc::new(TokioProcessManager::new(WorkerCommand {
                program: runtime.program.clone(),
                args: runtime.args.clone(),
                working_dir: runtime.working_dir.clone(),
                pass_through_env: runtime.pass_through_env.clone(),
            }));
        let supervisor = Arc::new(ProcessSupervisor::new(
            process_manager,
            config.supervisor.clone(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(BotInstancePostgres::new(Arc::clone(&db_pool))),
            Arc::new(AuditPostgres::new(Arc::clone(&db_pool))),
            Arc::clone(&entitlement_engine),
            supervisor,
            operator,
            tokens,
            config.orchestrator.clone(),
        ));

        let payment_events = Arc::new(PaymentEventsUseCase::new(
            Arc::new(PlanPostgres::new(Arc::clone(&db_pool))),
            Arc::new(PaymentPostgres::new(Arc::clone(&db_pool))),
            Arc::clone(&entitlement_repository),
            Arc::clone(&orchestrator),
        ));

        let guild_settings = Arc::new(GuildSettingsUseCase::new(
            Arc::new(GuildBotSettingsPostgres::new(Arc::clone(&db_pool))),
            entitlement_engine,
        ));

        let activity = Arc::new(GuildActivityTracker::new(Arc::new(
            GuildActivityPostgres::new(Arc::clone(&db_pool)),
        )));

        Self {
            config,
            orchestrator,
            payment_events,
            guild_settings,
            activity,
        }
    }
}

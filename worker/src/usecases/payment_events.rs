use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crates::domain::{
    entities::{
        payments::{NewPaymentEntity, PaymentEntity},
        plans::PlanEntity,
    },
    repositories::{
        entitlements::EntitlementRepository, payments::PaymentRepository, plans::PlanRepository,
    },
    value_objects::{
        entitlements::{EntitlementRecord, EntitlementState},
        enums::{payment_statuses::PaymentStatus, premium_plans::PremiumPlan},
        plans::PlanTier,
    },
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    services::keyed_locks::KeyedLocks,
    usecases::{
        entitlement_engine::resolve_record,
        orchestrator::{AccountReconciler, OrchestratorError, ReconcileOutcome, ReconcileTrigger},
    },
};

#[derive(Debug, Error)]
pub enum PaymentEventError {
    #[error("plan not found or inactive")]
    PlanNotFound,
    #[error("account not found")]
    AccountNotFound,
    #[error("plan is misconfigured: {0}")]
    InvalidPlan(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PaymentEventError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            PaymentEventError::PlanNotFound | PaymentEventError::AccountNotFound => {
                StatusCode::NOT_FOUND
            }
            PaymentEventError::InvalidPlan(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PaymentEventError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSucceeded {
    pub account_id: Uuid,
    pub plan_id: Uuid,
    /// Provider-reported end of the paid period, when it has one.
    pub paid_through: Option<DateTime<Utc>>,
    pub amount_minor: Option<i32>,
    pub provider_payment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentApplied {
    pub payment_id: Uuid,
    pub account_id: Uuid,
    pub plan: PlanTier,
    pub premium_from: Option<DateTime<Utc>>,
    pub premium_to: DateTime<Utc>,
    pub reconcile: Option<ReconcileOutcome>,
    /// The provider payment id was already applied; the window was not extended again.
    pub replayed: bool,
}

/// Extends an account's premium window. Never shortens it.
fn extend_window(
    record: &EntitlementRecord,
    plan: PremiumPlan,
    duration_days: i32,
    paid_through: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> EntitlementRecord {
    let active = resolve_record(record, 0, now).state == EntitlementState::Active;

    let base = record.premium_to.map_or(now, |to| to.max(now));
    let extended = base + Duration::days(i64::from(duration_days));
    let premium_to = paid_through.map_or(extended, |through| through.max(extended));

    let premium_from = match record.premium_from {
        Some(from) if active => Some(from),
        _ => Some(now),
    };
    let premium_plan = if active && record.premium_plan.tier() > plan.tier() {
        record.premium_plan
    } else {
        plan
    };

    EntitlementRecord {
        account_id: record.account_id,
        premium_plan,
        premium_plus: plan == PremiumPlan::PremiumPlus || (active && record.premium_plus),
        premium_from,
        premium_to: Some(premium_to),
    }
}

pub struct PaymentEventsUseCase<P, Y, E, R>
where
    P: PlanRepository + Send + Sync + 'static,
    Y: PaymentRepository + Send + Sync + 'static,
    E: EntitlementRepository + Send + Sync + 'static,
    R: AccountReconciler + 'static,
{
    plan_repo: Arc<P>,
    payment_repo: Arc<Y>,
    entitlement_repo: Arc<E>,
    reconciler: Arc<R>,
    account_locks: KeyedLocks,
}

impl<P, Y, E, R> PaymentEventsUseCase<P, Y, E, R>
where
    P: PlanRepository + Send + Sync + 'static,
    Y: PaymentRepository + Send + Sync + 'static,
    E: EntitlementRepository + Send + Sync + 'static,
    R: AccountReconciler + 'static,
{
    pub fn new(
        plan_repo: Arc<P>,
        payment_repo: Arc<Y>,
        entitlement_repo: Arc<E>,
        reconciler: Arc<R>,
    ) -> Self {
        Self {
            plan_repo,
            payment_repo,
            entitlement_repo,
            reconciler,
            account_locks: KeyedLocks::new(),
        }
    }

    pub async fn payment_succeeded(
        &self,
        event: PaymentSucceeded,
    ) -> Result<PaymentApplied, PaymentEventError> {
        let plan = self
            .plan_repo
            .find_active_plan_by_id(event.plan_id)
            .await?
            .ok_or(PaymentEventError::PlanNotFound)?;
        if plan.duration_days <= 0 {
            return Err(PaymentEventError::InvalidPlan(format!(
                "duration_days must be positive, got {}",
                plan.duration_days
            )));
        }

        // Read-extend-write of the premium window is serialized per account.
        let guard = self.account_locks.acquire(event.account_id).await;

        let existing = match event.provider_payment_id.clone() {
            Some(provider_payment_id) => {
                self.payment_repo
                    .find_by_provider_payment_id(provider_payment_id)
                    .await?
            }
            None => None,
        };
        let mut applied = match existing {
            Some(existing) => self.replay(existing, plan.premium_plan).await?,
            None => self.apply(&event, &plan).await?,
        };
        drop(guard);

        // The payment stands even if the bot cannot be started right now; the timer retries.
        applied.reconcile = match self
            .reconciler
            .reconcile_account(applied.account_id, ReconcileTrigger::PaymentSucceeded)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(OrchestratorError::InstanceNotFound) => None,
            Err(err) => {
                warn!(
                    account_id = %applied.account_id,
                    error = %err,
                    "payment_events: reconcile after payment failed"
                );
                None
            }
        };

        Ok(applied)
    }

    async fn apply(
        &self,
        event: &PaymentSucceeded,
        plan: &PlanEntity,
    ) -> Result<PaymentApplied, PaymentEventError> {
        let record = self
            .entitlement_repo
            .get_account_entitlement(event.account_id)
            .await?
            .ok_or(PaymentEventError::AccountNotFound)?;

        let now = Utc::now();
        let extended = extend_window(
            &record,
            plan.premium_plan,
            plan.duration_days,
            event.paid_through,
            now,
        );
        let premium_to = extended.premium_to.unwrap_or(now);

        let payment_id = self
            .payment_repo
            .record_payment(NewPaymentEntity {
                user_id: event.account_id,
                plan_id: plan.id,
                amount_minor: event.amount_minor.unwrap_or(plan.price_minor),
                duration_days: plan.duration_days,
                status: PaymentStatus::Succeeded.as_str().to_string(),
                provider_payment_id: event.provider_payment_id.clone(),
                paid_through: premium_to,
            })
            .await?;

        self.entitlement_repo
            .save_account_premium(extended.clone())
            .await?;

        info!(
            account_id = %event.account_id,
            %payment_id,
            plan = %extended.stored_tier(),
            %premium_to,
            "payment_events: premium extended"
        );

        Ok(PaymentApplied {
            payment_id,
            account_id: event.account_id,
            plan: extended.stored_tier(),
            premium_from: extended.premium_from,
            premium_to,
            reconcile: None,
            replayed: false,
        })
    }

    /// A redelivered payment. Only completes a window an earlier delivery failed to save.
    async fn replay(
        &self,
        existing: PaymentEntity,
        plan: PremiumPlan,
    ) -> Result<PaymentApplied, PaymentEventError> {
        let record = self
            .entitlement_repo
            .get_account_entitlement(existing.user_id)
            .await?
            .ok_or(PaymentEventError::AccountNotFound)?;

        let short = record
            .premium_to
            .is_none_or(|to| to < existing.paid_through);
        let record = if short {
            let repaired = complete_window(&record, &existing, plan);
            self.entitlement_repo
                .save_account_premium(repaired.clone())
                .await?;
            repaired
        } else {
            record
        };

        info!(
            account_id = %existing.user_id,
            payment_id = %existing.id,
            repaired = short,
            "payment_events: duplicate payment delivery"
        );

        Ok(PaymentApplied {
            payment_id: existing.id,
            account_id: existing.user_id,
            plan: record.stored_tier(),
            premium_from: record.premium_from,
            premium_to: record.premium_to.unwrap_or(existing.paid_through),
            reconcile: None,
            replayed: true,
        })
    }
}

/// The window a recorded payment promised, for an account whose save never landed.
fn complete_window(
    record: &EntitlementRecord,
    payment: &PaymentEntity,
    plan: PremiumPlan,
) -> EntitlementRecord {
    let covered = record
        .premium_to
        .is_some_and(|to| to >= payment.created_at);
    let premium_from = match record.premium_from {
        Some(from) if covered && from <= payment.created_at => from,
        _ => payment.created_at,
    };
    let premium_plan = if covered && record.premium_plan.tier() > plan.tier() {
        record.premium_plan
    } else {
        plan
    };

    EntitlementRecord {
        account_id: record.account_id,
        premium_plan,
        premium_plus: plan == PremiumPlan::PremiumPlus || (covered && record.premium_plus),
        premium_from: Some(premium_from),
        premium_to: Some(payment.paid_through),
    }
}

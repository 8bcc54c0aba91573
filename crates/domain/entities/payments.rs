use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::payments;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub amount_minor: i32,
    pub duration_days: i32,
    pub status: String,
    pub provider_payment_id: Option<String>,
    pub paid_through: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub amount_minor: i32,
    pub duration_days: i32,
    pub status: String,
    pub provider_payment_id: Option<String>,
    pub paid_through: DateTime<Utc>,
}

// Payments are append-only; there is no update entity.
pub type NewPaymentEntity = InsertPaymentEntity;

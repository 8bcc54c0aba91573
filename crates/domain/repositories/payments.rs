use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::payments::{NewPaymentEntity, PaymentEntity};

#[async_trait]
#[automock]
pub trait PaymentRepository {
    async fn record_payment(&self, payment: NewPaymentEntity) -> Result<Uuid>;

    async fn find_by_provider_payment_id(
        &self,
        provider_payment_id: String,
    ) -> Result<Option<PaymentEntity>>;
}

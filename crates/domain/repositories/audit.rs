use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::entities::audit_records::NewAuditRecord;

#[async_trait]
#[automock]
pub trait AuditRepository {
    async fn record_transition(&self, record: NewAuditRecord) -> Result<()>;
}

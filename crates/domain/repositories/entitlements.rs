use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::value_objects::entitlements::{EntitlementRecord, GuildEntitlementRecord};

/// Read/write access to subscription facts. No business rules live behind this trait.
#[async_trait]
#[automock]
pub trait EntitlementRepository {
    async fn get_account_entitlement(&self, account_id: Uuid)
    -> Result<Option<EntitlementRecord>>;

    async fn get_guild_entitlement(&self, guild_id: String)
    -> Result<Option<GuildEntitlementRecord>>;

    /// Overwrites the plan and premium window of an account.
    async fn save_account_premium(&self, record: EntitlementRecord) -> Result<()>;
}

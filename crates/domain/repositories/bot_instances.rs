use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::value_objects::bot_instances::{
    InstanceRecord, InstanceStateUpdate, SaveOutcome,
};

#[async_trait]
#[automock]
pub trait BotInstanceRepository {
    async fn get_instance(&self, instance_id: Uuid) -> Result<Option<InstanceRecord>>;

    async fn find_by_account(&self, account_id: Uuid) -> Result<Option<InstanceRecord>>;

    /// Accounts that own a bot instance.
    async fn list_account_ids(&self) -> Result<Vec<Uuid>>;

    /// Compare-and-set on `version`. Returns `Conflict` when another writer got there first.
    async fn save_instance_state(
        &self,
        instance_id: Uuid,
        expected_version: i64,
        update: InstanceStateUpdate,
    ) -> Result<SaveOutcome>;
}

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

#[async_trait]
#[automock]
pub trait GuildActivityRepository {
    /// Bumps `total_commands` and `last_activity` on the guild. Returns false when the guild is unknown.
    async fn record_guild_command(&self, guild_id: String, at: DateTime<Utc>) -> Result<bool>;

    async fn touch_instance_activity(&self, instance_id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::guild_settings::GuildBotSettings;

#[async_trait]
#[automock]
pub trait GuildBotSettingsRepository {
    async fn get_settings(&self, guild_id: String) -> Result<Option<GuildBotSettings>>;
    async fn upsert_settings(&self, guild_id: String, settings: GuildBotSettings) -> Result<()>;
}

use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, insert_into, prelude::*};
use std::sync::Arc;

use crate::{
    domain::{
        entities::guild_bot_settings::GuildBotSettingsEntity,
        repositories::guild_bot_settings::GuildBotSettingsRepository,
        value_objects::guild_settings::GuildBotSettings,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::guild_bot_settings},
};

pub struct GuildBotSettingsPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl GuildBotSettingsPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl GuildBotSettingsRepository for GuildBotSettingsPostgres {
    async fn get_settings(&self, guild_id: String) -> Result<Option<GuildBotSettings>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = guild_bot_settings::table
            .filter(guild_bot_settings::guild_id.eq(guild_id))
            .select(GuildBotSettingsEntity::as_select())
            .first::<GuildBotSettingsEntity>(&mut conn)
            .optional()?;

        Ok(row.map(GuildBotSettings::from))
    }

    async fn upsert_settings(&self, guild_id: String, settings: GuildBotSettings) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entity = GuildBotSettingsEntity::new(guild_id, settings);
        insert_into(guild_bot_settings::table)
            .values(&entity)
            .on_conflict(guild_bot_settings::guild_id)
            .do_update()
            .set(&entity)
            .execute(&mut conn)?;

        Ok(())
    }
}

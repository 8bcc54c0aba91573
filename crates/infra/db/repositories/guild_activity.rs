use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::repositories::guild_activity::GuildActivityRepository,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{bot_instances, guilds},
    },
};

pub struct GuildActivityPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl GuildActivityPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl GuildActivityRepository for GuildActivityPostgres {
    async fn record_guild_command(&self, guild_id: String, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let affected = update(guilds::table)
            .filter(guilds::id.eq(guild_id))
            .set((
                guilds::total_commands.eq(guilds::total_commands + 1),
                guilds::last_activity.eq(Some(at)),
            ))
            .execute(&mut conn)?;

        Ok(affected > 0)
    }

    async fn touch_instance_activity(&self, instance_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // Not a lifecycle write: leaves `version` alone.
        update(bot_instances::table)
            .filter(bot_instances::id.eq(instance_id))
            .set(bot_instances::last_activity.eq(Some(at)))
            .execute(&mut conn)?;

        Ok(())
    }
}

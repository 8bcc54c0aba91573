use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        entities::bot_instances::{BotInstanceEntity, UpdateBotStateEntity},
        repositories::bot_instances::BotInstanceRepository,
        value_objects::bot_instances::{InstanceRecord, InstanceStateUpdate, SaveOutcome},
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::bot_instances},
};

pub struct BotInstancePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl BotInstancePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl BotInstanceRepository for BotInstancePostgres {
    async fn get_instance(&self, instance_id: Uuid) -> Result<Option<InstanceRecord>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = bot_instances::table
            .filter(bot_instances::id.eq(instance_id))
            .select(BotInstanceEntity::as_select())
            .first::<BotInstanceEntity>(&mut conn)
            .optional()?;

        Ok(row.map(InstanceRecord::from))
    }

    async fn find_by_account(&self, account_id: Uuid) -> Result<Option<InstanceRecord>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = bot_instances::table
            .filter(bot_instances::user_id.eq(account_id))
            .select(BotInstanceEntity::as_select())
            .first::<BotInstanceEntity>(&mut conn)
            .optional()?;

        Ok(row.map(InstanceRecord::from))
    }

    async fn list_account_ids(&self) -> Result<Vec<Uuid>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let ids = bot_instances::table
            .select(bot_instances::user_id)
            .order(bot_instances::user_id.asc())
            .load::<Uuid>(&mut conn)?;

        Ok(ids)
    }

    async fn save_instance_state(
        &self,
        instance_id: Uuid,
        expected_version: i64,
        update_state: InstanceStateUpdate,
    ) -> Result<SaveOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let changes = UpdateBotStateEntity::from(update_state);
        let new_version = update(bot_instances::table)
            .filter(bot_instances::id.eq(instance_id))
            .filter(bot_instances::version.eq(expected_version))
            .set((&changes, bot_instances::version.eq(bot_instances::version + 1)))
            .returning(bot_instances::version)
            .get_result::<i64>(&mut conn)
            .optional()?;

        Ok(match new_version {
            Some(version) => SaveOutcome::Saved { version },
            None => SaveOutcome::Conflict,
        })
    }
}

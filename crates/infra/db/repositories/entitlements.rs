use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            guilds::GuildEntity,
            subscribers::{SubscriberEntity, UpdatePremiumWindowEntity},
        },
        repositories::entitlements::EntitlementRepository,
        value_objects::entitlements::{EntitlementRecord, GuildEntitlementRecord},
    },
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{guilds, users},
    },
};

pub struct EntitlementPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl EntitlementPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl EntitlementRepository for EntitlementPostgres {
    async fn get_account_entitlement(
        &self,
        account_id: Uuid,
    ) -> Result<Option<EntitlementRecord>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = users::table
            .filter(users::id.eq(account_id))
            .select(SubscriberEntity::as_select())
            .first::<SubscriberEntity>(&mut conn)
            .optional()?;

        Ok(row.map(EntitlementRecord::from))
    }

    async fn get_guild_entitlement(
        &self,
        guild_id: String,
    ) -> Result<Option<GuildEntitlementRecord>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = guilds::table
            .filter(guilds::id.eq(guild_id))
            .select(GuildEntity::as_select())
            .first::<GuildEntity>(&mut conn)
            .optional()?;

        Ok(row.map(GuildEntitlementRecord::from))
    }

    async fn save_account_premium(&self, record: EntitlementRecord) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let account_id = record.account_id;

        let changes = UpdatePremiumWindowEntity::from(record);
        let affected = update(users::table)
            .filter(users::id.eq(account_id))
            .set(&changes)
            .execute(&mut conn)?;

        if affected == 0 {
            anyhow::bail!("account {account_id} not found");
        }

        Ok(())
    }
}

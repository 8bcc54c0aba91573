use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, insert_into};
use std::sync::Arc;

use crate::{
    domain::{entities::audit_records::NewAuditRecord, repositories::audit::AuditRepository},
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::bot_audit_records},
};

pub struct AuditPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl AuditPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl AuditRepository for AuditPostgres {
    async fn record_transition(&self, record: NewAuditRecord) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        insert_into(bot_audit_records::table)
            .values(&record)
            .execute(&mut conn)?;

        Ok(())
    }
}

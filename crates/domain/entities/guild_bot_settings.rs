use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::{
    domain::value_objects::guild_settings::GuildBotSettings,
    infra::db::postgres::schema::guild_bot_settings,
};

#[derive(Debug, Clone, Identifiable, Selectable, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = guild_bot_settings, primary_key(guild_id), treat_none_as_null = true)]
pub struct GuildBotSettingsEntity {
    pub guild_id: String,
    pub bot_name: Option<String>,
    pub bot_avatar: Option<String>,
    pub embed_color: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl GuildBotSettingsEntity {
    pub fn new(guild_id: String, settings: GuildBotSettings) -> Self {
        Self {
            guild_id,
            bot_name: settings.bot_name,
            bot_avatar: settings.bot_avatar,
            embed_color: settings.embed_color,
            updated_at: Utc::now(),
        }
    }
}

impl From<GuildBotSettingsEntity> for GuildBotSettings {
    fn from(value: GuildBotSettingsEntity) -> Self {
        Self {
            bot_name: value.bot_name,
            bot_avatar: value.bot_avatar,
            embed_color: value.embed_color,
        }
    }
}

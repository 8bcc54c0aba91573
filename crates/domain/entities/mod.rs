pub mod audit_records;
pub mod bot_instances;
pub mod guild_bot_settings;
pub mod guilds;
pub mod payments;
pub mod plans;
pub mod subscribers;

pub mod audit;
pub mod bot_instances;
pub mod entitlements;
pub mod guild_activity;
pub mod guild_bot_settings;
pub mod payments;
pub mod plans;

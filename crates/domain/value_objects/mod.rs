pub mod bot_instances;
pub mod entitlements;
pub mod enums;
pub mod guild_settings;
pub mod operator_alerts;
pub mod plans;

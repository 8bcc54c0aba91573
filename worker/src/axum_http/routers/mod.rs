pub mod activity;
pub mod admin;
pub mod bots;
pub mod guild_settings;
pub mod payments;

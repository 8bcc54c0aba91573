pub mod activity_tracker;
pub mod entitlement_engine;
pub mod guild_settings;
pub mod orchestrator;
pub mod payment_events;

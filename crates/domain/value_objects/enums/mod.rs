pub mod bot_statuses;
pub mod payment_statuses;
pub mod premium_plans;
pub mod transition_causes;

mod config;
mod discord;
mod notifier;
mod operator;

use anyhow::Result;
use config::ObservabilityConfig;
use discord::DiscordWebhookProvider;
use notifier::Notifier;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use operator::OperatorNotifier;

const ALERT_QUEUE_CAPACITY: usize = 256;

pub fn init_observability(component: &str) -> Result<()> {
    let config = ObservabilityConfig::from_env(component);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Local time so `TZ=...` is reflected in the log offset.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()?;

    for warning in &config.warnings {
        warn!(
            service = %config.service_context.service_name,
            environment = %config.service_context.environment,
            warning = %warning,
            "observability: config warning"
        );
    }

    info!(
        service = %config.service_context.service_name,
        environment = %config.service_context.environment,
        component = %config.service_context.component,
        "observability: tracing initialised"
    );

    Ok(())
}

/// Builds the operator channel from the environment. Must run inside a tokio runtime.
pub fn operator_notifier(component: &str) -> Result<OperatorNotifier> {
    let config = ObservabilityConfig::from_env(component);

    let notifier = match config.operator_webhook {
        Some(url) => {
            let provider = DiscordWebhookProvider::new(url)?;
            Some(Notifier::new(vec![Arc::new(provider)], ALERT_QUEUE_CAPACITY))
        }
        None => None,
    };

    let operator = OperatorNotifier::new(notifier, config.service_context);
    if operator.forwards_alerts() {
        info!("observability: operator alerts forwarded to discord");
    } else {
        info!("observability: operator alerts are log-only");
    }

    Ok(operator)
}

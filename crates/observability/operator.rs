use chrono::Utc;
use tracing::error;

use super::{
    config::ServiceContext,
    notifier::{AlertEnvelope, Notifier},
};
use crate::domain::{
    repositories::operator_channel::OperatorChannel,
    value_objects::operator_alerts::OperatorAlert,
};

/// Operator channel: every alert is logged at `error`, and forwarded to the webhook when one is configured.
#[derive(Clone)]
pub struct OperatorNotifier {
    notifier: Option<Notifier>,
    service_context: ServiceContext,
}

impl OperatorNotifier {
    pub(crate) fn new(notifier: Option<Notifier>, service_context: ServiceContext) -> Self {
        Self {
            notifier,
            service_context,
        }
    }

    pub fn log_only(component: &str) -> Self {
        Self::new(
            None,
            ServiceContext {
                service_name: component.to_string(),
                environment: "unknown".to_string(),
                component: component.to_string(),
            },
        )
    }

    pub fn forwards_alerts(&self) -> bool {
        self.notifier.is_some()
    }
}

impl OperatorChannel for OperatorNotifier {
    fn notify(&self, alert: OperatorAlert) {
        error!(
            alert = alert.kind(),
            service = %self.service_context.service_name,
            detail = %alert,
            "operator: attention required"
        );

        if let Some(notifier) = &self.notifier {
            notifier.try_notify(AlertEnvelope {
                timestamp: Utc::now(),
                service_name: self.service_context.service_name.clone(),
                environment: self.service_context.environment.clone(),
                component: self.service_context.component.clone(),
                kind: alert.kind(),
                message: alert.to_string(),
            });
        }
    }
}

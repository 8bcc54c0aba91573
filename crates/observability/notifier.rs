use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Clone, Debug)]
pub(crate) struct AlertEnvelope {
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
    pub(crate) kind: &'static str,
    pub(crate) message: String,
}

#[async_trait]
pub(crate) trait AlertProvider: Send + Sync {
    async fn send(&self, envelope: &AlertEnvelope) -> Result<()>;
    fn provider_name(&self) -> &'static str;
}

/// Bounded queue in front of slow providers. Producers never wait.
#[derive(Clone)]
pub(crate) struct Notifier {
    tx: mpsc::Sender<AlertEnvelope>,
}

impl Notifier {
    pub(crate) fn new(providers: Vec<Arc<dyn AlertProvider>>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AlertEnvelope>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                for provider in &providers {
                    if let Err(error) = provider.send(&envelope).await {
                        warn!(
                            provider = provider.provider_name(),
                            kind = envelope.kind,
                            error = %error,
                            "operator: alert provider failed"
                        );
                    }
                }
            }
        });

        Self { tx }
    }

    pub(crate) fn try_notify(&self, envelope: AlertEnvelope) -> bool {
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(kind = dropped.kind, "operator: alert queue full; dropping alert");
                false
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                warn!(kind = dropped.kind, "operator: alert queue closed; dropping alert");
                false
            }
        }
    }
}

use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::bot_instances::{LaunchSpec, ProcessProbe, ProcessRef};

/// Outbound port to whatever actually runs worker processes.
#[async_trait]
#[automock]
pub trait ProcessManager {
    async fn spawn(&self, launch: LaunchSpec) -> Result<ProcessRef>;

    async fn probe(&self, process_ref: ProcessRef) -> Result<ProcessProbe>;

    /// Graceful shutdown request (SIGTERM or equivalent).
    async fn terminate(&self, process_ref: ProcessRef) -> Result<()>;

    async fn kill(&self, process_ref: ProcessRef) -> Result<()>;
}

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use crates::domain::repositories::guild_activity::GuildActivityRepository;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("guild not found")]
    GuildNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ActivityError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ActivityError::GuildNotFound => StatusCode::NOT_FOUND,
            ActivityError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// How long an instance has gone without a command. A bot that never handled one
/// counts from its start.
pub fn idle_for(
    last_activity: Option<DateTime<Utc>>,
    running_for: Option<Duration>,
    now: DateTime<Utc>,
) -> Duration {
    let started_at = running_for
        .and_then(|running| chrono::Duration::from_std(running).ok())
        .map(|running| now - running);

    let reference = match (last_activity, started_at) {
        (Some(last), Some(started)) => last.max(started),
        (Some(last), None) => last,
        (None, Some(started)) => started,
        (None, None) => return Duration::ZERO,
    };

    (now - reference).to_std().unwrap_or(Duration::ZERO)
}

pub struct GuildActivityTracker<G>
where
    G: GuildActivityRepository + Send + Sync + 'static,
{
    activity_repo: Arc<G>,
}

impl<G> GuildActivityTracker<G>
where
    G: GuildActivityRepository + Send + Sync + 'static,
{
    pub fn new(activity_repo: Arc<G>) -> Self {
        Self { activity_repo }
    }

    pub async fn record_command(
        &self,
        guild_id: &str,
        instance_id: Option<Uuid>,
    ) -> Result<(), ActivityError> {
        let now = Utc::now();
        let known = self
            .activity_repo
            .record_guild_command(guild_id.to_string(), now)
            .await?;
        if !known {
            return Err(ActivityError::GuildNotFound);
        }

        if let Some(instance_id) = instance_id {
            self.activity_repo
                .touch_instance_activity(instance_id, now)
                .await?;
        }

        debug!(guild_id, ?instance_id, "activity_tracker: command recorded");
        Ok(())
    }

    pub async fn touch_instance(&self, instance_id: Uuid) -> Result<(), ActivityError> {
        self.activity_repo
            .touch_instance_activity(instance_id, Utc::now())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crates::domain::repositories::guild_activity::MockGuildActivityRepository;
    use mockall::predicate::{always, eq};

    #[test]
    fn idle_counts_from_start_when_no_command_seen() {
        let now = Utc::now();
        let idle = idle_for(None, Some(Duration::from_secs(400)), now);
        assert_eq!(idle, Duration::from_secs(400));
    }

    #[test]
    fn recent_command_resets_idle_time() {
        let now = Utc::now();
        let idle = idle_for(
            Some(now - chrono::Duration::seconds(30)),
            Some(Duration::from_secs(3600)),
            now,
        );
        assert_eq!(idle, Duration::from_secs(30));
    }

    #[test]
    fn command_from_a_previous_run_does_not_count() {
        let now = Utc::now();
        let idle = idle_for(
            Some(now - chrono::Duration::days(2)),
            Some(Duration::from_secs(10)),
            now,
        );
        assert_eq!(idle, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn records_guild_and_instance_activity() {
        let instance_id = Uuid::new_v4();
        let mut repo = MockGuildActivityRepository::new();
        repo.expect_record_guild_command()
            .with(eq("42".to_string()), always())
            .times(1)
            .returning(|_, _| Box::pin(async move { Ok(true) }));
        repo.expect_touch_instance_activity()
            .with(eq(instance_id), always())
            .times(1)
            .returning(|_, _| Box::pin(async move { Ok(()) }));

        let tracker = GuildActivityTracker::new(Arc::new(repo));

        tracker.record_command("42", Some(instance_id)).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_guild_is_rejected() {
        let mut repo = MockGuildActivityRepository::new();
        repo.expect_record_guild_command()
            .returning(|_, _| Box::pin(async move { Ok(false) }));
        repo.expect_touch_instance_activity().never();

        let tracker = GuildActivityTracker::new(Arc::new(repo));
        let err = tracker
            .record_command("missing", Some(Uuid::new_v4()))
            .await
            .unwrap_err();

        assert!(matches!(err, ActivityError::GuildNotFound));
    }
}

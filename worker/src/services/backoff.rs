use std::{collections::HashMap, time::Duration};

use tokio::{sync::Mutex, time::Instant};
use uuid::Uuid;

use crate::config::config_model::BackoffConfig;

#[derive(Debug, Clone, Copy)]
struct CrashHistory {
    consecutive: u32,
    last_crash_at: Instant,
    /// Operator already told about this loop.
    loop_reported: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashVerdict {
    pub consecutive: u32,
    pub delay: Duration,
    pub crash_loop: bool,
    /// True only for the crash that crossed the ceiling.
    pub newly_looping: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Allowed,
    Wait { remaining: Duration },
    CrashLoop { consecutive: u32 },
}

/// Exponential restart backoff per instance.
pub struct RestartBackoff {
    config: BackoffConfig,
    history: Mutex<HashMap<Uuid, CrashHistory>>,
}

impl RestartBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// `base * 2^(n-1)`, capped. Zero before the first crash.
    pub fn delay_for(&self, consecutive: u32) -> Duration {
        if consecutive == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(consecutive - 1).unwrap_or(u32::MAX);
        self.config
            .base
            .checked_mul(factor)
            .unwrap_or(self.config.cap)
            .min(self.config.cap)
    }

    pub async fn record_crash(&self, instance_id: Uuid) -> CrashVerdict {
        let mut history = self.history.lock().await;
        let entry = history.entry(instance_id).or_insert(CrashHistory {
            consecutive: 0,
            last_crash_at: Instant::now(),
            loop_reported: false,
        });
        entry.consecutive = entry.consecutive.saturating_add(1);
        entry.last_crash_at = Instant::now();

        let crash_loop = entry.consecutive >= self.config.crash_loop_ceiling;
        let newly_looping = crash_loop && !entry.loop_reported;
        if newly_looping {
            entry.loop_reported = true;
        }

        CrashVerdict {
            consecutive: entry.consecutive,
            delay: self.delay_for(entry.consecutive),
            crash_loop,
            newly_looping,
        }
    }

    pub async fn restart_decision(&self, instance_id: Uuid) -> RestartDecision {
        let history = self.history.lock().await;
        let Some(entry) = history.get(&instance_id) else {
            return RestartDecision::Allowed;
        };

        if entry.consecutive >= self.config.crash_loop_ceiling {
            return RestartDecision::CrashLoop {
                consecutive: entry.consecutive,
            };
        }

        let ready_at = entry.last_crash_at + self.delay_for(entry.consecutive);
        let now = Instant::now();
        if now >= ready_at {
            RestartDecision::Allowed
        } else {
            RestartDecision::Wait {
                remaining: ready_at - now,
            }
        }
    }

    /// Forgets the crash history once the instance has stayed up long enough.
    pub async fn record_uptime(&self, instance_id: Uuid, running_for: Duration) -> bool {
        if running_for < self.config.healthy_reset {
            return false;
        }
        self.history.lock().await.remove(&instance_id).is_some()
    }

    pub async fn reset(&self, instance_id: Uuid) {
        self.history.lock().await.remove(&instance_id);
    }

    pub async fn consecutive_crashes(&self, instance_id: Uuid) -> u32 {
        self.history
            .lock()
            .await
            .get(&instance_id)
            .map(|entry| entry.consecutive)
            .unwrap_or(0)
    }
}

use std::{future::Future, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app_state::PgOrchestrator;

/// Runs `tick` every `interval` until `cancel` fires. The first tick waits one full interval.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    interval: Duration,
    cancel: CancellationToken,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    info!(task = name, interval_ms = interval.as_millis() as u64, "worker_loop: started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        // Let an in-flight pass finish, but don't start one after cancellation.
        if cancel.is_cancelled() {
            break;
        }
        tick().await;
    }
    info!(task = name, "worker_loop: stopped");
}

pub async fn run_reconcile_loop(
    orchestrator: Arc<PgOrchestrator>,
    interval: Duration,
    cancel: CancellationToken,
) {
    run_periodic("reconcile", interval, cancel, || {
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            match orchestrator.reconcile_all().await {
                Ok(summary) => info!(
                    accounts = summary.accounts,
                    changed = summary.changed,
                    failed = summary.failed,
                    "worker_loop: reconcile pass finished"
                ),
                Err(err) => warn!(error = %err, "worker_loop: reconcile pass failed"),
            }
        }
    })
    .await
}

pub async fn run_health_loop(
    orchestrator: Arc<PgOrchestrator>,
    interval: Duration,
    cancel: CancellationToken,
) {
    run_periodic("health", interval, cancel, || {
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            let changed = orchestrator.health_sweep().await;
            if changed > 0 {
                info!(changed, "worker_loop: health sweep changed instances");
            } else {
                debug!("worker_loop: health sweep clean");
            }
        }
    })
    .await
}

pub async fn run_idle_loop(
    orchestrator: Arc<PgOrchestrator>,
    interval: Duration,
    cancel: CancellationToken,
) {
    run_periodic("idle", interval, cancel, || {
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            let stopped = orchestrator.idle_sweep().await;
            if stopped > 0 {
                info!(stopped, "worker_loop: idle sweep stopped instances");
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_interval_until_cancelled() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let ticks = Arc::clone(&ticks);
            let cancel = cancel.clone();
            async move {
                run_periodic("test", Duration::from_secs(10), cancel, || {
                    let ticks = Arc::clone(&ticks);
                    async move {
                        ticks.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .await
            }
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        cancel.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_first_interval_never_ticks() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let counter = Arc::clone(&ticks);
        run_periodic("test", Duration::from_secs(1), cancel, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}

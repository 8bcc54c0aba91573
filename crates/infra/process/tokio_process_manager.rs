use std::{
    collections::HashMap,
    path::PathBuf,
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::Mutex,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    repositories::process_manager::ProcessManager,
    value_objects::bot_instances::{LaunchSpec, ProcessProbe, ProcessRef},
};

/// Line a worker prints once its gateway session is ready.
pub const READY_MARKER: &str = "@@bot:ready";
/// Line a worker prints on every heartbeat.
pub const HEARTBEAT_MARKER: &str = "@@bot:heartbeat";

#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Extra variables every worker inherits (database/cache URLs, runtime mode).
    pub pass_through_env: Vec<(String, String)>,
}

struct TrackedChild {
    child: Child,
    ready: Arc<AtomicBool>,
    heartbeats: Arc<AtomicU64>,
}

/// Runs each bot as a direct child of this daemon.
pub struct TokioProcessManager {
    command: WorkerCommand,
    children: Mutex<HashMap<u32, TrackedChild>>,
}

impl TokioProcessManager {
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            command,
            children: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ProcessManager for TokioProcessManager {
    async fn spawn(&self, launch: LaunchSpec) -> Result<ProcessRef> {
        let mut command = Command::new(&self.command.program);
        command
            .args(&self.command.args)
            .envs(self.command.pass_through_env.iter().cloned())
            .envs(launch.env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.command.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn worker {}", launch.process_name))?;
        let pid = child
            .id()
            .context("spawned worker exited before reporting a pid")?;

        let ready = Arc::new(AtomicBool::new(false));
        let heartbeats = Arc::new(AtomicU64::new(0));

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_stdout(
                stdout,
                launch.instance_id,
                Arc::clone(&ready),
                Arc::clone(&heartbeats),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr, launch.instance_id));
        }

        self.children.lock().await.insert(
            pid,
            TrackedChild {
                child,
                ready,
                heartbeats,
            },
        );

        info!(
            instance_id = %launch.instance_id,
            pid,
            process_name = %launch.process_name,
            "process_manager: worker spawned"
        );

        Ok(ProcessRef {
            pid,
            name: launch.process_name,
        })
    }

    async fn probe(&self, process_ref: ProcessRef) -> Result<ProcessProbe> {
        let mut children = self.children.lock().await;
        let Some(tracked) = children.get_mut(&process_ref.pid) else {
            return Ok(ProcessProbe::Unknown);
        };

        match tracked.child.try_wait()? {
            Some(status) => {
                children.remove(&process_ref.pid);
                Ok(ProcessProbe::Exited {
                    code: status.code(),
                })
            }
            None => Ok(ProcessProbe::Alive {
                ready: tracked.ready.load(Ordering::Acquire),
                heartbeats: tracked.heartbeats.load(Ordering::Acquire),
            }),
        }
    }

    async fn terminate(&self, process_ref: ProcessRef) -> Result<()> {
        let mut children = self.children.lock().await;
        match children.get_mut(&process_ref.pid) {
            Some(tracked) => send_sigterm(tracked, &process_ref),
            None => Ok(()),
        }
    }

    async fn kill(&self, process_ref: ProcessRef) -> Result<()> {
        let tracked = self.children.lock().await.remove(&process_ref.pid);
        let Some(mut tracked) = tracked else {
            return Ok(());
        };

        tracked
            .child
            .start_kill()
            .with_context(|| format!("SIGKILL to {} failed", process_ref.name))?;
        // Reap so the pid does not linger as a zombie.
        if let Err(err) = tracked.child.wait().await {
            warn!(pid = process_ref.pid, error = %err, "process_manager: reap after kill failed");
        }
        Ok(())
    }
}

#[cfg(unix)]
fn send_sigterm(_tracked: &mut TrackedChild, process_ref: &ProcessRef) -> Result<()> {
    let pid = i32::try_from(process_ref.pid).context("pid out of range")?;
    // SAFETY: plain syscall on a pid we spawned and still hold a handle to.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("SIGTERM to {} failed", process_ref.name));
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_sigterm(tracked: &mut TrackedChild, process_ref: &ProcessRef) -> Result<()> {
    tracked
        .child
        .start_kill()
        .with_context(|| format!("terminate {} failed", process_ref.name))
}

async fn forward_stdout<R>(
    stream: R,
    instance_id: Uuid,
    ready: Arc<AtomicBool>,
    heartbeats: Arc<AtomicU64>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            READY_MARKER => ready.store(true, Ordering::Release),
            HEARTBEAT_MARKER => {
                heartbeats.fetch_add(1, Ordering::AcqRel);
            }
            other => debug!(%instance_id, line = other, "worker"),
        }
    }
}

async fn forward_stderr<R>(stream: R, instance_id: Uuid)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!(%instance_id, line = %line, "worker stderr");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::value_objects::bot_instances::BotToken;
    use std::time::Duration;

    fn launch(script: &str) -> (TokioProcessManager, LaunchSpec) {
        let manager = TokioProcessManager::new(WorkerCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: None,
            pass_through_env: vec![],
        });
        let account_id = Uuid::new_v4();
        let spec = LaunchSpec {
            instance_id: Uuid::new_v4(),
            account_id,
            process_name: ProcessRef::process_name(account_id),
            bot_token: BotToken::new("token"),
            application_id: "42".to_string(),
            bot_name: "Music Bot".to_string(),
            bot_activity: None,
            default_volume: 100,
            enable_247: false,
            enable_autoplay: false,
        };
        (manager, spec)
    }

    async fn wait_for<F>(manager: &TokioProcessManager, process_ref: &ProcessRef, done: F) -> ProcessProbe
    where
        F: Fn(&ProcessProbe) -> bool,
    {
        for _ in 0..100 {
            let probe = manager.probe(process_ref.clone()).await.unwrap();
            if done(&probe) {
                return probe;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("probe condition never met");
    }

    #[tokio::test]
    async fn ready_and_heartbeat_markers_are_observed() {
        let (manager, spec) = launch("echo @@bot:ready; echo @@bot:heartbeat; sleep 5");
        let process_ref = manager.spawn(spec).await.unwrap();

        let probe = wait_for(&manager, &process_ref, |p| {
            matches!(p, ProcessProbe::Alive { ready: true, heartbeats: 1 })
        })
        .await;
        assert!(matches!(probe, ProcessProbe::Alive { .. }));

        manager.kill(process_ref.clone()).await.unwrap();
        assert_eq!(manager.probe(process_ref).await.unwrap(), ProcessProbe::Unknown);
    }

    #[tokio::test]
    async fn exit_code_is_reported() {
        let (manager, spec) = launch("exit 3");
        let process_ref = manager.spawn(spec).await.unwrap();

        let probe = wait_for(&manager, &process_ref, |p| matches!(p, ProcessProbe::Exited { .. })).await;
        assert_eq!(probe, ProcessProbe::Exited { code: Some(3) });
    }

    #[tokio::test]
    async fn terminate_sends_sigterm() {
        let (manager, spec) = launch("sleep 30");
        let process_ref = manager.spawn(spec).await.unwrap();

        manager.terminate(process_ref.clone()).await.unwrap();

        let probe = wait_for(&manager, &process_ref, |p| matches!(p, ProcessProbe::Exited { .. })).await;
        assert_eq!(probe, ProcessProbe::Exited { code: None });
    }
}

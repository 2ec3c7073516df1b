use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::CompanionConfig;

/// How long `start` waits for the first spawn attempt to be recorded.
const FIRST_SPAWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct CompanionSpec {
    pub program: PathBuf,
    pub name: String,
    pub args: Vec<String>,
}

impl From<&CompanionConfig> for CompanionSpec {
    fn from(config: &CompanionConfig) -> Self {
        Self {
            program: config.program.clone(),
            name: config.name.clone(),
            args: config.args.clone(),
        }
    }
}

impl CompanionSpec {
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        #[cfg(unix)]
        cmd.arg0(&self.name);
        cmd.args(&self.args);
        cmd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Exited,
}

/// One instance of the companion. A respawn creates a new instance with a
/// new pid; an instance is never restarted in place.
#[derive(Debug, Clone)]
pub struct SupervisedProcess {
    pub pid: u32,
    pub state: ProcessState,
    pub started_at: Instant,
    pub exit_status: Option<ExitStatus>,
}

#[derive(Debug, Default)]
struct SupervisorState {
    current: Option<SupervisedProcess>,
    spawns: u64,
    spawn_failures: u64,
}

impl SupervisorState {
    fn attempts(&self) -> u64 {
        self.spawns + self.spawn_failures
    }

    fn running_pid(&self) -> Option<u32> {
        self.current
            .as_ref()
            .filter(|p| p.state == ProcessState::Running)
            .map(|p| p.pid)
    }
}

type Shared = Arc<(Mutex<SupervisorState>, Condvar)>;

fn update(shared: &Shared, f: impl FnOnce(&mut SupervisorState)) {
    let (lock, cvar) = &**shared;
    match lock.lock() {
        Ok(mut state) => f(&mut *state),
        Err(poisoned) => f(&mut *poisoned.into_inner()),
    }
    cvar.notify_all();
}

pub struct CompanionSupervisor {
    spec: CompanionSpec,
}

impl CompanionSupervisor {
    pub fn new(spec: CompanionSpec) -> Self {
        Self { spec }
    }

    /// Start the supervision thread and return once the first spawn has been
    /// attempted.
    pub fn start(self) -> io::Result<SupervisorHandle> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name("companion-supervisor")
            .build()?;

        let shared: Shared = Arc::new((Mutex::new(SupervisorState::default()), Condvar::new()));
        let thread_shared = Arc::clone(&shared);
        let spec = self.spec;

        info!(
            "Supervising companion '{}' ({})",
            spec.name,
            spec.program.display()
        );

        std::thread::Builder::new()
            .name("companion-supervisor".to_string())
            .spawn(move || runtime.block_on(supervise(spec, thread_shared)))?;

        let handle = SupervisorHandle { shared };
        if !handle.wait_until(FIRST_SPAWN_TIMEOUT, |s| s.attempts() > 0) {
            warn!("Companion spawn not attempted within {:?}", FIRST_SPAWN_TIMEOUT);
        }
        Ok(handle)
    }
}

/// Spawn, wait, respawn. Never returns.
///
/// A companion that cannot be spawned at all is retried immediately, the
/// same as one that exits right away. This loop has no back-off.
async fn supervise(spec: CompanionSpec, shared: Shared) {
    loop {
        let mut child = match spec.command().spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn companion '{}': {}", spec.name, e);
                update(&shared, |s| {
                    s.spawn_failures += 1;
                    s.current = None;
                });
                tokio::task::yield_now().await;
                continue;
            }
        };

        let Some(pid) = child.id() else {
            // Already reaped; nothing to wait for.
            update(&shared, |s| s.spawns += 1);
            continue;
        };

        info!("{} started with PID {}", spec.name, pid);
        update(&shared, |s| {
            s.spawns += 1;
            s.current = Some(SupervisedProcess {
                pid,
                state: ProcessState::Running,
                started_at: Instant::now(),
                exit_status: None,
            });
        });

        let status = child.wait().await;
        match &status {
            Ok(status) => error!("{} process (PID {}) exited: {}", spec.name, pid, status),
            Err(e) => error!("Waiting for {} (PID {}) failed: {}", spec.name, pid, e),
        }

        update(&shared, |s| {
            if let Some(process) = s.current.as_mut().filter(|p| p.pid == pid) {
                process.state = ProcessState::Exited;
                process.exit_status = status.ok();
            }
        });
        debug!("Respawning {}", spec.name);
    }
}

/// Read side of the supervisor state, used from the main thread.
#[derive(Clone)]
pub struct SupervisorHandle {
    shared: Shared,
}

impl SupervisorHandle {
    fn read<T>(&self, f: impl FnOnce(&SupervisorState) -> T) -> T {
        let (lock, _) = &*self.shared;
        match lock.lock() {
            Ok(state) => f(&*state),
            Err(poisoned) => f(&*poisoned.into_inner()),
        }
    }

    fn wait_until(
        &self,
        timeout: Duration,
        mut done: impl FnMut(&SupervisorState) -> bool,
    ) -> bool {
        let (lock, cvar) = &*self.shared;
        let guard = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match cvar.wait_timeout_while(guard, timeout, |s| !done(&*s)) {
            Ok((state, _)) => done(&*state),
            Err(poisoned) => done(&*poisoned.into_inner().0),
        }
    }

    pub fn current(&self) -> Option<SupervisedProcess> {
        self.read(|s| s.current.clone())
    }

    /// Pid of the running instance, if one is running right now.
    pub fn current_pid(&self) -> Option<u32> {
        self.read(SupervisorState::running_pid)
    }

    pub fn spawn_count(&self) -> u64 {
        self.read(|s| s.spawns)
    }

    pub fn spawn_failures(&self) -> u64 {
        self.read(|s| s.spawn_failures)
    }

    /// Wait until an instance other than `previous` is running.
    pub fn wait_for_respawn(&self, previous: Option<u32>, timeout: Duration) -> Option<u32> {
        let mut pid = None;
        self.wait_until(timeout, |s| match s.running_pid() {
            Some(p) if Some(p) != previous => {
                pid = Some(p);
                true
            }
            _ => false,
        });
        pid
    }
}

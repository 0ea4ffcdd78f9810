use std::{
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{
    app_helpers::{lock_recovering, AtomicFlagGuard},
    backend_config::{BackendEndpoint, ProbeTimings},
    backend_process::{self, BackendHandle, SupervisedProcess},
    launch_plan::{self, LaunchContext},
    process_control,
    readiness::{self, ReadinessState},
};

const SPAWN_SETTLE_POLL: Duration = Duration::from_millis(20);
const SPAWN_SETTLE_MARGIN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackendLifecycle {
    #[default]
    NotStarted,
    Starting,
    /// Spawned; health is confirmed separately by the readiness wait.
    Running,
    Exited(Option<i32>),
    Failed(String),
    Stopped,
}

impl BackendLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Exited(_) => "exited",
            Self::Failed(_) => "failed",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Spawned { pid: u32 },
    SkippedAlreadyHealthy,
    RefusedPortConflict,
    /// Development start without `force`; the backend runs out-of-band.
    NotForced,
    FailedToStart(String),
    /// `stop()` ran while this start was in flight; the new child was terminated.
    CancelledByStop { pid: u32 },
    AlreadyInProgress,
    AlreadyRunning { pid: u32 },
}

/// Failures the user has to see. Everything else is only logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStartError {
    PortConflict { host: String, port: u16 },
    SpawnFailed(String),
    LaunchUnavailable(String),
}

impl BackendStartError {
    pub fn title(&self) -> &'static str {
        match self {
            Self::PortConflict { .. } => "Port In Use",
            Self::SpawnFailed(_) | Self::LaunchUnavailable(_) => "Backend Error",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::PortConflict { host, port } => format!(
                "Port {port} on {host} is already in use by another application.\n\n\
Close the program using it and restart Inventory Management System."
            ),
            Self::SpawnFailed(detail) => format!("Failed to start the backend server.\n\n{detail}"),
            Self::LaunchUnavailable(detail) => {
                format!("The backend server cannot be started.\n\n{detail}")
            }
        }
    }
}

impl fmt::Display for BackendStartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    pub lifecycle: &'static str,
    pub pid: Option<u32>,
    pub url: String,
    pub spawn_attempts: u32,
}

/// Sole owner of the backend child process.
pub struct BackendSupervisor {
    endpoint: BackendEndpoint,
    timings: ProbeTimings,
    stop_timeout: Duration,
    backend_log_path: Option<PathBuf>,
    shared: Arc<SupervisedProcess>,
    is_spawning: AtomicBool,
    /// Bumped by every `stop()`; a start that sees it change discards its child.
    stop_generation: AtomicU64,
    spawn_attempts: AtomicU32,
    watcher_stop: Mutex<Option<Arc<AtomicBool>>>,
    log: fn(&str),
}

impl BackendSupervisor {
    pub fn new(
        endpoint: BackendEndpoint,
        timings: ProbeTimings,
        stop_timeout: Duration,
        backend_log_path: Option<PathBuf>,
        log: fn(&str),
    ) -> Self {
        Self {
            endpoint,
            timings,
            stop_timeout,
            backend_log_path,
            shared: Arc::new(SupervisedProcess::default()),
            is_spawning: AtomicBool::new(false),
            stop_generation: AtomicU64::new(0),
            spawn_attempts: AtomicU32::new(0),
            watcher_stop: Mutex::new(None),
            log,
        }
    }

    pub fn endpoint(&self) -> &BackendEndpoint {
        &self.endpoint
    }

    pub fn timings(&self) -> &ProbeTimings {
        &self.timings
    }

    pub fn spawn_attempts(&self) -> u32 {
        self.spawn_attempts.load(Ordering::Relaxed)
    }

    pub fn lifecycle(&self) -> BackendLifecycle {
        lock_recovering(&self.shared.lifecycle, "backend lifecycle", &self.log).clone()
    }

    pub fn status(&self) -> BackendStatus {
        BackendStatus {
            lifecycle: self.lifecycle().as_str(),
            pid: self.running_pid(),
            url: self.endpoint.base_url(),
            spawn_attempts: self.spawn_attempts(),
        }
    }

    fn set_lifecycle(&self, lifecycle: BackendLifecycle) {
        *lock_recovering(&self.shared.lifecycle, "backend lifecycle", &self.log) = lifecycle;
    }

    fn running_pid(&self) -> Option<u32> {
        let mut guard = lock_recovering(&self.shared.handle, "backend handle", &self.log);
        let handle = guard.as_mut()?;
        match handle.child.try_wait() {
            Ok(None) => Some(handle.pid),
            _ => None,
        }
    }

    /// Probe, then decide: skip when our backend already answers, refuse when a
    /// foreign listener holds the port, otherwise launch.
    ///
    /// Never fails; user-facing problems go to `report`, called after the
    /// spawn guard is released.
    pub fn start<R>(&self, force: bool, ctx: &LaunchContext, report: R) -> StartOutcome
    where
        R: Fn(BackendStartError),
    {
        let (outcome, error) = {
            let Some(_spawn_guard) = AtomicFlagGuard::try_set(&self.is_spawning) else {
                (self.log)("backend start already in progress, skip");
                return StartOutcome::AlreadyInProgress;
            };
            self.start_guarded(force, ctx)
        };
        if let Some(error) = error {
            report(error);
        }
        outcome
    }

    fn start_guarded(
        &self,
        force: bool,
        ctx: &LaunchContext,
    ) -> (StartOutcome, Option<BackendStartError>) {
        let log = self.log;
        let generation = self.stop_generation.load(Ordering::Acquire);

        let own_pid = self.running_pid();
        match readiness::probe_readiness(&self.endpoint, &self.timings) {
            ReadinessState::PortOpenHealthy => {
                log(&format!(
                    "backend already healthy at {}, not spawning",
                    self.endpoint.base_url()
                ));
                return (StartOutcome::SkippedAlreadyHealthy, None);
            }
            ReadinessState::Unknown => {
                let error = format!("cannot resolve backend host {}", self.endpoint.host);
                log(&error);
                let report = BackendStartError::LaunchUnavailable(error.clone());
                return (StartOutcome::FailedToStart(error), Some(report));
            }
            ReadinessState::PortOpenForeign => {
                if let Some(pid) = own_pid {
                    log(&format!("backend pid={pid} is still coming up, not spawning"));
                    return (StartOutcome::AlreadyRunning { pid }, None);
                }
                log(&format!(
                    "port {}:{} is held by a process that is not this backend",
                    self.endpoint.host, self.endpoint.port
                ));
                let report = BackendStartError::PortConflict {
                    host: self.endpoint.host.clone(),
                    port: self.endpoint.port,
                };
                return (StartOutcome::RefusedPortConflict, Some(report));
            }
            ReadinessState::PortClosed => {
                if let Some(pid) = own_pid {
                    log(&format!("backend pid={pid} has not bound its port yet, not spawning"));
                    return (StartOutcome::AlreadyRunning { pid }, None);
                }
            }
        }

        self.set_lifecycle(BackendLifecycle::Starting);
        let plan = match launch_plan::resolve_launch_plan(ctx, force, launch_plan::which_lookup) {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                log("development mode without force: backend should be started manually");
                self.set_lifecycle(BackendLifecycle::NotStarted);
                return (StartOutcome::NotForced, None);
            }
            Err(error) => {
                log(&format!("cannot resolve backend launch: {error}"));
                self.set_lifecycle(BackendLifecycle::Failed(error.clone()));
                let report = BackendStartError::LaunchUnavailable(error.clone());
                return (StartOutcome::FailedToStart(error), Some(report));
            }
        };

        self.spawn_attempts.fetch_add(1, Ordering::Relaxed);
        let handle =
            match backend_process::spawn_backend(&plan, self.backend_log_path.as_deref(), log) {
                Ok(handle) => handle,
                Err(error) => {
                    log(&error);
                    self.set_lifecycle(BackendLifecycle::Failed(error.clone()));
                    let report = BackendStartError::SpawnFailed(error.clone());
                    return (StartOutcome::FailedToStart(error), Some(report));
                }
            };

        let outcome = self.adopt_child(handle, generation);
        if let StartOutcome::Spawned { pid } = outcome {
            self.start_exit_watcher(pid, plan.capture_output);
        }
        (outcome, None)
    }

    /// Stores a freshly spawned child unless `stop()` ran since `generation`
    /// was read, in which case the child is terminated instead.
    fn adopt_child(&self, mut handle: BackendHandle, generation: u64) -> StartOutcome {
        let pid = handle.pid;
        {
            let mut guard = lock_recovering(&self.shared.handle, "backend handle", &self.log);
            if self.stop_generation.load(Ordering::Acquire) == generation {
                *guard = Some(handle);
                *lock_recovering(&self.shared.lifecycle, "backend lifecycle", &self.log) =
                    BackendLifecycle::Running;
                return StartOutcome::Spawned { pid };
            }
        }

        (self.log)(&format!(
            "stop requested while backend pid={pid} was starting, terminating it"
        ));
        let outcome =
            process_control::stop_child_gracefully(&mut handle.child, self.stop_timeout, self.log);
        (self.log)(&format!("backend pid={pid} stopped: {outcome:?}"));
        self.set_lifecycle(BackendLifecycle::Stopped);
        StartOutcome::CancelledByStop { pid }
    }

    /// Waits for an in-flight `start` to either store or discard its child.
    fn wait_for_spawn_to_settle(&self) {
        let limit = self.timings.quick_probe
            + self.timings.health_check
            + self.stop_timeout
            + SPAWN_SETTLE_MARGIN;
        let deadline = Instant::now() + limit;
        while self.is_spawning.load(Ordering::Acquire) {
            if Instant::now() >= deadline {
                (self.log)("backend start still in progress after stop wait, giving up");
                return;
            }
            thread::sleep(SPAWN_SETTLE_POLL);
        }
    }

    fn start_exit_watcher(&self, pid: u32, output_captured: bool) {
        self.stop_exit_watcher();
        let stop = Arc::new(AtomicBool::new(false));
        *lock_recovering(&self.watcher_stop, "exit watcher flag", &self.log) = Some(stop.clone());
        backend_process::spawn_exit_watcher(
            self.shared.clone(),
            pid,
            stop,
            self.backend_log_path.clone().filter(|_| output_captured),
            self.log,
        );
    }

    fn stop_exit_watcher(&self) {
        if let Some(flag) = lock_recovering(&self.watcher_stop, "exit watcher flag", &self.log).take()
        {
            flag.store(true, Ordering::Relaxed);
        }
    }

    /// Terminates the child if there is one. Safe to call any number of times.
    ///
    /// A `start` in flight is cancelled: its child is terminated before this
    /// returns.
    pub fn stop(&self) {
        self.stop_generation.fetch_add(1, Ordering::AcqRel);
        self.wait_for_spawn_to_settle();
        self.stop_exit_watcher();
        let Some(mut handle) =
            lock_recovering(&self.shared.handle, "backend handle", &self.log).take()
        else {
            return;
        };

        let outcome =
            process_control::stop_child_gracefully(&mut handle.child, self.stop_timeout, self.log);
        (self.log)(&format!(
            "backend pid={} stopped: {outcome:?} (cwd={}, data_dir={:?})",
            handle.pid,
            handle.cwd.display(),
            handle.data_dir
        ));
        self.set_lifecycle(BackendLifecycle::Stopped);
    }
}

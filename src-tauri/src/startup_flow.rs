use std::{
    sync::Mutex,
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    app_helpers::lock_recovering,
    backend_supervisor::{BackendStartError, BackendSupervisor, StartOutcome},
    launch_plan::LaunchContext,
    readiness::{self, ReadinessState},
    window_state::{ShowMainDecision, ShowMainTrigger, WindowStateMachine},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupResult {
    pub outcome: StartOutcome,
    /// `None` when the readiness wait was skipped.
    pub readiness: Option<ReadinessState>,
}

impl StartupResult {
    /// Main is shown whatever the outcome; failures were already reported.
    pub fn show_main_trigger(&self) -> ShowMainTrigger {
        match self.readiness {
            Some(state) if state.is_ready() => ShowMainTrigger::ReadinessConfirmed,
            _ => ShowMainTrigger::ReadinessUnconfirmed,
        }
    }
}

/// Splash-triggered bring-up: start the backend, then wait for it within the
/// readiness budget. A failed wait is logged and never fatal.
pub fn run_backend_startup<R, L>(
    supervisor: &BackendSupervisor,
    ctx: &LaunchContext,
    report: R,
    log: L,
) -> StartupResult
where
    R: Fn(BackendStartError),
    L: Fn(&str),
{
    let outcome = supervisor.start(true, ctx, report);
    log(&format!("backend start outcome: {outcome:?}"));

    let readiness = match &outcome {
        StartOutcome::SkippedAlreadyHealthy => Some(ReadinessState::PortOpenHealthy),
        StartOutcome::FailedToStart(_)
        | StartOutcome::RefusedPortConflict
        | StartOutcome::CancelledByStop { .. } => None,
        StartOutcome::Spawned { .. }
        | StartOutcome::AlreadyRunning { .. }
        | StartOutcome::AlreadyInProgress
        | StartOutcome::NotForced => {
            let state =
                readiness::wait_for_backend_ready(supervisor.endpoint(), supervisor.timings(), &log);
            if !state.is_ready() {
                log(&format!(
                    "backend readiness not confirmed ({state}), showing main window anyway"
                ));
            }
            Some(state)
        }
    };

    StartupResult { outcome, readiness }
}

pub fn spawn_grace_timer<F>(grace: Duration, on_elapsed: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::spawn(move || {
        thread::sleep(grace);
        on_elapsed();
    })
}

pub fn apply_show_main<L>(
    windows: &Mutex<WindowStateMachine>,
    session: u64,
    trigger: ShowMainTrigger,
    log: L,
) -> ShowMainDecision
where
    L: Fn(&str),
{
    let mut windows = lock_recovering(windows, "window state", &log);
    let decision = windows.request_show_main(session, trigger);
    log(&format!(
        "show main requested: session={session}, trigger={trigger:?}, decision={decision:?}, \
phase={:?}, shown_via={:?}",
        windows.phase(),
        windows.shown_via()
    ));
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend_config::{BackendEndpoint, ProbeTimings},
        health_check::test_support::{CannedServer, FOREIGN_HTML_RESPONSE},
        window_state::WindowPhase,
    };
    use std::{
        env, fs,
        net::TcpListener,
        path::{Path, PathBuf},
        sync::Arc,
        time::{Instant, SystemTime, UNIX_EPOCH},
    };

    const GRACE: Duration = Duration::from_millis(2_500);

    fn quiet(_: &str) {}

    fn temp_case_dir(name: &str) -> PathBuf {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let dir = env::temp_dir().join(format!(
            "ims-desktop-startup-flow-test-{}-{}-{}",
            std::process::id(),
            ts,
            name
        ));
        fs::create_dir_all(&dir).expect("create temp case dir");
        dir
    }

    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        port
    }

    fn supervisor_on(port: u16) -> BackendSupervisor {
        BackendSupervisor::new(
            BackendEndpoint {
                host: "127.0.0.1".into(),
                port,
                health_path: "/health".into(),
            },
            ProbeTimings {
                quick_probe: Duration::from_millis(200),
                health_check: Duration::from_millis(300),
                ready_wait: Duration::from_millis(2_000),
                connect_attempt: Duration::from_millis(200),
                poll_interval: Duration::from_millis(50),
            },
            Duration::from_millis(1_000),
            None,
            quiet,
        )
    }

    fn context(root: &Path, custom_cmd: &str) -> LaunchContext {
        LaunchContext {
            packaged: false,
            resource_dir: None,
            backend_source_dir: None,
            workspace_root: root.to_path_buf(),
            data_dir: Some(root.join("ims-data")),
            custom_cmd: Some(custom_cmd.to_string()),
            host: "127.0.0.1".into(),
            port: 0,
        }
    }

    /// Splash shown and its start signal consumed, as the splash page would.
    fn splash_session() -> (Arc<Mutex<WindowStateMachine>>, u64) {
        let windows = Arc::new(Mutex::new(WindowStateMachine::default()));
        let session = {
            let mut machine = windows.lock().expect("lock windows");
            machine.begin_splash().expect("splash");
            machine.take_start_signal().expect("start signal")
        };
        (windows, session)
    }

    fn arm_grace_timer(windows: &Arc<Mutex<WindowStateMachine>>, session: u64) -> JoinHandle<()> {
        let windows = windows.clone();
        spawn_grace_timer(GRACE, move || {
            apply_show_main(&windows, session, ShowMainTrigger::GracePeriodElapsed, quiet);
        })
    }

    fn finish(windows: &Mutex<WindowStateMachine>, session: u64, result: &StartupResult) {
        apply_show_main(windows, session, result.show_main_trigger(), quiet);
    }

    #[cfg(unix)]
    #[test]
    fn spawned_backend_turning_healthy_shows_main_via_readiness() {
        let root = temp_case_dir("scenario-a");
        let port = closed_port();
        let supervisor = supervisor_on(port);
        let (windows, session) = splash_session();
        let grace = arm_grace_timer(&windows, session);

        let backend_comes_up = thread::spawn(move || {
            thread::sleep(Duration::from_millis(400));
            CannedServer::start_on(port, crate::health_check::test_support::HEALTHY_RESPONSE)
        });
        let started = Instant::now();
        let result = run_backend_startup(&supervisor, &context(&root, "sleep 30"), |_| {
            panic!("no user-facing error expected")
        }, quiet);
        finish(&windows, session, &result);

        assert!(matches!(result.outcome, StartOutcome::Spawned { .. }));
        assert_eq!(result.readiness, Some(ReadinessState::PortOpenHealthy));
        assert!(started.elapsed() < GRACE);
        {
            let machine = windows.lock().expect("lock windows");
            assert_eq!(machine.phase(), WindowPhase::MainShown);
            assert_eq!(machine.shown_via(), Some(ShowMainTrigger::ReadinessConfirmed));
        }

        grace.join().expect("grace timer");
        assert_eq!(
            windows.lock().expect("lock windows").shown_via(),
            Some(ShowMainTrigger::ReadinessConfirmed)
        );

        supervisor.stop();
        drop(backend_comes_up.join().expect("backend thread"));
        fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn spawn_failure_reports_error_then_shows_main_without_waiting_for_grace() {
        let root = temp_case_dir("scenario-b");
        let supervisor = supervisor_on(closed_port());
        let (windows, session) = splash_session();
        let grace = arm_grace_timer(&windows, session);
        let reports = Mutex::new(Vec::new());

        let missing = root.join("ims-backend-missing");
        let started = Instant::now();
        let result = run_backend_startup(
            &supervisor,
            &context(&root, &missing.to_string_lossy()),
            |error| reports.lock().expect("lock reports").push(error),
            quiet,
        );
        assert!(matches!(
            reports.lock().expect("lock reports").as_slice(),
            [BackendStartError::SpawnFailed(_)]
        ));
        assert_eq!(
            windows.lock().expect("lock windows").phase(),
            WindowPhase::SplashShown
        );

        finish(&windows, session, &result);
        assert!(matches!(result.outcome, StartOutcome::FailedToStart(_)));
        assert_eq!(result.readiness, None);
        assert!(started.elapsed() < GRACE);
        {
            let machine = windows.lock().expect("lock windows");
            assert_eq!(machine.phase(), WindowPhase::MainShown);
            assert_eq!(machine.shown_via(), Some(ShowMainTrigger::ReadinessUnconfirmed));
        }

        grace.join().expect("grace timer");
        assert_eq!(
            windows.lock().expect("lock windows").shown_via(),
            Some(ShowMainTrigger::ReadinessUnconfirmed)
        );
        fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn grace_timer_shows_main_when_startup_never_finishes() {
        let (windows, session) = splash_session();
        arm_grace_timer(&windows, session)
            .join()
            .expect("grace timer");

        let machine = windows.lock().expect("lock windows");
        assert_eq!(machine.phase(), WindowPhase::MainShown);
        assert_eq!(machine.shown_via(), Some(ShowMainTrigger::GracePeriodElapsed));
    }

    #[test]
    fn healthy_backend_already_running_shows_main_promptly() {
        let root = temp_case_dir("scenario-c");
        let server = CannedServer::healthy();
        let supervisor = supervisor_on(server.port);
        let (windows, session) = splash_session();

        let started = Instant::now();
        let result = run_backend_startup(&supervisor, &context(&root, "sleep 30"), |_| {
            panic!("no user-facing error expected")
        }, quiet);
        finish(&windows, session, &result);

        assert_eq!(result.outcome, StartOutcome::SkippedAlreadyHealthy);
        assert_eq!(supervisor.spawn_attempts(), 0);
        assert!(started.elapsed() < Duration::from_millis(1_500));
        assert_eq!(
            windows.lock().expect("lock windows").shown_via(),
            Some(ShowMainTrigger::ReadinessConfirmed)
        );
        fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn foreign_listener_is_reported_on_every_attempt_without_spawning() {
        let root = temp_case_dir("scenario-d");
        let foreign = CannedServer::start(FOREIGN_HTML_RESPONSE);
        let supervisor = supervisor_on(foreign.port);
        let reports = Mutex::new(Vec::new());

        for _ in 0..3 {
            let (windows, session) = splash_session();
            let result = run_backend_startup(
                &supervisor,
                &context(&root, "sleep 30"),
                |error| reports.lock().expect("lock reports").push(error),
                quiet,
            );
            assert_eq!(result.outcome, StartOutcome::RefusedPortConflict);
            assert_eq!(result.readiness, None);

            finish(&windows, session, &result);
            assert_eq!(
                windows.lock().expect("lock windows").shown_via(),
                Some(ShowMainTrigger::ReadinessUnconfirmed)
            );
        }

        assert_eq!(supervisor.spawn_attempts(), 0);
        let reports = reports.lock().expect("lock reports");
        assert_eq!(reports.len(), 3);
        assert!(reports
            .iter()
            .all(|error| matches!(error, BackendStartError::PortConflict { .. })));
        fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn unconfirmed_readiness_still_shows_main() {
        let result = StartupResult {
            outcome: StartOutcome::NotForced,
            readiness: Some(ReadinessState::PortClosed),
        };
        assert_eq!(
            result.show_main_trigger(),
            ShowMainTrigger::ReadinessUnconfirmed
        );
    }
}

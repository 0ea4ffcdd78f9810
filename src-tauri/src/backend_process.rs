#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;
use std::{
    env,
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{
    app_helpers::{build_debug_command, lock_recovering},
    backend_supervisor::BackendLifecycle,
    launch_plan::LaunchPlan,
    logging, BACKEND_LOG_MAX_BYTES, DATA_DIR_ENV, LOG_BACKUP_COUNT,
};

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;
#[cfg(target_os = "windows")]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

const EXIT_WATCH_INTERVAL: Duration = Duration::from_millis(200);
const BACKEND_LOG_ROTATION_CHECK_INTERVAL: Duration = Duration::from_secs(20);

/// The spawned child plus what it was launched with.
#[derive(Debug)]
pub struct BackendHandle {
    pub child: Child,
    pub pid: u32,
    pub command: Vec<String>,
    pub cwd: PathBuf,
    pub data_dir: Option<PathBuf>,
}

/// State shared between the supervisor and the exit watcher thread.
#[derive(Debug, Default)]
pub struct SupervisedProcess {
    pub handle: Mutex<Option<BackendHandle>>,
    pub lifecycle: Mutex<BackendLifecycle>,
}

pub fn spawn_backend<F>(
    plan: &LaunchPlan,
    backend_log_path: Option<&Path>,
    log: F,
) -> Result<BackendHandle, String>
where
    F: Fn(&str),
{
    if !plan.cwd.is_dir() {
        return Err(format!(
            "Backend working directory {} does not exist.",
            plan.cwd.display()
        ));
    }
    if let Some(data_dir) = &plan.data_dir {
        fs::create_dir_all(data_dir).map_err(|error| {
            format!(
                "Failed to create backend data directory {}: {}",
                data_dir.display(),
                error
            )
        })?;
    }

    let mut command = Command::new(&plan.cmd);
    command
        .args(&plan.args)
        .current_dir(&plan.cwd)
        .stdin(Stdio::null())
        .env("PYTHONUNBUFFERED", "1")
        .env(
            "PYTHONUTF8",
            env::var("PYTHONUTF8").unwrap_or_else(|_| "1".to_string()),
        )
        .env(
            "PYTHONIOENCODING",
            env::var("PYTHONIOENCODING").unwrap_or_else(|_| "utf-8".to_string()),
        );
    if let Some(data_dir) = &plan.data_dir {
        command.env(DATA_DIR_ENV, data_dir);
    }
    #[cfg(target_os = "windows")]
    if plan.packaged_mode {
        command.creation_flags(CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP);
    }

    if plan.capture_output {
        match backend_log_path {
            Some(log_path) => {
                let (stdout, stderr) = open_backend_log(log_path)?;
                command.stdout(stdout).stderr(stderr);
            }
            None => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }
    }

    let debug_command = build_debug_command(plan);
    let child = command.spawn().map_err(|error| {
        format!("Failed to spawn backend process {debug_command:?}: {error}")
    })?;
    let pid = child.id();
    log(&format!(
        "spawned backend: pid={pid}, strategy={:?}, cmd={debug_command:?}, cwd={}",
        plan.strategy,
        plan.cwd.display()
    ));

    Ok(BackendHandle {
        child,
        pid,
        command: debug_command,
        cwd: plan.cwd.clone(),
        data_dir: plan.data_dir.clone(),
    })
}

fn open_backend_log(log_path: &Path) -> Result<(Stdio, Stdio), String> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).map_err(|error| {
            format!(
                "Failed to create backend log directory {}: {}",
                parent.display(),
                error
            )
        })?;
    }
    logging::rotate_log_if_needed(
        log_path,
        BACKEND_LOG_MAX_BYTES,
        LOG_BACKUP_COUNT,
        "backend",
        false,
    );

    let stdout = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|error| {
            format!(
                "Failed to open backend log {}: {}",
                log_path.display(),
                error
            )
        })?;
    let stderr = stdout
        .try_clone()
        .map_err(|error| format!("Failed to clone backend log handle: {error}"))?;
    Ok((Stdio::from(stdout), Stdio::from(stderr)))
}

/// Polls the child until it exits, `stop` is raised, or the handle is replaced.
///
/// On exit the status is logged, the lifecycle becomes `Exited` and the
/// handle is released so a later start can spawn again. While the child is
/// alive its captured log is rotated with copy-and-truncate.
pub fn spawn_exit_watcher<F>(
    shared: Arc<SupervisedProcess>,
    pid: u32,
    stop: Arc<AtomicBool>,
    backend_log_path: Option<PathBuf>,
    log: F,
) where
    F: Fn(&str) + Send + 'static,
{
    thread::spawn(move || {
        let log_scope = format!("backend(pid={pid})");
        let mut last_rotation_check = Instant::now();
        loop {
            thread::sleep(EXIT_WATCH_INTERVAL);
            if stop.load(Ordering::Relaxed) {
                break;
            }

            {
                let mut guard = lock_recovering(&shared.handle, "backend handle", &log);
                let Some(handle) = guard.as_mut() else {
                    break;
                };
                if handle.pid != pid {
                    break;
                }
                match handle.child.try_wait() {
                    Ok(None) => {}
                    Ok(Some(status)) => {
                        log(&format!(
                            "backend process exited: pid={pid}, status={status}, cmd={:?}",
                            handle.command
                        ));
                        *lock_recovering(&shared.lifecycle, "backend lifecycle", &log) =
                            BackendLifecycle::Exited(status.code());
                        *guard = None;
                        break;
                    }
                    Err(error) => {
                        log(&format!(
                            "failed to poll backend process pid={pid}: {error}"
                        ));
                        break;
                    }
                }
            }

            if let Some(log_path) = backend_log_path.as_deref() {
                if last_rotation_check.elapsed() >= BACKEND_LOG_ROTATION_CHECK_INTERVAL {
                    last_rotation_check = Instant::now();
                    logging::rotate_log_if_needed(
                        log_path,
                        BACKEND_LOG_MAX_BYTES,
                        LOG_BACKUP_COUNT,
                        &log_scope,
                        true,
                    );
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch_plan::LaunchStrategy;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_case_dir(name: &str) -> PathBuf {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let dir = env::temp_dir().join(format!(
            "ims-desktop-backend-process-test-{}-{}-{}",
            std::process::id(),
            ts,
            name
        ));
        fs::create_dir_all(&dir).expect("create temp case dir");
        dir
    }

    fn plan(cmd: &str, args: &[&str], cwd: PathBuf) -> LaunchPlan {
        LaunchPlan {
            cmd: cmd.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            cwd,
            data_dir: None,
            capture_output: true,
            strategy: LaunchStrategy::Custom,
            packaged_mode: false,
        }
    }

    #[test]
    fn missing_working_directory_is_a_spawn_error() {
        let root = temp_case_dir("nocwd");
        let error = spawn_backend(&plan("python", &[], root.join("missing")), None, |_| {})
            .expect_err("cwd does not exist");
        assert!(error.contains("does not exist"));
        fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn missing_executable_is_a_spawn_error() {
        let root = temp_case_dir("noexe");
        let error = spawn_backend(
            &plan(&root.join("ims-backend-missing").to_string_lossy(), &[], root.clone()),
            None,
            |_| {},
        )
        .expect_err("executable does not exist");
        assert!(error.contains("Failed to spawn backend process"));
        fs::remove_dir_all(&root).expect("cleanup");
    }

    #[cfg(unix)]
    #[test]
    fn captured_output_and_data_dir_reach_the_child() {
        let root = temp_case_dir("capture");
        let log_path = root.join("logs").join("backend.log");
        let mut launch = plan("sh", &["-c", "echo \"data=$IMS_DATA_DIR\""], root.clone());
        launch.data_dir = Some(root.join("ims-data"));

        let mut handle = spawn_backend(&launch, Some(&log_path), |_| {}).expect("spawn sh");
        handle.child.wait().expect("wait for sh");

        let captured = fs::read_to_string(&log_path).expect("read backend log");
        assert!(captured.contains(&format!("data={}", root.join("ims-data").display())));
        assert!(root.join("ims-data").is_dir());
        fs::remove_dir_all(&root).expect("cleanup");
    }

    #[cfg(unix)]
    #[test]
    fn exit_watcher_records_exit_code_and_releases_handle() {
        let root = temp_case_dir("watcher");
        let handle =
            spawn_backend(&plan("sh", &["-c", "exit 3"], root.clone()), None, |_| {}).expect("spawn");
        let pid = handle.pid;
        let shared = Arc::new(SupervisedProcess::default());
        *shared.handle.lock().expect("lock handle") = Some(handle);

        spawn_exit_watcher(
            shared.clone(),
            pid,
            Arc::new(AtomicBool::new(false)),
            None,
            |_| {},
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        while shared.handle.lock().expect("lock handle").is_some() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        assert!(shared.handle.lock().expect("lock handle").is_none());
        assert_eq!(
            *shared.lifecycle.lock().expect("lock lifecycle"),
            BackendLifecycle::Exited(Some(3))
        );
        fs::remove_dir_all(&root).expect("cleanup");
    }
}

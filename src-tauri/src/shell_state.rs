use std::sync::{Mutex, MutexGuard};

use tauri::AppHandle;

use crate::{
    app_helpers::lock_recovering,
    append_desktop_log,
    backend_config::ShellSettings,
    backend_supervisor::BackendSupervisor,
    exit_state::ExitStateMachine,
    launch_plan::LaunchContext,
    logging, runtime_paths,
    window_state::WindowStateMachine,
    BACKEND_LOG_FILE,
};

/// Everything the shell owns for one application run.
pub struct ShellState {
    pub settings: ShellSettings,
    pub supervisor: BackendSupervisor,
    windows: Mutex<WindowStateMachine>,
    exit_state: Mutex<ExitStateMachine>,
    packaged: bool,
}

impl ShellState {
    pub fn new(settings: ShellSettings, packaged: bool) -> Self {
        let log_dir = logging::resolve_log_dir(runtime_paths::default_data_root());
        let supervisor = BackendSupervisor::new(
            settings.endpoint.clone(),
            settings.timings,
            settings.stop_timeout,
            Some(log_dir.join(BACKEND_LOG_FILE)),
            append_desktop_log,
        );
        Self {
            settings,
            supervisor,
            windows: Mutex::new(WindowStateMachine::default()),
            exit_state: Mutex::new(ExitStateMachine::default()),
            packaged,
        }
    }

    pub fn is_packaged(&self) -> bool {
        self.packaged
    }

    pub fn windows_mutex(&self) -> &Mutex<WindowStateMachine> {
        &self.windows
    }

    pub fn windows(&self) -> MutexGuard<'_, WindowStateMachine> {
        lock_recovering(&self.windows, "window state", &append_desktop_log)
    }

    pub fn exit_state(&self) -> MutexGuard<'_, ExitStateMachine> {
        lock_recovering(&self.exit_state, "exit state", &append_desktop_log)
    }

    pub fn launch_context(&self, app: &AppHandle) -> LaunchContext {
        let data_dir = runtime_paths::resolve_backend_data_dir(app);
        LaunchContext {
            packaged: self.packaged,
            resource_dir: runtime_paths::resolve_resource_dir(app),
            backend_source_dir: runtime_paths::detect_backend_source_dir(
                self.settings.backend_dir.as_deref(),
            ),
            workspace_root: runtime_paths::workspace_root_dir(),
            data_dir,
            custom_cmd: self.settings.custom_backend_cmd.clone(),
            host: self.settings.endpoint.host.clone(),
            port: self.settings.endpoint.port,
        }
    }
}

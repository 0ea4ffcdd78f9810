use tauri::{AppHandle, Manager};

use crate::{
    append_desktop_log, append_startup_log, backend_supervisor::BackendStatus,
    shell_state::ShellState, splash_window, startup_task,
};

/// Invoked by the splash page once it is ready to display progress.
///
/// Only the first call per splash session starts the backend; later calls
/// return `false`.
#[tauri::command]
pub(crate) fn splash_start(app_handle: AppHandle) -> bool {
    let session = app_handle.state::<ShellState>().windows().take_start_signal();
    let Some(session) = session else {
        append_startup_log("splash start signal ignored: already started");
        return false;
    };

    append_startup_log(&format!("splash start signal received: session={session}"));
    splash_window::send_app_version(&app_handle, append_desktop_log);
    startup_task::spawn_startup_task(app_handle, session, append_startup_log);
    true
}

#[tauri::command]
pub(crate) fn get_backend_status(app_handle: AppHandle) -> BackendStatus {
    app_handle.state::<ShellState>().supervisor.status()
}

/// Version label for the splash footer.
#[tauri::command]
pub(crate) fn get_app_version(app_handle: AppHandle) -> String {
    splash_window::app_version_label(&app_handle)
}

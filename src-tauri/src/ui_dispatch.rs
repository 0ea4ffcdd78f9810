use tauri::{AppHandle, Emitter, Manager};
use tauri_plugin_dialog::{DialogExt, MessageDialogKind};

use crate::{backend_supervisor::BackendStartError, BACKEND_ERROR_EVENT, SPLASH_WINDOW_LABEL};

pub fn run_on_main_thread_dispatch<F>(
    app_handle: &AppHandle,
    task_name: &str,
    task: F,
) -> Result<(), String>
where
    F: FnOnce(&AppHandle) + Send + 'static,
{
    let app_handle_for_thread = app_handle.clone();
    app_handle
        .run_on_main_thread(move || {
            task(&app_handle_for_thread);
        })
        .map_err(|error| format!("Failed to dispatch '{task_name}' on main thread: {error}"))
}

/// Relays a startup failure to the splash page, then blocks the calling
/// worker on an error dialog until the user acknowledges it.
///
/// Must not run on the main thread.
pub fn report_backend_error<F>(app_handle: &AppHandle, error: &BackendStartError, log: F)
where
    F: Fn(&str),
{
    let message = error.user_message();
    log(&format!("backend startup error: {message}"));

    if app_handle.get_webview_window(SPLASH_WINDOW_LABEL).is_some() {
        if let Err(emit_error) =
            app_handle.emit_to(SPLASH_WINDOW_LABEL, BACKEND_ERROR_EVENT, message.clone())
        {
            log(&format!("failed to relay backend error to splash: {emit_error}"));
        }
    }

    app_handle
        .dialog()
        .message(message)
        .title(error.title())
        .kind(MessageDialogKind::Error)
        .blocking_show();
}

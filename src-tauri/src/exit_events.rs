use tauri::{AppHandle, Manager};

use crate::{append_shutdown_log, shell_state::ShellState, splash_window};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitRequestedDecision {
    AllowImmediateExit,
    StopBackendThenExit,
    StopBackendAndStayAlive,
}

/// `code` is `None` when the request comes from the last window closing.
fn decide_exit_requested_flow(
    has_exit_request_allowance: bool,
    code: Option<i32>,
    keep_alive_without_windows: bool,
) -> ExitRequestedDecision {
    if has_exit_request_allowance {
        return ExitRequestedDecision::AllowImmediateExit;
    }
    if code.is_none() && keep_alive_without_windows {
        ExitRequestedDecision::StopBackendAndStayAlive
    } else {
        ExitRequestedDecision::StopBackendThenExit
    }
}

pub fn handle_exit_requested(app_handle: &AppHandle, code: Option<i32>, api: &tauri::ExitRequestApi) {
    let state = app_handle.state::<ShellState>();
    let has_allowance = state.exit_state().take_exit_request_allowance();
    let decision =
        decide_exit_requested_flow(has_allowance, code, cfg!(target_os = "macos"));

    match decision {
        ExitRequestedDecision::AllowImmediateExit => {
            append_shutdown_log("exit request allowed to pass through after backend cleanup");
        }
        ExitRequestedDecision::StopBackendThenExit => {
            api.prevent_exit();
            if !state.exit_state().try_begin_cleanup() {
                append_shutdown_log("exit requested while backend cleanup is already running");
                return;
            }
            state.windows().mark_all_closed();

            append_shutdown_log(&format!(
                "exit requested (code={code:?}), stopping backend asynchronously"
            ));
            let app_handle_cloned = app_handle.clone();
            tauri::async_runtime::spawn_blocking(move || {
                let state = app_handle_cloned.state::<ShellState>();
                state.supervisor.stop();
                append_shutdown_log("backend stop finished, exiting desktop process");
                state.exit_state().allow_next_exit_request();
                app_handle_cloned.exit(0);
            });
        }
        ExitRequestedDecision::StopBackendAndStayAlive => {
            api.prevent_exit();
            state.windows().mark_all_closed();
            if !state.exit_state().try_begin_background_cleanup() {
                append_shutdown_log("all windows closed while backend cleanup is already running");
                return;
            }

            append_shutdown_log("all windows closed, stopping backend and staying alive");
            let app_handle_cloned = app_handle.clone();
            tauri::async_runtime::spawn_blocking(move || {
                let state = app_handle_cloned.state::<ShellState>();
                state.supervisor.stop();
                state.exit_state().finish_background_cleanup();
                append_shutdown_log("backend stopped, app idle without windows");
            });
        }
    }
}

/// Last-chance stop when the event loop exits without a prevented request.
pub fn handle_exit_event(app_handle: &AppHandle) {
    let state = app_handle.state::<ShellState>();
    if !state.exit_state().try_begin_cleanup() {
        return;
    }

    append_shutdown_log("exit event triggered fallback backend cleanup");
    state.supervisor.stop();
}

/// Dock reopen with nothing on screen starts over from the splash.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub fn handle_reopen(app_handle: &AppHandle, has_visible_windows: bool) {
    if has_visible_windows {
        return;
    }
    let state = app_handle.state::<ShellState>();
    if state.exit_state().is_exiting() {
        return;
    }
    append_shutdown_log("app reopened without windows, showing splash");
    splash_window::show_splash(app_handle, append_shutdown_log);
}

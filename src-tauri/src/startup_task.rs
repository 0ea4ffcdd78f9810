use tauri::{AppHandle, Manager};

use crate::{
    main_window, shell_state::ShellState, startup_flow, ui_dispatch,
    window_state::ShowMainTrigger,
};

/// Runs the splash-triggered bring-up for `session` off the main thread.
///
/// The grace timer is armed first, so the main window appears even if the
/// backend worker hangs or fails.
pub fn spawn_startup_task<F>(app_handle: AppHandle, session: u64, log: F)
where
    F: Fn(&str) + Copy + Send + Sync + 'static,
{
    let grace = app_handle.state::<ShellState>().settings.startup_grace;
    let grace_handle = app_handle.clone();
    startup_flow::spawn_grace_timer(grace, move || {
        main_window::request_show_main(
            &grace_handle,
            session,
            ShowMainTrigger::GracePeriodElapsed,
            log,
        );
    });

    tauri::async_runtime::spawn(async move {
        let worker_handle = app_handle.clone();
        let startup_result = tauri::async_runtime::spawn_blocking(move || {
            let state = worker_handle.state::<ShellState>();
            let ctx = state.launch_context(&worker_handle);
            startup_flow::run_backend_startup(
                &state.supervisor,
                &ctx,
                |error| ui_dispatch::report_backend_error(&worker_handle, &error, log),
                log,
            )
        })
        .await;

        match startup_result {
            Ok(result) => {
                main_window::request_show_main(
                    &app_handle,
                    session,
                    result.show_main_trigger(),
                    log,
                );
            }
            Err(error) => log(&format!(
                "backend startup task failed: {error}; waiting for the grace timer"
            )),
        }
    });
}

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app_helpers;
mod backend_config;
mod backend_process;
mod backend_supervisor;
mod desktop_commands;
mod exit_events;
mod exit_state;
mod health_check;
mod http_response;
mod instance_lock;
mod launch_plan;
mod logging;
mod main_window;
mod port_probe;
mod process_control;
mod readiness;
mod runtime_paths;
mod shell_menu;
mod shell_state;
mod splash_window;
mod startup_flow;
mod startup_task;
mod ui_dispatch;
mod window_state;

use tauri::{webview::PageLoadEvent, window::Color, Manager, RunEvent, WindowEvent};

use app_helpers::{append_desktop_log, append_shutdown_log, append_startup_log};
use backend_config::ShellSettings;
use desktop_commands::{get_app_version, get_backend_status, splash_start};
use shell_state::ShellState;

const DEFAULT_BACKEND_HOST: &str = "127.0.0.1";
const DEFAULT_BACKEND_PORT: u16 = 8000;
const DEFAULT_HEALTH_PATH: &str = "/health";
const HEALTHY_STATUS: &str = "healthy";
const DEFAULT_DEV_SERVER_URL: &str = "http://localhost:3000";
const DATA_DIR_ENV: &str = "IMS_DATA_DIR";
const BACKEND_DATA_SUBDIR: &str = "ims-data";
const INSTANCE_LOCK_FILE: &str = "ims-desktop.lock";
#[cfg(target_os = "windows")]
const BACKEND_EXECUTABLE_NAME: &str = "ims-backend.exe";
#[cfg(not(target_os = "windows"))]
const BACKEND_EXECUTABLE_NAME: &str = "ims-backend";

const DESKTOP_LOG_FILE: &str = "desktop.log";
const BACKEND_LOG_FILE: &str = "backend.log";
const DESKTOP_LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
const BACKEND_LOG_MAX_BYTES: u64 = 20 * 1024 * 1024;
const LOG_BACKUP_COUNT: usize = 5;

const SPLASH_WINDOW_LABEL: &str = "splash";
const MAIN_WINDOW_LABEL: &str = "main";
const APP_VERSION_EVENT: &str = "app-version";
const BACKEND_ERROR_EVENT: &str = "backend-error";
const WINDOW_BACKGROUND: Color = Color(0x11, 0x18, 0x27, 0xff);

fn main() {
    append_startup_log("desktop process starting");
    append_startup_log(&format!(
        "desktop log path: {}",
        app_helpers::desktop_log_path().display()
    ));
    let settings = ShellSettings::from_env(|message| append_startup_log(&message));
    let packaged = !tauri::is_dev();
    append_startup_log(&format!(
        "backend endpoint: {} (packaged={packaged})",
        settings.endpoint.base_url()
    ));

    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .manage(ShellState::new(settings, packaged))
        .invoke_handler(tauri::generate_handler![
            splash_start,
            get_backend_status,
            get_app_version
        ])
        .menu(|handle| shell_menu::build_menu(handle))
        .on_menu_event(|app_handle, event| {
            shell_menu::handle_menu_event(app_handle, event.id().0.as_str(), append_desktop_log);
        })
        .on_window_event(|window, event| {
            if window.label() != MAIN_WINDOW_LABEL {
                return;
            }

            if let WindowEvent::CloseRequested { api, .. } = event {
                let app_handle = window.app_handle();
                if app_handle.state::<ShellState>().exit_state().is_exiting() {
                    return;
                }
                let Some(main) = app_handle.get_webview_window(MAIN_WINDOW_LABEL) else {
                    return;
                };

                api.prevent_close();
                main_window::confirm_close(&main, append_desktop_log);
            }
        })
        .on_page_load(|webview, payload| match payload.event() {
            PageLoadEvent::Started => {
                append_desktop_log(&format!("page-load started: {}", payload.url()));
            }
            PageLoadEvent::Finished => {
                append_desktop_log(&format!("page-load finished: {}", payload.url()));
                match webview.label() {
                    SPLASH_WINDOW_LABEL => {
                        splash_window::send_app_version(webview.app_handle(), append_desktop_log)
                    }
                    MAIN_WINDOW_LABEL => {
                        main_window::reveal_main_window(webview.app_handle(), append_desktop_log)
                    }
                    _ => {}
                }
            }
        })
        .setup(|app| {
            let app_handle = app.handle().clone();

            match runtime_paths::resolve_backend_data_dir(&app_handle) {
                Some(data_dir) => match instance_lock::acquire(&data_dir) {
                    Ok(lock) => {
                        app.manage(lock);
                    }
                    Err(instance_lock::InstanceLockError::AlreadyHeld) => {
                        append_startup_log("another desktop instance is running, exiting");
                        app_handle.exit(0);
                        return Ok(());
                    }
                    Err(error) => {
                        append_startup_log(&format!("{error}; continuing without instance lock"))
                    }
                },
                None => append_startup_log("no data dir for instance lock; continuing without it"),
            }

            let signal_handle = app_handle.clone();
            if let Err(error) = ctrlc::set_handler(move || {
                append_shutdown_log("termination signal received");
                signal_handle.exit(0);
            }) {
                append_startup_log(&format!("failed to install termination handler: {error}"));
            }

            splash_window::show_splash(&app_handle, append_startup_log);
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| match event {
            RunEvent::ExitRequested { code, api, .. } => {
                exit_events::handle_exit_requested(app_handle, code, &api);
            }
            RunEvent::Exit => {
                exit_events::handle_exit_event(app_handle);
            }
            #[cfg(target_os = "macos")]
            RunEvent::Reopen {
                has_visible_windows,
                ..
            } => {
                exit_events::handle_reopen(app_handle, has_visible_windows);
            }
            _ => {}
        });
}

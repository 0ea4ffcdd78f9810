use tauri::{AppHandle, Emitter, Manager, WebviewUrl, WebviewWindowBuilder};

use crate::{shell_state::ShellState, APP_VERSION_EVENT, SPLASH_WINDOW_LABEL, WINDOW_BACKGROUND};

const SPLASH_PAGE: &str = "splash.html";

/// Opens the splash window unless a splash or main window is already live.
///
/// Main-thread only.
pub fn show_splash<F>(app_handle: &AppHandle, log: F)
where
    F: Fn(&str),
{
    let state = app_handle.state::<ShellState>();
    let Some(session) = state.windows().begin_splash() else {
        log("splash not shown: a window is already open");
        return;
    };

    let built = WebviewWindowBuilder::new(
        app_handle,
        SPLASH_WINDOW_LABEL,
        WebviewUrl::App(SPLASH_PAGE.into()),
    )
    .title("Inventory Management System")
    .inner_size(600.0, 380.0)
    .resizable(false)
    .decorations(false)
    .always_on_top(true)
    .center()
    .background_color(WINDOW_BACKGROUND)
    .build();

    match built {
        Ok(_) => log(&format!("splash window shown: session={session}")),
        Err(error) => {
            log(&format!("failed to create splash window: {error}"));
            state.windows().mark_all_closed();
        }
    }
}

pub fn version_label(version: &str) -> String {
    format!("Version {version}")
}

pub fn app_version_label(app_handle: &AppHandle) -> String {
    version_label(&app_handle.package_info().version.to_string())
}

/// Pushes the version label to the splash.
///
/// The page also pulls it with `get_app_version`, since an event emitted
/// before its listener registers is dropped.
pub fn send_app_version<F>(app_handle: &AppHandle, log: F)
where
    F: Fn(&str),
{
    let label = app_version_label(app_handle);
    if let Err(error) = app_handle.emit_to(SPLASH_WINDOW_LABEL, APP_VERSION_EVENT, label) {
        log(&format!("failed to send app version to splash: {error}"));
    }
}

pub fn close_splash<F>(app_handle: &AppHandle, log: F)
where
    F: Fn(&str),
{
    if let Some(splash) = app_handle.get_webview_window(SPLASH_WINDOW_LABEL) {
        if let Err(error) = splash.close() {
            log(&format!("failed to close splash window: {error}"));
        }
    }
}

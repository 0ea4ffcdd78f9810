use std::{thread, time::Duration};

use tauri::{AppHandle, Manager, WebviewUrl, WebviewWindow, WebviewWindowBuilder};
use tauri_plugin_dialog::{DialogExt, MessageDialogButtons, MessageDialogKind};
use url::Url;

use crate::{
    port_probe, shell_state::ShellState, splash_window, startup_flow, ui_dispatch,
    window_state::{ShowMainDecision, ShowMainTrigger},
    MAIN_WINDOW_LABEL, SPLASH_WINDOW_LABEL, WINDOW_BACKGROUND,
};

const BUNDLED_INDEX: &str = "index.html";
/// Reveal the main window even if its page never reports a finished load.
const REVEAL_FALLBACK: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererSource {
    DevServer(Url),
    Bundle,
}

/// Dev server only in development, when not disabled, and when it answers.
pub fn choose_renderer_source<P>(
    packaged: bool,
    use_dev_server: bool,
    dev_server_url: &str,
    is_reachable: P,
) -> RendererSource
where
    P: FnOnce(&Url) -> bool,
{
    if packaged || !use_dev_server {
        return RendererSource::Bundle;
    }
    match Url::parse(dev_server_url) {
        Ok(url) if is_reachable(&url) => RendererSource::DevServer(url),
        _ => RendererSource::Bundle,
    }
}

fn dev_server_answers(url: &Url, timeout: Duration) -> bool {
    let (Some(host), Some(port)) = (port_probe::socket_host(url), url.port_or_known_default())
    else {
        return false;
    };
    port_probe::is_port_open(&host, port, timeout)
}

/// Thread-safe entry point: records the request and, when a window has to be
/// created or focused, hops to the main thread.
pub fn request_show_main<F>(app_handle: &AppHandle, session: u64, trigger: ShowMainTrigger, log: F)
where
    F: Fn(&str) + Copy + Send + 'static,
{
    let state = app_handle.state::<ShellState>();
    let decision = startup_flow::apply_show_main(state.windows_mutex(), session, trigger, log);
    if decision == ShowMainDecision::Ignore {
        return;
    }

    if let Err(error) =
        ui_dispatch::run_on_main_thread_dispatch(app_handle, "show main window", move |main_app| {
            apply_decision(main_app, decision, log)
        })
    {
        log(&error);
    }
}

fn apply_decision<F>(app_handle: &AppHandle, decision: ShowMainDecision, log: F)
where
    F: Fn(&str) + Copy + Send + 'static,
{
    match decision {
        ShowMainDecision::Ignore => {}
        ShowMainDecision::FocusExisting => match app_handle.get_webview_window(MAIN_WINDOW_LABEL) {
            Some(window) => focus_window(&window, log),
            None => log("focus requested but main window is gone"),
        },
        ShowMainDecision::Create { close_splash } => {
            if let Some(window) = app_handle.get_webview_window(MAIN_WINDOW_LABEL) {
                focus_window(&window, log);
                if close_splash {
                    splash_window::close_splash(app_handle, log);
                }
                return;
            }
            if let Err(error) = create_main_window(app_handle, log) {
                log(&error);
                let splash_open = app_handle
                    .get_webview_window(SPLASH_WINDOW_LABEL)
                    .is_some();
                app_handle
                    .state::<ShellState>()
                    .windows()
                    .main_creation_failed(splash_open);
            }
        }
    }
}

fn create_main_window<F>(app_handle: &AppHandle, log: F) -> Result<(), String>
where
    F: Fn(&str) + Copy + Send + 'static,
{
    let state = app_handle.state::<ShellState>();
    let settings = &state.settings;
    let source = choose_renderer_source(
        state.is_packaged(),
        settings.use_dev_server,
        &settings.dev_server_url,
        |url| dev_server_answers(url, settings.timings.quick_probe),
    );
    log(&format!("main window renderer source: {source:?}"));

    let webview_url = match source {
        RendererSource::DevServer(url) => WebviewUrl::External(url),
        RendererSource::Bundle => WebviewUrl::App(BUNDLED_INDEX.into()),
    };

    WebviewWindowBuilder::new(app_handle, MAIN_WINDOW_LABEL, webview_url)
        .title("Inventory Management System")
        .inner_size(1400.0, 900.0)
        .min_inner_size(1200.0, 800.0)
        .visible(false)
        .background_color(WINDOW_BACKGROUND)
        .build()
        .map_err(|error| format!("Failed to create main window: {error}"))?;

    let fallback_handle = app_handle.clone();
    thread::spawn(move || {
        thread::sleep(REVEAL_FALLBACK);
        if let Err(error) = ui_dispatch::run_on_main_thread_dispatch(
            &fallback_handle,
            "reveal main window",
            move |main_app| reveal_main_window(main_app, log),
        ) {
            log(&error);
        }
    });
    Ok(())
}

/// Shows the main window and retires the splash. Repeat calls are harmless.
pub fn reveal_main_window<F>(app_handle: &AppHandle, log: F)
where
    F: Fn(&str) + Copy,
{
    let Some(window) = app_handle.get_webview_window(MAIN_WINDOW_LABEL) else {
        return;
    };
    if !window.is_visible().unwrap_or(false) {
        focus_window(&window, log);
    }
    splash_window::close_splash(app_handle, log);
}

fn focus_window<F>(window: &WebviewWindow, log: F)
where
    F: Fn(&str),
{
    if let Err(error) = window.unminimize() {
        log(&format!("failed to unminimize main window: {error}"));
    }
    if let Err(error) = window.show() {
        log(&format!("failed to show main window: {error}"));
    }
    if let Err(error) = window.set_focus() {
        log(&format!("failed to focus main window: {error}"));
    }
}

/// Close interception: asks before letting the main window go.
pub fn confirm_close<F>(window: &WebviewWindow, log: F)
where
    F: Fn(&str) + Send + 'static,
{
    let window_for_answer = window.clone();
    window
        .app_handle()
        .dialog()
        .message("Do you want to Exit?")
        .title("Confirm")
        .kind(MessageDialogKind::Warning)
        .buttons(MessageDialogButtons::YesNo)
        .parent(window)
        .show(move |confirmed| {
            if !confirmed {
                return;
            }
            log("main window close confirmed");
            if let Err(error) = window_for_answer.destroy() {
                log(&format!("failed to close main window: {error}"));
            }
        });
}

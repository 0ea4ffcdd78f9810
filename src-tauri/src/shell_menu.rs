use tauri::{
    menu::{Menu, MenuBuilder, MenuItemBuilder, SubmenuBuilder},
    AppHandle, Emitter, Manager, Runtime,
};
use tauri_plugin_dialog::{DialogExt, MessageDialogKind};

use crate::MAIN_WINDOW_LABEL;

const NEW_PRODUCT_ID: &str = "file.new-product";
const GENERATE_REPORT_ID: &str = "file.generate-report";
const SETTINGS_ID: &str = "file.settings";
const QUIT_ID: &str = "file.quit";
const RELOAD_ID: &str = "view.reload";
const FORCE_RELOAD_ID: &str = "view.force-reload";
const DEVTOOLS_ID: &str = "view.devtools";
const ABOUT_ID: &str = "help.about";
const NAVIGATE_PREFIX: &str = "view.navigate:";

pub const MENU_NAVIGATE_EVENT: &str = "menu-navigate";
pub const MENU_NEW_PRODUCT_EVENT: &str = "menu-new-product";
pub const MENU_GENERATE_REPORT_EVENT: &str = "menu-generate-report";
pub const MENU_SETTINGS_EVENT: &str = "menu-settings";

struct NavigationItem {
    label: &'static str,
    route: &'static str,
    accelerator: &'static str,
}

const NAVIGATION: [NavigationItem; 5] = [
    NavigationItem {
        label: "Dashboard",
        route: "/",
        accelerator: "CmdOrCtrl+1",
    },
    NavigationItem {
        label: "Products",
        route: "/products",
        accelerator: "CmdOrCtrl+2",
    },
    NavigationItem {
        label: "Categories",
        route: "/categories",
        accelerator: "CmdOrCtrl+3",
    },
    NavigationItem {
        label: "Sales",
        route: "/sales",
        accelerator: "CmdOrCtrl+4",
    },
    NavigationItem {
        label: "Reports",
        route: "/reports",
        accelerator: "CmdOrCtrl+5",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    NewProduct,
    GenerateReport,
    Settings,
    Quit,
    Navigate(&'static str),
    Reload,
    ForceReload,
    ToggleDevtools,
    About,
}

pub fn action_from_menu_id(id: &str) -> Option<MenuAction> {
    if let Some(route) = id.strip_prefix(NAVIGATE_PREFIX) {
        return NAVIGATION
            .iter()
            .find(|item| item.route == route)
            .map(|item| MenuAction::Navigate(item.route));
    }

    match id {
        NEW_PRODUCT_ID => Some(MenuAction::NewProduct),
        GENERATE_REPORT_ID => Some(MenuAction::GenerateReport),
        SETTINGS_ID => Some(MenuAction::Settings),
        QUIT_ID => Some(MenuAction::Quit),
        RELOAD_ID => Some(MenuAction::Reload),
        FORCE_RELOAD_ID => Some(MenuAction::ForceReload),
        DEVTOOLS_ID => Some(MenuAction::ToggleDevtools),
        ABOUT_ID => Some(MenuAction::About),
        _ => None,
    }
}

pub fn build_menu<R: Runtime>(app: &AppHandle<R>) -> tauri::Result<Menu<R>> {
    let file_menu = SubmenuBuilder::new(app, "File")
        .item(
            &MenuItemBuilder::with_id(NEW_PRODUCT_ID, "New Product")
                .accelerator("CmdOrCtrl+N")
                .build(app)?,
        )
        .item(
            &MenuItemBuilder::with_id(GENERATE_REPORT_ID, "Generate Report")
                .accelerator("CmdOrCtrl+R")
                .build(app)?,
        )
        .separator()
        .item(
            &MenuItemBuilder::with_id(SETTINGS_ID, "Settings")
                .accelerator("CmdOrCtrl+,")
                .build(app)?,
        )
        .separator()
        .item(
            &MenuItemBuilder::with_id(QUIT_ID, "Quit")
                .accelerator("CmdOrCtrl+Q")
                .build(app)?,
        )
        .build()?;

    let mut view_menu = SubmenuBuilder::new(app, "View");
    for item in &NAVIGATION {
        view_menu = view_menu.item(
            &MenuItemBuilder::with_id(format!("{NAVIGATE_PREFIX}{}", item.route), item.label)
                .accelerator(item.accelerator)
                .build(app)?,
        );
    }
    view_menu = view_menu
        .separator()
        .item(
            &MenuItemBuilder::with_id(RELOAD_ID, "Reload")
                .accelerator("F5")
                .build(app)?,
        )
        .item(
            &MenuItemBuilder::with_id(FORCE_RELOAD_ID, "Force Reload")
                .accelerator("Shift+F5")
                .build(app)?,
        );
    if cfg!(debug_assertions) {
        view_menu = view_menu.item(
            &MenuItemBuilder::with_id(DEVTOOLS_ID, "Toggle Developer Tools")
                .accelerator("CmdOrCtrl+Shift+I")
                .build(app)?,
        );
    }

    let help_menu = SubmenuBuilder::new(app, "Help")
        .item(&MenuItemBuilder::with_id(ABOUT_ID, "About").build(app)?)
        .build()?;

    MenuBuilder::new(app)
        .item(&file_menu)
        .item(&view_menu.build()?)
        .item(&help_menu)
        .build()
}

pub fn handle_menu_event<F>(app_handle: &AppHandle, menu_id: &str, log: F)
where
    F: Fn(&str),
{
    let Some(action) = action_from_menu_id(menu_id) else {
        return;
    };

    let emit_result = match action {
        MenuAction::NewProduct => app_handle.emit_to(MAIN_WINDOW_LABEL, MENU_NEW_PRODUCT_EVENT, ()),
        MenuAction::GenerateReport => {
            app_handle.emit_to(MAIN_WINDOW_LABEL, MENU_GENERATE_REPORT_EVENT, ())
        }
        MenuAction::Settings => app_handle.emit_to(MAIN_WINDOW_LABEL, MENU_SETTINGS_EVENT, ()),
        MenuAction::Navigate(route) => {
            app_handle.emit_to(MAIN_WINDOW_LABEL, MENU_NAVIGATE_EVENT, route)
        }
        MenuAction::Quit => {
            log("quit requested from menu");
            app_handle.exit(0);
            Ok(())
        }
        MenuAction::Reload => {
            reload_main_window(app_handle, false, &log);
            Ok(())
        }
        MenuAction::ForceReload => {
            reload_main_window(app_handle, true, &log);
            Ok(())
        }
        MenuAction::ToggleDevtools => {
            toggle_devtools(app_handle);
            Ok(())
        }
        MenuAction::About => {
            show_about_dialog(app_handle);
            Ok(())
        }
    };

    if let Err(error) = emit_result {
        log(&format!("failed to deliver menu action {action:?}: {error}"));
    }
}

fn reload_main_window<F>(app_handle: &AppHandle, ignore_cache: bool, log: &F)
where
    F: Fn(&str),
{
    let Some(window) = app_handle.get_webview_window(MAIN_WINDOW_LABEL) else {
        return;
    };
    let result = if ignore_cache {
        window.url().and_then(|url| window.navigate(url))
    } else {
        window.reload()
    };
    if let Err(error) = result {
        log(&format!("failed to reload main window: {error}"));
    }
}

#[cfg(debug_assertions)]
fn toggle_devtools(app_handle: &AppHandle) {
    if let Some(window) = app_handle.get_webview_window(MAIN_WINDOW_LABEL) {
        if window.is_devtools_open() {
            window.close_devtools();
        } else {
            window.open_devtools();
        }
    }
}

#[cfg(not(debug_assertions))]
fn toggle_devtools(_app_handle: &AppHandle) {}

fn show_about_dialog(app_handle: &AppHandle) {
    let version = app_handle.package_info().version.to_string();
    let mut dialog = app_handle
        .dialog()
        .message(format!(
            "Version {version}\nA modern desktop inventory management solution."
        ))
        .title("About Inventory Management System")
        .kind(MessageDialogKind::Info);
    if let Some(window) = app_handle.get_webview_window(MAIN_WINDOW_LABEL) {
        dialog = dialog.parent(&window);
    }
    dialog.show(|_| {});
}

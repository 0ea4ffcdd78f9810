use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard, OnceLock,
    },
};

use crate::{
    launch_plan::LaunchPlan, logging, runtime_paths, DESKTOP_LOG_FILE, DESKTOP_LOG_MAX_BYTES,
    LOG_BACKUP_COUNT,
};

static DESKTOP_LOG_WRITE_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
static DESKTOP_LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

pub(crate) fn desktop_log_path() -> &'static PathBuf {
    DESKTOP_LOG_PATH.get_or_init(|| {
        logging::resolve_desktop_log_path(runtime_paths::default_data_root(), DESKTOP_LOG_FILE)
    })
}

pub(crate) fn build_debug_command(plan: &LaunchPlan) -> Vec<String> {
    let mut parts = vec![plan.cmd.clone()];
    parts.extend(plan.args.clone());
    parts
}

pub(crate) fn append_desktop_log(message: &str) {
    append_desktop_log_with_category(logging::DesktopLogCategory::Runtime, message);
}

pub(crate) fn append_startup_log(message: &str) {
    append_desktop_log_with_category(logging::DesktopLogCategory::Startup, message);
}

pub(crate) fn append_shutdown_log(message: &str) {
    append_desktop_log_with_category(logging::DesktopLogCategory::Shutdown, message);
}

fn append_desktop_log_with_category(category: logging::DesktopLogCategory, message: &str) {
    logging::append_desktop_log(
        category,
        message,
        desktop_log_path(),
        DESKTOP_LOG_MAX_BYTES,
        LOG_BACKUP_COUNT,
        &DESKTOP_LOG_WRITE_LOCK,
    )
}

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock_recovering<'a, T, F>(mutex: &'a Mutex<T>, label: &str, log: &F) -> MutexGuard<'a, T>
where
    F: Fn(&str) + ?Sized,
{
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log(&format!("{label} lock poisoned, recovering"));
            poisoned.into_inner()
        }
    }
}

/// Holds an `AtomicBool` raised for as long as the guard lives.
pub(crate) struct AtomicFlagGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> AtomicFlagGuard<'a> {
    pub(crate) fn try_set(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self { flag })
    }
}

impl Drop for AtomicFlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

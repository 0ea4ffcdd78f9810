use std::{
    env,
    ffi::OsString,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
};

const LOG_DIR_ENV: &str = "IMS_DESKTOP_LOG_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopLogCategory {
    Startup,
    Runtime,
    Shutdown,
}

impl DesktopLogCategory {
    fn as_label(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Runtime => "runtime",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Size-based rotation: `file` -> `file.1` -> ... -> `file.<backup_count>`.
///
/// With `copy_and_truncate` the active file is copied and truncated in place,
/// which keeps a child process that holds the file open writing to it.
pub fn rotate_log_if_needed(
    path: &Path,
    max_bytes: u64,
    backup_count: usize,
    log_scope: &str,
    copy_and_truncate: bool,
) {
    if max_bytes == 0 || backup_count == 0 {
        return;
    }

    match fs::metadata(path) {
        Ok(metadata) if metadata.len() >= max_bytes => {}
        Ok(_) => return,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                eprintln!(
                    "[log rotation:{log_scope}] cannot stat {}: {}",
                    path.display(),
                    error
                );
            }
            return;
        }
    }

    remove_if_present(&rotated_log_path(path, backup_count), log_scope);
    for index in (1..backup_count).rev() {
        let source = rotated_log_path(path, index);
        if !source.exists() {
            continue;
        }
        let target = rotated_log_path(path, index + 1);
        remove_if_present(&target, log_scope);
        if let Err(error) = fs::rename(&source, &target) {
            eprintln!(
                "[log rotation:{log_scope}] cannot shift {} to {}: {}",
                source.display(),
                target.display(),
                error
            );
        }
    }

    let first_backup = rotated_log_path(path, 1);
    remove_if_present(&first_backup, log_scope);

    let result = if copy_and_truncate {
        fs::copy(path, &first_backup).and_then(|_| {
            OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(path)
                .map(|_| ())
        })
    } else {
        fs::rename(path, &first_backup)
    };
    if let Err(error) = result {
        eprintln!(
            "[log rotation:{log_scope}] cannot rotate {}: {}",
            path.display(),
            error
        );
    }
}

fn remove_if_present(path: &Path, log_scope: &str) {
    if let Err(error) = fs::remove_file(path) {
        if error.kind() != std::io::ErrorKind::NotFound {
            eprintln!(
                "[log rotation:{log_scope}] cannot remove {}: {}",
                path.display(),
                error
            );
        }
    }
}

fn rotated_log_path(path: &Path, index: usize) -> PathBuf {
    let mut value = OsString::from(path.as_os_str());
    value.push(format!(".{index}"));
    PathBuf::from(value)
}

/// Directory holding both `desktop.log` and `backend.log`.
pub fn resolve_log_dir(data_root: Option<PathBuf>) -> PathBuf {
    if let Ok(data_dir) = env::var(crate::DATA_DIR_ENV) {
        let data_dir = PathBuf::from(data_dir.trim());
        if !data_dir.as_os_str().is_empty() {
            return data_dir.join("logs");
        }
    }

    if let Some(root) = data_root {
        return root.join("logs");
    }

    env::temp_dir().join("ims-desktop").join("logs")
}

pub fn resolve_desktop_log_path(data_root: Option<PathBuf>, desktop_log_file: &str) -> PathBuf {
    if let Ok(custom) = env::var(LOG_DIR_ENV) {
        let candidate = PathBuf::from(custom.trim());
        if !candidate.as_os_str().is_empty() {
            return candidate;
        }
    }

    resolve_log_dir(data_root).join(desktop_log_file)
}

pub fn format_log_line(category: DesktopLogCategory, message: &str) -> String {
    let timestamp = chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.3f %z")
        .to_string();
    format!("[{}] [{}] {}\n", timestamp, category.as_label(), message)
}

pub fn append_desktop_log(
    category: DesktopLogCategory,
    message: &str,
    path: &Path,
    max_bytes: u64,
    backup_count: usize,
    write_lock: &OnceLock<Mutex<()>>,
) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let _guard = match write_lock.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    rotate_log_if_needed(path, max_bytes, backup_count, "desktop", false);
    let line = format_log_line(category, message);
    if cfg!(debug_assertions) {
        eprint!("{line}");
    }
    let _ = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(line.as_bytes()));
}

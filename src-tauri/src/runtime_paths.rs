use std::{
    env,
    path::{Path, PathBuf},
};
use tauri::{AppHandle, Manager};

use crate::{BACKEND_DATA_SUBDIR, DATA_DIR_ENV};

/// `~/.ims`, the same root the backend falls back to without `IMS_DATA_DIR`.
pub fn default_data_root() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(".ims"))
}

/// Isolated per-user data directory handed to the backend child.
pub fn resolve_backend_data_dir(app: &AppHandle) -> Option<PathBuf> {
    if let Some(explicit) = env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
    {
        return Some(explicit);
    }

    app.path()
        .app_data_dir()
        .ok()
        .map(|dir| dir.join(BACKEND_DATA_SUBDIR))
        .or_else(default_data_root)
}

pub fn resolve_resource_dir(app: &AppHandle) -> Option<PathBuf> {
    app.path().resource_dir().ok()
}

pub fn workspace_root_dir() -> PathBuf {
    let candidate = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..");
    candidate
        .canonicalize()
        .unwrap_or_else(|_| candidate.to_path_buf())
}

pub fn detect_backend_source_dir(explicit: Option<&str>) -> Option<PathBuf> {
    detect_backend_source_dir_with(workspace_root_dir(), explicit.map(PathBuf::from))
}

fn detect_backend_source_dir_with(
    workspace_root: PathBuf,
    explicit: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(candidate) = explicit {
        if is_backend_source_dir(&candidate) {
            return Some(candidate.canonicalize().unwrap_or(candidate));
        }
    }

    let candidates = [
        workspace_root.join("backend"),
        workspace_root.join("..").join("backend"),
    ];
    candidates
        .into_iter()
        .find(|candidate| is_backend_source_dir(candidate))
        .map(|candidate| candidate.canonicalize().unwrap_or(candidate))
}

fn is_backend_source_dir(candidate: &Path) -> bool {
    candidate.join("main.py").is_file()
}

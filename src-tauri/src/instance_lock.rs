use std::{
    fs::{self, File, OpenOptions},
    io,
    path::Path,
};

use fs2::FileExt;

use crate::INSTANCE_LOCK_FILE;

/// Exclusive advisory lock held for the lifetime of the shell.
///
/// Released by the OS when the file handle is dropped or the process dies.
#[derive(Debug)]
pub struct InstanceLock {
    _file: File,
}

#[derive(Debug)]
pub enum InstanceLockError {
    AlreadyHeld,
    Io(io::Error),
}

impl std::fmt::Display for InstanceLockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyHeld => write!(f, "another shell instance holds the lock"),
            Self::Io(error) => write!(f, "failed to open instance lock: {error}"),
        }
    }
}

pub fn acquire(data_dir: &Path) -> Result<InstanceLock, InstanceLockError> {
    fs::create_dir_all(data_dir).map_err(InstanceLockError::Io)?;
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(data_dir.join(INSTANCE_LOCK_FILE))
        .map_err(InstanceLockError::Io)?;
    if file.try_lock_exclusive().is_err() {
        return Err(InstanceLockError::AlreadyHeld);
    }
    Ok(InstanceLock { _file: file })
}

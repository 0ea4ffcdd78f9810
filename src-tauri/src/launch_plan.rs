use std::path::{Path, PathBuf};

use crate::BACKEND_EXECUTABLE_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStrategy {
    Custom,
    StandaloneExecutable,
    Interpreter,
}

/// Everything needed to turn "start the backend" into a concrete command.
///
/// Built from the app handle at runtime; tests construct it directly.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub packaged: bool,
    pub resource_dir: Option<PathBuf>,
    pub backend_source_dir: Option<PathBuf>,
    pub workspace_root: PathBuf,
    pub data_dir: Option<PathBuf>,
    pub custom_cmd: Option<String>,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub cmd: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub data_dir: Option<PathBuf>,
    /// Redirect stdout/stderr into `backend.log` instead of inheriting the console.
    pub capture_output: bool,
    pub strategy: LaunchStrategy,
    pub packaged_mode: bool,
}

/// `Ok(None)` means nothing should be launched: an unforced development start,
/// where the backend is expected to run out-of-band.
pub fn resolve_launch_plan<L>(
    ctx: &LaunchContext,
    force: bool,
    lookup_system: L,
) -> Result<Option<LaunchPlan>, String>
where
    L: Fn(&str) -> Option<PathBuf>,
{
    if !ctx.packaged && !force {
        return Ok(None);
    }

    if let Some(custom_cmd) = ctx.custom_cmd.as_deref() {
        return resolve_custom_launch(ctx, custom_cmd).map(Some);
    }

    if ctx.packaged {
        resolve_packaged_launch(ctx, lookup_system).map(Some)
    } else {
        resolve_dev_launch(ctx, lookup_system).map(Some)
    }
}

fn resolve_custom_launch(ctx: &LaunchContext, custom_cmd: &str) -> Result<LaunchPlan, String> {
    let mut pieces =
        shlex::split(custom_cmd).ok_or_else(|| format!("Invalid IMS_BACKEND_CMD: {custom_cmd}"))?;
    if pieces.is_empty() {
        return Err("IMS_BACKEND_CMD is empty.".to_string());
    }

    let cmd = pieces.remove(0);
    Ok(LaunchPlan {
        cmd,
        args: pieces,
        cwd: ctx
            .backend_source_dir
            .clone()
            .unwrap_or_else(|| ctx.workspace_root.clone()),
        data_dir: ctx.data_dir.clone(),
        capture_output: ctx.packaged,
        strategy: LaunchStrategy::Custom,
        packaged_mode: ctx.packaged,
    })
}

fn resolve_packaged_launch<L>(ctx: &LaunchContext, lookup_system: L) -> Result<LaunchPlan, String>
where
    L: Fn(&str) -> Option<PathBuf>,
{
    let resource_dir = ctx
        .resource_dir
        .as_deref()
        .ok_or_else(|| "Bundled resources directory is unavailable.".to_string())?;
    let backend_dir = resource_dir.join("backend");

    let executable = standalone_executable_path(resource_dir);
    if executable.is_file() {
        return Ok(LaunchPlan {
            cmd: executable.to_string_lossy().to_string(),
            args: Vec::new(),
            cwd: executable
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| backend_dir.clone()),
            data_dir: ctx.data_dir.clone(),
            capture_output: true,
            strategy: LaunchStrategy::StandaloneExecutable,
            packaged_mode: true,
        });
    }

    Ok(LaunchPlan {
        cmd: resolve_interpreter(&backend_dir, lookup_system),
        args: uvicorn_args(&ctx.host, ctx.port),
        cwd: backend_dir,
        data_dir: ctx.data_dir.clone(),
        capture_output: true,
        strategy: LaunchStrategy::Interpreter,
        packaged_mode: true,
    })
}

fn resolve_dev_launch<L>(ctx: &LaunchContext, lookup_system: L) -> Result<LaunchPlan, String>
where
    L: Fn(&str) -> Option<PathBuf>,
{
    let backend_dir = ctx.backend_source_dir.clone().ok_or_else(|| {
        "Cannot locate the backend source directory. Set IMS_BACKEND_DIR to the folder containing main.py.".to_string()
    })?;

    Ok(LaunchPlan {
        cmd: resolve_interpreter(&backend_dir, lookup_system),
        args: uvicorn_args(&ctx.host, ctx.port),
        cwd: backend_dir,
        data_dir: ctx.data_dir.clone(),
        capture_output: false,
        strategy: LaunchStrategy::Interpreter,
        packaged_mode: false,
    })
}

pub fn standalone_executable_path(resource_dir: &Path) -> PathBuf {
    resource_dir
        .join("backend")
        .join("dist")
        .join(BACKEND_EXECUTABLE_NAME)
}

fn uvicorn_args(host: &str, port: u16) -> Vec<String> {
    vec![
        "-m".to_string(),
        "uvicorn".to_string(),
        "main:app".to_string(),
        "--host".to_string(),
        host.to_string(),
        "--port".to_string(),
        port.to_string(),
    ]
}

fn venv_interpreter_candidates(backend_dir: &Path) -> Vec<PathBuf> {
    ["venv", ".venv"]
        .iter()
        .map(|venv| {
            if cfg!(target_os = "windows") {
                backend_dir.join(venv).join("Scripts").join("python.exe")
            } else {
                backend_dir.join(venv).join("bin").join("python")
            }
        })
        .collect()
}

fn system_interpreter_names() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["python", "py"]
    } else {
        &["python3", "python"]
    }
}

/// Local virtual environment first, then the first interpreter on `PATH`.
///
/// Falls back to the bare name so a missing interpreter surfaces as a spawn
/// failure rather than a resolution error.
pub fn resolve_interpreter<L>(backend_dir: &Path, lookup_system: L) -> String
where
    L: Fn(&str) -> Option<PathBuf>,
{
    if let Some(venv_python) = venv_interpreter_candidates(backend_dir)
        .into_iter()
        .find(|candidate| candidate.is_file())
    {
        return venv_python.to_string_lossy().to_string();
    }

    system_interpreter_names()
        .iter()
        .find_map(|name| lookup_system(name))
        .map(|path| path.to_string_lossy().to_string())
        .unwrap_or_else(|| "python".to_string())
}

pub fn which_lookup(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

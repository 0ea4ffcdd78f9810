#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;
use std::{
    io,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const FORCE_FOLLOWUP_MIN: Duration = Duration::from_millis(200);
const FORCE_FOLLOWUP_MAX: Duration = Duration::from_millis(1_500);
/// A failed termination request rarely ends in an orderly exit; wait only briefly.
const FAILED_REQUEST_WAIT_CAP: Duration = Duration::from_millis(350);
#[cfg(target_os = "windows")]
const WINDOWS_CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    AlreadyExited,
    Graceful,
    Forced,
    /// The process survived the force-kill follow-up wait.
    Unresponsive,
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) if start.elapsed() < timeout => thread::sleep(EXIT_POLL_INTERVAL),
            Ok(None) | Err(_) => return false,
        }
    }
}

fn run_signal_command<F>(pid: u32, program: &str, args: &[&str], log: &F) -> io::Result<ExitStatus>
where
    F: Fn(&str),
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(target_os = "windows")]
    command.creation_flags(WINDOWS_CREATE_NO_WINDOW);

    let status = command.status();
    match &status {
        Ok(exit_status) if exit_status.success() => {}
        Ok(exit_status) => log(&format!(
            "{program} {} returned {exit_status} for pid={pid}",
            args.join(" ")
        )),
        Err(error) => log(&format!("{program} could not be started for pid={pid}: {error}")),
    }
    status
}

fn graceful_wait(timeout: Duration, request: &io::Result<ExitStatus>) -> Duration {
    match request {
        Ok(status) if status.success() => timeout,
        _ => timeout.min(FAILED_REQUEST_WAIT_CAP),
    }
}

fn force_followup_wait(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        Duration::ZERO
    } else {
        (timeout / 4).clamp(FORCE_FOLLOWUP_MIN, FORCE_FOLLOWUP_MAX)
    }
}

#[cfg(target_os = "windows")]
fn request_termination<F: Fn(&str)>(pid: u32, log: &F) -> io::Result<ExitStatus> {
    let pid_arg = pid.to_string();
    run_signal_command(pid, "taskkill", &["/pid", &pid_arg, "/t"], log)
}

#[cfg(not(target_os = "windows"))]
fn request_termination<F: Fn(&str)>(pid: u32, log: &F) -> io::Result<ExitStatus> {
    let pid_arg = pid.to_string();
    run_signal_command(pid, "kill", &["-TERM", &pid_arg], log)
}

#[cfg(target_os = "windows")]
fn force_kill<F: Fn(&str)>(child: &mut Child, log: &F) {
    let pid_arg = child.id().to_string();
    if run_signal_command(child.id(), "taskkill", &["/pid", &pid_arg, "/t", "/f"], log).is_err() {
        let _ = child.kill();
    }
}

#[cfg(not(target_os = "windows"))]
fn force_kill<F: Fn(&str)>(child: &mut Child, log: &F) {
    let pid_arg = child.id().to_string();
    if run_signal_command(child.id(), "kill", &["-KILL", &pid_arg], log).is_err() {
        let _ = child.kill();
    }
}

/// Termination request, bounded wait, then force-kill with a short follow-up.
///
/// The child is reaped on every path that observes its exit.
pub fn stop_child_gracefully<F>(child: &mut Child, timeout: Duration, log: F) -> StopOutcome
where
    F: Fn(&str),
{
    if matches!(child.try_wait(), Ok(Some(_))) {
        return StopOutcome::AlreadyExited;
    }

    let pid = child.id();
    let request = request_termination(pid, &log);
    let wait = graceful_wait(timeout, &request);
    if wait < timeout {
        log(&format!(
            "termination request for pid={pid} failed, graceful wait shortened to {}ms",
            wait.as_millis()
        ));
    }
    if wait_for_exit(child, wait) {
        return StopOutcome::Graceful;
    }

    force_kill(child, &log);
    let followup = force_followup_wait(timeout);
    log(&format!(
        "pid={pid} did not exit within {}ms, force-kill issued (follow-up {}ms)",
        wait.as_millis(),
        followup.as_millis()
    ));
    if wait_for_exit(child, followup) {
        StopOutcome::Forced
    } else {
        StopOutcome::Unresponsive
    }
}

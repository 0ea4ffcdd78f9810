use std::env;
use std::time::Duration;

use crate::{
    DEFAULT_BACKEND_HOST, DEFAULT_BACKEND_PORT, DEFAULT_DEV_SERVER_URL, DEFAULT_HEALTH_PATH,
};

/// Where the backend is expected to listen and how to ask it whether it is ours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    pub host: String,
    pub port: u16,
    pub health_path: String,
}

impl BackendEndpoint {
    pub fn base_url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("http://[{}]:{}/", self.host, self.port)
        } else {
            format!("http://{}:{}/", self.host, self.port)
        }
    }
}

/// Socket APIs take IPv6 literals without the URL brackets.
fn unbracket_host(raw: &str) -> String {
    raw.strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(raw)
        .to_string()
}

impl Default for BackendEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_BACKEND_HOST.to_string(),
            port: DEFAULT_BACKEND_PORT,
            health_path: DEFAULT_HEALTH_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimings {
    /// Single-shot connect used before deciding whether to spawn.
    pub quick_probe: Duration,
    pub health_check: Duration,
    /// Total budget of the splash readiness wait.
    pub ready_wait: Duration,
    pub connect_attempt: Duration,
    pub poll_interval: Duration,
}

impl Default for ProbeTimings {
    fn default() -> Self {
        Self {
            quick_probe: Duration::from_millis(500),
            health_check: Duration::from_millis(1_500),
            ready_wait: Duration::from_millis(6_000),
            connect_attempt: Duration::from_millis(1_200),
            poll_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShellSettings {
    pub endpoint: BackendEndpoint,
    pub timings: ProbeTimings,
    pub startup_grace: Duration,
    pub stop_timeout: Duration,
    pub custom_backend_cmd: Option<String>,
    pub backend_dir: Option<String>,
    pub use_dev_server: bool,
    pub dev_server_url: String,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            endpoint: BackendEndpoint::default(),
            timings: ProbeTimings::default(),
            startup_grace: Duration::from_millis(12_000),
            stop_timeout: Duration::from_millis(5_000),
            custom_backend_cmd: None,
            backend_dir: None,
            use_dev_server: true,
            dev_server_url: DEFAULT_DEV_SERVER_URL.to_string(),
        }
    }
}

struct ClampedMs {
    env_name: &'static str,
    min_ms: u64,
    max_ms: u64,
}

const PROBE_TIMEOUT: ClampedMs = ClampedMs {
    env_name: "IMS_BACKEND_PROBE_TIMEOUT_MS",
    min_ms: 50,
    max_ms: 999,
};
const HEALTH_TIMEOUT: ClampedMs = ClampedMs {
    env_name: "IMS_BACKEND_HEALTH_TIMEOUT_MS",
    min_ms: 100,
    max_ms: 30_000,
};
const READY_TIMEOUT: ClampedMs = ClampedMs {
    env_name: "IMS_BACKEND_READY_TIMEOUT_MS",
    min_ms: 500,
    max_ms: 120_000,
};
const CONNECT_TIMEOUT: ClampedMs = ClampedMs {
    env_name: "IMS_BACKEND_CONNECT_TIMEOUT_MS",
    min_ms: 50,
    max_ms: 10_000,
};
const POLL_INTERVAL: ClampedMs = ClampedMs {
    env_name: "IMS_BACKEND_POLL_INTERVAL_MS",
    min_ms: 50,
    max_ms: 10_000,
};
const STARTUP_GRACE: ClampedMs = ClampedMs {
    env_name: "IMS_STARTUP_GRACE_MS",
    min_ms: 1_000,
    max_ms: 300_000,
};
const STOP_TIMEOUT: ClampedMs = ClampedMs {
    env_name: "IMS_BACKEND_STOP_TIMEOUT_MS",
    min_ms: 200,
    max_ms: 60_000,
};

impl ShellSettings {
    /// Reads every `IMS_*` knob once; bad values are logged and replaced.
    pub fn from_env<F>(mut log: F) -> Self
    where
        F: FnMut(String),
    {
        let defaults = Self::default();
        let mut read_ms = |knob: &ClampedMs, fallback: Duration| -> Duration {
            match env::var(knob.env_name) {
                Ok(raw) => Duration::from_millis(parse_clamped_timeout_env(
                    &raw,
                    knob.env_name,
                    fallback.as_millis() as u64,
                    knob.min_ms,
                    knob.max_ms,
                    &mut log,
                )),
                Err(_) => fallback,
            }
        };

        let timings = ProbeTimings {
            quick_probe: read_ms(&PROBE_TIMEOUT, defaults.timings.quick_probe),
            health_check: read_ms(&HEALTH_TIMEOUT, defaults.timings.health_check),
            ready_wait: read_ms(&READY_TIMEOUT, defaults.timings.ready_wait),
            connect_attempt: read_ms(&CONNECT_TIMEOUT, defaults.timings.connect_attempt),
            poll_interval: read_ms(&POLL_INTERVAL, defaults.timings.poll_interval),
        };
        let startup_grace = read_ms(&STARTUP_GRACE, defaults.startup_grace);
        let stop_timeout = read_ms(&STOP_TIMEOUT, defaults.stop_timeout);

        let host = non_empty_env("IMS_BACKEND_HOST")
            .map(|raw| unbracket_host(&raw))
            .unwrap_or(defaults.endpoint.host);
        let port = match env::var("IMS_BACKEND_PORT") {
            Ok(raw) => parse_port(&raw, "IMS_BACKEND_PORT", DEFAULT_BACKEND_PORT, &mut log),
            Err(_) => DEFAULT_BACKEND_PORT,
        };
        let health_path =
            resolve_http_path("IMS_BACKEND_HEALTH_PATH", DEFAULT_HEALTH_PATH, &mut log);

        Self {
            endpoint: BackendEndpoint {
                host,
                port,
                health_path,
            },
            timings,
            startup_grace,
            stop_timeout,
            custom_backend_cmd: non_empty_env("IMS_BACKEND_CMD"),
            backend_dir: non_empty_env("IMS_BACKEND_DIR"),
            use_dev_server: env::var("USE_DEV_SERVER")
                .map(|value| value.trim() != "0")
                .unwrap_or(true),
            dev_server_url: non_empty_env("IMS_DEV_SERVER_URL")
                .unwrap_or(defaults.dev_server_url),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn resolve_http_path<F>(env_name: &str, default_path: &str, mut log: F) -> String
where
    F: FnMut(String),
{
    match env::var_os(env_name) {
        Some(raw) => match raw.to_str() {
            Some(raw_utf8) => normalize_http_path(raw_utf8, env_name, default_path, &mut log),
            None => {
                log(format!(
                    "{env_name} contains non-UTF-8 value '{}', fallback to default '{default_path}'",
                    raw.to_string_lossy()
                ));
                default_path.to_string()
            }
        },
        None => default_path.to_string(),
    }
}

fn normalize_http_path<F>(raw: &str, env_name: &str, default_path: &str, log: &mut F) -> String
where
    F: FnMut(String),
{
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        log(format!(
            "{env_name} is empty/whitespace, fallback to default '{default_path}'"
        ));
        default_path.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        let normalized = format!("/{trimmed}");
        log(format!(
            "{env_name} is missing leading '/': '{trimmed}', normalized to '{normalized}'"
        ));
        normalized
    }
}

pub fn parse_port<F>(raw: &str, env_name: &str, fallback: u16, mut log: F) -> u16
where
    F: FnMut(String),
{
    match raw.trim().parse::<u16>() {
        Ok(port) if port > 0 => port,
        _ => {
            log(format!(
                "invalid {env_name}='{raw}', fallback to port {fallback}"
            ));
            fallback
        }
    }
}

pub fn parse_clamped_timeout_env<F>(
    raw: &str,
    env_name: &str,
    fallback_ms: u64,
    min_ms: u64,
    max_ms: u64,
    mut log: F,
) -> u64
where
    F: FnMut(String),
{
    match raw.trim().parse::<u128>() {
        Ok(parsed) if parsed > 0 => {
            if parsed < min_ms as u128 {
                log(format!(
                    "{}='{}' is below minimum {}ms, clamped to {}ms",
                    env_name, raw, min_ms, min_ms
                ));
                min_ms
            } else if parsed > max_ms as u128 {
                log(format!(
                    "{}='{}' is above maximum {}ms, clamped to {}ms",
                    env_name, raw, max_ms, max_ms
                ));
                max_ms
            } else {
                parsed as u64
            }
        }
        _ => {
            log(format!(
                "invalid {}='{}', fallback to {}ms",
                env_name, raw, fallback_ms
            ));
            fallback_ms
        }
    }
}

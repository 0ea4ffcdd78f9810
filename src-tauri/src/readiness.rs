use std::{
    fmt, thread,
    time::{Duration, Instant},
};

use crate::{
    backend_config::{BackendEndpoint, ProbeTimings},
    health_check, port_probe,
};

/// Classification of whatever currently sits on the backend port.
///
/// Computed per check and never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Unknown,
    PortClosed,
    PortOpenForeign,
    PortOpenHealthy,
}

impl ReadinessState {
    pub fn is_ready(self) -> bool {
        self == Self::PortOpenHealthy
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::PortClosed => "port-closed",
            Self::PortOpenForeign => "port-open-foreign",
            Self::PortOpenHealthy => "port-open-healthy",
        }
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quick probe followed, when something listens, by one health request.
///
/// `Unknown` when the host does not resolve at all.
pub fn probe_readiness(endpoint: &BackendEndpoint, timings: &ProbeTimings) -> ReadinessState {
    if port_probe::resolve_addrs(&endpoint.host, endpoint.port).is_empty() {
        return ReadinessState::Unknown;
    }
    if !port_probe::is_port_open(&endpoint.host, endpoint.port, timings.quick_probe) {
        return ReadinessState::PortClosed;
    }
    if health_check::check_health(
        &endpoint.base_url(),
        &endpoint.health_path,
        timings.health_check,
    ) {
        ReadinessState::PortOpenHealthy
    } else {
        ReadinessState::PortOpenForeign
    }
}

/// Waits for the port within `timings.ready_wait`, then polls the health
/// endpoint with whatever budget is left.
///
/// Returns the last observed state; only `PortOpenHealthy` confirms readiness.
pub fn wait_for_backend_ready<F>(
    endpoint: &BackendEndpoint,
    timings: &ProbeTimings,
    log: F,
) -> ReadinessState
where
    F: Fn(&str),
{
    let start = Instant::now();
    if let Err(timeout) = port_probe::wait_for_port(
        &endpoint.host,
        endpoint.port,
        timings.ready_wait,
        timings.connect_attempt,
        timings.poll_interval,
    ) {
        log(&format!(
            "backend port {}:{} not reachable: {timeout}",
            endpoint.host, endpoint.port
        ));
        return ReadinessState::PortClosed;
    }

    let base_url = endpoint.base_url();
    loop {
        let remaining = timings.ready_wait.saturating_sub(start.elapsed());
        let request_timeout = timings.health_check.min(remaining);
        if !request_timeout.is_zero()
            && health_check::check_health(&base_url, &endpoint.health_path, request_timeout)
        {
            return ReadinessState::PortOpenHealthy;
        }

        let elapsed = start.elapsed();
        if elapsed >= timings.ready_wait {
            log(&format!(
                "backend port is open but {} did not report healthy within {}ms",
                endpoint.health_path,
                timings.ready_wait.as_millis()
            ));
            return ReadinessState::PortOpenForeign;
        }
        thread::sleep(
            timings
                .poll_interval
                .min(timings.ready_wait - elapsed)
                .max(Duration::from_millis(1)),
        );
    }
}

use std::{
    fmt,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    thread,
    time::{Duration, Instant},
};

use url::{Host, Url};

const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortWaitTimeout {
    pub waited: Duration,
    pub attempts: u32,
}

impl fmt::Display for PortWaitTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timed out after {}ms waiting for port ({} attempts)",
            self.waited.as_millis(),
            self.attempts
        )
    }
}

pub fn resolve_addrs(host: &str, port: u16) -> Vec<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map(|addrs| addrs.collect())
        .unwrap_or_default()
}

/// Host of `url` in the form socket resolution expects: IPv6 without brackets.
pub fn socket_host(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Ipv6(address) => Some(address.to_string()),
        Host::Ipv4(address) => Some(address.to_string()),
        Host::Domain(domain) => Some(domain.to_string()),
    }
}

/// One connect attempt per resolved address; the socket is dropped right away.
fn try_connect(host: &str, port: u16, timeout: Duration) -> bool {
    let timeout = timeout.max(MIN_ATTEMPT_TIMEOUT);
    resolve_addrs(host, port)
        .iter()
        .any(|address| TcpStream::connect_timeout(address, timeout).is_ok())
}

/// Quick "is something listening" check with a single short attempt.
pub fn is_port_open(host: &str, port: u16, timeout: Duration) -> bool {
    try_connect(host, port, timeout)
}

/// Retries a raw TCP connect until it succeeds or `budget` runs out.
///
/// Each attempt is bounded by `attempt_timeout` (never longer than what is
/// left of the budget); failed attempts are followed by `backoff`. A timeout
/// means "not ready", callers never treat it as fatal.
pub fn wait_for_port(
    host: &str,
    port: u16,
    budget: Duration,
    attempt_timeout: Duration,
    backoff: Duration,
) -> Result<Duration, PortWaitTimeout> {
    let start = Instant::now();
    let mut attempts = 0_u32;

    loop {
        let remaining = budget.saturating_sub(start.elapsed());
        attempts += 1;
        if try_connect(host, port, attempt_timeout.min(remaining)) {
            return Ok(start.elapsed());
        }

        let elapsed = start.elapsed();
        if elapsed >= budget {
            return Err(PortWaitTimeout {
                waited: elapsed,
                attempts,
            });
        }
        thread::sleep(backoff.min(budget - elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);
        port
    }

    #[test]
    fn is_port_open_detects_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let port = listener.local_addr().expect("local addr").port();
        assert!(is_port_open("127.0.0.1", port, Duration::from_millis(300)));
    }

    #[test]
    fn socket_host_strips_ipv6_brackets() {
        let v6 = Url::parse("http://[::1]:8000/health").expect("v6 url");
        assert_eq!(socket_host(&v6).as_deref(), Some("::1"));
        let v4 = Url::parse("http://127.0.0.1:8000/").expect("v4 url");
        assert_eq!(socket_host(&v4).as_deref(), Some("127.0.0.1"));
        let named = Url::parse("http://localhost:3000/").expect("named url");
        assert_eq!(socket_host(&named).as_deref(), Some("localhost"));
    }

    #[test]
    fn is_port_open_is_false_for_closed_port() {
        let port = closed_port();
        assert!(!is_port_open("127.0.0.1", port, Duration::from_millis(200)));
    }

    #[test]
    fn wait_for_port_returns_on_first_successful_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let port = listener.local_addr().expect("local addr").port();

        let waited = wait_for_port(
            "127.0.0.1",
            port,
            Duration::from_secs(5),
            Duration::from_millis(500),
            Duration::from_millis(250),
        )
        .expect("listener is already up");
        assert!(waited < Duration::from_secs(1));
    }

    #[test]
    fn wait_for_port_times_out_within_one_backoff_of_budget() {
        let port = closed_port();
        let budget = Duration::from_millis(600);
        let backoff = Duration::from_millis(100);

        let error = wait_for_port(
            "127.0.0.1",
            port,
            budget,
            Duration::from_millis(200),
            backoff,
        )
        .expect_err("nothing listens on the port");

        assert!(error.waited >= budget);
        assert!(error.waited < budget + backoff + Duration::from_millis(400));
        assert!(error.attempts > 1);
        assert!(error.to_string().contains("timed out"));
    }

    #[test]
    fn wait_for_port_picks_up_late_listener() {
        let port = closed_port();
        let binder = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            let listener = TcpListener::bind(("127.0.0.1", port)).expect("rebind port");
            thread::sleep(Duration::from_millis(1_500));
            drop(listener);
        });

        let result = wait_for_port(
            "127.0.0.1",
            port,
            Duration::from_secs(3),
            Duration::from_millis(200),
            Duration::from_millis(100),
        );
        binder.join().expect("binder thread");
        let waited = result.expect("listener appears within budget");
        assert!(waited >= Duration::from_millis(250));
    }
}

use std::{
    io::{ErrorKind, Read, Write},
    net::{TcpStream, ToSocketAddrs},
    time::{Duration, Instant},
};

use url::Url;

use crate::{http_response, port_probe, HEALTHY_STATUS};

const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(50);

/// Asks `<base_url><health_path>` whether the listener is this app's backend.
///
/// Refused connections, timeouts, non-2xx responses, non-JSON bodies and a
/// `status` other than the healthy literal all resolve to `false`.
pub fn check_health(base_url: &str, health_path: &str, timeout: Duration) -> bool {
    request_json(base_url, health_path, timeout)
        .map(|payload| http_response::is_expected_health_status(&payload, HEALTHY_STATUS))
        .unwrap_or(false)
}

fn request_json(base_url: &str, api_path: &str, timeout: Duration) -> Option<serde_json::Value> {
    let raw = request_response_bytes(base_url, api_path, timeout)?;
    http_response::parse_http_json_response(&raw)
}

fn request_response_bytes(base_url: &str, api_path: &str, timeout: Duration) -> Option<Vec<u8>> {
    let base = Url::parse(base_url).ok()?;
    let request_url = base.join(api_path).ok()?;
    if request_url.scheme() != "http" {
        return None;
    }

    let deadline = Instant::now() + timeout.max(MIN_REQUEST_TIMEOUT);
    let host = request_url.host_str()?;
    let port = request_url.port_or_known_default().unwrap_or(80);
    let addrs = (port_probe::socket_host(&request_url)?.as_str(), port)
        .to_socket_addrs()
        .ok()?;
    let mut stream = addrs.into_iter().find_map(|address| {
        let remaining = remaining_until(deadline)?;
        TcpStream::connect_timeout(&address, remaining).ok()
    })?;
    let _ = stream.set_write_timeout(Some(remaining_until(deadline)?));

    let mut request_target = request_url.path().to_string();
    if let Some(query) = request_url.query() {
        request_target.push('?');
        request_target.push_str(query);
    }

    let request = format!(
        "GET {request_target} HTTP/1.1\r\n\
Host: {host}:{port}\r\n\
Accept: application/json\r\n\
Accept-Encoding: identity\r\n\
Connection: close\r\n\
\r\n"
    );
    stream.write_all(request.as_bytes()).ok()?;

    read_http_response_bytes(&mut stream, deadline)
}

fn remaining_until(deadline: Instant) -> Option<Duration> {
    let remaining = deadline.checked_duration_since(Instant::now())?;
    if remaining.is_zero() {
        None
    } else {
        Some(remaining)
    }
}

fn is_complete_http_response(raw: &[u8]) -> bool {
    let Some(header_end) = raw.windows(4).position(|window| window == b"\r\n\r\n") else {
        return false;
    };
    let headers = &raw[..header_end + 4];
    let body = &raw[header_end + 4..];
    let header_text = String::from_utf8_lossy(headers).to_ascii_lowercase();

    if header_text.contains("transfer-encoding: chunked") {
        return body.windows(5).any(|window| window == b"0\r\n\r\n");
    }

    if let Some(content_length) = header_text
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
    {
        return body.len() >= content_length;
    }

    false
}

/// Reads until the response is complete, the peer closes, or `deadline` passes.
fn read_http_response_bytes(stream: &mut TcpStream, deadline: Instant) -> Option<Vec<u8>> {
    let mut response = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Some(remaining) = remaining_until(deadline) else {
            break;
        };
        if stream.set_read_timeout(Some(remaining)).is_err() {
            return None;
        }
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => {
                response.extend_from_slice(&chunk[..read]);
                if is_complete_http_response(&response) {
                    break;
                }
            }
            Err(error) if matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                break;
            }
            Err(_) => return None,
        }
    }

    if response.is_empty() {
        None
    } else {
        Some(response)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{
        io::{Read, Write},
        net::TcpListener,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    /// Local listener that answers every connection with a canned payload.
    pub struct CannedServer {
        pub port: u16,
        stop: Arc<AtomicBool>,
        worker: Option<thread::JoinHandle<()>>,
    }

    impl CannedServer {
        pub fn start(response: &'static [u8]) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind canned server");
            Self::serve(listener, response)
        }

        pub fn start_on(port: u16, response: &'static [u8]) -> Self {
            let listener = TcpListener::bind(("127.0.0.1", port)).expect("bind canned server");
            Self::serve(listener, response)
        }

        pub fn healthy() -> Self {
            Self::start(HEALTHY_RESPONSE)
        }

        pub fn serve(listener: TcpListener, response: &'static [u8]) -> Self {
            let port = listener.local_addr().expect("local addr").port();
            listener
                .set_nonblocking(true)
                .expect("non-blocking canned listener");
            let stop = Arc::new(AtomicBool::new(false));
            let stop_flag = stop.clone();
            let worker = thread::spawn(move || {
                while !stop_flag.load(Ordering::Relaxed) {
                    match listener.accept() {
                        Ok((mut stream, _)) => {
                            let _ = stream.set_nonblocking(false);
                            let _ = stream.set_read_timeout(Some(Duration::from_millis(200)));
                            let mut buf = [0u8; 1024];
                            let _ = stream.read(&mut buf);
                            let _ = stream.write_all(response);
                        }
                        Err(_) => thread::sleep(Duration::from_millis(10)),
                    }
                }
            });
            Self {
                port,
                stop,
                worker: Some(worker),
            }
        }

        pub fn base_url(&self) -> String {
            format!("http://127.0.0.1:{}/", self.port)
        }
    }

    impl Drop for CannedServer {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::Relaxed);
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        }
    }

    pub const HEALTHY_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 20\r\n\r\n{\"status\":\"healthy\"}";
    pub const FOREIGN_HTML_RESPONSE: &[u8] =
        b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 13\r\n\r\n<html></html>";
}

#[cfg(test)]
mod tests {
    use super::test_support::{CannedServer, FOREIGN_HTML_RESPONSE};
    use super::*;
    use std::{net::TcpListener, thread};

    const TIMEOUT: Duration = Duration::from_millis(800);

    #[test]
    fn healthy_literal_is_accepted() {
        let server = CannedServer::healthy();
        assert!(check_health(&server.base_url(), "/health", TIMEOUT));
    }

    #[test]
    fn connection_refused_is_unhealthy() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        assert!(!check_health(
            &format!("http://127.0.0.1:{port}/"),
            "/health",
            TIMEOUT
        ));
    }

    #[test]
    fn ipv6_loopback_backend_is_reachable() {
        // Hosts without IPv6 loopback have nothing to check.
        let Ok(listener) = TcpListener::bind("[::1]:0") else {
            return;
        };
        let server = CannedServer::serve(listener, super::test_support::HEALTHY_RESPONSE);
        let endpoint = crate::backend_config::BackendEndpoint {
            host: "::1".into(),
            port: server.port,
            health_path: "/health".into(),
        };
        assert!(check_health(&endpoint.base_url(), "/health", TIMEOUT));
    }

    #[test]
    fn non_json_body_is_unhealthy() {
        let server = CannedServer::start(FOREIGN_HTML_RESPONSE);
        assert!(!check_health(&server.base_url(), "/health", TIMEOUT));
    }

    #[test]
    fn missing_status_field_is_unhealthy() {
        let server = CannedServer::start(
            b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\n{\"ok\":true}",
        );
        assert!(!check_health(&server.base_url(), "/health", TIMEOUT));
    }

    #[test]
    fn other_status_value_is_unhealthy() {
        let server = CannedServer::start(
            b"HTTP/1.1 200 OK\r\nContent-Length: 17\r\n\r\n{\"status\":\"down\"}",
        );
        assert!(!check_health(&server.base_url(), "/health", TIMEOUT));
    }

    #[test]
    fn error_status_code_is_unhealthy() {
        let server = CannedServer::start(
            b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 20\r\n\r\n{\"status\":\"healthy\"}",
        );
        assert!(!check_health(&server.base_url(), "/health", TIMEOUT));
    }

    #[test]
    fn silent_listener_times_out_as_unhealthy() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let holder = thread::spawn(move || {
            let accepted = listener.accept();
            thread::sleep(Duration::from_millis(700));
            drop(accepted);
        });

        let started = Instant::now();
        assert!(!check_health(
            &format!("http://127.0.0.1:{port}/"),
            "/health",
            Duration::from_millis(300)
        ));
        assert!(started.elapsed() < Duration::from_millis(650));
        holder.join().expect("holder thread");
    }

    #[test]
    fn is_complete_http_response_respects_content_length() {
        let full = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK";
        assert!(is_complete_http_response(full));

        let partial = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nO";
        assert!(!is_complete_http_response(partial));
    }
}

use std::borrow::Cow;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct HealthPayload {
    status: String,
}

/// Body of a 2xx response decoded as JSON; anything else is `None`.
pub fn parse_http_json_response(raw: &[u8]) -> Option<serde_json::Value> {
    let (header_text, body_bytes) = parse_http_response_parts(raw)?;
    let status_code = parse_http_status_code_from_headers(&header_text)?;
    if !(200..300).contains(&status_code) {
        return None;
    }

    let is_chunked = header_text.lines().any(|line| {
        let line = line.trim().to_ascii_lowercase();
        line.starts_with("transfer-encoding:") && line.contains("chunked")
    });
    let payload = if is_chunked {
        decode_chunked_body(body_bytes)?
    } else {
        body_bytes.to_vec()
    };

    serde_json::from_slice(&payload).ok()
}

/// True only when the payload is an object whose `status` equals `expected`.
pub fn is_expected_health_status(payload: &serde_json::Value, expected: &str) -> bool {
    serde_json::from_value::<HealthPayload>(payload.clone())
        .map(|health| health.status == expected)
        .unwrap_or(false)
}

fn parse_http_response_parts(raw: &[u8]) -> Option<(Cow<'_, str>, &[u8])> {
    let header_end = raw.windows(4).position(|window| window == b"\r\n\r\n")?;
    let (header_bytes, body_bytes) = raw.split_at(header_end + 4);
    Some((String::from_utf8_lossy(header_bytes), body_bytes))
}

fn parse_http_status_code_from_headers(header_text: &str) -> Option<u16> {
    let status_line = header_text.lines().next()?;
    if !status_line.starts_with("HTTP/") {
        return None;
    }
    status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
}

fn decode_chunked_body(mut input: &[u8]) -> Option<Vec<u8>> {
    let mut output = Vec::new();

    loop {
        let header_end = input.windows(2).position(|window| window == b"\r\n")?;
        let chunk_size_line = std::str::from_utf8(&input[..header_end]).ok()?;
        let chunk_size_hex = chunk_size_line.split(';').next()?.trim();
        let chunk_size = usize::from_str_radix(chunk_size_hex, 16).ok()?;
        input = &input[header_end + 2..];

        if chunk_size == 0 {
            return Some(output);
        }
        let chunk_end = chunk_size.checked_add(2)?;
        if input.len() < chunk_end {
            return None;
        }

        output.extend_from_slice(&input[..chunk_size]);
        if &input[chunk_size..chunk_end] != b"\r\n" {
            return None;
        }
        input = &input[chunk_end..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_code_is_read_from_the_status_line() {
        let headers = "HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n";
        assert_eq!(parse_http_status_code_from_headers(headers), Some(204));
    }

    #[test]
    fn status_code_rejects_non_http_banner() {
        let headers = "SSH-2.0-OpenSSH_9.6\r\n\r\n";
        assert_eq!(parse_http_status_code_from_headers(headers), None);
    }

    #[test]
    fn parse_http_json_response_reads_plain_json_body() {
        let raw =
            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"status\":\"healthy\"}";
        let parsed = parse_http_json_response(raw).expect("expected json payload");
        assert_eq!(parsed["status"], json!("healthy"));
    }

    #[test]
    fn parse_http_json_response_reads_chunked_json_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n14\r\n{\"status\":\"healthy\"}\r\n0\r\n\r\n";
        let parsed = parse_http_json_response(raw).expect("expected chunked json payload");
        assert_eq!(parsed["status"], json!("healthy"));
    }

    #[test]
    fn parse_http_json_response_rejects_non_success_status() {
        let raw = b"HTTP/1.1 503 Service Unavailable\r\nContent-Type: application/json\r\n\r\n{\"status\":\"healthy\"}";
        assert!(parse_http_json_response(raw).is_none());
    }

    #[test]
    fn parse_http_json_response_rejects_html_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n<html>hi</html>";
        assert!(parse_http_json_response(raw).is_none());
    }

    #[test]
    fn parse_http_json_response_rejects_invalid_chunk_payload() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nabcde";
        assert!(parse_http_json_response(raw).is_none());
    }

    #[test]
    fn parse_http_json_response_rejects_oversized_chunk_size() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nab\r\n0\r\n\r\n";
        assert!(parse_http_json_response(raw).is_none());
    }

    #[test]
    fn health_status_requires_exact_literal() {
        assert!(is_expected_health_status(&json!({"status": "healthy"}), "healthy"));
        assert!(!is_expected_health_status(&json!({"status": "Healthy"}), "healthy"));
        assert!(!is_expected_health_status(&json!({"status": "ok"}), "healthy"));
        assert!(!is_expected_health_status(&json!({"state": "healthy"}), "healthy"));
        assert!(!is_expected_health_status(&json!({"status": 1}), "healthy"));
        assert!(!is_expected_health_status(&json!(["healthy"]), "healthy"));
    }
}

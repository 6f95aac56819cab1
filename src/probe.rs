//! HTTP checks against the deployed service.

use anyhow::{Context, Result};
use std::time::Duration;

/// Status and body of one GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that can GET a URL. Non-2xx statuses are responses, not errors;
/// errors mean no response arrived (refused, reset, timed out).
pub trait Probe {
    fn get(&self, url: &str) -> Result<ProbeResponse>;
}

/// Probe backed by a blocking HTTP agent with a global per-request timeout.
pub struct HttpProbe {
    agent: ureq::Agent,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Probe for HttpProbe {
    fn get(&self, url: &str) -> Result<ProbeResponse> {
        log::debug!("GET {url}");
        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", concat!("sensordeploy/", env!("CARGO_PKG_VERSION")))
            .call()
            .with_context(|| format!("GET {url} failed"))?;

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string().unwrap_or_default();
        log::debug!("GET {url} -> {status}");
        Ok(ProbeResponse { status, body })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_success_range() {
        let ok = ProbeResponse {
            status: 204,
            body: String::new(),
        };
        assert!(ok.is_success());
        let missing = ProbeResponse {
            status: 404,
            body: String::new(),
        };
        assert!(!missing.is_success());
    }

    #[test]
    fn test_refused_connection_is_error() {
        // Bind then drop to get a port nothing listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let probe = HttpProbe::new(Duration::from_secs(1));
        assert!(probe.get(&format!("http://127.0.0.1:{port}/")).is_err());
    }

    #[test]
    fn test_not_found_is_a_response() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream
                .write_all(
                    b"HTTP/1.1 404 Not Found\r\nContent-Type: application/json\r\n\
                      Content-Length: 2\r\nConnection: close\r\n\r\n{}",
                )
                .unwrap();
        });

        let probe = HttpProbe::new(Duration::from_secs(5));
        let response = probe
            .get(&format!("http://127.0.0.1:{port}/sensors/latest"))
            .unwrap();
        server.join().unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.body, "{}");
        assert!(!response.is_success());
    }
}

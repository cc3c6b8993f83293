// SPDX-License-Identifier: MIT
//! Active reachability probe.
//!
//! An OS-validated network can still sit behind a captive portal or a dead
//! uplink, so capability changes are confirmed with a real HTTP round trip.
//! The probe API is blocking on purpose: the observer dispatches it to
//! tokio's blocking pool so the event task keeps draining OS callbacks while
//! the request is in flight.

use std::time::Duration;
use tracing::{debug, warn};

/// End-to-end reachability check, executed on the blocking pool.
///
/// `check` returns `true` only when the endpoint answered HTTP 200. Every
/// failure mode — connect error, timeout, non-200 status, transport error —
/// collapses to `false` and never surfaces as an error to subscribers.
pub trait ReachabilityProbe: Send + Sync + 'static {
    fn check(&self) -> bool;
}

/// Probe against a fixed well-known HTTPS endpoint.
///
/// One GET per invocation; the connection is short-lived and closed on every
/// exit path when the response is dropped.
pub struct HttpProbe {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpProbe {
    /// Build a probe for `url` with the given connect timeout.
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

impl ReachabilityProbe for HttpProbe {
    fn check(&self) -> bool {
        match self.client.get(&self.url).send() {
            Ok(resp) => {
                let ok = resp.status() == reqwest::StatusCode::OK;
                debug!(url = %self.url, status = %resp.status(), ok, "reachability probe completed");
                ok
            }
            Err(err) => {
                warn!(url = %self.url, err = %err, "reachability probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// Serve a single canned HTTP response on a random local port.
    fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn succeeds_on_200() {
        let url = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        let probe = HttpProbe::new(url, Duration::from_secs(3));
        assert!(probe.check());
    }

    #[test]
    fn fails_on_non_200() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let probe = HttpProbe::new(url, Duration::from_secs(3));
        assert!(!probe.check());
    }

    #[test]
    fn fails_on_connection_refused() {
        // Bind then drop to get a port with nothing listening.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let probe = HttpProbe::new(format!("http://{addr}"), Duration::from_millis(500));
        assert!(!probe.check());
    }
}

//! Local loopback listener for browser round-trips.
//!
//! Serves both the federated login callback and the hosted challenge
//! page callback. The accept loop blocks, so async callers go through
//! [`CallbackWait`] which runs it on the blocking pool.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Generates a random high localhost port for callbacks.
pub fn random_local_port() -> u16 {
    let id = uuid::Uuid::new_v4();
    let bytes = id.as_bytes();
    let raw = u16::from_le_bytes([bytes[0], bytes[1]]);
    49152 + (raw % 16384)
}

/// Builds the redirect URI for a given localhost port.
pub fn build_redirect_uri(port: u16, path: &str) -> String {
    format!("http://localhost:{port}{path}")
}

/// Waits for a single browser callback and extracts `param` from it.
///
/// Requests for other paths (favicon fetches and the like) are answered
/// with 404 and ignored. Resolves to `None` on timeout, bind failure, or
/// a callback that fails the state check.
pub async fn wait_for_param(
    port: u16,
    callback_path: &str,
    param: &str,
    expected_state: Option<&str>,
    timeout: Duration,
) -> Option<String> {
    CallbackWait {
        port,
        page: None,
        callback_path,
        param,
        expected_state,
        timeout,
        cancel: None,
    }
    .run()
    .await
}

/// One-shot callback wait with the full set of knobs.
///
/// [`wait_for_param`] covers the plain case; flows that host their own
/// entry page or need to release the port early build this directly.
pub struct CallbackWait<'a> {
    pub port: u16,
    /// `(path, body)` served with a 200 while waiting, so a flow can
    /// host its own entry page on the listener that takes its callback.
    pub page: Option<(&'a str, &'a str)>,
    pub callback_path: &'a str,
    /// Query parameter extracted from the callback.
    pub param: &'a str,
    pub expected_state: Option<&'a str>,
    pub timeout: Duration,
    /// Stops the listener early and releases the port.
    pub cancel: Option<CancellationToken>,
}

impl CallbackWait<'_> {
    /// Runs the accept loop on the blocking pool until the callback
    /// arrives, the timeout elapses, or `cancel` fires.
    pub async fn run(self) -> Option<String> {
        let port = self.port;
        let page = self.page.map(|(path, body)| (path.to_string(), body.to_string()));
        let callback_path = self.callback_path.to_string();
        let param = self.param.to_string();
        let expected_state = self.expected_state.map(str::to_string);
        let timeout = self.timeout;
        let cancel = self.cancel;
        tokio::task::spawn_blocking(move || {
            wait_for_param_blocking(
                port,
                page.as_ref().map(|(path, body)| (path.as_str(), body.as_str())),
                &callback_path,
                &param,
                expected_state.as_deref(),
                timeout,
                cancel.as_ref(),
            )
        })
        .await
        .ok()
        .flatten()
    }
}

#[allow(clippy::too_many_arguments)]
fn wait_for_param_blocking(
    port: u16,
    page: Option<(&str, &str)>,
    callback_path: &str,
    param: &str,
    expected_state: Option<&str>,
    timeout: Duration,
    cancel: Option<&CancellationToken>,
) -> Option<String> {
    let listener = match TcpListener::bind(format!("127.0.0.1:{port}")) {
        Ok(listener) => listener,
        Err(_) => return None,
    };
    let _ = listener.set_nonblocking(true);

    let start = Instant::now();
    loop {
        match listener.accept() {
            Ok((mut stream, _)) => {
                let mut buffer = [0u8; 2048];
                let _ = stream.read(&mut buffer);
                let request = String::from_utf8_lossy(&buffer);
                match classify_request(&request, callback_path, param, expected_state) {
                    Callback::Ignored => {
                        if let Some((page_path, body)) = page
                            && request_targets(&request, page_path)
                        {
                            let _ = stream.write_all(html_response(body).as_bytes());
                        } else {
                            let _ = stream.write_all(not_found_response().as_bytes());
                        }
                    }
                    Callback::Rejected => {
                        let _ = stream.write_all(callback_error_response().as_bytes());
                        return None;
                    }
                    Callback::Accepted(value) => {
                        let _ = stream.write_all(callback_success_response().as_bytes());
                        return Some(value);
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                if cancel.is_some_and(|cancel| cancel.is_cancelled()) {
                    return None;
                }
                if start.elapsed() > timeout {
                    return None;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(_) => return None,
        }
    }
}

enum Callback {
    /// Some other request; keep listening.
    Ignored,
    /// The callback arrived but was malformed or failed the state check.
    Rejected,
    /// The callback carried the requested parameter.
    Accepted(String),
}

fn classify_request(
    request: &str,
    callback_path: &str,
    param: &str,
    expected_state: Option<&str>,
) -> Callback {
    let Some(request_line) = request.lines().next() else {
        return Callback::Ignored;
    };
    let mut parts = request_line.split_whitespace();
    let _method = parts.next();
    let Some(path) = parts.next() else {
        return Callback::Ignored;
    };

    let Ok(url) = url::Url::parse(&format!("http://localhost{path}")) else {
        return Callback::Ignored;
    };
    if url.path() != callback_path {
        return Callback::Ignored;
    }

    if let Some(expected) = expected_state {
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.to_string());
        if state.as_deref() != Some(expected) {
            return Callback::Rejected;
        }
    }

    match url
        .query_pairs()
        .find(|(k, _)| k == param)
        .map(|(_, v)| v.to_string())
    {
        Some(value) if !value.is_empty() => Callback::Accepted(value),
        _ => Callback::Rejected,
    }
}

/// Returns true when the request line targets exactly `path`.
fn request_targets(request: &str, path: &str) -> bool {
    let Some(request_line) = request.lines().next() else {
        return false;
    };
    let mut parts = request_line.split_whitespace();
    let _method = parts.next();
    let Some(target) = parts.next() else {
        return false;
    };
    match url::Url::parse(&format!("http://localhost{target}")) {
        Ok(url) => url.path() == path,
        Err(_) => false,
    }
}

fn html_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

fn callback_success_response() -> String {
    let body =
        "<html><body><h3>Verification complete</h3><p>You can close this window.</p></body></html>";
    html_response(body)
}

fn callback_error_response() -> String {
    let body = "<html><body><h3>Verification failed</h3><p>Please return to the terminal and try again.</p></body></html>";
    format!(
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

fn not_found_response() -> String {
    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(path_and_query: &str) -> String {
        format!("GET {path_and_query} HTTP/1.1\r\nHost: localhost\r\n\r\n")
    }

    /// Test: a matching callback yields the requested parameter.
    #[test]
    fn accepts_matching_callback() {
        let request = get("/callback?state=abc&code=the-code");
        match classify_request(&request, "/callback", "code", Some("abc")) {
            Callback::Accepted(value) => assert_eq!(value, "the-code"),
            _ => panic!("expected Accepted"),
        }
    }

    /// Test: a state mismatch rejects the callback outright.
    #[test]
    fn rejects_state_mismatch() {
        let request = get("/callback?state=evil&code=the-code");
        assert!(matches!(
            classify_request(&request, "/callback", "code", Some("abc")),
            Callback::Rejected
        ));
    }

    /// Test: unrelated requests are ignored, not treated as failures.
    #[test]
    fn ignores_other_paths() {
        let request = get("/favicon.ico");
        assert!(matches!(
            classify_request(&request, "/callback", "code", Some("abc")),
            Callback::Ignored
        ));
    }

    /// Test: a callback without the parameter is rejected.
    #[test]
    fn rejects_missing_param() {
        let request = get("/challenge?state=abc");
        assert!(matches!(
            classify_request(&request, "/challenge", "token", Some("abc")),
            Callback::Rejected
        ));
    }

    /// Test: the page route matches on path alone, query ignored.
    #[test]
    fn page_route_matching() {
        assert!(request_targets(&get("/challenge"), "/challenge"));
        assert!(request_targets(&get("/challenge?state=abc"), "/challenge"));
        assert!(!request_targets(&get("/challenge/verified"), "/challenge"));
        assert!(!request_targets(&get("/favicon.ico"), "/challenge"));
    }

    /// Test: cancellation stops the listener and resolves to None.
    #[tokio::test]
    async fn cancellation_releases_listener() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let value = CallbackWait {
            port: random_local_port(),
            page: None,
            callback_path: "/callback",
            param: "code",
            expected_state: None,
            timeout: Duration::from_secs(30),
            cancel: Some(cancel),
        }
        .run()
        .await;
        assert_eq!(value, None);
    }

    /// Test: generated ports stay in the dynamic range.
    #[test]
    fn random_port_range() {
        for _ in 0..32 {
            let port = random_local_port();
            assert!(port >= 49152);
        }
    }

    /// Test: redirect URIs target localhost with the given path.
    #[test]
    fn redirect_uri_format() {
        assert_eq!(
            build_redirect_uri(55555, "/callback"),
            "http://localhost:55555/callback"
        );
    }
}

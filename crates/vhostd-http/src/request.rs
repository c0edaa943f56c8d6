//! HTTP request model
//!
//! Construction is best-effort on purpose: the connection layer only hands
//! over byte buffers it has already judged to be complete frames, and a
//! mangled request line still has to produce *something* the handler can
//! turn into an error response. Missing pieces fall back to `GET / HTTP/1.1`.

/// A parsed HTTP request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    /// Raw request target as sent (path plus optional query)
    pub target: String,
    /// Path component of the target
    pub path: String,
    /// Query string without the '?', empty when absent
    pub query: String,
    pub version: String,
    /// Headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Bytes after the header terminator
    pub body: Vec<u8>,
}

impl Request {
    /// Construct from a raw frame.
    pub fn new(raw: &[u8]) -> Self {
        let (head, body) = match find_header_end(raw) {
            Some(pos) => (&raw[..pos], raw[pos + 4..].to_vec()),
            None => (raw, Vec::new()),
        };
        let head = String::from_utf8_lossy(head);
        let mut lines = head.split("\r\n");

        let mut request_line = lines.next().unwrap_or("").split_whitespace();
        let method = request_line.next().unwrap_or("GET").to_string();
        let target = request_line.next().unwrap_or("/").to_string();
        let version = request_line.next().unwrap_or("HTTP/1.1").to_string();

        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (target.clone(), String::new()),
        };
        let path = if path.is_empty() { "/".to_string() } else { path };

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        Self { method, target, path, query, version, headers, body }
    }

    /// Case-insensitive header lookup; first occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

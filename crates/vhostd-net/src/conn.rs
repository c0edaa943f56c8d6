//! Per-connection read/write state machine
//!
//! A `Connection` owns one accepted socket and two byte buffers. Reads
//! accumulate into `pending_input` until the buffer holds one complete
//! frame (header terminator plus declared body length); the frame is then
//! handed to the request parser and handler in one synchronous step, and
//! the serialized response is drained through `pending_output` across as
//! many writable events as the kernel requires.

use std::net::SocketAddrV4;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use vhostd_core::config::ServerConfig;
use vhostd_core::{log_debug, log_info, log_warn};
use vhostd_http::{handler, status, Request};

use crate::sock;

/// Bytes pulled from the socket per readable event.
const RECV_CHUNK: usize = 8192;

pub struct Connection {
    fd: RawFd,
    peer: SocketAddrV4,
    closed: bool,
    /// Bytes received but not yet consumed into a request
    pending_input: Vec<u8>,
    /// Response bytes not yet accepted by the kernel
    pending_output: Vec<u8>,
    config: Arc<ServerConfig>,
}

impl Connection {
    pub fn new(fd: RawFd, peer: SocketAddrV4, config: Arc<ServerConfig>) -> Self {
        log_info!("new connection from {}", peer);
        Self {
            fd,
            peer,
            closed: false,
            pending_input: Vec::new(),
            pending_output: Vec::new(),
            config,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn peer(&self) -> SocketAddrV4 {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Handle one readable event. Returns false when the connection must
    /// be dropped.
    pub fn on_readable(&mut self) -> bool {
        // Oversized declared body: answer before reading any of it, so the
        // body bytes are never pulled off the socket.
        let declared = declared_body_length(&self.pending_input);
        if declared > 0 && declared > self.config.client_max_body_size {
            log_warn!(
                "request body too large from {} ({} > {})",
                self.peer,
                declared,
                self.config.client_max_body_size
            );
            let resp = status::build_response(&self.config, 413);
            self.pending_output = resp.to_bytes();
            self.pending_input.clear();
            return true;
        }

        let mut buf = [0u8; RECV_CHUNK];
        let n = sock::recv(self.fd, &mut buf);
        if n <= 0 {
            self.closed = true;
            return false;
        }
        self.pending_input.extend_from_slice(&buf[..n as usize]);

        if self.has_complete_request() {
            log_debug!("request complete from {} ({} bytes)", self.peer, self.pending_input.len());
            let request = Request::new(&self.pending_input);
            let response = handler::handle(&request, &self.config);
            self.pending_output = response.to_bytes();
            self.pending_input.clear();
        }
        true
    }

    /// Handle one writable event. Returns false when the connection must
    /// be dropped.
    pub fn on_writable(&mut self) -> bool {
        if self.pending_output.is_empty() {
            return true;
        }
        let n = sock::send(self.fd, &self.pending_output);
        if n <= 0 {
            self.closed = true;
            return false;
        }
        self.pending_output.drain(..n as usize);
        true
    }

    /// One frame buffered: header terminator present and the declared body
    /// fully received.
    fn has_complete_request(&self) -> bool {
        match find_header_end(&self.pending_input) {
            Some(pos) => {
                self.pending_input.len() >= pos + 4 + declared_body_length(&self.pending_input)
            }
            None => false,
        }
    }

    /// Close the socket; safe to call more than once.
    pub fn close(&mut self) {
        if self.fd >= 0 {
            sock::close(self.fd);
            self.fd = -1;
        }
        self.closed = true;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Declared `Content-Length` in the buffered bytes, or 0.
///
/// The header name match is exact and case-sensitive, the value line must
/// be CRLF-terminated, and the value must be all decimal digits after
/// optional blanks. Anything else counts as no declared body; a malformed
/// length silently frames an empty body rather than rejecting the request.
fn declared_body_length(buf: &[u8]) -> usize {
    parse_content_length(buf).unwrap_or(0)
}

fn parse_content_length(buf: &[u8]) -> Option<usize> {
    const NAME: &[u8] = b"Content-Length:";
    let at = buf.windows(NAME.len()).position(|w| w == NAME)?;
    let after = at + NAME.len();
    let rel_end = buf[after..].windows(2).position(|w| w == b"\r\n")?;

    let mut value = &buf[after..after + rel_end];
    while let [b' ' | b'\t', rest @ ..] = value {
        value = rest;
    }
    if value.is_empty() || !value.iter().all(|b| b.is_ascii_digit()) {
        return None;
    }
    std::str::from_utf8(value).ok()?.parse().ok()
}

//! Connection table: owner of every live client connection of one
//! virtual host
//!
//! Connections are keyed by their fd. The table is the single owner:
//! creation on accept, destruction on remove or teardown, nothing shared.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use vhostd_core::config::ServerConfig;
use vhostd_core::{log_info, log_warn};

use crate::conn::Connection;
use crate::sock;

/// What a dispatch call decided about the fd it was offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handled; connection stays registered
    Keep,
    /// Handled; connection must leave the interest list
    Drop,
    /// This table does not own the fd
    NotMine,
}

#[derive(Default)]
pub struct ConnectionTable {
    conns: HashMap<RawFd, Connection>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept one pending connection on `listen_fd` and register it.
    ///
    /// Every failure path closes whatever fd was opened; a connection is
    /// either fully registered or does not exist.
    pub fn accept_client(
        &mut self,
        listen_fd: RawFd,
        config: &Arc<ServerConfig>,
    ) -> vhostd_core::ServResult<RawFd> {
        let (fd, peer) = sock::accept(listen_fd)?;
        if let Err(e) = sock::set_nonblocking(fd) {
            sock::close(fd);
            return Err(e);
        }
        self.conns.insert(fd, Connection::new(fd, peer, Arc::clone(config)));
        log_info!("client connected: fd {}", fd);
        Ok(fd)
    }

    /// Route one poll event batch to the owning connection.
    ///
    /// The four event categories are independent and not mutually
    /// exclusive; a drop from any of them is sticky for the whole call,
    /// even when another category succeeded in the same batch.
    pub fn dispatch(&mut self, fd: RawFd, revents: i16) -> DispatchOutcome {
        let conn = match self.conns.get_mut(&fd) {
            Some(conn) => conn,
            None => return DispatchOutcome::NotMine,
        };

        let mut keep = true;
        if revents & libc::POLLIN != 0 && !conn.on_readable() {
            keep = false;
        }
        if revents & libc::POLLOUT != 0 && !conn.on_writable() {
            keep = false;
        }
        if revents & libc::POLLHUP != 0 {
            log_info!("client hang up: fd {}", fd);
            keep = false;
        }
        if revents & libc::POLLERR != 0 {
            log_warn!("error event on client socket: fd {}", fd);
            keep = false;
        }

        if keep {
            DispatchOutcome::Keep
        } else {
            DispatchOutcome::Drop
        }
    }

    /// Destroy and close a connection; no-op for fds this table does not
    /// own, so the reactor can offer removals to every table.
    pub fn remove(&mut self, fd: RawFd) {
        if self.conns.remove(&fd).is_some() {
            log_info!("client disconnected: fd {}", fd);
        }
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.conns.contains_key(&fd)
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Destroy and close every connection.
    pub fn teardown(&mut self) {
        let count = self.conns.len();
        self.conns.clear();
        if count > 0 {
            log_info!("dropped {} client connection(s)", count);
        }
    }
}

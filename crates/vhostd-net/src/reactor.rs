//! The reactor: one poll set over every virtual host
//!
//! A single blocking `poll(2)` watches every listening socket and every
//! client connection in the process. Each ready fd is classified through
//! the listening-fd set: listening fds accept exactly once per event,
//! client fds are dispatched to the table that owns them. Interest-list
//! mutations (new accepts, queued removals) are applied only after the
//! scan, never during it.

use std::collections::{HashMap, HashSet};
use std::os::unix::io::RawFd;

use vhostd_core::config::ServerConfig;
use vhostd_core::error::{ConfigError, ServError, ServResult};
use vhostd_core::{log_error, log_info};

use crate::listener::VirtualHost;
use crate::registry::DispatchOutcome;
use crate::signal;
use crate::sock;

pub struct Server {
    hosts: Vec<VirtualHost>,
    /// Flattened interest list: listening fds first (registered once at
    /// startup), client fds appended and removed as connections come and go
    poll_fds: Vec<libc::pollfd>,
    /// Listening fd -> index of the owning host
    owner_of: HashMap<RawFd, usize>,
    /// Listening fds, for O(1) classification of a ready fd
    listen_set: HashSet<RawFd>,
}

impl Server {
    /// Bring up one virtual host per configuration record.
    ///
    /// Any host failing to set up aborts the whole startup; hosts brought
    /// up before the failure are torn down on drop, so there is no partial
    /// start.
    pub fn new(configs: Vec<ServerConfig>) -> ServResult<Self> {
        if configs.is_empty() {
            return Err(ServError::Config(ConfigError::Empty));
        }

        let mut hosts = Vec::with_capacity(configs.len());
        for config in configs {
            let mut host = VirtualHost::new(config);
            host.setup()?;
            hosts.push(host);
        }

        let mut server = Self {
            hosts,
            poll_fds: Vec::new(),
            owner_of: HashMap::new(),
            listen_set: HashSet::new(),
        };
        server.build_interest_set();
        Ok(server)
    }

    fn build_interest_set(&mut self) {
        for (index, host) in self.hosts.iter().enumerate() {
            for &fd in host.listen_fds() {
                self.poll_fds.push(libc::pollfd { fd, events: libc::POLLIN, revents: 0 });
                self.owner_of.insert(fd, index);
                self.listen_set.insert(fd);
            }
        }
    }

    /// Serve until the stop flag is observed, then tear down.
    pub fn run(&mut self) {
        log_info!("serving {} virtual host(s)", self.hosts.len());
        while !signal::stop_requested() {
            self.poll_once(-1);
        }
        log_info!("stop requested, shutting down");
        self.shutdown();
    }

    /// One reactor iteration: a single poll call followed by event
    /// routing. `run` passes -1 (block until readiness or a signal);
    /// tests drive this directly with a finite timeout.
    pub fn poll_once(&mut self, timeout_ms: i32) {
        let ready = sock::poll(&mut self.poll_fds, timeout_ms);
        if ready < 0 {
            // EINTR from a stop signal lands here too; the caller's flag
            // check decides whether another iteration happens.
            return;
        }

        let mut accepted: Vec<libc::pollfd> = Vec::new();
        let mut to_remove: Vec<usize> = Vec::new();

        for index in 0..self.poll_fds.len() {
            let revents = self.poll_fds[index].revents;
            if revents == 0 {
                continue;
            }
            let fd = self.poll_fds[index].fd;

            if self.listen_set.contains(&fd) {
                if let Some(conn_fd) = self.accept_from(fd) {
                    accepted.push(libc::pollfd {
                        fd: conn_fd,
                        events: libc::POLLIN | libc::POLLOUT,
                        revents: 0,
                    });
                }
            } else if !self.dispatch_to_owner(fd, revents) {
                to_remove.push(index);
            }
        }

        // New connections join the interest list for the next wait cycle
        self.poll_fds.extend(accepted);

        // Descending order keeps the earlier queued indexes valid while
        // entries are erased
        for &index in to_remove.iter().rev() {
            let fd = self.poll_fds[index].fd;
            for host in &mut self.hosts {
                host.remove_conn(fd);
            }
            self.poll_fds.remove(index);
        }
    }

    /// Exactly one accept per listening-fd event.
    fn accept_from(&mut self, listen_fd: RawFd) -> Option<RawFd> {
        let host_index = *self.owner_of.get(&listen_fd)?;
        match self.hosts[host_index].accept_on(listen_fd) {
            Ok(conn_fd) => Some(conn_fd),
            Err(e) => {
                log_error!("accept on fd {} failed: {}", listen_fd, e);
                None
            }
        }
    }

    /// Probe each host's table in registration order; the first table
    /// that recognizes the fd decides. Safe to short-circuit because
    /// every fd is registered in exactly one table. Returns false when
    /// the fd must leave the interest list.
    fn dispatch_to_owner(&mut self, fd: RawFd, revents: i16) -> bool {
        for host in &mut self.hosts {
            match host.handle_event(fd, revents) {
                DispatchOutcome::Keep => return true,
                DispatchOutcome::Drop => return false,
                DispatchOutcome::NotMine => continue,
            }
        }
        // Owned by nobody: a stale entry, drop it from the list
        false
    }

    /// Tear everything down: every fd in the interest list is closed
    /// through its owner (listening fds by their host, client fds by
    /// their table), then the indexes are cleared. Safe to call more
    /// than once.
    pub fn shutdown(&mut self) {
        for host in &mut self.hosts {
            host.teardown();
        }
        self.poll_fds.clear();
        self.owner_of.clear();
        self.listen_set.clear();
    }

    pub fn hosts(&self) -> &[VirtualHost] {
        &self.hosts
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! One virtual host: its listening sockets plus its client table
//!
//! Setup is all-or-nothing. The first socket that fails any step of
//! create → reuse-addr → bind → non-blocking → listen aborts the whole
//! host; the in-flight fd is closed before the error propagates, so a
//! failed host never leaves sockets behind.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::unix::io::RawFd;
use std::sync::Arc;

use vhostd_core::config::ServerConfig;
use vhostd_core::error::{ServError, ServResult};
use vhostd_core::log_info;

use crate::registry::{ConnectionTable, DispatchOutcome};
use crate::sock;

pub struct VirtualHost {
    config: Arc<ServerConfig>,
    listen_fds: Vec<RawFd>,
    /// Actual bound addresses, getsockname-resolved (port 0 in the
    /// configuration becomes the real ephemeral port here)
    bound: Vec<SocketAddrV4>,
    table: ConnectionTable,
}

impl VirtualHost {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            listen_fds: Vec::new(),
            bound: Vec::new(),
            table: ConnectionTable::new(),
        }
    }

    /// Open every configured listening socket, fail-fast.
    pub fn setup(&mut self) -> ServResult<()> {
        if self.config.listens.is_empty() {
            return Err(ServError::NoListenAddrs);
        }
        let listens = self.config.listens.clone();
        for listen in &listens {
            self.open_listen_socket(listen.ip, listen.port)?;
        }
        Ok(())
    }

    fn open_listen_socket(&mut self, ip: Ipv4Addr, port: u16) -> ServResult<()> {
        let fd = sock::tcp_socket()?;
        let local = match Self::prepare(fd, ip, port) {
            Ok(local) => local,
            Err(e) => {
                sock::close(fd);
                return Err(e);
            }
        };
        log_info!("{}: listening on {} (fd {})", self.config.display_name(), local, fd);
        self.listen_fds.push(fd);
        self.bound.push(local);
        Ok(())
    }

    fn prepare(fd: RawFd, ip: Ipv4Addr, port: u16) -> ServResult<SocketAddrV4> {
        sock::set_reuse_addr(fd)?;
        sock::bind_ipv4(fd, ip, port)?;
        sock::set_nonblocking(fd)?;
        sock::listen(fd)?;
        sock::local_addr(fd)
    }

    /// Accept one connection, bound to this host's configuration for its
    /// whole lifetime.
    pub fn accept_on(&mut self, listen_fd: RawFd) -> ServResult<RawFd> {
        self.table.accept_client(listen_fd, &self.config)
    }

    pub fn handle_event(&mut self, fd: RawFd, revents: i16) -> DispatchOutcome {
        self.table.dispatch(fd, revents)
    }

    pub fn remove_conn(&mut self, fd: RawFd) {
        self.table.remove(fd);
    }

    pub fn listen_fds(&self) -> &[RawFd] {
        &self.listen_fds
    }

    pub fn bound_addrs(&self) -> &[SocketAddrV4] {
        &self.bound
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    pub fn connection_count(&self) -> usize {
        self.table.len()
    }

    /// Close every listening socket and drop every connection. Safe to
    /// call more than once.
    pub fn teardown(&mut self) {
        for fd in self.listen_fds.drain(..) {
            sock::close(fd);
            log_info!("closed listening socket fd {}", fd);
        }
        self.bound.clear();
        self.table.teardown();
    }
}

impl Drop for VirtualHost {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpStream;

    fn host_on_localhost() -> VirtualHost {
        let mut config = ServerConfig::default();
        config.add_listen(vhostd_core::ListenConfig { ip: Ipv4Addr::LOCALHOST, port: 0 });
        let mut host = VirtualHost::new(config);
        host.setup().unwrap();
        host
    }

    #[test]
    fn setup_requires_listen_entries() {
        let mut host = VirtualHost::new(ServerConfig::default());
        assert_eq!(host.setup(), Err(ServError::NoListenAddrs));
        assert!(host.listen_fds().is_empty());
    }

    #[test]
    fn setup_binds_and_reports_real_port() {
        let host = host_on_localhost();
        assert_eq!(host.listen_fds().len(), 1);
        let addr = host.bound_addrs()[0];
        assert_eq!(*addr.ip(), Ipv4Addr::LOCALHOST);
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn setup_fails_fast_on_unbindable_address() {
        let mut config = ServerConfig::default();
        // 203.0.113.1 is TEST-NET-3, not a local interface: bind must fail
        config.add_listen(vhostd_core::ListenConfig {
            ip: Ipv4Addr::new(203, 0, 113, 1),
            port: 0,
        });
        let mut host = VirtualHost::new(config);
        assert!(matches!(host.setup(), Err(ServError::SocketSetup { op: "bind", .. })));
        assert!(host.listen_fds().is_empty(), "failed setup must not keep sockets");
    }

    #[test]
    fn accepts_one_pending_connection() {
        let mut host = host_on_localhost();
        let addr = host.bound_addrs()[0];
        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"x").unwrap();

        let listen_fd = host.listen_fds()[0];
        let conn_fd = host.accept_on(listen_fd).unwrap();
        assert!(conn_fd >= 0);
        assert_eq!(host.connection_count(), 1);

        host.remove_conn(conn_fd);
        assert_eq!(host.connection_count(), 0);
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut host = host_on_localhost();
        host.teardown();
        assert!(host.listen_fds().is_empty());
        host.teardown();
    }
}

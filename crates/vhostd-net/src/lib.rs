//! # vhostd-net — the readiness-multiplexed server core
//!
//! Single process, single thread, one blocking `poll(2)` call per loop
//! iteration. Leaf to root:
//!
//! - [`conn::Connection`] — per-fd read/write state machine: frames
//!   requests out of arbitrarily fragmented reads, drains responses
//!   across arbitrarily fragmented writes
//! - [`registry::ConnectionTable`] — owner of one virtual host's live
//!   connections: accept, dispatch, teardown
//! - [`listener::VirtualHost`] — one configured host: its listening
//!   sockets plus its table
//! - [`reactor::Server`] — all hosts, the flattened interest list and
//!   the run loop
//!
//! Every socket is non-blocking; concurrency is purely the interleaving
//! of readiness events inside one loop iteration.

pub mod conn;
pub mod listener;
pub mod reactor;
pub mod registry;
pub mod signal;
pub mod sock;

pub use conn::Connection;
pub use listener::VirtualHost;
pub use reactor::Server;
pub use registry::{ConnectionTable, DispatchOutcome};

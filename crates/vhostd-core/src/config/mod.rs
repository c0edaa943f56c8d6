//! Virtual-host configuration model
//!
//! One [`ServerConfig`] per `server { ... }` block in the configuration
//! file. Connections hold a shared read-only reference to the block that
//! owns their listening socket for their whole lifetime, so everything in
//! here is immutable after parsing.

mod parse;

pub use parse::{load, parse_str};

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Default cap on a request body, in bytes (1 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// One `listen` directive: an IPv4 address plus port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenConfig {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl ListenConfig {
    /// Parse `"8080"` or `"127.0.0.1:8080"`. A bare port listens on all
    /// interfaces.
    pub fn parse(addr: &str) -> Result<Self, ConfigError> {
        let (host, port) = match addr.rsplit_once(':') {
            Some((host, port)) => (host, port),
            None => ("0.0.0.0", addr),
        };
        let ip: Ipv4Addr = host
            .parse()
            .map_err(|_| ConfigError::InvalidValue { line: 0, what: format!("listen address '{}'", host) })?;
        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::InvalidValue { line: 0, what: format!("listen port '{}'", port) })?;
        Ok(Self { ip, port })
    }
}

impl std::fmt::Display for ListenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// One `location /path { ... }` block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationConfig {
    /// URI prefix this block applies to
    pub path: String,
    /// Filesystem root; falls back to the server root when unset
    pub root: Option<PathBuf>,
    /// Index file names tried for directory requests
    pub indexes: Vec<String>,
    /// Emit a generated listing for directories with no index file
    pub autoindex: bool,
    /// Methods accepted here; empty means no restriction
    pub allowed_methods: Vec<String>,
    /// Redirect status -> target; the lowest status wins
    pub redirects: BTreeMap<u16, String>,
}

impl LocationConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Self::default() }
    }

    /// Structural checks applied after a block is parsed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.is_empty() {
            return Err(ConfigError::EmptyField("location path"));
        }
        if !self.path.starts_with('/') {
            return Err(ConfigError::InvalidLocationPath(self.path.clone()));
        }
        if let Some(root) = &self.root {
            if root.as_os_str().is_empty() {
                return Err(ConfigError::EmptyField("location root"));
            }
        }
        for idx in &self.indexes {
            if idx.is_empty() {
                return Err(ConfigError::EmptyField("index file name"));
            }
        }
        for method in &self.allowed_methods {
            if !is_known_method(method) {
                return Err(ConfigError::InvalidMethod(method.clone()));
            }
        }
        for (&code, target) in &self.redirects {
            if !(300..=599).contains(&code) {
                return Err(ConfigError::InvalidRedirectCode(code));
            }
            if target.is_empty() {
                return Err(ConfigError::EmptyField("redirect target"));
            }
        }
        Ok(())
    }

    /// Copy of this location with root and indexes inherited from the
    /// server block where unset.
    pub fn effective(&self, server: &ServerConfig) -> LocationConfig {
        let mut result = self.clone();
        if result.root.is_none() {
            result.root = Some(server.root.clone());
        }
        if result.indexes.is_empty() {
            result.indexes = server.indexes.clone();
        }
        result
    }

    /// Synthetic location used when no configured block matches a path.
    pub fn root_fallback(server: &ServerConfig) -> LocationConfig {
        LocationConfig {
            path: "/".to_string(),
            root: Some(server.root.clone()),
            indexes: server.indexes.clone(),
            ..LocationConfig::default()
        }
    }
}

fn is_known_method(method: &str) -> bool {
    matches!(method, "GET" | "POST" | "DELETE")
}

/// One `server { ... }` block: a virtual host
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub server_name: String,
    /// Listen addresses, deduplicated in directive order
    pub listens: Vec<ListenConfig>,
    pub root: PathBuf,
    pub indexes: Vec<String>,
    /// Declared request bodies above this are answered with 413
    pub client_max_body_size: usize,
    /// Status code -> error page path, relative to the server root
    pub error_pages: BTreeMap<u16, PathBuf>,
    pub locations: Vec<LocationConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: String::new(),
            listens: Vec::new(),
            root: PathBuf::from("www"),
            indexes: vec!["index.html".to_string()],
            client_max_body_size: DEFAULT_MAX_BODY_SIZE,
            error_pages: BTreeMap::new(),
            locations: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Add a listen address, skipping duplicates.
    pub fn add_listen(&mut self, listen: ListenConfig) {
        if !self.listens.contains(&listen) {
            self.listens.push(listen);
        }
    }

    /// The configured location with the longest prefix matching `path`.
    pub fn location_for(&self, path: &str) -> Option<&LocationConfig> {
        self.locations
            .iter()
            .filter(|loc| path.starts_with(loc.path.as_str()))
            .max_by_key(|loc| loc.path.len())
    }

    /// Display name for logs.
    pub fn display_name(&self) -> &str {
        if self.server_name.is_empty() { "server" } else { &self.server_name }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyField("server root"));
        }
        for idx in &self.indexes {
            if idx.is_empty() {
                return Err(ConfigError::EmptyField("index file name"));
            }
        }
        for (&code, page) in &self.error_pages {
            if !(300..=599).contains(&code) {
                return Err(ConfigError::InvalidRedirectCode(code));
            }
            if page.as_os_str().is_empty() {
                return Err(ConfigError::EmptyField("error page path"));
            }
        }
        for loc in &self.locations {
            loc.validate()?;
        }
        Ok(())
    }
}

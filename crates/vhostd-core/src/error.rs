//! Error types for the vhostd server

use core::fmt;
use std::io;

/// Result type for server operations
pub type ServResult<T> = Result<T, ServError>;

/// Errors that can occur while bringing up or running the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServError {
    /// Configuration file could not be loaded or parsed
    Config(ConfigError),

    /// A server block has no listen directives
    NoListenAddrs,

    /// A socket setup step failed (operation name + errno)
    SocketSetup { op: &'static str, errno: i32 },

    /// accept() on a listening socket failed
    AcceptFailed(i32),

    /// A socket could not be switched to non-blocking mode
    NonBlockingFailed(i32),

    /// Installing a signal handler failed
    SignalSetup(i32),
}

impl fmt::Display for ServError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServError::Config(e) => write!(f, "configuration error: {}", e),
            ServError::NoListenAddrs => {
                write!(f, "no listen directives in server configuration")
            }
            ServError::SocketSetup { op, errno } => {
                write!(f, "{}() failed: {}", op, io::Error::from_raw_os_error(*errno))
            }
            ServError::AcceptFailed(errno) => {
                write!(f, "accept() failed: {}", io::Error::from_raw_os_error(*errno))
            }
            ServError::NonBlockingFailed(errno) => write!(
                f,
                "could not set socket non-blocking: {}",
                io::Error::from_raw_os_error(*errno)
            ),
            ServError::SignalSetup(errno) => write!(
                f,
                "signal handler installation failed: {}",
                io::Error::from_raw_os_error(*errno)
            ),
        }
    }
}

impl std::error::Error for ServError {}

impl From<ConfigError> for ServError {
    fn from(e: ConfigError) -> Self {
        ServError::Config(e)
    }
}

/// Errors raised by the configuration loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration file could not be read
    Read(String),

    /// Tokenizer or block structure error
    Syntax { line: usize, what: String },

    /// A directive name not known at this scope
    UnknownDirective { line: usize, name: String },

    /// A directive argument that does not parse
    InvalidValue { line: usize, what: String },

    /// Location path missing its leading '/'
    InvalidLocationPath(String),

    /// HTTP method outside GET/POST/DELETE
    InvalidMethod(String),

    /// Redirect status outside 300..=599
    InvalidRedirectCode(u16),

    /// A field that must not be empty
    EmptyField(&'static str),

    /// The file parsed but produced no server blocks
    Empty,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read(path) => write!(f, "cannot read {}", path),
            ConfigError::Syntax { line, what } => write!(f, "line {}: {}", line, what),
            ConfigError::UnknownDirective { line, name } => {
                write!(f, "line {}: unknown directive '{}'", line, name)
            }
            ConfigError::InvalidValue { line, what } => {
                write!(f, "line {}: invalid value for {}", line, what)
            }
            ConfigError::InvalidLocationPath(p) => {
                write!(f, "location path must start with '/': '{}'", p)
            }
            ConfigError::InvalidMethod(m) => write!(f, "invalid HTTP method: '{}'", m),
            ConfigError::InvalidRedirectCode(c) => {
                write!(f, "redirect status {} outside 300..=599", c)
            }
            ConfigError::EmptyField(name) => write!(f, "{} cannot be empty", name),
            ConfigError::Empty => write!(f, "no server configurations found"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = ServError::NoListenAddrs;
        assert_eq!(format!("{}", e), "no listen directives in server configuration");

        let e = ServError::Config(ConfigError::Empty);
        assert_eq!(format!("{}", e), "configuration error: no server configurations found");
    }

    #[test]
    fn test_error_conversion() {
        let cfg_err = ConfigError::InvalidMethod("PATCH".into());
        let serv_err: ServError = cfg_err.into();
        assert!(matches!(serv_err, ServError::Config(ConfigError::InvalidMethod(_))));
    }

    #[test]
    fn test_errno_display() {
        let e = ServError::SocketSetup { op: "bind", errno: libc_eaddrinuse() };
        let text = format!("{}", e);
        assert!(text.starts_with("bind() failed:"));
    }

    fn libc_eaddrinuse() -> i32 {
        // EADDRINUSE is 98 on Linux; the display path only needs a real errno
        98
    }
}

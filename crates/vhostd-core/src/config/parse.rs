//! Configuration file parser
//!
//! Brace-block format, one `server { ... }` block per virtual host:
//!
//! ```text
//! server {
//!     listen 127.0.0.1:8080;
//!     server_name example.local;
//!     root ./www;
//!     index index.html index.htm;
//!     client_max_body_size 1m;
//!     error_page 404 /errors/404.html;
//!
//!     location /static {
//!         autoindex on;
//!         allow_methods GET;
//!     }
//! }
//! ```
//!
//! `#` starts a comment running to end of line. Parsing is strict:
//! unknown directives, malformed values and unbalanced braces are errors,
//! and a file with no server blocks is an error (the server refuses to
//! start with nothing to serve).

use std::fs;
use std::path::PathBuf;

use crate::error::ConfigError;

use super::{ListenConfig, LocationConfig, ServerConfig};

/// Load and parse a configuration file.
pub fn load(path: &str) -> Result<Vec<ServerConfig>, ConfigError> {
    let src = fs::read_to_string(path).map_err(|_| ConfigError::Read(path.to_string()))?;
    parse_str(&src)
}

/// Parse configuration text.
pub fn parse_str(src: &str) -> Result<Vec<ServerConfig>, ConfigError> {
    let tokens = tokenize(src);
    let mut parser = Parser { tokens, pos: 0 };
    let mut configs = Vec::new();

    while let Some(tok) = parser.peek() {
        if tok.text != "server" {
            return Err(ConfigError::Syntax {
                line: tok.line,
                what: format!("expected 'server', found '{}'", tok.text),
            });
        }
        parser.advance();
        configs.push(parser.parse_server_block()?);
    }

    if configs.is_empty() {
        return Err(ConfigError::Empty);
    }
    Ok(configs)
}

#[derive(Debug)]
struct Token {
    text: String,
    line: usize,
}

fn tokenize(src: &str) -> Vec<Token> {
    let mut out = Vec::new();
    for (i, raw) in src.lines().enumerate() {
        let line = i + 1;
        let text = raw.split('#').next().unwrap_or("");
        let mut word = String::new();
        for ch in text.chars() {
            match ch {
                '{' | '}' | ';' => {
                    if !word.is_empty() {
                        out.push(Token { text: std::mem::take(&mut word), line });
                    }
                    out.push(Token { text: ch.to_string(), line });
                }
                c if c.is_whitespace() => {
                    if !word.is_empty() {
                        out.push(Token { text: std::mem::take(&mut word), line });
                    }
                }
                c => word.push(c),
            }
        }
        if !word.is_empty() {
            out.push(Token { text: word, line });
        }
    }
    out
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn last_line(&self) -> usize {
        self.tokens.last().map(|t| t.line).unwrap_or(0)
    }

    fn expect(&mut self, sym: &str) -> Result<usize, ConfigError> {
        match self.advance() {
            Some(tok) if tok.text == sym => Ok(tok.line),
            Some(tok) => Err(ConfigError::Syntax {
                line: tok.line,
                what: format!("expected '{}', found '{}'", sym, tok.text),
            }),
            None => Err(ConfigError::Syntax {
                line: self.last_line(),
                what: format!("expected '{}', found end of file", sym),
            }),
        }
    }

    /// Arguments of a simple directive, up to the terminating ';'.
    fn arguments(&mut self, directive: &str, line: usize) -> Result<Vec<String>, ConfigError> {
        let mut args = Vec::new();
        loop {
            match self.advance() {
                Some(tok) if tok.text == ";" => break,
                Some(tok) if tok.text == "{" || tok.text == "}" => {
                    return Err(ConfigError::Syntax {
                        line: tok.line,
                        what: format!("'{}' is missing its ';'", directive),
                    });
                }
                Some(tok) => args.push(tok.text.clone()),
                None => {
                    return Err(ConfigError::Syntax {
                        line: self.last_line(),
                        what: format!("'{}' is missing its ';'", directive),
                    });
                }
            }
        }
        if args.is_empty() {
            return Err(ConfigError::Syntax {
                line,
                what: format!("'{}' needs at least one argument", directive),
            });
        }
        Ok(args)
    }

    fn parse_server_block(&mut self) -> Result<ServerConfig, ConfigError> {
        self.expect("{")?;
        let mut cfg = ServerConfig::default();
        cfg.indexes.clear();

        loop {
            let (name, line) = match self.advance() {
                Some(tok) if tok.text == "}" => break,
                Some(tok) => (tok.text.clone(), tok.line),
                None => {
                    return Err(ConfigError::Syntax {
                        line: self.last_line(),
                        what: "unterminated server block".to_string(),
                    });
                }
            };

            match name.as_str() {
                "listen" => {
                    for arg in self.arguments("listen", line)? {
                        let listen = ListenConfig::parse(&arg).map_err(|e| at_line(e, line))?;
                        cfg.add_listen(listen);
                    }
                }
                "server_name" => {
                    cfg.server_name = self.arguments("server_name", line)?.remove(0);
                }
                "root" => {
                    cfg.root = PathBuf::from(self.arguments("root", line)?.remove(0));
                }
                "index" => {
                    for arg in self.arguments("index", line)? {
                        if !cfg.indexes.contains(&arg) {
                            cfg.indexes.push(arg);
                        }
                    }
                }
                "client_max_body_size" => {
                    let arg = self.arguments("client_max_body_size", line)?.remove(0);
                    cfg.client_max_body_size = parse_size(&arg, line)?;
                }
                "error_page" => {
                    let args = self.arguments("error_page", line)?;
                    if args.len() != 2 {
                        return Err(ConfigError::Syntax {
                            line,
                            what: "'error_page' takes a status code and a path".to_string(),
                        });
                    }
                    let code: u16 = args[0].parse().map_err(|_| ConfigError::InvalidValue {
                        line,
                        what: format!("error_page status '{}'", args[0]),
                    })?;
                    cfg.error_pages.insert(code, PathBuf::from(&args[1]));
                }
                "location" => {
                    cfg.locations.push(self.parse_location_block(line)?);
                }
                other => {
                    return Err(ConfigError::UnknownDirective { line, name: other.to_string() });
                }
            }
        }

        if cfg.indexes.is_empty() {
            cfg.indexes.push("index.html".to_string());
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn parse_location_block(&mut self, line: usize) -> Result<LocationConfig, ConfigError> {
        let path = match self.advance() {
            Some(tok) if tok.text != "{" && tok.text != "}" && tok.text != ";" => tok.text.clone(),
            _ => {
                return Err(ConfigError::Syntax {
                    line,
                    what: "'location' needs a path before its block".to_string(),
                });
            }
        };
        self.expect("{")?;

        let mut loc = LocationConfig::new(path);
        loop {
            let (name, line) = match self.advance() {
                Some(tok) if tok.text == "}" => break,
                Some(tok) => (tok.text.clone(), tok.line),
                None => {
                    return Err(ConfigError::Syntax {
                        line: self.last_line(),
                        what: "unterminated location block".to_string(),
                    });
                }
            };

            match name.as_str() {
                "root" => {
                    loc.root = Some(PathBuf::from(self.arguments("root", line)?.remove(0)));
                }
                "index" => {
                    for arg in self.arguments("index", line)? {
                        if !loc.indexes.contains(&arg) {
                            loc.indexes.push(arg);
                        }
                    }
                }
                "autoindex" => {
                    let arg = self.arguments("autoindex", line)?.remove(0);
                    loc.autoindex = match arg.as_str() {
                        "on" => true,
                        "off" => false,
                        other => {
                            return Err(ConfigError::InvalidValue {
                                line,
                                what: format!("autoindex '{}'", other),
                            });
                        }
                    };
                }
                "allow_methods" => {
                    for arg in self.arguments("allow_methods", line)? {
                        if !loc.allowed_methods.contains(&arg) {
                            loc.allowed_methods.push(arg);
                        }
                    }
                }
                "return" => {
                    let args = self.arguments("return", line)?;
                    if args.len() != 2 {
                        return Err(ConfigError::Syntax {
                            line,
                            what: "'return' takes a status code and a target".to_string(),
                        });
                    }
                    let code: u16 = args[0].parse().map_err(|_| ConfigError::InvalidValue {
                        line,
                        what: format!("return status '{}'", args[0]),
                    })?;
                    loc.redirects.insert(code, args[1].clone());
                }
                other => {
                    return Err(ConfigError::UnknownDirective { line, name: other.to_string() });
                }
            }
        }
        Ok(loc)
    }
}

/// `1048576`, `64k` or `1m`.
fn parse_size(s: &str, line: usize) -> Result<usize, ConfigError> {
    let err = || ConfigError::InvalidValue { line, what: format!("client_max_body_size '{}'", s) };
    let (digits, unit): (&str, usize) = match s.as_bytes().last() {
        Some(b'k') | Some(b'K') => (&s[..s.len() - 1], 1024),
        Some(b'm') | Some(b'M') => (&s[..s.len() - 1], 1024 * 1024),
        _ => (s, 1),
    };
    let n: usize = digits.parse().map_err(|_| err())?;
    Ok(n * unit)
}

fn at_line(e: ConfigError, line: usize) -> ConfigError {
    match e {
        ConfigError::InvalidValue { what, .. } => ConfigError::InvalidValue { line, what },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const SAMPLE: &str = r#"
# test configuration
server {
    listen 127.0.0.1:8080;
    listen 8081;
    server_name example.local;
    root ./www;
    index index.html index.htm;
    client_max_body_size 64k;
    error_page 404 /errors/404.html;

    location /static {
        autoindex on;
        allow_methods GET;
    }

    location /old {
        return 301 /new;
    }
}

server {
    listen 9090;
    root /srv/other;
}
"#;

    #[test]
    fn parses_two_servers() {
        let configs = parse_str(SAMPLE).unwrap();
        assert_eq!(configs.len(), 2);

        let first = &configs[0];
        assert_eq!(first.server_name, "example.local");
        assert_eq!(first.listens.len(), 2);
        assert_eq!(first.listens[0].ip, Ipv4Addr::LOCALHOST);
        assert_eq!(first.listens[0].port, 8080);
        assert_eq!(first.listens[1].port, 8081);
        assert_eq!(first.client_max_body_size, 64 * 1024);
        assert_eq!(first.indexes, vec!["index.html".to_string(), "index.htm".to_string()]);
        assert_eq!(
            first.error_pages.get(&404).map(|p| p.to_string_lossy().into_owned()),
            Some("/errors/404.html".to_string())
        );
        assert_eq!(first.locations.len(), 2);
        assert!(first.locations[0].autoindex);
        assert_eq!(first.locations[1].redirects.get(&301).map(String::as_str), Some("/new"));

        let second = &configs[1];
        assert!(second.server_name.is_empty());
        assert_eq!(second.listens[0].port, 9090);
        // defaults kept where the block is silent
        assert_eq!(second.indexes, vec!["index.html".to_string()]);
    }

    #[test]
    fn empty_input_is_fatal() {
        assert!(matches!(parse_str(""), Err(ConfigError::Empty)));
        assert!(matches!(parse_str("# only a comment\n"), Err(ConfigError::Empty)));
    }

    #[test]
    fn unknown_directive_rejected() {
        let src = "server { listen 8080; frobnicate yes; }";
        assert!(matches!(parse_str(src), Err(ConfigError::UnknownDirective { .. })));
    }

    #[test]
    fn missing_semicolon_rejected() {
        let src = "server { listen 8080 }";
        assert!(matches!(parse_str(src), Err(ConfigError::Syntax { .. })));
    }

    #[test]
    fn unterminated_block_rejected() {
        let src = "server { listen 8080;";
        assert!(matches!(parse_str(src), Err(ConfigError::Syntax { .. })));
    }

    #[test]
    fn bad_method_rejected() {
        let src = "server { listen 8080; location / { allow_methods TRACE; } }";
        assert!(matches!(parse_str(src), Err(ConfigError::InvalidMethod(_))));
    }

    #[test]
    fn size_suffixes() {
        assert_eq!(parse_size("123", 1).unwrap(), 123);
        assert_eq!(parse_size("2k", 1).unwrap(), 2048);
        assert_eq!(parse_size("1M", 1).unwrap(), 1024 * 1024);
        assert!(parse_size("tiny", 1).is_err());
    }

    #[test]
    fn load_missing_file() {
        assert!(matches!(load("/nonexistent/vhostd.conf"), Err(ConfigError::Read(_))));
    }
}

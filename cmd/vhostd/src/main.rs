//! vhostd — single-threaded virtual-host HTTP server
//!
//! One process, one thread, one poll loop. Every `server { ... }` block
//! in the configuration file becomes a virtual host with its own
//! listening sockets and its own connection table.
//!
//! Usage:
//!     vhostd [--config <path>] [<path>]
//!
//! The configuration path defaults to `vhostd.conf`. SIGINT or SIGQUIT
//! shuts the server down gracefully.

use std::process;

use vhostd_core::error::ServResult;
use vhostd_core::{config, log_error, log_info, vlog};
use vhostd_net::{signal, Server};

const DEFAULT_CONFIG: &str = "vhostd.conf";

fn main() {
    vlog::init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path = DEFAULT_CONFIG.to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("vhostd: --config needs a path");
                    process::exit(2);
                }
                config_path = args[i].clone();
            }
            "--help" | "-h" => {
                print_usage();
                return;
            }
            other if other.starts_with('-') => {
                eprintln!("vhostd: unknown option '{}'", other);
                print_usage();
                process::exit(2);
            }
            other => config_path = other.to_string(),
        }
        i += 1;
    }

    if let Err(e) = serve(&config_path) {
        log_error!("{}", e);
        process::exit(1);
    }
}

fn serve(config_path: &str) -> ServResult<()> {
    let configs = config::load(config_path)?;
    log_info!("loaded {} server configuration(s) from {}", configs.len(), config_path);

    signal::install_handlers()?;

    let mut server = Server::new(configs)?;
    server.run();

    log_info!("shutdown complete");
    Ok(())
}

fn print_usage() {
    println!("Usage: vhostd [--config <path>] [<path>]");
    println!();
    println!("Options:");
    println!("  -c, --config <path>  configuration file (default: {})", DEFAULT_CONFIG);
    println!("  -h, --help           show this help");
    println!();
    println!("Environment:");
    println!("  VHOSTD_LOG_LEVEL     off, error, warn, info, debug, trace");
    println!("  VHOSTD_LOG_FLUSH     flush stderr after every line");
}

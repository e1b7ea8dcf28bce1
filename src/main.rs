//! waycore - Main entry point
//!
//! Headless Wayland server: listens on a socket in `$XDG_RUNTIME_DIR` and
//! runs the protocol core against the null render backend.

use std::env;
use std::path::PathBuf;
use std::process;

use waycore::backend::{self, NullBackend};
use waycore::connection::Listener;
use waycore::security::SecurityPolicy;
use waycore::server::{Server, ServerConfig};
use waycore::VERSION;

fn print_usage() {
    println!("waycore v{}", VERSION);
    println!("A Wayland display-server protocol core");
    println!();
    println!("Usage: waycore [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -socket <name>        Socket name in $XDG_RUNTIME_DIR (default: first free wayland-N)");
    println!("  -security <level>     Security level: permissive, default, strict");
    println!("  -allow-uid <uid>      Admit clients running as <uid> (repeatable)");
    println!("  -allow-gid <gid>      Admit clients in group <gid> (repeatable)");
    println!("  -max-clients <n>      Maximum simultaneous clients (0 = unlimited)");
    println!("  -max-message-size <n> Largest accepted request in bytes");
    println!("  -keymap <path>        xkb keymap file handed to keyboards");
    println!("  -seat <name>          Seat name (default: seat0)");
    println!("  -list-backends        List available backends");
    println!("  -h, --help            Show this help message");
    println!();
    println!("Examples:");
    println!("  waycore -socket wayland-1");
    println!("  waycore -security strict -allow-uid 1000 -keymap us.xkb");
    println!();
}

fn list_backends() {
    println!("Available backends:");
    for backend in backend::available_backends() {
        println!("  - {}", backend);
    }
}

#[derive(Debug)]
struct Config {
    socket: Option<String>,
    security: SecurityPolicy,
    allow_uids: Vec<u32>,
    allow_gids: Vec<u32>,
    max_clients: Option<usize>,
    max_message_size: Option<usize>,
    keymap: Option<PathBuf>,
    seat: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            socket: None,
            security: SecurityPolicy::default(),
            allow_uids: Vec::new(),
            allow_gids: Vec::new(),
            max_clients: None,
            max_message_size: None,
            keymap: None,
            seat: None,
        }
    }
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, String> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing value for {}", flag))
}

fn number<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> Result<T, String> {
    let raw = value(args, i, flag)?;
    raw.parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, raw))
}

fn parse_args() -> Result<Config, String> {
    let mut config = Config::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;

    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-list-backends" => {
                list_backends();
                process::exit(0);
            }
            "-socket" => {
                i += 1;
                config.socket = Some(value(&args, i, flag)?.to_string());
            }
            "-security" => {
                i += 1;
                let level = value(&args, i, flag)?;
                config.security = SecurityPolicy::from_level(level)
                    .ok_or_else(|| format!("Invalid security level: {}", level))?;
            }
            "-allow-uid" => {
                i += 1;
                config.allow_uids.push(number(&args, i, flag)?);
            }
            "-allow-gid" => {
                i += 1;
                config.allow_gids.push(number(&args, i, flag)?);
            }
            "-max-clients" => {
                i += 1;
                config.max_clients = Some(number(&args, i, flag)?);
            }
            "-max-message-size" => {
                i += 1;
                config.max_message_size = Some(number(&args, i, flag)?);
            }
            "-keymap" => {
                i += 1;
                config.keymap = Some(PathBuf::from(value(&args, i, flag)?));
            }
            "-seat" => {
                i += 1;
                config.seat = Some(value(&args, i, flag)?.to_string());
            }
            arg => {
                return Err(format!("Unknown option: {}", arg));
            }
        }
        i += 1;
    }

    // Flags refine whichever level was chosen, regardless of their order
    config.security.allowed_uids.extend(&config.allow_uids);
    config.security.allowed_gids.extend(&config.allow_gids);
    if let Some(max) = config.max_clients {
        config.security.max_clients = max;
    }
    if let Some(size) = config.max_message_size {
        config.security.max_message_size = size;
    }

    Ok(config)
}

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    log::info!("waycore v{}", VERSION);
    log::info!(
        "Security policy: max_clients={}, max_objects_per_client={}, max_message_size={}",
        config.security.max_clients,
        config.security.max_objects_per_client,
        config.security.max_message_size
    );

    let mut server_config = ServerConfig {
        keymap: config.keymap,
        ..ServerConfig::default()
    };
    if let Some(seat) = config.seat {
        server_config.seat_name = seat;
    }

    let backend = Box::new(NullBackend::new());
    let mut server = match Server::new(backend, config.security, server_config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: Failed to initialize server: {}", e);
            process::exit(1);
        }
    };

    let listener = match &config.socket {
        Some(name) => Listener::bind(name),
        None => Listener::bind_auto(),
    };
    match listener {
        Ok(listener) => {
            println!("WAYLAND_DISPLAY={}", listener.name());
            server.attach_listener(listener);
        }
        Err(e) => {
            eprintln!("Error: Failed to create listening socket: {}", e);
            process::exit(1);
        }
    }

    if let Err(e) = server.run() {
        log::error!("Server stopped: {}", e);
        process::exit(1);
    }
}

//!
//! alcove server binary
//! --------------------
//! Command-line entry point for the alcove HTTP server. Configuration comes
//! from `ALCOVE_*` environment variables; CLI flags override them.

use anyhow::Result;
use std::env;

fn parse_port_arg(args: &[String], flag: &str) -> Option<u16> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return args[i + 1].parse::<u16>().ok();
        }
        i += 1;
    }
    None
}

fn parse_value_arg(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            if i + 1 < args.len() {
                return Some(args[i + 1].clone());
            }
            return None;
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    println!(
        r"        __
  ____ _/ /________ _   _____
 / __ `/ / ___/ __ \ | / / _ \
/ /_/ / / /__/ /_/ / |/ /  __/
\__,_/_/\___/\____/|___/\___/  "
    );

    // Initialize tracing subscriber with env filter if provided
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("alcove Server\n\nUSAGE:\n  alcove_server [--http-port N] [--media-root PATH] [--db-path PATH]\n\nOPTIONS:\n  --http-port N       HTTP API port (env: ALCOVE_HTTP_PORT, default 5002)\n  --media-root PATH   Root of the browsable media tree (env: ALCOVE_MEDIA_ROOT, default media)\n  --db-path PATH      SQLite database file (env: ALCOVE_DB_PATH, default alcove.db)\n\nALCOVE_SECRET_KEY must always be set; reset tokens are signed with it.\n");
        return Ok(());
    }

    let mut config = alcove::config::Config::from_env()?;

    // CLI arguments override environment
    if let Some(port) = parse_port_arg(&args, "--http-port") {
        config.http_port = port;
    }
    if let Some(root) = parse_value_arg(&args, "--media-root") {
        config.media_root = root.into();
    }
    if let Some(path) = parse_value_arg(&args, "--db-path") {
        config.db_path = path.into();
    }

    println!(
        "alcove starting: http={}, media_root={}, db={}",
        config.http_port,
        config.media_root.display(),
        config.db_path.display()
    );

    alcove::server::run(config).await
}

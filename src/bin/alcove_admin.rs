//!
//! alcove admin binary
//! -------------------
//! Offline maintenance tool for an alcove database: initialise it, provision
//! users and roles, and eagerly scan the media tree into the mirror. The
//! server itself reconciles directories lazily on read; `scan` is for warming
//! a fresh database or checking what a tree contains.

use std::env;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};

use alcove::auth::AuthService;
use alcove::config::Config;
use alcove::mail::Mailer;
use alcove::mirror::Mirror;
use alcove::store::Store;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} init        [--db-path PATH]\n  {program} scan        [--db-path PATH] [--media-root PATH]\n  {program} add-user    --email E --username U --password P [--role NAME]... [--db-path PATH]\n  {program} grant-role  --email E --role NAME [--db-path PATH]\n  {program} set-active  --email E --active true|false [--db-path PATH]\n\nFlags:\n  --db-path PATH      SQLite database file (env: ALCOVE_DB_PATH, default alcove.db)\n  --media-root PATH   Root of the media tree (env: ALCOVE_MEDIA_ROOT, default media)\n  --role NAME         Role to grant; repeatable. Seeded roles: Admin, Editor.\n  --active BOOL       true enables the account, false disables it.\n\nExamples:\n  {program} init --db-path alcove.db\n  {program} add-user --email admin@example.com --username admin --password 'S3cretpass' --role Admin\n  {program} scan --media-root /srv/media"
    );
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

fn parse_multi_arg(args: &[String], flag: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            out.push(args[i + 1].clone());
            i += 1;
        }
        i += 1;
    }
    out
}

fn required(args: &[String], flag: &str) -> Result<String> {
    parse_value_arg(args, flag).ok_or_else(|| anyhow!("{flag} is required"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let args: Vec<String> = env::args().collect();
    let program = args
        .first()
        .cloned()
        .unwrap_or_else(|| "alcove_admin".to_string());

    let Some(command) = args.get(1).cloned() else {
        print_usage(&program);
        bail!("missing command");
    };
    if command == "--help" || command == "-h" {
        print_usage(&program);
        return Ok(());
    }

    let db_path = parse_value_arg(&args, "--db-path")
        .or_else(|| env::var("ALCOVE_DB_PATH").ok())
        .unwrap_or_else(|| "alcove.db".to_string());
    let media_root = parse_value_arg(&args, "--media-root")
        .or_else(|| env::var("ALCOVE_MEDIA_ROOT").ok())
        .unwrap_or_else(|| "media".to_string());

    let store = Store::open(&db_path).await?;

    match command.as_str() {
        "init" => {
            // Store::open runs pending migrations, so there is nothing left to do.
            println!("database initialised at {db_path}");
        }
        "scan" => {
            let mirror = Mirror::new(media_root.clone().into(), store.clone());
            let report = mirror.scan_tree().await?;
            for (path, files) in &report {
                println!("{path}: {files} files");
            }
            println!("scanned {} directories under {media_root}", report.len());
        }
        "add-user" => {
            let email = required(&args, "--email")?;
            let username = required(&args, "--username")?;
            let password = required(&args, "--password")?;
            let roles = parse_multi_arg(&args, "--role");

            let config = Config::for_paths(&media_root, &db_path);
            let mailer = Arc::new(Mailer::from_config(&config));
            let auth = AuthService::new(store.clone(), &config, mailer);
            let user = auth.register(&email, &username, &password).await?;
            for role in &roles {
                store.grant_role(user.id, role).await?;
            }
            if roles.is_empty() {
                println!("created user {} (id {})", user.username, user.id);
            } else {
                println!(
                    "created user {} (id {}) with roles {}",
                    user.username,
                    user.id,
                    roles.join(", ")
                );
            }
        }
        "grant-role" => {
            let email = required(&args, "--email")?;
            let role = required(&args, "--role")?;
            let Some(user) = store.user_by_email(&email).await? else {
                bail!("no user with email {email}");
            };
            store.grant_role(user.id, &role).await?;
            println!("granted {role} to {email}");
        }
        "set-active" => {
            let email = required(&args, "--email")?;
            let active = match required(&args, "--active")?.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => bail!("--active must be true or false, got {other}"),
            };
            let Some(user) = store.user_by_email(&email).await? else {
                bail!("no user with email {email}");
            };
            store.set_user_active(user.id, active).await?;
            println!(
                "{} account {email}",
                if active { "enabled" } else { "disabled" }
            );
        }
        other => {
            print_usage(&program);
            bail!("unknown command: {other}");
        }
    }

    store.close().await;
    Ok(())
}

//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p lantern_server -- [--config server.json] [--addr 0.0.0.0:3000]
//!       [--port 3000] [--health-addr 0.0.0.0:8080] [--tick-ms 16]
//!       [--entities 5] [--seed 42] [--death-policy once|repeat_while_in_range]
//!
//! The `PORT` environment variable overrides the port of the session
//! address; explicit flags win over both the config file and `PORT`.
//! Ctrl-C stops accepting sessions, stops the tick and exits.

use std::{env, path::PathBuf};

use anyhow::Context;
use lantern_server::ServerRuntime;
use lantern_shared::config::ServerConfig;
use tracing::info;

fn parse_args() -> anyhow::Result<ServerConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => ServerConfig::from_json_file(&PathBuf::from(&args[i + 1]))?,
        _ => ServerConfig::default(),
    };

    if let Ok(port) = env::var("PORT") {
        let port: u16 = port.parse().context("parse PORT")?;
        cfg.set_port(port);
    }

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--port" if i + 1 < args.len() => {
                cfg.set_port(args[i + 1].parse().context("parse --port")?);
                i += 2;
            }
            "--health-addr" if i + 1 < args.len() => {
                cfg.health_addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--tick-ms" if i + 1 < args.len() => {
                cfg.tick_ms = args[i + 1].parse().unwrap_or(cfg.tick_ms);
                i += 2;
            }
            "--entities" if i + 1 < args.len() => {
                cfg.entity_count = args[i + 1].parse().unwrap_or(cfg.entity_count);
                i += 2;
            }
            "--seed" if i + 1 < args.len() => {
                cfg.seed = args[i + 1].parse().ok();
                i += 2;
            }
            "--death-policy" if i + 1 < args.len() => {
                cfg.death_policy = args[i + 1].parse().context("parse --death-policy")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        addr = %cfg.server_addr,
        health = ?cfg.health_addr,
        tick_ms = cfg.tick_ms,
        entities = cfg.entity_count,
        death_policy = ?cfg.death_policy,
        "Starting server"
    );

    let runtime = ServerRuntime::launch(cfg).await.context("launch server")?;
    info!(addr = %runtime.addr, "Server ready");

    tokio::signal::ctrl_c().await.context("listen for ctrl-c")?;
    info!("Shutdown requested");
    runtime.shutdown();
    runtime.join().await;
    info!("Server exited");
    Ok(())
}

//! Wandering bot.
//!
//! Usage:
//!   cargo run -p lantern_client --bin bot -- [--addr 127.0.0.1:3000] [--radius 3] [--seconds 60]
//!
//! Walks in a circle around its spawn point, flips its flashlight every few
//! seconds, says something now and then, and logs what happens to it.

use std::{env, net::SocketAddr, time::Duration};

use anyhow::Context;
use lantern_client::{GameClient, WorldMirror};
use lantern_shared::net::ServerMsg;
use tracing::info;

struct BotArgs {
    addr: SocketAddr,
    radius: f32,
    seconds: u64,
}

fn parse_args() -> anyhow::Result<BotArgs> {
    let mut addr = "127.0.0.1:3000".to_string();
    let mut radius = 3.0;
    let mut seconds = 60;
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                addr = args[i + 1].clone();
                i += 2;
            }
            "--radius" if i + 1 < args.len() => {
                radius = args[i + 1].parse().unwrap_or(radius);
                i += 2;
            }
            "--seconds" if i + 1 < args.len() => {
                seconds = args[i + 1].parse().unwrap_or(seconds);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(BotArgs {
        addr: addr.parse().context("parse --addr")?,
        radius,
        seconds,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args()?;
    let mut client = GameClient::connect(args.addr).await.context("connect")?;
    let mut mirror = WorldMirror::from_init(&client.init);
    let (cx, cy, cz) = match mirror.own_player() {
        Some(p) => (p.x, p.y, p.z),
        None => (0.0, 1.6, 0.0),
    };

    let step = Duration::from_millis(100);
    let steps = args.seconds * 10;
    let mut flashlight = false;

    for n in 0..steps {
        let angle = n as f32 * 0.05;
        client
            .send_move(
                cx + args.radius * angle.cos(),
                cy,
                cz + args.radius * angle.sin(),
                angle,
            )
            .await?;

        if n % 30 == 0 {
            flashlight = !flashlight;
            client.send_flashlight(flashlight).await?;
        }
        if n % 100 == 50 {
            client.send_chat("is anyone out there?").await?;
        }

        for msg in client.drain() {
            match &msg {
                ServerMsg::Damage(health) => info!(health, "Took damage"),
                ServerMsg::Death => info!("Died"),
                ServerMsg::ChatMessage(chat) => {
                    info!(from = %chat.username, message = %chat.message, "Chat")
                }
                ServerMsg::PlayerJoined(p) => info!(username = %p.username, "Player joined"),
                ServerMsg::PlayerLeft(id) => info!(session = %id, "Player left"),
                _ => {}
            }
            mirror.apply(&msg);
        }

        if n % 50 == 0 {
            info!(
                players = mirror.world.player_count(),
                updates = mirror.updates,
                health = mirror.own_player().map(|p| p.health),
                "Status"
            );
        }
        tokio::time::sleep(step).await;
    }

    client.close().await?;
    Ok(())
}

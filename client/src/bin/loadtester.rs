//! Opens several protocol-only connections and feeds the server random input.

use clap::Parser;
use client::input::random_keys;
use client::network::Connection;
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ClientInput, Message, DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to connect to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    /// Server port to connect to
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Number of simulated players
    #[arg(short, long, default_value = "5")]
    connections: usize,

    /// Milliseconds between two inputs of one player
    #[arg(short, long, default_value = "33")]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);
    let interval = Duration::from_millis(args.interval_ms);

    let mut players = Vec::with_capacity(args.connections);
    for i in 0..args.connections {
        info!("Launching player {}", i);
        let connection = Connection::connect(&addr).await?;
        players.push(tokio::spawn(run_player(connection, interval)));
    }

    tokio::select! {
        _ = join_players(players) => {
            info!("All players disconnected");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

async fn join_players(players: Vec<tokio::task::JoinHandle<()>>) {
    for player in players {
        if let Err(e) = player.await {
            error!("Player task failed: {}", e);
        }
    }
}

/// Sends one random input per interval until the connection goes away.
async fn run_player(connection: Connection, interval: Duration) {
    let id = connection.player_id();
    let mut rng = StdRng::from_entropy();
    let mut sequence = 0;
    let mut last_send = Instant::now();

    while !connection.is_closed() {
        let started = Instant::now();
        let elapsed = started - last_send;
        last_send = started;

        let input = ClientInput::new(id, sequence, random_keys(&mut rng), elapsed);
        if connection.send(Message::from(input)).is_err() {
            break;
        }
        sequence += 1;

        for message in connection.drain() {
            if let Message::WorldSnapshot(snapshot) = message {
                if let Some(me) = snapshot.entity(id) {
                    debug!(
                        "Player {} at ({:.1}, {:.1}), acked {} of {}",
                        id, me.position.x, me.position.y, me.last_acked_seq, sequence
                    );
                }
            }
        }

        sleep(interval.saturating_sub(started.elapsed())).await;
    }

    info!("Player {} disconnected after {} inputs", id, sequence);
}

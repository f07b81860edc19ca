use clap::Parser;
use log::{error, info};
use server::config::{InputLimits, ServerConfig};
use server::network::Server;
use shared::{DEFAULT_HOST, DEFAULT_PORT, MAX_DT_DIFF_MILLIS};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,
    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Tick rate (snapshots per second)
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,
    /// Longest step a single input may move for, in milliseconds
    #[arg(long, default_value = "50")]
    max_dt_ms: u64,
    /// How far an input's claimed duration may exceed the observed gap, in milliseconds
    #[arg(long, default_value_t = MAX_DT_DIFF_MILLIS)]
    max_dt_diff_ms: u64,
    /// Snapshots buffered per client before further ones are dropped
    #[arg(long, default_value = "64")]
    outbound_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = ServerConfig::default()
        .with_addr(format!("{}:{}", args.host, args.port))
        .with_tick_rate(args.tick_rate);
    config.limits = InputLimits {
        max_dt: Duration::from_millis(args.max_dt_ms),
        max_dt_diff: Duration::from_millis(args.max_dt_diff_ms),
    };
    config.outbound_capacity = args.outbound_capacity.max(1);

    info!(
        "Starting server at {} tick rate {}Hz",
        config.addr, args.tick_rate
    );

    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

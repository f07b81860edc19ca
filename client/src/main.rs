use clap::Parser;
use client::config::ClientConfig;
use client::input::{InputSource, RandomInput, ScriptedInput};
use client::network::{Client, Connection};
use client::rendering::LogRenderer;
use log::info;
use shared::{DEFAULT_HOST, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to connect to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    /// Server port to connect to
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Stop after this many frames (runs until disconnected if omitted)
    #[arg(short, long)]
    frames: Option<u64>,

    /// Press random keys instead of walking a square
    #[arg(short, long)]
    random: bool,

    /// Frames to hold each key state for
    #[arg(long, default_value = "30")]
    hold: u32,

    /// Log unit positions every this many frames (visible with RUST_LOG=debug)
    #[arg(long, default_value = "60")]
    log_every: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config =
        ClientConfig::default().with_server_addr(format!("{}:{}", args.host, args.port));

    info!("Connecting to: {}", config.server_addr);
    let connection = Connection::connect(&config.server_addr).await?;
    let renderer = LogRenderer::new(args.log_every);

    if args.random {
        let mut input = RandomInput::new(args.hold);
        if let Some(frames) = args.frames {
            input = input.with_frame_limit(frames);
        }
        run(Client::new(connection, &config, input, renderer)).await
    } else {
        let mut input = ScriptedInput::square(args.hold);
        if let Some(frames) = args.frames {
            input = input.with_frame_limit(frames);
        }
        run(Client::new(connection, &config, input, renderer)).await
    }
}

async fn run<I: InputSource>(
    mut client: Client<I, LogRenderer>,
) -> Result<(), Box<dyn std::error::Error>> {
    client.run().await?;
    Ok(())
}

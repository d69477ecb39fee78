use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig};
use shared::{Chart, DEFAULT_CHART, DEFAULT_HOST, DEFAULT_PORT, START_LEAD_MS};
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Chart file shared by both players
    #[clap(short, long, default_value = DEFAULT_CHART)]
    chart: String,
    /// Players to wait for before the handshake starts
    #[clap(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=2))]
    players: u8,
    /// Delay between the handshake and the start of playback, in milliseconds
    #[clap(long, default_value_t = START_LEAD_MS)]
    lead_ms: u64,
}

/// Loads the chart, runs one session and prints its statistics.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let chart = Chart::load(&args.chart)?;
    info!("Loaded chart {} with {} notes", args.chart, chart.len());

    let config = ServerConfig {
        max_players: usize::from(args.players),
        start_lead: Duration::from_millis(args.lead_ms),
        ..ServerConfig::default()
    };
    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, &chart, config).await?;
    let reconciler = server.reconciler();

    tokio::select! {
        result = server.run() => {
            match result {
                Ok(stats) => println!("{}", stats),
                Err(e) => {
                    error!("Session failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            println!("{}", reconciler.stats().await);
        }
    }

    Ok(())
}

use clap::Parser;
use log::{error, info};
use server::config::GameConfig;
use server::network::Server;
use shared::Phase;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Maximum concurrent connections
    #[clap(short, long, default_value = "128")]
    max_clients: usize,
    /// Lobby duration in seconds
    #[clap(long, default_value = "120")]
    lobby_secs: u64,
    /// Click window duration in seconds
    #[clap(long, default_value = "5")]
    click_window_secs: u64,
    /// Racing duration in seconds
    #[clap(long, default_value = "10")]
    racing_secs: u64,
    /// Results duration in seconds
    #[clap(long, default_value = "5")]
    results_secs: u64,
    /// Race tick interval in milliseconds
    #[clap(long, default_value = "200")]
    tick_interval_ms: u64,
    /// Boosts accepted per player per second
    #[clap(long, default_value = "50")]
    boost_limit: u32,
    /// Time zone for daily ticket claims, in minutes east of UTC
    #[clap(long, default_value = "540", allow_hyphen_values = true)]
    utc_offset_minutes: i32,
    /// Seed for bot behaviour and generated codes
    #[clap(long)]
    seed: Option<u64>,
}

impl Args {
    fn game_config(&self) -> GameConfig {
        let mut config = GameConfig {
            tick_interval_ms: self.tick_interval_ms,
            boost_limit_per_window: self.boost_limit,
            utc_offset_minutes: self.utc_offset_minutes,
            rng_seed: self.seed,
            ..GameConfig::default()
        };
        config.set_phase_duration(Phase::Lobby, self.lobby_secs * 1000);
        config.set_phase_duration(Phase::ClickWindow, self.click_window_secs * 1000);
        config.set_phase_duration(Phase::Racing, self.racing_secs * 1000);
        config.set_phase_duration(Phase::Results, self.results_secs * 1000);
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.game_config();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config, args.max_clients).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}

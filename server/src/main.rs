use clap::Parser;
use server::network::Server;
use server::simulation::SimConfig;
use shared::Difficulty;
use tokio::time::Duration;

/// Authoritative pong match server.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick rate (simulation updates per second)
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,
    /// Serve-speed difficulty: easy, medium or hard
    #[clap(short, long, default_value = "medium")]
    difficulty: Difficulty,
    /// Score required to win a match
    #[clap(long, default_value = "11")]
    max_score: u32,
    /// Lead over the opponent required to win
    #[clap(long, default_value = "2")]
    win_margin: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let config = SimConfig {
        difficulty: args.difficulty,
        max_score: args.max_score,
        win_margin: args.win_margin,
    };

    let address = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f32(1.0 / args.tick_rate as f32);

    let mut server = Server::new(&address, tick_duration, config).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
            Ok(())
        }
    }
}

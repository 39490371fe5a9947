use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};

use livetail::auth::CodeStore;
use livetail::config::Config;
use livetail::logging;
use livetail::server::{self, AppState};

#[derive(Parser)]
#[command(name = "livetail")]
#[command(about = "Append-only log ingestion with a live SSE tail")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve,
    /// Mint a one-time login code for a user
    IssueCode {
        /// User id the code belongs to
        #[arg(long)]
        user: String,
        /// Validity window in seconds
        #[arg(long, default_value_t = 600)]
        ttl_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Serve => {
            let state = AppState::new(config);
            server::serve(state).await?;
        }
        Commands::IssueCode { user, ttl_secs } => {
            let codes = CodeStore::new(config.code_store_path());
            let code = codes.issue(&user, Duration::from_secs(ttl_secs), Utc::now())?;
            println!("one-time code for {}: {} (valid for {}s)", user, code, ttl_secs);
        }
    }

    Ok(())
}

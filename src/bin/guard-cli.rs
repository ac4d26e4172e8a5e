use std::process::ExitCode;

use clap::{Parser, Subcommand};
use request_guard::security::AttackLogEntry;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Operate a running request guard through its admin API", long_about = None)]
struct Cli {
    /// Admin listener base URL
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "GUARD_ADMIN_KEY", hide_env_values = true)]
    key: String,

    /// Print raw JSON instead of the condensed view
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the admin API answers
    Status,
    /// Show the attack log, oldest first
    Attacks {
        /// Only the most recent N entries
        #[arg(long)]
        last: Option<usize>,
    },
    /// Show guard statistics
    Stats,
    /// Blacklist an address
    Block {
        ip: String,
        /// Duration in seconds (defaults to the configured block time)
        #[arg(long)]
        secs: Option<u64>,
    },
    /// Lift a blacklist entry
    Unblock { ip: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("guard-cli: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let request = match &cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Attacks { .. } => client.get(format!("{base}/admin/attacks")),
        Commands::Stats => client.get(format!("{base}/admin/stats")),
        Commands::Block { ip, secs } => {
            let request = client.post(format!("{base}/admin/blacklist/{ip}"));
            match secs {
                Some(secs) => request.query(&[("secs", secs)]),
                None => request,
            }
        }
        Commands::Unblock { ip } => client.delete(format!("{base}/admin/blacklist/{ip}")),
    };

    let res = request.bearer_auth(&cli.key).send().await?;
    let status = res.status();
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        return Err(format!("admin API returned {status}: {text}").into());
    }

    match cli.command {
        Commands::Attacks { last } if !cli.json => {
            let entries: Vec<AttackLogEntry> = res.json().await?;
            let skip = last.map_or(0, |n| entries.len().saturating_sub(n));
            for entry in &entries[skip..] {
                println!(
                    "{}  {:<15}  {:?}  {}  {}",
                    entry.timestamp_ms, entry.identity, entry.category, entry.path, entry.detail
                );
            }
            eprintln!("{} of {} entries", entries.len() - skip, entries.len());
        }
        _ => {
            let json: Value = res.json().await?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

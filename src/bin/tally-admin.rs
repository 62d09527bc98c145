use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tally::analytics::TimeRange;
use tally::auth::Caller;
use tally::bootstrap;
use tally::config::Config;
use tally::models::CreateLinkRequest;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tally-admin")]
#[command(about = "Tally link management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a short link
    Shorten {
        /// Destination URL (http or https)
        url: String,
        /// Optional display title
        #[arg(long)]
        title: Option<String>,
        /// Use this code instead of a generated one
        #[arg(long)]
        code: Option<String>,
        /// Expire the link after this many days
        #[arg(long)]
        expires_in_days: Option<u32>,
    },
    /// Stop a link from redirecting
    Deactivate { code: String },
    /// Make a deactivated link redirect again
    Reactivate { code: String },
    /// Delete a link and its click history
    Delete { code: String },
    /// Print the analytics report for a link as JSON
    Stats {
        code: String,
        /// Range start, unix seconds (requires --end)
        #[arg(long, requires = "end")]
        start: Option<i64>,
        /// Range end, unix seconds (requires --start)
        #[arg(long, requires = "start")]
        end: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage = bootstrap::build_storage(&config).await?;
    let service = bootstrap::build_service(&config, storage)?;

    // operator commands act on every link
    let caller = Caller::admin();
    let now = chrono::Utc::now().timestamp();

    match cli.command {
        Commands::Shorten {
            url,
            title,
            code,
            expires_in_days,
        } => {
            let request = CreateLinkRequest {
                url,
                title,
                custom_code: code,
                expires_in_days,
            };
            let link = service.shorten(&caller, request, now).await?;
            println!("✓ Created '{}' -> {}", link.short_code, link.original_url);
        }
        Commands::Deactivate { code } => {
            service.deactivate(&caller, &code).await?;
            println!("✓ Deactivated '{}'", code);
        }
        Commands::Reactivate { code } => {
            service.reactivate(&caller, &code).await?;
            println!("✓ Reactivated '{}'", code);
        }
        Commands::Delete { code } => {
            service.delete(&caller, &code).await?;
            println!("✓ Deleted '{}'", code);
        }
        Commands::Stats { code, start, end } => {
            let range = match (start, end) {
                (Some(start), Some(end)) => Some(TimeRange::new(start, end)),
                _ => None,
            };
            let report = service.analytics(&caller, &code, range, now).await?;
            let json =
                serde_json::to_string_pretty(&report).context("failed to serialize report")?;
            println!("{json}");
        }
    }

    Ok(())
}

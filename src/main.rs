//! tcg-pricer - Trading-card price lookups through a headless browser
//!
//! Looks up the cheapest Near Mint and Lightly Played listings of a card and
//! whether it is legal in any format.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tcg_pricer::commands::{LegalityCommand, PriceCommand};
use tcg_pricer::config::{Config, OutputFormat};
use tcg_pricer::tcgplayer::Condition;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tcg-pricer",
    version,
    about = "Trading-card price lookups through a headless browser",
    long_about = "Drives a shared headless Chromium to read the cheapest Near Mint and Lightly Played listings of a card, alongside its format legality."
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Store origin (e.g., https://www.tcgplayer.com)
    #[arg(long, global = true, env = "TCGP_BASE_URL")]
    base_url: Option<String>,

    /// Chrome/Chromium executable
    #[arg(long, global = true, env = "TCGP_CHROME")]
    chrome: Option<PathBuf>,

    /// Show the browser window
    #[arg(long, global = true)]
    headful: bool,

    /// Proxy URL (e.g., socks5://host:port)
    #[arg(long, global = true, env = "TCGP_PROXY")]
    proxy: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up prices and legality for cards
    #[command(alias = "p")]
    Price {
        /// Card name(s), looked up concurrently
        #[arg(required = true)]
        cards: Vec<String>,
    },

    /// Check format legality only
    #[command(alias = "l")]
    Legality {
        /// Exact card name
        card: String,
    },

    /// List supported conditions
    Conditions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    // Load config with layered overrides
    let mut config = Config::load(cli.config.as_deref())?.with_env();

    // Apply CLI overrides
    config.format = cli.format;

    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(chrome) = cli.chrome {
        config.chrome_path = Some(chrome);
    }
    if cli.headful {
        config.headless = false;
    }
    if let Some(proxy) = cli.proxy {
        config.proxy = Some(proxy);
    }

    match cli.command {
        Commands::Price { cards } => {
            let cmd = PriceCommand::new(config);
            let output = cmd.execute(&cards).await?;
            println!("{}", output);
        }

        Commands::Legality { card } => {
            let cmd = LegalityCommand::new(config);
            let output = cmd.execute(&card).await?;
            println!("{}", output);
        }

        Commands::Conditions => {
            println!("Supported conditions:\n");
            println!("{:<6} {:<16} {:<8}", "Code", "Label", "Priced");
            println!("{:-<6} {:-<16} {:-<8}", "", "", "");

            for condition in Condition::all() {
                let priced = if config.conditions.contains(condition) { "yes" } else { "no" };
                println!("{:<6} {:<16} {:<8}", condition.code(), condition.label(), priced);
            }
        }
    }

    Ok(())
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use umami_feeder::collector::{Collector, UmamiClient};
use umami_feeder::connection::{ConnectError, Connector};
use umami_feeder::tracking::{normalize_hostname, SiteDirectory};
use umami_feeder::FeederConfig;

#[derive(Parser)]
#[command(name = "feeder-admin")]
#[command(about = "Umami feeder management CLI", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON); FEEDER_* variables still apply
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one connection attempt and verify the configuration
    Verify,
    /// List the websites known to the collector and the configured ones
    Sites,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Arc::new(FeederConfig::load(cli.config.as_deref())?);

    let client: Arc<dyn Collector> =
        Arc::new(UmamiClient::new(&config.umami_host).context("failed to create Umami client")?);
    let directory = Arc::new(SiteDirectory::new(&config.websites));
    let connector = Connector::new(Arc::clone(&config), client, Arc::clone(&directory));

    match cli.command {
        Commands::Verify => match connector.establish().await {
            Ok(established) => {
                println!("✅ Connection and configuration OK");
                println!(
                    "   token: {}",
                    if established.session.token.is_some() { "yes" } else { "no" }
                );
                println!("   websites: {}", directory.len());
                println!("   ignored networks: {}", established.rules.networks.len());
                println!("   ignored URL patterns: {}", established.rules.url_patterns.len());
            }
            Err(ConnectError::Transient(e)) => {
                bail!("collector unreachable (would be retried): {e}");
            }
            Err(ConnectError::Fatal(e)) => {
                bail!("configuration error (tracking would stay disabled): {e}");
            }
        },
        Commands::Sites => {
            connector
                .establish()
                .await
                .context("failed to load websites")?;

            let configured: Vec<String> = config
                .websites
                .keys()
                .map(|h| normalize_hostname(h))
                .collect();

            println!("{:<40} {:<38} source", "hostname", "website");
            for (host, id) in directory.snapshot() {
                let source = if configured.contains(&host) { "config" } else { "collector" };
                println!("{host:<40} {id:<38} {source}");
            }
        }
    }

    Ok(())
}

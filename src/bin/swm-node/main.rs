//! swm-node CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use swm_node::wire::{parse_accept_network, STATUS_PAYMENT_REQUIRED};
use swm_node::NodeBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let json = cli.json_logs.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let plain = (!cli.json_logs).then(|| fmt::layer().with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(json)
        .with(plain)
        .with(filter)
        .init();

    info!("swm-node v{}", env!("CARGO_PKG_VERSION"));

    // Build configuration
    let config = cli.to_config()?;

    // Build the node
    let mut node = NodeBuilder::new(config).build().await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            node.run().await?;
            info!("Goodbye!");
        }
        Command::Issue {
            key,
            accept_network,
        } => {
            let preference = parse_accept_network(accept_network.as_deref());
            let issued = node.issuer().issue(&key, &preference).await?;

            println!("{STATUS_PAYMENT_REQUIRED} Payment Required");
            for (name, value) in issued.envelope.to_headers() {
                println!("{name}: {value}");
            }
            println!();
            println!("{}", serde_json::to_string_pretty(&issued.ticket)?);
        }
        Command::Sweep => {
            let report = node.lifecycle().sweep_expired().await;
            println!(
                "scanned {} expired {} failed {}",
                report.scanned, report.expired, report.failed
            );
        }
    }

    Ok(())
}

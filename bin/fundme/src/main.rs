//! fundme is a CLI tool to deploy the FundMe contract, with a mock price feed on
//! development networks and source verification on public ones.

mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command};
use fundme_deploy::{DeployerBuilder, RunReport, Settings, inspect};

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets usually live in a `.env` file next to the project.
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let settings = Settings::load(&PathBuf::from(&cli.config))?;
    let builder = DeployerBuilder::new(settings.clone()).maybe_network(cli.network);

    match cli.command {
        Command::Deploy { tags, reset } => {
            let mut deployer = builder.reset(reset).build()?;
            let report = deployer.run(&tags).await?;
            println!("{}", report_table(&report));
        }
        Command::Networks => {
            println!("{}", networks_table(&settings));
        }
        Command::Deployments => {
            let network = builder.network_name()?;
            let records = builder.store()?.load_all()?;
            if records.is_empty() {
                tracing::info!(network = %network, "No deployments recorded");
                return Ok(());
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["Contract", "Address", "Deployer", "Args", "Block", "Tx hash"]);
            for record in records {
                table.add_row(vec![
                    record.contract_name,
                    record.address.to_string(),
                    record.deployer.to_string(),
                    record.args.join(", "),
                    record.block_number.to_string(),
                    record.transaction_hash.to_string(),
                ]);
            }
            println!("{table}");
        }
        Command::Inspect => {
            let profile = builder.profile()?;
            let inspection = inspect(&builder.chain()?, &profile, &builder.store()?).await?;

            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["", "Address"]);
            table.add_row(vec!["FundMe".to_string(), inspection.fund_me.to_string()]);
            table.add_row(vec![
                "priceFeed()".to_string(),
                inspection.price_feed.to_string(),
            ]);
            table.add_row(vec![
                "Expected".to_string(),
                inspection
                    .expected
                    .map_or_else(|| "unknown".to_string(), |address| address.to_string()),
            ]);
            println!("{table}");

            if !inspection.is_consistent() {
                anyhow::bail!(
                    "FundMe at {} does not use the expected price feed",
                    inspection.fund_me
                );
            }
        }
        Command::Config => {
            print!("{}", settings.to_redacted_toml()?);
        }
    }

    Ok(())
}

fn report_table(report: &RunReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Contract", "Address", "Args", "Status"]);
    for contract in &report.contracts {
        table.add_row(vec![
            contract.name.clone(),
            contract.address.to_string(),
            contract.args.join(", "),
            contract.status.to_string(),
        ]);
    }
    if let Some(outcome) = &report.verification {
        table.add_row(vec![
            "Verification".to_string(),
            String::new(),
            String::new(),
            outcome.to_string(),
        ]);
    }
    table
}

fn networks_table(settings: &Settings) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Network",
        "Chain id",
        "Local",
        "Price feed",
        "Confirmations",
        "RPC URL",
    ]);
    for (name, network) in &settings.networks {
        let default_marker = if *name == settings.default_network {
            " (default)"
        } else {
            ""
        };
        table.add_row(vec![
            format!("{name}{default_marker}"),
            network.chain_id.to_string(),
            network.local.to_string(),
            match (network.local, network.eth_usd_price_feed) {
                (true, _) => "mock".to_string(),
                (false, Some(address)) => address.to_string(),
                (false, None) => "none".to_string(),
            },
            network.block_confirmations.to_string(),
            network
                .rpc_url
                .as_ref()
                .map_or_else(|| "unset".to_string(), |url| url.to_string()),
        ]);
    }
    table
}

use clap::{Parser, Subcommand};
use fundme_deploy::{CONFIG_FILENAME, Tag};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "fundme")]
#[command(
    author,
    version,
    about = "Deploy the FundMe contract and its price feed to any configured network"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "FUNDME_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// The network to target. Defaults to `default_network` of the configuration.
    #[arg(short, long, global = true, env = "FUNDME_NETWORK")]
    pub network: Option<String>,

    /// Path to the configuration file. A missing file is not an error.
    #[arg(long, alias = "conf", global = true, env = "FUNDME_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy the steps selected by the given tags.
    Deploy {
        /// Comma separated tags: `all`, `mocks` or `fundme`.
        #[arg(long, value_delimiter = ',', default_value = "all")]
        tags: Vec<Tag>,

        /// Ignore deployments recorded by previous runs and redeploy everything.
        #[arg(long, env = "FUNDME_RESET", default_value_t = false)]
        reset: bool,
    },

    /// List the configured networks.
    Networks,

    /// List the deployments recorded for the network.
    Deployments,

    /// Check that the deployed FundMe uses the expected price feed.
    Inspect,

    /// Print the merged configuration, secrets masked.
    Config,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_deploy_tags() {
        let cli = Cli::try_parse_from(["fundme", "deploy", "--tags", "mocks,fundme", "--network", "localhost"])
            .unwrap();
        assert_eq!(cli.network.as_deref(), Some("localhost"));
        match cli.command {
            Command::Deploy { tags, reset } => {
                assert_eq!(tags, vec![Tag::Mocks, Tag::FundMe]);
                assert!(!reset);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_deploy_defaults_to_all() {
        let cli = Cli::try_parse_from(["fundme", "deploy"]).unwrap();
        match cli.command {
            Command::Deploy { tags, .. } => assert_eq!(tags, vec![Tag::All]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert!(Cli::try_parse_from(["fundme", "deploy", "--tags", "verify"]).is_err());
    }
}

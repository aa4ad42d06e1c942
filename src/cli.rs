use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ethers::types::{Address, TxHash};
use reqwest::Url;

pub mod private_key;

pub use private_key::PrivateKey;

#[derive(Debug, Clone, Parser)]
#[clap(rename_all = "kebab-case", version, about)]
pub struct Args {
    /// The RPC Url of the chain the contract is deployed on
    #[clap(short, long, env)]
    pub rpc_url: Url,

    /// Path to an optional watcher configuration file
    #[clap(short, long, env)]
    pub config: Option<PathBuf>,

    /// Where the pending deployment is kept so it can be resumed
    #[clap(long, env, default_value = "pending-deployment.yml")]
    pub session_file: PathBuf,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
#[clap(rename_all = "kebab-case")]
pub enum Command {
    /// Send a deployment transaction and follow it until the code is live
    Deploy(DeployArgs),

    /// Follow a deployment transaction sent earlier
    Watch(WatchArgs),
}

#[derive(Debug, Clone, clap::Args)]
#[clap(rename_all = "kebab-case")]
pub struct DeployArgs {
    /// Private key used to sign the deployment
    #[clap(short, long, env)]
    pub private_key: PrivateKey,

    /// Factory to call, a plain contract creation is sent when omitted
    #[clap(long)]
    pub to: Option<Address>,

    /// File with the hex encoded init code or factory call data
    #[clap(short, long)]
    pub data: PathBuf,
}

#[derive(Debug, Clone, clap::Args)]
#[clap(rename_all = "kebab-case")]
pub struct WatchArgs {
    /// Transaction to follow, read from the session file when omitted
    #[clap(short, long)]
    pub tx_hash: Option<TxHash>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_watch_with_hash() {
        let hash = format!("{:?}", TxHash::repeat_byte(0xab));

        let args = Args::try_parse_from([
            "deployment-watcher",
            "--rpc-url",
            "http://localhost:8545",
            "watch",
            "--tx-hash",
            hash.as_str(),
        ])
        .unwrap();

        match args.command {
            Command::Watch(watch) => {
                assert_eq!(watch.tx_hash, Some(TxHash::repeat_byte(0xab)))
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(args.session_file, PathBuf::from("pending-deployment.yml"));
    }
}

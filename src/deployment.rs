use std::path::Path;
use std::sync::Arc;

use ethers::prelude::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer, Wallet};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, TxHash};
use eyre::{Context, ContextCompat};
use tokio::sync::watch;
use tracing::{info, instrument};
use tracing_indicatif::suspend_tracing_indicatif;

use crate::chain::{ChainQuery, RpcChain};
use crate::cli::{Args, Command, DeployArgs, WatchArgs};
use crate::config::WatcherConfig;
use crate::progress::ProgressView;
use crate::serde_utils;
use crate::session::{PendingDeployment, SessionStore};
use crate::submission::{Resubmit, Submission};
use crate::watcher::{DeploymentSource, DeploymentWatcher, WatcherState};

pub type RpcSigner = SignerMiddleware<Provider<Http>, LocalWallet>;

#[derive(Clone, Debug, derive_more::Display)]
enum FailureMenu {
    #[display(fmt = "Retry")]
    Retry,
    #[display(fmt = "Cancel")]
    Cancel,
}

pub async fn run(args: Args) -> eyre::Result<()> {
    let config: WatcherConfig = match args.config.as_ref() {
        Some(path) => serde_utils::read_deserialize(path).await?,
        None => WatcherConfig::default(),
    };

    config.validate()?;

    let provider = Provider::<Http>::try_from(args.rpc_url.as_str())?;
    let store = SessionStore::new(&args.session_file);

    let address = match args.command {
        Command::Deploy(deploy) => {
            run_deploy(provider, config, &store, deploy).await?
        }
        Command::Watch(watch) => {
            run_watch(provider, config, &store, watch).await?
        }
    };

    println!("This is your new contract address: {address:?}");
    println!("The deployment record is kept in {}", store.path().display());

    Ok(())
}

#[instrument(name = "deploy", skip_all)]
async fn run_deploy(
    provider: Provider<Http>,
    config: WatcherConfig,
    store: &SessionStore,
    args: DeployArgs,
) -> eyre::Result<Address> {
    let chain_id = provider.get_chainid().await?;
    let wallet = Wallet::from(args.private_key.key.clone())
        .with_chain_id(chain_id.as_u64());

    info!(deployer = ?wallet.address(), %chain_id, "Preparing deployment");

    let signer: Arc<RpcSigner> =
        Arc::new(SignerMiddleware::new(provider, wallet));

    let data = read_call_data(&args.data).await?;

    let mut request = Eip1559TransactionRequest::new().data(data);
    if let Some(to) = args.to {
        request = request.to(to);
    }

    let tx = TypedTransaction::Eip1559(request);

    let resubmit: Resubmit = {
        let signer = signer.clone();
        Arc::new(move || Submission::send(signer.clone(), tx.clone()))
    };

    let chain = Arc::new(RpcChain::new(signer));
    let watcher =
        DeploymentWatcher::new(chain, config).with_resubmit(resubmit.clone());

    follow(&watcher, store, DeploymentSource::select(Some(resubmit()), None))
        .await
}

#[instrument(name = "watch", skip_all)]
async fn run_watch(
    provider: Provider<Http>,
    config: WatcherConfig,
    store: &SessionStore,
    args: WatchArgs,
) -> eyre::Result<Address> {
    let tx_hash = match resume_point(store, args.tx_hash).await? {
        ResumePoint::Pending(tx_hash) => tx_hash,
        ResumePoint::Finished(address) => {
            info!(?address, "Deployment already confirmed, nothing to watch");
            return Ok(address);
        }
    };

    let chain = Arc::new(RpcChain::new(Arc::new(provider)));
    let watcher = DeploymentWatcher::new(chain, config);

    follow(&watcher, store, DeploymentSource::select(None, Some(tx_hash))).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResumePoint {
    Pending(TxHash),
    Finished(Address),
}

/// Where `watch` picks up: the given hash, or the session file. A recorded
/// address means the contract was already confirmed.
async fn resume_point(
    store: &SessionStore,
    tx_hash: Option<TxHash>,
) -> eyre::Result<ResumePoint> {
    if let Some(tx_hash) = tx_hash {
        return Ok(ResumePoint::Pending(tx_hash));
    }

    let recorded = store.load().await?.with_context(|| {
        format!(
            "No transaction hash given and nothing pending in {}",
            store.path().display()
        )
    })?;

    Ok(match recorded.deployed_address {
        Some(address) => ResumePoint::Finished(address),
        None => ResumePoint::Pending(recorded.transaction_hash),
    })
}

/// Drives the progress view and the session file from the watcher until the
/// contract is live or the user gives up.
async fn follow<C>(
    watcher: &DeploymentWatcher<C>,
    store: &SessionStore,
    source: Option<DeploymentSource>,
) -> eyre::Result<Address>
where
    C: ChainQuery + 'static,
{
    let view = ProgressView::new();
    let (sender, mut changes) = watch::channel(watcher.state());

    let subscription = watcher.subscribe({
        let view = view.clone();
        move |state: &WatcherState| {
            view.render(state);
            sender.send_replace(state.clone());
        }
    });

    watcher.watch(source);

    let mut saved: Option<PendingDeployment> = None;

    loop {
        changes.changed().await.context("Watcher stopped")?;
        let state = changes.borrow_and_update().clone();

        if let Some(transaction_hash) = state.transaction_hash {
            let pending = PendingDeployment {
                transaction_hash,
                deployed_address: state
                    .deployed_address
                    .filter(|_| state.is_deployed()),
            };

            if saved.as_ref() != Some(&pending) {
                store.save(&pending).await?;
                saved = Some(pending);
            }
        }

        if state.is_deployed() {
            watcher.unsubscribe(subscription);

            return state
                .deployed_address
                .context("Deployed without a contract address");
        }

        if state.is_errored {
            let reason = watcher
                .last_error()
                .map(|err| err.to_string())
                .unwrap_or_else(|| "unknown error".to_string());

            if !watcher.can_retry() || !prompt_retry()? {
                watcher.cancel();
                eyre::bail!("Deployment failed: {reason}");
            }

            view.reset();
            watcher.retry();
        }
    }
}

fn prompt_retry() -> eyre::Result<bool> {
    let choice = suspend_tracing_indicatif(|| {
        inquire::Select::new(
            "The deployment failed, what do you want to do?",
            vec![FailureMenu::Retry, FailureMenu::Cancel],
        )
        .prompt_skippable()
    })?;

    Ok(matches!(choice, Some(FailureMenu::Retry)))
}

async fn read_call_data(path: &Path) -> eyre::Result<Bytes> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Reading call data from {}", path.display()))?;

    parse_call_data(&content)
        .with_context(|| format!("Parsing call data in {}", path.display()))
}

fn parse_call_data(content: &str) -> eyre::Result<Bytes> {
    let content = content.trim().trim_start_matches("0x");

    if content.is_empty() {
        eyre::bail!("Call data is empty");
    }

    Ok(Bytes::from(hex::decode(content)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_data_accepts_prefix_and_whitespace() {
        let data = parse_call_data("  0x6080604052\n").unwrap();
        assert_eq!(data.to_vec(), vec![0x60, 0x80, 0x60, 0x40, 0x52]);

        let data = parse_call_data("6080").unwrap();
        assert_eq!(data.to_vec(), vec![0x60, 0x80]);
    }

    #[test]
    fn call_data_must_be_hex() {
        assert!(parse_call_data("0x").is_err());
        assert!(parse_call_data("0xzz").is_err());
    }

    #[tokio::test]
    async fn explicit_hash_is_followed() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = SessionStore::new(dir.path().join("pending.yml"));
        let tx_hash = TxHash::repeat_byte(0xab);

        let point = resume_point(&store, Some(tx_hash)).await?;
        assert_eq!(point, ResumePoint::Pending(tx_hash));

        Ok(())
    }

    #[tokio::test]
    async fn pending_record_is_resumed() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = SessionStore::new(dir.path().join("pending.yml"));
        let tx_hash = TxHash::repeat_byte(0xab);
        store.save(&PendingDeployment::new(tx_hash)).await?;

        let point = resume_point(&store, None).await?;
        assert_eq!(point, ResumePoint::Pending(tx_hash));

        Ok(())
    }

    #[tokio::test]
    async fn confirmed_record_is_not_watched_again() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = SessionStore::new(dir.path().join("pending.yml"));
        let address = Address::repeat_byte(0xde);
        store
            .save(&PendingDeployment {
                transaction_hash: TxHash::repeat_byte(0xab),
                deployed_address: Some(address),
            })
            .await?;

        let point = resume_point(&store, None).await?;
        assert_eq!(point, ResumePoint::Finished(address));

        Ok(())
    }

    #[tokio::test]
    async fn missing_record_is_an_error() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = SessionStore::new(dir.path().join("pending.yml"));

        assert!(resume_point(&store, None).await.is_err());

        Ok(())
    }

    #[tokio::test]
    async fn call_data_is_read_from_file() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("init-code.hex");
        tokio::fs::write(&path, "0x60806040").await?;

        let data = read_call_data(&path).await?;
        assert_eq!(data.len(), 4);

        Ok(())
    }
}

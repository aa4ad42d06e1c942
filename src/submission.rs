use std::future::Future;
use std::sync::Arc;

use ethers::providers::Middleware;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{TransactionReceipt, TxHash};
use eyre::{Context, ContextCompat};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::info;

/// Produces a fresh submission when the caller retries a failed deployment.
pub type Resubmit = Arc<dyn Fn() -> Submission + Send + Sync>;

/// A deployment transaction on its way to the chain.
///
/// The hash notification fires once the node accepted the transaction, the
/// outcome resolves with its receipt or with the submission error.
pub struct Submission {
    pub(crate) tx_hash: oneshot::Receiver<TxHash>,
    pub(crate) outcome: BoxFuture<'static, eyre::Result<TransactionReceipt>>,
}

impl Submission {
    pub fn new<F>(tx_hash: oneshot::Receiver<TxHash>, outcome: F) -> Self
    where
        F: Future<Output = eyre::Result<TransactionReceipt>> + Send + 'static,
    {
        Self {
            tx_hash,
            outcome: outcome.boxed(),
        }
    }

    /// Sends `tx` through `client` and resolves once it is mined.
    ///
    /// Nothing is sent until the submission is polled by a watcher.
    pub fn send<M>(client: Arc<M>, tx: TypedTransaction) -> Self
    where
        M: Middleware + 'static,
    {
        let (hash_sender, tx_hash) = oneshot::channel();

        Self::new(tx_hash, send_and_confirm(client, tx, hash_sender))
    }
}

impl std::fmt::Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission").finish_non_exhaustive()
    }
}

async fn send_and_confirm<M>(
    client: Arc<M>,
    tx: TypedTransaction,
    hash_sender: oneshot::Sender<TxHash>,
) -> eyre::Result<TransactionReceipt>
where
    M: Middleware + 'static,
{
    let pending = client
        .send_transaction(tx, None)
        .await
        .context("Send transaction")?;

    let tx_hash = pending.tx_hash();
    info!(?tx_hash, "Deployment transaction sent");

    // the watcher may already be gone
    let _ = hash_sender.send(tx_hash);

    pending
        .await
        .context("Awaiting receipt")?
        .context("Transaction dropped from the mempool")
}

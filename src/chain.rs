//! Read-only chain queries the watcher depends on.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, Transaction, TransactionReceipt, TxHash};
use eyre::Context;

#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// The transaction with `hash`, if the node knows about it.
    async fn transaction(
        &self,
        hash: TxHash,
    ) -> eyre::Result<Option<Transaction>>;

    async fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> eyre::Result<Option<TransactionReceipt>>;

    /// Bytecode at `address`, empty when no contract lives there.
    async fn code(&self, address: Address) -> eyre::Result<Bytes>;
}

/// [`ChainQuery`] over any `ethers` middleware stack.
#[derive(Debug)]
pub struct RpcChain<M> {
    client: Arc<M>,
}

impl<M> RpcChain<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<M> ChainQuery for RpcChain<M>
where
    M: Middleware + 'static,
{
    async fn transaction(
        &self,
        hash: TxHash,
    ) -> eyre::Result<Option<Transaction>> {
        self.client
            .get_transaction(hash)
            .await
            .with_context(|| format!("Fetching transaction {hash:?}"))
    }

    async fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> eyre::Result<Option<TransactionReceipt>> {
        self.client
            .get_transaction_receipt(hash)
            .await
            .with_context(|| format!("Fetching receipt of {hash:?}"))
    }

    async fn code(&self, address: Address) -> eyre::Result<Bytes> {
        self.client
            .get_code(address, None)
            .await
            .with_context(|| format!("Fetching code at {address:?}"))
    }
}

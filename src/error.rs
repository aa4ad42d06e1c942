use ethers::types::TxHash;
use strum::EnumDiscriminants;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Terminal failures of a deployment session.
///
/// None of these are retried automatically, a new attempt is always started by
/// the caller through [`crate::watcher::DeploymentWatcher::retry`].
#[derive(Debug, Error, EnumDiscriminants)]
#[strum_discriminants(name(WatchErrorKind), derive(Hash))]
pub enum WatchError {
    #[error("submitting the deployment transaction failed")]
    SubmissionFailed(#[source] BoxError),

    #[error("transaction {tx_hash:?} status reverted")]
    TransactionReverted { tx_hash: TxHash },

    #[error("querying the chain failed")]
    QueryFailed(#[source] BoxError),

    #[error("transaction {tx_hash:?} is unknown to the node")]
    UnknownTransaction { tx_hash: TxHash },

    #[error("no deployed address found in the receipt of {tx_hash:?}")]
    AddressExtractionFailed { tx_hash: TxHash },
}

impl WatchError {
    pub fn submission(err: eyre::Report) -> Self {
        Self::SubmissionFailed(err.into())
    }

    pub fn query(err: eyre::Report) -> Self {
        Self::QueryFailed(err.into())
    }

    pub fn kind(&self) -> WatchErrorKind {
        WatchErrorKind::from(self)
    }
}

//! Pending deployments persisted between runs, so an interrupted watch can be
//! resumed from its transaction hash.

use std::path::{Path, PathBuf};

use ethers::types::{Address, TxHash};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::serde_utils;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDeployment {
    pub transaction_hash: TxHash,

    /// Only recorded once code is live at the address.
    #[serde(default)]
    pub deployed_address: Option<Address>,
}

impl PendingDeployment {
    pub fn new(transaction_hash: TxHash) -> Self {
        Self {
            transaction_hash,
            deployed_address: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_owned(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> eyre::Result<Option<PendingDeployment>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let pending = serde_utils::read_deserialize(&self.path).await?;

        Ok(Some(pending))
    }

    #[instrument(skip(self))]
    pub async fn save(&self, pending: &PendingDeployment) -> eyre::Result<()> {
        serde_utils::write_serialize(&self.path, pending).await?;

        debug!(path = %self.path.display(), "Pending deployment saved");

        Ok(())
    }
}

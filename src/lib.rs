pub mod abis;
pub mod chain;
pub mod cli;
pub mod config;
pub mod deployment;
pub mod error;
pub mod progress;
pub mod serde_utils;
pub mod session;
pub mod submission;
pub mod watcher;

pub use chain::{ChainQuery, RpcChain};
pub use config::WatcherConfig;
pub use error::{WatchError, WatchErrorKind};
pub use submission::{Resubmit, Submission};
pub use watcher::{
    DeploymentSource, DeploymentWatcher, Step, SubscriptionId, WatcherState,
};

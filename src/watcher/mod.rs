//! Follows a deployment transaction until the contract code is live.
//!
//! A session starts from either a fresh [`Submission`] or a transaction hash
//! recovered from an earlier run. It first waits for the transaction to be
//! mined (ticking every `mining_poll_interval`), then extracts the deployed
//! address from the receipt and waits for code to appear at that address
//! (ticking every `code_poll_interval`). Every observable change is pushed to
//! the subscribers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ethers::types::{Address, TransactionReceipt, TxHash};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::chain::ChainQuery;
use crate::config::WatcherConfig;
use crate::error::{WatchError, WatchErrorKind};
use crate::submission::{Resubmit, Submission};

pub mod address;
pub mod step;

pub use self::address::extract_deployed_address;
pub use self::step::Step;

/// What drives a deployment session.
#[derive(Debug)]
pub enum DeploymentSource {
    Submission(Submission),
    Recovered(TxHash),
}

impl DeploymentSource {
    /// Picks the source out of the two optional inputs. A fresh submission
    /// takes precedence over a recovered hash.
    pub fn select(
        submission: Option<Submission>,
        recovered: Option<TxHash>,
    ) -> Option<Self> {
        match (submission, recovered) {
            (Some(submission), Some(tx_hash)) => {
                warn!(
                    ?tx_hash,
                    "Ignoring recovered hash, a new submission was given"
                );
                Some(Self::Submission(submission))
            }
            (Some(submission), None) => Some(Self::Submission(submission)),
            (None, Some(tx_hash)) => Some(Self::Recovered(tx_hash)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherState {
    pub step: Step,
    pub transaction_hash: Option<TxHash>,
    pub deployed_address: Option<Address>,
    pub is_errored: bool,
    pub error: Option<WatchErrorKind>,
    pub is_polling: bool,
    pub is_awaiting_code: bool,
}

impl WatcherState {
    pub fn awaiting_user_action(&self) -> bool {
        self.step.is_penultimate() && self.deployed_address.is_none()
    }

    pub fn is_deployed(&self) -> bool {
        self.step.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn Fn(&WatcherState) + Send + Sync>;

struct Inner {
    state: WatcherState,
    last_error: Option<Arc<WatchError>>,
    session: u64,
    cancelled: bool,
    next_subscription: u64,
    subscribers: Vec<(SubscriptionId, Callback)>,
}

impl Inner {
    fn notify(&self) {
        for (_, callback) in &self.subscribers {
            callback(&self.state);
        }
    }
}

struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct DeploymentWatcher<C> {
    chain: Arc<C>,
    config: Arc<WatcherConfig>,
    resubmit: Option<Resubmit>,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<C> DeploymentWatcher<C>
where
    C: ChainQuery + 'static,
{
    pub fn new(chain: Arc<C>, config: WatcherConfig) -> Self {
        let inner = Inner {
            state: WatcherState::default(),
            last_error: None,
            session: 0,
            cancelled: false,
            next_subscription: 0,
            subscribers: Vec::new(),
        };

        Self {
            chain,
            config: Arc::new(config),
            resubmit: None,
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn with_resubmit(mut self, resubmit: Resubmit) -> Self {
        self.resubmit = Some(resubmit);
        self
    }

    pub fn can_retry(&self) -> bool {
        self.resubmit.is_some()
    }

    pub fn state(&self) -> WatcherState {
        self.shared.lock().state.clone()
    }

    /// The full error behind `state().error`, if the session failed.
    pub fn last_error(&self) -> Option<Arc<WatchError>> {
        self.shared.lock().last_error.clone()
    }

    /// Registers `callback` for every change of the observable state.
    ///
    /// Callbacks run while the watcher state is locked and must not call
    /// back into the watcher.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&WatcherState) + Send + Sync + 'static,
    {
        let mut inner = self.shared.lock();

        let id = SubscriptionId(inner.next_subscription);
        inner.next_subscription += 1;

        if !inner.cancelled {
            inner.subscribers.push((id, Box::new(callback)));
        }

        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.shared
            .lock()
            .subscribers
            .retain(|(subscription, _)| *subscription != id);
    }

    /// Starts a session for `source`, replacing any running one.
    ///
    /// Without a source the watcher stays idle.
    pub fn watch(&self, source: Option<DeploymentSource>) {
        let Some(source) = source else {
            debug!("Nothing to watch, staying idle");
            return;
        };

        let session = {
            let mut inner = self.shared.lock();
            if inner.cancelled {
                return;
            }

            self.abort_task();

            inner.session += 1;
            inner.last_error = None;

            let mut state = WatcherState::default();
            if let DeploymentSource::Recovered(tx_hash) = &source {
                state.transaction_hash = Some(*tx_hash);
                state.step = Step::Submitted;
                state.is_polling = true;
            }

            if inner.state != state {
                inner.state = state;
                inner.notify();
            }

            Session {
                id: inner.session,
                shared: self.shared.clone(),
            }
        };

        let task = tokio::spawn(run_session(
            session,
            self.chain.clone(),
            self.config.clone(),
            source,
        ));

        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Starts over from step 0 with a new submission.
    pub fn retry(&self) {
        {
            let mut inner = self.shared.lock();
            if inner.cancelled {
                return;
            }

            self.abort_task();

            inner.session += 1;
            inner.last_error = None;

            if inner.state != WatcherState::default() {
                inner.state = WatcherState::default();
                inner.notify();
            }
        }

        let Some(resubmit) = self.resubmit.as_ref() else {
            warn!("Retry requested but no resubmission is available");
            return;
        };

        info!("Retrying the deployment");
        self.watch(Some(DeploymentSource::Submission(resubmit())));
    }

    /// Stops all polling. No callback fires after this returns.
    pub fn cancel(&self) {
        let mut inner = self.shared.lock();
        if inner.cancelled {
            return;
        }

        inner.cancelled = true;
        inner.session += 1;
        inner.state.is_polling = false;
        inner.state.is_awaiting_code = false;
        inner.subscribers.clear();

        self.abort_task();

        debug!("Watcher cancelled");
    }

    fn abort_task(&self) {
        if let Some(task) =
            self.task.lock().unwrap_or_else(PoisonError::into_inner).take()
        {
            task.abort();
        }
    }
}

impl<C> Drop for DeploymentWatcher<C> {
    fn drop(&mut self) {
        self.shared.lock().cancelled = true;

        if let Some(task) =
            self.task.lock().unwrap_or_else(PoisonError::into_inner).take()
        {
            task.abort();
        }
    }
}

/// Why a session stopped before reaching a terminal state.
enum Halt {
    /// The session was superseded by a retry or cancelled.
    Stale,
    Failed(WatchError),
}

impl From<WatchError> for Halt {
    fn from(err: WatchError) -> Self {
        Halt::Failed(err)
    }
}

#[derive(Clone)]
struct Session {
    id: u64,
    shared: Arc<Shared>,
}

impl Session {
    fn update(&self, f: impl FnOnce(&mut WatcherState)) -> Result<(), Halt> {
        let mut inner = self.shared.lock();
        if inner.cancelled || inner.session != self.id {
            return Err(Halt::Stale);
        }

        let mut state = inner.state.clone();
        f(&mut state);

        if state != inner.state {
            inner.state = state;
            inner.notify();
        }

        Ok(())
    }

    fn fail(&self, err: WatchError) {
        let mut inner = self.shared.lock();
        if inner.cancelled || inner.session != self.id {
            return;
        }

        error!(error = ?err, "Deployment session failed: {err}");

        inner.state.is_errored = true;
        inner.state.error = Some(err.kind());
        inner.state.is_polling = false;
        inner.state.is_awaiting_code = false;
        inner.last_error = Some(Arc::new(err));
        inner.notify();
    }
}

fn poll_interval(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[instrument(name = "deployment_session", skip_all, fields(session = session.id))]
async fn run_session<C>(
    session: Session,
    chain: Arc<C>,
    config: Arc<WatcherConfig>,
    source: DeploymentSource,
) where
    C: ChainQuery,
{
    match drive(&session, chain.as_ref(), &config, source).await {
        Ok(()) => {}
        Err(Halt::Stale) => debug!("Session superseded"),
        Err(Halt::Failed(err)) => session.fail(err),
    }
}

async fn drive<C>(
    session: &Session,
    chain: &C,
    config: &WatcherConfig,
    source: DeploymentSource,
) -> Result<(), Halt>
where
    C: ChainQuery,
{
    let receipt = match source {
        DeploymentSource::Submission(submission) => {
            await_submission_mined(session, config, submission).await?
        }
        DeploymentSource::Recovered(tx_hash) => {
            await_recovered_mined(session, chain, config, tx_hash).await?
        }
    };

    if receipt.status != Some(1.into()) {
        return Err(WatchError::TransactionReverted {
            tx_hash: receipt.transaction_hash,
        }
        .into());
    }

    session.update(|state| {
        state.step = Step::Mined;
        state.is_polling = false;
    })?;

    info!(tx_hash = ?receipt.transaction_hash, "Deployment transaction mined");

    let address = extract_deployed_address(&receipt)?;

    session.update(|state| {
        state.deployed_address = Some(address);
        state.is_awaiting_code = true;
        state.is_polling = true;
    })?;

    await_code(session, chain, config, address).await
}

async fn await_submission_mined(
    session: &Session,
    config: &WatcherConfig,
    submission: Submission,
) -> Result<TransactionReceipt, Halt> {
    let Submission {
        tx_hash: mut hash_notification,
        mut outcome,
    } = submission;

    let mut resolved = None;
    let mut hash_pending = true;

    let tx_hash = loop {
        tokio::select! {
            hash = &mut hash_notification, if hash_pending => match hash {
                Ok(hash) => break hash,
                Err(_) => hash_pending = false,
            },
            result = &mut outcome => {
                let receipt = result.map_err(WatchError::submission)?;
                let hash = receipt.transaction_hash;
                resolved = Some(receipt);
                break hash;
            }
        }
    };

    session.update(|state| {
        state.transaction_hash = Some(tx_hash);
        state.step = Step::Submitted;
        state.is_polling = true;
    })?;

    info!(?tx_hash, "Transaction hash known, waiting for it to be mined");

    let mut ticker = poll_interval(config.mining_poll_interval());

    loop {
        tokio::select! {
            result = &mut outcome, if resolved.is_none() => {
                resolved = Some(result.map_err(WatchError::submission)?);
            }
            _ = ticker.tick() => {
                session.update(|state| state.step = state.step.confirming())?;

                if let Some(receipt) = resolved.take() {
                    return Ok(receipt);
                }
            }
        }
    }
}

async fn await_recovered_mined<C>(
    session: &Session,
    chain: &C,
    config: &WatcherConfig,
    tx_hash: TxHash,
) -> Result<TransactionReceipt, Halt>
where
    C: ChainQuery,
{
    info!(?tx_hash, "Resuming a pending deployment");

    let mut ticker = poll_interval(config.mining_poll_interval());

    loop {
        ticker.tick().await;

        session.update(|state| state.step = state.step.confirming())?;

        if let Some(receipt) = mined_receipt(chain, tx_hash).await? {
            return Ok(receipt);
        }
    }
}

async fn mined_receipt<C>(
    chain: &C,
    tx_hash: TxHash,
) -> Result<Option<TransactionReceipt>, WatchError>
where
    C: ChainQuery,
{
    let transaction =
        chain.transaction(tx_hash).await.map_err(WatchError::query)?;

    let Some(transaction) = transaction else {
        return Err(WatchError::UnknownTransaction { tx_hash });
    };

    if transaction.block_number.is_none() {
        debug!(?tx_hash, "Transaction not included yet");
        return Ok(None);
    }

    let receipt = chain
        .transaction_receipt(tx_hash)
        .await
        .map_err(WatchError::query)?;

    if receipt.is_none() {
        debug!(?tx_hash, "Transaction included, receipt not available yet");
    }

    Ok(receipt)
}

async fn await_code<C>(
    session: &Session,
    chain: &C,
    config: &WatcherConfig,
    address: Address,
) -> Result<(), Halt>
where
    C: ChainQuery,
{
    info!(?address, "Waiting for the contract code");

    let mut ticker = poll_interval(config.code_poll_interval());

    loop {
        ticker.tick().await;

        let code = chain.code(address).await.map_err(WatchError::query)?;

        if code.is_empty() {
            debug!(?address, "No code yet");
            continue;
        }

        session.update(|state| {
            state.step = Step::Deployed;
            state.is_polling = false;
            state.is_awaiting_code = false;
        })?;

        info!(?address, "Contract deployed");

        return Ok(());
    }
}

use futures::StreamExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use wave_provider::{EventStream, ProviderError, ProviderResult, WalletProvider, WaveContract};
use wave_types::{
    Account, OperationState, RawSubmission, Receipt, SessionState, Submission, WaveView,
};

use crate::config::ClientConfig;
use crate::error::WaveError;
use crate::state::{ClientEvent, SharedState};
use crate::subscription::{Listeners, SubscriptionHandle};

/// Session over one wallet and one wave portal contract.
///
/// Operations never panic and never leave a progress state behind: every
/// failure is recorded in the view (`WaveView::error`) and returned.
pub struct WaveClient<W, C> {
    wallet: Arc<W>,
    contract: Arc<C>,
    config: ClientConfig,
    state: Arc<SharedState>,
    submit_in_flight: AtomicBool,
    listeners: Arc<Mutex<Listeners>>,
}

/// Releases the submit slot and drops any progress indicator, including when
/// the submit future is cancelled mid-flight.
struct InFlight<'a> {
    flag: &'a AtomicBool,
    state: &'a SharedState,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.set_operation(OperationState::Idle);
        self.flag.store(false, Ordering::Release);
    }
}

async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    call: impl Future<Output = ProviderResult<T>>,
) -> Result<ProviderResult<T>, WaveError> {
    tokio::time::timeout(limit, call).await.map_err(|_| {
        warn!("{} timed out after {:?}", operation, limit);
        WaveError::Timeout { operation }
    })
}

impl<W, C> WaveClient<W, C>
where
    W: WalletProvider + 'static,
    C: WaveContract + 'static,
{
    pub fn new(wallet: Arc<W>, contract: Arc<C>, config: ClientConfig) -> Self {
        info!("wave client bound to contract {}", contract.address());
        Self {
            wallet,
            contract,
            config,
            state: Arc::new(SharedState::new()),
            submit_in_flight: AtomicBool::new(false),
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn view(&self) -> WaveView {
        self.state.snapshot()
    }

    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.state.subscribe()
    }

    pub fn set_draft(&self, draft: impl Into<String>) {
        let draft = draft.into();
        self.state.update(|view| view.draft = draft);
    }

    pub fn acknowledge_error(&self) {
        self.state.clear_error();
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        lock_listeners(&self.listeners)
    }

    fn report(&self, err: &WaveError) {
        match err {
            WaveError::Unclassified(source) => warn!("wave client error: {}", source),
            other => info!("wave client: {:?}", other),
        }
        self.state.set_error(err.to_string());
    }

    /// Adopts an account the wallet already authorized for this site. Never
    /// prompts.
    pub async fn detect_and_restore_session(&self) -> Result<SessionState, WaveError> {
        let result = self.restore_session().await;
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    async fn restore_session(&self) -> Result<SessionState, WaveError> {
        if !self.wallet.is_present() {
            return Err(WaveError::WalletNotInstalled);
        }

        let ready = bounded("is_ready", self.config.request_timeout, self.wallet.is_ready()).await??;
        if !ready {
            return Err(WaveError::ProviderNotReady);
        }

        let accounts = bounded(
            "eth_accounts",
            self.config.request_timeout,
            self.wallet.authorized_accounts(),
        )
        .await??;

        match accounts.into_iter().next() {
            Some(account) => {
                info!("found an authorized account: {}", account);
                self.state.connected(account);
            }
            None => info!("no authorized account found"),
        }
        Ok(self.state.session())
    }

    /// Asks the wallet for an account, which may show a consent prompt.
    pub async fn connect(&self) -> Result<Account, WaveError> {
        let Some(previous) = self.state.begin_connect() else {
            let err = WaveError::RequestAlreadyPending;
            self.report(&err);
            return Err(err);
        };

        match self.request_account().await {
            Ok(account) => {
                info!("connected {}", account);
                self.state.connected(account.clone());
                Ok(account)
            }
            Err(err) => {
                self.state.abandon_connect(previous);
                self.report(&err);
                Err(err)
            }
        }
    }

    async fn request_account(&self) -> Result<Account, WaveError> {
        if !self.wallet.is_present() {
            return Err(WaveError::WalletNotInstalled);
        }

        let accounts = bounded(
            "eth_requestAccounts",
            self.config.request_timeout,
            self.wallet.request_accounts(),
        )
        .await?
        .map_err(WaveError::from_connect)?;

        accounts
            .into_iter()
            .next()
            .ok_or(WaveError::ConnectRejected)
    }

    pub async fn submit_draft(&self) -> Result<Receipt, WaveError> {
        let draft = self.state.update(|view| view.draft.clone());
        self.submit(&draft).await
    }

    /// Sends a wave and waits for it to be mined, then resynchronizes the
    /// count and the list. A second call while one is in flight is refused.
    pub async fn submit(&self, message: &str) -> Result<Receipt, WaveError> {
        if self
            .submit_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("ignoring wave while another is in flight");
            return Err(WaveError::SubmitInFlight);
        }
        let _in_flight = InFlight {
            flag: &self.submit_in_flight,
            state: &self.state,
        };

        self.state.clear_error();
        let result = self.send_wave(message).await;
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    async fn send_wave(&self, message: &str) -> Result<Receipt, WaveError> {
        let account = self.resolve_account().await?;

        if let Some(expected) = &self.config.expected_chain_id {
            let actual =
                bounded("eth_chainId", self.config.request_timeout, self.wallet.chain_id()).await??;
            if &actual != expected {
                return Err(WaveError::WrongNetwork {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let count = bounded(
            "getTotalWaves",
            self.config.request_timeout,
            self.contract.total_count(),
        )
        .await??;
        info!("retrieved total wave count {}", count);

        self.state.set_operation(OperationState::Submitting);
        let pending = bounded(
            "wave",
            self.config.request_timeout,
            self.contract.submit(&account, message),
        )
        .await?
        .map_err(|err| WaveError::from_submit(err, self.config.cooldown_hint))?;
        info!("mining {}", pending.tx_hash);

        self.state.set_operation(OperationState::WaitingConfirmation);
        let receipt = bounded(
            "transaction confirmation",
            self.config.confirmation_timeout,
            self.contract.wait_for_receipt(&pending.tx_hash),
        )
        .await??;

        if !receipt.success {
            return Err(WaveError::ContractRejected {
                reason: None,
                retry_after: self.config.cooldown_hint,
            });
        }
        info!("mined {}", receipt.tx_hash);
        self.state.set_operation(OperationState::Idle);
        self.state.update(|view| view.draft.clear());

        // The wave is on chain; a failed refresh is reported, not returned.
        if let Err(err) = self.resync().await {
            self.report(&err);
        }
        Ok(receipt)
    }

    async fn resync(&self) -> Result<(), WaveError> {
        let count = bounded(
            "getTotalWaves",
            self.config.request_timeout,
            self.contract.total_count(),
        )
        .await??;
        info!("retrieved total wave count {}", count);
        self.state.set_total_count(count);
        self.load_submissions().await?;
        Ok(())
    }

    /// Re-reads the authorized account without prompting. Without one, the
    /// view is asked to show the connect prompt.
    async fn resolve_account(&self) -> Result<Account, WaveError> {
        if !self.wallet.is_present() {
            return Err(WaveError::WalletNotInstalled);
        }

        let accounts = bounded(
            "eth_accounts",
            self.config.request_timeout,
            self.wallet.authorized_accounts(),
        )
        .await??;

        match accounts.into_iter().next() {
            Some(account) => {
                self.state.connected(account.clone());
                Ok(account)
            }
            None => {
                if self.state.account().is_some() {
                    self.state.disconnected();
                }
                self.state.update(|view| view.connect_prompt = true);
                Err(WaveError::NotConnected)
            }
        }
    }

    /// Replaces the local list with the contract's full history and returns
    /// its length.
    pub async fn fetch_all_submissions(&self) -> Result<usize, WaveError> {
        let result = self.load_submissions().await;
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    async fn load_submissions(&self) -> Result<usize, WaveError> {
        if !self.wallet.is_present() {
            return Err(WaveError::WalletNotInstalled);
        }

        let raw = bounded(
            "getAllWaves",
            self.config.request_timeout,
            self.contract.all_submissions(),
        )
        .await??;

        let submissions = raw
            .into_iter()
            .map(Submission::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| WaveError::Unclassified(ProviderError::Decode(err.to_string())))?;

        let count = self.state.replace_submissions(submissions);
        debug!("loaded {} waves", count);
        Ok(count)
    }

    /// Appends waves pushed by the contract. Echoes of the connected
    /// account's own waves are dropped; the post-submit refetch already
    /// holds them. Replaces any earlier submission listener.
    pub async fn subscribe_to_new_submissions(&self) -> Result<SubscriptionHandle, WaveError> {
        let result = self.open_submission_stream().await;
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    async fn open_submission_stream(&self) -> Result<SubscriptionHandle, WaveError> {
        if self.state.session() != SessionState::Connected {
            return Err(WaveError::NotConnected);
        }

        let stream = bounded(
            "NewWave subscription",
            self.config.request_timeout,
            self.contract.new_submissions(),
        )
        .await??;

        let task = tokio::spawn(listen_for_waves(
            stream,
            Arc::clone(&self.wallet),
            Arc::clone(&self.state),
            self.config.request_timeout,
        ));
        let handle = SubscriptionHandle::new(task.abort_handle());
        self.listeners().replace_submissions(task.abort_handle());
        info!("listening for NewWave on {}", self.contract.address());
        Ok(handle)
    }

    /// Follows account switches made inside the wallet.
    pub async fn watch_accounts(&self) -> Result<SubscriptionHandle, WaveError> {
        let result = self.open_account_stream().await;
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    async fn open_account_stream(&self) -> Result<SubscriptionHandle, WaveError> {
        if !self.wallet.is_present() {
            return Err(WaveError::WalletNotInstalled);
        }

        let stream = bounded(
            "accountsChanged subscription",
            self.config.request_timeout,
            self.wallet.account_changes(),
        )
        .await??;

        let task = tokio::spawn(listen_for_accounts(
            stream,
            Arc::clone(&self.state),
            Arc::clone(&self.listeners),
        ));
        let handle = SubscriptionHandle::new(task.abort_handle());
        self.listeners().replace_accounts(task.abort_handle());
        Ok(handle)
    }
}

impl<W, C> Drop for WaveClient<W, C> {
    fn drop(&mut self) {
        lock_listeners(&self.listeners).abort_all();
    }
}

fn lock_listeners(listeners: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
    listeners.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn listen_for_waves<W: WalletProvider>(
    mut stream: EventStream<RawSubmission>,
    wallet: Arc<W>,
    state: Arc<SharedState>,
    request_timeout: Duration,
) {
    while let Some(event) = stream.next().await {
        let raw = match event {
            Ok(raw) => raw,
            Err(err) => {
                warn!("NewWave stream error: {}", err);
                continue;
            }
        };

        let current = match bounded("eth_accounts", request_timeout, wallet.authorized_accounts()).await {
            Ok(Ok(accounts)) => accounts.into_iter().next(),
            Ok(Err(err)) => {
                warn!("could not resolve the current account: {}", err);
                None
            }
            Err(_) => None,
        };
        let current = current.or_else(|| state.account());

        if current.as_ref().is_some_and(|account| account.matches(&raw.sender)) {
            debug!("ignoring NewWave echo from {}", raw.sender);
            continue;
        }

        match Submission::try_from(raw) {
            Ok(submission) => {
                debug!("NewWave from {}", submission.sender);
                state.append_submission(submission);
            }
            Err(err) => warn!("dropping NewWave event: {}", err),
        }
    }
    debug!("NewWave stream closed");
}

/// Follows the wallet's account list. Losing every account also stops the
/// NewWave listener, which only runs for a connected session.
async fn listen_for_accounts(
    mut stream: EventStream<Vec<Account>>,
    state: Arc<SharedState>,
    listeners: Arc<Mutex<Listeners>>,
) {
    while let Some(event) = stream.next().await {
        match event {
            Ok(accounts) => match accounts.into_iter().next() {
                Some(account) => {
                    info!("wallet switched to {}", account);
                    state.connected(account);
                }
                None => {
                    info!("wallet disconnected all accounts");
                    state.disconnected();
                    lock_listeners(&listeners).abort_submissions();
                }
            },
            Err(err) => warn!("accountsChanged stream error: {}", err),
        }
    }
    debug!("accountsChanged stream closed");
}

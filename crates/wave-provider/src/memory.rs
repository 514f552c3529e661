//! In-memory wallet and contract, used by tests and local demos.

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use wave_types::{Account, ChainId, ContractAddress, PendingTx, RawSubmission, Receipt, TxHash};

use crate::{EventStream, ProviderError, ProviderResult, WalletProvider, WaveContract, codes};

/// How the wallet answers an authorization prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Approve,
    Reject,
    /// The user never answers.
    Ignore,
    /// A prompt from an earlier request is still open.
    Busy,
}

struct WalletInner {
    present: bool,
    ready: bool,
    selected: Account,
    authorized: Vec<Account>,
    approval: Approval,
    chain_id: ChainId,
    prompts: usize,
    listeners: Vec<UnboundedSender<ProviderResult<Vec<Account>>>>,
}

pub struct MemoryWallet {
    inner: Mutex<WalletInner>,
}

impl MemoryWallet {
    pub fn new(selected: Account, chain_id: ChainId) -> Self {
        Self {
            inner: Mutex::new(WalletInner {
                present: true,
                ready: true,
                selected,
                authorized: Vec::new(),
                approval: Approval::Approve,
                chain_id,
                prompts: 0,
                listeners: Vec::new(),
            }),
        }
    }

    pub fn absent() -> Self {
        let wallet = Self::new(Account(String::new()), ChainId("0x1".to_owned()));
        wallet.lock().present = false;
        wallet
    }

    fn lock(&self) -> MutexGuard<'_, WalletInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the selected account as already authorized for this site.
    pub fn authorize(&self) {
        let mut inner = self.lock();
        inner.authorized = vec![inner.selected.clone()];
    }

    pub fn set_ready(&self, ready: bool) {
        self.lock().ready = ready;
    }

    pub fn set_approval(&self, approval: Approval) {
        self.lock().approval = approval;
    }

    pub fn set_chain_id(&self, chain_id: ChainId) {
        self.lock().chain_id = chain_id;
    }

    /// Number of authorization prompts shown so far.
    pub fn prompts(&self) -> usize {
        self.lock().prompts
    }

    /// Simulates the user switching (or disconnecting) accounts inside the
    /// wallet, notifying `account_changes` listeners.
    pub fn switch_account(&self, account: Option<Account>) {
        let mut inner = self.lock();
        if let Some(account) = &account {
            inner.selected = account.clone();
        }
        inner.authorized = account.into_iter().collect();
        let accounts = inner.authorized.clone();
        inner
            .listeners
            .retain(|tx| tx.unbounded_send(Ok(accounts.clone())).is_ok());
    }
}

#[async_trait]
impl WalletProvider for MemoryWallet {
    fn is_present(&self) -> bool {
        self.lock().present
    }

    async fn is_ready(&self) -> ProviderResult<bool> {
        let inner = self.lock();
        if !inner.present {
            return Err(ProviderError::NotInstalled);
        }
        Ok(inner.ready)
    }

    async fn request_accounts(&self) -> ProviderResult<Vec<Account>> {
        let approval = {
            let mut inner = self.lock();
            if !inner.present {
                return Err(ProviderError::NotInstalled);
            }
            inner.prompts += 1;
            inner.approval
        };

        match approval {
            Approval::Approve => {
                let mut inner = self.lock();
                inner.authorized = vec![inner.selected.clone()];
                Ok(inner.authorized.clone())
            }
            Approval::Reject => Err(ProviderError::rpc(
                codes::USER_REJECTED,
                "User rejected the request.",
            )),
            Approval::Busy => Err(ProviderError::rpc(
                codes::REQUEST_PENDING,
                "Request of type 'wallet_requestPermissions' already pending",
            )),
            Approval::Ignore => futures::future::pending().await,
        }
    }

    async fn authorized_accounts(&self) -> ProviderResult<Vec<Account>> {
        let inner = self.lock();
        if !inner.present {
            return Err(ProviderError::NotInstalled);
        }
        Ok(inner.authorized.clone())
    }

    async fn chain_id(&self) -> ProviderResult<ChainId> {
        Ok(self.lock().chain_id.clone())
    }

    async fn account_changes(&self) -> ProviderResult<EventStream<Vec<Account>>> {
        let (tx, rx) = unbounded();
        self.lock().listeners.push(tx);
        Ok(rx.boxed())
    }
}

struct PortalInner {
    waves: Vec<RawSubmission>,
    now_seconds: u64,
    cooldown_seconds: u64,
    last_waved_at: HashMap<String, u64>,
    receipts: HashMap<String, Receipt>,
    next_nonce: u64,
    hold_receipts: bool,
    fail_next_submit: Option<ProviderError>,
    submit_calls: usize,
    listeners: Vec<UnboundedSender<ProviderResult<RawSubmission>>>,
}

/// A wave portal that mines every transaction instantly and enforces the
/// per-sender cooldown the deployed contract uses.
pub struct MemoryWavePortal {
    address: ContractAddress,
    inner: Mutex<PortalInner>,
}

impl MemoryWavePortal {
    pub fn new(address: ContractAddress) -> Self {
        Self {
            address,
            inner: Mutex::new(PortalInner {
                waves: Vec::new(),
                now_seconds: 1_640_995_200,
                cooldown_seconds: 60,
                last_waved_at: HashMap::new(),
                receipts: HashMap::new(),
                next_nonce: 1,
                hold_receipts: false,
                fail_next_submit: None,
                submit_calls: 0,
                listeners: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PortalInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_waves(self, waves: Vec<RawSubmission>) -> Self {
        self.lock().waves = waves;
        self
    }

    pub fn set_cooldown_seconds(&self, seconds: u64) {
        self.lock().cooldown_seconds = seconds;
    }

    pub fn advance_clock(&self, seconds: u64) {
        self.lock().now_seconds += seconds;
    }

    /// Receipts never arrive while held.
    pub fn hold_receipts(&self, hold: bool) {
        self.lock().hold_receipts = hold;
    }

    pub fn fail_next_submit(&self, err: ProviderError) {
        self.lock().fail_next_submit = Some(err);
    }

    pub fn submit_calls(&self) -> usize {
        self.lock().submit_calls
    }

    /// Live `new_submissions` streams.
    pub fn listener_count(&self) -> usize {
        let mut inner = self.lock();
        inner.listeners.retain(|tx| !tx.is_closed());
        inner.listeners.len()
    }

    /// Records a wave from some other visitor and pushes the event.
    pub fn wave_from(&self, sender: &str, message: &str) {
        let mut inner = self.lock();
        let wave = RawSubmission {
            sender: sender.to_owned(),
            timestamp_seconds: inner.now_seconds,
            message: message.to_owned(),
        };
        Self::record(&mut inner, wave);
    }

    fn record(inner: &mut PortalInner, wave: RawSubmission) {
        inner
            .last_waved_at
            .insert(wave.sender.to_ascii_lowercase(), wave.timestamp_seconds);
        inner.waves.push(wave.clone());
        inner
            .listeners
            .retain(|tx| tx.unbounded_send(Ok(wave.clone())).is_ok());
    }
}

#[async_trait]
impl WaveContract for MemoryWavePortal {
    fn address(&self) -> &ContractAddress {
        &self.address
    }

    async fn total_count(&self) -> ProviderResult<u64> {
        Ok(self.lock().waves.len() as u64)
    }

    async fn all_submissions(&self) -> ProviderResult<Vec<RawSubmission>> {
        Ok(self.lock().waves.clone())
    }

    async fn submit(&self, from: &Account, message: &str) -> ProviderResult<PendingTx> {
        let mut inner = self.lock();
        inner.submit_calls += 1;

        if let Some(err) = inner.fail_next_submit.take() {
            return Err(err);
        }

        let sender = from.0.to_ascii_lowercase();
        if let Some(last) = inner.last_waved_at.get(&sender).copied() {
            if last + inner.cooldown_seconds > inner.now_seconds {
                let wait = last + inner.cooldown_seconds - inner.now_seconds;
                return Err(ProviderError::reverted(format!("Wait {wait}s")));
            }
        }

        let tx_hash = TxHash(format!("0x{:064x}", inner.next_nonce));
        inner.next_nonce += 1;
        let block_number = inner.next_nonce;

        let wave = RawSubmission {
            sender: from.0.clone(),
            timestamp_seconds: inner.now_seconds,
            message: message.to_owned(),
        };
        Self::record(&mut inner, wave);
        inner.receipts.insert(
            tx_hash.0.clone(),
            Receipt {
                tx_hash: tx_hash.clone(),
                block_number: Some(block_number),
                success: true,
            },
        );
        debug!("memory portal mined {}", tx_hash);

        Ok(PendingTx { tx_hash })
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> ProviderResult<Receipt> {
        let receipt = {
            let inner = self.lock();
            if inner.hold_receipts {
                None
            } else {
                Some(inner.receipts.get(&tx_hash.0).cloned())
            }
        };

        match receipt {
            Some(Some(receipt)) => Ok(receipt),
            Some(None) => Err(ProviderError::rpc(
                codes::INTERNAL,
                format!("unknown transaction {tx_hash}"),
            )),
            None => futures::future::pending().await,
        }
    }

    async fn new_submissions(&self) -> ProviderResult<EventStream<RawSubmission>> {
        let (tx, rx) = unbounded();
        self.lock().listeners.push(tx);
        Ok(rx.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portal() -> MemoryWavePortal {
        MemoryWavePortal::new(ContractAddress(
            "0x4fe1043cfea32d20586f2116b082866817b92356".to_owned(),
        ))
    }

    #[tokio::test]
    async fn portal_enforces_cooldown_per_sender() {
        let portal = portal();
        let alice = Account("0xA11CE".to_owned());

        portal.submit(&alice, "pizza").await.expect("first wave");
        let err = portal.submit(&alice, "tacos").await.expect_err("cooldown");
        assert_eq!(err.revert_reason().as_deref(), Some("Wait 60s"));

        portal.advance_clock(61);
        portal.submit(&alice, "tacos").await.expect("after cooldown");
        assert_eq!(portal.total_count().await.expect("count"), 2);
        assert_eq!(portal.submit_calls(), 3);
    }

    #[tokio::test]
    async fn portal_pushes_to_live_listeners() {
        let portal = portal();
        let mut stream = portal.new_submissions().await.expect("subscribe");
        assert_eq!(portal.listener_count(), 1);

        portal.wave_from("0xB0B", "ramen");
        let event = stream.next().await.expect("event").expect("ok");
        assert_eq!(event.sender, "0xB0B");
        assert_eq!(event.message, "ramen");

        drop(stream);
        assert_eq!(portal.listener_count(), 0);
    }

    #[tokio::test]
    async fn wallet_prompts_and_authorizes() {
        let wallet = MemoryWallet::new(Account("0xA11CE".to_owned()), ChainId("0x3".to_owned()));
        assert!(wallet.authorized_accounts().await.expect("accounts").is_empty());

        let accounts = wallet.request_accounts().await.expect("approve");
        assert_eq!(accounts, vec![Account("0xA11CE".to_owned())]);
        assert_eq!(wallet.prompts(), 1);
        assert_eq!(wallet.authorized_accounts().await.expect("accounts").len(), 1);

        wallet.set_approval(Approval::Reject);
        let err = wallet.request_accounts().await.expect_err("reject");
        assert!(err.is_user_rejected());
    }

    #[tokio::test]
    async fn absent_wallet_reports_not_installed() {
        let wallet = MemoryWallet::absent();
        assert!(!wallet.is_present());
        assert_eq!(wallet.is_ready().await, Err(ProviderError::NotInstalled));
    }
}

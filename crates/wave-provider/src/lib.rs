mod error;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use wave_types::{Account, ChainId, ContractAddress, PendingTx, RawSubmission, Receipt, TxHash};

pub use error::{ProviderError, ProviderResult, codes};

/// Push notifications from a wallet or contract. Dropping the stream
/// unsubscribes.
pub type EventStream<T> = BoxStream<'static, ProviderResult<T>>;

/// Account authorization and network introspection, as exposed by an
/// EIP-1193 wallet.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn is_present(&self) -> bool;
    async fn is_ready(&self) -> ProviderResult<bool>;
    /// May show a consent prompt.
    async fn request_accounts(&self) -> ProviderResult<Vec<Account>>;
    /// Never prompts.
    async fn authorized_accounts(&self) -> ProviderResult<Vec<Account>>;
    async fn chain_id(&self) -> ProviderResult<ChainId>;
    async fn account_changes(&self) -> ProviderResult<EventStream<Vec<Account>>>;
}

/// The wave portal contract at one fixed address.
#[async_trait]
pub trait WaveContract: Send + Sync {
    fn address(&self) -> &ContractAddress;
    async fn total_count(&self) -> ProviderResult<u64>;
    async fn all_submissions(&self) -> ProviderResult<Vec<RawSubmission>>;
    /// Returns once the transaction is accepted into the pending pool.
    async fn submit(&self, from: &Account, message: &str) -> ProviderResult<PendingTx>;
    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> ProviderResult<Receipt>;
    async fn new_submissions(&self) -> ProviderResult<EventStream<RawSubmission>>;
}

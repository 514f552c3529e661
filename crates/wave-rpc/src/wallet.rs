use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use wave_provider::{EventStream, ProviderError, ProviderResult, WalletProvider};
use wave_types::{Account, ChainId};

use crate::transport::RpcTransport;

/// Wallet backed by a node's managed accounts (a dev node such as anvil or
/// geth `--dev`, or a signer proxy speaking EIP-1193 over HTTP).
///
/// There is no push channel over plain HTTP, so `accountsChanged` is
/// emulated by polling `eth_accounts`.
pub struct RpcWallet {
    transport: Arc<RpcTransport>,
    poll_interval: Duration,
}

impl RpcWallet {
    pub fn new(transport: Arc<RpcTransport>, poll_interval: Duration) -> Self {
        Self {
            transport,
            poll_interval,
        }
    }

    async fn accounts(&self, method: &str) -> ProviderResult<Vec<Account>> {
        let accounts: Vec<String> = self.transport.request(method, json!([])).await?;
        Ok(accounts.into_iter().map(Account).collect())
    }
}

struct AccountPoller {
    transport: Arc<RpcTransport>,
    poll_interval: Duration,
    last: Vec<Account>,
}

impl AccountPoller {
    async fn next(mut self) -> Option<(ProviderResult<Vec<Account>>, Self)> {
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let current: Vec<String> = match self.transport.request("eth_accounts", json!([])).await {
                Ok(current) => current,
                Err(err) => return Some((Err(err), self)),
            };

            let current: Vec<Account> = current.into_iter().map(Account).collect();
            let unchanged = current.len() == self.last.len()
                && current
                    .iter()
                    .zip(&self.last)
                    .all(|(now, before)| now.matches(&before.0));
            if !unchanged {
                self.last = current.clone();
                return Some((Ok(current), self));
            }
        }
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    fn is_present(&self) -> bool {
        !self.transport.endpoint().is_empty()
    }

    async fn is_ready(&self) -> ProviderResult<bool> {
        match self.transport.request::<_, String>("eth_chainId", json!([])).await {
            Ok(_) => Ok(true),
            Err(ProviderError::Transport(err)) => {
                warn!("wallet endpoint {} unreachable: {}", self.transport.endpoint(), err);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    async fn request_accounts(&self) -> ProviderResult<Vec<Account>> {
        match self.accounts("eth_requestAccounts").await {
            Err(err) if err.is_method_not_found() => {
                debug!("eth_requestAccounts unsupported, falling back to eth_accounts");
                self.accounts("eth_accounts").await
            }
            other => other,
        }
    }

    async fn authorized_accounts(&self) -> ProviderResult<Vec<Account>> {
        self.accounts("eth_accounts").await
    }

    async fn chain_id(&self) -> ProviderResult<ChainId> {
        let chain_id: String = self.transport.request("eth_chainId", json!([])).await?;
        Ok(ChainId(chain_id))
    }

    async fn account_changes(&self) -> ProviderResult<EventStream<Vec<Account>>> {
        let poller = AccountPoller {
            transport: Arc::clone(&self.transport),
            poll_interval: self.poll_interval,
            last: self.authorized_accounts().await?,
        };
        Ok(futures::stream::unfold(poller, AccountPoller::next).boxed())
    }
}

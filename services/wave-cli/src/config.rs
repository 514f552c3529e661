use anyhow::{Context, Result, bail};
use clap::Args;
use std::time::Duration;
use wave_client::{ClientConfig, DEFAULT_CONTRACT_ADDRESS};
use wave_types::{ChainId, ContractAddress};

/// Connection settings shared by every subcommand. Each flag can also come
/// from its `WAVE_*` environment variable.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// JSON-RPC endpoint of a node that holds the visitor's keys.
    #[arg(long, env = "WAVE_RPC_URL")]
    pub rpc_url: Option<String>,

    #[arg(long, env = "WAVE_CONTRACT_ADDRESS", default_value = DEFAULT_CONTRACT_ADDRESS)]
    pub contract: String,

    /// Refuse to wave unless the node reports this chain (hex or decimal).
    #[arg(long, env = "WAVE_CHAIN_ID")]
    pub chain_id: Option<String>,

    #[arg(long, env = "WAVE_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    #[arg(long, env = "WAVE_CONFIRMATION_TIMEOUT_SECS", default_value_t = 300)]
    pub confirmation_timeout_secs: u64,

    #[arg(long, env = "WAVE_POLL_INTERVAL_MS", default_value_t = 2000)]
    pub poll_interval_ms: u64,

    #[arg(long, env = "WAVE_COOLDOWN_SECS", default_value_t = 60)]
    pub cooldown_secs: u64,
}

impl Settings {
    pub fn client_config(&self) -> Result<ClientConfig> {
        if self.timeout_secs == 0 || self.confirmation_timeout_secs == 0 {
            bail!("timeouts must be at least one second");
        }

        let expected_chain_id = match &self.chain_id {
            Some(raw) => {
                let chain_id = ChainId(raw.trim().to_owned());
                chain_id
                    .as_u64()
                    .with_context(|| format!("invalid chain id {raw:?}"))?;
                Some(chain_id)
            }
            None => None,
        };

        Ok(ClientConfig {
            expected_chain_id,
            request_timeout: Duration::from_secs(self.timeout_secs),
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
            cooldown_hint: Duration::from_secs(self.cooldown_secs),
        })
    }

    pub fn contract_address(&self) -> ContractAddress {
        ContractAddress(self.contract.trim().to_owned())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }
}

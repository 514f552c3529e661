use std::time::Duration;
use wave_types::ChainId;

/// The public wave portal deployment on Ropsten.
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x4fe1043cfea32d20586f2116b082866817b92356";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_COOLDOWN_HINT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// When set, waves are refused unless the wallet is on this chain.
    pub expected_chain_id: Option<ChainId>,
    /// Bound on every wallet or contract call, prompts included.
    pub request_timeout: Duration,
    /// Bound on waiting for a mined receipt.
    pub confirmation_timeout: Duration,
    /// How long the contract makes a sender wait between waves.
    pub cooldown_hint: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            expected_chain_id: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            cooldown_hint: DEFAULT_COOLDOWN_HINT,
        }
    }
}

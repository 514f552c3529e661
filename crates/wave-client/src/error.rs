use std::time::Duration;
use thiserror::Error;
use wave_provider::ProviderError;
use wave_types::ChainId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No wallet, or a wallet that has not finished starting.
    Environment,
    Authorization,
    Network,
    ContractRejection,
    Timeout,
    Busy,
    Unclassified,
}

/// Every failure a `WaveClient` operation can end in. The `Display` text is
/// the message shown to the visitor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WaveError {
    #[error("No wallet found. Install a wallet extension such as MetaMask, then reload.")]
    WalletNotInstalled,
    #[error("Your wallet is still starting up. Try again in a few seconds.")]
    ProviderNotReady,
    #[error("The wallet connection was rejected. Click connect to try again.")]
    ConnectRejected,
    #[error(
        "A connection request is already open in your wallet. Open the wallet to approve or dismiss it."
    )]
    RequestAlreadyPending,
    #[error("Connect your wallet before waving.")]
    NotConnected,
    #[error("You rejected the transaction in your wallet.")]
    SigningRejected,
    #[error("Wrong network: switch your wallet to chain {expected} (it is on {actual}) and try again.")]
    WrongNetwork { expected: ChainId, actual: ChainId },
    /// `reason` is the contract's revert string, when it gave one.
    #[error("{}", rejection_message(.reason.as_deref(), .retry_after))]
    ContractRejected {
        reason: Option<String>,
        retry_after: Duration,
    },
    #[error("{operation} did not complete in time. Try again.")]
    Timeout { operation: &'static str },
    #[error("A wave is already on its way.")]
    SubmitInFlight,
    #[error("Something went wrong. Try again later.")]
    Unclassified(#[source] ProviderError),
}

impl WaveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WalletNotInstalled | Self::ProviderNotReady => ErrorKind::Environment,
            Self::ConnectRejected
            | Self::RequestAlreadyPending
            | Self::NotConnected
            | Self::SigningRejected => ErrorKind::Authorization,
            Self::WrongNetwork { .. } => ErrorKind::Network,
            Self::ContractRejected { .. } => ErrorKind::ContractRejection,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::SubmitInFlight => ErrorKind::Busy,
            Self::Unclassified(_) => ErrorKind::Unclassified,
        }
    }

    /// Whether repeating the same action later can succeed without the
    /// visitor changing anything.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::WalletNotInstalled
            | Self::SigningRejected
            | Self::WrongNetwork { .. }
            | Self::NotConnected => false,
            Self::ProviderNotReady
            | Self::ConnectRejected
            | Self::RequestAlreadyPending
            | Self::ContractRejected { .. }
            | Self::Timeout { .. }
            | Self::SubmitInFlight
            | Self::Unclassified(_) => true,
        }
    }

    pub(crate) fn from_connect(err: ProviderError) -> Self {
        if err.is_user_rejected() {
            Self::ConnectRejected
        } else {
            Self::from(err)
        }
    }

    pub(crate) fn from_submit(err: ProviderError, cooldown: Duration) -> Self {
        if err.is_user_rejected() {
            return Self::SigningRejected;
        }
        match err.revert_reason() {
            Some(reason) => Self::ContractRejected {
                reason: Some(reason).filter(|reason| !reason.is_empty()),
                retry_after: cooldown,
            },
            None => Self::from(err),
        }
    }
}

/// The contract's own reason already says how long to wait, so the
/// configured hint is only shown without one.
fn rejection_message(reason: Option<&str>, retry_after: &Duration) -> String {
    match reason {
        Some(reason) => format!("The contract turned the wave down: {reason}."),
        None => format!(
            "The contract turned the wave down. Wait {}s and try again.",
            retry_after.as_secs()
        ),
    }
}

impl From<ProviderError> for WaveError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotInstalled => Self::WalletNotInstalled,
            ProviderError::NotReady => Self::ProviderNotReady,
            err if err.is_request_pending() => Self::RequestAlreadyPending,
            err => Self::Unclassified(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wave_provider::codes;

    #[test]
    fn submit_errors_are_classified() {
        let cooldown = Duration::from_secs(60);

        let rejected = WaveError::from_submit(
            ProviderError::rpc(codes::USER_REJECTED, "User denied transaction signature."),
            cooldown,
        );
        assert_eq!(rejected, WaveError::SigningRejected);
        assert!(!rejected.is_retryable());

        let cooldown_hit = WaveError::from_submit(ProviderError::reverted("Wait 15m"), cooldown);
        assert_eq!(cooldown_hit.kind(), ErrorKind::ContractRejection);
        assert!(cooldown_hit.is_retryable());
        assert_eq!(
            cooldown_hit.to_string(),
            "The contract turned the wave down: Wait 15m."
        );

        let bare_revert = WaveError::from_submit(
            ProviderError::rpc(codes::EXECUTION_REVERTED, "reverted"),
            cooldown,
        );
        assert_eq!(
            bare_revert,
            WaveError::ContractRejected {
                reason: None,
                retry_after: cooldown,
            }
        );
        assert_eq!(
            bare_revert.to_string(),
            "The contract turned the wave down. Wait 60s and try again."
        );

        let other = WaveError::from_submit(ProviderError::Transport("reset".to_owned()), cooldown);
        assert_eq!(other.kind(), ErrorKind::Unclassified);
        assert_eq!(other.to_string(), "Something went wrong. Try again later.");
    }

    #[test]
    fn connect_errors_are_classified() {
        assert_eq!(
            WaveError::from_connect(ProviderError::rpc(codes::USER_REJECTED, "rejected")),
            WaveError::ConnectRejected
        );
        assert_eq!(
            WaveError::from_connect(ProviderError::rpc(codes::REQUEST_PENDING, "already pending")),
            WaveError::RequestAlreadyPending
        );
        assert_eq!(
            WaveError::from_connect(ProviderError::NotInstalled),
            WaveError::WalletNotInstalled
        );
    }

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(WaveError::ProviderNotReady.kind(), ErrorKind::Environment);
        assert_eq!(WaveError::RequestAlreadyPending.kind(), ErrorKind::Authorization);
        let wrong = WaveError::WrongNetwork {
            expected: ChainId("0x3".to_owned()),
            actual: ChainId("0x1".to_owned()),
        };
        assert_eq!(wrong.kind(), ErrorKind::Network);
        assert_eq!(
            wrong.to_string(),
            "Wrong network: switch your wallet to chain 3 (it is on 1) and try again."
        );
        let timeout = WaveError::Timeout {
            operation: "getAllWaves",
        };
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert_eq!(
            timeout.to_string(),
            "getAllWaves did not complete in time. Try again."
        );
        assert_eq!(WaveError::SubmitInFlight.kind(), ErrorKind::Busy);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account(pub String);

impl Account {
    /// Wallets and nodes disagree on checksum casing, so identity is
    /// compared case-insensitively.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractAddress(pub String);

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chain identifier as reported by a wallet (`"0x5"`) or configured by a
/// user (`"5"`).
#[derive(Debug, Clone, Serialize, Deserialize, Eq)]
pub struct ChainId(pub String);

impl ChainId {
    pub fn as_u64(&self) -> Option<u64> {
        let raw = self.0.trim();
        match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => raw.parse().ok(),
        }
    }
}

impl PartialEq for ChainId {
    fn eq(&self, other: &Self) -> bool {
        match (self.as_u64(), other.as_u64()) {
            (Some(a), Some(b)) => a == b,
            _ => self.0.trim().eq_ignore_ascii_case(other.0.trim()),
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_u64() {
            Some(id) => write!(f, "{id}"),
            None => f.write_str(&self.0),
        }
    }
}

/// A wave as the contract reports it, before timestamp conversion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawSubmission {
    pub sender: String,
    pub timestamp_seconds: u64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Submission {
    pub sender: Account,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("timestamp {0} is outside the representable range")]
    TimestampOutOfRange(u64),
}

impl TryFrom<RawSubmission> for Submission {
    type Error = SubmissionError;

    fn try_from(raw: RawSubmission) -> Result<Self, Self::Error> {
        let seconds = i64::try_from(raw.timestamp_seconds)
            .map_err(|_| SubmissionError::TimestampOutOfRange(raw.timestamp_seconds))?;
        let timestamp = DateTime::from_timestamp(seconds, 0)
            .ok_or(SubmissionError::TimestampOutOfRange(raw.timestamp_seconds))?;

        Ok(Self {
            sender: Account(raw.sender),
            timestamp,
            message: raw.message,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Disconnected,
    ConnectPending,
    Connected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    #[default]
    Idle,
    Submitting,
    WaitingConfirmation,
}

impl OperationState {
    pub fn is_busy(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingTx {
    pub tx_hash: TxHash,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// Everything a rendering layer needs to draw the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaveView {
    pub account: Option<Account>,
    pub session: SessionState,
    pub operation: OperationState,
    pub submissions: Vec<Submission>,
    pub total_count: u64,
    pub error: Option<String>,
    pub draft: String,
    /// Set when a wave was attempted without a connected wallet.
    pub connect_prompt: bool,
}

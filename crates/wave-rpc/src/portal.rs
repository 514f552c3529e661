use alloy_primitives::{Address, B256, Bytes, U256, hex};
use alloy_sol_types::{SolCall, SolEvent, sol};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use wave_provider::{EventStream, ProviderError, ProviderResult, WaveContract};
use wave_types::{Account, ContractAddress, PendingTx, RawSubmission, Receipt, TxHash};

use crate::transport::{RpcTransport, parse_quantity, to_quantity};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct Wave {
        address waver;
        string message;
        uint256 timestamp;
    }

    #[derive(Debug, PartialEq, Eq)]
    event NewWave(address indexed from, uint256 timestamp, string message);

    function wave(string _message) external;
    function getAllWaves() external view returns (Wave[] memory);
    function getTotalWaves() external view returns (uint256);
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    topics: Vec<B256>,
    data: Bytes,
    #[serde(default)]
    removed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
}

/// The wave portal contract reached through a node's JSON-RPC interface.
///
/// Reads go through `eth_call`; `wave` is sent with `eth_sendTransaction`
/// so the node (or the wallet in front of it) signs with the given account.
/// Receipts and `NewWave` logs are polled every `poll_interval`.
pub struct WavePortalRpc {
    transport: Arc<RpcTransport>,
    address: ContractAddress,
    poll_interval: Duration,
}

impl WavePortalRpc {
    pub fn new(
        transport: Arc<RpcTransport>,
        address: ContractAddress,
        poll_interval: Duration,
    ) -> ProviderResult<Self> {
        Address::from_str(&address.0)
            .map_err(|err| ProviderError::Decode(format!("contract address {address}: {err}")))?;
        Ok(Self {
            transport,
            address,
            poll_interval,
        })
    }

    async fn call<C: SolCall>(&self, call: C) -> ProviderResult<C::Return> {
        let data = hex::encode_prefixed(call.abi_encode());
        let raw: Bytes = self
            .transport
            .request(
                "eth_call",
                json!([{ "to": self.address.0, "data": data }, "latest"]),
            )
            .await?;

        C::abi_decode_returns(&raw, true)
            .map_err(|err| ProviderError::Decode(format!("{}: {err}", C::SIGNATURE)))
    }

    async fn block_number(&self) -> ProviderResult<u64> {
        let raw: String = self.transport.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&raw)
    }
}

fn to_u64(value: U256, field: &str) -> ProviderResult<u64> {
    u64::try_from(value).map_err(|_| ProviderError::Decode(format!("{field} {value} overflows u64")))
}

fn wave_to_raw(wave: Wave) -> ProviderResult<RawSubmission> {
    Ok(RawSubmission {
        sender: wave.waver.to_string(),
        timestamp_seconds: to_u64(wave.timestamp, "timestamp")?,
        message: wave.message,
    })
}

fn decode_new_wave(log: RpcLog) -> ProviderResult<RawSubmission> {
    let event = NewWave::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(|err| ProviderError::Decode(format!("NewWave log: {err}")))?;

    Ok(RawSubmission {
        sender: event.from.to_string(),
        timestamp_seconds: to_u64(event.timestamp, "timestamp")?,
        message: event.message,
    })
}

fn receipt_from_rpc(receipt: RpcReceipt) -> ProviderResult<Receipt> {
    let block_number = receipt
        .block_number
        .as_deref()
        .map(parse_quantity)
        .transpose()?;
    // Pre-Byzantium receipts carry no status; treat them as successful.
    let success = match receipt.status.as_deref() {
        Some(status) => parse_quantity(status)? == 1,
        None => true,
    };

    Ok(Receipt {
        tx_hash: TxHash(receipt.transaction_hash),
        block_number,
        success,
    })
}

struct LogCursor {
    transport: Arc<RpcTransport>,
    address: ContractAddress,
    poll_interval: Duration,
    next_block: u64,
    buffered: VecDeque<RawSubmission>,
}

impl LogCursor {
    async fn poll(&mut self) -> ProviderResult<()> {
        let head: String = self.transport.request("eth_blockNumber", json!([])).await?;
        let head = parse_quantity(&head)?;
        if head < self.next_block {
            return Ok(());
        }

        let filter = json!([{
            "address": self.address.0,
            "topics": [NewWave::SIGNATURE_HASH],
            "fromBlock": to_quantity(self.next_block),
            "toBlock": to_quantity(head),
        }]);
        let logs: Vec<RpcLog> = self.transport.request("eth_getLogs", filter).await?;
        self.next_block = head + 1;

        for log in logs.into_iter().filter(|log| !log.removed) {
            match decode_new_wave(log) {
                Ok(wave) => self.buffered.push_back(wave),
                Err(err) => warn!("skipping undecodable NewWave log: {}", err),
            }
        }
        Ok(())
    }

    async fn next(mut self) -> Option<(ProviderResult<RawSubmission>, Self)> {
        loop {
            if let Some(wave) = self.buffered.pop_front() {
                return Some((Ok(wave), self));
            }

            tokio::time::sleep(self.poll_interval).await;
            if let Err(err) = self.poll().await {
                return Some((Err(err), self));
            }
        }
    }
}

#[async_trait]
impl WaveContract for WavePortalRpc {
    fn address(&self) -> &ContractAddress {
        &self.address
    }

    async fn total_count(&self) -> ProviderResult<u64> {
        let total = self.call(getTotalWavesCall {}).await?._0;
        to_u64(total, "total waves")
    }

    async fn all_submissions(&self) -> ProviderResult<Vec<RawSubmission>> {
        let waves = self.call(getAllWavesCall {}).await?._0;
        waves.into_iter().map(wave_to_raw).collect()
    }

    async fn submit(&self, from: &Account, message: &str) -> ProviderResult<PendingTx> {
        let data = hex::encode_prefixed(
            waveCall {
                _message: message.to_owned(),
            }
            .abi_encode(),
        );
        let tx_hash: String = self
            .transport
            .request(
                "eth_sendTransaction",
                json!([{ "from": from.0, "to": self.address.0, "data": data }]),
            )
            .await?;

        debug!("wave transaction {} accepted into the pool", tx_hash);
        Ok(PendingTx {
            tx_hash: TxHash(tx_hash),
        })
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> ProviderResult<Receipt> {
        loop {
            let receipt: Option<RpcReceipt> = self
                .transport
                .request("eth_getTransactionReceipt", json!([tx_hash.0]))
                .await?;

            if let Some(receipt) = receipt {
                // A receipt without a block is still pending on some nodes.
                if receipt.block_number.is_some() {
                    return receipt_from_rpc(receipt);
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn new_submissions(&self) -> ProviderResult<EventStream<RawSubmission>> {
        let head = self.block_number().await?;
        let cursor = LogCursor {
            transport: Arc::clone(&self.transport),
            address: self.address.clone(),
            poll_interval: self.poll_interval,
            next_block: head + 1,
            buffered: VecDeque::new(),
        };

        Ok(futures::stream::unfold(cursor, LogCursor::next).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn decodes_new_wave_log() {
        let from = address!("4fe1043cfea32d20586f2116b082866817b92356");
        let event = NewWave {
            from,
            timestamp: U256::from(1_640_995_200_u64),
            message: "pizza".to_owned(),
        };
        let data = event.encode_log_data();
        let log = RpcLog {
            topics: data.topics().to_vec(),
            data: data.data.clone(),
            removed: false,
        };

        let wave = decode_new_wave(log).expect("decode");
        assert!(Account(wave.sender).matches("0x4fe1043cfea32d20586f2116b082866817b92356"));
        assert_eq!(wave.timestamp_seconds, 1_640_995_200);
        assert_eq!(wave.message, "pizza");
    }

    #[test]
    fn rejects_foreign_event_topics() {
        let log = RpcLog {
            topics: vec![B256::ZERO],
            data: Bytes::new(),
            removed: false,
        };
        assert!(matches!(decode_new_wave(log), Err(ProviderError::Decode(_))));
    }

    #[test]
    fn converts_contract_waves() {
        let wave = Wave {
            waver: address!("00000000000000000000000000000000000000b0"),
            message: "ramen".to_owned(),
            timestamp: U256::from(60_u64),
        };
        let raw = wave_to_raw(wave).expect("convert");
        assert_eq!(raw.timestamp_seconds, 60);
        assert_eq!(raw.message, "ramen");

        let huge = Wave {
            waver: Address::ZERO,
            message: String::new(),
            timestamp: U256::MAX,
        };
        assert!(wave_to_raw(huge).is_err());
    }

    #[test]
    fn parses_receipts() {
        let mined: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": "0xabc",
            "blockNumber": "0x10",
            "status": "0x1",
        }))
        .expect("receipt");
        let receipt = receipt_from_rpc(mined).expect("convert");
        assert_eq!(receipt.block_number, Some(16));
        assert!(receipt.success);

        let reverted: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": "0xdef",
            "blockNumber": "0x11",
            "status": "0x0",
        }))
        .expect("receipt");
        assert!(!receipt_from_rpc(reverted).expect("convert").success);
    }

    #[test]
    fn rejects_malformed_contract_address() {
        let transport = Arc::new(RpcTransport::new(Some("http://localhost:8545".to_owned())));
        let result = WavePortalRpc::new(
            transport,
            ContractAddress("not-an-address".to_owned()),
            Duration::from_millis(100),
        );
        assert!(result.is_err());
    }
}

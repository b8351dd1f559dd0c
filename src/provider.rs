//! Indexer access abstraction
//!
//! The wallet never speaks a wire protocol itself; everything it knows about
//! the ledger arrives through this trait. Implementations wrap a concrete
//! indexing service (Electrum-style servers, Esplora instances, test mocks)
//! and are expected to deliver the *current* status of an address as the
//! first message after `subscribe_address`.

use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::mpsc;

use crate::error::WalletError;

/// Opaque indexer-computed fingerprint of an address's state. `None` means
/// the address has never been observed with history.
pub type AddressStatus = Option<String>;

/// One status delivery for a subscribed address.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub address: String,
    pub status: AddressStatus,
}

/// Handle for an individual address subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Fungible/non-fungible asset payload attached to an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    /// Asset category identifier
    pub category: String,
    /// Fungible amount (zero for pure NFTs)
    pub amount: u64,
    /// NFT commitment, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nft: Option<String>,
}

/// An unspent transaction output, owned by exactly one address slot until
/// spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub satoshis: u64,
    /// Confirmation height; `None` or 0 while unconfirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenData>,
}

impl Utxo {
    /// Opaque on-disk/API identity token for this output.
    pub fn identity(&self) -> String {
        format!("{}:{}:{}", self.txid, self.vout, self.satoshis)
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.height, Some(h) if h > 0)
    }
}

/// Minimal handle into an address's raw history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRef {
    pub tx_hash: String,
    /// Confirmation height; `<= 0` while unconfirmed
    pub height: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
}

/// Block header fields the wallet cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub height: u64,
    pub timestamp: u64,
}

/// Verbose decoded transaction as served by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    pub size: u64,
    pub locktime: u32,
    pub inputs: Vec<RawTxInput>,
    pub outputs: Vec<RawTxOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTxInput {
    pub prev_txid: String,
    pub prev_vout: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTxOutput {
    pub value: u64,
    /// Locking script, hex encoded
    pub script_hex: String,
    /// Display address, when the indexer resolved one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenData>,
}

/// Per-address balance as reported by the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBalance {
    pub confirmed: u64,
    /// Mempool delta; negative when unconfirmed spends exceed receipts
    pub unconfirmed: i64,
}

impl AddressBalance {
    pub fn total(&self) -> i64 {
        self.confirmed as i64 + self.unconfirmed
    }
}

/// Remote indexing service interface.
///
/// Subscriptions are long-lived background listeners: the first delivery on
/// `sink` reports the address's current status, and every later delivery
/// reports a change. Cancellation is explicit via `unsubscribe`; it only
/// removes future delivery.
#[async_trait::async_trait]
pub trait NetworkProvider: Send + Sync {
    async fn subscribe_address(
        &self,
        address: &str,
        sink: mpsc::UnboundedSender<StatusUpdate>,
    ) -> Result<SubscriptionId, WalletError>;

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), WalletError>;

    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, WalletError>;

    async fn get_history(
        &self,
        address: &str,
        from_height: Option<i64>,
        to_height: Option<i64>,
    ) -> Result<Vec<TxRef>, WalletError>;

    async fn get_header(&self, height: u64) -> Result<Header, WalletError>;

    async fn get_raw_transaction(&self, tx_hash: &str) -> Result<RawTransaction, WalletError>;

    async fn get_balance(&self, address: &str) -> Result<AddressBalance, WalletError>;
}

/// Run a read query, retrying exactly once if it timed out. A second timeout
/// surfaces to the caller.
pub(crate) async fn retry_once<T, Fut, F>(op: F) -> Result<T, WalletError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, WalletError>>,
{
    match op().await {
        Err(WalletError::Timeout(first)) => {
            log::debug!("read query timed out ({}), retrying once", first);
            op().await
        }
        other => other,
    }
}

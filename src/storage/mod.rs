//! Storage and persistence layer
//!
//! - Address derivation + persisted per-address snapshots
//! - Wallet identifier grammar and key material
//! - File system backend

mod file_system;
mod keys;
mod models;

pub use file_system::FileStore;
pub use keys::{KeyMaterial, WalletIdent, WalletKeys};
pub use models::{Metadata, SlotSnapshot, WalletSnapshot};

pub(crate) use keys::network_name;

use crate::error::WalletError;
use crate::provider::{AddressStatus, TxRef, Utxo};

/// Everything the store knows about one derivation index.
#[derive(Debug, Clone, Default)]
pub struct AddressRecord {
    pub address: String,
    pub token_address: Option<String>,
    pub status: AddressStatus,
    pub utxos: Vec<Utxo>,
    pub raw_history: Vec<TxRef>,
}

/// Deterministic address derivation plus the persisted per-address snapshot.
///
/// `get_by_index` must be a pure lookup: deriving the same index twice
/// returns the same address, and the snapshot fields reflect the last
/// `set_status_and_utxos` for that address (or empty defaults).
#[async_trait::async_trait]
pub trait AddressStore: Send + Sync {
    async fn get_by_index(&self, index: u32, is_change: bool)
        -> Result<AddressRecord, WalletError>;

    async fn set_status_and_utxos(
        &self,
        address: &str,
        status: AddressStatus,
        utxos: &[Utxo],
    ) -> Result<(), WalletError>;

    async fn persist(&self) -> Result<(), WalletError>;
}

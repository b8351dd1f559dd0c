//! hdwatch: HD wallet discovery and history reconstruction
//!
//! A client library that reconstructs a consistent economic view of an HD
//! wallet - which addresses are mine, what do they own, what happened to
//! them - when the only source of truth is a remote indexing service that
//! answers per-address queries and pushes asynchronous status notifications.
//!
//! # Architecture
//!
//! - **GapLimitScanner**: discovers used addresses under the gap-limit
//!   convention and keeps the live subscription window exactly in step with
//!   discovered usage
//! - **HistoryReconstructor**: a deterministic transform from raw
//!   per-address history to ordered, balance-annotated history items
//! - **NetworkProvider / AddressStore**: the external collaborators (remote
//!   indexer, derivation + snapshot persistence) the wallet is built on
//!
//! # Example
//!
//! ```ignore
//! use hdwatch::{Wallet, WalletConfig, Chain};
//!
//! let config = WalletConfig::from_env();
//! let wallet = Wallet::from_wallet_id(
//!     "hd:mainnet:<mnemonic>::0:0",
//!     provider,
//!     store,
//!     config,
//! )?;
//!
//! wallet.watch().await?;
//! let address = wallet.deposit_address().await?;
//! let history = wallet.history(&Default::default()).await?;
//! wallet.stop().await?;
//! ```

pub mod chain;
pub mod config;
pub mod error;
pub mod provider;
pub mod storage;
pub mod wallet;

pub use chain::{TxCache, Unit};
pub use config::WalletConfig;
pub use error::{StorageError, WalletError};
pub use provider::{
    AddressBalance, AddressStatus, Header, NetworkProvider, RawTransaction, RawTxInput,
    RawTxOutput, StatusUpdate, SubscriptionId, TokenData, TxRef, Utxo,
};
pub use storage::{AddressRecord, AddressStore, FileStore, KeyMaterial, WalletIdent, WalletKeys};
pub use wallet::{
    AddressInfo, AddressSlot, Balance, Chain, GapLimitScanner, HistoryQuery,
    TransactionHistoryItem, Wallet,
};

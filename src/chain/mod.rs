//! Ledger decoding helpers
//!
//! - Locking-script to display-address translation
//! - Block-reward detection and subsidy schedule
//! - Display-unit conversion
//! - Bounded decoded-transaction cache

pub mod cache;
pub mod reward;
pub mod script;
pub mod units;

pub use cache::TxCache;
pub use reward::{block_subsidy, is_block_reward, COINBASE_PREV_TXID};
pub use script::{output_display_address, script_to_display_address, DATA_CARRIER_MARKER};
pub use units::Unit;

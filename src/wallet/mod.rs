/// Wallet Core Module
///
/// - `scanner.rs` - gap-limit address discovery and subscription handling
/// - `balance.rs` - aggregate unspent view
/// - `history.rs` - deterministic history reconstruction
/// - `manager.rs` - orchestration facade
pub mod balance;
pub mod history;
pub mod manager;
pub mod scanner;

pub use balance::Balance;
pub use history::{HistoryEndpoint, HistoryQuery, TransactionHistoryItem};
pub use manager::Wallet;
pub use scanner::{AddressInfo, AddressSlot, Chain, GapLimitScanner};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Invalid wallet identifier: {0}")]
    InvalidWalletId(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Network mismatch: key material is for {key_network}, wallet is {wallet_network}")]
    NetworkMismatch {
        key_network: String,
        wallet_network: String,
    },

    #[error("Indexer error: {0}")]
    Provider(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Missing previous transaction {0}")]
    MissingPrevout(String),

    #[error("Undecodable transaction data: {0}")]
    TxDecode(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Wallet is stopped")]
    Stopped,

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

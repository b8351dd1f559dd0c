//! Data models for persisted wallet snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::provider::{TxRef, Utxo};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub network: String,
}

/// Persisted per-address state, keyed by address in the wallet snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub utxos: Vec<Utxo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_history: Vec<TxRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletSnapshot {
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub slots: BTreeMap<String, SlotSnapshot>,
}

//! Aggregate unspent view over the discovered address set

use serde::Serialize;
use std::collections::BTreeMap;

use crate::wallet::scanner::AddressSlot;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub confirmed_sats: u64,
    pub unconfirmed_sats: u64,
    pub utxo_count: usize,
    /// Fungible totals per token category
    pub tokens: BTreeMap<String, u64>,
}

impl Balance {
    pub fn total_sats(&self) -> u64 {
        self.confirmed_sats + self.unconfirmed_sats
    }
}

/// Fold every slot's unspent outputs into one balance.
pub fn aggregate<'a>(slots: impl Iterator<Item = &'a AddressSlot>) -> Balance {
    let mut balance = Balance::default();
    for slot in slots {
        for utxo in &slot.utxos {
            if utxo.is_confirmed() {
                balance.confirmed_sats += utxo.satoshis;
            } else {
                balance.unconfirmed_sats += utxo.satoshis;
            }
            balance.utxo_count += 1;
            if let Some(token) = &utxo.token {
                *balance.tokens.entry(token.category.clone()).or_insert(0) += token.amount;
            }
        }
    }
    balance
}

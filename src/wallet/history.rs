//! Deterministic history reconstruction
//!
//! The indexer has no notion of "mine" or "running balance"; this module
//! turns raw per-address `(tx_hash, height)` pairs into an ordered page of
//! balance-annotated history items. Each pipeline step issues its network
//! reads as one concurrent batch and joins before the next step. Any missing
//! prevout fails the whole call: omitting one fee or input would silently
//! corrupt every older balance computed in the backfill.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use bitcoin::Network;
use futures::future::try_join_all;
use serde::Serialize;

use crate::chain::{block_subsidy, is_block_reward, output_display_address, TxCache, Unit};
use crate::error::WalletError;
use crate::provider::{retry_once, NetworkProvider, RawTransaction, TokenData, TxRef};

/// Display address assigned to the synthetic input of a block-reward
/// transaction.
pub const COINBASE_DISPLAY_ADDRESS: &str = "coinbase";

/// Height/pagination window for a history request.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub from_height: Option<i64>,
    pub to_height: Option<i64>,
    pub offset: usize,
    pub limit: Option<usize>,
    pub unit: Unit,
}

/// One side of a reconstructed transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEndpoint {
    pub address: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenData>,
}

/// Derived, never authoritative: recomputed from raw data plus the current
/// aggregate balance on every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionHistoryItem {
    pub hash: String,
    pub block_height: i64,
    pub timestamp: Option<u64>,
    pub size: u64,
    pub fee: f64,
    pub inputs: Vec<HistoryEndpoint>,
    pub outputs: Vec<HistoryEndpoint>,
    pub value_change: f64,
    pub token_amount_changes: BTreeMap<String, i64>,
    pub balance: f64,
}

struct DraftEndpoint {
    address: String,
    value_sats: i64,
    token: Option<TokenData>,
}

struct Draft {
    hash: String,
    height: i64,
    timestamp: Option<u64>,
    size: u64,
    fee_sats: i64,
    inputs: Vec<DraftEndpoint>,
    outputs: Vec<DraftEndpoint>,
    value_change_sats: i64,
    token_changes: BTreeMap<String, i64>,
    balance_sats: i64,
}

impl Draft {
    fn into_item(self, unit: Unit) -> TransactionHistoryItem {
        let convert = |endpoints: Vec<DraftEndpoint>| {
            endpoints
                .into_iter()
                .map(|e| HistoryEndpoint {
                    address: e.address,
                    value: unit.from_base(e.value_sats),
                    token: e.token,
                })
                .collect()
        };
        TransactionHistoryItem {
            hash: self.hash,
            block_height: self.height,
            timestamp: self.timestamp,
            size: self.size,
            fee: unit.from_base(self.fee_sats),
            inputs: convert(self.inputs),
            outputs: convert(self.outputs),
            value_change: unit.from_base(self.value_change_sats),
            token_amount_changes: self.token_changes,
            balance: unit.from_base(self.balance_sats),
        }
    }
}

/// Unconfirmed transactions (`height <= 0`) sort among themselves by height
/// ascending and as a group precede confirmed transactions, which sort by
/// height descending.
fn display_order(a_height: i64, b_height: i64) -> Ordering {
    match (a_height <= 0, b_height <= 0) {
        (true, true) => a_height.cmp(&b_height),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => b_height.cmp(&a_height),
    }
}

/// Reconstruct an ordered, balance-annotated history page for a set of
/// addresses.
///
/// `addresses` are the query/subscription forms; `interest` additionally
/// carries token-aware forms, so value attribution sees both encodings.
pub async fn reconstruct_history(
    provider: &dyn NetworkProvider,
    cache: &TxCache,
    network: Network,
    addresses: &[String],
    interest: &HashSet<String>,
    query: &HistoryQuery,
) -> Result<Vec<TransactionHistoryItem>, WalletError> {
    if addresses.is_empty() {
        return Ok(Vec::new());
    }

    // An HD wallet's history is the union over all discovered addresses;
    // merge and dedup by hash, preferring the confirmed sighting.
    let per_address = try_join_all(addresses.iter().map(|address| {
        retry_once(move || provider.get_history(address, query.from_height, query.to_height))
    }))
    .await?;

    let mut merged: HashMap<String, TxRef> = HashMap::new();
    for tx_ref in per_address.into_iter().flatten() {
        match merged.get_mut(&tx_ref.tx_hash) {
            Some(existing) => {
                if tx_ref.height > existing.height {
                    *existing = tx_ref;
                }
            }
            None => {
                merged.insert(tx_ref.tx_hash.clone(), tx_ref);
            }
        }
    }

    let mut refs: Vec<TxRef> = merged.into_values().collect();
    refs.sort_by(|a, b| display_order(a.height, b.height));
    let page: Vec<TxRef> = refs
        .into_iter()
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();
    if page.is_empty() {
        return Ok(Vec::new());
    }

    // Batch-resolve block timestamps for every distinct confirmed height.
    let heights: Vec<u64> = page
        .iter()
        .filter(|r| r.height > 0)
        .map(|r| r.height as u64)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let headers = try_join_all(
        heights
            .iter()
            .map(|&height| retry_once(move || provider.get_header(height))),
    )
    .await?;
    let timestamps: HashMap<u64, u64> = headers
        .into_iter()
        .map(|h| (h.height, h.timestamp))
        .collect();

    let page_txs = try_join_all(
        page.iter()
            .map(|r| cache.get_or_fetch(provider, &r.tx_hash)),
    )
    .await?;

    // Resolve prevouts as one deduplicated batch through the bounded cache.
    let mut prevout_hashes: BTreeSet<String> = BTreeSet::new();
    for tx in &page_txs {
        if is_block_reward(tx) {
            continue;
        }
        for input in &tx.inputs {
            prevout_hashes.insert(input.prev_txid.clone());
        }
    }
    let prev_txs = try_join_all(prevout_hashes.iter().map(|hash| async move {
        cache
            .get_or_fetch(provider, hash)
            .await
            .map_err(|e| WalletError::MissingPrevout(format!("{}: {}", hash, e)))
    }))
    .await?;
    let prevouts: HashMap<String, Arc<RawTransaction>> = prev_txs
        .into_iter()
        .map(|tx| (tx.txid.clone(), tx))
        .collect();

    let mut drafts = Vec::with_capacity(page.len());
    for (tx_ref, tx) in page.iter().zip(page_txs.iter()) {
        drafts.push(build_draft(
            tx_ref,
            tx,
            &prevouts,
            interest,
            network,
            &timestamps,
        )?);
    }

    // Same effective height: a receive sorts before a send. Display
    // heuristic, not a causal guarantee.
    drafts.sort_by(|a, b| {
        display_order(a.height, b.height)
            .then_with(|| (a.value_change_sats < 0).cmp(&(b.value_change_sats < 0)))
    });

    // Backfill running balance newest-to-oldest from the freshly-queried
    // current total.
    let balances = try_join_all(
        addresses
            .iter()
            .map(|address| retry_once(move || provider.get_balance(address))),
    )
    .await?;
    let mut running: i64 = balances.iter().map(|b| b.total()).sum();
    for draft in &mut drafts {
        draft.balance_sats = running;
        running -= draft.value_change_sats;
    }

    // One unit-conversion pass, applied last.
    Ok(drafts
        .into_iter()
        .map(|draft| draft.into_item(query.unit))
        .collect())
}

fn build_draft(
    tx_ref: &TxRef,
    tx: &RawTransaction,
    prevouts: &HashMap<String, Arc<RawTransaction>>,
    interest: &HashSet<String>,
    network: Network,
    timestamps: &HashMap<u64, u64>,
) -> Result<Draft, WalletError> {
    let mut inputs = Vec::new();
    let mut total_in: i64 = 0;

    if is_block_reward(tx) {
        // Minted supply: value comes from the halving schedule, not a
        // prevout.
        let subsidy = block_subsidy(tx_ref.height.max(0) as u64) as i64;
        total_in = subsidy;
        inputs.push(DraftEndpoint {
            address: COINBASE_DISPLAY_ADDRESS.to_string(),
            value_sats: subsidy,
            token: None,
        });
    } else {
        for input in &tx.inputs {
            let prev = prevouts
                .get(&input.prev_txid)
                .ok_or_else(|| WalletError::MissingPrevout(input.prev_txid.clone()))?;
            let prev_out = prev.outputs.get(input.prev_vout as usize).ok_or_else(|| {
                WalletError::MissingPrevout(format!("{}:{}", input.prev_txid, input.prev_vout))
            })?;
            let address = output_display_address(prev_out, network)?;
            total_in += prev_out.value as i64;
            inputs.push(DraftEndpoint {
                address,
                value_sats: prev_out.value as i64,
                token: prev_out.token.clone(),
            });
        }
    }

    let mut outputs = Vec::new();
    let mut total_out: i64 = 0;
    for output in &tx.outputs {
        let address = output_display_address(output, network)?;
        total_out += output.value as i64;
        outputs.push(DraftEndpoint {
            address,
            value_sats: output.value as i64,
            token: output.token.clone(),
        });
    }

    let mut value_change: i64 = 0;
    let mut token_changes: BTreeMap<String, i64> = BTreeMap::new();
    for endpoint in &outputs {
        if interest.contains(&endpoint.address) {
            value_change += endpoint.value_sats;
            if let Some(token) = &endpoint.token {
                *token_changes.entry(token.category.clone()).or_insert(0) +=
                    token.amount as i64;
            }
        }
    }
    for endpoint in &inputs {
        if interest.contains(&endpoint.address) {
            value_change -= endpoint.value_sats;
            if let Some(token) = &endpoint.token {
                *token_changes.entry(token.category.clone()).or_insert(0) -=
                    token.amount as i64;
            }
        }
    }

    let timestamp = if tx_ref.height > 0 {
        timestamps.get(&(tx_ref.height as u64)).copied()
    } else {
        None
    };

    Ok(Draft {
        hash: tx.txid.clone(),
        height: tx_ref.height,
        timestamp,
        size: tx.size,
        // Negative for block rewards: the amount collected by the miner.
        fee_sats: total_in - total_out,
        inputs,
        outputs,
        value_change_sats: value_change,
        token_changes,
        balance_sats: 0,
    })
}

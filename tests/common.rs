/// Common test utilities for wallet integration tests
///
/// Provides a controllable in-memory indexer (`MockProvider`) and address
/// store (`MockStore`) so discovery and history reconstruction can be
/// exercised deterministically, without a network.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use hdwatch::{
    AddressBalance, AddressRecord, AddressStatus, AddressStore, Header, NetworkProvider,
    RawTransaction, StatusUpdate, SubscriptionId, TxRef, Utxo, WalletError,
};

pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(true)
        .try_init();
}

pub fn utxo(txid: &str, vout: u32, satoshis: u64, height: Option<u64>) -> Utxo {
    Utxo {
        txid: txid.to_string(),
        vout,
        satoshis,
        height,
        token: None,
    }
}

#[derive(Default)]
struct ProviderInner {
    statuses: HashMap<String, AddressStatus>,
    utxos: HashMap<String, Vec<Utxo>>,
    history: HashMap<String, Vec<TxRef>>,
    headers: HashMap<u64, Header>,
    txs: HashMap<String, RawTransaction>,
    sinks: HashMap<String, mpsc::UnboundedSender<StatusUpdate>>,
    subscribed: HashMap<u64, String>,
    subscribe_calls: HashMap<String, u32>,
    status_seq: u64,
    next_id: u64,
}

/// Controllable fake indexer. The first delivery after subscribing reports
/// the address's current status, like a real subscription endpoint.
#[derive(Default)]
pub struct MockProvider {
    inner: Mutex<ProviderInner>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn notify(inner: &ProviderInner, address: &str) {
        if let Some(sink) = inner.sinks.get(address) {
            let _ = sink.send(StatusUpdate {
                address: address.to_string(),
                status: inner.statuses.get(address).cloned().unwrap_or(None),
            });
        }
    }

    /// Credit an output to `address`, refresh its status fingerprint and
    /// notify any live subscription.
    pub fn fund(&self, address: &str, utxo: Utxo) {
        let mut inner = self.inner.lock().unwrap();
        let height = utxo.height.map(|h| h as i64).unwrap_or(0);
        inner
            .history
            .entry(address.to_string())
            .or_default()
            .push(TxRef {
                tx_hash: utxo.txid.clone(),
                height,
                fee: None,
            });
        inner.utxos.entry(address.to_string()).or_default().push(utxo);
        inner.status_seq += 1;
        let status = format!("status-{}", inner.status_seq);
        inner.statuses.insert(address.to_string(), Some(status));
        Self::notify(&inner, address);
    }

    /// Overwrite an address's status (None simulates a reorg back to
    /// never-used) and notify.
    pub fn set_status(&self, address: &str, status: AddressStatus) {
        let mut inner = self.inner.lock().unwrap();
        inner.statuses.insert(address.to_string(), status);
        if inner.statuses.get(address).map(|s| s.is_none()).unwrap_or(false) {
            inner.utxos.remove(address);
        }
        Self::notify(&inner, address);
    }

    /// Redeliver the current status unchanged.
    pub fn renotify(&self, address: &str) {
        let inner = self.inner.lock().unwrap();
        Self::notify(&inner, address);
    }

    pub fn set_utxos(&self, address: &str, utxos: Vec<Utxo>) {
        self.inner
            .lock()
            .unwrap()
            .utxos
            .insert(address.to_string(), utxos);
    }

    pub fn set_history(&self, address: &str, refs: Vec<TxRef>) {
        self.inner
            .lock()
            .unwrap()
            .history
            .insert(address.to_string(), refs);
    }

    pub fn set_header(&self, height: u64, timestamp: u64) {
        self.inner
            .lock()
            .unwrap()
            .headers
            .insert(height, Header { height, timestamp });
    }

    pub fn add_tx(&self, tx: RawTransaction) {
        self.inner.lock().unwrap().txs.insert(tx.txid.clone(), tx);
    }

    pub fn subscribe_calls(&self, address: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .subscribe_calls
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.lock().unwrap().subscribed.len()
    }
}

#[async_trait::async_trait]
impl NetworkProvider for MockProvider {
    async fn subscribe_address(
        &self,
        address: &str,
        sink: mpsc::UnboundedSender<StatusUpdate>,
    ) -> Result<SubscriptionId, WalletError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribed.insert(id, address.to_string());
        inner.sinks.insert(address.to_string(), sink);
        *inner
            .subscribe_calls
            .entry(address.to_string())
            .or_insert(0) += 1;
        Self::notify(&inner, address);
        Ok(SubscriptionId(id))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), WalletError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(address) = inner.subscribed.remove(&id.0) {
            inner.sinks.remove(&address);
        }
        Ok(())
    }

    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, WalletError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .utxos
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_history(
        &self,
        address: &str,
        _from_height: Option<i64>,
        _to_height: Option<i64>,
    ) -> Result<Vec<TxRef>, WalletError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .history
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_header(&self, height: u64) -> Result<Header, WalletError> {
        self.inner
            .lock()
            .unwrap()
            .headers
            .get(&height)
            .cloned()
            .ok_or_else(|| WalletError::Provider(format!("no header at height {}", height)))
    }

    async fn get_raw_transaction(&self, tx_hash: &str) -> Result<RawTransaction, WalletError> {
        self.inner
            .lock()
            .unwrap()
            .txs
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| WalletError::Provider(format!("unknown transaction {}", tx_hash)))
    }

    async fn get_balance(&self, address: &str) -> Result<AddressBalance, WalletError> {
        let inner = self.inner.lock().unwrap();
        let utxos = inner.utxos.get(address).cloned().unwrap_or_default();
        let confirmed = utxos
            .iter()
            .filter(|u| u.is_confirmed())
            .map(|u| u.satoshis)
            .sum();
        let unconfirmed = utxos
            .iter()
            .filter(|u| !u.is_confirmed())
            .map(|u| u.satoshis as i64)
            .sum();
        Ok(AddressBalance {
            confirmed,
            unconfirmed,
        })
    }
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<String, AddressRecord>,
    set_calls: u32,
    persist_calls: u32,
}

/// In-memory address store with synthetic, deterministic addresses.
#[derive(Default)]
pub struct MockStore {
    inner: Mutex<StoreInner>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn address_for(index: u32, is_change: bool) -> String {
        if is_change {
            format!("chg-{}", index)
        } else {
            format!("dep-{}", index)
        }
    }

    pub fn token_address_for(index: u32, is_change: bool) -> String {
        format!("tok-{}", Self::address_for(index, is_change))
    }

    /// Pre-seed a persisted snapshot for a restored-wallet scenario.
    pub fn seed(&self, address: &str, status: AddressStatus, utxos: Vec<Utxo>) {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .records
            .entry(address.to_string())
            .or_insert_with(|| AddressRecord {
                address: address.to_string(),
                ..Default::default()
            });
        record.status = status;
        record.utxos = utxos;
    }

    pub fn set_calls(&self) -> u32 {
        self.inner.lock().unwrap().set_calls
    }

    pub fn persist_calls(&self) -> u32 {
        self.inner.lock().unwrap().persist_calls
    }

    pub fn status_of(&self, address: &str) -> AddressStatus {
        self.inner
            .lock()
            .unwrap()
            .records
            .get(address)
            .and_then(|r| r.status.clone())
    }
}

#[async_trait::async_trait]
impl AddressStore for MockStore {
    async fn get_by_index(
        &self,
        index: u32,
        is_change: bool,
    ) -> Result<AddressRecord, WalletError> {
        let address = Self::address_for(index, is_change);
        let inner = self.inner.lock().unwrap();
        let mut record = inner
            .records
            .get(&address)
            .cloned()
            .unwrap_or_else(|| AddressRecord {
                address: address.clone(),
                ..Default::default()
            });
        record.token_address = Some(Self::token_address_for(index, is_change));
        Ok(record)
    }

    async fn set_status_and_utxos(
        &self,
        address: &str,
        status: AddressStatus,
        utxos: &[Utxo],
    ) -> Result<(), WalletError> {
        let mut inner = self.inner.lock().unwrap();
        inner.set_calls += 1;
        let record = inner
            .records
            .entry(address.to_string())
            .or_insert_with(|| AddressRecord {
                address: address.to_string(),
                ..Default::default()
            });
        record.status = status;
        record.utxos = utxos.to_vec();
        Ok(())
    }

    async fn persist(&self) -> Result<(), WalletError> {
        self.inner.lock().unwrap().persist_calls += 1;
        Ok(())
    }
}

/// Interest set helper for history tests.
pub fn interest(addresses: &[&str]) -> HashSet<String> {
    addresses.iter().map(|a| a.to_string()).collect()
}

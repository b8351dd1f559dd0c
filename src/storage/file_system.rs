use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use tokio::sync::Mutex;

use super::keys::{network_name, WalletKeys};
use super::models::{Metadata, SlotSnapshot, WalletSnapshot};
use super::{AddressRecord, AddressStore};
use crate::error::{StorageError, WalletError};
use crate::provider::{AddressStatus, Utxo};

/// File-backed reference `AddressStore`: derives addresses through
/// `WalletKeys` and keeps the per-address snapshot as pretty JSON under
/// `<base>/<wallet>/state.json`.
pub struct FileStore {
    base_path: PathBuf,
    name: String,
    keys: WalletKeys,
    state: Mutex<WalletSnapshot>,
}

impl FileStore {
    /// Open (or create) the wallet directory and load any existing snapshot.
    pub fn open(base_path: PathBuf, name: &str, keys: WalletKeys) -> Result<Self, StorageError> {
        let wallet_dir = base_path.join(name);
        fs::create_dir_all(&wallet_dir)?;

        let metadata_path = wallet_dir.join("metadata.json");
        if !metadata_path.exists() {
            let meta = Metadata {
                name: name.to_string(),
                created_at: Utc::now(),
                network: network_name(keys.network()).to_string(),
            };
            fs::write(metadata_path, serde_json::to_string_pretty(&meta)?)?;
        }

        let state_path = wallet_dir.join("state.json");
        let snapshot = if state_path.exists() {
            let contents = fs::read_to_string(state_path)?;
            serde_json::from_str(&contents)?
        } else {
            WalletSnapshot {
                network: network_name(keys.network()).to_string(),
                ..Default::default()
            }
        };

        Ok(Self {
            base_path,
            name: name.to_string(),
            keys,
            state: Mutex::new(snapshot),
        })
    }

    fn wallet_dir(&self) -> PathBuf {
        self.base_path.join(&self.name)
    }
}

#[async_trait::async_trait]
impl AddressStore for FileStore {
    async fn get_by_index(
        &self,
        index: u32,
        is_change: bool,
    ) -> Result<AddressRecord, WalletError> {
        let address = self.keys.address_at(is_change, index)?.to_string();

        let state = self.state.lock().await;
        let record = match state.slots.get(&address) {
            Some(slot) => AddressRecord {
                address,
                token_address: slot.token_address.clone(),
                status: slot.status.clone(),
                utxos: slot.utxos.clone(),
                raw_history: slot.raw_history.clone(),
            },
            None => AddressRecord {
                address,
                ..Default::default()
            },
        };
        Ok(record)
    }

    async fn set_status_and_utxos(
        &self,
        address: &str,
        status: AddressStatus,
        utxos: &[Utxo],
    ) -> Result<(), WalletError> {
        let mut state = self.state.lock().await;
        let slot = state
            .slots
            .entry(address.to_string())
            .or_insert_with(|| SlotSnapshot {
                address: address.to_string(),
                ..Default::default()
            });
        slot.status = status;
        slot.utxos = utxos.to_vec();
        Ok(())
    }

    async fn persist(&self) -> Result<(), WalletError> {
        let state = self.state.lock().await;
        let json = serde_json::to_string_pretty(&*state).map_err(StorageError::from)?;
        fs::write(self.wallet_dir().join("state.json"), json).map_err(StorageError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::WalletIdent;

    const WORDS: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn test_keys() -> WalletKeys {
        WalletIdent::parse(&format!("hd:regtest:{}::0:0", WORDS))
            .unwrap()
            .to_keys()
            .unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;

        let store = FileStore::open(dir.path().to_path_buf(), "w1", test_keys())?;
        let record = store.get_by_index(0, false).await?;
        let utxo = Utxo {
            txid: "aa".repeat(32),
            vout: 0,
            satoshis: 1500,
            height: Some(10),
            token: None,
        };
        store
            .set_status_and_utxos(&record.address, Some("s1".to_string()), &[utxo.clone()])
            .await?;
        store.persist().await?;
        drop(store);

        let reopened = FileStore::open(dir.path().to_path_buf(), "w1", test_keys())?;
        let restored = reopened.get_by_index(0, false).await?;
        assert_eq!(restored.address, record.address);
        assert_eq!(restored.status.as_deref(), Some("s1"));
        assert_eq!(restored.utxos, vec![utxo]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_index_is_blank() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let store = FileStore::open(dir.path().to_path_buf(), "w2", test_keys())?;
        let record = store.get_by_index(7, true).await?;
        assert!(record.status.is_none());
        assert!(record.utxos.is_empty());
        Ok(())
    }
}

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;

use crate::error::WalletError;
use crate::provider::{retry_once, NetworkProvider, RawTransaction};

/// Bounded cache of decoded transactions keyed by hash.
///
/// The same prevout is frequently referenced by many later transactions in
/// one session; this keeps resolution from refetching it while capping
/// memory with LRU eviction. Injectable: one cache may be shared across
/// wallets.
pub struct TxCache {
    inner: Mutex<LruCache<String, Arc<RawTransaction>>>,
}

impl TxCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn get(&self, tx_hash: &str) -> Option<Arc<RawTransaction>> {
        self.inner.lock().await.get(tx_hash).cloned()
    }

    pub async fn put(&self, tx: Arc<RawTransaction>) {
        self.inner.lock().await.put(tx.txid.clone(), tx);
    }

    /// Fetch a transaction through the cache. Timed-out reads are retried
    /// once before the error surfaces.
    pub async fn get_or_fetch(
        &self,
        provider: &dyn NetworkProvider,
        tx_hash: &str,
    ) -> Result<Arc<RawTransaction>, WalletError> {
        if let Some(hit) = self.get(tx_hash).await {
            return Ok(hit);
        }
        let fetched = retry_once(|| provider.get_raw_transaction(tx_hash)).await?;
        let tx = Arc::new(fetched);
        self.put(tx.clone()).await;
        Ok(tx)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(txid: &str) -> Arc<RawTransaction> {
        Arc::new(RawTransaction {
            txid: txid.to_string(),
            size: 100,
            locktime: 0,
            inputs: vec![],
            outputs: vec![],
        })
    }

    #[tokio::test]
    async fn test_eviction_is_bounded() {
        let cache = TxCache::new(2);
        cache.put(tx("a")).await;
        cache.put(tx("b")).await;
        cache.put(tx("c")).await;
        assert_eq!(cache.len().await, 2);
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("c").await.is_some());
    }
}

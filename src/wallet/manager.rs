use std::collections::HashSet;
use std::sync::Arc;

use crate::chain::TxCache;
use crate::config::WalletConfig;
use crate::error::WalletError;
/// Wallet - Orchestration Layer
///
/// Wires configuration, indexer access, the address store and the scanner
/// together, and exposes the wallet-level operations.
use crate::provider::NetworkProvider;
use crate::storage::{AddressStore, WalletIdent};
use crate::wallet::balance::Balance;
use crate::wallet::history::{reconstruct_history, HistoryQuery, TransactionHistoryItem};
use crate::wallet::scanner::{AddressInfo, Chain, GapLimitScanner};

pub struct Wallet {
    config: WalletConfig,
    ident: WalletIdent,
    provider: Arc<dyn NetworkProvider>,
    scanner: GapLimitScanner,
    cache: Arc<TxCache>,
}

impl Wallet {
    /// Build a wallet from parsed identity. Configuration problems (network
    /// mismatch, unusable key material) fail here, before any network
    /// activity.
    pub fn new(
        ident: WalletIdent,
        provider: Arc<dyn NetworkProvider>,
        store: Arc<dyn AddressStore>,
        config: WalletConfig,
    ) -> Result<Self, WalletError> {
        if ident.network != config.network {
            return Err(WalletError::NetworkMismatch {
                key_network: ident.network.to_string(),
                wallet_network: config.network.to_string(),
            });
        }
        // Surfaces mismatched or unusable key material synchronously
        ident.to_keys()?;

        let scanner = GapLimitScanner::new(
            provider.clone(),
            store,
            config.gap_limit,
            config.idle_timeout,
            ident.deposit_index,
            ident.change_index,
        );

        log::info!(
            "wallet opened on {} (gap limit {}, frontier {}/{})",
            ident.network,
            config.gap_limit,
            ident.deposit_index,
            ident.change_index
        );

        Ok(Self {
            cache: Arc::new(TxCache::new(config.tx_cache_size)),
            config,
            ident,
            provider,
            scanner,
        })
    }

    /// Restore a wallet from its serialized identifier. The embedded indices
    /// seed the frontier, so discovery resumes where it left off.
    pub fn from_wallet_id(
        wallet_id: &str,
        provider: Arc<dyn NetworkProvider>,
        store: Arc<dyn AddressStore>,
        config: WalletConfig,
    ) -> Result<Self, WalletError> {
        let ident = WalletIdent::parse(wallet_id)?;
        Self::new(ident, provider, store, config)
    }

    /// Serialize this wallet, embedding the current discovery frontier.
    pub fn wallet_id(&self) -> String {
        let mut ident = self.ident.clone();
        ident.deposit_index = self.scanner.used_index(Chain::Deposit);
        ident.change_index = self.scanner.used_index(Chain::Change);
        ident.to_string()
    }

    pub fn scanner(&self) -> &GapLimitScanner {
        &self.scanner
    }

    /// Address at `index`, or the next unused one when `index` is `None`.
    pub async fn get_address(
        &self,
        chain: Chain,
        index: Option<u32>,
    ) -> Result<AddressInfo, WalletError> {
        self.scanner.get_address(chain, index).await
    }

    /// Next unused deposit address.
    pub async fn deposit_address(&self) -> Result<AddressInfo, WalletError> {
        self.scanner.get_address(Chain::Deposit, None).await
    }

    /// Next unused change address.
    pub async fn change_address(&self) -> Result<AddressInfo, WalletError> {
        self.scanner.get_address(Chain::Change, None).await
    }

    pub async fn watch(&self) -> Result<(), WalletError> {
        self.scanner.watch().await
    }

    pub async fn scan_more_addresses(&self, extra: u32) -> Result<(), WalletError> {
        self.scanner.scan_more_addresses(extra).await
    }

    pub async fn wait_for_update(&self, chain: Chain, target: u32) -> Result<u32, WalletError> {
        self.scanner.wait_for_update(chain, target).await
    }

    /// Aggregate balance over every discovered address slot.
    pub fn balance(&self) -> Balance {
        self.scanner.balance()
    }

    /// Reconstruct a history page over the discovered address set.
    pub async fn history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<TransactionHistoryItem>, WalletError> {
        let discovered = self.scanner.discovered();
        if discovered.is_empty() {
            return Ok(Vec::new());
        }

        let addresses: Vec<String> = discovered.iter().map(|(a, _)| a.clone()).collect();
        let mut interest: HashSet<String> = addresses.iter().cloned().collect();
        for (_, token_address) in &discovered {
            if let Some(token_address) = token_address {
                interest.insert(token_address.clone());
            }
        }

        reconstruct_history(
            self.provider.as_ref(),
            &self.cache,
            self.config.network,
            &addresses,
            &interest,
            query,
        )
        .await
    }

    /// Cancel all subscriptions; the wallet is defunct afterwards.
    pub async fn stop(&self) -> Result<(), WalletError> {
        self.scanner.stop().await
    }
}

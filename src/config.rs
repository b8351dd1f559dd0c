/// Wallet configuration from environment variables
///
/// Controls the ledger network, gap-limit discovery window and the
/// client-side timeouts/capacities. Defaults to mainnet.
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct WalletConfig {
    /// Ledger network
    pub network: bitcoin::Network,
    /// Number of never-used addresses kept subscribed ahead of the frontier
    pub gap_limit: u32,
    /// Idle fallback for `wait_for_update`: give up after this long without
    /// any notification
    pub idle_timeout: Duration,
    /// Capacity of the decoded-transaction cache used by history
    /// reconstruction
    pub tx_cache_size: usize,
}

impl WalletConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `WALLET_NETWORK`: "mainnet" (default), "testnet", "signet" or "regtest"
    /// - `GAP_LIMIT`: discovery window size (default 20)
    /// - `IDLE_TIMEOUT_MS`: wait_for_update idle fallback (default 30000)
    /// - `TX_CACHE_SIZE`: decoded-transaction cache capacity (default 512)
    pub fn from_env() -> Self {
        let network_str = env::var("WALLET_NETWORK")
            .unwrap_or_else(|_| "mainnet".to_string())
            .to_lowercase();

        let network = match network_str.as_str() {
            "mainnet" | "bitcoin" | "" => bitcoin::Network::Bitcoin,
            "testnet" => bitcoin::Network::Testnet,
            "signet" => bitcoin::Network::Signet,
            "regtest" => {
                log::info!("Using REGTEST network");
                bitcoin::Network::Regtest
            }
            other => {
                log::warn!("Unknown network '{}', defaulting to mainnet", other);
                bitcoin::Network::Bitcoin
            }
        };

        let gap_limit = env::var("GAP_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        let idle_timeout_ms = env::var("IDLE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30_000u64);

        let tx_cache_size = env::var("TX_CACHE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(512);

        Self {
            network,
            gap_limit,
            idle_timeout: Duration::from_millis(idle_timeout_ms),
            tx_cache_size,
        }
    }

    /// Get the BIP44 coin type for this network
    ///
    /// - Mainnet: 0
    /// - Testnet/Signet/Regtest: 1
    pub fn coin_type(&self) -> u32 {
        match self.network {
            bitcoin::Network::Bitcoin => 0,
            _ => 1,
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: bitcoin::Network::Bitcoin,
            gap_limit: 20,
            idle_timeout: Duration::from_millis(30_000),
            tx_cache_size: 512,
        }
    }
}

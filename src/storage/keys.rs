use bip39::Mnemonic;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::key::CompressedPublicKey;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Address, Network, NetworkKind, PublicKey};
use std::fmt;
use std::str::FromStr;

use crate::error::WalletError;

/// Secret (or watch-only) key material a wallet can be built from.
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    Mnemonic(Mnemonic),
    Xpriv(Xpriv),
    Xpub(Xpub),
}

impl KeyMaterial {
    /// Parse the secret segment of a wallet identifier, validating the key
    /// material against the wallet network.
    pub fn parse(secret: &str, network: Network) -> Result<Self, WalletError> {
        if let Ok(mnemonic) = Mnemonic::parse(secret) {
            return Ok(KeyMaterial::Mnemonic(mnemonic));
        }
        if let Ok(xpriv) = Xpriv::from_str(secret) {
            check_network_kind(xpriv.network, network)?;
            return Ok(KeyMaterial::Xpriv(xpriv));
        }
        if let Ok(xpub) = Xpub::from_str(secret) {
            check_network_kind(xpub.network, network)?;
            return Ok(KeyMaterial::Xpub(xpub));
        }
        Err(WalletError::InvalidKey(
            "not a mnemonic, xpriv or xpub".to_string(),
        ))
    }
}

impl fmt::Display for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Mnemonic(m) => write!(f, "{}", m),
            KeyMaterial::Xpriv(k) => write!(f, "{}", k),
            KeyMaterial::Xpub(k) => write!(f, "{}", k),
        }
    }
}

fn check_network_kind(key_network: NetworkKind, wallet_network: Network) -> Result<(), WalletError> {
    if key_network != NetworkKind::from(wallet_network) {
        return Err(WalletError::NetworkMismatch {
            key_network: format!("{:?}", key_network),
            wallet_network: wallet_network.to_string(),
        });
    }
    Ok(())
}

/// Account-level derivation handle: everything needed to derive the
/// deposit/change address chains.
pub struct WalletKeys {
    account_xpub: Xpub,
    network: Network,
    derivation_path: DerivationPath,
}

impl WalletKeys {
    /// Build derivation keys from key material.
    ///
    /// Mnemonics and master xprivs are derived down the account path
    /// (default `m/84'/<coin>'/0'`); an xpub is taken to be account-level
    /// already, and combining it with a hardened path is a fatal
    /// configuration error.
    pub fn from_material(
        material: &KeyMaterial,
        network: Network,
        path: Option<&DerivationPath>,
    ) -> Result<Self, WalletError> {
        let secp = Secp256k1::new();
        let default_path = default_account_path(network)?;
        let derivation_path = path.cloned().unwrap_or(default_path);

        let account_xpub = match material {
            KeyMaterial::Mnemonic(mnemonic) => {
                let seed = mnemonic.to_seed("");
                let master = Xpriv::new_master(network, &seed)
                    .map_err(|e| WalletError::InvalidKey(e.to_string()))?;
                let account = master
                    .derive_priv(&secp, &derivation_path)
                    .map_err(|e| WalletError::InvalidKey(e.to_string()))?;
                Xpub::from_priv(&secp, &account)
            }
            KeyMaterial::Xpriv(master) => {
                check_network_kind(master.network, network)?;
                let account = master
                    .derive_priv(&secp, &derivation_path)
                    .map_err(|e| WalletError::InvalidKey(e.to_string()))?;
                Xpub::from_priv(&secp, &account)
            }
            KeyMaterial::Xpub(xpub) => {
                check_network_kind(xpub.network, network)?;
                if path.is_some() {
                    if (&derivation_path).into_iter().any(|c| c.is_hardened()) {
                        return Err(WalletError::InvalidKey(
                            "hardened derivation path cannot be applied to an xpub".to_string(),
                        ));
                    }
                    xpub.derive_pub(&secp, &derivation_path)
                        .map_err(|e| WalletError::InvalidKey(e.to_string()))?
                } else {
                    *xpub
                }
            }
        };

        Ok(Self {
            account_xpub,
            network,
            derivation_path,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Derive the P2WPKH address for a chain/index pair. Chain 0 is the
    /// deposit chain, chain 1 the change chain.
    pub fn address_at(&self, is_change: bool, index: u32) -> Result<Address, WalletError> {
        let secp = Secp256k1::new();

        let chain_child = ChildNumber::from_normal_idx(if is_change { 1 } else { 0 })
            .map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        let index_child = ChildNumber::from_normal_idx(index)
            .map_err(|e| WalletError::InvalidKey(e.to_string()))?;

        let derived = self
            .account_xpub
            .derive_pub(&secp, &[chain_child, index_child])
            .map_err(|e| WalletError::InvalidKey(e.to_string()))?;

        let pubkey = PublicKey::new(derived.public_key);
        let compressed = CompressedPublicKey::try_from(pubkey)
            .map_err(|e| WalletError::InvalidKey(e.to_string()))?;

        Ok(Address::p2wpkh(&compressed, self.network))
    }
}

fn default_account_path(network: Network) -> Result<DerivationPath, WalletError> {
    let coin_type = match network {
        Network::Bitcoin => 0,
        _ => 1,
    };
    DerivationPath::from_str(&format!("m/84'/{}'/0'", coin_type))
        .map_err(|e| WalletError::Internal(e.to_string()))
}

/// Serialized wallet identity:
/// `hd:<network>:<mnemonic|xpriv|xpub>:<derivationPath-or-omitted>:<depositIndex>:<changeIndex>`
///
/// The embedded indices seed the discovery frontier on restore, so
/// previously discovered progress is never re-derived from scratch.
#[derive(Debug, Clone)]
pub struct WalletIdent {
    pub network: Network,
    pub material: KeyMaterial,
    pub derivation_path: Option<DerivationPath>,
    pub deposit_index: u32,
    pub change_index: u32,
}

impl WalletIdent {
    /// Generate a fresh random wallet identity for the given network.
    pub fn generate(network: Network) -> Result<Self, WalletError> {
        let entropy = bitcoin::key::rand::random::<[u8; 16]>();
        let mnemonic = Mnemonic::from_entropy(&entropy)
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;

        Ok(Self {
            network,
            material: KeyMaterial::Mnemonic(mnemonic),
            derivation_path: None,
            deposit_index: 0,
            change_index: 0,
        })
    }

    /// Parse a wallet identifier string. Key material is validated against
    /// the embedded network; a mismatch is fatal here, before any network
    /// activity.
    pub fn parse(s: &str) -> Result<Self, WalletError> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 5 && parts.len() != 6 {
            return Err(WalletError::InvalidWalletId(format!(
                "expected 5 or 6 colon-delimited segments, got {}",
                parts.len()
            )));
        }
        if parts[0] != "hd" {
            return Err(WalletError::InvalidWalletId(format!(
                "unknown scheme '{}'",
                parts[0]
            )));
        }

        let network = parse_network(parts[1])?;
        let material = KeyMaterial::parse(parts[2], network)?;

        let (path_str, deposit_str, change_str) = if parts.len() == 6 {
            (parts[3], parts[4], parts[5])
        } else {
            ("", parts[3], parts[4])
        };

        let derivation_path = if path_str.is_empty() {
            None
        } else {
            Some(
                DerivationPath::from_str(path_str)
                    .map_err(|e| WalletError::InvalidWalletId(format!("bad path: {}", e)))?,
            )
        };

        let deposit_index = deposit_str
            .parse()
            .map_err(|_| WalletError::InvalidWalletId(format!("bad deposit index '{}'", deposit_str)))?;
        let change_index = change_str
            .parse()
            .map_err(|_| WalletError::InvalidWalletId(format!("bad change index '{}'", change_str)))?;

        Ok(Self {
            network,
            material,
            derivation_path,
            deposit_index,
            change_index,
        })
    }

    /// Derivation keys for this identity; fails fast on mismatched material.
    pub fn to_keys(&self) -> Result<WalletKeys, WalletError> {
        WalletKeys::from_material(&self.material, self.network, self.derivation_path.as_ref())
    }
}

impl fmt::Display for WalletIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self
            .derivation_path
            .as_ref()
            .map(|p| format!("m/{}", p))
            .unwrap_or_default();
        write!(
            f,
            "hd:{}:{}:{}:{}:{}",
            network_name(self.network),
            self.material,
            path,
            self.deposit_index,
            self.change_index
        )
    }
}

pub(crate) fn parse_network(s: &str) -> Result<Network, WalletError> {
    match s {
        "mainnet" | "bitcoin" => Ok(Network::Bitcoin),
        "testnet" => Ok(Network::Testnet),
        "signet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        other => Err(WalletError::InvalidWalletId(format!(
            "unknown network '{}'",
            other
        ))),
    }
}

pub(crate) fn network_name(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => "mainnet",
        Network::Testnet => "testnet",
        Network::Signet => "signet",
        Network::Regtest => "regtest",
        _ => "mainnet",
    }
}

use bitcoin::{Address, Network, ScriptBuf};

use crate::error::WalletError;
use crate::provider::RawTxOutput;

/// Display marker for provably unspendable data-carrier outputs.
pub const DATA_CARRIER_MARKER: &str = "OP_RETURN";

/// Translate a hex-encoded locking script into a display address.
///
/// Data-carrier outputs get the literal `OP_RETURN` marker; non-standard
/// scripts with no address form are displayed as their raw hex.
pub fn script_to_display_address(script_hex: &str, network: Network) -> Result<String, WalletError> {
    let bytes = hex::decode(script_hex)
        .map_err(|e| WalletError::TxDecode(format!("bad script hex: {}", e)))?;
    let script = ScriptBuf::from_bytes(bytes);

    if script.is_op_return() {
        return Ok(DATA_CARRIER_MARKER.to_string());
    }

    match Address::from_script(&script, network) {
        Ok(address) => Ok(address.to_string()),
        Err(_) => Ok(script_hex.to_string()),
    }
}

/// Display address for an indexer-served output. The indexer's own
/// resolution wins when present; otherwise the script is translated here.
pub fn output_display_address(output: &RawTxOutput, network: Network) -> Result<String, WalletError> {
    if let Some(address) = &output.address {
        return Ok(address.clone());
    }
    script_to_display_address(&output.script_hex, network)
}

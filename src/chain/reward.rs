use crate::provider::RawTransaction;

/// All-zero previous transaction id marking a block-reward input.
pub const COINBASE_PREV_TXID: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Initial block subsidy in base units.
const INITIAL_SUBSIDY: u64 = 50 * 100_000_000;

/// Blocks between subsidy halvings.
const HALVING_INTERVAL: u64 = 210_000;

/// Block subsidy at the given height: initial value halved every 210,000
/// blocks, integer division.
pub fn block_subsidy(height: u64) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    if halvings >= 64 {
        return 0;
    }
    INITIAL_SUBSIDY >> halvings
}

/// A block-reward transaction has a single input referencing the all-zero
/// previous transaction.
pub fn is_block_reward(tx: &RawTransaction) -> bool {
    tx.inputs.len() == 1 && tx.inputs[0].prev_txid == COINBASE_PREV_TXID
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RawTxInput;

    #[test]
    fn test_subsidy_halving_schedule() {
        assert_eq!(block_subsidy(0), 5_000_000_000);
        assert_eq!(block_subsidy(209_999), 5_000_000_000);
        assert_eq!(block_subsidy(210_000), 2_500_000_000);
        assert_eq!(block_subsidy(420_000), 1_250_000_000);
        assert_eq!(block_subsidy(840_000), 312_500_000);
        // Past 64 halvings the subsidy is exactly zero
        assert_eq!(block_subsidy(64 * 210_000), 0);
    }

    #[test]
    fn test_block_reward_detection() {
        let coinbase = RawTransaction {
            txid: "11".repeat(32),
            size: 120,
            locktime: 0,
            inputs: vec![RawTxInput {
                prev_txid: COINBASE_PREV_TXID.to_string(),
                prev_vout: u32::MAX,
            }],
            outputs: vec![],
        };
        assert!(is_block_reward(&coinbase));

        let spend = RawTransaction {
            inputs: vec![RawTxInput {
                prev_txid: "22".repeat(32),
                prev_vout: 0,
            }],
            ..coinbase
        };
        assert!(!is_block_reward(&spend));
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Per-coin serialization and signing parameters

/// Coin parameters, read-only for the duration of a signing session
#[derive(Clone, PartialEq, Debug)]
pub struct CoinInfo {
    /// Coin name, as provided in [TransactionMeta][crate::apdu::tx::TransactionMeta]
    pub coin_name: &'static str,
    /// Ticker used when rendering amounts
    pub coin_shortcut: &'static str,
    /// Decimal places for rendering amounts
    pub decimals: u8,
    /// SLIP-0044 coin type
    pub slip44: u32,
    /// Witness serialization supported
    pub segwit: bool,
    /// Replay protection fork id, mixed into the sighash type
    pub fork_id: Option<u32>,
    /// Sign all inputs using BIP143 (amount committing) digests
    pub force_bip143: bool,
    /// Overwinter (ZIP143) transaction format
    pub overwintered: bool,
    /// Timestamp field follows the transaction version
    pub timestamp: bool,
    /// Prior transactions may carry trailing extra data
    pub extra_data: bool,
    /// Negative fees are tolerated
    pub negative_fee: bool,
    /// Digests are double SHA-256
    pub sign_hash_double: bool,
    /// Maximum fee per kB (in base units) before a high-fee warning
    pub maxfee_kb: u64,
}

impl CoinInfo {
    /// Check whether inputs on this coin commit to amounts in their sighash
    /// (BIP143 / ZIP143 for all inputs)
    pub fn bip143_all(&self) -> bool {
        self.force_bip143 || self.overwintered
    }
}

const fn bitcoin_like(
    coin_name: &'static str,
    coin_shortcut: &'static str,
    slip44: u32,
    maxfee_kb: u64,
) -> CoinInfo {
    CoinInfo {
        coin_name,
        coin_shortcut,
        decimals: 8,
        slip44,
        segwit: true,
        fork_id: None,
        force_bip143: false,
        overwintered: false,
        timestamp: false,
        extra_data: false,
        negative_fee: false,
        sign_hash_double: true,
        maxfee_kb,
    }
}

pub const BITCOIN: CoinInfo = bitcoin_like("Bitcoin", "BTC", 0, 2_000_000);

pub const TESTNET: CoinInfo = bitcoin_like("Testnet", "TEST", 1, 10_000_000);

pub const LITECOIN: CoinInfo = bitcoin_like("Litecoin", "LTC", 2, 67_000_000);

pub const BCASH: CoinInfo = CoinInfo {
    segwit: false,
    fork_id: Some(0),
    force_bip143: true,
    ..bitcoin_like("Bcash", "BCH", 145, 500_000)
};

pub const ZCASH: CoinInfo = CoinInfo {
    segwit: false,
    overwintered: true,
    extra_data: true,
    ..bitcoin_like("Zcash", "ZEC", 133, 1_000_000)
};

pub const PEERCOIN: CoinInfo = CoinInfo {
    decimals: 6,
    segwit: false,
    timestamp: true,
    ..bitcoin_like("Peercoin", "PPC", 6, 2_000_000)
};

/// Built-in coin table
pub const COINS: &[CoinInfo] = &[BITCOIN, TESTNET, LITECOIN, BCASH, ZCASH, PEERCOIN];

/// Resolve coin parameters by name
pub fn by_name(name: &str) -> Option<&'static CoinInfo> {
    COINS.iter().find(|c| c.coin_name == name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lookup() {
        assert_eq!(by_name("Bitcoin"), Some(&BITCOIN));
        assert_eq!(by_name("Zcash").map(|c| c.overwintered), Some(true));
        assert!(by_name("Dogecoin").is_none());
        assert!(by_name("bitcoin").is_none());
    }

    #[test]
    fn bip143_selection() {
        assert!(!BITCOIN.bip143_all());
        assert!(BCASH.bip143_all());
        assert!(ZCASH.bip143_all());
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Sighash engines, computing the digest signed for each input
//!
//! - [legacy] re-serializes the transaction per input with script substitution
//! - [bip143] and [zip143] accumulate prevout / sequence / output midstates once
//!   and combine these per input

use crate::{
    apdu::{
        tx::{InputDescriptor, TransactionMeta},
        PublicKey, Script,
    },
    coins::CoinInfo,
    engine::Error,
    scripts::{hash160, output_script_multisig, output_script_p2pkh},
};

pub mod bip143;
pub use bip143::Bip143;

pub mod legacy;
pub use legacy::LegacyHasher;

pub mod zip143;
pub use zip143::Zip143;

/// Sign all inputs and outputs
pub const SIGHASH_ALL: u32 = 0x01;

/// Replay protection flag for forked coins
pub const SIGHASH_FORKID: u32 = 0x40;

/// Overwintered transaction version flag
pub const OVERWINTERED: u32 = 0x8000_0000;

/// Compute the sighash type for a coin
pub fn get_hash_type(coin: &CoinInfo) -> u32 {
    match coin.fork_id {
        Some(fork_id) => SIGHASH_ALL | SIGHASH_FORKID | (fork_id << 8),
        None => SIGHASH_ALL,
    }
}

/// Resolve the sighash type for an input, only `SIGHASH_ALL` overrides are accepted
pub fn input_hash_type(coin: &CoinInfo, i: &InputDescriptor) -> Result<u32, Error> {
    let hash_type = get_hash_type(coin);

    match i.sighash {
        None => Ok(hash_type),
        Some(v) if v == hash_type || v == SIGHASH_ALL => Ok(hash_type),
        Some(_v) => {
            #[cfg(feature = "log")]
            log::error!("unsupported sighash type: 0x{:08x}", _v);

            Err(Error::InvalidSighash)
        }
    }
}

/// Derive the script code committed to by an input digest,
/// the redeem script for multisig or P2PKH of the signing key otherwise
pub fn derive_script_code(i: &InputDescriptor, pubkey: &PublicKey) -> Result<Script, Error> {
    match &i.multisig {
        Some(ms) => output_script_multisig(&ms.pubkeys, ms.m),
        None => Ok(output_script_p2pkh(&hash160(pubkey))),
    }
}

/// Common interface for midstate (BIP143 / ZIP143) sighash engines
pub trait Hash143 {
    /// Add an input outpoint to the prevouts midstate
    fn add_prevout(&mut self, i: &InputDescriptor);

    /// Add an input sequence to the sequence midstate
    fn add_sequence(&mut self, i: &InputDescriptor);

    /// Add an output to the outputs midstate
    fn add_output(&mut self, amount: u64, script_pubkey: &[u8]);

    /// Compute the digest for the provided input
    fn preimage_hash(
        &self,
        coin: &CoinInfo,
        tx: &TransactionMeta,
        i: &InputDescriptor,
        script_code: &[u8],
        sighash: u32,
    ) -> [u8; 32];
}

/// Midstate engine selected per coin, avoiding dynamic dispatch
#[derive(Clone)]
pub enum Hasher143 {
    Bip143(Bip143),
    Zip143(Zip143),
}

impl Hasher143 {
    /// Create a midstate engine for the provided coin
    pub fn new(coin: &CoinInfo) -> Self {
        match coin.overwintered {
            true => Hasher143::Zip143(Zip143::new()),
            false => Hasher143::Bip143(Bip143::new()),
        }
    }
}

impl Hash143 for Hasher143 {
    fn add_prevout(&mut self, i: &InputDescriptor) {
        match self {
            Hasher143::Bip143(h) => h.add_prevout(i),
            Hasher143::Zip143(h) => h.add_prevout(i),
        }
    }

    fn add_sequence(&mut self, i: &InputDescriptor) {
        match self {
            Hasher143::Bip143(h) => h.add_sequence(i),
            Hasher143::Zip143(h) => h.add_sequence(i),
        }
    }

    fn add_output(&mut self, amount: u64, script_pubkey: &[u8]) {
        match self {
            Hasher143::Bip143(h) => h.add_output(amount, script_pubkey),
            Hasher143::Zip143(h) => h.add_output(amount, script_pubkey),
        }
    }

    fn preimage_hash(
        &self,
        coin: &CoinInfo,
        tx: &TransactionMeta,
        i: &InputDescriptor,
        script_code: &[u8],
        sighash: u32,
    ) -> [u8; 32] {
        match self {
            Hasher143::Bip143(h) => h.preimage_hash(coin, tx, i, script_code, sighash),
            Hasher143::Zip143(h) => h.preimage_hash(coin, tx, i, script_code, sighash),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        apdu::{tx::ScriptType, DerivationPath},
        coins::{BCASH, BITCOIN},
    };

    fn input(sighash: Option<u32>) -> InputDescriptor {
        InputDescriptor {
            prev_hash: [0u8; 32],
            prev_index: 0,
            amount: 1,
            sequence: 0,
            script_type: ScriptType::Legacy,
            address_n: DerivationPath::new(),
            multisig: None,
            sighash,
        }
    }

    #[test]
    fn hash_types() {
        assert_eq!(get_hash_type(&BITCOIN), 0x01);
        assert_eq!(get_hash_type(&BCASH), 0x41);

        let mut forked = BCASH.clone();
        forked.fork_id = Some(79);
        assert_eq!(get_hash_type(&forked), 0x4f41);
        // Trailing signature byte is the low byte
        assert_eq!(get_hash_type(&forked) as u8, 0x41);
    }

    #[test]
    fn sighash_overrides() {
        assert_eq!(input_hash_type(&BITCOIN, &input(None)), Ok(0x01));
        assert_eq!(input_hash_type(&BITCOIN, &input(Some(0x01))), Ok(0x01));
        assert_eq!(input_hash_type(&BCASH, &input(Some(0x41))), Ok(0x41));
        assert_eq!(
            input_hash_type(&BITCOIN, &input(Some(0x03))),
            Err(Error::InvalidSighash)
        );
        assert_eq!(
            input_hash_type(&BITCOIN, &input(Some(0x81))),
            Err(Error::InvalidSighash)
        );
    }
}

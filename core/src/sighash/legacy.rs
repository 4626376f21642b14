// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Legacy (pre-segwit) sighash engine
//!
//! The digest for each input is computed over a full re-serialization of the
//! transaction, with the signed input's script_sig replaced by its script code
//! and every other input's script_sig emptied. Inputs are streamed in order
//! so the transaction is never held in memory.

use sha2::{Digest, Sha256};

use crate::{
    apdu::tx::TransactionMeta,
    coins::CoinInfo,
    writers::{get_tx_hash, write_tx_footer, write_tx_header, write_tx_input, write_tx_output, Writer},
};

/// Streaming legacy sighash accumulator for a single input
#[derive(Clone)]
pub struct LegacyHasher {
    h: Sha256,
}

impl LegacyHasher {
    /// Start a legacy digest, writing the transaction header and input count
    pub fn new(coin: &CoinInfo, tx: &TransactionMeta) -> Self {
        let mut h = Sha256::new();

        write_tx_header(
            &mut h,
            tx.version,
            coin.overwintered,
            tx.version_group_id,
            tx.timestamp,
        );
        h.write_varint(tx.inputs_count as u64);

        Self { h }
    }

    /// Add an input, `script` is the script code for the input being signed
    /// and empty for all others
    pub fn add_input(&mut self, prev_hash: &[u8; 32], prev_index: u32, script: &[u8], sequence: u32) {
        write_tx_input(&mut self.h, prev_hash, prev_index, script, sequence);
    }

    /// Write the output count, following the last input
    pub fn add_outputs_count(&mut self, outputs_count: u32) {
        self.h.write_varint(outputs_count as u64);
    }

    pub fn add_output(&mut self, amount: u64, script_pubkey: &[u8]) {
        write_tx_output(&mut self.h, amount, script_pubkey);
    }

    /// Write the footer and sighash type, returning the digest to be signed
    pub fn finish(mut self, coin: &CoinInfo, tx: &TransactionMeta, sighash: u32) -> [u8; 32] {
        write_tx_footer(&mut self.h, tx.lock_time, coin.overwintered, tx.expiry);
        self.h.write_u32(sighash);

        get_tx_hash(self.h, coin.sign_hash_double, false)
    }
}

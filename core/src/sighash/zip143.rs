// Copyright (c) 2022-2023 The MobileCoin Foundation

//! ZIP143 (Overwinter) sighash engine

use blake2b_simd::{Params, State};

use super::{Hash143, OVERWINTERED};
use crate::{
    apdu::tx::{InputDescriptor, TransactionMeta},
    coins::CoinInfo,
    writers::{write_outpoint, write_tx_output, Writer},
};

const PREVOUTS_PERSONAL: &[u8; 16] = b"ZcashPrevoutHash";
const SEQUENCE_PERSONAL: &[u8; 16] = b"ZcashSequencHash";
const OUTPUTS_PERSONAL: &[u8; 16] = b"ZcashOutputsHash";
const SIGHASH_PERSONAL: &[u8; 12] = b"ZcashSigHash";

fn blake2b_256(personal: &[u8]) -> State {
    Params::new().hash_length(32).personal(personal).to_state()
}

fn finalize(s: &State) -> [u8; 32] {
    let mut d = [0u8; 32];
    d.copy_from_slice(s.finalize().as_bytes());
    d
}

/// Sighash personalization, binding the consensus branch id
pub fn sighash_personal(branch_id: u32) -> [u8; 16] {
    let mut p = [0u8; 16];
    p[..12].copy_from_slice(SIGHASH_PERSONAL);
    p[12..].copy_from_slice(&branch_id.to_le_bytes());
    p
}

/// ZIP143 midstate accumulator
#[derive(Clone)]
pub struct Zip143 {
    h_prevouts: State,
    h_sequence: State,
    h_outputs: State,
}

impl Default for Zip143 {
    fn default() -> Self {
        Self::new()
    }
}

impl Zip143 {
    pub fn new() -> Self {
        Self {
            h_prevouts: blake2b_256(PREVOUTS_PERSONAL),
            h_sequence: blake2b_256(SEQUENCE_PERSONAL),
            h_outputs: blake2b_256(OUTPUTS_PERSONAL),
        }
    }

    pub fn prevouts_hash(&self) -> [u8; 32] {
        finalize(&self.h_prevouts)
    }

    pub fn sequence_hash(&self) -> [u8; 32] {
        finalize(&self.h_sequence)
    }

    pub fn outputs_hash(&self) -> [u8; 32] {
        finalize(&self.h_outputs)
    }
}

impl Hash143 for Zip143 {
    fn add_prevout(&mut self, i: &InputDescriptor) {
        write_outpoint(&mut self.h_prevouts, &i.prev_hash, i.prev_index);
    }

    fn add_sequence(&mut self, i: &InputDescriptor) {
        self.h_sequence.write_u32(i.sequence);
    }

    fn add_output(&mut self, amount: u64, script_pubkey: &[u8]) {
        write_tx_output(&mut self.h_outputs, amount, script_pubkey);
    }

    fn preimage_hash(
        &self,
        _coin: &CoinInfo,
        tx: &TransactionMeta,
        i: &InputDescriptor,
        script_code: &[u8],
        sighash: u32,
    ) -> [u8; 32] {
        let personal = sighash_personal(tx.branch_id.unwrap_or(0));
        let mut h = blake2b_256(&personal);

        h.write_u32(tx.version | OVERWINTERED);
        h.write_u32(tx.version_group_id.unwrap_or(0));

        h.write_bytes(&self.prevouts_hash());
        h.write_bytes(&self.sequence_hash());
        h.write_bytes(&self.outputs_hash());

        // hashJoinSplits, unsupported
        h.write_bytes(&[0u8; 32]);

        h.write_u32(tx.lock_time);
        h.write_u32(tx.expiry.unwrap_or(0));
        h.write_u32(sighash);

        write_outpoint(&mut h, &i.prev_hash, i.prev_index);
        h.write_bytes_prefixed(script_code);
        h.write_u64(i.amount);
        h.write_u32(i.sequence);

        finalize(&h)
    }
}

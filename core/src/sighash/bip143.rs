// Copyright (c) 2022-2023 The MobileCoin Foundation

//! BIP143 (segwit v0) sighash engine

use sha2::{Digest, Sha256};

use super::Hash143;
use crate::{
    apdu::tx::{InputDescriptor, TransactionMeta},
    coins::CoinInfo,
    writers::{get_tx_hash, write_outpoint, write_tx_output, Writer},
};

/// BIP143 midstate accumulator
#[derive(Clone)]
pub struct Bip143 {
    h_prevouts: Sha256,
    h_sequence: Sha256,
    h_outputs: Sha256,
}

impl Default for Bip143 {
    fn default() -> Self {
        Self::new()
    }
}

impl Bip143 {
    pub fn new() -> Self {
        Self {
            h_prevouts: Sha256::new(),
            h_sequence: Sha256::new(),
            h_outputs: Sha256::new(),
        }
    }

    pub fn prevouts_hash(&self, coin: &CoinInfo) -> [u8; 32] {
        get_tx_hash(self.h_prevouts.clone(), coin.sign_hash_double, false)
    }

    pub fn sequence_hash(&self, coin: &CoinInfo) -> [u8; 32] {
        get_tx_hash(self.h_sequence.clone(), coin.sign_hash_double, false)
    }

    pub fn outputs_hash(&self, coin: &CoinInfo) -> [u8; 32] {
        get_tx_hash(self.h_outputs.clone(), coin.sign_hash_double, false)
    }
}

impl Hash143 for Bip143 {
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
        coin: &CoinInfo,
        tx: &TransactionMeta,
        i: &InputDescriptor,
        script_code: &[u8],
        sighash: u32,
    ) -> [u8; 32] {
        let mut h = Sha256::new();

        h.write_u32(tx.version);
        h.write_bytes(&self.prevouts_hash(coin));
        h.write_bytes(&self.sequence_hash(coin));

        write_outpoint(&mut h, &i.prev_hash, i.prev_index);

        h.write_bytes_prefixed(script_code);
        h.write_u64(i.amount);
        h.write_u32(i.sequence);

        h.write_bytes(&self.outputs_hash(coin));
        h.write_u32(tx.lock_time);
        h.write_u32(sighash);

        get_tx_hash(h, coin.sign_hash_double, false)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        apdu::{tx::ScriptType, DerivationPath},
        coins::BITCOIN,
        scripts::output_script_p2pkh,
    };

    /// Txid in display order, from serialized (internal) order
    fn txid(serialized: &str) -> [u8; 32] {
        let mut h = [0u8; 32];
        hex::decode_to_slice(serialized, &mut h).unwrap();
        h.reverse();
        h
    }

    fn input(prev: &str, prev_index: u32, amount: u64, sequence: u32) -> InputDescriptor {
        InputDescriptor {
            prev_hash: txid(prev),
            prev_index,
            amount,
            sequence,
            script_type: ScriptType::NativeSegwit,
            address_n: DerivationPath::new(),
            multisig: None,
            sighash: None,
        }
    }

    // Native P2WPKH example from BIP143
    #[test]
    fn bip143_native_p2wpkh() {
        let inputs = [
            input(
                "fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f",
                0,
                625_000_000,
                0xffff_ffee,
            ),
            input(
                "ef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b90ec68a",
                1,
                600_000_000,
                0xffff_ffff,
            ),
        ];

        let outputs = [
            (
                112_340_000u64,
                hex::decode("76a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac").unwrap(),
            ),
            (
                223_450_000u64,
                hex::decode("76a9143bde42dbee7e4dbe6a21b2d50ce2f0167faa815988ac").unwrap(),
            ),
        ];

        let mut h = Bip143::new();
        for i in &inputs {
            h.add_prevout(i);
            h.add_sequence(i);
        }
        for (amount, script) in &outputs {
            h.add_output(*amount, script);
        }

        assert_eq!(
            hex::encode(h.prevouts_hash(&BITCOIN)),
            "96b827c8483d4e9b96712b6713a7b68d6e8003a781feba36c31143470b4efd37"
        );
        assert_eq!(
            hex::encode(h.sequence_hash(&BITCOIN)),
            "52b0a642eea2fb7ae638c36f6252b6750293dbe574a806984b8e4d8548339a3b"
        );
        assert_eq!(
            hex::encode(h.outputs_hash(&BITCOIN)),
            "863ef3e1a92afbfdb97f31ad0fc7683ee943e9abcf2501590ff8f6551f47e5e5"
        );

        let tx = TransactionMeta::new("Bitcoin", 1, 0x11, 2, 2).unwrap();

        let mut pkh = [0u8; 20];
        hex::decode_to_slice("1d0f172a0ecb48aee1be1f2687d2963ae33f71a1", &mut pkh).unwrap();
        let script_code = output_script_p2pkh(&pkh);

        let digest = h.preimage_hash(&BITCOIN, &tx, &inputs[1], &script_code, 0x01);
        assert_eq!(
            hex::encode(digest),
            "c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670"
        );
    }

    // Streamed midstates match hashes over the materialized concatenation
    #[test]
    fn streamed_midstates_match_reference() {
        for count in [1usize, 2, 50] {
            let mut h = Bip143::new();
            let mut prevouts = std::vec::Vec::new();
            let mut sequences = std::vec::Vec::new();
            let mut outputs = std::vec::Vec::new();

            for n in 0..count {
                let mut prev_hash = [0u8; 32];
                prev_hash[0] = n as u8;
                prev_hash[31] = 0xa5;

                let i = InputDescriptor {
                    prev_hash,
                    prev_index: n as u32,
                    amount: 1000 + n as u64,
                    sequence: 0xffff_fff0 + (n as u32 % 8),
                    script_type: ScriptType::NativeSegwit,
                    address_n: DerivationPath::new(),
                    multisig: None,
                    sighash: None,
                };
                h.add_prevout(&i);
                h.add_sequence(&i);

                let mut rev = prev_hash;
                rev.reverse();
                prevouts.extend_from_slice(&rev);
                prevouts.extend_from_slice(&(n as u32).to_le_bytes());
                sequences.extend_from_slice(&i.sequence.to_le_bytes());

                let script = [0x00, 0x14, n as u8];
                h.add_output(5000 * n as u64, &script);
                outputs.extend_from_slice(&(5000 * n as u64).to_le_bytes());
                outputs.push(script.len() as u8);
                outputs.extend_from_slice(&script);
            }

            let dsha = |b: &[u8]| -> [u8; 32] { Sha256::digest(Sha256::digest(b)).into() };

            assert_eq!(h.prevouts_hash(&BITCOIN), dsha(&prevouts), "prevouts ({count})");
            assert_eq!(h.sequence_hash(&BITCOIN), dsha(&sequences), "sequence ({count})");
            assert_eq!(h.outputs_hash(&BITCOIN), dsha(&outputs), "outputs ({count})");
        }
    }
}

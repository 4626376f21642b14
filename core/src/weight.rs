// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Worst-case transaction weight estimation
//!
//! Weight is computed prior to signing, assuming maximum length DER
//! signatures, and is used only for the high-fee warning.

use crate::{
    apdu::tx::{InputDescriptor, ScriptType},
    scripts::op_push_size,
    writers::varint_len,
};

const TXSIZE_HEADER: usize = 4;
const TXSIZE_FOOTER: usize = 4;
const TXSIZE_INPUT: usize = 40;
const TXSIZE_OUTPUT: usize = 8;
const TXSIZE_PUBKEY: usize = 33;
const TXSIZE_SIGNATURE: usize = 72;
const TXSIZE_MULTISIGSCRIPT: usize = 3;
const TXSIZE_WITNESSPKHASH: usize = 22;
const TXSIZE_WITNESSSCRIPT: usize = 34;

/// Transaction weight calculator
#[derive(Clone, PartialEq, Debug)]
pub struct TxWeightCalculator {
    inputs_count: usize,
    counter: usize,
    segwit: bool,
}

impl TxWeightCalculator {
    pub fn new(inputs_count: usize, outputs_count: usize) -> Self {
        Self {
            inputs_count,
            counter: 4
                * (TXSIZE_HEADER
                    + TXSIZE_FOOTER
                    + varint_len(inputs_count as u64)
                    + varint_len(outputs_count as u64)),
            segwit: false,
        }
    }

    /// Worst-case unlocking script (or witness) size for an input
    pub fn input_script_size(i: &InputDescriptor) -> usize {
        match &i.multisig {
            Some(ms) => {
                let script_size = TXSIZE_MULTISIGSCRIPT + ms.n() * (1 + TXSIZE_PUBKEY);
                1 + ms.m as usize * (1 + TXSIZE_SIGNATURE) + op_push_size(script_size) + script_size
            }
            None => 1 + TXSIZE_SIGNATURE + 1 + TXSIZE_PUBKEY,
        }
    }

    pub fn add_input(&mut self, i: &InputDescriptor) {
        self.counter += 4 * TXSIZE_INPUT;

        let script_size = Self::input_script_size(i);

        match i.script_type {
            ScriptType::Legacy => {
                self.counter += 4 * (script_size + varint_len(script_size as u64));
            }
            ScriptType::P2shSegwit => {
                self.add_witness_header();
                self.counter += match i.multisig.is_some() {
                    true => 4 * (2 + TXSIZE_WITNESSSCRIPT),
                    false => 4 * (2 + TXSIZE_WITNESSPKHASH),
                };
                // Witness data counted at unit weight
                self.counter += 1 + script_size;
            }
            ScriptType::NativeSegwit => {
                self.add_witness_header();
                // Empty script_sig
                self.counter += 4;
                self.counter += 1 + script_size;
            }
        }
    }

    fn add_witness_header(&mut self) {
        if !self.segwit {
            // Marker and flag
            self.counter += 2;
            self.counter += varint_len(self.inputs_count as u64);
            self.segwit = true;
        }
    }

    pub fn add_output(&mut self, script: &[u8]) {
        let size = script.len() + varint_len(script.len() as u64);
        self.counter += 4 * (TXSIZE_OUTPUT + size);
    }

    /// Fetch the current weight estimate
    pub fn get_total(&self) -> usize {
        self.counter
    }

    /// Fetch the current virtual size estimate
    pub fn vsize(&self) -> usize {
        (self.counter + 3) / 4
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::apdu::{tx::MultisigDescriptor, DerivationPath};

    fn input(script_type: ScriptType) -> InputDescriptor {
        InputDescriptor {
            prev_hash: [0u8; 32],
            prev_index: 0,
            amount: 10_000,
            sequence: 0xffff_ffff,
            script_type,
            address_n: DerivationPath::new(),
            multisig: None,
            sighash: None,
        }
    }

    #[test]
    fn legacy_p2pkh_weight() {
        let mut w = TxWeightCalculator::new(1, 1);
        w.add_input(&input(ScriptType::Legacy));
        w.add_output(&[0u8; 25]);

        // 4 * (10 header/footer/counts + 40 input + 108 script + 34 output)
        assert_eq!(w.get_total(), 4 * (10 + 40 + 108 + 34));
        assert_eq!(w.vsize(), 192);
    }

    #[test]
    fn native_segwit_weight() {
        let mut w = TxWeightCalculator::new(2, 1);
        w.add_input(&input(ScriptType::NativeSegwit));
        w.add_input(&input(ScriptType::NativeSegwit));
        w.add_output(&[0u8; 22]);

        let expected = 4 * 10 + 2 + 1 + 2 * (4 * 40 + 4 + 108) + 4 * (8 + 23);
        assert_eq!(w.get_total(), expected);
    }

    #[test]
    fn p2sh_segwit_multisig_weight() {
        let mut i = input(ScriptType::P2shSegwit);
        i.multisig = Some(MultisigDescriptor::new(2, &[[0x02; 33]; 3]).unwrap());

        // 1 + 2 * 73 + push(105) + 105
        assert_eq!(TxWeightCalculator::input_script_size(&i), 1 + 146 + 2 + 105);

        let mut w = TxWeightCalculator::new(1, 1);
        w.add_input(&i);

        let expected = 4 * 10 + 3 + 4 * 40 + 4 * 36 + 1 + 254;
        assert_eq!(w.get_total(), expected);
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Prior transaction APDUs, streamed to the device to verify input amounts

use encdec::{Decode, Encode};
use heapless::Vec;
use ledger_proto::ApduStatic;

use crate::{
    helpers::{arr, bytes},
    ApduError, Instruction, Script, MAX_EXTRA_DATA_CHUNK, MAX_SCRIPT_SIG_LEN, UTXO_APDU_CLA,
};

/// Prior transaction input
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// /                           PREV_HASH                           /
/// /               (32-byte txid, display byte order)              /
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                     PREV_INDEX (u32)                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      SEQUENCE (u32)                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |        SCRIPT_SIG_LEN         |   SCRIPT_SIG (variable)       /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct PrevInput {
    #[encdec(with = "arr")]
    pub prev_hash: [u8; 32],
    pub prev_index: u32,
    pub sequence: u32,
    #[encdec(with = "bytes")]
    pub script_sig: Vec<u8, MAX_SCRIPT_SIG_LEN>,
}

impl ApduStatic for PrevInput {
    const CLA: u8 = UTXO_APDU_CLA;
    const INS: u8 = Instruction::TxAckPrevInput as u8;
}

/// Prior transaction output
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        AMOUNT (u64)                           |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      SCRIPT_PUBKEY_LEN        |  SCRIPT_PUBKEY (variable)     /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct PrevOutput {
    pub amount: u64,
    #[encdec(with = "bytes")]
    pub script_pubkey: Script,
}

impl ApduStatic for PrevOutput {
    const CLA: u8 = UTXO_APDU_CLA;
    const INS: u8 = Instruction::TxAckPrevOutput as u8;
}

/// Chunk of prior transaction extra data
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           CHUNK_LEN           |     CHUNK (variable)          /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct PrevExtraData {
    #[encdec(with = "bytes")]
    pub chunk: Vec<u8, MAX_EXTRA_DATA_CHUNK>,
}

impl ApduStatic for PrevExtraData {
    const CLA: u8 = UTXO_APDU_CLA;
    const INS: u8 = Instruction::TxAckPrevExtraData as u8;
}

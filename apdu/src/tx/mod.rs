// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction related APDUs, used to stream a transaction through the hardware signer.
//!
//! See [ledger_utxo_core::engine] for interaction and state machines

use encdec::{Decode, Encode};
use ledger_proto::ApduStatic;

use crate::{
    state::{Digest, TxState},
    ApduError, Instruction, UTXO_APDU_CLA,
};

mod meta;
pub use meta::*;

mod input;
pub use input::*;

mod output;
pub use output::*;

mod prev;
pub use prev::*;

mod request;
pub use request::*;

/// Transaction information request APDU, returns the outstanding
/// [TxRequest] where one exists or [TxInfo] otherwise
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct TxInfoReq;

impl ApduStatic for TxInfoReq {
    const CLA: u8 = UTXO_APDU_CLA;
    const INS: u8 = Instruction::TxGetInfo as u8;
}

/// Abort the running signing session (0 length APDU)
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct TxAbort;

impl ApduStatic for TxAbort {
    const CLA: u8 = UTXO_APDU_CLA;
    const INS: u8 = Instruction::TxAbort as u8;
}

/// Transaction information response APDU.
///
/// Contains the current engine state, a value where relevant (progress while signing,
/// error code once aborted), and the session transcript digest.
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   TX_STATE    |            VALUE              |   RESERVED    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// |                           TX_DIGEST                           |
/// |                    32-byte rolling checksum                   |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct TxInfo {
    /// Current transaction engine state
    pub state: TxState,
    /// Value associated with current state (zero otherwise)
    pub value: u16,
    /// Reserved
    pub reserved: u8,
    /// Transaction transcript digest
    pub digest: Digest,
}

#[cfg(test)]
mod test {
    use crate::test::encode_decode_apdu;

    use super::*;

    #[test]
    fn encode_decode_info() {
        let mut digest = Digest::from_seed(&[0x55; 32]);
        digest.update(&[0x01; 32]);

        let info = TxInfo {
            state: TxState::Pending,
            value: 42,
            reserved: 0,
            digest,
        };

        let mut buff = [0u8; 64];
        assert_eq!(encode_decode_apdu(&mut buff, &info), 36);

        let mut buff = [0u8; 4];
        assert_eq!(encode_decode_apdu(&mut buff, &TxInfoReq), 0);
        assert_eq!(encode_decode_apdu(&mut buff, &TxAbort), 0);
    }
}

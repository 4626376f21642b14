// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol / APDU definitions for UTXO transaction signing
//!
//! This module provides a protocol specification and reference implementation for
//! communication between a host wallet and a hardware signer for Bitcoin-family
//! (UTXO) transactions.
//!
//! The device never holds a whole transaction. Instead it drives the exchange by
//! issuing [`TxRequest`][tx::TxRequest]s for individual inputs, outputs and prior
//! transaction fragments, which the host answers with the matching `TxAck*` message.
//!
//! Encodings are intended to be _roughly_ equivalent to packed c structures while maintaining
//! 32-bit field alignment for fixed headers to reduce the need for unaligned access on
//! constrained platforms. All field encodings are little-endian, matching the
//! consensus encoding of the transactions being signed.
//!
//! Messages with variable-length payloads (paths, scripts, multisig key sets) may exceed
//! a single APDU, splitting these across frames is the responsibility of the transport.

#![no_std]

pub use ledger_proto::{ApduError, ApduReq, ApduStatic};

pub mod digest;
pub mod prelude;
pub mod state;
pub mod tx;

mod helpers;

/// UTXO signer APDU Class
pub const UTXO_APDU_CLA: u8 = 0xe1;

/// Protocol version
pub const UTXO_PROTO_VERSION: u8 = 0x01;

/// Maximum BIP32 derivation path depth
pub const MAX_PATH_DEPTH: usize = 8;

/// Maximum number of keys in a multisig descriptor
pub const MAX_MULTISIG_KEYS: usize = 15;

/// Maximum script_pubkey / redeem script length
pub const MAX_SCRIPT_LEN: usize = 520;

/// Maximum script_sig length for prior transaction inputs
pub const MAX_SCRIPT_SIG_LEN: usize = 1650;

/// Maximum OP_RETURN payload length
pub const MAX_OP_RETURN_LEN: usize = 80;

/// Maximum length of a prior transaction extra data chunk
pub const MAX_EXTRA_DATA_CHUNK: usize = 1024;

/// Maximum serialized transaction chunk returned per request
pub const MAX_SERIALIZED_LEN: usize = 2048;

/// Maximum DER signature length (without sighash byte)
pub const MAX_SIGNATURE_LEN: usize = 72;

/// Maximum coin name length
pub const MAX_COIN_NAME_LEN: usize = 20;

/// Compressed secp256k1 public key
pub type PublicKey = [u8; 33];

/// DER encoded ECDSA signature
pub type Signature = heapless::Vec<u8, MAX_SIGNATURE_LEN>;

/// BIP32 derivation path, high bit marks hardened components
pub type DerivationPath = heapless::Vec<u32, MAX_PATH_DEPTH>;

/// Script bytes (script_pubkey / redeem script)
pub type Script = heapless::Vec<u8, MAX_SCRIPT_LEN>;

/// Hardened derivation flag
pub const HARDENED: u32 = 0x8000_0000;

/// UTXO signer APDU instruction codes
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum Instruction {
    /// Start a signing session
    SignTx = 0x20,

    /// Respond to an input request
    TxAckInput = 0x21,

    /// Respond to an output request
    TxAckOutput = 0x22,

    /// Respond to a prior transaction metadata request
    TxAckPrevMeta = 0x23,

    /// Respond to a prior transaction input request
    TxAckPrevInput = 0x24,

    /// Respond to a prior transaction output request
    TxAckPrevOutput = 0x25,

    /// Respond to a prior transaction extra data request
    TxAckPrevExtraData = 0x26,

    /// Fetch transaction state / outstanding request
    TxGetInfo = 0x30,

    /// Abort the signing session
    TxAbort = 0x31,
}

/// Helper macro for encoding `bitflags` types
#[macro_export]
macro_rules! encdec_bitflags {
    ($b:ty) => {
        impl encdec::Encode for $b {
            type Error = ApduError;

            fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
                let bits: u8 = self.bits();
                encdec::Encode::encode(&bits, buff).map_err(|e| e.into())
            }

            fn encode_len(&self) -> Result<usize, Self::Error> {
                let bits: u8 = self.bits();
                encdec::Encode::encode_len(&bits).map_err(|e| e.into())
            }
        }

        impl encdec::DecodeOwned for $b {
            type Output = $b;
            type Error = ApduError;

            fn decode_owned(buff: &[u8]) -> Result<(Self, usize), Self::Error> {
                if buff.is_empty() {
                    return Err(ApduError::InvalidLength);
                }
                let v = <$b>::from_bits_truncate(buff[0]);
                Ok((v, 1))
            }
        }
    };
}

#[cfg(test)]
pub(crate) mod test {
    use encdec::EncDec;

    use super::*;

    /// Maximum payload for single-frame APDUs
    pub const MAX_APDU_PAYLOAD: usize = 249;

    /// Helper for APDU encode / decode tests
    pub fn encode_decode_apdu<'a, A: EncDec<'a, ApduError> + PartialEq>(
        buff: &'a mut [u8],
        apdu: &A,
    ) -> usize {
        // Encode APDU
        let n = apdu.encode(buff).expect("encode failed");

        // Check encoded length matches expected length
        let expected_n = apdu.encode_len().expect("get length failed");
        assert_eq!(n, expected_n, "encode length mismatch");

        // Decode APDU
        let (decoded, decoded_n) = A::decode(&buff[..n]).expect("decode failed");

        // Check decoded object and length match
        assert_eq!(apdu, &decoded);
        assert_eq!(expected_n, decoded_n);

        // Return length, useful for rough confirmation of packing expectations
        n
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

use ledger_proto::ApduError;

/// [Engine][super::Engine] errors, codes are reported to the host
/// via [TxInfo][crate::apdu::tx::TxInfo] once a session is aborted
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(u8)]
pub enum Error {
    /// Invalid argument length
    #[cfg_attr(feature = "thiserror", error("Invalid argument length"))]
    InvalidLength = 0x00,

    /// Unexpected event
    #[cfg_attr(feature = "thiserror", error("Unexpected event"))]
    UnexpectedEvent = 0x01,

    /// Data changed between passes
    #[cfg_attr(feature = "thiserror", error("Transaction has changed during signing"))]
    TransactionChanged = 0x02,

    /// Invalid engine state
    #[cfg_attr(feature = "thiserror", error("invalid engine state"))]
    InvalidState = 0x03,

    /// Unknown coin
    #[cfg_attr(feature = "thiserror", error("invalid coin name"))]
    InvalidCoin = 0x10,

    /// Script type not supported by coin
    #[cfg_attr(feature = "thiserror", error("unsupported script type for coin"))]
    UnsupportedScriptType = 0x11,

    /// Derivation path rejected for coin
    #[cfg_attr(feature = "thiserror", error("invalid derivation path"))]
    InvalidPath = 0x12,

    /// Signing key missing from multisig key set
    #[cfg_attr(feature = "thiserror", error("multisig pubkey not found"))]
    MultisigKeyNotFound = 0x13,

    /// Malformed multisig descriptor
    #[cfg_attr(feature = "thiserror", error("invalid multisig descriptor"))]
    InvalidMultisig = 0x14,

    /// Input amount does not match prior transaction
    #[cfg_attr(feature = "thiserror", error("invalid amount"))]
    InvalidAmount = 0x15,

    /// Prior transaction hash mismatch
    #[cfg_attr(feature = "thiserror", error("encountered invalid prev_hash"))]
    PrevTxMismatch = 0x16,

    /// Outputs exceed inputs
    #[cfg_attr(feature = "thiserror", error("not enough funds"))]
    NotEnoughFunds = 0x17,

    /// Amount totals overflowed
    #[cfg_attr(feature = "thiserror", error("value overflow"))]
    ValueOverflow = 0x18,

    /// Invalid input or output count
    #[cfg_attr(feature = "thiserror", error("invalid input / output count"))]
    InvalidCount = 0x19,

    /// Invalid output
    #[cfg_attr(feature = "thiserror", error("invalid output"))]
    InvalidOutput = 0x1a,

    /// Transaction metadata rejected for coin
    #[cfg_attr(feature = "thiserror", error("invalid transaction metadata"))]
    InvalidMeta = 0x1b,

    /// Unsupported sighash type
    #[cfg_attr(feature = "thiserror", error("unsupported sighash type"))]
    InvalidSighash = 0x1c,

    /// Prior transaction output index out of range
    #[cfg_attr(feature = "thiserror", error("invalid prev_index"))]
    InvalidPrevIndex = 0x1e,

    /// Signing primitive failure
    #[cfg_attr(feature = "thiserror", error("signing failed"))]
    SignError = 0x1f,

    /// User rejected the transaction
    #[cfg_attr(feature = "thiserror", error("rejected by user"))]
    UserRejected = 0x20,

    /// User rejected a transaction with a high fee
    #[cfg_attr(feature = "thiserror", error("high fee rejected by user"))]
    FeeRejected = 0x21,

    /// Host cancelled the session
    #[cfg_attr(feature = "thiserror", error("cancelled by host"))]
    Cancelled = 0x22,

    /// Transport failure
    #[cfg_attr(feature = "thiserror", error("transport failure"))]
    Transport = 0x30,

    /// Malformed message
    #[cfg_attr(feature = "thiserror", error("malformed message"))]
    Malformed = 0x31,

    /// Unknown / not-yet defined error (placeholder)
    #[default]
    #[cfg_attr(feature = "thiserror", error("unknown"))]
    Unknown = 0xf0,
}

/// Error classification
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    /// Host misbehaved (out of order, changed data, broken counts)
    ProtocolViolation,
    /// Transaction data rejected
    DataError,
    /// User declined
    PolicyRejection,
    /// Transport or framing fault
    TransportFailure,
}

impl Error {
    /// Classify an error
    pub fn kind(&self) -> ErrorKind {
        use Error::*;

        match self {
            UnexpectedEvent | TransactionChanged | InvalidLength | InvalidState | Unknown => {
                ErrorKind::ProtocolViolation
            }
            InvalidCoin | UnsupportedScriptType | InvalidPath | MultisigKeyNotFound
            | InvalidMultisig | InvalidAmount | PrevTxMismatch | NotEnoughFunds
            | ValueOverflow | InvalidCount | InvalidOutput | InvalidMeta | InvalidSighash
            | InvalidPrevIndex | SignError => ErrorKind::DataError,
            UserRejected | FeeRejected | Cancelled => ErrorKind::PolicyRejection,
            Transport | Malformed => ErrorKind::TransportFailure,
        }
    }
}

impl From<ApduError> for Error {
    fn from(_e: ApduError) -> Self {
        Error::Malformed
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_kinds() {
        assert_eq!(Error::TransactionChanged.kind(), ErrorKind::ProtocolViolation);
        assert_eq!(Error::MultisigKeyNotFound.kind(), ErrorKind::DataError);
        assert_eq!(Error::NotEnoughFunds.kind(), ErrorKind::DataError);
        assert_eq!(Error::UserRejected.kind(), ErrorKind::PolicyRejection);
        assert_eq!(Error::Malformed.kind(), ErrorKind::TransportFailure);
        assert_eq!(Error::from(ApduError::InvalidLength), Error::Malformed);
    }

    #[test]
    fn stable_codes() {
        assert_eq!(Error::InvalidLength as u8, 0x00);
        assert_eq!(Error::UserRejected as u8, 0x20);
        assert_eq!(Error::Unknown as u8, 0xf0);
    }
}

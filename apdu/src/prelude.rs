// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Prelude to simplify downstream use of APDU objects
//!

pub use crate::{
    state::{Digest, TxState},
    tx::{
        InputDescriptor, MultisigDescriptor, OutputDescriptor, OutputTarget, PrevExtraData,
        PrevInput, PrevOutput, PrevTxMeta, RequestType, ScriptType, TransactionMeta, TxAbort,
        TxInfo, TxInfoReq, TxRequest,
    },
    DerivationPath, PublicKey, Script, Signature, HARDENED,
};

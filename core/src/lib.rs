// Copyright (c) 2022-2023 The MobileCoin Foundation

//! UTXO hardware wallet signing core
//!
//! This provides a common [Engine][engine] supporting streamed signing of
//! Bitcoin-family transactions for execution on hardware wallets.
//!
//! Interactions with the [Engine][engine] are performed via [Event][engine::Event]s and
//! [Output][engine::Output]s, see [ledger_utxo_apdu] for APDU objects and wire encodings.
//!
//! ## Operations
//!
//! The device never holds the whole transaction. Signing is driven by the
//! engine, which responds to each host message with a
//! [`TxRequest`][ledger_utxo_apdu::tx::TxRequest] naming the next item required
//! along with any serialized transaction data produced in the meantime.
//!
//! 1. Issue [`TransactionMeta`][ledger_utxo_apdu::tx::TransactionMeta] to start a signing session
//! 2. Answer each request with the matching acknowledgement
//!     - Inputs via [`InputDescriptor`][ledger_utxo_apdu::tx::InputDescriptor]
//!     - Outputs via [`OutputDescriptor`][ledger_utxo_apdu::tx::OutputDescriptor]
//!     - Prior transactions via [`PrevTxMeta`][ledger_utxo_apdu::tx::PrevTxMeta],
//!       [`PrevInput`][ledger_utxo_apdu::tx::PrevInput],
//!       [`PrevOutput`][ledger_utxo_apdu::tx::PrevOutput] and
//!       [`PrevExtraData`][ledger_utxo_apdu::tx::PrevExtraData]
//! 3. Once the engine reaches [`TxState::ConfirmOutput`][ledger_utxo_apdu::state::TxState::ConfirmOutput]
//!    or [`TxState::Pending`][ledger_utxo_apdu::state::TxState::Pending]
//!    poll with [`TxInfoReq`][ledger_utxo_apdu::tx::TxInfoReq] until the user approves, at which
//!    point the outstanding request is returned
//! 4. Concatenate the serialized chunks returned with each request until a
//!    [`RequestType::Finished`][ledger_utxo_apdu::tx::RequestType::Finished] request is received
//!
//! Inputs and outputs are requested once to compute totals, once more to build
//! segwit midstates where required, then again to serialize and sign. Any change
//! between passes aborts the session.
//!
//! Each state-mutating message updates a [`TxDigest`][engine::TxDigest] reported with
//! [`TxInfo`][ledger_utxo_apdu::tx::TxInfo], which the host should track to detect
//! desynchronisation.
//!
//! See [signer::sign_tx] for a complete / reference driver.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub use ledger_utxo_apdu::{self as apdu};

pub mod engine;

pub mod coins;

pub mod helpers;

pub mod matchcheck;

pub mod multisig;

pub mod scripts;

pub mod sighash;

pub mod signer;

pub mod weight;

pub mod writers;

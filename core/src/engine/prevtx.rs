// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Prior transaction verification, streaming a previous transaction
//! through a hasher to prove the amount of a legacy input.

use sha2::{Digest, Sha256};
use strum::{Display, EnumIter, EnumString, EnumVariantNames};

use ledger_utxo_apdu::{prelude::*, MAX_EXTRA_DATA_CHUNK};

use super::{Error, Event};
use crate::{
    coins::CoinInfo,
    writers::{get_tx_hash, write_tx_footer, write_tx_header, write_tx_input, write_tx_output, Writer},
};

/// Prior transaction streaming states
#[derive(Copy, Clone, PartialEq, Debug, EnumString, Display, EnumVariantNames, EnumIter)]
pub enum PrevTxState {
    /// Awaiting prior transaction metadata
    Meta,
    /// Awaiting prior input N
    Input(u32),
    /// Awaiting prior output N
    Output(u32),
    /// Awaiting extra data from offset N
    ExtraData(u32),
    /// Hash and amount verified
    Complete,
}

impl Default for PrevTxState {
    fn default() -> Self {
        Self::Meta
    }
}

/// Prior transaction metadata retained while streaming
#[derive(Copy, Clone, PartialEq, Debug)]
struct PrevCounts {
    inputs_count: u32,
    outputs_count: u32,
    extra_data_len: u32,
    lock_time: u32,
    expiry: Option<u32>,
    overwintered: bool,
    /// Coin hashes transactions with double SHA-256
    double: bool,
}

/// Prior transaction verifier for a single input
pub struct PrevTxVerifier {
    state: PrevTxState,

    /// Expected prior transaction hash (display order)
    prev_hash: [u8; 32],
    /// Output spent by the input
    prev_index: u32,
    /// Amount declared by the input
    amount: u64,

    h: Sha256,
    counts: Option<PrevCounts>,

    /// Amount of the output at `prev_index`, once streamed
    found: Option<u64>,
}

impl PrevTxVerifier {
    /// Create a verifier for the provided input
    pub fn new(i: &InputDescriptor) -> Self {
        Self {
            state: PrevTxState::Meta,
            prev_hash: i.prev_hash,
            prev_index: i.prev_index,
            amount: i.amount,
            h: Sha256::new(),
            counts: None,
            found: None,
        }
    }

    /// Fetch verifier state
    pub fn state(&self) -> PrevTxState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == PrevTxState::Complete
    }

    /// Build the host request for the current state
    pub fn request(&self) -> Option<TxRequest> {
        let r = match self.state {
            PrevTxState::Meta => TxRequest::prev(RequestType::Meta, 0, self.prev_hash),
            PrevTxState::Input(n) => TxRequest::prev(RequestType::Input, n, self.prev_hash),
            PrevTxState::Output(n) => TxRequest::prev(RequestType::Output, n, self.prev_hash),
            PrevTxState::ExtraData(offset) => {
                TxRequest::extra_data(self.prev_hash, offset, self.chunk_len(offset))
            }
            PrevTxState::Complete => return None,
        };

        Some(r)
    }

    /// Length of the extra data chunk requested at `offset`
    fn chunk_len(&self, offset: u32) -> u32 {
        let total = self.counts.map(|c| c.extra_data_len).unwrap_or(0);
        total
            .saturating_sub(offset)
            .min(MAX_EXTRA_DATA_CHUNK as u32)
    }

    /// Apply a prior transaction event, returning the updated state
    pub fn update(&mut self, coin: &CoinInfo, evt: &Event) -> Result<PrevTxState, Error> {
        self.state = match (self.state, evt) {
            (PrevTxState::Meta, Event::PrevMeta(m)) => self.meta(coin, m)?,
            (PrevTxState::Input(n), Event::PrevInput(i)) => self.input(n, i)?,
            (PrevTxState::Output(n), Event::PrevOutput(o)) => self.output(n, o)?,
            (PrevTxState::ExtraData(offset), Event::PrevExtraData(e)) => {
                self.extra_data(offset, e)?
            }
            _e => {
                #[cfg(feature = "log")]
                log::error!("Unexpected event in prev tx state {:?}: {:02x?}", self.state, _e);

                return Err(Error::UnexpectedEvent);
            }
        };

        Ok(self.state)
    }

    fn meta(&mut self, coin: &CoinInfo, m: &PrevTxMeta) -> Result<PrevTxState, Error> {
        if m.inputs_count == 0 {
            return Err(Error::InvalidMeta);
        }
        if self.prev_index >= m.outputs_count {
            #[cfg(feature = "log")]
            log::error!(
                "prev_index {} exceeds prior outputs ({})",
                self.prev_index,
                m.outputs_count
            );

            return Err(Error::InvalidPrevIndex);
        }
        if m.extra_data_len > 0 && !coin.extra_data {
            return Err(Error::InvalidMeta);
        }
        if m.overwintered && !coin.overwintered {
            return Err(Error::InvalidMeta);
        }
        if m.timestamp.is_some() != coin.timestamp {
            return Err(Error::InvalidMeta);
        }

        write_tx_header(
            &mut self.h,
            m.version,
            m.overwintered,
            m.version_group_id,
            m.timestamp,
        );
        self.h.write_varint(m.inputs_count as u64);

        self.counts = Some(PrevCounts {
            inputs_count: m.inputs_count,
            outputs_count: m.outputs_count,
            extra_data_len: m.extra_data_len,
            lock_time: m.lock_time,
            expiry: m.expiry,
            overwintered: m.overwintered,
            double: coin.sign_hash_double,
        });

        Ok(PrevTxState::Input(0))
    }

    fn input(&mut self, n: u32, i: &PrevInput) -> Result<PrevTxState, Error> {
        let c = self.counts.ok_or(Error::InvalidState)?;

        write_tx_input(&mut self.h, &i.prev_hash, i.prev_index, &i.script_sig, i.sequence);

        if n + 1 < c.inputs_count {
            return Ok(PrevTxState::Input(n + 1));
        }

        self.h.write_varint(c.outputs_count as u64);

        Ok(PrevTxState::Output(0))
    }

    fn output(&mut self, n: u32, o: &PrevOutput) -> Result<PrevTxState, Error> {
        let c = self.counts.ok_or(Error::InvalidState)?;

        write_tx_output(&mut self.h, o.amount, &o.script_pubkey);

        if n == self.prev_index {
            self.found = Some(o.amount);
        }

        if n + 1 < c.outputs_count {
            return Ok(PrevTxState::Output(n + 1));
        }

        write_tx_footer(&mut self.h, c.lock_time, false, None);
        if c.overwintered {
            self.h.write_u32(c.expiry.unwrap_or(0));
        }

        match c.extra_data_len {
            0 => self.finish(),
            _ => Ok(PrevTxState::ExtraData(0)),
        }
    }

    fn extra_data(&mut self, offset: u32, e: &PrevExtraData) -> Result<PrevTxState, Error> {
        let c = self.counts.ok_or(Error::InvalidState)?;

        let expected = self.chunk_len(offset);
        if e.chunk.len() != expected as usize {
            #[cfg(feature = "log")]
            log::error!("extra data chunk length {} (expected {})", e.chunk.len(), expected);

            return Err(Error::InvalidLength);
        }

        self.h.write_bytes(&e.chunk);

        let offset = offset + expected;
        match offset < c.extra_data_len {
            true => Ok(PrevTxState::ExtraData(offset)),
            false => self.finish(),
        }
    }

    /// Check the prior transaction hash and spent amount
    fn finish(&mut self) -> Result<PrevTxState, Error> {
        let c = self.counts.ok_or(Error::InvalidState)?;

        let h = core::mem::take(&mut self.h);
        let tx_hash = get_tx_hash(h, c.double, true);

        if tx_hash != self.prev_hash {
            #[cfg(feature = "log")]
            log::error!("prior transaction hash mismatch: {:02x?}", tx_hash);

            return Err(Error::PrevTxMismatch);
        }

        if self.found != Some(self.amount) {
            #[cfg(feature = "log")]
            log::error!(
                "input amount {} does not match prior output {:?}",
                self.amount,
                self.found
            );

            return Err(Error::InvalidAmount);
        }

        Ok(PrevTxState::Complete)
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

use encdec::Encode;

use ledger_proto::ApduError;

use super::{SignStep, State, TxDigest};
use crate::apdu::{
    self,
    tx::{RequestType, TxRequest},
};

/// [`Engine`][super::Engine] outputs (in response to events), typically encoded to response [APDUs][crate::apdu]
#[derive(Clone, PartialEq, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Output {
    None,

    /// Engine state
    State { state: State, digest: TxDigest },

    /// Request for the next transaction item, carrying any
    /// serialized data and signature produced since the last request
    Request(TxRequest),
}

impl Output {
    /// Encode an [`Output`] object to a response [APDU]
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        match self {
            Output::None => Ok(0),
            Output::State { state, digest } => apdu::tx::TxInfo {
                state: state.state(),
                value: state.value(),
                reserved: 0,
                digest: digest.clone(),
            }
            .encode(buff),
            Output::Request(r) => r.encode(buff),
        }
    }

    /// Fetch state for outputs containing this
    pub fn state(&self) -> Option<State> {
        match &self {
            Output::State { state, .. } => Some(*state),
            _ => None,
        }
    }

    /// Fetch digest for outputs containing this
    pub fn digest(&self) -> Option<&TxDigest> {
        match &self {
            Output::State { digest, .. } => Some(digest),
            _ => None,
        }
    }

    /// Fetch request for outputs containing this
    pub fn request(&self) -> Option<&TxRequest> {
        match &self {
            Output::Request(r) => Some(r),
            _ => None,
        }
    }

    /// Check whether this output completes the session
    pub fn is_finished(&self) -> bool {
        matches!(self, Output::Request(r) if r.request_type == RequestType::Finished)
    }
}

impl PartialEq<State> for Output {
    fn eq(&self, other: &State) -> bool {
        match self {
            Output::State { state, .. } => state == other,
            _ => false,
        }
    }
}

impl State {
    /// Map [engine](crate::engine) states to [apdu][apdu::state::TxState] states for transmission
    pub fn state(&self) -> apdu::state::TxState {
        use crate::apdu::state::TxState;

        match self {
            State::Init => TxState::Init,
            State::ComputeTotals(_) => TxState::ComputeTotals,
            State::ConfirmOutput(_) => TxState::ConfirmOutput,
            State::ComputeMidstate(_) => TxState::ComputeMidstate,
            State::Pending => TxState::Pending,
            State::SignInputs(_) => TxState::SignInputs,
            State::Finished => TxState::Finished,
            State::Aborted(_) => TxState::Aborted,
        }
    }

    /// Value reported with the state, the item index while streaming
    /// (saturating at `u16::MAX`) or the error code once aborted
    pub fn value(&self) -> u16 {
        let n = match self {
            State::ComputeTotals(s) | State::ComputeMidstate(s) => s.index(),
            State::ConfirmOutput(n) => *n,
            State::SignInputs(s) => match s {
                SignStep::Verify(n)
                | SignStep::PrevTx(n)
                | SignStep::Input(n)
                | SignStep::Output(n)
                | SignStep::Witness(n) => *n,
                SignStep::Legacy { sign, .. } => *sign,
            },
            State::Aborted(e) => return *e as u16,
            _ => 0,
        };

        u16::try_from(n).unwrap_or(u16::MAX)
    }
}

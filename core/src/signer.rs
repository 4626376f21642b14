// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Reference signing driver, executing a complete signing session
//! against an [Engine] with a host providing transaction data and an
//! [Approver] standing in for user confirmation.

use crate::{
    apdu::tx::{RequestType, TransactionMeta, TxRequest},
    coins::CoinInfo,
    engine::{Driver, Engine, Error, Event, Output, Report, ReportOutput, State},
};

/// Host interface, answering engine requests with transaction data
pub trait Host {
    type Error: core::fmt::Debug;

    /// Fetch the item named by the request, appending any serialized
    /// data and signature carried with it
    fn request(&mut self, req: &TxRequest) -> Result<Event, Self::Error>;

    /// Accept the final serialized chunk
    fn finish(&mut self, req: &TxRequest) -> Result<(), Self::Error>;
}

/// User confirmation interface
pub trait Approver {
    /// Confirm an output leaving the wallet, called as each is streamed
    fn confirm_output(&mut self, coin: &CoinInfo, output: &ReportOutput) -> bool;

    /// Confirm transaction totals and fee once all outputs are known
    fn confirm_totals(&mut self, coin: &CoinInfo, report: &Report) -> bool;
}

/// Execute a signing session for the provided transaction, returning once
/// the final chunk has been passed to the host
pub fn sign_tx<DRV, H, A>(
    engine: &mut Engine<DRV>,
    meta: &TransactionMeta,
    host: &mut H,
    approver: &mut A,
) -> Result<(), Error>
where
    DRV: Driver,
    H: Host,
    A: Approver,
{
    let mut evt = Event::SignTx(meta.clone());

    loop {
        let req = match engine.update(&evt)? {
            Output::Request(r) => r,
            Output::State {
                state: state @ (State::ConfirmOutput(_) | State::Pending),
                ..
            } => {
                let approved = match (state, engine.coin(), engine.report()) {
                    (State::ConfirmOutput(_), Some(c), Some(r)) => match &r.current {
                        Some(o) => approver.confirm_output(c, o),
                        None => false,
                    },
                    (_, Some(c), Some(r)) => approver.confirm_totals(c, r),
                    _ => false,
                };

                match approved {
                    true => engine.approve(),
                    false => engine.deny(),
                }

                match engine.state() {
                    State::Aborted(e) => return Err(e),
                    _ => {
                        evt = Event::TxGetInfo;
                        continue;
                    }
                }
            }
            Output::State {
                state: State::Aborted(e),
                ..
            } => return Err(e),
            _o => {
                #[cfg(feature = "log")]
                log::error!("unexpected engine output: {:?}", _o);

                return Err(Error::InvalidState);
            }
        };

        if req.request_type == RequestType::Finished {
            return host.finish(&req).map_err(|_e| {
                #[cfg(feature = "log")]
                log::error!("host finish failed: {:?}", _e);

                Error::Transport
            });
        }

        evt = match host.request(&req) {
            Ok(e) => e,
            Err(_e) => {
                #[cfg(feature = "log")]
                log::error!("host request failed: {:?}", _e);

                engine.abort(Error::Transport);
                return Err(Error::Transport);
            }
        };
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! The [Engine] provides streamed UTXO transaction signing for hardware wallets.
//!
//! This handles [Event] inputs and returns [Output] responses to the caller,
//! see [apdu][crate::apdu] for APDU protocol / encoding specifications.
//!
//! A session proceeds through the following states:
//!
//! 1. [State::ComputeTotals], each input and output is requested once to
//!    compute totals, match change and estimate weight, pausing at
//!    [State::ConfirmOutput] for each output leaving the wallet
//! 2. [State::ComputeMidstate], inputs and outputs are requested again to
//!    build BIP143 / ZIP143 midstates where required
//! 3. [State::Pending], awaiting confirmation of totals and fee via [Engine::approve] or [Engine::deny]
//! 4. [State::SignInputs], prior transactions are verified for legacy inputs, then
//!    the transaction is re-streamed to be signed and serialized
//! 5. [State::Finished] or [State::Aborted]
//!
//! Each pass is digested and compared against the first so any change to the
//! transaction between passes aborts the session.

use sha2::Digest as _;
use strum::{Display, EnumIter, EnumString, EnumVariantNames};
use zeroize::{Zeroize, ZeroizeOnDrop};

use ledger_utxo_apdu::{
    digest::{digest_sign_tx, digest_tx_input, digest_tx_output},
    prelude::*,
};

use crate::{
    coins::{self, CoinInfo},
    sighash::{derive_script_code, input_hash_type, Hash143, LegacyHasher},
    scripts::{witness_multisig, witness_p2wpkh},
    writers::{write_tx_footer, write_tx_header, write_tx_input, write_tx_output, Writer},
};

mod event;
pub use event::Event;

pub use ledger_utxo_apdu::state::Digest as TxDigest;

mod output;
pub use output::Output;

mod error;
pub use error::{Error, ErrorKind};

mod prevtx;
pub use prevtx::{PrevTxState, PrevTxVerifier};

mod session;
use session::{
    derive_pubkey, legacy_script_sig, output_script, sanitize_input, sanitize_meta,
    sanitize_output, segwit_script_sig, signing_index, SignKind, SigningSession,
};

mod summary;
pub use summary::{Report, ReportOutput, ReportTarget};

/// Position within an input / output pass
#[derive(Copy, Clone, PartialEq, Debug, EnumString, Display, EnumVariantNames, EnumIter)]
pub enum Step {
    Input(u32),
    Output(u32),
}

impl Default for Step {
    fn default() -> Self {
        Self::Input(0)
    }
}

impl Step {
    /// Index of the item within the pass
    pub fn index(&self) -> u32 {
        match self {
            Step::Input(n) | Step::Output(n) => *n,
        }
    }
}

/// Signing phase states
#[derive(Copy, Clone, PartialEq, Debug, EnumString, Display, EnumVariantNames, EnumIter)]
pub enum SignStep {
    /// Re-checking input N ahead of prior transaction verification
    Verify(u32),
    /// Streaming the prior transaction for input N
    PrevTx(u32),
    /// Serializing input N
    Input(u32),
    /// Legacy digest pass for input `sign`
    Legacy { sign: u32, step: Step },
    /// Serializing output N
    Output(u32),
    /// Serializing witness N
    Witness(u32),
}

impl Default for SignStep {
    fn default() -> Self {
        Self::Input(0)
    }
}

/// Engine internal state enumeration
#[derive(Copy, Clone, PartialEq, Debug, EnumString, Display, EnumVariantNames, EnumIter)]
pub enum State {
    /// Idle state, no transaction running
    Init,
    /// First pass, accumulating totals
    ComputeTotals(Step),
    /// First pass paused, awaiting user confirmation of output N
    ConfirmOutput(u32),
    /// Second pass, building midstates
    ComputeMidstate(Step),
    /// Transaction pending user approval
    Pending,
    /// Verifying, signing and serializing
    SignInputs(SignStep),
    /// Transaction complete
    Finished,
    /// Transaction aborted
    Aborted(Error),
}

impl State {
    /// Check whether a signing session is running in this state
    pub fn is_active(&self) -> bool {
        !matches!(self, State::Init | State::Finished | State::Aborted(_))
    }
}

/// Derived BIP32 node, cleared on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Node {
    /// Compressed secp256k1 public key
    pub public_key: PublicKey,
    pub chain_code: [u8; 32],
    pub private_key: [u8; 32],
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// [`Driver`] trait provides platform support for [`Engine`] instances
pub trait Driver {
    /// BIP32 secp256k1 derivation
    fn derive_node(&self, path: &[u32]) -> Result<Node, Error>;

    /// Sign a digest with the provided node, returning a DER encoded signature
    fn sign(&self, node: &Node, digest: &[u8; 32]) -> Result<Signature, Error>;

    /// Resolve coin parameters by name
    fn coin_by_name(&self, name: &str) -> Option<CoinInfo> {
        coins::by_name(name).cloned()
    }
}

impl<T: Driver> Driver for &mut T {
    fn derive_node(&self, path: &[u32]) -> Result<Node, Error> {
        T::derive_node(self, path)
    }

    fn sign(&self, node: &Node, digest: &[u8; 32]) -> Result<Signature, Error> {
        T::sign(self, node, digest)
    }

    fn coin_by_name(&self, name: &str) -> Option<CoinInfo> {
        T::coin_by_name(self, name)
    }
}

/// [Engine] provides hardware-independent support for UTXO transaction signing
pub struct Engine<DRV: Driver> {
    state: State,

    digest: TxDigest,

    session: Option<SigningSession>,

    /// Outstanding request, returned on [Event::TxGetInfo]
    request: Option<TxRequest>,

    drv: DRV,
}

impl<DRV: Driver> Engine<DRV> {
    /// Create a new transaction engine instance with the provided driver
    pub const fn new(drv: DRV) -> Self {
        Self {
            state: State::Init,
            digest: TxDigest::new(),
            session: None,
            request: None,
            drv,
        }
    }

    /// Handle incoming transaction events
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn update(&mut self, evt: &Event) -> Result<Output, Error> {
        #[cfg(feature = "log")]
        log::debug!("event: {:02x?}", evt);

        // Update state digest (only applied for mutating events)
        if let Some(h) = evt.hash() {
            self.digest.update(&h);
        }

        match self.handle(evt) {
            Ok(r) => Ok(r),
            Err(e) => {
                // Any failure within a running session is terminal
                if self.session.is_some() {
                    self.abort(e);
                }
                Err(e)
            }
        }
    }

    fn handle(&mut self, evt: &Event) -> Result<Output, Error> {
        match (self.state, evt) {
            // Empty event, do nothing
            (_, Event::None) => (),

            // Fetch outstanding request or transaction state
            (_, Event::TxGetInfo) => {
                if let Some(r) = &self.request {
                    return Ok(Output::Request(r.clone()));
                }
            }

            // Start a signing session
            (State::Init | State::Finished | State::Aborted(_), Event::SignTx(meta)) => {
                return self.sign_init(meta);
            }

            // Cancel any running session
            (_, Event::TxAbort) => {
                if self.session.is_some() {
                    self.abort(Error::Cancelled);
                }
            }

            (State::ComputeTotals(Step::Input(n)), Event::TxInput(i)) => {
                return self.totals_input(n, i);
            }
            (State::ComputeTotals(Step::Output(n)), Event::TxOutput(o)) => {
                return self.totals_output(n, o);
            }

            (State::ComputeMidstate(Step::Input(n)), Event::TxInput(i)) => {
                return self.midstate_input(n, i);
            }
            (State::ComputeMidstate(Step::Output(n)), Event::TxOutput(o)) => {
                return self.midstate_output(n, o);
            }

            (State::SignInputs(s), _) => return self.sign_update(s, evt),

            // Handle unexpected events
            _e => {
                #[cfg(feature = "log")]
                log::error!("Unexpected event in state {:?}: {:02x?}", self.state, _e);

                return Err(Error::UnexpectedEvent);
            }
        }

        // Default to returning updated state
        Ok(Output::State {
            state: self.state,
            digest: self.digest.clone(),
        })
    }

    /// Fetch current engine state
    pub fn state(&self) -> State {
        self.state
    }

    /// Fetch current session digest
    pub fn digest(&self) -> &TxDigest {
        &self.digest
    }

    /// Fetch coin parameters for the running session
    pub fn coin(&self) -> Option<&CoinInfo> {
        self.session.as_ref().map(|s| &s.coin)
    }

    /// Return confirmation report while awaiting approval
    pub fn report(&self) -> Option<&Report> {
        match self.state {
            State::ConfirmOutput(_) | State::Pending => self.session.as_ref().map(|s| &s.report),
            _ => None,
        }
    }

    /// Approve the output or transaction awaiting confirmation
    pub fn approve(&mut self) {
        if let State::ConfirmOutput(n) = self.state {
            return self.approve_output(n);
        }

        let s = match (self.state, self.session.as_mut()) {
            (State::Pending, Some(s)) => s,
            _ => return,
        };

        #[cfg(feature = "log")]
        log::info!("transaction approved");

        s.check = Default::default();

        let step = match s.needs_prev_verify {
            true => SignStep::Verify(0),
            false => SignStep::Input(0),
        };

        self.set_request(State::SignInputs(step), TxRequest::new(RequestType::Input, 0));
    }

    /// Deny the output or transaction awaiting confirmation
    pub fn deny(&mut self) {
        let e = match (self.state, self.session.as_ref()) {
            (State::Pending, Some(s)) if s.report.high_fee => Error::FeeRejected,
            (State::Pending | State::ConfirmOutput(_), Some(_)) => Error::UserRejected,
            _ => return,
        };

        self.abort(e);
    }

    /// Abort any running session with the provided error
    pub fn abort(&mut self, e: Error) {
        #[cfg(feature = "log")]
        log::warn!("aborting session in state {}: {:?}", self.state, e);

        self.session = None;
        self.request = None;
        self.state = State::Aborted(e);
    }

    /// Reset engine state
    pub fn reset(&mut self) {
        self.session = None;
        self.request = None;
        self.state = State::Init;
    }

    /// Fetch progress (0..=100) for non-interactive states
    pub fn progress(&self) -> Option<usize> {
        let s = self.session.as_ref()?;

        let inputs = s.tx.inputs_count as usize;
        let outputs = s.tx.outputs_count as usize;
        let step_pos = |step: Step| match step {
            Step::Input(n) => n as usize,
            Step::Output(n) => inputs + n as usize,
        };

        let (base, span, pos, total) = match self.state {
            State::ComputeTotals(step) => (0, 30, step_pos(step), inputs + outputs),
            State::ConfirmOutput(n) => (0, 30, step_pos(Step::Output(n)), inputs + outputs),
            State::ComputeMidstate(step) => (30, 20, step_pos(step), inputs + outputs),
            State::SignInputs(step) => {
                let witnesses = match s.any_segwit {
                    true => inputs,
                    false => 0,
                };
                let pos = match step {
                    SignStep::Verify(_) | SignStep::PrevTx(_) => 0,
                    SignStep::Input(n) | SignStep::Legacy { sign: n, .. } => n as usize,
                    SignStep::Output(n) => inputs + n as usize,
                    SignStep::Witness(n) => inputs + outputs + n as usize,
                };
                (50, 50, pos, inputs + outputs + witnesses)
            }
            _ => return None,
        };

        Some((base + span * pos / total.max(1)).min(100))
    }

    /// Set the next state and outstanding request, attaching
    /// serialized data and signatures produced in the meantime
    fn set_request(&mut self, state: State, mut req: TxRequest) -> Output {
        if let Some(s) = self.session.as_mut() {
            req.serialized_tx = s.serialized.take();
            req.signature = s.signature.take();
        }

        self.state = state;
        self.request = Some(req.clone());

        Output::Request(req)
    }

    /// Issue the next request, failing where serialized data has overflowed
    fn next(&mut self, state: State, req: TxRequest) -> Result<Output, Error> {
        if let Some(s) = self.session.as_ref() {
            if s.serialized.overflowed() {
                #[cfg(feature = "log")]
                log::error!("serialized chunk overflow");

                return Err(Error::InvalidLength);
            }
        }

        Ok(self.set_request(state, req))
    }

    fn session(&mut self) -> Result<&mut SigningSession, Error> {
        self.session.as_mut().ok_or(Error::InvalidState)
    }

    #[cfg_attr(feature = "noinline", inline(never))]
    fn sign_init(&mut self, meta: &TransactionMeta) -> Result<Output, Error> {
        let coin = match self.drv.coin_by_name(&meta.coin_name) {
            Some(c) => c,
            None => {
                #[cfg(feature = "log")]
                log::error!("unknown coin: {}", meta.coin_name);

                return Err(Error::InvalidCoin);
            }
        };

        let tx = sanitize_meta(&coin, meta)?;

        #[cfg(feature = "log")]
        log::info!(
            "start {} session: {} inputs, {} outputs",
            coin.coin_name,
            tx.inputs_count,
            tx.outputs_count
        );

        self.digest = TxDigest::from_seed(&digest_sign_tx(meta));
        self.session = Some(SigningSession::new(coin, tx));
        self.request = None;

        self.next(
            State::ComputeTotals(Step::Input(0)),
            TxRequest::new(RequestType::Input, 0),
        )
    }

    #[cfg_attr(feature = "noinline", inline(never))]
    fn totals_input(&mut self, n: u32, i: &InputDescriptor) -> Result<Output, Error> {
        let s = self.session.as_mut().ok_or(Error::InvalidState)?;

        sanitize_input(&s.coin, i)?;

        // Multisig inputs must contain our key
        let pubkey = derive_pubkey(&self.drv, &i.address_n)?;
        signing_index(i, &pubkey)?;

        s.add_input(i)?;
        s.check.write_bytes(&digest_tx_input(i));

        if n + 1 < s.tx.inputs_count {
            return self.next(
                State::ComputeTotals(Step::Input(n + 1)),
                TxRequest::new(RequestType::Input, n + 1),
            );
        }

        s.inputs_digest = s.take_check();

        self.next(
            State::ComputeTotals(Step::Output(0)),
            TxRequest::new(RequestType::Output, 0),
        )
    }

    #[cfg_attr(feature = "noinline", inline(never))]
    fn totals_output(&mut self, n: u32, o: &OutputDescriptor) -> Result<Output, Error> {
        let s = self.session.as_mut().ok_or(Error::InvalidState)?;

        sanitize_output(&s.coin, o)?;
        let script = output_script(&self.drv, o)?;

        let confirm = s.add_output(n, o, &script)?;
        s.check.write_bytes(&digest_tx_output(o));

        if confirm {
            #[cfg(feature = "log")]
            log::info!("awaiting confirmation of output {}", n);

            self.state = State::ConfirmOutput(n);
            self.request = None;

            return Ok(Output::State {
                state: self.state,
                digest: self.digest.clone(),
            });
        }

        self.totals_next(n)
    }

    /// Resume the first pass once output `n` is confirmed
    fn approve_output(&mut self, n: u32) {
        if let Some(s) = self.session.as_mut() {
            s.report.confirm_output();
        }

        #[cfg(feature = "log")]
        log::info!("output {} approved", n);

        if let Err(e) = self.totals_next(n) {
            self.abort(e);
        }
    }

    /// Advance the first pass following output `n`
    fn totals_next(&mut self, n: u32) -> Result<Output, Error> {
        let s = self.session()?;

        if n + 1 < s.tx.outputs_count {
            return self.next(
                State::ComputeTotals(Step::Output(n + 1)),
                TxRequest::new(RequestType::Output, n + 1),
            );
        }

        s.outputs_digest = s.take_check();
        s.complete_totals()?;

        match s.needs_midstate() {
            true => self.next(
                State::ComputeMidstate(Step::Input(0)),
                TxRequest::new(RequestType::Input, 0),
            ),
            false => Ok(self.pending()),
        }
    }

    #[cfg_attr(feature = "noinline", inline(never))]
    fn midstate_input(&mut self, n: u32, i: &InputDescriptor) -> Result<Output, Error> {
        let s = self.session()?;

        s.wallet_path.check_input(i)?;
        s.multisig_fp.check_input(i)?;

        s.hash143.add_prevout(i);
        s.hash143.add_sequence(i);
        s.check.write_bytes(&digest_tx_input(i));

        if n + 1 < s.tx.inputs_count {
            return self.next(
                State::ComputeMidstate(Step::Input(n + 1)),
                TxRequest::new(RequestType::Input, n + 1),
            );
        }

        s.check_inputs()?;

        self.next(
            State::ComputeMidstate(Step::Output(0)),
            TxRequest::new(RequestType::Output, 0),
        )
    }

    #[cfg_attr(feature = "noinline", inline(never))]
    fn midstate_output(&mut self, n: u32, o: &OutputDescriptor) -> Result<Output, Error> {
        let s = self.session.as_mut().ok_or(Error::InvalidState)?;

        let script = output_script(&self.drv, o)?;
        s.hash143.add_output(o.amount, &script);
        s.check.write_bytes(&digest_tx_output(o));

        if n + 1 < s.tx.outputs_count {
            return self.next(
                State::ComputeMidstate(Step::Output(n + 1)),
                TxRequest::new(RequestType::Output, n + 1),
            );
        }

        s.check_outputs()?;

        Ok(self.pending())
    }

    /// Move to [State::Pending] to await user confirmation
    fn pending(&mut self) -> Output {
        #[cfg(feature = "log")]
        log::info!("awaiting user confirmation");

        self.state = State::Pending;
        self.request = None;

        Output::State {
            state: self.state,
            digest: self.digest.clone(),
        }
    }

    /// Handle events in the signing phase
    fn sign_update(&mut self, step: SignStep, evt: &Event) -> Result<Output, Error> {
        match (step, evt) {
            (SignStep::Verify(n), Event::TxInput(i)) => self.verify_input(n, i),
            (
                SignStep::PrevTx(n),
                Event::PrevMeta(_)
                | Event::PrevInput(_)
                | Event::PrevOutput(_)
                | Event::PrevExtraData(_),
            ) => self.verify_prev_tx(n, evt),
            (SignStep::Input(n), Event::TxInput(i)) => self.sign_input(n, i),
            (
                SignStep::Legacy {
                    sign,
                    step: Step::Input(n),
                },
                Event::TxInput(i),
            ) => self.legacy_input(sign, n, i),
            (
                SignStep::Legacy {
                    sign,
                    step: Step::Output(n),
                },
                Event::TxOutput(o),
            ) => self.legacy_output(sign, n, o),
            (SignStep::Output(n), Event::TxOutput(o)) => self.serialize_output(n, o),
            (SignStep::Witness(n), Event::TxInput(i)) => self.sign_witness(n, i),
            _e => {
                #[cfg(feature = "log")]
                log::error!("Unexpected event in state {:?}: {:02x?}", self.state, _e);

                Err(Error::UnexpectedEvent)
            }
        }
    }

    #[cfg_attr(feature = "noinline", inline(never))]
    fn verify_input(&mut self, n: u32, i: &InputDescriptor) -> Result<Output, Error> {
        let s = self.session()?;

        s.wallet_path.check_input(i)?;
        s.multisig_fp.check_input(i)?;
        s.check.write_bytes(&digest_tx_input(i));

        if SignKind::of(&s.coin, i) != SignKind::Legacy {
            return self.verify_next(n);
        }

        let v = PrevTxVerifier::new(i);
        let req = v.request().ok_or(Error::InvalidState)?;
        s.prev = Some(v);

        self.next(State::SignInputs(SignStep::PrevTx(n)), req)
    }

    #[cfg_attr(feature = "noinline", inline(never))]
    fn verify_prev_tx(&mut self, n: u32, evt: &Event) -> Result<Output, Error> {
        let s = self.session()?;
        let v = s.prev.as_mut().ok_or(Error::InvalidState)?;

        v.update(&s.coin, evt)?;

        match v.request() {
            Some(req) => self.next(State::SignInputs(SignStep::PrevTx(n)), req),
            None => {
                #[cfg(feature = "log")]
                log::debug!("prior transaction verified for input {}", n);

                s.prev = None;
                self.verify_next(n)
            }
        }
    }

    /// Advance the verification pass following input `n`
    fn verify_next(&mut self, n: u32) -> Result<Output, Error> {
        let s = self.session()?;

        if n + 1 < s.tx.inputs_count {
            return self.next(
                State::SignInputs(SignStep::Verify(n + 1)),
                TxRequest::new(RequestType::Input, n + 1),
            );
        }

        s.check_inputs()?;

        self.next(
            State::SignInputs(SignStep::Input(0)),
            TxRequest::new(RequestType::Input, 0),
        )
    }

    #[cfg_attr(feature = "noinline", inline(never))]
    fn sign_input(&mut self, n: u32, i: &InputDescriptor) -> Result<Output, Error> {
        let s = self.session.as_mut().ok_or(Error::InvalidState)?;

        s.wallet_path.check_input(i)?;
        s.multisig_fp.check_input(i)?;
        s.check.write_bytes(&digest_tx_input(i));

        if n == 0 {
            write_tx_header(
                &mut s.serialized,
                s.tx.version,
                s.coin.overwintered,
                s.tx.version_group_id,
                s.tx.timestamp,
            );
            if s.any_segwit {
                // Segwit marker and flag
                s.serialized.write_bytes(&[0x00, 0x01]);
            }
            s.serialized.write_varint(s.tx.inputs_count as u64);
        }

        match SignKind::of(&s.coin, i) {
            SignKind::Segwit => {
                let pubkey = derive_pubkey(&self.drv, &i.address_n)?;
                let script_sig = segwit_script_sig(i, &pubkey)?;

                write_tx_input(&mut s.serialized, &i.prev_hash, i.prev_index, &script_sig, i.sequence);
            }
            SignKind::Bip143Legacy => {
                let node = self.drv.derive_node(&i.address_n)?;
                let index = signing_index(i, &node.public_key)?;

                s.consume_authorized(i.amount)?;

                let hash_type = input_hash_type(&s.coin, i)?;
                let script_code = derive_script_code(i, &node.public_key)?;
                let digest = s.hash143.preimage_hash(&s.coin, &s.tx, i, &script_code, hash_type);

                let sig = self.drv.sign(&node, &digest)?;
                let script_sig =
                    legacy_script_sig(i, &sig, hash_type as u8, &node.public_key, index)?;

                write_tx_input(&mut s.serialized, &i.prev_hash, i.prev_index, &script_sig, i.sequence);
                s.signature = Some((n, sig));
            }
            SignKind::Legacy => {
                // Re-stream the transaction to compute the legacy digest
                s.current = Some(i.clone());
                s.legacy = Some(LegacyHasher::new(&s.coin, &s.tx));
                s.legacy_check = Default::default();

                return self.next(
                    State::SignInputs(SignStep::Legacy {
                        sign: n,
                        step: Step::Input(0),
                    }),
                    TxRequest::new(RequestType::Input, 0),
                );
            }
        }

        self.sign_input_next(n)
    }

    /// Advance the serialization pass following input `n`
    fn sign_input_next(&mut self, n: u32) -> Result<Output, Error> {
        let s = self.session()?;

        if n + 1 < s.tx.inputs_count {
            return self.next(
                State::SignInputs(SignStep::Input(n + 1)),
                TxRequest::new(RequestType::Input, n + 1),
            );
        }

        s.check_inputs()?;

        self.next(
            State::SignInputs(SignStep::Output(0)),
            TxRequest::new(RequestType::Output, 0),
        )
    }

    #[cfg_attr(feature = "noinline", inline(never))]
    fn legacy_input(&mut self, sign: u32, n: u32, i: &InputDescriptor) -> Result<Output, Error> {
        let s = self.session.as_mut().ok_or(Error::InvalidState)?;

        s.legacy_check.write_bytes(&digest_tx_input(i));

        let script_code = match n == sign {
            true => {
                if s.current.as_ref() != Some(i) {
                    #[cfg(feature = "log")]
                    log::error!("signed input {} changed", sign);

                    return Err(Error::TransactionChanged);
                }

                let pubkey = derive_pubkey(&self.drv, &i.address_n)?;
                derive_script_code(i, &pubkey)?
            }
            false => Script::new(),
        };

        let legacy = s.legacy.as_mut().ok_or(Error::InvalidState)?;
        legacy.add_input(&i.prev_hash, i.prev_index, &script_code, i.sequence);

        if n + 1 < s.tx.inputs_count {
            return self.next(
                State::SignInputs(SignStep::Legacy {
                    sign,
                    step: Step::Input(n + 1),
                }),
                TxRequest::new(RequestType::Input, n + 1),
            );
        }

        legacy.add_outputs_count(s.tx.outputs_count);

        let d: [u8; 32] = core::mem::take(&mut s.legacy_check).finalize().into();
        if d != s.inputs_digest {
            #[cfg(feature = "log")]
            log::error!("inputs changed during legacy digest");

            return Err(Error::TransactionChanged);
        }

        self.next(
            State::SignInputs(SignStep::Legacy {
                sign,
                step: Step::Output(0),
            }),
            TxRequest::new(RequestType::Output, 0),
        )
    }

    #[cfg_attr(feature = "noinline", inline(never))]
    fn legacy_output(&mut self, sign: u32, n: u32, o: &OutputDescriptor) -> Result<Output, Error> {
        let s = self.session.as_mut().ok_or(Error::InvalidState)?;

        let script = output_script(&self.drv, o)?;
        s.legacy_check.write_bytes(&digest_tx_output(o));

        let legacy = s.legacy.as_mut().ok_or(Error::InvalidState)?;
        legacy.add_output(o.amount, &script);

        if n + 1 < s.tx.outputs_count {
            return self.next(
                State::SignInputs(SignStep::Legacy {
                    sign,
                    step: Step::Output(n + 1),
                }),
                TxRequest::new(RequestType::Output, n + 1),
            );
        }

        let d: [u8; 32] = core::mem::take(&mut s.legacy_check).finalize().into();
        if d != s.outputs_digest {
            #[cfg(feature = "log")]
            log::error!("outputs changed during legacy digest");

            return Err(Error::TransactionChanged);
        }

        let i = s.current.take().ok_or(Error::InvalidState)?;
        let legacy = s.legacy.take().ok_or(Error::InvalidState)?;

        let node = self.drv.derive_node(&i.address_n)?;
        let index = signing_index(&i, &node.public_key)?;

        let hash_type = input_hash_type(&s.coin, &i)?;
        let digest = legacy.finish(&s.coin, &s.tx, hash_type);

        let sig = self.drv.sign(&node, &digest)?;
        let script_sig = legacy_script_sig(&i, &sig, hash_type as u8, &node.public_key, index)?;

        write_tx_input(&mut s.serialized, &i.prev_hash, i.prev_index, &script_sig, i.sequence);
        s.signature = Some((sign, sig));

        self.sign_input_next(sign)
    }

    #[cfg_attr(feature = "noinline", inline(never))]
    fn serialize_output(&mut self, n: u32, o: &OutputDescriptor) -> Result<Output, Error> {
        let s = self.session.as_mut().ok_or(Error::InvalidState)?;

        let script = output_script(&self.drv, o)?;
        s.check.write_bytes(&digest_tx_output(o));

        if n == 0 {
            s.serialized.write_varint(s.tx.outputs_count as u64);
        }
        write_tx_output(&mut s.serialized, o.amount, &script);

        if n + 1 < s.tx.outputs_count {
            return self.next(
                State::SignInputs(SignStep::Output(n + 1)),
                TxRequest::new(RequestType::Output, n + 1),
            );
        }

        s.check_outputs()?;

        match s.any_segwit {
            true => self.next(
                State::SignInputs(SignStep::Witness(0)),
                TxRequest::new(RequestType::Input, 0),
            ),
            false => self.finish(),
        }
    }

    #[cfg_attr(feature = "noinline", inline(never))]
    fn sign_witness(&mut self, n: u32, i: &InputDescriptor) -> Result<Output, Error> {
        let s = self.session.as_mut().ok_or(Error::InvalidState)?;

        s.wallet_path.check_input(i)?;
        s.multisig_fp.check_input(i)?;
        s.check.write_bytes(&digest_tx_input(i));

        match SignKind::of(&s.coin, i) {
            SignKind::Segwit => {
                let node = self.drv.derive_node(&i.address_n)?;
                let index = signing_index(i, &node.public_key)?;

                s.consume_authorized(i.amount)?;

                let hash_type = input_hash_type(&s.coin, i)?;
                let script_code = derive_script_code(i, &node.public_key)?;
                let digest = s.hash143.preimage_hash(&s.coin, &s.tx, i, &script_code, hash_type);

                let sig = self.drv.sign(&node, &digest)?;

                let witness = match &i.multisig {
                    Some(ms) => witness_multisig(ms, &sig, index, hash_type as u8)?,
                    None => witness_p2wpkh(&sig, hash_type as u8, &node.public_key),
                };

                s.serialized.write_bytes(&witness);
                s.signature = Some((n, sig));
            }
            // Empty witness for non-segwit inputs
            _ => s.serialized.write_u8(0),
        }

        if n + 1 < s.tx.inputs_count {
            return self.next(
                State::SignInputs(SignStep::Witness(n + 1)),
                TxRequest::new(RequestType::Input, n + 1),
            );
        }

        s.check_inputs()?;

        self.finish()
    }

    /// Write the transaction footer and complete the session
    fn finish(&mut self) -> Result<Output, Error> {
        let s = self.session()?;

        write_tx_footer(&mut s.serialized, s.tx.lock_time, s.coin.overwintered, s.tx.expiry);

        let r = self.next(State::Finished, TxRequest::new(RequestType::Finished, 0))?;

        #[cfg(feature = "log")]
        log::info!("signing complete");

        self.session = None;

        Ok(r)
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Signing session context, alive from [Event::SignTx][super::Event::SignTx]
//! until the transaction is finished or aborted.

use sha2::{Digest, Sha256};

use ledger_utxo_apdu::prelude::*;

use super::{
    prevtx::PrevTxVerifier,
    summary::{Report, ReportTarget},
    Driver, Error,
};
use crate::{
    coins::CoinInfo,
    matchcheck::{MultisigFingerprintChecker, WalletPathChecker, BIP32_WALLET_DEPTH},
    multisig,
    scripts::{
        hash160, input_script_multisig, input_script_p2pkh, input_script_p2wpkh_in_p2sh,
        input_script_p2wsh_in_p2sh, output_script_multisig, output_script_native_segwit,
        output_script_op_return, output_script_p2pkh, output_script_p2sh, sha256, ScriptSig,
    },
    sighash::{input_hash_type, Hasher143, LegacyHasher},
    weight::TxWeightCalculator,
    writers::SerializedTx,
};

/// BIP32 purposes accepted for signing and change
const PURPOSES: [u32; 5] = [44, 45, 48, 49, 84];

/// Maximum address index accepted for change outputs
const MAX_CHANGE_INDEX: u32 = 1_000_000;

/// Digest scheme used to sign an input
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum SignKind {
    /// Legacy digest, amount proven via the prior transaction
    Legacy,
    /// BIP143 / ZIP143 digest for a non-witness input
    Bip143Legacy,
    /// BIP143 digest for a witness input
    Segwit,
}

impl SignKind {
    pub fn of(coin: &CoinInfo, i: &InputDescriptor) -> Self {
        match (i.script_type.is_segwit(), coin.bip143_all()) {
            (true, _) => SignKind::Segwit,
            (false, true) => SignKind::Bip143Legacy,
            (false, false) => SignKind::Legacy,
        }
    }
}

/// Running transaction totals
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct Totals {
    pub total_in: u64,
    pub total_out: u64,
    pub change_out: u64,
    /// Sum of witness input amounts
    pub segwit_in: u64,
    /// Remaining amount authorized for amount-committing signatures
    pub authorized_in: u64,
}

/// Signing session
pub struct SigningSession {
    pub coin: CoinInfo,
    pub tx: TransactionMeta,

    pub wallet_path: WalletPathChecker,
    pub multisig_fp: MultisigFingerprintChecker,
    pub weight: TxWeightCalculator,
    pub hash143: Hasher143,

    pub totals: Totals,
    pub any_segwit: bool,
    /// Legacy inputs present requiring prior transaction verification
    pub needs_prev_verify: bool,
    pub change_index: Option<u32>,

    /// First pass digests over inputs and outputs
    pub inputs_digest: [u8; 32],
    pub outputs_digest: [u8; 32],
    /// Digest for the pass in progress
    pub check: Sha256,

    pub report: Report,

    /// Serialized chunk returned with the next request
    pub serialized: SerializedTx,
    /// Signature returned with the next request
    pub signature: Option<(u32, Signature)>,

    /// Legacy input being signed
    pub current: Option<InputDescriptor>,
    pub legacy: Option<LegacyHasher>,
    pub legacy_check: Sha256,

    /// Prior transaction under verification
    pub prev: Option<PrevTxVerifier>,
}

impl SigningSession {
    pub fn new(coin: CoinInfo, tx: TransactionMeta) -> Self {
        let weight = TxWeightCalculator::new(tx.inputs_count as usize, tx.outputs_count as usize);
        let hash143 = Hasher143::new(&coin);

        Self {
            coin,
            tx,
            wallet_path: WalletPathChecker::new(),
            multisig_fp: MultisigFingerprintChecker::new(),
            weight,
            hash143,
            totals: Totals::default(),
            any_segwit: false,
            needs_prev_verify: false,
            change_index: None,
            inputs_digest: [0u8; 32],
            outputs_digest: [0u8; 32],
            check: Sha256::new(),
            report: Report::new(),
            serialized: SerializedTx::new(),
            signature: None,
            current: None,
            legacy: None,
            legacy_check: Sha256::new(),
            prev: None,
        }
    }

    /// Midstate pass required (witness inputs or amount-committing coin)
    pub fn needs_midstate(&self) -> bool {
        self.any_segwit || self.coin.bip143_all()
    }

    /// Take the running pass digest, resetting it for the next pass
    pub fn take_check(&mut self) -> [u8; 32] {
        core::mem::take(&mut self.check).finalize().into()
    }

    /// Compare the completed input pass against the first pass
    pub fn check_inputs(&mut self) -> Result<(), Error> {
        match self.take_check() == self.inputs_digest {
            true => Ok(()),
            false => {
                #[cfg(feature = "log")]
                log::error!("inputs changed between passes");

                Err(Error::TransactionChanged)
            }
        }
    }

    /// Compare the completed output pass against the first pass
    pub fn check_outputs(&mut self) -> Result<(), Error> {
        match self.take_check() == self.outputs_digest {
            true => Ok(()),
            false => {
                #[cfg(feature = "log")]
                log::error!("outputs changed between passes");

                Err(Error::TransactionChanged)
            }
        }
    }

    /// Account for an input during the first pass
    pub fn add_input(&mut self, i: &InputDescriptor) -> Result<(), Error> {
        self.weight.add_input(i);
        self.wallet_path.add_input(i);
        self.multisig_fp.add_input(i);

        let t = &mut self.totals;
        t.total_in = t.total_in.checked_add(i.amount).ok_or(Error::ValueOverflow)?;

        match SignKind::of(&self.coin, i) {
            SignKind::Segwit => {
                self.any_segwit = true;
                t.segwit_in = t.segwit_in.checked_add(i.amount).ok_or(Error::ValueOverflow)?;
                t.authorized_in = t
                    .authorized_in
                    .checked_add(i.amount)
                    .ok_or(Error::ValueOverflow)?;
            }
            SignKind::Bip143Legacy => {
                t.authorized_in = t
                    .authorized_in
                    .checked_add(i.amount)
                    .ok_or(Error::ValueOverflow)?;
            }
            SignKind::Legacy => self.needs_prev_verify = true,
        }

        Ok(())
    }

    /// Account for an output during the first pass, returning true where
    /// the output leaves the wallet and is presented for confirmation
    pub fn add_output(&mut self, n: u32, o: &OutputDescriptor, script: &[u8]) -> Result<bool, Error> {
        self.weight.add_output(script);

        let t = &mut self.totals;
        t.total_out = t.total_out.checked_add(o.amount).ok_or(Error::ValueOverflow)?;

        if self.change_index.is_none() && self.is_change(o) {
            #[cfg(feature = "log")]
            log::debug!("output {} is change", n);

            self.change_index = Some(n);
            self.totals.change_out = o.amount;

            return Ok(false);
        }

        let target = match &o.target {
            OutputTarget::OpReturn(d) => ReportTarget::OpReturn(d.clone()),
            _ => ReportTarget::Script(Script::from_slice(script).map_err(|_| Error::InvalidOutput)?),
        };

        self.report.set_output(n, o.amount, target);

        Ok(true)
    }

    /// Check whether an output returns funds to the wallet
    fn is_change(&mut self, o: &OutputDescriptor) -> bool {
        let path = match o.address_n() {
            Some(p) => p,
            None => return false,
        };

        // Multisig outputs match on key set, single-sig outputs on wallet path
        let matched = match o.multisig.is_some() {
            true => self.multisig_fp.output_matches(o),
            false => self.wallet_path.output_matches(o),
        };
        if !matched || path.len() < BIP32_WALLET_DEPTH {
            return false;
        }

        let chain = path[path.len() - 2];
        let index = path[path.len() - 1];
        if chain > 1 || index > MAX_CHANGE_INDEX {
            return false;
        }

        if o.amount == 0 {
            return false;
        }

        // Witness change may not exceed witness inputs
        if o.script_type.is_segwit() && o.amount > self.totals.segwit_in {
            return false;
        }

        true
    }

    /// Compute the fee and threshold once all outputs are known
    pub fn complete_totals(&mut self) -> Result<(), Error> {
        let t = self.totals;

        let fee = i64::try_from(t.total_in as i128 - t.total_out as i128)
            .map_err(|_| Error::ValueOverflow)?;

        if fee < 0 && !self.coin.negative_fee {
            #[cfg(feature = "log")]
            log::error!("outputs ({}) exceed inputs ({})", t.total_out, t.total_in);

            return Err(Error::NotEnoughFunds);
        }

        let vsize = self.weight.vsize() as u64;
        let fee_per_kb = match (fee, vsize) {
            (f, v) if f > 0 && v > 0 => (f as u64).saturating_mul(1000) / v,
            _ => 0,
        };
        let high_fee = fee > 0 && (fee as u64) > self.coin.maxfee_kb.saturating_mul(vsize) / 1000;

        #[cfg(feature = "log")]
        log::info!(
            "totals: in {} out {} change {} fee {} ({} per kB, high: {})",
            t.total_in,
            t.total_out,
            t.change_out,
            fee,
            fee_per_kb,
            high_fee
        );

        #[cfg(feature = "log")]
        if high_fee {
            log::warn!("fee {} exceeds {} per kB threshold", fee, self.coin.maxfee_kb);
        }

        let r = &mut self.report;
        r.total_in = t.total_in;
        r.total_out = t.total_out;
        r.change_out = t.change_out;
        r.fee = fee;
        r.fee_per_kb = fee_per_kb;
        r.vsize = vsize as usize;
        r.high_fee = high_fee;

        Ok(())
    }

    /// Consume authorized amount for an amount-committing signature
    pub fn consume_authorized(&mut self, amount: u64) -> Result<(), Error> {
        let t = &mut self.totals;
        if amount > t.authorized_in {
            #[cfg(feature = "log")]
            log::error!("input amount {} exceeds authorized {}", amount, t.authorized_in);

            return Err(Error::TransactionChanged);
        }
        t.authorized_in -= amount;
        Ok(())
    }
}

/// Check a derivation path is acceptable for the coin
pub fn validate_path(coin: &CoinInfo, path: &[u32]) -> Result<(), Error> {
    let (purpose, coin_type) = match path {
        [p, c, ..] => (*p, *c),
        _ => return Err(Error::InvalidPath),
    };

    if !PURPOSES.iter().any(|p| p | HARDENED == purpose) || coin_type != coin.slip44 | HARDENED {
        #[cfg(feature = "log")]
        log::error!("invalid path for {}: {:08x?}", coin.coin_name, path);

        return Err(Error::InvalidPath);
    }

    Ok(())
}

/// Check transaction metadata against coin parameters,
/// returning metadata with defaults applied
pub fn sanitize_meta(coin: &CoinInfo, meta: &TransactionMeta) -> Result<TransactionMeta, Error> {
    if meta.inputs_count == 0 || meta.outputs_count == 0 {
        return Err(Error::InvalidCount);
    }

    if meta.overwintered != coin.overwintered || meta.timestamp.is_some() != coin.timestamp {
        return Err(Error::InvalidMeta);
    }

    let mut tx = meta.clone();

    match coin.overwintered {
        true => {
            if meta.version != 3 || meta.version_group_id.is_none() || meta.branch_id.is_none() {
                return Err(Error::InvalidMeta);
            }
            tx.expiry = Some(meta.expiry.unwrap_or(0));
        }
        false => {
            if meta.expiry.is_some()
                || meta.version_group_id.is_some()
                || meta.branch_id.is_some()
            {
                return Err(Error::InvalidMeta);
            }
        }
    }

    Ok(tx)
}

/// Check an input against coin parameters
pub fn sanitize_input(coin: &CoinInfo, i: &InputDescriptor) -> Result<(), Error> {
    validate_path(coin, &i.address_n)?;

    if i.script_type.is_segwit() && !coin.segwit {
        return Err(Error::UnsupportedScriptType);
    }

    // Amount committing digests require the amount up front
    if SignKind::of(coin, i) != SignKind::Legacy && i.amount == 0 {
        #[cfg(feature = "log")]
        log::error!("input without amount for {:?} digest", SignKind::of(coin, i));

        return Err(Error::InvalidAmount);
    }

    if let Some(ms) = &i.multisig {
        multisig::validate(ms)?;
    }

    input_hash_type(coin, i)?;

    Ok(())
}

/// Check an output against coin parameters
pub fn sanitize_output(coin: &CoinInfo, o: &OutputDescriptor) -> Result<(), Error> {
    match &o.target {
        OutputTarget::Script(s) => {
            if s.is_empty() || o.multisig.is_some() {
                return Err(Error::InvalidOutput);
            }
        }
        OutputTarget::OpReturn(_) => {
            if o.amount != 0 || o.multisig.is_some() {
                #[cfg(feature = "log")]
                log::error!("OP_RETURN output with amount {}", o.amount);

                return Err(Error::InvalidOutput);
            }
        }
        OutputTarget::Path(p) => {
            validate_path(coin, p)?;

            if o.script_type.is_segwit() && !coin.segwit {
                return Err(Error::UnsupportedScriptType);
            }
            if let Some(ms) = &o.multisig {
                multisig::validate(ms)?;
            }
        }
    }

    Ok(())
}

/// Derive the public key for a path
pub fn derive_pubkey<DRV: Driver>(drv: &DRV, path: &[u32]) -> Result<PublicKey, Error> {
    let node = drv.derive_node(path)?;
    Ok(node.public_key)
}

/// Resolve the position of the signing key in an input's multisig key set
/// (zero for single-sig inputs)
pub fn signing_index(i: &InputDescriptor, pubkey: &PublicKey) -> Result<usize, Error> {
    match &i.multisig {
        Some(ms) => multisig::pubkey_index(ms, pubkey),
        None => Ok(0),
    }
}

/// Compute the script_pubkey for an output
pub fn output_script<DRV: Driver>(drv: &DRV, o: &OutputDescriptor) -> Result<Script, Error> {
    let p = match &o.target {
        OutputTarget::Script(s) => return Ok(s.clone()),
        OutputTarget::OpReturn(d) => return output_script_op_return(d),
        OutputTarget::Path(p) => p,
    };

    match &o.multisig {
        Some(ms) => {
            let redeem = output_script_multisig(&ms.pubkeys, ms.m)?;

            match o.script_type {
                ScriptType::Legacy => Ok(output_script_p2sh(&hash160(&redeem))),
                ScriptType::P2shSegwit => {
                    let witness = output_script_native_segwit(&sha256(&redeem))?;
                    Ok(output_script_p2sh(&hash160(&witness)))
                }
                ScriptType::NativeSegwit => output_script_native_segwit(&sha256(&redeem)),
            }
        }
        None => {
            let pubkey_hash = hash160(&derive_pubkey(drv, p)?);

            match o.script_type {
                ScriptType::Legacy => Ok(output_script_p2pkh(&pubkey_hash)),
                ScriptType::P2shSegwit => {
                    let witness = output_script_native_segwit(&pubkey_hash)?;
                    Ok(output_script_p2sh(&hash160(&witness)))
                }
                ScriptType::NativeSegwit => output_script_native_segwit(&pubkey_hash),
            }
        }
    }
}

/// Build the script_sig for a signed non-witness input
pub fn legacy_script_sig(
    i: &InputDescriptor,
    signature: &[u8],
    sighash: u8,
    pubkey: &PublicKey,
    index: usize,
) -> Result<ScriptSig, Error> {
    match &i.multisig {
        Some(ms) => input_script_multisig(ms, signature, index, sighash),
        None => Ok(input_script_p2pkh(signature, sighash, pubkey)),
    }
}

/// Build the script_sig for a witness input (empty for native segwit)
pub fn segwit_script_sig(i: &InputDescriptor, pubkey: &PublicKey) -> Result<ScriptSig, Error> {
    match (i.script_type, &i.multisig) {
        (ScriptType::NativeSegwit, _) => Ok(ScriptSig::new()),
        (ScriptType::P2shSegwit, Some(ms)) => {
            let redeem = output_script_multisig(&ms.pubkeys, ms.m)?;
            Ok(input_script_p2wsh_in_p2sh(&sha256(&redeem)))
        }
        (ScriptType::P2shSegwit, None) => Ok(input_script_p2wpkh_in_p2sh(&hash160(pubkey))),
        (ScriptType::Legacy, _) => Err(Error::InvalidState),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::coins::{BITCOIN, ZCASH};

    #[test]
    fn path_schema() {
        let ok: &[&[u32]] = &[
            &[44 | HARDENED, HARDENED, HARDENED, 0, 0],
            &[84 | HARDENED, HARDENED, HARDENED, 1, 7],
            &[48 | HARDENED, HARDENED, HARDENED, 2 | HARDENED, 0, 0],
        ];
        for p in ok {
            assert_eq!(validate_path(&BITCOIN, p), Ok(()), "{:08x?}", p);
        }

        let bad: &[&[u32]] = &[
            &[],
            &[44 | HARDENED],
            &[44, HARDENED, HARDENED, 0, 0],
            &[44 | HARDENED, 133 | HARDENED, HARDENED, 0, 0],
            &[86 | HARDENED, HARDENED, HARDENED, 0, 0],
        ];
        for p in bad {
            assert_eq!(validate_path(&BITCOIN, p), Err(Error::InvalidPath), "{:08x?}", p);
        }

        assert_eq!(
            validate_path(&ZCASH, &[44 | HARDENED, 133 | HARDENED, HARDENED, 0, 0]),
            Ok(())
        );
    }

    #[test]
    fn meta_sanitization() {
        let meta = TransactionMeta::new("Bitcoin", 2, 0, 1, 1).unwrap();
        assert!(sanitize_meta(&BITCOIN, &meta).is_ok());

        let mut m = meta.clone();
        m.inputs_count = 0;
        assert_eq!(sanitize_meta(&BITCOIN, &m), Err(Error::InvalidCount));

        let mut m = meta.clone();
        m.expiry = Some(10);
        assert_eq!(sanitize_meta(&BITCOIN, &m), Err(Error::InvalidMeta));

        let mut m = meta.clone();
        m.timestamp = Some(10);
        assert_eq!(sanitize_meta(&BITCOIN, &m), Err(Error::InvalidMeta));

        let mut z = TransactionMeta::new("Zcash", 3, 0, 1, 1).unwrap();
        z.overwintered = true;
        assert_eq!(sanitize_meta(&ZCASH, &z), Err(Error::InvalidMeta));

        z.version_group_id = Some(0x03c4_8270);
        z.branch_id = Some(0x5ba8_1b19);
        let s = sanitize_meta(&ZCASH, &z).unwrap();
        assert_eq!(s.expiry, Some(0));

        z.version = 4;
        assert_eq!(sanitize_meta(&ZCASH, &z), Err(Error::InvalidMeta));
    }

    #[test]
    fn fee_totals() {
        let meta = TransactionMeta::new("Bitcoin", 2, 0, 1, 2).unwrap();
        let mut s = SigningSession::new(BITCOIN, meta);

        s.totals.total_in = 100_000_000;
        s.totals.total_out = 99_990_000;
        s.complete_totals().unwrap();
        assert_eq!(s.report.fee, 10_000);
        assert!(!s.report.high_fee);

        s.totals.total_out = 100_000_001;
        assert_eq!(s.complete_totals(), Err(Error::NotEnoughFunds));
    }

    #[test]
    fn op_return_amount() {
        let mut o = OutputDescriptor::op_return(b"hello").unwrap();
        assert_eq!(sanitize_output(&BITCOIN, &o), Ok(()));

        o.amount = 1;
        assert_eq!(sanitize_output(&BITCOIN, &o), Err(Error::InvalidOutput));
    }

    #[test]
    fn segwit_unsupported() {
        let o = OutputDescriptor::path(
            1000,
            &[44 | HARDENED, 133 | HARDENED, HARDENED, 1, 0],
            ScriptType::NativeSegwit,
        )
        .unwrap();
        assert_eq!(sanitize_output(&ZCASH, &o), Err(Error::UnsupportedScriptType));
    }

    #[test]
    fn sign_kinds() {
        let mut i = InputDescriptor {
            prev_hash: [0u8; 32],
            prev_index: 0,
            amount: 1,
            sequence: 0,
            script_type: ScriptType::Legacy,
            address_n: DerivationPath::new(),
            multisig: None,
            sighash: None,
        };

        assert_eq!(SignKind::of(&BITCOIN, &i), SignKind::Legacy);
        assert_eq!(SignKind::of(&ZCASH, &i), SignKind::Bip143Legacy);

        i.script_type = ScriptType::P2shSegwit;
        assert_eq!(SignKind::of(&BITCOIN, &i), SignKind::Segwit);
    }

    #[test]
    fn input_amount_required() {
        let mut i = InputDescriptor {
            prev_hash: [0u8; 32],
            prev_index: 0,
            amount: 0,
            sequence: 0,
            script_type: ScriptType::NativeSegwit,
            address_n: DerivationPath::from_slice(&[84 | HARDENED, HARDENED, HARDENED, 0, 0])
                .unwrap(),
            multisig: None,
            sighash: None,
        };
        assert_eq!(sanitize_input(&BITCOIN, &i), Err(Error::InvalidAmount));

        i.amount = 1;
        assert_eq!(sanitize_input(&BITCOIN, &i), Ok(()));

        // Legacy amounts are proven by the prior transaction
        i.amount = 0;
        i.script_type = ScriptType::Legacy;
        i.address_n =
            DerivationPath::from_slice(&[44 | HARDENED, HARDENED, HARDENED, 0, 0]).unwrap();
        assert_eq!(sanitize_input(&BITCOIN, &i), Ok(()));

        // Zcash signs every input over the amount
        i.address_n =
            DerivationPath::from_slice(&[44 | HARDENED, 133 | HARDENED, HARDENED, 0, 0]).unwrap();
        assert_eq!(sanitize_input(&ZCASH, &i), Err(Error::InvalidAmount));
    }
}

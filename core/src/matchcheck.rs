// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Match checkers, proving an attribute is shared by every input so
//! outputs carrying the same attribute can be treated as change.

use core::marker::PhantomData;

use crate::{
    apdu::{
        tx::{InputDescriptor, MultisigDescriptor, OutputDescriptor},
        DerivationPath,
    },
    engine::Error,
    multisig,
};

/// Number of trailing path components identifying an address within a wallet
/// (chain and address index)
pub const BIP32_WALLET_DEPTH: usize = 2;

/// Attribute extraction for a [MatchChecker]
pub trait MatchAttribute {
    type Attr: Clone + PartialEq + core::fmt::Debug;

    /// Extract the attribute from the provided path and multisig descriptor,
    /// `None` where the attribute is absent or invalid
    fn attribute(
        address_n: &[u32],
        multisig: Option<&MultisigDescriptor>,
    ) -> Option<Self::Attr>;
}

/// Match checker state
#[derive(Clone, PartialEq, Debug)]
pub enum MatchState<A> {
    /// No input processed
    Undefined,
    /// All inputs so far share this attribute
    Matching(A),
    /// Inputs disagree, terminal
    Mismatched,
}

/// Generic match checker over an attribute extractor
#[derive(Clone, PartialEq, Debug)]
pub struct MatchChecker<M: MatchAttribute> {
    state: MatchState<M::Attr>,
    read_only: bool,
    _m: PhantomData<M>,
}

impl<M: MatchAttribute> Default for MatchChecker<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: MatchAttribute> MatchChecker<M> {
    pub const fn new() -> Self {
        Self {
            state: MatchState::Undefined,
            read_only: false,
            _m: PhantomData,
        }
    }

    /// Fetch the checker state
    pub fn state(&self) -> &MatchState<M::Attr> {
        &self.state
    }

    /// Add an input during the first pass
    ///
    /// # Panics
    /// If called after the checker has been queried via [Self::output_matches]
    pub fn add_input(&mut self, i: &InputDescriptor) {
        assert!(!self.read_only, "match checker queried prior to input completion");

        let added = M::attribute(&i.address_n, i.multisig.as_ref());

        self.state = match (&self.state, added) {
            (MatchState::Mismatched, _) => MatchState::Mismatched,
            (_, None) => MatchState::Mismatched,
            (MatchState::Undefined, Some(a)) => MatchState::Matching(a),
            (MatchState::Matching(a), Some(b)) if *a == b => MatchState::Matching(b),
            (MatchState::Matching(_), Some(_)) => MatchState::Mismatched,
        };
    }

    /// Check an input re-requested in a later pass yields the same attribute
    pub fn check_input(&self, i: &InputDescriptor) -> Result<(), Error> {
        match &self.state {
            MatchState::Mismatched => Ok(()),
            MatchState::Matching(a) => {
                match M::attribute(&i.address_n, i.multisig.as_ref()) {
                    Some(b) if *a == b => Ok(()),
                    _ => Err(Error::TransactionChanged),
                }
            }
            MatchState::Undefined => Err(Error::TransactionChanged),
        }
    }

    /// Check whether an output shares the attribute of every input,
    /// this locks the checker against further inputs
    pub fn output_matches(&mut self, o: &OutputDescriptor) -> bool {
        self.read_only = true;

        let a = match &self.state {
            MatchState::Matching(a) => a,
            _ => return false,
        };

        let address_n = match o.address_n() {
            Some(p) => &p[..],
            None => &[],
        };

        match M::attribute(address_n, o.multisig.as_ref()) {
            Some(b) => *a == b,
            None => false,
        }
    }
}

/// Wallet path attribute, the derivation path without chain and address index
#[derive(Clone, PartialEq, Debug)]
pub struct WalletPath;

impl MatchAttribute for WalletPath {
    type Attr = DerivationPath;

    fn attribute(
        address_n: &[u32],
        _multisig: Option<&MultisigDescriptor>,
    ) -> Option<DerivationPath> {
        if address_n.len() <= BIP32_WALLET_DEPTH {
            return None;
        }

        DerivationPath::from_slice(&address_n[..address_n.len() - BIP32_WALLET_DEPTH]).ok()
    }
}

/// Multisig key set attribute, see [multisig::fingerprint]
#[derive(Clone, PartialEq, Debug)]
pub struct MultisigFingerprint;

impl MatchAttribute for MultisigFingerprint {
    type Attr = [u8; 32];

    fn attribute(_address_n: &[u32], multisig: Option<&MultisigDescriptor>) -> Option<[u8; 32]> {
        multisig.map(multisig::fingerprint)
    }
}

pub type WalletPathChecker = MatchChecker<WalletPath>;

pub type MultisigFingerprintChecker = MatchChecker<MultisigFingerprint>;

#[cfg(test)]
mod test {
    use super::*;
    use crate::apdu::{tx::ScriptType, HARDENED};

    fn input(path: &[u32]) -> InputDescriptor {
        InputDescriptor {
            prev_hash: [0x11; 32],
            prev_index: 0,
            amount: 1000,
            sequence: 0xffff_ffff,
            script_type: ScriptType::NativeSegwit,
            address_n: DerivationPath::from_slice(path).unwrap(),
            multisig: None,
            sighash: None,
        }
    }

    const ACCOUNT: [u32; 3] = [84 | HARDENED, HARDENED, HARDENED];
    const OTHER: [u32; 3] = [84 | HARDENED, HARDENED, 1 | HARDENED];

    fn path(prefix: &[u32; 3], chain: u32, index: u32) -> [u32; 5] {
        [prefix[0], prefix[1], prefix[2], chain, index]
    }

    #[test]
    fn shared_prefix_matches() {
        let mut c = WalletPathChecker::new();

        for n in 0..4 {
            c.add_input(&input(&path(&ACCOUNT, 0, n)));
        }
        assert!(matches!(c.state(), MatchState::Matching(_)));

        let change = OutputDescriptor::path(10, &path(&ACCOUNT, 1, 3), ScriptType::NativeSegwit)
            .unwrap();
        let foreign =
            OutputDescriptor::path(10, &path(&OTHER, 1, 3), ScriptType::NativeSegwit).unwrap();
        let external = OutputDescriptor::script(10, &[0x00, 0x14]).unwrap();

        assert!(c.output_matches(&change));
        assert!(!c.output_matches(&foreign));
        assert!(!c.output_matches(&external));
    }

    #[test]
    fn differing_prefix_mismatches() {
        let mut c = WalletPathChecker::new();

        for n in 0..3 {
            c.add_input(&input(&path(&ACCOUNT, 0, n)));
        }
        c.add_input(&input(&path(&OTHER, 0, 0)));
        assert_eq!(c.state(), &MatchState::Mismatched);

        // Mismatch is terminal
        c.add_input(&input(&path(&ACCOUNT, 0, 4)));
        assert_eq!(c.state(), &MatchState::Mismatched);

        let change = OutputDescriptor::path(10, &path(&ACCOUNT, 1, 3), ScriptType::NativeSegwit)
            .unwrap();
        assert!(!c.output_matches(&change));

        // Mismatched checkers accept any later input
        assert!(c.check_input(&input(&path(&OTHER, 0, 9))).is_ok());
    }

    #[test]
    fn short_path_mismatches() {
        let mut c = WalletPathChecker::new();
        c.add_input(&input(&[0, 1]));
        assert_eq!(c.state(), &MatchState::Mismatched);
    }

    #[test]
    fn check_input_detects_change() {
        let mut c = WalletPathChecker::new();
        c.add_input(&input(&path(&ACCOUNT, 0, 0)));
        c.add_input(&input(&path(&ACCOUNT, 0, 1)));

        assert!(c.check_input(&input(&path(&ACCOUNT, 1, 7))).is_ok());
        assert_eq!(
            c.check_input(&input(&path(&OTHER, 0, 1))),
            Err(Error::TransactionChanged)
        );
    }

    #[test]
    #[should_panic]
    fn add_after_query_panics() {
        let mut c = WalletPathChecker::new();
        c.add_input(&input(&path(&ACCOUNT, 0, 0)));

        let o = OutputDescriptor::script(10, &[0x51]).unwrap();
        let _ = c.output_matches(&o);

        c.add_input(&input(&path(&ACCOUNT, 0, 1)));
    }

    #[test]
    fn multisig_fingerprint_checker() {
        let keys = [[0x02; 33], [0x03; 33]];
        let ms = MultisigDescriptor::new(1, &keys).unwrap();

        let mut c = MultisigFingerprintChecker::new();
        for n in 0..2 {
            let mut i = input(&path(&ACCOUNT, 0, n));
            i.multisig = Some(ms.clone());
            c.add_input(&i);
        }
        assert!(matches!(c.state(), MatchState::Matching(_)));

        let mut o =
            OutputDescriptor::path(10, &path(&OTHER, 1, 0), ScriptType::Legacy).unwrap();
        o.multisig = Some(ms.clone());
        assert!(c.output_matches(&o));

        o.multisig = Some(MultisigDescriptor::new(2, &keys).unwrap());
        assert!(!c.output_matches(&o));

        // Inputs without multisig mismatch
        let mut c = MultisigFingerprintChecker::new();
        c.add_input(&input(&path(&ACCOUNT, 0, 0)));
        assert_eq!(c.state(), &MatchState::Mismatched);
    }
}

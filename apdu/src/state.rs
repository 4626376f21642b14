// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Signing session state APDUs
//!

use encdec::{DecodeOwned, Encode};
use ledger_proto::ApduError;
use num_enum::TryFromPrimitive;
use sha2::{Digest as _, Sha512_256};
use strum::{Display, EnumIter, EnumString, EnumVariantNames};

/// Engine state enumeration
/// used in [`TxInfo`][crate::tx::TxInfo] to communicate signing progress
#[derive(
    Copy, Clone, PartialEq, Debug, EnumString, Display, EnumVariantNames, EnumIter, TryFromPrimitive,
)]
#[repr(u8)]
pub enum TxState {
    /// Idle, no session running
    Init = 0x00,
    /// First pass, accumulating totals
    ComputeTotals = 0x10,
    /// First pass paused, waiting for user confirmation of an output
    ConfirmOutput = 0x18,
    /// Second pass, building segwit midstate hashes
    ComputeMidstate = 0x20,
    /// Waiting for user confirmation
    Pending = 0x30,
    /// Signing and serializing inputs
    SignInputs = 0x40,
    /// Session complete
    Finished = 0x50,
    /// Session aborted (value contains the error code)
    Aborted = 0xFF,
}

impl Encode for TxState {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(1)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        if buff.is_empty() {
            return Err(ApduError::InvalidLength);
        }
        buff[0] = *self as u8;
        Ok(1)
    }
}

impl DecodeOwned for TxState {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), ApduError> {
        if buff.is_empty() {
            return Err(ApduError::InvalidLength);
        }

        match Self::try_from(buff[0]) {
            Ok(v) => Ok((v, 1)),
            Err(_) => Err(ApduError::InvalidEncoding),
        }
    }
}

/// Session transcript digest, a running digest over the messages applied
/// to the signing engine so the host can detect desynchronisation.
#[derive(Clone, PartialEq, Encode)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Create a new (empty) state digest
    pub const fn new() -> Self {
        Self([0u8; 32])
    }

    /// Seed a session digest from the session start message digest
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let r = Sha512_256::new()
            .chain_update("utxo_session")
            .chain_update(seed)
            .finalize();

        let mut b = [0u8; 32];
        b.copy_from_slice(r.as_ref());
        Self(b)
    }

    /// Update transcript digest with a new event hash
    #[inline(never)]
    pub fn update(&mut self, evt: &[u8; 32]) -> &Self {
        let mut d = Sha512_256::new();

        // Prior state
        d.update(self.0);

        // New event
        d.update(evt);

        self.0.copy_from_slice(d.finalize().as_ref());

        self
    }

    /// Access raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

/// Debug format [Digest] as hex
impl core::fmt::Debug for Digest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for b in &self.0[..] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Display [Digest] as hex
impl core::fmt::Display for Digest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for b in &self.0[..] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Decode [Digest] into owned array
impl DecodeOwned for Digest {
    type Output = Digest;

    type Error = encdec::Error;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() < 32 {
            return Err(encdec::Error::Length);
        }

        let mut d = [0u8; 32];
        d.copy_from_slice(&buff[..32]);
        Ok((Self(d), 32))
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn state_encode_decode() {
        for s in TxState::iter() {
            let mut buff = [0u8; 4];

            let n = s.encode(&mut buff).unwrap();
            assert_eq!(n, 1);

            let (d, m) = TxState::decode_owned(&buff[..n]).unwrap();
            assert_eq!(d, s);
            assert_eq!(m, 1);
        }

        assert!(matches!(
            TxState::decode_owned(&[0x7f]),
            Err(ApduError::InvalidEncoding)
        ));
    }

    #[test]
    fn digest_chains() {
        let seed = [0x11; 32];
        let mut a = Digest::from_seed(&seed);
        let mut b = Digest::from_seed(&seed);
        assert_eq!(a, b);

        a.update(&[0x01; 32]);
        b.update(&[0x01; 32]);
        assert_eq!(a, b);

        // Diverging events produce diverging digests
        a.update(&[0x02; 32]);
        b.update(&[0x03; 32]);
        assert_ne!(a, b);
    }
}

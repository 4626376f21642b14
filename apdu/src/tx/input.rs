// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction input APDUs and shared script / multisig descriptors

use encdec::{DecodeOwned, Encode};
use heapless::Vec;
use ledger_proto::ApduStatic;
use num_enum::TryFromPrimitive;
use strum::{Display, EnumIter, EnumString};

use crate::{
    helpers::{arr, path},
    ApduError, DerivationPath, Instruction, PublicKey, Signature, MAX_MULTISIG_KEYS,
    MAX_SIGNATURE_LEN, UTXO_APDU_CLA,
};

/// Script type for wallet-owned inputs and change outputs.
///
/// Multisig is orthogonal, signalled by the presence of a [MultisigDescriptor].
#[derive(Copy, Clone, PartialEq, Eq, Debug, EnumString, Display, EnumIter, TryFromPrimitive)]
#[repr(u8)]
pub enum ScriptType {
    /// Pay-to-pubkey-hash, or pay-to-script-hash for multisig
    Legacy = 0x00,
    /// Witness program nested in pay-to-script-hash
    P2shSegwit = 0x01,
    /// Native witness program (v0)
    NativeSegwit = 0x02,
}

impl ScriptType {
    /// Check whether the script type spends via witness data
    pub fn is_segwit(&self) -> bool {
        match self {
            ScriptType::Legacy => false,
            ScriptType::P2shSegwit | ScriptType::NativeSegwit => true,
        }
    }
}

impl Encode for ScriptType {
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

impl DecodeOwned for ScriptType {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self, usize), ApduError> {
        if buff.is_empty() {
            return Err(ApduError::InvalidLength);
        }

        match Self::try_from(buff[0]) {
            Ok(v) => Ok((v, 1)),
            Err(_) => Err(ApduError::InvalidEncoding),
        }
    }
}

/// m-of-n multisig descriptor, with optional already-collected signatures.
///
/// `signatures` is either empty or contains one (possibly empty) entry per public key.
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |       M       |       N       |            RESERVED           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// /                          PUBLIC_KEYS                          /
/// /                (N * 33-byte compressed secp256k1)             /
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// /                          SIGNATURES                           /
/// /          (N * (u8 length + DER signature, may be empty))      /
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct MultisigDescriptor {
    /// Signature threshold
    pub m: u8,
    /// Ordered public keys
    pub pubkeys: Vec<PublicKey, MAX_MULTISIG_KEYS>,
    /// Signatures collected from other cosigners
    pub signatures: Vec<Signature, MAX_MULTISIG_KEYS>,
}

impl MultisigDescriptor {
    /// Create a new multisig descriptor without collected signatures
    pub fn new(m: u8, pubkeys: &[PublicKey]) -> Result<Self, ApduError> {
        Ok(Self {
            m,
            pubkeys: Vec::from_slice(pubkeys).map_err(|_| ApduError::InvalidLength)?,
            signatures: Vec::new(),
        })
    }

    /// Number of keys in the descriptor
    pub fn n(&self) -> usize {
        self.pubkeys.len()
    }

    /// Fetch the collected signature for key index `i`, if present
    pub fn signature(&self, i: usize) -> Option<&[u8]> {
        match self.signatures.get(i) {
            Some(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }
}

impl Encode for MultisigDescriptor {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        let sigs: usize = (0..self.n())
            .map(|i| 1 + self.signature(i).map(|s| s.len()).unwrap_or(0))
            .sum();
        Ok(4 + self.n() * 33 + sigs)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let mut index = 0;

        if buff.len() < self.encode_len()? {
            return Err(ApduError::InvalidLength);
        }

        // Write header
        buff[0] = self.m;
        buff[1] = self.n() as u8;
        buff[2..4].copy_from_slice(&[0u8; 2]);
        index += 4;

        // Write public keys
        for k in &self.pubkeys {
            index += arr::enc(k, &mut buff[index..])?;
        }

        // Write signatures
        for i in 0..self.n() {
            let s = self.signature(i).unwrap_or(&[]);
            buff[index] = s.len() as u8;
            buff[index + 1..][..s.len()].copy_from_slice(s);
            index += 1 + s.len();
        }

        Ok(index)
    }
}

impl DecodeOwned for MultisigDescriptor {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self, usize), ApduError> {
        let mut index = 0;

        if buff.len() < 4 {
            return Err(ApduError::InvalidLength);
        }

        let m = buff[0];
        let n = buff[1] as usize;
        index += 4;

        if n > MAX_MULTISIG_KEYS {
            return Err(ApduError::InvalidEncoding);
        }

        // Read public keys
        let mut pubkeys = Vec::new();
        for _ in 0..n {
            let (k, c) = arr::dec::<33>(&buff[index..])?;
            let _ = pubkeys.push(k);
            index += c;
        }

        // Read signatures
        let mut signatures: Vec<Signature, MAX_MULTISIG_KEYS> = Vec::new();
        let mut any = false;
        for _ in 0..n {
            if buff.len() < index + 1 {
                return Err(ApduError::InvalidLength);
            }
            let l = buff[index] as usize;
            index += 1;

            if l > MAX_SIGNATURE_LEN || buff.len() < index + l {
                return Err(ApduError::InvalidLength);
            }

            let s = Signature::from_slice(&buff[index..][..l]).map_err(|_| ApduError::InvalidLength)?;
            any |= !s.is_empty();
            let _ = signatures.push(s);
            index += l;
        }

        // Normalise absent signatures
        if !any {
            signatures.clear();
        }

        Ok((
            Self {
                m,
                pubkeys,
                signatures,
            },
            index,
        ))
    }
}

bitflags::bitflags! {
    /// Input descriptor flags
    pub struct InputFlags: u8 {
        /// Input includes a multisig descriptor
        const HAS_MULTISIG = 1 << 0;
        /// Input includes a sighash override
        const HAS_SIGHASH = 1 << 1;
    }
}

crate::encdec_bitflags!(InputFlags);

/// Wallet-owned transaction input, sent in response to an input request
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// /                           PREV_HASH                           /
/// /               (32-byte txid, display byte order)              /
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                     PREV_INDEX (u32)                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      SEQUENCE (u32)                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        AMOUNT (u64)                           |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  SCRIPT_TYPE  |     FLAGS     |            RESERVED           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      SIGHASH (u32)                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   PATH_LEN    |   PATH (PATH_LEN * u32, variable length)      /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /           MULTISIG (optional, see [MultisigDescriptor])       /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct InputDescriptor {
    /// Prior transaction hash (txid, display byte order)
    pub prev_hash: [u8; 32],
    /// Output index in the prior transaction
    pub prev_index: u32,
    /// Declared input amount
    pub amount: u64,
    /// Input sequence number
    pub sequence: u32,
    /// Script type used to spend the input
    pub script_type: ScriptType,
    /// Derivation path of the signing key
    pub address_n: DerivationPath,
    /// Multisig descriptor for multisig inputs
    pub multisig: Option<MultisigDescriptor>,
    /// Sighash type override
    pub sighash: Option<u32>,
}

impl ApduStatic for InputDescriptor {
    const CLA: u8 = UTXO_APDU_CLA;
    const INS: u8 = Instruction::TxAckInput as u8;
}

impl InputDescriptor {
    fn flags(&self) -> InputFlags {
        let mut flags = InputFlags::empty();
        flags.set(InputFlags::HAS_MULTISIG, self.multisig.is_some());
        flags.set(InputFlags::HAS_SIGHASH, self.sighash.is_some());
        flags
    }
}

impl Encode for InputDescriptor {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        let mut n = 32 + 4 + 4 + 8 + 4 + 4;
        n += path::enc_len(&self.address_n)?;
        if let Some(m) = &self.multisig {
            n += m.encode_len()?;
        }
        Ok(n)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let mut index = 0;

        if buff.len() < self.encode_len()? {
            return Err(ApduError::InvalidLength);
        }

        index += arr::enc(&self.prev_hash, &mut buff[index..])?;
        index += self.prev_index.encode(&mut buff[index..])?;
        index += self.sequence.encode(&mut buff[index..])?;
        index += self.amount.encode(&mut buff[index..])?;

        index += self.script_type.encode(&mut buff[index..])?;
        index += self.flags().encode(&mut buff[index..])?;
        buff[index..][..2].copy_from_slice(&[0u8; 2]);
        index += 2;

        index += self.sighash.unwrap_or(0).encode(&mut buff[index..])?;
        index += path::enc(&self.address_n, &mut buff[index..])?;

        if let Some(m) = &self.multisig {
            index += m.encode(&mut buff[index..])?;
        }

        Ok(index)
    }
}

impl DecodeOwned for InputDescriptor {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self, usize), ApduError> {
        let mut index = 0;

        // Check fixed header length
        if buff.len() < 56 {
            return Err(ApduError::InvalidLength);
        }

        let (prev_hash, n) = arr::dec::<32>(&buff[index..])?;
        index += n;

        let (prev_index, n) = u32::decode_owned(&buff[index..])?;
        index += n;

        let (sequence, n) = u32::decode_owned(&buff[index..])?;
        index += n;

        let (amount, n) = u64::decode_owned(&buff[index..])?;
        index += n;

        let (script_type, n) = ScriptType::decode_owned(&buff[index..])?;
        index += n;

        let (flags, n) = InputFlags::decode_owned(&buff[index..])?;
        index += n;

        // Skip reserved
        index += 2;

        let (sighash, n) = u32::decode_owned(&buff[index..])?;
        index += n;

        let (address_n, n) = path::dec(&buff[index..])?;
        index += n;

        let multisig = match flags.contains(InputFlags::HAS_MULTISIG) {
            true => {
                let (m, n) = MultisigDescriptor::decode_owned(&buff[index..])?;
                index += n;
                Some(m)
            }
            false => None,
        };

        Ok((
            Self {
                prev_hash,
                prev_index,
                amount,
                sequence,
                script_type,
                address_n,
                multisig,
                sighash: flags.contains(InputFlags::HAS_SIGHASH).then_some(sighash),
            },
            index,
        ))
    }
}

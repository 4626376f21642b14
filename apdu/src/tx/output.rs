// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction output APDUs

use encdec::{DecodeOwned, Encode};
use heapless::Vec;
use ledger_proto::ApduStatic;
use num_enum::TryFromPrimitive;

use crate::{
    helpers::{bytes, path},
    tx::{MultisigDescriptor, ScriptType},
    ApduError, DerivationPath, Instruction, Script, MAX_OP_RETURN_LEN, UTXO_APDU_CLA,
};

/// OP_RETURN payload
pub type Payload = Vec<u8, MAX_OP_RETURN_LEN>;

/// Output destination
#[derive(Clone, PartialEq, Debug)]
pub enum OutputTarget {
    /// Pay to an externally supplied script_pubkey
    Script(Script),
    /// Pay to a wallet-owned address derived from the provided path
    Path(DerivationPath),
    /// Null-data output carrying the provided payload
    OpReturn(Payload),
}

/// Output target kind, used in [OutputDescriptor] encoding
#[derive(Copy, Clone, PartialEq, Debug, TryFromPrimitive)]
#[repr(u8)]
pub enum OutputKind {
    Script = 0x00,
    Path = 0x01,
    OpReturn = 0x02,
}

impl OutputTarget {
    /// Fetch the encoding kind for an output target
    pub fn kind(&self) -> OutputKind {
        match self {
            OutputTarget::Script(_) => OutputKind::Script,
            OutputTarget::Path(_) => OutputKind::Path,
            OutputTarget::OpReturn(_) => OutputKind::OpReturn,
        }
    }
}

/// Transaction output, sent in response to an output request
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        AMOUNT (u64)                           |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     KIND      |  SCRIPT_TYPE  | HAS_MULTISIG  |   RESERVED    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// /                             TARGET                            /
/// /     (SCRIPT: u16 len + script, PATH: u8 len + u32 elements,   /
/// /                 OP_RETURN: u16 len + payload)                 /
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /           MULTISIG (optional, see [MultisigDescriptor])       /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct OutputDescriptor {
    /// Output amount
    pub amount: u64,
    /// Output destination
    pub target: OutputTarget,
    /// Script type for wallet-owned (path) outputs
    pub script_type: ScriptType,
    /// Multisig descriptor for wallet-owned multisig outputs
    pub multisig: Option<MultisigDescriptor>,
}

impl ApduStatic for OutputDescriptor {
    const CLA: u8 = UTXO_APDU_CLA;
    const INS: u8 = Instruction::TxAckOutput as u8;
}

impl OutputDescriptor {
    /// Create an output paying to an external script
    pub fn script(amount: u64, script_pubkey: &[u8]) -> Result<Self, ApduError> {
        Ok(Self {
            amount,
            target: OutputTarget::Script(
                Script::from_slice(script_pubkey).map_err(|_| ApduError::InvalidLength)?,
            ),
            script_type: ScriptType::Legacy,
            multisig: None,
        })
    }

    /// Create an output paying to a wallet-owned path
    pub fn path(amount: u64, address_n: &[u32], script_type: ScriptType) -> Result<Self, ApduError> {
        Ok(Self {
            amount,
            target: OutputTarget::Path(
                DerivationPath::from_slice(address_n).map_err(|_| ApduError::InvalidLength)?,
            ),
            script_type,
            multisig: None,
        })
    }

    /// Create a null-data output
    pub fn op_return(data: &[u8]) -> Result<Self, ApduError> {
        Ok(Self {
            amount: 0,
            target: OutputTarget::OpReturn(
                Payload::from_slice(data).map_err(|_| ApduError::InvalidLength)?,
            ),
            script_type: ScriptType::Legacy,
            multisig: None,
        })
    }

    /// Fetch the derivation path for wallet-owned outputs
    pub fn address_n(&self) -> Option<&DerivationPath> {
        match &self.target {
            OutputTarget::Path(p) => Some(p),
            _ => None,
        }
    }
}

impl Encode for OutputDescriptor {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        let mut n = 8 + 4;

        n += match &self.target {
            OutputTarget::Script(s) => bytes::enc_len(s)?,
            OutputTarget::Path(p) => path::enc_len(p)?,
            OutputTarget::OpReturn(d) => bytes::enc_len(d)?,
        };

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

        index += self.amount.encode(&mut buff[index..])?;

        buff[index] = self.target.kind() as u8;
        buff[index + 1] = self.script_type as u8;
        buff[index + 2] = self.multisig.is_some() as u8;
        buff[index + 3] = 0;
        index += 4;

        index += match &self.target {
            OutputTarget::Script(s) => bytes::enc(s, &mut buff[index..])?,
            OutputTarget::Path(p) => path::enc(p, &mut buff[index..])?,
            OutputTarget::OpReturn(d) => bytes::enc(d, &mut buff[index..])?,
        };

        if let Some(m) = &self.multisig {
            index += m.encode(&mut buff[index..])?;
        }

        Ok(index)
    }
}

impl DecodeOwned for OutputDescriptor {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self, usize), ApduError> {
        let mut index = 0;

        if buff.len() < 12 {
            return Err(ApduError::InvalidLength);
        }

        let (amount, n) = u64::decode_owned(&buff[index..])?;
        index += n;

        let kind = OutputKind::try_from(buff[index]).map_err(|_| ApduError::InvalidEncoding)?;
        let (script_type, _) = ScriptType::decode_owned(&buff[index + 1..])?;
        let has_multisig = buff[index + 2] != 0;
        index += 4;

        let target = match kind {
            OutputKind::Script => {
                let (s, n) = bytes::dec(&buff[index..])?;
                index += n;
                OutputTarget::Script(s)
            }
            OutputKind::Path => {
                let (p, n) = path::dec(&buff[index..])?;
                index += n;
                OutputTarget::Path(p)
            }
            OutputKind::OpReturn => {
                let (d, n) = bytes::dec(&buff[index..])?;
                index += n;
                OutputTarget::OpReturn(d)
            }
        };

        let multisig = match has_multisig {
            true => {
                let (m, n) = MultisigDescriptor::decode_owned(&buff[index..])?;
                index += n;
                Some(m)
            }
            false => None,
        };

        Ok((
            Self {
                amount,
                target,
                script_type,
                multisig,
            },
            index,
        ))
    }
}

#[cfg(test)]
mod test {
    use crate::test::{encode_decode_apdu, MAX_APDU_PAYLOAD};

    use super::*;

    #[test]
    fn encode_decode_outputs() {
        let tests = &[
            OutputDescriptor::script(
                12_345,
                &[
                    0x00, 0x14, 0x1d, 0x0f, 0x17, 0x2a, 0x0e, 0xcb, 0x48, 0xae, 0xe1, 0xbe, 0x1f,
                    0x26, 0x87, 0xd2, 0x96, 0x3a, 0xe3, 0x3f, 0x71, 0xa1,
                ],
            )
            .unwrap(),
            OutputDescriptor::path(
                99_000,
                &[0x8000_0054, 0x8000_0000, 0x8000_0000, 1, 0],
                ScriptType::NativeSegwit,
            )
            .unwrap(),
            OutputDescriptor::op_return(b"hello world").unwrap(),
        ];

        for t in tests {
            let mut buff = [0u8; 256];
            let n = encode_decode_apdu(&mut buff, t);
            assert!(n < MAX_APDU_PAYLOAD);
        }
    }

    #[test]
    fn oversized_payloads_rejected() {
        assert!(OutputDescriptor::op_return(&[0u8; MAX_OP_RETURN_LEN + 1]).is_err());
        assert!(OutputDescriptor::path(1, &[0u32; 9], ScriptType::Legacy).is_err());
    }
}

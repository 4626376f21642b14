// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction metadata APDUs, used to start a signing session and to
//! describe prior transactions during amount verification.

use encdec::{DecodeOwned, Encode};
use heapless::String;
use ledger_proto::ApduStatic;

use crate::{ApduError, Instruction, MAX_COIN_NAME_LEN, UTXO_APDU_CLA};

bitflags::bitflags! {
    /// Transaction metadata flags, marking optional fields as present
    pub struct MetaFlags: u8 {
        /// Transaction uses overwinter serialization
        const OVERWINTERED = 1 << 0;
        /// Expiry height present
        const HAS_EXPIRY = 1 << 1;
        /// Version group id present
        const HAS_VERSION_GROUP_ID = 1 << 2;
        /// Consensus branch id present
        const HAS_BRANCH_ID = 1 << 3;
        /// Timestamp present
        const HAS_TIMESTAMP = 1 << 4;
    }
}

crate::encdec_bitflags!(MetaFlags);

/// Start a signing session for a transaction
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          VERSION                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         LOCK_TIME                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        INPUTS_COUNT                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        OUTPUTS_COUNT                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           EXPIRY                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      VERSION_GROUP_ID                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         BRANCH_ID                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         TIMESTAMP                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     FLAGS     |   NAME_LEN    |           RESERVED            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                     COIN_NAME (utf8, NAME_LEN)                /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct TransactionMeta {
    /// Coin name, resolved to coin parameters on the device
    pub coin_name: String<MAX_COIN_NAME_LEN>,
    /// Transaction version
    pub version: u32,
    /// Transaction lock_time
    pub lock_time: u32,
    /// Declared number of inputs
    pub inputs_count: u32,
    /// Declared number of outputs
    pub outputs_count: u32,
    /// Expiry height for block-expiring transactions
    pub expiry: Option<u32>,
    /// Overwinter serialization
    pub overwintered: bool,
    /// Overwinter version group id
    pub version_group_id: Option<u32>,
    /// Consensus branch id (sighash personalisation)
    pub branch_id: Option<u32>,
    /// Transaction timestamp for coins with timestamped transactions
    pub timestamp: Option<u32>,
}

impl ApduStatic for TransactionMeta {
    const CLA: u8 = UTXO_APDU_CLA;
    const INS: u8 = Instruction::SignTx as u8;
}

impl TransactionMeta {
    /// Create metadata for a plain (non-overwintered, no expiry) transaction
    pub fn new(
        coin_name: &str,
        version: u32,
        lock_time: u32,
        inputs_count: u32,
        outputs_count: u32,
    ) -> Result<Self, ApduError> {
        let mut name = String::new();
        name.push_str(coin_name)
            .map_err(|_| ApduError::InvalidLength)?;

        Ok(Self {
            coin_name: name,
            version,
            lock_time,
            inputs_count,
            outputs_count,
            expiry: None,
            overwintered: false,
            version_group_id: None,
            branch_id: None,
            timestamp: None,
        })
    }

    fn flags(&self) -> MetaFlags {
        let mut f = MetaFlags::empty();
        f.set(MetaFlags::OVERWINTERED, self.overwintered);
        f.set(MetaFlags::HAS_EXPIRY, self.expiry.is_some());
        f.set(MetaFlags::HAS_VERSION_GROUP_ID, self.version_group_id.is_some());
        f.set(MetaFlags::HAS_BRANCH_ID, self.branch_id.is_some());
        f.set(MetaFlags::HAS_TIMESTAMP, self.timestamp.is_some());
        f
    }
}

impl Encode for TransactionMeta {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(36 + self.coin_name.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let mut index = 0;
        let name = self.coin_name.as_bytes();

        if buff.len() < 36 + name.len() {
            return Err(ApduError::InvalidLength);
        }

        index += self.version.encode(&mut buff[index..])?;
        index += self.lock_time.encode(&mut buff[index..])?;
        index += self.inputs_count.encode(&mut buff[index..])?;
        index += self.outputs_count.encode(&mut buff[index..])?;
        index += self.expiry.unwrap_or(0).encode(&mut buff[index..])?;
        index += self.version_group_id.unwrap_or(0).encode(&mut buff[index..])?;
        index += self.branch_id.unwrap_or(0).encode(&mut buff[index..])?;
        index += self.timestamp.unwrap_or(0).encode(&mut buff[index..])?;

        index += self.flags().encode(&mut buff[index..])?;
        buff[index] = name.len() as u8;
        buff[index + 1..][..2].copy_from_slice(&[0u8; 2]);
        index += 3;

        buff[index..][..name.len()].copy_from_slice(name);
        index += name.len();

        Ok(index)
    }
}

impl DecodeOwned for TransactionMeta {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self, usize), ApduError> {
        let mut index = 0;

        if buff.len() < 36 {
            return Err(ApduError::InvalidLength);
        }

        let mut v = [0u32; 8];
        for f in v.iter_mut() {
            let (d, n) = u32::decode_owned(&buff[index..])?;
            *f = d;
            index += n;
        }

        let (flags, n) = MetaFlags::decode_owned(&buff[index..])?;
        index += n;

        let name_len = buff[index] as usize;
        index += 3;

        if name_len > MAX_COIN_NAME_LEN || buff.len() < index + name_len {
            return Err(ApduError::InvalidLength);
        }

        let name =
            core::str::from_utf8(&buff[index..][..name_len]).map_err(|_| ApduError::InvalidUtf8)?;
        let mut coin_name = String::new();
        coin_name
            .push_str(name)
            .map_err(|_| ApduError::InvalidLength)?;
        index += name_len;

        let [version, lock_time, inputs_count, outputs_count, expiry, version_group_id, branch_id, timestamp] =
            v;

        Ok((
            Self {
                coin_name,
                version,
                lock_time,
                inputs_count,
                outputs_count,
                expiry: flags.contains(MetaFlags::HAS_EXPIRY).then_some(expiry),
                overwintered: flags.contains(MetaFlags::OVERWINTERED),
                version_group_id: flags
                    .contains(MetaFlags::HAS_VERSION_GROUP_ID)
                    .then_some(version_group_id),
                branch_id: flags.contains(MetaFlags::HAS_BRANCH_ID).then_some(branch_id),
                timestamp: flags.contains(MetaFlags::HAS_TIMESTAMP).then_some(timestamp),
            },
            index,
        ))
    }
}

/// Prior transaction metadata, sent in response to a meta request
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          VERSION                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         LOCK_TIME                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        INPUTS_COUNT                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        OUTPUTS_COUNT                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       EXTRA_DATA_LEN                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           EXPIRY                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      VERSION_GROUP_ID                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         TIMESTAMP                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     FLAGS     |                   RESERVED                    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct PrevTxMeta {
    pub version: u32,
    pub lock_time: u32,
    pub inputs_count: u32,
    pub outputs_count: u32,
    /// Length of trailing extra data (coins with extra payloads)
    pub extra_data_len: u32,
    pub expiry: Option<u32>,
    pub overwintered: bool,
    pub version_group_id: Option<u32>,
    pub timestamp: Option<u32>,
}

impl ApduStatic for PrevTxMeta {
    const CLA: u8 = UTXO_APDU_CLA;
    const INS: u8 = Instruction::TxAckPrevMeta as u8;
}

impl PrevTxMeta {
    /// Create metadata for a plain prior transaction
    pub fn new(version: u32, lock_time: u32, inputs_count: u32, outputs_count: u32) -> Self {
        Self {
            version,
            lock_time,
            inputs_count,
            outputs_count,
            extra_data_len: 0,
            expiry: None,
            overwintered: false,
            version_group_id: None,
            timestamp: None,
        }
    }
}

impl Encode for PrevTxMeta {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(36)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let mut index = 0;

        if buff.len() < 36 {
            return Err(ApduError::InvalidLength);
        }

        let mut flags = MetaFlags::empty();
        flags.set(MetaFlags::OVERWINTERED, self.overwintered);
        flags.set(MetaFlags::HAS_EXPIRY, self.expiry.is_some());
        flags.set(MetaFlags::HAS_VERSION_GROUP_ID, self.version_group_id.is_some());
        flags.set(MetaFlags::HAS_TIMESTAMP, self.timestamp.is_some());

        index += self.version.encode(&mut buff[index..])?;
        index += self.lock_time.encode(&mut buff[index..])?;
        index += self.inputs_count.encode(&mut buff[index..])?;
        index += self.outputs_count.encode(&mut buff[index..])?;
        index += self.extra_data_len.encode(&mut buff[index..])?;
        index += self.expiry.unwrap_or(0).encode(&mut buff[index..])?;
        index += self.version_group_id.unwrap_or(0).encode(&mut buff[index..])?;
        index += self.timestamp.unwrap_or(0).encode(&mut buff[index..])?;
        index += flags.encode(&mut buff[index..])?;
        buff[index..][..3].copy_from_slice(&[0u8; 3]);
        index += 3;

        Ok(index)
    }
}

impl DecodeOwned for PrevTxMeta {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self, usize), ApduError> {
        let mut index = 0;

        if buff.len() < 36 {
            return Err(ApduError::InvalidLength);
        }

        let mut v = [0u32; 8];
        for f in v.iter_mut() {
            let (d, n) = u32::decode_owned(&buff[index..])?;
            *f = d;
            index += n;
        }

        let (flags, n) = MetaFlags::decode_owned(&buff[index..])?;
        index += n + 3;

        let [version, lock_time, inputs_count, outputs_count, extra_data_len, expiry, version_group_id, timestamp] =
            v;

        Ok((
            Self {
                version,
                lock_time,
                inputs_count,
                outputs_count,
                extra_data_len,
                expiry: flags.contains(MetaFlags::HAS_EXPIRY).then_some(expiry),
                overwintered: flags.contains(MetaFlags::OVERWINTERED),
                version_group_id: flags
                    .contains(MetaFlags::HAS_VERSION_GROUP_ID)
                    .then_some(version_group_id),
                timestamp: flags.contains(MetaFlags::HAS_TIMESTAMP).then_some(timestamp),
            },
            index,
        ))
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device to host transaction requests

use encdec::{DecodeOwned, Encode};
use heapless::Vec;
use num_enum::TryFromPrimitive;
use strum::{Display, EnumIter};

use crate::{
    helpers::{arr, bytes},
    ApduError, Signature, MAX_SERIALIZED_LEN, MAX_SIGNATURE_LEN,
};

/// Request type, determines the expected response shape
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumIter, TryFromPrimitive)]
#[repr(u8)]
pub enum RequestType {
    /// Request an input (or prior transaction input when `tx_hash` is set)
    Input = 0x00,
    /// Request an output (or prior transaction output when `tx_hash` is set)
    Output = 0x01,
    /// Request prior transaction metadata
    Meta = 0x02,
    /// Signing complete, no further data will be requested
    Finished = 0x03,
    /// Request a range of prior transaction extra data
    ExtraData = 0x04,
}

bitflags::bitflags! {
    /// Transaction request flags
    pub struct RequestFlags: u8 {
        /// Request targets a prior transaction
        const HAS_TX_HASH = 1 << 0;
        /// Request carries a signature
        const HAS_SIGNATURE = 1 << 1;
    }
}

crate::encdec_bitflags!(RequestFlags);

/// Transaction request, returned by the device in response to each
/// host message during signing.
///
/// Carries the next request as well as the serialized transaction
/// portion produced while handling the previous response.
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | REQUEST_TYPE  |     FLAGS     |            RESERVED           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          INDEX (u32)                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                    EXTRA_DATA_OFFSET (u32)                    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                     EXTRA_DATA_LEN (u32)                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                TX_HASH (32 bytes, if HAS_TX_HASH)             /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /    SIGNATURE_INDEX (u32), SIG_LEN (u8), SIG (if HAS_SIGNATURE)/
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |        SERIALIZED_LEN         |   SERIALIZED_TX (variable)    /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct TxRequest {
    /// Requested item kind
    pub request_type: RequestType,
    /// Requested item index
    pub index: u32,
    /// Prior transaction hash for prior transaction requests
    pub tx_hash: Option<[u8; 32]>,
    /// Extra data offset for [RequestType::ExtraData] requests
    pub extra_data_offset: u32,
    /// Extra data length for [RequestType::ExtraData] requests
    pub extra_data_len: u32,
    /// Signature for the input at the provided index
    pub signature: Option<(u32, Signature)>,
    /// Serialized transaction chunk
    pub serialized_tx: Vec<u8, MAX_SERIALIZED_LEN>,
}

impl TxRequest {
    /// Create a new request with no serialized data
    pub fn new(request_type: RequestType, index: u32) -> Self {
        Self {
            request_type,
            index,
            tx_hash: None,
            extra_data_offset: 0,
            extra_data_len: 0,
            signature: None,
            serialized_tx: Vec::new(),
        }
    }

    /// Create a request for prior transaction data
    pub fn prev(request_type: RequestType, index: u32, tx_hash: [u8; 32]) -> Self {
        Self {
            tx_hash: Some(tx_hash),
            ..Self::new(request_type, index)
        }
    }

    /// Create a request for a range of prior transaction extra data
    pub fn extra_data(tx_hash: [u8; 32], offset: u32, len: u32) -> Self {
        Self {
            extra_data_offset: offset,
            extra_data_len: len,
            ..Self::prev(RequestType::ExtraData, 0, tx_hash)
        }
    }

    fn flags(&self) -> RequestFlags {
        let mut f = RequestFlags::empty();
        f.set(RequestFlags::HAS_TX_HASH, self.tx_hash.is_some());
        f.set(RequestFlags::HAS_SIGNATURE, self.signature.is_some());
        f
    }
}

impl Encode for TxRequest {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        let mut n = 16;
        if self.tx_hash.is_some() {
            n += 32;
        }
        if let Some((_, s)) = &self.signature {
            n += 5 + s.len();
        }
        n += bytes::enc_len(&self.serialized_tx)?;
        Ok(n)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let mut index = 0;

        if buff.len() < self.encode_len()? {
            return Err(ApduError::InvalidLength);
        }

        buff[0] = self.request_type as u8;
        index += 1;
        index += self.flags().encode(&mut buff[index..])?;
        buff[index..][..2].copy_from_slice(&[0u8; 2]);
        index += 2;

        index += self.index.encode(&mut buff[index..])?;
        index += self.extra_data_offset.encode(&mut buff[index..])?;
        index += self.extra_data_len.encode(&mut buff[index..])?;

        if let Some(h) = &self.tx_hash {
            index += arr::enc(h, &mut buff[index..])?;
        }

        if let Some((i, s)) = &self.signature {
            index += i.encode(&mut buff[index..])?;
            buff[index] = s.len() as u8;
            buff[index + 1..][..s.len()].copy_from_slice(s);
            index += 1 + s.len();
        }

        index += bytes::enc(&self.serialized_tx, &mut buff[index..])?;

        Ok(index)
    }
}

impl DecodeOwned for TxRequest {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self, usize), ApduError> {
        let mut index = 0;

        if buff.len() < 16 {
            return Err(ApduError::InvalidLength);
        }

        let request_type =
            RequestType::try_from(buff[0]).map_err(|_| ApduError::InvalidEncoding)?;
        let (flags, _) = RequestFlags::decode_owned(&buff[1..])?;
        index += 4;

        let (req_index, n) = u32::decode_owned(&buff[index..])?;
        index += n;
        let (extra_data_offset, n) = u32::decode_owned(&buff[index..])?;
        index += n;
        let (extra_data_len, n) = u32::decode_owned(&buff[index..])?;
        index += n;

        let tx_hash = match flags.contains(RequestFlags::HAS_TX_HASH) {
            true => {
                let (h, n) = arr::dec::<32>(&buff[index..])?;
                index += n;
                Some(h)
            }
            false => None,
        };

        let signature = match flags.contains(RequestFlags::HAS_SIGNATURE) {
            true => {
                let (i, n) = u32::decode_owned(&buff[index..])?;
                index += n;

                let l = *buff.get(index).ok_or(ApduError::InvalidLength)? as usize;
                index += 1;
                if l > MAX_SIGNATURE_LEN || buff.len() < index + l {
                    return Err(ApduError::InvalidLength);
                }

                let s = Signature::from_slice(&buff[index..][..l])
                    .map_err(|_| ApduError::InvalidLength)?;
                index += l;
                Some((i, s))
            }
            false => None,
        };

        let (serialized_tx, n) = bytes::dec(&buff[index..])?;
        index += n;

        Ok((
            Self {
                request_type,
                index: req_index,
                tx_hash,
                extra_data_offset,
                extra_data_len,
                signature,
                serialized_tx,
            },
            index,
        ))
    }
}

#[cfg(test)]
mod test {
    use crate::test::encode_decode_apdu;

    use super::*;

    #[test]
    fn encode_decode_requests() {
        let mut signed = TxRequest::new(RequestType::Input, 1);
        signed.signature = Some((0, Signature::from_slice(&[0x30; 71]).unwrap()));
        signed.serialized_tx = Vec::from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]).unwrap();

        let tests = &[
            TxRequest::new(RequestType::Output, 3),
            TxRequest::prev(RequestType::Meta, 0, [0x77; 32]),
            TxRequest::extra_data([0x11; 32], 1024, 512),
            signed,
        ];

        for t in tests {
            let mut buff = [0u8; 256];
            encode_decode_apdu(&mut buff, t);
        }
    }

    #[test]
    fn decode_rejects_unknown_request() {
        let mut buff = [0u8; 32];
        let n = TxRequest::new(RequestType::Finished, 0)
            .encode(&mut buff)
            .unwrap();

        buff[0] = 0x09;
        assert!(TxRequest::decode_owned(&buff[..n]).is_err());
    }
}

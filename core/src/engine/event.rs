// Copyright (c) 2022-2023 The MobileCoin Foundation

use encdec::Decode;

use ledger_proto::{ApduError, ApduStatic};
use ledger_utxo_apdu::prelude::*;

/// [`Engine`][super::Engine] input events, typically decoded from request [APDUs][crate::apdu]
#[derive(Clone, PartialEq, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Event {
    None,

    /// Start a signing session
    SignTx(TransactionMeta),

    /// Transaction input, in response to an input request
    TxInput(InputDescriptor),

    /// Transaction output, in response to an output request
    TxOutput(OutputDescriptor),

    /// Prior transaction metadata
    PrevMeta(PrevTxMeta),

    /// Prior transaction input
    PrevInput(PrevInput),

    /// Prior transaction output
    PrevOutput(PrevOutput),

    /// Prior transaction extra data chunk
    PrevExtraData(PrevExtraData),

    /// Fetch TX info / state, or the outstanding request
    TxGetInfo,

    /// Abort the running session
    TxAbort,
}

/// Helper for decoding APDUs to events
fn decode_event<'a, T>(buff: &'a [u8]) -> Result<Event, ApduError>
where
    T: Decode<'a, Error = ApduError>,
    Event: From<T::Output>,
{
    T::decode(buff).map(|(v, _n)| Event::from(v))
}

impl Event {
    /// Parse an incoming APDU to engine event
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn parse(ins: u8, buff: &[u8]) -> Result<Self, ApduError> {
        match ins {
            TransactionMeta::INS => decode_event::<TransactionMeta>(buff),
            InputDescriptor::INS => decode_event::<InputDescriptor>(buff),
            OutputDescriptor::INS => decode_event::<OutputDescriptor>(buff),

            PrevTxMeta::INS => decode_event::<PrevTxMeta>(buff),
            PrevInput::INS => decode_event::<PrevInput>(buff),
            PrevOutput::INS => decode_event::<PrevOutput>(buff),
            PrevExtraData::INS => decode_event::<PrevExtraData>(buff),

            TxInfoReq::INS => decode_event::<TxInfoReq>(buff),
            TxAbort::INS => decode_event::<TxAbort>(buff),
            _ => Err(ApduError::InvalidEncoding),
        }
    }

    /// Compute a SHA512_256 hash for state-mutating events,
    /// used in the construction of the streaming digest.
    ///
    /// This calls out to [ledger_utxo_apdu::digest] methods for
    /// consistency between events and APDUs.
    ///
    /// [Event::SignTx] is excluded as this seeds a fresh digest.
    pub fn hash(&self) -> Option<[u8; 32]> {
        use ledger_utxo_apdu::digest::*;

        let h = match self {
            Event::TxInput(i) => digest_tx_input(i),
            Event::TxOutput(o) => digest_tx_output(o),
            Event::PrevMeta(m) => digest_prev_meta(m),
            Event::PrevInput(i) => digest_prev_input(i),
            Event::PrevOutput(o) => digest_prev_output(o),
            Event::PrevExtraData(e) => digest_prev_extra_data(e),
            _ => return None,
        };

        Some(h)
    }
}

impl From<TransactionMeta> for Event {
    fn from(a: TransactionMeta) -> Self {
        Event::SignTx(a)
    }
}

impl From<InputDescriptor> for Event {
    fn from(a: InputDescriptor) -> Self {
        Event::TxInput(a)
    }
}

impl From<OutputDescriptor> for Event {
    fn from(a: OutputDescriptor) -> Self {
        Event::TxOutput(a)
    }
}

impl From<PrevTxMeta> for Event {
    fn from(a: PrevTxMeta) -> Self {
        Event::PrevMeta(a)
    }
}

impl From<PrevInput> for Event {
    fn from(a: PrevInput) -> Self {
        Event::PrevInput(a)
    }
}

impl From<PrevOutput> for Event {
    fn from(a: PrevOutput) -> Self {
        Event::PrevOutput(a)
    }
}

impl From<PrevExtraData> for Event {
    fn from(a: PrevExtraData) -> Self {
        Event::PrevExtraData(a)
    }
}

impl From<TxInfoReq> for Event {
    fn from(_: TxInfoReq) -> Self {
        Event::TxGetInfo
    }
}

impl From<TxAbort> for Event {
    fn from(_: TxAbort) -> Self {
        Event::TxAbort
    }
}

#[cfg(test)]
mod test {
    use encdec::Encode;

    use super::*;

    fn encode_parse<A: Encode<Error = ApduError> + ApduStatic>(a: &A) -> Event {
        let mut buff = [0u8; 256];
        let n = a.encode(&mut buff).unwrap();
        Event::parse(A::INS, &buff[..n]).unwrap()
    }

    #[test]
    fn parse_events() {
        let meta = TransactionMeta::new("Bitcoin", 2, 0, 1, 1).unwrap();
        assert_eq!(encode_parse(&meta), Event::SignTx(meta));

        let o = OutputDescriptor::script(1234, &[0x51]).unwrap();
        assert_eq!(encode_parse(&o), Event::TxOutput(o));

        let p = PrevOutput {
            amount: 10,
            script_pubkey: Script::from_slice(&[0x6a]).unwrap(),
        };
        assert_eq!(encode_parse(&p), Event::PrevOutput(p));

        assert_eq!(encode_parse(&TxInfoReq), Event::TxGetInfo);
        assert_eq!(encode_parse(&TxAbort), Event::TxAbort);

        assert!(Event::parse(0x7f, &[]).is_err());
    }

    #[test]
    fn hash_mutating_events() {
        let o = OutputDescriptor::script(1234, &[0x51]).unwrap();
        assert!(Event::TxOutput(o).hash().is_some());

        let meta = TransactionMeta::new("Bitcoin", 2, 0, 1, 1).unwrap();
        assert!(Event::SignTx(meta).hash().is_none());
        assert!(Event::TxGetInfo.hash().is_none());
        assert!(Event::TxAbort.hash().is_none());
    }
}

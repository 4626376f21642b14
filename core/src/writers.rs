// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Consensus serialization writers
//!
//! Writers are agnostic to their destination, the same helpers feed
//! hash accumulators (sighash / prior transaction hashing) and the
//! serialized transaction chunks returned to the host.

use byteorder::{ByteOrder, LittleEndian};
use heapless::Vec;
use sha2::{Digest, Sha256};

use crate::{apdu::MAX_SERIALIZED_LEN, sighash::OVERWINTERED};

/// Append-only sink for serialized transaction data
pub trait Writer {
    /// Append raw bytes
    fn write_bytes(&mut self, b: &[u8]);

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u16(&mut self, v: u16) {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, v);
        self.write_bytes(&b);
    }

    fn write_u32(&mut self, v: u32) {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, v);
        self.write_bytes(&b);
    }

    fn write_u64(&mut self, v: u64) {
        let mut b = [0u8; 8];
        LittleEndian::write_u64(&mut b, v);
        self.write_bytes(&b);
    }

    /// Append a compact size (varint) value
    fn write_varint(&mut self, v: u64) {
        match v {
            0..=0xfc => self.write_u8(v as u8),
            0xfd..=0xffff => {
                self.write_u8(0xfd);
                self.write_u16(v as u16);
            }
            0x1_0000..=0xffff_ffff => {
                self.write_u8(0xfe);
                self.write_u32(v as u32);
            }
            _ => {
                self.write_u8(0xff);
                self.write_u64(v);
            }
        }
    }

    /// Append bytes in reverse order (txids are displayed reversed)
    fn write_bytes_reversed(&mut self, b: &[u8]) {
        for v in b.iter().rev() {
            self.write_u8(*v);
        }
    }

    /// Append a varint length prefix followed by the provided bytes
    fn write_bytes_prefixed(&mut self, b: &[u8]) {
        self.write_varint(b.len() as u64);
        self.write_bytes(b);
    }
}

/// Compute the encoded length of a varint
pub const fn varint_len(v: u64) -> usize {
    if v < 0xfd {
        1
    } else if v <= 0xffff {
        3
    } else if v <= 0xffff_ffff {
        5
    } else {
        9
    }
}

impl Writer for Sha256 {
    fn write_bytes(&mut self, b: &[u8]) {
        self.update(b);
    }
}

impl Writer for blake2b_simd::State {
    fn write_bytes(&mut self, b: &[u8]) {
        self.update(b);
    }
}

impl<const N: usize> Writer for Vec<u8, N> {
    /// Bounded vectors silently drop bytes past capacity, use [SerializedTx]
    /// where overflow must be detected
    fn write_bytes(&mut self, b: &[u8]) {
        let _ = self.extend_from_slice(b);
    }
}

/// Finalise a SHA-256 accumulator, optionally double-hashing and reversing
/// the result (txid display order)
pub fn get_tx_hash(h: Sha256, double: bool, reverse: bool) -> [u8; 32] {
    let mut d: [u8; 32] = h.finalize().into();

    if double {
        d = Sha256::digest(d).into();
    }

    if reverse {
        d.reverse();
    }

    d
}

/// Serialized transaction chunk, returned to the host with the next request
#[derive(Clone, PartialEq, Debug, Default)]
pub struct SerializedTx {
    buff: Vec<u8, MAX_SERIALIZED_LEN>,
    overflow: bool,
}

impl SerializedTx {
    pub const fn new() -> Self {
        Self {
            buff: Vec::new(),
            overflow: false,
        }
    }

    /// Check whether any write exceeded the chunk capacity
    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    pub fn is_empty(&self) -> bool {
        self.buff.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buff
    }

    /// Take the current chunk, leaving the buffer empty
    pub fn take(&mut self) -> Vec<u8, MAX_SERIALIZED_LEN> {
        self.overflow = false;
        core::mem::take(&mut self.buff)
    }

    pub fn clear(&mut self) {
        self.buff.clear();
        self.overflow = false;
    }
}

impl Writer for SerializedTx {
    fn write_bytes(&mut self, b: &[u8]) {
        if self.buff.extend_from_slice(b).is_err() {
            self.overflow = true;
        }
    }
}

/// Write a transaction input (outpoint, script_sig, sequence)
pub fn write_tx_input<W: Writer>(
    w: &mut W,
    prev_hash: &[u8; 32],
    prev_index: u32,
    script_sig: &[u8],
    sequence: u32,
) {
    w.write_bytes_reversed(prev_hash);
    w.write_u32(prev_index);
    w.write_bytes_prefixed(script_sig);
    w.write_u32(sequence);
}

/// Write a transaction output (amount, script_pubkey)
pub fn write_tx_output<W: Writer>(w: &mut W, amount: u64, script_pubkey: &[u8]) {
    w.write_u64(amount);
    w.write_bytes_prefixed(script_pubkey);
}

/// Write a transaction outpoint (prev_hash reversed, prev_index)
pub fn write_outpoint<W: Writer>(w: &mut W, prev_hash: &[u8; 32], prev_index: u32) {
    w.write_bytes_reversed(prev_hash);
    w.write_u32(prev_index);
}

/// Write a transaction header (version, overwinter version group or timestamp)
pub fn write_tx_header<W: Writer>(
    w: &mut W,
    version: u32,
    overwintered: bool,
    version_group_id: Option<u32>,
    timestamp: Option<u32>,
) {
    if overwintered {
        w.write_u32(version | OVERWINTERED);
        w.write_u32(version_group_id.unwrap_or(0));
        return;
    }

    w.write_u32(version);
    if let Some(t) = timestamp {
        w.write_u32(t);
    }
}

/// Write a transaction footer (lock_time, overwinter expiry and empty JoinSplits)
pub fn write_tx_footer<W: Writer>(w: &mut W, lock_time: u32, overwintered: bool, expiry: Option<u32>) {
    w.write_u32(lock_time);

    if overwintered {
        w.write_u32(expiry.unwrap_or(0));
        w.write_varint(0);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn varint_encoding() {
        let tests: &[(u64, &[u8])] = &[
            (0, &[0x00]),
            (0xfc, &[0xfc]),
            (0xfd, &[0xfd, 0xfd, 0x00]),
            (0xffff, &[0xfd, 0xff, 0xff]),
            (0x1_0000, &[0xfe, 0x00, 0x00, 0x01, 0x00]),
            (
                0x1_0000_0000,
                &[0xff, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00],
            ),
        ];

        for (v, e) in tests {
            let mut w = Vec::<u8, 16>::new();
            w.write_varint(*v);
            assert_eq!(&w[..], *e, "varint encoding for {v}");
            assert_eq!(varint_len(*v), e.len());
        }
    }

    #[test]
    fn write_input_output() {
        let mut prev_hash = [0u8; 32];
        prev_hash[0] = 0xaa;
        prev_hash[31] = 0xbb;

        let mut w = Vec::<u8, 128>::new();
        write_tx_input(&mut w, &prev_hash, 1, &[0x51], 0xffff_fffe);

        assert_eq!(w.len(), 32 + 4 + 1 + 1 + 4);
        assert_eq!(w[0], 0xbb);
        assert_eq!(w[31], 0xaa);
        assert_eq!(&w[32..36], &[1, 0, 0, 0]);
        assert_eq!(&w[36..38], &[0x01, 0x51]);
        assert_eq!(&w[38..], &[0xfe, 0xff, 0xff, 0xff]);

        let mut w = Vec::<u8, 128>::new();
        write_tx_output(&mut w, 0x0102, &[0x6a]);
        assert_eq!(&w[..], &[0x02, 0x01, 0, 0, 0, 0, 0, 0, 0x01, 0x6a]);
    }

    #[test]
    fn header_footer() {
        let mut w = Vec::<u8, 32>::new();
        write_tx_header(&mut w, 2, false, None, None);
        write_tx_footer(&mut w, 0x10, false, None);
        assert_eq!(&w[..], &[2, 0, 0, 0, 0x10, 0, 0, 0]);

        let mut w = Vec::<u8, 32>::new();
        write_tx_header(&mut w, 1, false, None, Some(0x0403_0201));
        assert_eq!(&w[..], &[1, 0, 0, 0, 1, 2, 3, 4]);

        let mut w = Vec::<u8, 32>::new();
        write_tx_header(&mut w, 3, true, Some(0x03c4_8270), Some(99));
        write_tx_footer(&mut w, 0, true, Some(0x20));
        assert_eq!(
            &w[..],
            &[3, 0, 0, 0x80, 0x70, 0x82, 0xc4, 0x03, 0, 0, 0, 0, 0x20, 0, 0, 0, 0]
        );
    }

    #[test]
    fn serialized_tx_overflow() {
        let mut s = SerializedTx::new();
        s.write_bytes(&[0u8; MAX_SERIALIZED_LEN]);
        assert!(!s.overflowed());

        s.write_u8(1);
        assert!(s.overflowed());

        let b = s.take();
        assert_eq!(b.len(), MAX_SERIALIZED_LEN);
        assert!(s.is_empty());
        assert!(!s.overflowed());
    }

    #[test]
    fn tx_hash_double_reverse() {
        let mut h = Sha256::new();
        h.write_bytes(b"abc");
        let single = get_tx_hash(h.clone(), false, false);
        assert_eq!(
            hex::encode(single),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let double = get_tx_hash(h.clone(), true, false);
        let mut reversed = get_tx_hash(h, true, true);
        reversed.reverse();
        assert_eq!(double, reversed);
        assert_eq!(double, <[u8; 32]>::from(Sha256::digest(single)));
    }
}

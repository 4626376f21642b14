// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Helpers for computing APDU / event digests
//!
//! The same digest must be computed over engine events on the device and APDUs on the host,
//! so digests are computed over message fields rather than encodings.

use sha2::{Digest as _, Sha512_256};

use crate::tx::{
    InputDescriptor, MultisigDescriptor, OutputDescriptor, OutputTarget, PrevExtraData, PrevInput,
    PrevOutput, PrevTxMeta, TransactionMeta,
};

fn chain_opt(d: Sha512_256, v: Option<u32>) -> Sha512_256 {
    match v {
        Some(v) => d.chain_update([1u8]).chain_update(v.to_le_bytes()),
        None => d.chain_update([0u8]),
    }
}

fn chain_multisig(mut d: Sha512_256, m: Option<&MultisigDescriptor>) -> Sha512_256 {
    let m = match m {
        Some(m) => m,
        None => return d.chain_update([0u8]),
    };

    d = d.chain_update([1u8, m.m, m.n() as u8]);
    for k in &m.pubkeys {
        d = d.chain_update(k);
    }
    for i in 0..m.n() {
        let s = m.signature(i).unwrap_or(&[]);
        d = d.chain_update([s.len() as u8]).chain_update(s);
    }
    d
}

pub fn digest_sign_tx(meta: &TransactionMeta) -> [u8; 32] {
    let mut d = Sha512_256::new()
        .chain_update("sign_tx")
        .chain_update(meta.coin_name.as_bytes())
        .chain_update(meta.version.to_le_bytes())
        .chain_update(meta.lock_time.to_le_bytes())
        .chain_update(meta.inputs_count.to_le_bytes())
        .chain_update(meta.outputs_count.to_le_bytes())
        .chain_update([meta.overwintered as u8]);

    d = chain_opt(d, meta.expiry);
    d = chain_opt(d, meta.version_group_id);
    d = chain_opt(d, meta.branch_id);
    d = chain_opt(d, meta.timestamp);

    d.finalize().into()
}

pub fn digest_tx_input(i: &InputDescriptor) -> [u8; 32] {
    let mut d = Sha512_256::new()
        .chain_update("tx_input")
        .chain_update(i.prev_hash)
        .chain_update(i.prev_index.to_le_bytes())
        .chain_update(i.amount.to_le_bytes())
        .chain_update(i.sequence.to_le_bytes())
        .chain_update([i.script_type as u8, i.address_n.len() as u8]);

    for c in &i.address_n {
        d = d.chain_update(c.to_le_bytes());
    }

    d = chain_multisig(d, i.multisig.as_ref());
    d = chain_opt(d, i.sighash);

    d.finalize().into()
}

pub fn digest_tx_output(o: &OutputDescriptor) -> [u8; 32] {
    let mut d = Sha512_256::new()
        .chain_update("tx_output")
        .chain_update(o.amount.to_le_bytes())
        .chain_update([o.target.kind() as u8, o.script_type as u8]);

    d = match &o.target {
        OutputTarget::Script(s) => d.chain_update((s.len() as u16).to_le_bytes()).chain_update(s),
        OutputTarget::OpReturn(p) => d.chain_update((p.len() as u16).to_le_bytes()).chain_update(p),
        OutputTarget::Path(p) => {
            d = d.chain_update([p.len() as u8]);
            for c in p {
                d = d.chain_update(c.to_le_bytes());
            }
            d
        }
    };

    d = chain_multisig(d, o.multisig.as_ref());

    d.finalize().into()
}

pub fn digest_prev_meta(m: &PrevTxMeta) -> [u8; 32] {
    let mut d = Sha512_256::new()
        .chain_update("prev_meta")
        .chain_update(m.version.to_le_bytes())
        .chain_update(m.lock_time.to_le_bytes())
        .chain_update(m.inputs_count.to_le_bytes())
        .chain_update(m.outputs_count.to_le_bytes())
        .chain_update(m.extra_data_len.to_le_bytes())
        .chain_update([m.overwintered as u8]);

    d = chain_opt(d, m.expiry);
    d = chain_opt(d, m.version_group_id);
    d = chain_opt(d, m.timestamp);

    d.finalize().into()
}

pub fn digest_prev_input(i: &PrevInput) -> [u8; 32] {
    Sha512_256::new()
        .chain_update("prev_input")
        .chain_update(i.prev_hash)
        .chain_update(i.prev_index.to_le_bytes())
        .chain_update(i.sequence.to_le_bytes())
        .chain_update((i.script_sig.len() as u16).to_le_bytes())
        .chain_update(&i.script_sig)
        .finalize()
        .into()
}

pub fn digest_prev_output(o: &PrevOutput) -> [u8; 32] {
    Sha512_256::new()
        .chain_update("prev_output")
        .chain_update(o.amount.to_le_bytes())
        .chain_update((o.script_pubkey.len() as u16).to_le_bytes())
        .chain_update(&o.script_pubkey)
        .finalize()
        .into()
}

pub fn digest_prev_extra_data(e: &PrevExtraData) -> [u8; 32] {
    Sha512_256::new()
        .chain_update("prev_extra_data")
        .chain_update((e.chunk.len() as u16).to_le_bytes())
        .chain_update(&e.chunk)
        .finalize()
        .into()
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Script templates for outputs, input script_sigs and witnesses

use heapless::Vec;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::{
    apdu::{tx::MultisigDescriptor, PublicKey, Script, MAX_SCRIPT_SIG_LEN},
    engine::Error,
    multisig,
    writers::Writer,
};

/// Script signature / witness buffer
pub type ScriptSig = Vec<u8, MAX_SCRIPT_SIG_LEN>;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

/// RIPEMD160(SHA256(data)), used for public key and script hashes
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let h = Sha256::digest(data);
    Ripemd160::digest(h).into()
}

/// SHA256(data), used for witness script hashes
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Length of the push opcode(s) for `n` bytes of data
pub const fn op_push_size(n: usize) -> usize {
    if n < OP_PUSHDATA1 as usize {
        1
    } else if n < 0x100 {
        2
    } else if n < 0x1_0000 {
        3
    } else {
        5
    }
}

/// Write push opcode(s) for `n` bytes of data
pub fn write_op_push<W: Writer>(w: &mut W, n: usize) {
    if n < OP_PUSHDATA1 as usize {
        w.write_u8(n as u8);
    } else if n < 0x100 {
        w.write_u8(OP_PUSHDATA1);
        w.write_u8(n as u8);
    } else if n < 0x1_0000 {
        w.write_u8(OP_PUSHDATA2);
        w.write_u16(n as u16);
    } else {
        w.write_u8(OP_PUSHDATA4);
        w.write_u32(n as u32);
    }
}

/// Pay-to-pubkey-hash: `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
pub fn output_script_p2pkh(pubkey_hash: &[u8; 20]) -> Script {
    let mut s = Script::new();
    s.write_bytes(&[OP_DUP, OP_HASH160, 0x14]);
    s.write_bytes(pubkey_hash);
    s.write_bytes(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    s
}

/// Pay-to-script-hash: `OP_HASH160 <20> OP_EQUAL`
pub fn output_script_p2sh(script_hash: &[u8; 20]) -> Script {
    let mut s = Script::new();
    s.write_bytes(&[OP_HASH160, 0x14]);
    s.write_bytes(script_hash);
    s.write_u8(OP_EQUAL);
    s
}

/// Native v0 witness program, P2WPKH for 20-byte and P2WSH for 32-byte programs
pub fn output_script_native_segwit(program: &[u8]) -> Result<Script, Error> {
    if program.len() != 20 && program.len() != 32 {
        return Err(Error::InvalidLength);
    }

    let mut s = Script::new();
    s.write_u8(OP_0);
    s.write_u8(program.len() as u8);
    s.write_bytes(program);
    Ok(s)
}

/// Null-data output: `OP_RETURN <data>`
pub fn output_script_op_return(data: &[u8]) -> Result<Script, Error> {
    let mut s = Script::new();
    s.write_u8(OP_RETURN);
    write_op_push(&mut s, data.len());
    s.write_bytes(data);

    if s.len() != 1 + op_push_size(data.len()) + data.len() {
        return Err(Error::InvalidLength);
    }
    Ok(s)
}

/// Multisig redeem script: `OP_m <pubkeys...> OP_n OP_CHECKMULTISIG`
pub fn output_script_multisig(pubkeys: &[PublicKey], m: u8) -> Result<Script, Error> {
    let n = pubkeys.len();
    if n == 0 || n > 15 || m == 0 || m as usize > n {
        return Err(Error::InvalidMultisig);
    }

    let mut s = Script::new();
    s.write_u8(OP_1 + m - 1);
    for k in pubkeys {
        s.write_u8(k.len() as u8);
        s.write_bytes(k);
    }
    s.write_u8(OP_1 + n as u8 - 1);
    s.write_u8(OP_CHECKMULTISIG);

    Ok(s)
}

/// P2PKH script_sig: `<sig || hashtype> <pubkey>`
pub fn input_script_p2pkh(signature: &[u8], sighash: u8, pubkey: &PublicKey) -> ScriptSig {
    let mut s = ScriptSig::new();
    write_op_push(&mut s, signature.len() + 1);
    s.write_bytes(signature);
    s.write_u8(sighash);
    write_op_push(&mut s, pubkey.len());
    s.write_bytes(pubkey);
    s
}

/// P2WPKH nested in P2SH script_sig: `<0 <20-byte pubkey hash>>`
pub fn input_script_p2wpkh_in_p2sh(pubkey_hash: &[u8; 20]) -> ScriptSig {
    let mut s = ScriptSig::new();
    s.write_bytes(&[0x16, OP_0, 0x14]);
    s.write_bytes(pubkey_hash);
    s
}

/// P2WSH nested in P2SH script_sig: `<0 <32-byte script hash>>`
pub fn input_script_p2wsh_in_p2sh(script_hash: &[u8; 32]) -> ScriptSig {
    let mut s = ScriptSig::new();
    s.write_bytes(&[0x22, OP_0, 0x20]);
    s.write_bytes(script_hash);
    s
}

/// P2SH multisig script_sig: `OP_0 <sigs...> <redeem script>`
///
/// Collected signatures are placed in key order, with `signature` inserted at `index`.
pub fn input_script_multisig(
    ms: &MultisigDescriptor,
    signature: &[u8],
    index: usize,
    sighash: u8,
) -> Result<ScriptSig, Error> {
    let redeem = output_script_multisig(&ms.pubkeys, ms.m)?;

    let mut s = ScriptSig::new();
    // Extra OP_0 required by the OP_CHECKMULTISIG off-by-one
    s.write_u8(OP_0);

    for (_i, sig) in multisig::signatures(ms, signature, index) {
        write_op_push(&mut s, sig.len() + 1);
        s.write_bytes(sig);
        s.write_u8(sighash);
    }

    write_op_push(&mut s, redeem.len());
    s.write_bytes(&redeem);

    Ok(s)
}

/// P2WPKH witness: `2 <sig || hashtype> <pubkey>`
pub fn witness_p2wpkh(signature: &[u8], sighash: u8, pubkey: &PublicKey) -> ScriptSig {
    let mut s = ScriptSig::new();
    s.write_varint(2);
    s.write_varint(signature.len() as u64 + 1);
    s.write_bytes(signature);
    s.write_u8(sighash);
    s.write_bytes_prefixed(pubkey);
    s
}

/// P2WSH multisig witness: `n <> <sigs...> <witness script>`
pub fn witness_multisig(
    ms: &MultisigDescriptor,
    signature: &[u8],
    index: usize,
    sighash: u8,
) -> Result<ScriptSig, Error> {
    let redeem = output_script_multisig(&ms.pubkeys, ms.m)?;
    let count = multisig::signatures(ms, signature, index).count();

    let mut s = ScriptSig::new();
    s.write_varint(count as u64 + 2);
    // Empty item for the OP_CHECKMULTISIG off-by-one
    s.write_u8(0);

    for (_i, sig) in multisig::signatures(ms, signature, index) {
        s.write_varint(sig.len() as u64 + 1);
        s.write_bytes(sig);
        s.write_u8(sighash);
    }

    s.write_bytes_prefixed(&redeem);

    Ok(s)
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Multisig descriptor helpers

use sha2::{Digest, Sha256};

use crate::{
    apdu::{tx::MultisigDescriptor, PublicKey, MAX_MULTISIG_KEYS},
    engine::Error,
};

/// Check a multisig descriptor is well formed
pub fn validate(ms: &MultisigDescriptor) -> Result<(), Error> {
    let n = ms.n();

    if n == 0 || n > MAX_MULTISIG_KEYS || ms.m == 0 || ms.m as usize > n {
        return Err(Error::InvalidMultisig);
    }

    if !ms.signatures.is_empty() && ms.signatures.len() != n {
        return Err(Error::InvalidMultisig);
    }

    Ok(())
}

/// Fingerprint identifying a multisig key set, used to match
/// change outputs against the inputs being spent
pub fn fingerprint(ms: &MultisigDescriptor) -> [u8; 32] {
    let mut h = Sha256::new()
        .chain_update((ms.m as u32).to_le_bytes())
        .chain_update((ms.n() as u32).to_le_bytes());

    for k in &ms.pubkeys {
        h.update(k);
    }

    h.finalize().into()
}

/// Locate our public key within the multisig key set
pub fn pubkey_index(ms: &MultisigDescriptor, pubkey: &PublicKey) -> Result<usize, Error> {
    match ms.pubkeys.iter().position(|k| k == pubkey) {
        Some(i) => Ok(i),
        None => {
            #[cfg(feature = "log")]
            log::error!("multisig key set does not contain signing key");

            Err(Error::MultisigKeyNotFound)
        }
    }
}

/// Iterate over the non-empty signatures in key order, substituting
/// `ours` at key index `index`
pub fn signatures<'a>(
    ms: &'a MultisigDescriptor,
    ours: &'a [u8],
    index: usize,
) -> impl Iterator<Item = (usize, &'a [u8])> + 'a {
    (0..ms.n()).filter_map(move |i| match i == index {
        true => Some((i, ours)),
        false => ms.signature(i).map(|s| (i, s)),
    })
}

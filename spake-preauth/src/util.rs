//! Transcript hash, w derivation and key derivation.

use crate::{
    enctype::{cf2, Keyblock},
    registry::GroupRegistry,
    Result,
};
use tracing::trace;
use zeroize::Zeroizing;

/// Fold `msg_a | msg_b` into the transcript hash.
///
/// An empty `thash` starts out as zeros of the group's hash length. Either
/// message may be empty.
pub fn update_thash(
    registry: &GroupRegistry,
    group: i32,
    thash: &mut Vec<u8>,
    msg_a: &[u8],
    msg_b: &[u8],
) -> Result<()> {
    if thash.is_empty() {
        thash.resize(registry.def(group)?.hash_len(), 0);
    }
    *thash = registry.hash(group, &[thash.as_slice(), msg_a, msg_b])?;
    trace!(group, thash = %hex::encode(thash.as_slice()), "updated transcript hash");
    Ok(())
}

/// Derive the multiplier w from the long-term key:
/// `PRF+(key, "SPAKEsecret" | group)` truncated to the scalar length.
pub fn derive_w(registry: &GroupRegistry, key: &Keyblock, group: i32) -> Result<Zeroizing<Vec<u8>>> {
    let def = registry.def(group)?;
    let mut input = b"SPAKEsecret".to_vec();
    input.extend_from_slice(&group.to_be_bytes());
    key.prf_plus(&input, def.scalar_len)
}

/// Derive key number `n` of the exchange.
///
/// The seed is the concatenation of
/// `H("SPAKEkey" | group | enctype | w | K | thash | request | n | i)` for
/// block counters `i = 1, 2, ...`, long enough for a key of `ikey`'s type.
/// The resulting key is combined with `ikey` through KRB-FX-CF2 with the
/// peppers "SPAKE" and "keyderiv".
#[allow(clippy::too_many_arguments)]
pub fn derive_key(
    registry: &GroupRegistry,
    group: i32,
    ikey: &Keyblock,
    wbytes: &[u8],
    result: &[u8],
    thash: &[u8],
    request: &[u8],
    n: u32,
) -> Result<Keyblock> {
    let enctype = ikey.enctype();
    let seed_len = enctype.key_len();
    let hash_len = registry.def(group)?.hash_len();
    let blocks = (seed_len + hash_len - 1) / hash_len;

    let group_bytes = group.to_be_bytes();
    let etype_bytes = enctype.id().to_be_bytes();
    let n_bytes = n.to_be_bytes();

    let mut seed = Zeroizing::new(Vec::with_capacity(blocks * hash_len));
    for i in 0..blocks {
        let counter = [(i + 1) as u8];
        let block = Zeroizing::new(registry.hash(
            group,
            &[
                &b"SPAKEkey"[..],
                &group_bytes,
                &etype_bytes,
                wbytes,
                result,
                thash,
                request,
                &n_bytes,
                &counter,
            ],
        )?);
        seed.extend_from_slice(&block);
    }
    seed.truncate(seed_len);

    let hkey = Keyblock::random_to_key(enctype, &seed)?;
    trace!(group, n, "derived SPAKE key");
    cf2(ikey, b"SPAKE", &hkey, b"keyderiv")
}

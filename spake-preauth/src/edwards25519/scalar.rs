//! Integers modulo the prime subgroup order ℓ.

use subtle::{Choice, ConditionallySelectable};
use zeroize::Zeroize;

/// ℓ = 2^252 + 27742317777372353535851937790883648493 as little-endian words.
const L: [u64; 4] = [
    0x5812_631a_5cf5_d3ed,
    0x14de_f9de_a2f7_9cd6,
    0x0000_0000_0000_0000,
    0x1000_0000_0000_0000,
];

/// `r - ℓ` and the final borrow (1 when `r < ℓ`).
fn sub_order(r: &[u64; 4]) -> ([u64; 4], u8) {
    let mut out = [0u64; 4];
    let mut borrow = false;
    for i in 0..4 {
        let (d1, b1) = r[i].overflowing_sub(L[i]);
        let (d2, b2) = d1.overflowing_sub(borrow as u64);
        out[i] = d2;
        borrow = b1 | b2;
    }
    (out, borrow as u8)
}

/// Reduce a little-endian 512-bit integer modulo ℓ.
///
/// Processes one bit at a time from the top, keeping the running remainder
/// below ℓ with a masked subtraction, so timing does not depend on the input.
pub(crate) fn reduce_wide(input: &[u8; 64]) -> [u8; 32] {
    let mut r = [0u64; 4];

    for i in (0..512).rev() {
        let bit = ((input[i >> 3] >> (i & 7)) & 1) as u64;

        let mut carry = bit;
        for limb in r.iter_mut() {
            let top = *limb >> 63;
            *limb = (*limb << 1) | carry;
            carry = top;
        }

        let (reduced, borrow) = sub_order(&r);
        let keep = Choice::from(borrow);
        for (limb, reduced) in r.iter_mut().zip(reduced.iter()) {
            *limb = u64::conditional_select(reduced, limb, keep);
        }
    }

    let mut out = [0u8; 32];
    for (chunk, limb) in out.chunks_exact_mut(8).zip(r.iter()) {
        chunk.copy_from_slice(&limb.to_le_bytes());
    }
    r.zeroize();
    out
}

/// Reduce a little-endian integer of at most 64 bytes modulo ℓ.
pub(crate) fn reduce(input: &[u8]) -> [u8; 32] {
    let mut wide = [0u8; 64];
    let len = input.len().min(64);
    wide[..len].copy_from_slice(&input[..len]);
    let out = reduce_wide(&wide);
    wide.zeroize();
    out
}

/// `8 * s` for `s < 2^253`.
pub(crate) fn mul_by_cofactor(s: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut carry = 0u8;
    for (o, &b) in out.iter_mut().zip(s.iter()) {
        *o = (b << 3) | carry;
        carry = b >> 5;
    }
    out
}

/// Signed radix-16 digits in `[-8, 8]` of a 256-bit little-endian integer.
///
/// The value is `sum(e[i] * 16^i)`; the 65th digit absorbs the final carry,
/// and is zero whenever the top byte is at most 127.
pub(crate) fn to_radix_16(a: &[u8; 32]) -> [i8; 65] {
    let mut e = [0i8; 65];
    for (i, &byte) in a.iter().enumerate() {
        e[2 * i] = (byte & 15) as i8;
        e[2 * i + 1] = ((byte >> 4) & 15) as i8;
    }

    let mut carry = 0i8;
    for digit in e.iter_mut().take(64) {
        *digit += carry;
        carry = (*digit + 8) >> 4;
        *digit -= carry << 4;
    }
    e[64] = carry;
    e
}

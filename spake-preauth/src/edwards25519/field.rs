//! Arithmetic modulo p = 2^255 - 19.
//!
//! Elements use five 51-bit limbs in two flavours. A [`FieldElement`] is
//! "tight": every limb is below 2^51 + 2^18 and it may be fed to any
//! operation. A [`LooseFieldElement`] is the output of an addition,
//! subtraction or negation; its limbs stay below 2^54, which is still a
//! valid multiplication input but must be carried back to tight form before
//! it is added to or subtracted from anything.
//!
//! Every routine here runs in time independent of the limb values.

use std::sync::OnceLock;
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use zeroize::Zeroize;

const LOW_51_BITS: u64 = (1 << 51) - 1;

/// 2p, limb by limb, added before subtracting so limbs never underflow.
const TWO_P: [u64; 5] = [
    0x000f_ffff_ffff_ffda,
    0x000f_ffff_ffff_fffe,
    0x000f_ffff_ffff_fffe,
    0x000f_ffff_ffff_fffe,
    0x000f_ffff_ffff_fffe,
];

/// Tightly reduced field element.
#[derive(Copy, Clone, Debug, Default, Zeroize)]
pub(crate) struct FieldElement(pub(crate) [u64; 5]);

/// Field element with loosely bounded limbs.
#[derive(Copy, Clone, Debug, Default, Zeroize)]
pub(crate) struct LooseFieldElement(pub(crate) [u64; 5]);

/// Either limb representation, as accepted by multiplication.
pub(crate) trait Limbs {
    fn limbs(&self) -> &[u64; 5];
}

impl Limbs for FieldElement {
    fn limbs(&self) -> &[u64; 5] {
        &self.0
    }
}

impl Limbs for LooseFieldElement {
    fn limbs(&self) -> &[u64; 5] {
        &self.0
    }
}

#[inline(always)]
fn m(x: u64, y: u64) -> u128 {
    (x as u128) * (y as u128)
}

/// Carry a wide product back into tight limbs.
#[inline(always)]
fn carry_wide(r: [u128; 5]) -> FieldElement {
    let [r0, mut r1, mut r2, mut r3, mut r4] = r;

    r1 += r0 >> 51;
    let out0 = (r0 as u64) & LOW_51_BITS;
    r2 += r1 >> 51;
    let mut out1 = (r1 as u64) & LOW_51_BITS;
    r3 += r2 >> 51;
    let out2 = (r2 as u64) & LOW_51_BITS;
    r4 += r3 >> 51;
    let out3 = (r3 as u64) & LOW_51_BITS;
    let out4 = (r4 as u64) & LOW_51_BITS;

    // With loose inputs the top carry can exceed 2^60, so fold it wide.
    let t0 = out0 as u128 + (r4 >> 51) * 19;
    out1 += (t0 >> 51) as u64;

    FieldElement([(t0 as u64) & LOW_51_BITS, out1, out2, out3, out4])
}

fn load8(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(word)
}

impl FieldElement {
    pub(crate) const ZERO: FieldElement = FieldElement([0, 0, 0, 0, 0]);
    pub(crate) const ONE: FieldElement = FieldElement([1, 0, 0, 0, 0]);

    /// Small integer constant.
    pub(crate) const fn from_u64(x: u64) -> FieldElement {
        FieldElement([x & LOW_51_BITS, x >> 51, 0, 0, 0])
    }

    /// Load a little-endian encoding, ignoring the top bit.
    pub(crate) fn from_bytes(bytes: &[u8; 32]) -> FieldElement {
        let w0 = load8(&bytes[0..]);
        let w1 = load8(&bytes[8..]);
        let w2 = load8(&bytes[16..]);
        let w3 = load8(&bytes[24..]);

        FieldElement([
            w0 & LOW_51_BITS,
            ((w0 >> 51) | (w1 << 13)) & LOW_51_BITS,
            ((w1 >> 38) | (w2 << 26)) & LOW_51_BITS,
            ((w2 >> 25) | (w3 << 39)) & LOW_51_BITS,
            (w3 >> 12) & LOW_51_BITS,
        ])
    }

    /// Canonical little-endian encoding of the value mod p.
    pub(crate) fn to_bytes(&self) -> [u8; 32] {
        let mut limbs = self.weak_reduce().0;

        // q = 1 iff the value is at least p.
        let mut q = (limbs[0] + 19) >> 51;
        q = (limbs[1] + q) >> 51;
        q = (limbs[2] + q) >> 51;
        q = (limbs[3] + q) >> 51;
        q = (limbs[4] + q) >> 51;

        limbs[0] += 19 * q;
        limbs[1] += limbs[0] >> 51;
        limbs[0] &= LOW_51_BITS;
        limbs[2] += limbs[1] >> 51;
        limbs[1] &= LOW_51_BITS;
        limbs[3] += limbs[2] >> 51;
        limbs[2] &= LOW_51_BITS;
        limbs[4] += limbs[3] >> 51;
        limbs[3] &= LOW_51_BITS;
        // Dropping bit 255 subtracts 2^255, completing the reduction.
        limbs[4] &= LOW_51_BITS;

        let mut out = [0u8; 32];
        let mut acc: u128 = 0;
        let mut bits = 0;
        let mut pos = 0;
        for limb in limbs {
            acc |= (limb as u128) << bits;
            bits += 51;
            while bits >= 8 {
                out[pos] = acc as u8;
                acc >>= 8;
                bits -= 8;
                pos += 1;
            }
        }
        out[pos] = acc as u8;
        out
    }

    fn weak_reduce(&self) -> FieldElement {
        LooseFieldElement(self.0).carry()
    }

    /// `self + rhs`
    pub(crate) fn add(&self, rhs: &FieldElement) -> LooseFieldElement {
        let mut out = [0u64; 5];
        for (i, limb) in out.iter_mut().enumerate() {
            *limb = self.0[i] + rhs.0[i];
        }
        LooseFieldElement(out)
    }

    /// `self - rhs`
    pub(crate) fn sub(&self, rhs: &FieldElement) -> LooseFieldElement {
        let mut out = [0u64; 5];
        for (i, limb) in out.iter_mut().enumerate() {
            *limb = (self.0[i] + TWO_P[i]) - rhs.0[i];
        }
        LooseFieldElement(out)
    }

    /// `-self`
    pub(crate) fn neg(&self) -> LooseFieldElement {
        FieldElement::ZERO.sub(self)
    }

    /// `self * self`
    pub(crate) fn square(&self) -> FieldElement {
        square(self)
    }

    /// `2 * self * self`
    pub(crate) fn square2(&self) -> FieldElement {
        let sq = square(self);
        sq.add(&sq).carry()
    }

    /// `self^(2^k)`, k >= 1
    fn pow2k(&self, k: u32) -> FieldElement {
        let mut out = square(self);
        for _ in 1..k {
            out = square(&out);
        }
        out
    }

    /// Returns `(self^(2^250 - 1), self^11)`.
    fn pow_2_250_minus_1(&self) -> (FieldElement, FieldElement) {
        let z2 = self.square();
        let z8 = z2.pow2k(2);
        let z9 = mul(self, &z8);
        let z11 = mul(&z2, &z9);
        let z22 = z11.square();
        let z_5_0 = mul(&z9, &z22);
        let z_10_5 = z_5_0.pow2k(5);
        let z_10_0 = mul(&z_10_5, &z_5_0);
        let z_20_10 = z_10_0.pow2k(10);
        let z_20_0 = mul(&z_20_10, &z_10_0);
        let z_40_20 = z_20_0.pow2k(20);
        let z_40_0 = mul(&z_40_20, &z_20_0);
        let z_50_10 = z_40_0.pow2k(10);
        let z_50_0 = mul(&z_50_10, &z_10_0);
        let z_100_50 = z_50_0.pow2k(50);
        let z_100_0 = mul(&z_100_50, &z_50_0);
        let z_200_100 = z_100_0.pow2k(100);
        let z_200_0 = mul(&z_200_100, &z_100_0);
        let z_250_50 = z_200_0.pow2k(50);
        let z_250_0 = mul(&z_250_50, &z_50_0);
        (z_250_0, z11)
    }

    /// `self^(p - 2)`, the inverse for non-zero inputs and zero otherwise.
    pub(crate) fn invert(&self) -> FieldElement {
        let (z_250_0, z11) = self.pow_2_250_minus_1();
        let z_255_5 = z_250_0.pow2k(5);
        mul(&z_255_5, &z11)
    }

    /// `self^((p - 5) / 8)`
    pub(crate) fn pow_p58(&self) -> FieldElement {
        let (z_250_0, _) = self.pow_2_250_minus_1();
        let z_252_2 = z_250_0.pow2k(2);
        mul(&z_252_2, self)
    }

    /// Low bit of the canonical encoding.
    pub(crate) fn is_negative(&self) -> Choice {
        Choice::from(self.to_bytes()[0] & 1)
    }

    pub(crate) fn is_zero(&self) -> Choice {
        self.to_bytes().ct_eq(&[0u8; 32])
    }
}

impl LooseFieldElement {
    /// Carry back into tight form.
    pub(crate) fn carry(&self) -> FieldElement {
        let mut l = self.0;
        let c0 = l[0] >> 51;
        let c1 = l[1] >> 51;
        let c2 = l[2] >> 51;
        let c3 = l[3] >> 51;
        let c4 = l[4] >> 51;
        l[0] &= LOW_51_BITS;
        l[1] &= LOW_51_BITS;
        l[2] &= LOW_51_BITS;
        l[3] &= LOW_51_BITS;
        l[4] &= LOW_51_BITS;
        l[0] += c4 * 19;
        l[1] += c0;
        l[2] += c1;
        l[3] += c2;
        l[4] += c3;
        FieldElement(l)
    }
}

/// Multiply two elements of either representation.
pub(crate) fn mul<A: Limbs, B: Limbs>(a: &A, b: &B) -> FieldElement {
    let a = a.limbs();
    let b = b.limbs();

    let b1_19 = b[1] * 19;
    let b2_19 = b[2] * 19;
    let b3_19 = b[3] * 19;
    let b4_19 = b[4] * 19;

    let r0 = m(a[0], b[0]) + m(a[4], b1_19) + m(a[3], b2_19) + m(a[2], b3_19) + m(a[1], b4_19);
    let r1 = m(a[1], b[0]) + m(a[0], b[1]) + m(a[4], b2_19) + m(a[3], b3_19) + m(a[2], b4_19);
    let r2 = m(a[2], b[0]) + m(a[1], b[1]) + m(a[0], b[2]) + m(a[4], b3_19) + m(a[3], b4_19);
    let r3 = m(a[3], b[0]) + m(a[2], b[1]) + m(a[1], b[2]) + m(a[0], b[3]) + m(a[4], b4_19);
    let r4 = m(a[4], b[0]) + m(a[3], b[1]) + m(a[2], b[2]) + m(a[1], b[3]) + m(a[0], b[4]);

    carry_wide([r0, r1, r2, r3, r4])
}

/// Square an element of either representation.
pub(crate) fn square<A: Limbs>(a: &A) -> FieldElement {
    let a = a.limbs();

    let a0_2 = a[0] * 2;
    let a1_2 = a[1] * 2;
    let a1_38 = a[1] * 38;
    let a2_38 = a[2] * 38;
    let a3_38 = a[3] * 38;
    let a3_19 = a[3] * 19;
    let a4_19 = a[4] * 19;

    let r0 = m(a[0], a[0]) + m(a1_38, a[4]) + m(a2_38, a[3]);
    let r1 = m(a0_2, a[1]) + m(a2_38, a[4]) + m(a3_19, a[3]);
    let r2 = m(a0_2, a[2]) + m(a[1], a[1]) + m(a3_38, a[4]);
    let r3 = m(a0_2, a[3]) + m(a1_2, a[2]) + m(a4_19, a[4]);
    let r4 = m(a0_2, a[4]) + m(a1_2, a[3]) + m(a[2], a[2]);

    carry_wide([r0, r1, r2, r3, r4])
}

impl ConditionallySelectable for FieldElement {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        let mut out = [0u64; 5];
        for (i, limb) in out.iter_mut().enumerate() {
            *limb = u64::conditional_select(&a.0[i], &b.0[i], choice);
        }
        FieldElement(out)
    }
}

impl ConditionallySelectable for LooseFieldElement {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        let mut out = [0u64; 5];
        for (i, limb) in out.iter_mut().enumerate() {
            *limb = u64::conditional_select(&a.0[i], &b.0[i], choice);
        }
        LooseFieldElement(out)
    }
}

impl ConstantTimeEq for FieldElement {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.to_bytes().ct_eq(&other.to_bytes())
    }
}

/// Curve constants derived once per process.
pub(crate) struct CurveConstants {
    /// d = -121665/121666
    pub(crate) d: FieldElement,
    /// 2d
    pub(crate) d2: FieldElement,
    /// A square root of -1
    pub(crate) sqrt_m1: FieldElement,
}

pub(crate) fn constants() -> &'static CurveConstants {
    static CONSTANTS: OnceLock<CurveConstants> = OnceLock::new();
    CONSTANTS.get_or_init(|| {
        let num = FieldElement::from_u64(121665).neg().carry();
        let den = FieldElement::from_u64(121666).invert();
        let d = mul(&num, &den);
        let d2 = d.add(&d).carry();

        // 2 is a non-residue mod p, so 2^((p-1)/4) squares to -1.
        let two = FieldElement::from_u64(2);
        let (t, _) = two.pow_2_250_minus_1();
        let two_cubed = FieldElement::from_u64(8);
        let sqrt_m1 = mul(&t.pow2k(3), &two_cubed);

        CurveConstants { d, d2, sqrt_m1 }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fe(hex_str: &str) -> FieldElement {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hex::decode(hex_str).unwrap());
        FieldElement::from_bytes(&bytes)
    }

    fn eq(a: &FieldElement, b: &FieldElement) -> bool {
        a.ct_eq(b).into()
    }

    #[test]
    fn test_bytes_round_trip() {
        let hex_str = "5866666666666666666666666666666666666666666666666666666666666666";
        assert_eq!(hex::encode(fe(hex_str).to_bytes()), hex_str);
    }

    #[test]
    fn test_non_canonical_reduces() {
        // p itself encodes as zero, p + 1 as one
        let p = fe("edffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff7f");
        assert!(bool::from(p.is_zero()));
        let p1 = fe("eeffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff7f");
        assert!(eq(&p1, &FieldElement::ONE));
    }

    #[test]
    fn test_sqrt_m1() {
        let c = constants();
        assert_eq!(
            hex::encode(c.sqrt_m1.to_bytes()),
            "b0a00e4a271beec478e42fad0618432fa7d7fb3d99004d2b0bdfc14f8024832b"
        );
        let minus_one = FieldElement::ONE.neg().carry();
        assert!(eq(&c.sqrt_m1.square(), &minus_one));
    }

    #[test]
    fn test_d() {
        assert_eq!(
            hex::encode(constants().d.to_bytes()),
            "a3785913ca4deb75abd841414d0a700098e879777940c78c73fe6f2bee6c0352"
        );
    }

    #[test]
    fn test_invert() {
        let x = fe("0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20");
        assert!(eq(&mul(&x, &x.invert()), &FieldElement::ONE));
        assert!(bool::from(FieldElement::ZERO.invert().is_zero()));
    }

    #[test]
    fn test_loose_inputs() {
        let a = fe("ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff7f");
        let b = fe("0000000000000000000000000000000000000000000000000000000000000040");
        let sum = a.add(&b);
        let diff = a.sub(&b);
        // (a + b)(a - b) = a^2 - b^2
        let lhs = mul(&sum, &diff);
        let rhs = a.square().sub(&b.square()).carry();
        assert!(eq(&lhs, &rhs));
        assert!(eq(&square(&sum), &mul(&sum, &sum)));
    }

    #[test]
    fn test_square2() {
        let x = fe("2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a");
        let sq = x.square();
        assert!(eq(&x.square2(), &sq.add(&sq).carry()));
    }

    #[test]
    fn test_select() {
        let a = FieldElement::from_u64(5);
        let b = FieldElement::from_u64(7);
        assert!(eq(&FieldElement::conditional_select(&a, &b, Choice::from(0)), &a));
        assert!(eq(&FieldElement::conditional_select(&a, &b, Choice::from(1)), &b));
    }
}

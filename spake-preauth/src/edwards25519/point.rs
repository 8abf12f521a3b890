//! Points on the twisted Edwards curve -x^2 + y^2 = 1 + d x^2 y^2.
//!
//! Five coordinate systems are used:
//!
//! - [`ProjectivePoint`]: (X:Y:Z) with x = X/Z, y = Y/Z
//! - [`ExtendedPoint`]: (X:Y:Z:T) with additionally XY = ZT
//! - [`CompletedPoint`]: ((X:Z),(Y:T)) with x = X/Z, y = Y/T
//! - [`AffineNielsPoint`]: (y+x, y-x, 2dxy), the fixed-base table entries
//! - [`CachedPoint`]: (Y+X, Y-X, Z, 2dT), the variable-base table entries
//!
//! Addition and doubling produce completed points; callers convert back to
//! projective (cheaper) or extended form depending on the next operation.

use super::field::{constants, mul, square, FieldElement, LooseFieldElement};
use core::ops::Neg;
use subtle::{Choice, ConditionallyNegatable, ConditionallySelectable, ConstantTimeEq, CtOption};
use zeroize::{Zeroize, Zeroizing};

#[derive(Copy, Clone, Debug)]
pub(crate) struct ProjectivePoint {
    x: FieldElement,
    y: FieldElement,
    z: FieldElement,
}

#[derive(Copy, Clone, Debug, Zeroize)]
pub(crate) struct ExtendedPoint {
    x: FieldElement,
    y: FieldElement,
    z: FieldElement,
    t: FieldElement,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct CompletedPoint {
    x: LooseFieldElement,
    y: LooseFieldElement,
    z: LooseFieldElement,
    t: LooseFieldElement,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct AffineNielsPoint {
    y_plus_x: FieldElement,
    y_minus_x: FieldElement,
    xy2d: FieldElement,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct CachedPoint {
    y_plus_x: FieldElement,
    y_minus_x: FieldElement,
    z: FieldElement,
    t2d: FieldElement,
}

impl ExtendedPoint {
    pub(crate) const IDENTITY: ExtendedPoint = ExtendedPoint {
        x: FieldElement::ZERO,
        y: FieldElement::ONE,
        z: FieldElement::ONE,
        t: FieldElement::ZERO,
    };

    /// Decode a compressed point, in constant time.
    ///
    /// The encoding is the little-endian y coordinate with the sign of x in
    /// the top bit. Fails when no x satisfies the curve equation, or when
    /// x = 0 is paired with a set sign bit.
    pub(crate) fn from_bytes(bytes: &[u8; 32]) -> CtOption<ExtendedPoint> {
        let c = constants();
        let y = FieldElement::from_bytes(bytes);
        let z = FieldElement::ONE;
        let yy = y.square();
        let u = yy.sub(&z).carry();
        let v = mul(&yy, &c.d).add(&z).carry();

        // x = u v^3 (u v^7)^((p-5)/8)
        let v3 = mul(&v.square(), &v);
        let uv7 = mul(&mul(&v3.square(), &v), &u);
        let mut x = mul(&mul(&uv7.pow_p58(), &v3), &u);

        let vxx = mul(&x.square(), &v);
        let correct_root = vxx.sub(&u).carry().is_zero();
        let flipped_root = vxx.add(&u).carry().is_zero();
        let x_sqrt_m1 = mul(&x, &c.sqrt_m1);
        x.conditional_assign(&x_sqrt_m1, flipped_root & !correct_root);

        let sign = Choice::from(bytes[31] >> 7);
        let is_valid = (correct_root | flipped_root) & !(x.is_zero() & sign);

        let flip_sign = x.is_negative() ^ sign;
        let neg_x = x.neg().carry();
        x.conditional_assign(&neg_x, flip_sign);

        let t = mul(&x, &y);
        CtOption::new(ExtendedPoint { x, y, z, t }, is_valid)
    }

    pub(crate) fn to_bytes(&self) -> [u8; 32] {
        self.to_projective().to_bytes()
    }

    pub(crate) fn to_projective(&self) -> ProjectivePoint {
        ProjectivePoint {
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }

    pub(crate) fn to_cached(&self) -> CachedPoint {
        CachedPoint {
            y_plus_x: self.y.add(&self.x).carry(),
            y_minus_x: self.y.sub(&self.x).carry(),
            z: self.z,
            t2d: mul(&self.t, &constants().d2),
        }
    }

    /// Affine form for the fixed-base table. Costs an inversion.
    pub(crate) fn to_affine_niels(&self) -> AffineNielsPoint {
        let recip = self.z.invert();
        let x = mul(&self.x, &recip);
        let y = mul(&self.y, &recip);
        AffineNielsPoint {
            y_plus_x: y.add(&x).carry(),
            y_minus_x: y.sub(&x).carry(),
            xy2d: mul(&mul(&x, &y), &constants().d2),
        }
    }

    pub(crate) fn double(&self) -> CompletedPoint {
        self.to_projective().double()
    }

    /// `self + other`
    pub(crate) fn add_cached(&self, q: &CachedPoint) -> CompletedPoint {
        let y_plus_x = self.y.add(&self.x);
        let y_minus_x = self.y.sub(&self.x);
        let pp = mul(&y_plus_x, &q.y_plus_x);
        let mm = mul(&y_minus_x, &q.y_minus_x);
        let tt2d = mul(&q.t2d, &self.t);
        let zz = mul(&self.z, &q.z);
        let zz2 = zz.add(&zz).carry();
        CompletedPoint {
            x: pp.sub(&mm),
            y: pp.add(&mm),
            z: zz2.add(&tt2d),
            t: zz2.sub(&tt2d),
        }
    }

    /// `self - other`
    pub(crate) fn sub_cached(&self, q: &CachedPoint) -> CompletedPoint {
        let y_plus_x = self.y.add(&self.x);
        let y_minus_x = self.y.sub(&self.x);
        let pp = mul(&y_plus_x, &q.y_minus_x);
        let mm = mul(&y_minus_x, &q.y_plus_x);
        let tt2d = mul(&q.t2d, &self.t);
        let zz = mul(&self.z, &q.z);
        let zz2 = zz.add(&zz).carry();
        CompletedPoint {
            x: pp.sub(&mm),
            y: pp.add(&mm),
            z: zz2.sub(&tt2d),
            t: zz2.add(&tt2d),
        }
    }

    /// `self + other` for an affine table entry
    pub(crate) fn add_affine_niels(&self, q: &AffineNielsPoint) -> CompletedPoint {
        let y_plus_x = self.y.add(&self.x);
        let y_minus_x = self.y.sub(&self.x);
        let pp = mul(&y_plus_x, &q.y_plus_x);
        let mm = mul(&y_minus_x, &q.y_minus_x);
        let xy2d = mul(&q.xy2d, &self.t);
        let zz2 = self.z.add(&self.z).carry();
        CompletedPoint {
            x: pp.sub(&mm),
            y: pp.add(&mm),
            z: zz2.add(&xy2d),
            t: zz2.sub(&xy2d),
        }
    }

    pub(crate) fn add(&self, other: &ExtendedPoint) -> ExtendedPoint {
        self.add_cached(&other.to_cached()).to_extended()
    }

    pub(crate) fn sub(&self, other: &ExtendedPoint) -> ExtendedPoint {
        self.sub_cached(&other.to_cached()).to_extended()
    }

    /// `16 * self`
    pub(crate) fn mul_by_16(&self) -> ExtendedPoint {
        let mut s = self.double().to_projective();
        s = s.double().to_projective();
        s = s.double().to_projective();
        s.double().to_extended()
    }

    /// Multiply by a 256-bit little-endian scalar, which need not be reduced.
    ///
    /// Uses a table of the first eight multiples of the point and signed
    /// radix-16 digits; every table read touches all eight entries.
    pub(crate) fn mul(&self, scalar: &[u8; 32]) -> ExtendedPoint {
        let table = CachedTable::new(self);
        let digits = Zeroizing::new(super::scalar::to_radix_16(scalar));

        let mut h = ExtendedPoint::IDENTITY;
        for &digit in digits.iter().rev() {
            h = h.mul_by_16();
            h = h.add_cached(&table.select(digit)).to_extended();
        }
        h
    }

    /// Equality of the encoded points.
    #[cfg(test)]
    pub(crate) fn same_point(&self, other: &ExtendedPoint) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl ProjectivePoint {
    pub(crate) fn to_bytes(&self) -> [u8; 32] {
        let recip = self.z.invert();
        let x = mul(&self.x, &recip);
        let y = mul(&self.y, &recip);
        let mut s = y.to_bytes();
        s[31] ^= x.is_negative().unwrap_u8() << 7;
        s
    }

    pub(crate) fn double(&self) -> CompletedPoint {
        let xx = self.x.square();
        let yy = self.y.square();
        let zz2 = self.z.square2();
        let x_plus_y = self.x.add(&self.y);
        let x_plus_y_sq = square(&x_plus_y);

        let yy_plus_xx = yy.add(&xx);
        let yy_minus_xx = yy.sub(&xx);
        CompletedPoint {
            x: x_plus_y_sq.sub(&yy_plus_xx.carry()),
            y: yy_plus_xx,
            z: yy_minus_xx,
            t: zz2.sub(&yy_minus_xx.carry()),
        }
    }
}

impl CompletedPoint {
    pub(crate) fn to_projective(&self) -> ProjectivePoint {
        ProjectivePoint {
            x: mul(&self.x, &self.t),
            y: mul(&self.y, &self.z),
            z: mul(&self.z, &self.t),
        }
    }

    pub(crate) fn to_extended(&self) -> ExtendedPoint {
        ExtendedPoint {
            x: mul(&self.x, &self.t),
            y: mul(&self.y, &self.z),
            z: mul(&self.z, &self.t),
            t: mul(&self.x, &self.y),
        }
    }
}

impl AffineNielsPoint {
    pub(crate) const IDENTITY: AffineNielsPoint = AffineNielsPoint {
        y_plus_x: FieldElement::ONE,
        y_minus_x: FieldElement::ONE,
        xy2d: FieldElement::ZERO,
    };
}

impl ConditionallySelectable for AffineNielsPoint {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        AffineNielsPoint {
            y_plus_x: FieldElement::conditional_select(&a.y_plus_x, &b.y_plus_x, choice),
            y_minus_x: FieldElement::conditional_select(&a.y_minus_x, &b.y_minus_x, choice),
            xy2d: FieldElement::conditional_select(&a.xy2d, &b.xy2d, choice),
        }
    }
}

impl<'a> Neg for &'a AffineNielsPoint {
    type Output = AffineNielsPoint;

    fn neg(self) -> AffineNielsPoint {
        AffineNielsPoint {
            y_plus_x: self.y_minus_x,
            y_minus_x: self.y_plus_x,
            xy2d: self.xy2d.neg().carry(),
        }
    }
}

impl CachedPoint {
    const IDENTITY: CachedPoint = CachedPoint {
        y_plus_x: FieldElement::ONE,
        y_minus_x: FieldElement::ONE,
        z: FieldElement::ONE,
        t2d: FieldElement::ZERO,
    };
}

impl ConditionallySelectable for CachedPoint {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        CachedPoint {
            y_plus_x: FieldElement::conditional_select(&a.y_plus_x, &b.y_plus_x, choice),
            y_minus_x: FieldElement::conditional_select(&a.y_minus_x, &b.y_minus_x, choice),
            z: FieldElement::conditional_select(&a.z, &b.z, choice),
            t2d: FieldElement::conditional_select(&a.t2d, &b.t2d, choice),
        }
    }
}

impl<'a> Neg for &'a CachedPoint {
    type Output = CachedPoint;

    fn neg(self) -> CachedPoint {
        CachedPoint {
            y_plus_x: self.y_minus_x,
            y_minus_x: self.y_plus_x,
            z: self.z,
            t2d: self.t2d.neg().carry(),
        }
    }
}

/// Split a signed digit into its sign and absolute value without branching.
pub(crate) fn abs_digit(digit: i8) -> (Choice, u8) {
    let negative = (digit as u8) >> 7;
    let abs = (digit as i16 - ((-(negative as i16) & digit as i16) << 1)) as u8;
    (Choice::from(negative), abs)
}

/// `[P, 2P, ..., 8P]` in cached form.
struct CachedTable([CachedPoint; 8]);

impl CachedTable {
    fn new(p: &ExtendedPoint) -> Self {
        let base = p.to_cached();
        let mut entries = [base; 8];
        let mut acc = *p;
        for entry in entries.iter_mut().skip(1) {
            acc = acc.add_cached(&base).to_extended();
            *entry = acc.to_cached();
        }
        CachedTable(entries)
    }

    /// `digit * P` for `digit` in `[-8, 8]`.
    fn select(&self, digit: i8) -> CachedPoint {
        let (negative, abs) = abs_digit(digit);
        let mut t = CachedPoint::IDENTITY;
        for (j, entry) in self.0.iter().enumerate() {
            t.conditional_assign(entry, abs.ct_eq(&(j as u8 + 1)));
        }
        t.conditional_negate(negative);
        t
    }
}

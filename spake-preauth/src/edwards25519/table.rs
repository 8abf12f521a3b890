//! Precomputed multiples for fixed-base scalar multiplication.

use super::point::{abs_digit, AffineNielsPoint, ExtendedPoint};
use super::scalar::to_radix_16;
use subtle::{ConditionallyNegatable, ConditionallySelectable, ConstantTimeEq};

/// `table[i][j] = (j + 1) * 256^i * P` for a fixed point P.
pub(crate) struct FixedBaseTable(Box<[[AffineNielsPoint; 8]; 32]>);

impl FixedBaseTable {
    pub(crate) fn new(p: &ExtendedPoint) -> Self {
        let mut rows = Box::new([[AffineNielsPoint::IDENTITY; 8]; 32]);
        let mut base = *p;
        for row in rows.iter_mut() {
            let mut multiple = base;
            for entry in row.iter_mut() {
                *entry = multiple.to_affine_niels();
                multiple = multiple.add(&base);
            }
            for _ in 0..8 {
                base = base.double().to_extended();
            }
        }
        FixedBaseTable(rows)
    }

    /// `digit * 256^pos * P` for `digit` in `[-8, 8]`.
    fn select(&self, pos: usize, digit: i8) -> AffineNielsPoint {
        let (negative, abs) = abs_digit(digit);
        let mut t = AffineNielsPoint::IDENTITY;
        for (j, entry) in self.0[pos].iter().enumerate() {
            t.conditional_assign(entry, abs.ct_eq(&(j as u8 + 1)));
        }
        t.conditional_negate(negative);
        t
    }

    /// Multiply the fixed point by a scalar reduced modulo the group order.
    ///
    /// With a reduced scalar the top byte is at most 127, so the signed
    /// radix-16 expansion fits in 64 digits and the table's 32 rows.
    pub(crate) fn mul(&self, scalar: &[u8; 32]) -> ExtendedPoint {
        let digits = to_radix_16(scalar);

        let mut h = ExtendedPoint::IDENTITY;
        for i in (1..64).step_by(2) {
            h = h.add_affine_niels(&self.select(i / 2, digits[i])).to_extended();
        }

        h = h.mul_by_16();

        for i in (0..64).step_by(2) {
            h = h.add_affine_niels(&self.select(i / 2, digits[i])).to_extended();
        }
        h
    }
}

//! Built-in edwards25519 backend.
//!
//! Field and group arithmetic are implemented here rather than pulled from
//! a curve library, and run in constant time throughout: decoding a peer's
//! point, table lookups and both scalar multiplications never branch on or
//! index by secret data.

mod field;
mod point;
mod scalar;
mod table;

use self::{point::ExtendedPoint, table::FixedBaseTable};
use crate::{
    group::{Constant, GroupBackend, GroupDef, KeyPair},
    Error, Result,
};
use rand_core::CryptoRngCore;
use std::sync::OnceLock;
use tracing::debug;
use zeroize::Zeroizing;

/// Encoding of the standard generator, y = 4/5.
const BASEPOINT: [u8; 32] = [
    0x58, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
    0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
];

/// Generator multiples, shared by every registry in the process.
static BASE_TABLE: OnceLock<FixedBaseTable> = OnceLock::new();

fn base_table() -> Result<&'static FixedBaseTable> {
    if let Some(table) = BASE_TABLE.get() {
        return Ok(table);
    }
    let table = FixedBaseTable::new(&decode(&BASEPOINT)?);
    // Losing a race to another thread leaves an identical table in place.
    let _ = BASE_TABLE.set(table);
    BASE_TABLE.get().ok_or(Error::InvalidEncoding)
}

fn decode(bytes: &[u8]) -> Result<ExtendedPoint> {
    let bytes: &[u8; 32] = bytes.try_into().map_err(|_| Error::InvalidArgument)?;
    Option::from(ExtendedPoint::from_bytes(bytes)).ok_or(Error::InvalidEncoding)
}

fn scalar_bytes(bytes: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let bytes: [u8; 32] = bytes.try_into().map_err(|_| Error::InvalidArgument)?;
    Ok(Zeroizing::new(bytes))
}

/// Runtime state for edwards25519: tables for the two masking elements.
pub(crate) struct Edwards25519 {
    base: &'static FixedBaseTable,
    m: FixedBaseTable,
    n: FixedBaseTable,
}

/// Build the backend state for the edwards25519 registration.
pub(crate) fn init(def: &GroupDef) -> Result<Box<dyn GroupBackend>> {
    let m = FixedBaseTable::new(&decode(def.m)?);
    let n = FixedBaseTable::new(&decode(def.n)?);
    let base = base_table()?;
    debug!(group = def.name, "precomputed fixed-base tables");
    Ok(Box::new(Edwards25519 { base, m, n }))
}

impl Edwards25519 {
    fn table(&self, constant: Constant) -> &FixedBaseTable {
        match constant {
            Constant::M => &self.m,
            Constant::N => &self.n,
        }
    }
}

impl GroupBackend for Edwards25519 {
    fn keygen(
        &self,
        rng: &mut dyn CryptoRngCore,
        wbytes: &[u8],
        constant: Constant,
    ) -> Result<KeyPair> {
        let mut seed = Zeroizing::new([0u8; 64]);
        rng.try_fill_bytes(&mut seed[..])?;

        // A multiple of the cofactor, so the result side lands in the
        // prime-order subgroup whatever the peer sent.
        let s = Zeroizing::new(scalar::reduce_wide(&seed));
        let private = Zeroizing::new(scalar::mul_by_cofactor(&s));
        let x = Zeroizing::new(scalar::reduce(&private[..]));
        let w = Zeroizing::new(scalar::reduce(wbytes));

        let public = self.base.mul(&x).add(&self.table(constant).mul(&w));

        Ok(KeyPair {
            private: Zeroizing::new(private.to_vec()),
            public: public.to_bytes().to_vec(),
        })
    }

    fn result(
        &self,
        wbytes: &[u8],
        ours: &[u8],
        theirs: &[u8],
        constant: Constant,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let ours = scalar_bytes(ours)?;
        let theirs = decode(theirs)?;
        let w = Zeroizing::new(scalar::reduce(wbytes));

        let unmasked = theirs.sub(&self.table(constant).mul(&w));
        let shared = Zeroizing::new(unmasked.mul(&ours));
        Ok(Zeroizing::new(shared.to_bytes().to_vec()))
    }
}

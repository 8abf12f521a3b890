//! NIST curve backend built on the RustCrypto `elliptic-curve` traits.
//!
//! One generic implementation serves P-256, P-384 and P-521. Elements are
//! SEC1 compressed points and private scalars are the big-endian field
//! representation, so lengths follow directly from the curve.

use crate::{
    group::{Constant, GroupBackend, GroupDef, KeyPair},
    Error, Result,
};
use elliptic_curve::{
    ff::PrimeField,
    group::{Curve as _, Group as _},
    ops::{LinearCombination, Reduce},
    sec1::{EncodedPoint, FromEncodedPoint, ModulusSize, ToEncodedPoint},
    AffinePoint, CurveArithmetic, FieldBytes, FieldBytesSize, NonZeroScalar, ProjectivePoint,
    Scalar,
};
use rand_core::CryptoRngCore;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

/// Runtime state for one NIST curve: its decoded masking elements.
pub(crate) struct NistGroup<C: CurveArithmetic> {
    m: ProjectivePoint<C>,
    n: ProjectivePoint<C>,
    element_len: usize,
}

impl<C> NistGroup<C>
where
    C: CurveArithmetic,
    FieldBytesSize<C>: ModulusSize,
    AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
{
    fn new(def: &GroupDef) -> Result<Self> {
        Ok(NistGroup {
            m: decode::<C>(def.m)?,
            n: decode::<C>(def.n)?,
            element_len: def.element_len,
        })
    }

    fn constant(&self, constant: Constant) -> &ProjectivePoint<C> {
        match constant {
            Constant::M => &self.m,
            Constant::N => &self.n,
        }
    }

    fn encode(&self, point: &ProjectivePoint<C>) -> Result<Vec<u8>> {
        let encoded = point.to_affine().to_encoded_point(true);
        // The identity has a one-byte encoding and is never a valid output.
        if encoded.len() != self.element_len {
            return Err(Error::InvalidEncoding);
        }
        Ok(encoded.as_bytes().to_vec())
    }
}

fn field_bytes<C: CurveArithmetic>(bytes: &[u8]) -> Result<FieldBytes<C>> {
    let mut out = FieldBytes::<C>::default();
    if bytes.len() != out.len() {
        return Err(Error::InvalidArgument);
    }
    out.copy_from_slice(bytes);
    Ok(out)
}

fn decode<C>(bytes: &[u8]) -> Result<ProjectivePoint<C>>
where
    C: CurveArithmetic,
    FieldBytesSize<C>: ModulusSize,
    AffinePoint<C>: FromEncodedPoint<C>,
{
    let encoded = EncodedPoint::<C>::from_bytes(bytes).map_err(|_| Error::InvalidEncoding)?;
    let affine: Option<AffinePoint<C>> = AffinePoint::<C>::from_encoded_point(&encoded).into();
    affine.map(ProjectivePoint::<C>::from).ok_or(Error::InvalidEncoding)
}

/// Reduce `w` modulo the group order.
fn reduce_w<C: CurveArithmetic>(wbytes: &[u8]) -> Result<Scalar<C>>
where
    Scalar<C>: Reduce<C::Uint, Bytes = FieldBytes<C>>,
{
    let mut bytes = field_bytes::<C>(wbytes)?;
    let w = <Scalar<C> as Reduce<C::Uint>>::reduce_bytes(&bytes);
    bytes[..].zeroize();
    Ok(w)
}

impl<C> GroupBackend for NistGroup<C>
where
    C: CurveArithmetic,
    FieldBytesSize<C>: ModulusSize,
    AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
    ProjectivePoint<C>: LinearCombination + Send + Sync,
    Scalar<C>: Reduce<C::Uint, Bytes = FieldBytes<C>>,
{
    fn keygen(
        &self,
        rng: &mut dyn CryptoRngCore,
        wbytes: &[u8],
        constant: Constant,
    ) -> Result<KeyPair> {
        // Rejection sampling on the field encoding; zero and values at or
        // above the order are redrawn.
        let x = loop {
            let mut bytes = FieldBytes::<C>::default();
            rng.try_fill_bytes(&mut bytes)?;
            let candidate: Option<NonZeroScalar<C>> =
                NonZeroScalar::<C>::from_repr(bytes.clone()).into();
            bytes[..].zeroize();
            if let Some(x) = candidate {
                break x;
            }
        };
        let w = reduce_w::<C>(wbytes)?;

        let public = ProjectivePoint::<C>::lincomb(
            &ProjectivePoint::<C>::generator(),
            &*x,
            self.constant(constant),
            &w,
        );

        Ok(KeyPair {
            private: Zeroizing::new(x.to_repr().to_vec()),
            public: self.encode(&public)?,
        })
    }

    fn result(
        &self,
        wbytes: &[u8],
        ours: &[u8],
        theirs: &[u8],
        constant: Constant,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let ours: Option<Scalar<C>> = Scalar::<C>::from_repr(field_bytes::<C>(ours)?).into();
        let ours = ours.ok_or(Error::InvalidArgument)?;
        let theirs = decode::<C>(theirs)?;
        let w = reduce_w::<C>(wbytes)?;

        let unmasked = theirs - *self.constant(constant) * w;
        Ok(Zeroizing::new(self.encode(&(unmasked * ours))?))
    }
}

fn init<C>(def: &GroupDef) -> Result<Box<dyn GroupBackend>>
where
    C: CurveArithmetic,
    FieldBytesSize<C>: ModulusSize,
    AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
    ProjectivePoint<C>: LinearCombination + Send + Sync,
    Scalar<C>: Reduce<C::Uint, Bytes = FieldBytes<C>>,
{
    let group = NistGroup::<C>::new(def)?;
    debug!(group = def.name, "decoded masking elements");
    Ok(Box::new(group))
}

/// Backend state for P-256.
pub(crate) fn init_p256(def: &GroupDef) -> Result<Box<dyn GroupBackend>> {
    init::<p256::NistP256>(def)
}

/// Backend state for P-384.
pub(crate) fn init_p384(def: &GroupDef) -> Result<Box<dyn GroupBackend>> {
    init::<p384::NistP384>(def)
}

/// Backend state for P-521.
pub(crate) fn init_p521(def: &GroupDef) -> Result<Box<dyn GroupBackend>> {
    init::<p521::NistP521>(def)
}

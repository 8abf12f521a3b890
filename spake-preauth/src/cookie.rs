//! KDC round-trip state.
//!
//! Serialized as big-endian fields:
//!
//! ```text
//! version: u16 (= 1)
//! stage:   u16
//! group:   i32
//! value:   u32 length, bytes
//! thash:   u32 length, bytes
//! ```
//!
//! At stage 0 `value` is the KDC's private scalar. The caller is expected to
//! encrypt and authenticate the serialized form before it leaves the KDC.

use crate::{Error, Result};
use core::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// The only cookie format understood.
pub const COOKIE_VERSION: u16 = 1;

/// Parsed round-trip state.
#[derive(Clone, Eq, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct Cookie {
    /// Exchange stage; 0 after a challenge has been sent
    pub stage: u16,
    /// Group of the outstanding challenge
    pub group: i32,
    /// Stage-dependent secret (the private scalar at stage 0)
    pub value: Vec<u8>,
    /// Transcript hash so far
    pub thash: Vec<u8>,
}

impl Cookie {
    /// Serialize.
    pub fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        let value_len = u32::try_from(self.value.len()).map_err(|_| Error::InvalidArgument)?;
        let thash_len = u32::try_from(self.thash.len()).map_err(|_| Error::InvalidArgument)?;

        let mut out = Zeroizing::new(Vec::with_capacity(
            16 + self.value.len() + self.thash.len(),
        ));
        out.extend_from_slice(&COOKIE_VERSION.to_be_bytes());
        out.extend_from_slice(&self.stage.to_be_bytes());
        out.extend_from_slice(&self.group.to_be_bytes());
        out.extend_from_slice(&value_len.to_be_bytes());
        out.extend_from_slice(&self.value);
        out.extend_from_slice(&thash_len.to_be_bytes());
        out.extend_from_slice(&self.thash);
        Ok(out)
    }

    /// Parse, rejecting any version but [`COOKIE_VERSION`] before looking at
    /// the remaining fields.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader(bytes);
        if reader.u16()? != COOKIE_VERSION {
            return Err(Error::Cookie);
        }
        let stage = reader.u16()?;
        let group = reader.i32()?;
        let value = reader.counted()?;
        let thash = reader.counted()?;
        if !reader.0.is_empty() {
            return Err(Error::Cookie);
        }
        Ok(Cookie {
            stage,
            group,
            value,
            thash,
        })
    }
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("stage", &self.stage)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.0.len() < len {
            return Err(Error::Cookie);
        }
        let (head, rest) = self.0.split_at(len);
        self.0 = rest;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn counted(&mut self) -> Result<Vec<u8>> {
        let len = u32::from_be_bytes(self.array()?) as usize;
        Ok(self.take(len)?.to_vec())
    }
}

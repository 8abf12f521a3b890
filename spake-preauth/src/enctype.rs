//! Long-term key type and the key-bound primitives the exchange needs.
//!
//! Implements the two RFC 8009 encryption types, `aes128-cts-hmac-sha256-128`
//! and `aes256-cts-hmac-sha384-192`: their PRF, PRF+, KRB-FX-CF2 key
//! combination and authenticated encryption.

use crate::{Error, Result};
use aes::{
    cipher::{BlockDecrypt, BlockEncrypt, KeyInit},
    Aes128, Aes256, Block,
};
use core::fmt;
use hmac::{Hmac, Mac};
use rand_core::CryptoRngCore;
use sha2::{Sha256, Sha384};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Enctype number of `aes128-cts-hmac-sha256-128`.
pub const ENCTYPE_AES128_CTS_HMAC_SHA256_128: i32 = 19;
/// Enctype number of `aes256-cts-hmac-sha384-192`.
pub const ENCTYPE_AES256_CTS_HMAC_SHA384_192: i32 = 20;

const BLOCK_LEN: usize = 16;

/// Supported encryption types.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Enctype {
    /// `aes128-cts-hmac-sha256-128`
    Aes128CtsHmacSha256,
    /// `aes256-cts-hmac-sha384-192`
    Aes256CtsHmacSha384,
}

impl Enctype {
    /// Look up an enctype number.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            ENCTYPE_AES128_CTS_HMAC_SHA256_128 => Some(Enctype::Aes128CtsHmacSha256),
            ENCTYPE_AES256_CTS_HMAC_SHA384_192 => Some(Enctype::Aes256CtsHmacSha384),
            _ => None,
        }
    }

    /// Enctype number.
    pub fn id(self) -> i32 {
        match self {
            Enctype::Aes128CtsHmacSha256 => ENCTYPE_AES128_CTS_HMAC_SHA256_128,
            Enctype::Aes256CtsHmacSha384 => ENCTYPE_AES256_CTS_HMAC_SHA384_192,
        }
    }

    /// Key length in bytes; also the random-to-key seed length.
    pub fn key_len(self) -> usize {
        match self {
            Enctype::Aes128CtsHmacSha256 => 16,
            Enctype::Aes256CtsHmacSha384 => 32,
        }
    }

    /// PRF output length in bytes.
    pub fn prf_len(self) -> usize {
        match self {
            Enctype::Aes128CtsHmacSha256 => 32,
            Enctype::Aes256CtsHmacSha384 => 48,
        }
    }

    /// Truncated integrity tag length in bytes.
    pub fn mac_len(self) -> usize {
        match self {
            Enctype::Aes128CtsHmacSha256 => 16,
            Enctype::Aes256CtsHmacSha384 => 24,
        }
    }

    fn hmac(self, key: &[u8], parts: &[&[u8]]) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            Enctype::Aes128CtsHmacSha256 => mac::<Hmac<Sha256>>(key, parts),
            Enctype::Aes256CtsHmacSha384 => mac::<Hmac<Sha384>>(key, parts),
        }
    }
}

fn mac<M: Mac + KeyInit>(key: &[u8], parts: &[&[u8]]) -> Result<Zeroizing<Vec<u8>>> {
    let mut mac = <M as Mac>::new_from_slice(key).map_err(|_| Error::InvalidArgument)?;
    for part in parts {
        mac.update(part);
    }
    Ok(Zeroizing::new(mac.finalize().into_bytes().to_vec()))
}

/// A key and its encryption type.
#[derive(Clone, Eq, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct Keyblock {
    #[zeroize(skip)]
    enctype: Enctype,
    contents: Vec<u8>,
}

impl Keyblock {
    /// Wrap raw key bytes, checking their length against the enctype.
    pub fn new(enctype: Enctype, contents: &[u8]) -> Result<Self> {
        if contents.len() != enctype.key_len() {
            return Err(Error::InvalidArgument);
        }
        Ok(Keyblock {
            enctype,
            contents: contents.to_vec(),
        })
    }

    /// Wrap raw key bytes for an enctype number.
    pub fn from_id(enctype: i32, contents: &[u8]) -> Result<Self> {
        let enctype = Enctype::from_id(enctype).ok_or(Error::UnsupportedEnctype)?;
        Self::new(enctype, contents)
    }

    /// Generate a fresh random key.
    pub fn random(enctype: Enctype, rng: &mut dyn CryptoRngCore) -> Result<Self> {
        let mut contents = Zeroizing::new(vec![0u8; enctype.key_len()]);
        rng.try_fill_bytes(&mut contents)?;
        Self::new(enctype, &contents)
    }

    /// random-to-key, the identity function for these enctypes.
    pub fn random_to_key(enctype: Enctype, seed: &[u8]) -> Result<Self> {
        Self::new(enctype, seed)
    }

    /// Encryption type.
    pub fn enctype(&self) -> Enctype {
        self.enctype
    }

    /// Raw key bytes.
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// KDF-HMAC-SHA2: the first `len` bytes of
    /// `HMAC(key, 00000001 | label | 00 | context | bits(len))`.
    fn kdf(&self, label: &[u8], context: &[u8], len: usize) -> Result<Zeroizing<Vec<u8>>> {
        let bits = ((len * 8) as u32).to_be_bytes();
        let mut out = self.enctype.hmac(
            &self.contents,
            &[&1u32.to_be_bytes(), label, &[0], context, &bits],
        )?;
        out.truncate(len);
        Ok(out)
    }

    fn usage_key(&self, usage: u32, suffix: u8, len: usize) -> Result<Zeroizing<Vec<u8>>> {
        let mut label = usage.to_be_bytes().to_vec();
        label.push(suffix);
        self.kdf(&label, &[], len)
    }

    /// Pseudo-random function of `input`.
    pub fn prf(&self, input: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.kdf(b"prf", input, self.enctype.prf_len())
    }

    /// PRF+: `PRF(1 | input) | PRF(2 | input) | ...`, truncated to `len`.
    pub fn prf_plus(&self, input: &[u8], len: usize) -> Result<Zeroizing<Vec<u8>>> {
        let prf_len = self.enctype.prf_len();
        let blocks = (len + prf_len - 1) / prf_len;
        if blocks > 255 {
            return Err(Error::InvalidArgument);
        }

        let mut out = Zeroizing::new(Vec::with_capacity(blocks * prf_len));
        let mut prefixed = Zeroizing::new(Vec::with_capacity(input.len() + 1));
        for i in 1..=blocks {
            prefixed.clear();
            prefixed.push(i as u8);
            prefixed.extend_from_slice(input);
            out.extend_from_slice(&self.prf(&prefixed)?);
        }
        out.truncate(len);
        Ok(out)
    }

    /// Encrypt `plaintext` for key usage `usage`.
    ///
    /// The output is `AES-CTS(Ke, confounder | plaintext) | HMAC(Ki, 0^16 | C)`
    /// with the tag truncated to [`Enctype::mac_len`].
    pub fn encrypt(
        &self,
        usage: u32,
        plaintext: &[u8],
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Vec<u8>> {
        let ke = self.usage_key(usage, 0xaa, self.enctype.key_len())?;
        let ki = self.usage_key(usage, 0x55, self.enctype.mac_len())?;

        let mut data = Zeroizing::new(vec![0u8; BLOCK_LEN]);
        rng.try_fill_bytes(&mut data)?;
        data.extend_from_slice(plaintext);

        let mut ciphertext = BlockCipher::new(self.enctype, &ke)?.cts_encrypt(&data);
        let tag = self
            .enctype
            .hmac(&ki, &[&[0u8; BLOCK_LEN], &ciphertext])?;
        ciphertext.extend_from_slice(&tag[..self.enctype.mac_len()]);
        Ok(ciphertext)
    }

    /// Verify and decrypt the output of [`Keyblock::encrypt`].
    pub fn decrypt(&self, usage: u32, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let mac_len = self.enctype.mac_len();
        if ciphertext.len() < BLOCK_LEN + mac_len {
            return Err(Error::Integrity);
        }
        let (body, tag) = ciphertext.split_at(ciphertext.len() - mac_len);

        let ki = self.usage_key(usage, 0x55, mac_len)?;
        let expected = self.enctype.hmac(&ki, &[&[0u8; BLOCK_LEN], body])?;
        if !bool::from(expected[..mac_len].ct_eq(tag)) {
            return Err(Error::Integrity);
        }

        let ke = self.usage_key(usage, 0xaa, self.enctype.key_len())?;
        let mut plaintext = BlockCipher::new(self.enctype, &ke)?.cts_decrypt(body);
        plaintext.drain(..BLOCK_LEN);
        Ok(plaintext)
    }
}

impl fmt::Debug for Keyblock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyblock")
            .field("enctype", &self.enctype)
            .finish_non_exhaustive()
    }
}

/// KRB-FX-CF2: combine two keys into one of `k1`'s enctype.
pub fn cf2(k1: &Keyblock, pepper1: &[u8], k2: &Keyblock, pepper2: &[u8]) -> Result<Keyblock> {
    let len = k1.enctype.key_len();
    let mut out = k1.prf_plus(pepper1, len)?;
    let other = k2.prf_plus(pepper2, len)?;
    for (a, b) in out.iter_mut().zip(other.iter()) {
        *a ^= b;
    }
    Keyblock::random_to_key(k1.enctype, &out)
}

/// Where the state machines obtain the long-term key.
pub trait KeySource {
    /// Return the long-term key shared with the peer.
    fn long_term_key(&mut self) -> Result<Keyblock>;
}

impl KeySource for Keyblock {
    fn long_term_key(&mut self) -> Result<Keyblock> {
        Ok(self.clone())
    }
}

enum BlockCipher {
    Aes128(Aes128),
    Aes256(Aes256),
}

impl BlockCipher {
    fn new(enctype: Enctype, key: &[u8]) -> Result<Self> {
        Ok(match enctype {
            Enctype::Aes128CtsHmacSha256 => {
                BlockCipher::Aes128(Aes128::new_from_slice(key).map_err(|_| Error::InvalidArgument)?)
            }
            Enctype::Aes256CtsHmacSha384 => {
                BlockCipher::Aes256(Aes256::new_from_slice(key).map_err(|_| Error::InvalidArgument)?)
            }
        })
    }

    fn encrypt_block(&self, block: &mut [u8; BLOCK_LEN]) {
        let mut b = Block::from(*block);
        match self {
            BlockCipher::Aes128(c) => c.encrypt_block(&mut b),
            BlockCipher::Aes256(c) => c.encrypt_block(&mut b),
        }
        block.copy_from_slice(&b);
    }

    fn decrypt_block(&self, block: &mut [u8; BLOCK_LEN]) {
        let mut b = Block::from(*block);
        match self {
            BlockCipher::Aes128(c) => c.decrypt_block(&mut b),
            BlockCipher::Aes256(c) => c.decrypt_block(&mut b),
        }
        block.copy_from_slice(&b);
    }

    /// CBC with ciphertext stealing (CS3) and a zero IV. `data` must be at
    /// least one block long.
    fn cts_encrypt(&self, data: &[u8]) -> Vec<u8> {
        let nblocks = (data.len() + BLOCK_LEN - 1) / BLOCK_LEN;
        let mut out = Vec::with_capacity(nblocks * BLOCK_LEN);
        let mut prev = [0u8; BLOCK_LEN];

        for chunk in data.chunks(BLOCK_LEN) {
            let mut block = prev;
            for (b, p) in block.iter_mut().zip(chunk) {
                *b ^= p;
            }
            self.encrypt_block(&mut block);
            out.extend_from_slice(&block);
            prev = block;
        }

        if nblocks > 1 {
            // Swap the final two blocks and drop the padding.
            let tail = data.len() - (nblocks - 1) * BLOCK_LEN;
            let start = (nblocks - 2) * BLOCK_LEN;
            let mut swapped = out[start + BLOCK_LEN..].to_vec();
            swapped.extend_from_slice(&out[start..start + tail]);
            out.truncate(start);
            out.extend_from_slice(&swapped);
        }
        out
    }

    fn cts_decrypt(&self, data: &[u8]) -> Zeroizing<Vec<u8>> {
        let nblocks = (data.len() + BLOCK_LEN - 1) / BLOCK_LEN;
        let mut out = Zeroizing::new(Vec::with_capacity(data.len()));
        let mut prev = [0u8; BLOCK_LEN];

        let plain_blocks = if nblocks > 1 { nblocks - 2 } else { nblocks };
        for chunk in data.chunks(BLOCK_LEN).take(plain_blocks) {
            let mut block = [0u8; BLOCK_LEN];
            block.copy_from_slice(chunk);
            let ciphertext = block;
            self.decrypt_block(&mut block);
            for (b, p) in block.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
            out.extend_from_slice(&block);
            prev = ciphertext;
        }

        if nblocks > 1 {
            let start = (nblocks - 2) * BLOCK_LEN;
            let tail = data.len() - (nblocks - 1) * BLOCK_LEN;
            let last = &data[start + BLOCK_LEN..];

            let mut z = [0u8; BLOCK_LEN];
            z.copy_from_slice(&data[start..start + BLOCK_LEN]);
            self.decrypt_block(&mut z);

            // Rebuild the stolen block from the short block and Z's tail.
            let mut stolen = z;
            stolen[..tail].copy_from_slice(last);
            let mut final_plain = [0u8; BLOCK_LEN];
            for i in 0..tail {
                final_plain[i] = z[i] ^ last[i];
            }

            let mut block = stolen;
            self.decrypt_block(&mut block);
            for (b, p) in block.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
            out.extend_from_slice(&block);
            out.extend_from_slice(&final_plain[..tail]);
            z.zeroize();
            final_plain.zeroize();
        }
        out
    }
}

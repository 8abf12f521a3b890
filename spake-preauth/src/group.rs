//! Group backend contract and group registrations.

use crate::Result;
use rand_core::CryptoRngCore;
use sha2::{Digest, Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

/// IANA group number for edwards25519.
pub const GROUP_EDWARDS25519: i32 = 1;
/// IANA group number for NIST P-256.
pub const GROUP_P256: i32 = 2;
/// IANA group number for NIST P-384.
pub const GROUP_P384: i32 = 3;
/// IANA group number for NIST P-521.
pub const GROUP_P521: i32 = 4;

/// Which side of the exchange an operation runs for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Role {
    /// The ticket-requesting client
    Client,
    /// The KDC
    Kdc,
}

impl Role {
    /// Constant this role blinds its own public element with.
    pub fn own_constant(self) -> Constant {
        match self {
            Role::Kdc => Constant::M,
            Role::Client => Constant::N,
        }
    }

    /// Constant the peer blinded its public element with.
    pub fn peer_constant(self) -> Constant {
        match self {
            Role::Kdc => Constant::N,
            Role::Client => Constant::M,
        }
    }
}

/// One of the two fixed masking elements of a group.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Constant {
    /// Used by the KDC
    M,
    /// Used by the client
    N,
}

/// Hash function bound to a group.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HashAlgorithm {
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl HashAlgorithm {
    /// Output length in bytes.
    pub fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Hash the concatenation of `parts`.
    pub fn digest(self, parts: &[&[u8]]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => digest_parts::<Sha256>(parts),
            HashAlgorithm::Sha384 => digest_parts::<Sha384>(parts),
            HashAlgorithm::Sha512 => digest_parts::<Sha512>(parts),
        }
    }
}

fn digest_parts<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = D::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

/// A freshly generated private scalar and its public element.
pub struct KeyPair {
    /// Private scalar, `scalar_len` bytes
    pub private: Zeroizing<Vec<u8>>,
    /// Public element, `element_len` bytes
    pub public: Vec<u8>,
}

/// Arithmetic backend for a single group.
///
/// Lengths are validated by the registry before a backend is called, so
/// implementations may assume every buffer matches the registration.
pub trait GroupBackend: Send + Sync {
    /// Generate a private scalar `x` and the public element
    /// `x*G + w*constant`.
    fn keygen(
        &self,
        rng: &mut dyn CryptoRngCore,
        wbytes: &[u8],
        constant: Constant,
    ) -> Result<KeyPair>;

    /// Compute `ours * (theirs - w*constant)`.
    fn result(
        &self,
        wbytes: &[u8],
        ours: &[u8],
        theirs: &[u8],
        constant: Constant,
    ) -> Result<Zeroizing<Vec<u8>>>;
}

/// Constructor for a group's runtime state.
pub type BackendInit = fn(&GroupDef) -> Result<Box<dyn GroupBackend>>;

/// Immutable registration record for a supported group.
pub struct GroupDef {
    /// IANA group number
    pub id: i32,
    /// Configuration name
    pub name: &'static str,
    /// Length of a multiplier (private scalar, w)
    pub scalar_len: usize,
    /// Length of an encoded group element
    pub element_len: usize,
    /// Hash bound to this group
    pub hash: HashAlgorithm,
    /// Encoding of the KDC masking element
    pub m: &'static [u8],
    /// Encoding of the client masking element
    pub n: &'static [u8],
    /// Builds the backend state on first use
    pub init: BackendInit,
}

impl GroupDef {
    /// Length of the group's hash output.
    pub fn hash_len(&self) -> usize {
        self.hash.output_len()
    }

    /// Encoding of the requested masking element.
    pub fn constant(&self, constant: Constant) -> &'static [u8] {
        match constant {
            Constant::M => self.m,
            Constant::N => self.n,
        }
    }
}

impl core::fmt::Debug for GroupDef {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        fmt.debug_struct("GroupDef")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

const EDWARDS25519: GroupDef = GroupDef {
    id: GROUP_EDWARDS25519,
    name: "edwards25519",
    scalar_len: 32,
    element_len: 32,
    hash: HashAlgorithm::Sha256,
    // d048032c6ea0b6d697ddc2e86bda85a33adac920f1bf18e1b0c6d166a5cecdaf
    m: &[
        0xd0, 0x48, 0x03, 0x2c, 0x6e, 0xa0, 0xb6, 0xd6, 0x97, 0xdd, 0xc2, 0xe8, 0x6b, 0xda, 0x85,
        0xa3, 0x3a, 0xda, 0xc9, 0x20, 0xf1, 0xbf, 0x18, 0xe1, 0xb0, 0xc6, 0xd1, 0x66, 0xa5, 0xce,
        0xcd, 0xaf,
    ],
    // d3bfb518f44f3430f29d0c92af503865a1ed3281dc69b35dd868ba85f886c4ab
    n: &[
        0xd3, 0xbf, 0xb5, 0x18, 0xf4, 0x4f, 0x34, 0x30, 0xf2, 0x9d, 0x0c, 0x92, 0xaf, 0x50, 0x38,
        0x65, 0xa1, 0xed, 0x32, 0x81, 0xdc, 0x69, 0xb3, 0x5d, 0xd8, 0x68, 0xba, 0x85, 0xf8, 0x86,
        0xc4, 0xab,
    ],
    init: crate::edwards25519::init,
};

#[cfg(feature = "nist")]
const P256: GroupDef = GroupDef {
    id: GROUP_P256,
    name: "P-256",
    scalar_len: 32,
    element_len: 33,
    hash: HashAlgorithm::Sha256,
    m: &[
        0x02, 0x88, 0x6e, 0x2f, 0x97, 0xac, 0xe4, 0x6e, 0x55, 0xba, 0x9d, 0xd7, 0x24, 0x25, 0x79,
        0xf2, 0x99, 0x3b, 0x64, 0xe1, 0x6e, 0xf3, 0xdc, 0xab, 0x95, 0xaf, 0xd4, 0x97, 0x33, 0x3d,
        0x8f, 0xa1, 0x2f,
    ],
    n: &[
        0x03, 0xd8, 0xbb, 0xd6, 0xc6, 0x39, 0xc6, 0x29, 0x37, 0xb0, 0x4d, 0x99, 0x7f, 0x38, 0xc3,
        0x77, 0x07, 0x19, 0xc6, 0x29, 0xd7, 0x01, 0x4d, 0x49, 0xa2, 0x4b, 0x4f, 0x98, 0xba, 0xa1,
        0x29, 0x2b, 0x49,
    ],
    init: crate::nist::init_p256,
};

#[cfg(feature = "nist")]
const P384: GroupDef = GroupDef {
    id: GROUP_P384,
    name: "P-384",
    scalar_len: 48,
    element_len: 49,
    hash: HashAlgorithm::Sha384,
    m: &[
        0x03, 0x0f, 0xf0, 0x89, 0x5a, 0xe5, 0xeb, 0xf6, 0x18, 0x70, 0x80, 0xa8, 0x2d, 0x82, 0xb4,
        0x2e, 0x27, 0x65, 0xe3, 0xb2, 0xf8, 0x74, 0x9c, 0x7e, 0x05, 0xeb, 0xa3, 0x66, 0x43, 0x4b,
        0x36, 0x3d, 0x3d, 0xc3, 0x6f, 0x15, 0x31, 0x47, 0x39, 0x07, 0x4d, 0x2e, 0xb8, 0x61, 0x3f,
        0xce, 0xec, 0x28, 0x53,
    ],
    n: &[
        0x02, 0xc7, 0x2c, 0xf2, 0xe3, 0x90, 0x85, 0x3a, 0x1c, 0x1c, 0x4a, 0xd8, 0x16, 0xa6, 0x2f,
        0xd1, 0x58, 0x24, 0xf5, 0x60, 0x78, 0x91, 0x8f, 0x43, 0xf9, 0x22, 0xca, 0x21, 0x51, 0x8f,
        0x9c, 0x54, 0x3b, 0xb2, 0x52, 0xc5, 0x49, 0x02, 0x14, 0xcf, 0x9a, 0xa3, 0xf0, 0xba, 0xab,
        0x4b, 0x66, 0x5c, 0x10,
    ],
    init: crate::nist::init_p384,
};

#[cfg(feature = "nist")]
const P521: GroupDef = GroupDef {
    id: GROUP_P521,
    name: "P-521",
    scalar_len: 66,
    element_len: 67,
    hash: HashAlgorithm::Sha512,
    m: &[
        0x02, 0x00, 0x3f, 0x06, 0xf3, 0x81, 0x31, 0xb2, 0xba, 0x26, 0x00, 0x79, 0x1e, 0x82, 0x48,
        0x8e, 0x8d, 0x20, 0xab, 0x88, 0x9a, 0xf7, 0x53, 0xa4, 0x18, 0x06, 0xc5, 0xdb, 0x18, 0xd3,
        0x7d, 0x85, 0x60, 0x8c, 0xfa, 0xe0, 0x6b, 0x82, 0xe4, 0xa7, 0x2c, 0xd7, 0x44, 0xc7, 0x19,
        0x19, 0x35, 0x62, 0xa6, 0x53, 0xea, 0x1f, 0x11, 0x9e, 0xef, 0x93, 0x56, 0x90, 0x7e, 0xdc,
        0x9b, 0x56, 0x97, 0x99, 0x62, 0xd7, 0xaa,
    ],
    n: &[
        0x02, 0x00, 0xc7, 0x92, 0x4b, 0x9e, 0xc0, 0x17, 0xf3, 0x09, 0x45, 0x62, 0x89, 0x43, 0x36,
        0xa5, 0x3c, 0x50, 0x16, 0x7b, 0xa8, 0xc5, 0x96, 0x38, 0x76, 0x88, 0x05, 0x42, 0xbc, 0x66,
        0x9e, 0x49, 0x4b, 0x25, 0x32, 0xd7, 0x6c, 0x5b, 0x53, 0xdf, 0xb3, 0x49, 0xfd, 0xf6, 0x91,
        0x54, 0xb9, 0xe0, 0x04, 0x8c, 0x58, 0xa4, 0x2e, 0x8e, 0xd0, 0x4c, 0xef, 0x05, 0x2a, 0x3b,
        0xc3, 0x49, 0xd9, 0x55, 0x75, 0xcd, 0x25,
    ],
    init: crate::nist::init_p521,
};

#[cfg(feature = "nist")]
static GROUPS: &[GroupDef] = &[EDWARDS25519, P256, P384, P521];

#[cfg(not(feature = "nist"))]
static GROUPS: &[GroupDef] = &[EDWARDS25519];

/// Every group compiled into this build.
pub fn all_groups() -> &'static [GroupDef] {
    GROUPS
}

/// Look up a registration by group number.
pub fn find_by_id(id: i32) -> Option<&'static GroupDef> {
    GROUPS.iter().find(|def| def.id == id)
}

/// Look up a registration by configuration name (ASCII case-insensitive).
pub fn find_by_name(name: &str) -> Option<&'static GroupDef> {
    GROUPS.iter().find(|def| def.name.eq_ignore_ascii_case(name))
}

//! Error types.

use core::fmt;

/// [`Result`][`core::result::Result`] type with `spake-preauth`'s [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur while configuring or running a SPAKE exchange.
///
/// Anything a peer could observe is reported by the state machines as
/// [`Error::PreauthFailed`]; the finer-grained variants only surface from
/// the lower layers (registry, codecs, key handling) and in local traces.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// A buffer had the wrong length for its role, or the group is unknown
    InvalidArgument,

    /// A received group element does not decode to a curve point
    InvalidEncoding,

    /// Generic pre-authentication failure
    PreauthFailed,

    /// The permitted group list resolved to nothing
    NoPermittedGroups,

    /// The optimistic challenge group is not in the permitted list
    ChallengeGroupNotPermitted,

    /// Reserved extension point (second factors, encrypted data rounds)
    Unsupported,

    /// The long-term key could not be obtained
    KeyUnavailable,

    /// The long-term key has an encryption type this crate cannot use
    UnsupportedEnctype,

    /// Authenticated decryption failed
    Integrity,

    /// A PA-SPAKE message could not be encoded or decoded
    Decode,

    /// A round-trip cookie is malformed or has the wrong version
    Cookie,

    /// The random number generator failed
    Random,
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument => fmt.write_str("invalid argument"),
            Error::InvalidEncoding => fmt.write_str("invalid group element encoding"),
            Error::PreauthFailed => fmt.write_str("pre-authentication failed"),
            Error::NoPermittedGroups => fmt.write_str("no SPAKE groups are permitted"),
            Error::ChallengeGroupNotPermitted => {
                fmt.write_str("SPAKE challenge group is not a permitted group")
            }
            Error::Unsupported => fmt.write_str("operation not supported"),
            Error::KeyUnavailable => fmt.write_str("long-term key unavailable"),
            Error::UnsupportedEnctype => fmt.write_str("unsupported encryption type"),
            Error::Integrity => fmt.write_str("integrity check failed"),
            Error::Decode => fmt.write_str("malformed PA-SPAKE message"),
            Error::Cookie => fmt.write_str("malformed SPAKE cookie"),
            Error::Random => fmt.write_str("random number generator failure"),
        }
    }
}

impl std::error::Error for Error {}

impl From<rand_core::Error> for Error {
    fn from(_: rand_core::Error) -> Self {
        Error::Random
    }
}

impl From<postcard::Error> for Error {
    fn from(_: postcard::Error) -> Self {
        Error::Decode
    }
}

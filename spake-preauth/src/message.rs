//! PA-SPAKE messages and the pre-authentication data envelope.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Pre-authentication type number for SPAKE.
pub const PA_SPAKE: i32 = 151;

/// Second-factor type meaning "no second factor".
pub const SF_NONE: i32 = 1;

/// Key usage for the encrypted factor field.
pub const KEY_USAGE_SPAKE: u32 = 65;

/// A second-factor offer or response.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SecondFactor {
    /// Factor type
    pub factor_type: i32,
    /// Factor-specific data
    pub data: Option<Vec<u8>>,
}

impl SecondFactor {
    /// The "no second factor" entry.
    pub fn none() -> Self {
        SecondFactor {
            factor_type: SF_NONE,
            data: None,
        }
    }

    /// Encode with the crate's codec.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Decode a complete factor; trailing bytes are an error.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_exact(bytes)
    }
}

/// Ciphertext tagged with the key that produced it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EncryptedData {
    /// Enctype number
    pub etype: i32,
    /// Key version number, if any
    pub kvno: Option<u32>,
    /// Ciphertext
    pub cipher: Vec<u8>,
}

/// A PA-SPAKE message.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PaSpake {
    /// Groups the client supports, in preference order
    Support {
        /// Group numbers
        groups: Vec<i32>,
    },
    /// The KDC's public element and factor offers
    Challenge {
        /// Chosen group
        group: i32,
        /// KDC public element
        pubkey: Vec<u8>,
        /// Second factors the client may use
        factors: Vec<SecondFactor>,
    },
    /// The client's public element and chosen factor
    Response {
        /// Client public element
        pubkey: Vec<u8>,
        /// Encrypted [`SecondFactor`]
        factor: EncryptedData,
    },
    /// Further second-factor rounds (not implemented)
    EncData(EncryptedData),
}

impl PaSpake {
    /// Encode with the crate's codec.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Decode a complete message; trailing bytes are an error.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_exact(bytes)
    }

    /// Message name for traces.
    pub fn name(&self) -> &'static str {
        match self {
            PaSpake::Support { .. } => "support",
            PaSpake::Challenge { .. } => "challenge",
            PaSpake::Response { .. } => "response",
            PaSpake::EncData(_) => "encdata",
        }
    }
}

fn decode_exact<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    let (value, rest) = postcard::take_from_bytes(bytes)?;
    if !rest.is_empty() {
        return Err(Error::Decode);
    }
    Ok(value)
}

/// One element of the outer protocol's pre-authentication data list.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PaData {
    /// Pre-authentication type
    pub pa_type: i32,
    /// Encoded message, empty to advertise the mechanism
    pub contents: Vec<u8>,
}

impl PaData {
    /// An empty PA-SPAKE element, advertising support for the mechanism.
    pub fn advertisement() -> Self {
        PaData {
            pa_type: PA_SPAKE,
            contents: Vec::new(),
        }
    }
}

/// Move an encoded message into a single-element PA-SPAKE list.
pub fn wrap_message(contents: Vec<u8>) -> Vec<PaData> {
    vec![PaData {
        pa_type: PA_SPAKE,
        contents,
    }]
}

/// Take the encoded message back out of a list built by [`wrap_message`].
pub fn unwrap_message(padata: Vec<PaData>) -> Result<Vec<u8>> {
    let mut elements = padata.into_iter();
    match (elements.next(), elements.next()) {
        (Some(element), None) if element.pa_type == PA_SPAKE => Ok(element.contents),
        _ => Err(Error::InvalidArgument),
    }
}

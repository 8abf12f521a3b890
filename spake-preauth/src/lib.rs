#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/RustCrypto/meta/master/logo.svg",
    html_favicon_url = "https://raw.githubusercontent.com/RustCrypto/meta/master/logo.svg"
)]
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

//! # Protocol description
//!
//! The client and the KDC share a long-term key `K`. From it both derive a
//! scalar `w = PRF+(K, "SPAKEsecret" | group)` and run SPAKE in the chosen
//! group `G` with masking constants `M` (KDC) and `N` (client):
//!
//! |       KDC                       |   Data transfer       |      Client                     |
//! |---------------------------------|-----------------------|---------------------------------|
//! |                                 | <- `Support{groups}`  |                                 |
//! |`x = ${1..l}`                    |                       |                                 |
//! |`T = x*G + w*M`                  | `Challenge{g,T}` ->   |                                 |
//! |                                 |                       |`y = ${1..l}`                    |
//! |                                 |                       |`S = y*G + w*N`                  |
//! |                                 |                       |`K' = y*(T - w*M)`               |
//! |                                 | <- `Response{S,E}`    |`E = Enc(key1, "no factor")`     |
//! |`K' = x*(S - w*N)`               |                       |                                 |
//! |verify `E` with `key1`           |                       |                                 |
//! |reply with `key0`                |                       |reply key `key0`                 |
//!
//! `keyN` is derived from `w`, `K'`, the transcript hash of the exchanged
//! messages, the encoded request body and `N`, then combined with `K`
//! through KRB-FX-CF2.
//!
//! # Usage
//!
//! Each side resolves its [`SpakeConfig`] into a [`GroupRegistry`] once and
//! shares it between exchanges. The KDC stores no per-client state: the
//! cookie returned with each challenge must be protected by the caller and
//! handed back to [`SpakeKdc::exchange`] on the next round.
//!
//! ```
//! # fn main() -> spake_preauth::Result<()> {
//! use spake_preauth::{
//!     ClientReply, Enctype, GroupRegistry, KdcReply, Keyblock, OsRng, Role, SpakeClient,
//!     SpakeConfig, SpakeKdc,
//! };
//!
//! let mut key = Keyblock::new(Enctype::Aes256CtsHmacSha384, &[7; 32])?;
//! let request = b"encoded request body";
//!
//! let kdc_config = SpakeConfig::default().with_groups(["edwards25519"]);
//! let kdc_groups = GroupRegistry::new(Role::Kdc, &kdc_config)?;
//! let kdc = SpakeKdc::new(&kdc_groups, &kdc_config);
//!
//! let client_groups = GroupRegistry::new(Role::Client, &SpakeConfig::default())?;
//! let mut client = SpakeClient::new(&client_groups);
//!
//! // KDC advertises, client answers with the groups it supports.
//! let ad = kdc.exchange(None).advertise(&mut key, &mut OsRng)?;
//! let ClientReply::Send(support) = client.process(&ad.padata[0], request, &mut key, &mut OsRng)? else {
//!     unreachable!()
//! };
//!
//! // KDC challenges and hands back a cookie for the next round.
//! let KdcReply::Challenge { padata: challenge, cookie } =
//!     kdc.exchange(None).process(&support[0], request, &mut key, &mut OsRng)?
//! else {
//!     unreachable!()
//! };
//!
//! let ClientReply::Respond { padata: response, reply_key } =
//!     client.process(&challenge[0], request, &mut key, &mut OsRng)?
//! else {
//!     unreachable!()
//! };
//!
//! let KdcReply::Verified { reply_key: kdc_key, .. } =
//!     kdc.exchange(Some(cookie.as_slice())).process(&response[0], request, &mut key, &mut OsRng)?
//! else {
//!     unreachable!()
//! };
//! assert_eq!(reply_key, kdc_key);
//! client.finish()?;
//! # Ok(())
//! # }
//! ```

mod edwards25519;
#[cfg(feature = "nist")]
mod nist;

pub mod client;
pub mod config;
pub mod cookie;
pub mod enctype;
pub mod error;
pub mod group;
pub mod kdc;
pub mod message;
pub mod registry;
pub mod util;

pub use self::{
    client::{ClientReply, ClientState, SpakeClient},
    config::SpakeConfig,
    cookie::Cookie,
    enctype::{Enctype, KeySource, Keyblock},
    error::{Error, Result},
    group::{Role, GROUP_EDWARDS25519, GROUP_P256, GROUP_P384, GROUP_P521},
    kdc::{Advertisement, KdcExchange, KdcReply, KdcState, SpakeKdc},
    message::{PaData, PaSpake, SecondFactor, PA_SPAKE, SF_NONE},
    registry::GroupRegistry,
};

pub use rand_core;

#[cfg(feature = "getrandom")]
#[cfg_attr(docsrs, doc(cfg(feature = "getrandom")))]
pub use rand_core::OsRng;

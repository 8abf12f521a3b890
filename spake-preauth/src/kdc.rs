//! KDC side of the exchange.
//!
//! The KDC keeps no state between rounds. Everything it needs to verify a
//! response travels in a [`Cookie`] handed to the caller with each
//! challenge; the caller must protect it and pass it back on the next round.
//!
//! Any failure is reported as [`Error::PreauthFailed`]. The cause is only
//! traced, so a client cannot tell a wrong password from a malformed message.

use crate::{
    cookie::Cookie,
    config::SpakeConfig,
    enctype::{KeySource, Keyblock},
    group::Role,
    message::{
        wrap_message, EncryptedData, PaData, PaSpake, SecondFactor, KEY_USAGE_SPAKE, PA_SPAKE,
        SF_NONE,
    },
    registry::GroupRegistry,
    util::{derive_key, derive_w, update_thash},
    Error, Result,
};
use core::fmt;
use rand_core::CryptoRngCore;
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

/// Progress of one KDC round.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KdcState {
    /// No challenge outstanding
    Idle,
    /// A challenge was sent and its cookie is held by the caller
    ChallengeSent,
    /// The client's response decrypted to an acceptable factor
    ResponseVerified,
    /// Reply key derived
    Done,
    /// The exchange cannot continue
    Failed,
}

/// Long-lived KDC settings shared by every exchange.
#[derive(Debug)]
pub struct SpakeKdc<'r> {
    registry: &'r GroupRegistry,
    indicators: Vec<String>,
}

/// The mechanism advertisement sent with a pre-authentication hint.
pub struct Advertisement {
    /// Elements to send
    pub padata: Vec<PaData>,
    /// Cookie to store when an optimistic challenge was sent
    pub cookie: Option<Zeroizing<Vec<u8>>>,
}

/// Outcome of processing a client message.
pub enum KdcReply {
    /// Send a challenge and keep `cookie` for the next round
    Challenge {
        /// Elements to send
        padata: Vec<PaData>,
        /// Serialized round-trip state
        cookie: Zeroizing<Vec<u8>>,
    },
    /// The client proved knowledge of the long-term key
    Verified {
        /// Key to encrypt the reply with
        reply_key: Keyblock,
        /// Authentication indicators to add to the ticket
        indicators: Vec<String>,
    },
}

impl<'r> SpakeKdc<'r> {
    /// KDC for the groups permitted by `registry`, granting the indicators
    /// listed in `config`.
    pub fn new(registry: &'r GroupRegistry, config: &SpakeConfig) -> Self {
        SpakeKdc {
            registry,
            indicators: config.auth_indicators.clone(),
        }
    }

    /// Start a round, resuming from the cookie the caller stored after the
    /// previous round, if any.
    pub fn exchange(&self, cookie: Option<&[u8]>) -> KdcExchange<'_, 'r> {
        let state = match cookie {
            Some(_) => KdcState::ChallengeSent,
            None => KdcState::Idle,
        };
        KdcExchange {
            kdc: self,
            state,
            cookie: cookie.map(|bytes| Zeroizing::new(bytes.to_vec())),
        }
    }

    /// Build a challenge for `group`, folding `support` into the transcript.
    fn challenge(
        &self,
        group: i32,
        support: &[u8],
        keys: &mut impl KeySource,
        rng: &mut impl CryptoRngCore,
    ) -> Result<(Vec<PaData>, Zeroizing<Vec<u8>>)> {
        let registry = self.registry;
        let ikey = keys.long_term_key()?;
        let w = derive_w(registry, &ikey, group)?;
        let pair = registry.keygen(rng, Role::Kdc, group, &w)?;

        let challenge = PaSpake::Challenge {
            group,
            pubkey: pair.public,
            factors: vec![SecondFactor::none()],
        }
        .encode()?;

        let mut thash = Vec::new();
        update_thash(registry, group, &mut thash, support, &challenge)?;

        let cookie = Cookie {
            stage: 0,
            group,
            value: pair.private.to_vec(),
            thash,
        }
        .to_bytes()?;

        debug!(group, "sending SPAKE challenge");
        Ok((wrap_message(challenge), cookie))
    }
}

/// One round of a KDC exchange.
pub struct KdcExchange<'k, 'r> {
    kdc: &'k SpakeKdc<'r>,
    state: KdcState,
    cookie: Option<Zeroizing<Vec<u8>>>,
}

impl fmt::Debug for KdcExchange<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KdcExchange")
            .field("state", &self.state)
            .field("has_cookie", &self.cookie.is_some())
            .finish_non_exhaustive()
    }
}

impl<'k, 'r> KdcExchange<'k, 'r> {
    /// Current state.
    pub fn state(&self) -> KdcState {
        self.state
    }

    /// Advertise the mechanism.
    ///
    /// With an optimistic challenge group configured this sends a challenge
    /// straight away. If that challenge cannot be built, a bare
    /// advertisement is sent instead.
    pub fn advertise(
        &mut self,
        keys: &mut impl KeySource,
        rng: &mut impl CryptoRngCore,
    ) -> Result<Advertisement> {
        if let Some(group) = self.kdc.registry.challenge_group() {
            match self.kdc.challenge(group, &[], keys, rng) {
                Ok((padata, cookie)) => {
                    self.state = KdcState::ChallengeSent;
                    return Ok(Advertisement {
                        padata,
                        cookie: Some(cookie),
                    });
                }
                Err(err) => warn!(%err, group, "cannot send optimistic challenge"),
            }
        }
        Ok(Advertisement {
            padata: vec![PaData::advertisement()],
            cookie: None,
        })
    }

    /// Handle one PA-SPAKE element from the client.
    ///
    /// `request` is the encoded request body the derived keys are bound to.
    pub fn process(
        &mut self,
        padata: &PaData,
        request: &[u8],
        keys: &mut impl KeySource,
        rng: &mut impl CryptoRngCore,
    ) -> Result<KdcReply> {
        match self.step(padata, request, keys, rng) {
            Ok(reply) => Ok(reply),
            Err(err) => {
                debug!(%err, state = ?self.state, "rejecting SPAKE pre-authentication");
                self.state = KdcState::Failed;
                Err(Error::PreauthFailed)
            }
        }
    }

    fn step(
        &mut self,
        padata: &PaData,
        request: &[u8],
        keys: &mut impl KeySource,
        rng: &mut impl CryptoRngCore,
    ) -> Result<KdcReply> {
        if !matches!(self.state, KdcState::Idle | KdcState::ChallengeSent) {
            return Err(Error::PreauthFailed);
        }
        if padata.pa_type != PA_SPAKE || padata.contents.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let message = PaSpake::decode(&padata.contents)?;
        trace!(message = message.name(), "received PA-SPAKE message");

        match message {
            PaSpake::Support { groups } => {
                let group = self.kdc.registry.select(&groups).ok_or_else(|| {
                    debug!(?groups, "no mutually permitted SPAKE group");
                    Error::PreauthFailed
                })?;
                let (padata, cookie) = self.kdc.challenge(group, &padata.contents, keys, rng)?;
                self.state = KdcState::ChallengeSent;
                Ok(KdcReply::Challenge { padata, cookie })
            }
            PaSpake::Response { pubkey, factor } => {
                self.response(&pubkey, &factor, request, keys)
            }
            PaSpake::EncData(_) => Err(Error::Unsupported),
            PaSpake::Challenge { .. } => Err(Error::PreauthFailed),
        }
    }

    fn response(
        &mut self,
        client_pubkey: &[u8],
        factor: &EncryptedData,
        request: &[u8],
        keys: &mut impl KeySource,
    ) -> Result<KdcReply> {
        let registry = self.kdc.registry;
        let bytes = self.cookie.as_ref().ok_or(Error::Cookie)?;
        let mut cookie = Cookie::from_bytes(bytes)?;
        if cookie.stage != 0 || !registry.is_permitted(cookie.group) {
            return Err(Error::Cookie);
        }
        let group = cookie.group;

        update_thash(registry, group, &mut cookie.thash, client_pubkey, &[])?;

        let ikey = keys.long_term_key()?;
        let w = derive_w(registry, &ikey, group)?;
        let shared = registry.result(Role::Kdc, group, &w, &cookie.value, client_pubkey)?;

        let factor_key = derive_key(registry, group, &ikey, &w, &shared, &cookie.thash, request, 1)?;
        if factor.etype != factor_key.enctype().id() {
            return Err(Error::UnsupportedEnctype);
        }
        let plaintext = factor_key
            .decrypt(KEY_USAGE_SPAKE, &factor.cipher)
            .map_err(|_| Error::PreauthFailed)?;
        let factor = SecondFactor::decode(&plaintext)?;
        if factor.factor_type != SF_NONE {
            debug!(factor_type = factor.factor_type, "unsupported second factor");
            return Err(Error::PreauthFailed);
        }
        self.state = KdcState::ResponseVerified;

        let reply_key = derive_key(registry, group, &ikey, &w, &shared, &cookie.thash, request, 0)?;
        debug!(group, thash = %hex::encode(&cookie.thash), "verified SPAKE response");
        self.state = KdcState::Done;
        Ok(KdcReply::Verified {
            reply_key,
            indicators: self.kdc.indicators.clone(),
        })
    }
}

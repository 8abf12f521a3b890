//! Client side of the exchange.
//!
//! A client answers a KDC advertisement with the groups it supports, and a
//! challenge with its own public element and an encrypted "no second factor"
//! response. The reply key is derived as soon as the response is built.
//!
//! ```text
//! Init ─▶ SupportSent ─▶ ChallengeReceived ─▶ ResponseSent ─▶ Done
//!   └───────────────────────▲
//!        (optimistic challenge)
//! ```

use crate::{
    enctype::{KeySource, Keyblock},
    group::Role,
    message::{EncryptedData, PaData, PaSpake, SecondFactor, KEY_USAGE_SPAKE, PA_SPAKE, SF_NONE},
    registry::GroupRegistry,
    util::{derive_key, derive_w, update_thash},
    Error, Result,
};
use rand_core::CryptoRngCore;
use tracing::{debug, trace, warn};

/// Progress of a client exchange.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClientState {
    /// Nothing sent or received
    Init,
    /// Support message sent, waiting for a challenge
    SupportSent,
    /// Challenge accepted, response being built
    ChallengeReceived,
    /// Response sent, reply key installed
    ResponseSent,
    /// Outer reply decrypted with the derived key
    Done,
    /// The exchange cannot continue
    Failed,
}

/// What the client wants the outer protocol to do next.
#[derive(Debug)]
pub enum ClientReply {
    /// No questions to ask; let the outer protocol try something else
    Decline,
    /// Send these pre-authentication elements
    Send(Vec<PaData>),
    /// Send the response and use `reply_key` for the outer reply
    Respond {
        /// Response elements
        padata: Vec<PaData>,
        /// Key the KDC will encrypt its reply with
        reply_key: Keyblock,
    },
}

/// One client exchange.
#[derive(Debug)]
pub struct SpakeClient<'r> {
    registry: &'r GroupRegistry,
    state: ClientState,
    support: Option<Vec<u8>>,
    decoded_any: bool,
    fallback_disabled: bool,
}

impl<'r> SpakeClient<'r> {
    /// Start an exchange using the groups permitted by `registry`.
    pub fn new(registry: &'r GroupRegistry) -> Self {
        SpakeClient {
            registry,
            state: ClientState::Init,
            support: None,
            decoded_any: false,
            fallback_disabled: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Whether the outer protocol must stop offering unauthenticated
    /// fallbacks. Set once a response has been sent.
    pub fn fallback_disabled(&self) -> bool {
        self.fallback_disabled
    }

    /// Handle one PA-SPAKE element from the KDC.
    ///
    /// `request` is the encoded request body the derived keys are bound to.
    /// Errors leave the exchange in [`ClientState::Failed`].
    pub fn process(
        &mut self,
        padata: &PaData,
        request: &[u8],
        keys: &mut impl KeySource,
        rng: &mut impl CryptoRngCore,
    ) -> Result<ClientReply> {
        let reply = self.step(padata, request, keys, rng);
        if let Err(err) = &reply {
            debug!(%err, state = ?self.state, "SPAKE client exchange failed");
            self.state = ClientState::Failed;
        }
        reply
    }

    /// Mark the exchange complete once the outer reply decrypted.
    pub fn finish(&mut self) -> Result<()> {
        if self.state != ClientState::ResponseSent {
            return Err(Error::PreauthFailed);
        }
        self.state = ClientState::Done;
        Ok(())
    }

    fn step(
        &mut self,
        padata: &PaData,
        request: &[u8],
        keys: &mut impl KeySource,
        rng: &mut impl CryptoRngCore,
    ) -> Result<ClientReply> {
        if matches!(self.state, ClientState::Done | ClientState::Failed) {
            return Err(Error::PreauthFailed);
        }
        if padata.pa_type != PA_SPAKE {
            return Err(Error::InvalidArgument);
        }

        if padata.contents.is_empty() {
            // Bare advertisement.
            return match self.support {
                None => self.send_support(),
                Some(_) => Err(Error::PreauthFailed),
            };
        }

        let message = match PaSpake::decode(&padata.contents) {
            Ok(message) => message,
            Err(_) if !self.decoded_any => {
                debug!("ignoring undecodable PA-SPAKE message");
                return Ok(ClientReply::Decline);
            }
            Err(_) => return Err(Error::PreauthFailed),
        };
        self.decoded_any = true;
        trace!(message = message.name(), "received PA-SPAKE message");

        match message {
            PaSpake::Challenge {
                group,
                pubkey,
                factors,
            } => {
                if !matches!(self.state, ClientState::Init | ClientState::SupportSent) {
                    return Err(Error::PreauthFailed);
                }
                self.challenge(group, &pubkey, &factors, &padata.contents, request, keys, rng)
            }
            PaSpake::EncData(_) if self.state == ClientState::ResponseSent => {
                Err(Error::Unsupported)
            }
            _ => Err(Error::PreauthFailed),
        }
    }

    fn send_support(&mut self) -> Result<ClientReply> {
        let groups = self.registry.permitted().to_vec();
        debug!(?groups, "sending SPAKE support");
        let encoded = PaSpake::Support { groups }.encode()?;
        self.support = Some(encoded.clone());
        self.state = ClientState::SupportSent;
        Ok(ClientReply::Send(vec![PaData {
            pa_type: PA_SPAKE,
            contents: encoded,
        }]))
    }

    #[allow(clippy::too_many_arguments)]
    fn challenge(
        &mut self,
        group: i32,
        kdc_pubkey: &[u8],
        factors: &[SecondFactor],
        challenge_bytes: &[u8],
        request: &[u8],
        keys: &mut impl KeySource,
        rng: &mut impl CryptoRngCore,
    ) -> Result<ClientReply> {
        if !self.registry.is_permitted(group) {
            if self.support.is_none() {
                debug!(group, "challenge uses a group we do not permit; sending support");
                return self.send_support();
            }
            warn!(group, "KDC chose a group we do not permit");
            return Err(Error::PreauthFailed);
        }
        if !factors.iter().any(|factor| factor.factor_type == SF_NONE) {
            debug!("challenge does not offer the empty second factor");
            return Err(Error::PreauthFailed);
        }
        self.state = ClientState::ChallengeReceived;

        let ikey = keys.long_term_key()?;
        let registry = self.registry;

        let mut thash = Vec::new();
        let support = self.support.as_deref().unwrap_or_default();
        update_thash(registry, group, &mut thash, support, challenge_bytes)?;

        let w = derive_w(registry, &ikey, group)?;
        let pair = registry.keygen(rng, Role::Client, group, &w)?;
        let shared = registry
            .result(Role::Client, group, &w, &pair.private, kdc_pubkey)
            .map_err(|err| match err {
                Error::InvalidEncoding => Error::PreauthFailed,
                other => other,
            })?;
        update_thash(registry, group, &mut thash, &pair.public, &[])?;

        let reply_key = derive_key(registry, group, &ikey, &w, &shared, &thash, request, 0)?;
        let factor_key = derive_key(registry, group, &ikey, &w, &shared, &thash, request, 1)?;

        let factor = SecondFactor::none().encode()?;
        let response = PaSpake::Response {
            pubkey: pair.public.clone(),
            factor: EncryptedData {
                etype: factor_key.enctype().id(),
                kvno: None,
                cipher: factor_key.encrypt(KEY_USAGE_SPAKE, &factor, rng)?,
            },
        };

        debug!(group, thash = %hex::encode(&thash), "sending SPAKE response");
        self.state = ClientState::ResponseSent;
        self.fallback_disabled = true;
        Ok(ClientReply::Respond {
            padata: vec![PaData {
                pa_type: PA_SPAKE,
                contents: response.encode()?,
            }],
            reply_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SpakeConfig, enctype::Enctype, group::GROUP_EDWARDS25519};
    use rand_core::OsRng;

    fn registry() -> GroupRegistry {
        GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap()
    }

    fn key() -> Keyblock {
        Keyblock::new(Enctype::Aes128CtsHmacSha256, &[0x42; 16]).unwrap()
    }

    fn spake(message: PaSpake) -> PaData {
        PaData {
            pa_type: PA_SPAKE,
            contents: message.encode().unwrap(),
        }
    }

    #[test]
    fn test_advertisement_gets_support() {
        let registry = registry();
        let mut client = SpakeClient::new(&registry);
        let reply = client
            .process(&PaData::advertisement(), b"req", &mut key(), &mut OsRng)
            .unwrap();
        let ClientReply::Send(padata) = reply else {
            panic!("expected support");
        };
        assert_eq!(
            PaSpake::decode(&padata[0].contents).unwrap(),
            PaSpake::Support {
                groups: vec![GROUP_EDWARDS25519]
            }
        );
        assert_eq!(client.state(), ClientState::SupportSent);

        // A second bare advertisement is not answered twice.
        let err = client.process(&PaData::advertisement(), b"req", &mut key(), &mut OsRng);
        assert_eq!(err.err(), Some(Error::PreauthFailed));
        assert_eq!(client.state(), ClientState::Failed);
    }

    #[test]
    fn test_garbage_first_message_is_declined() {
        let registry = registry();
        let mut client = SpakeClient::new(&registry);
        let garbage = PaData {
            pa_type: PA_SPAKE,
            contents: vec![0xff, 0xff, 0xff],
        };
        let reply = client.process(&garbage, b"", &mut key(), &mut OsRng).unwrap();
        assert!(matches!(reply, ClientReply::Decline));
        assert_eq!(client.state(), ClientState::Init);
    }

    #[test]
    fn test_unpermitted_optimistic_challenge_gets_support() {
        let registry = registry();
        let mut client = SpakeClient::new(&registry);
        let challenge = spake(PaSpake::Challenge {
            group: 2,
            pubkey: vec![0; 33],
            factors: vec![SecondFactor::none()],
        });
        let reply = client.process(&challenge, b"", &mut key(), &mut OsRng).unwrap();
        assert!(matches!(reply, ClientReply::Send(_)));

        // Same answer again is fatal.
        let err = client.process(&challenge, b"", &mut key(), &mut OsRng).err();
        assert_eq!(err, Some(Error::PreauthFailed));
    }

    #[test]
    fn test_challenge_without_empty_factor() {
        let registry = registry();
        let mut client = SpakeClient::new(&registry);
        let challenge = spake(PaSpake::Challenge {
            group: GROUP_EDWARDS25519,
            pubkey: vec![0; 32],
            factors: vec![SecondFactor {
                factor_type: 7,
                data: None,
            }],
        });
        let err = client.process(&challenge, b"", &mut key(), &mut OsRng).err();
        assert_eq!(err, Some(Error::PreauthFailed));
    }

    #[test]
    fn test_bad_kdc_element_is_a_generic_failure() {
        let registry = registry();
        let mut client = SpakeClient::new(&registry);
        // y = 2 is not on the curve
        let mut pubkey = vec![0u8; 32];
        pubkey[0] = 2;
        let challenge = spake(PaSpake::Challenge {
            group: GROUP_EDWARDS25519,
            pubkey,
            factors: vec![SecondFactor::none()],
        });
        let err = client.process(&challenge, b"", &mut key(), &mut OsRng).err();
        assert_eq!(err, Some(Error::PreauthFailed));
        assert!(!client.fallback_disabled());
    }

    #[test]
    fn test_encdata_before_response_fails() {
        let registry = registry();
        let encdata = spake(PaSpake::EncData(EncryptedData {
            etype: 19,
            kvno: None,
            cipher: vec![1; 40],
        }));

        let mut client = SpakeClient::new(&registry);
        let err = client.process(&encdata, b"", &mut key(), &mut OsRng).err();
        assert_eq!(err, Some(Error::PreauthFailed));
    }

    #[test]
    fn test_finish_requires_response() {
        let registry = registry();
        let mut client = SpakeClient::new(&registry);
        assert_eq!(client.finish().err(), Some(Error::PreauthFailed));
    }

    #[test]
    fn test_other_pa_types_are_rejected() {
        let registry = registry();
        let mut client = SpakeClient::new(&registry);
        let other = PaData {
            pa_type: 2,
            contents: vec![],
        };
        let err = client.process(&other, b"", &mut key(), &mut OsRng).err();
        assert_eq!(err, Some(Error::InvalidArgument));
    }
}

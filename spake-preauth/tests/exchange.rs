#![cfg(feature = "getrandom")]

use spake_preauth::{
    message::{EncryptedData, KEY_USAGE_SPAKE},
    util::{derive_key, derive_w, update_thash},
    ClientReply, ClientState, Cookie, Enctype, Error, GroupRegistry, KdcReply, KdcState, KeySource,
    Keyblock, OsRng, PaData, PaSpake, Role, SecondFactor, SpakeClient, SpakeConfig, SpakeKdc,
    GROUP_EDWARDS25519,
};

const REQUEST: &[u8] = b"encoded KDC-REQ-BODY";

fn key() -> Keyblock {
    Keyblock::new(Enctype::Aes256CtsHmacSha384, &[0x5a; 32]).unwrap()
}

fn kdc_config() -> SpakeConfig {
    SpakeConfig::default().with_groups(["edwards25519"])
}

fn expect_send(reply: ClientReply) -> Vec<PaData> {
    match reply {
        ClientReply::Send(padata) => padata,
        other => panic!("expected padata to send, got {:?}", other),
    }
}

fn expect_challenge(reply: KdcReply) -> (Vec<PaData>, Vec<u8>) {
    match reply {
        KdcReply::Challenge { padata, cookie } => (padata, cookie.to_vec()),
        KdcReply::Verified { .. } => panic!("expected a challenge"),
    }
}

fn expect_respond(reply: ClientReply) -> (Vec<PaData>, Keyblock) {
    match reply {
        ClientReply::Respond { padata, reply_key } => (padata, reply_key),
        other => panic!("expected a response, got {:?}", other),
    }
}

/// Run advertisement, support and challenge; return the client, the
/// response and the cookie the KDC stored.
fn challenge_round<'r>(
    kdc: &SpakeKdc<'_>,
    client_registry: &'r GroupRegistry,
    client_key: &mut Keyblock,
) -> (SpakeClient<'r>, Vec<PaData>, Keyblock, Vec<u8>) {
    let mut kdc_key = key();
    let mut client = SpakeClient::new(client_registry);

    let ad = kdc.exchange(None).advertise(&mut kdc_key, &mut OsRng).unwrap();
    assert!(ad.cookie.is_none());
    let support = expect_send(
        client
            .process(&ad.padata[0], REQUEST, client_key, &mut OsRng)
            .unwrap(),
    );

    let reply = kdc
        .exchange(None)
        .process(&support[0], REQUEST, &mut kdc_key, &mut OsRng)
        .unwrap();
    let (challenge, cookie) = expect_challenge(reply);

    let (response, reply_key) = expect_respond(
        client
            .process(&challenge[0], REQUEST, client_key, &mut OsRng)
            .unwrap(),
    );
    (client, response, reply_key, cookie)
}

#[test]
fn test_full_exchange() {
    let config = kdc_config().with_auth_indicator("spake");
    let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
    let kdc = SpakeKdc::new(&kdc_registry, &config);
    let client_registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();

    let (mut client, response, client_reply_key, cookie) =
        challenge_round(&kdc, &client_registry, &mut key());
    assert_eq!(client.state(), ClientState::ResponseSent);
    assert!(client.fallback_disabled());

    let mut round = kdc.exchange(Some(&cookie[..]));
    assert_eq!(round.state(), KdcState::ChallengeSent);
    let reply = round
        .process(&response[0], REQUEST, &mut key(), &mut OsRng)
        .unwrap();
    assert_eq!(round.state(), KdcState::Done);

    match reply {
        KdcReply::Verified {
            reply_key,
            indicators,
        } => {
            assert_eq!(reply_key, client_reply_key);
            assert_eq!(reply_key.enctype(), Enctype::Aes256CtsHmacSha384);
            assert_ne!(reply_key, key());
            assert_eq!(indicators, ["spake"]);
        }
        KdcReply::Challenge { .. } => panic!("expected verification"),
    }

    client.finish().unwrap();
    assert_eq!(client.state(), ClientState::Done);
}

#[test]
fn test_aes128_key() {
    let config = kdc_config();
    let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
    let kdc = SpakeKdc::new(&kdc_registry, &config);
    let client_registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();

    let mut aes128 = Keyblock::new(Enctype::Aes128CtsHmacSha256, &[9; 16]).unwrap();
    let mut client = SpakeClient::new(&client_registry);
    let support = expect_send(
        client
            .process(&PaData::advertisement(), REQUEST, &mut aes128, &mut OsRng)
            .unwrap(),
    );
    let (challenge, cookie) = expect_challenge(
        kdc.exchange(None)
            .process(&support[0], REQUEST, &mut aes128, &mut OsRng)
            .unwrap(),
    );
    let (response, client_key) = expect_respond(
        client
            .process(&challenge[0], REQUEST, &mut aes128, &mut OsRng)
            .unwrap(),
    );
    let reply = kdc
        .exchange(Some(&cookie[..]))
        .process(&response[0], REQUEST, &mut aes128, &mut OsRng)
        .unwrap();
    let KdcReply::Verified { reply_key, .. } = reply else {
        panic!("expected verification");
    };
    assert_eq!(reply_key, client_key);
    assert_eq!(reply_key.contents().len(), 16);
}

#[test]
fn test_wrong_client_key() {
    let config = kdc_config();
    let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
    let kdc = SpakeKdc::new(&kdc_registry, &config);
    let client_registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();

    let mut wrong = Keyblock::new(Enctype::Aes256CtsHmacSha384, &[0xa5; 32]).unwrap();
    let (_, response, _, cookie) = challenge_round(&kdc, &client_registry, &mut wrong);

    let mut round = kdc.exchange(Some(&cookie[..]));
    let err = round
        .process(&response[0], REQUEST, &mut key(), &mut OsRng)
        .err();
    assert_eq!(err, Some(Error::PreauthFailed));
    assert_eq!(round.state(), KdcState::Failed);
}

#[test]
fn test_response_is_bound_to_request() {
    let config = kdc_config();
    let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
    let kdc = SpakeKdc::new(&kdc_registry, &config);
    let client_registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();

    let (_, response, _, cookie) = challenge_round(&kdc, &client_registry, &mut key());
    let err = kdc
        .exchange(Some(&cookie[..]))
        .process(&response[0], b"another request", &mut key(), &mut OsRng)
        .err();
    assert_eq!(err, Some(Error::PreauthFailed));
}

#[test]
fn test_tampered_cookie() {
    let config = kdc_config();
    let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
    let kdc = SpakeKdc::new(&kdc_registry, &config);
    let client_registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();

    let (_, response, _, cookie) = challenge_round(&kdc, &client_registry, &mut key());

    let mut parsed = Cookie::from_bytes(&cookie).unwrap();
    parsed.thash[0] ^= 1;
    let tampered = parsed.to_bytes().unwrap();
    let err = kdc
        .exchange(Some(&tampered[..]))
        .process(&response[0], REQUEST, &mut key(), &mut OsRng)
        .err();
    assert_eq!(err, Some(Error::PreauthFailed));

    let mut newer = cookie.clone();
    newer[1] = 2;
    let err = kdc
        .exchange(Some(&newer[..]))
        .process(&response[0], REQUEST, &mut key(), &mut OsRng)
        .err();
    assert_eq!(err, Some(Error::PreauthFailed));
}

#[test]
fn test_optimistic_challenge() {
    let config = kdc_config().with_challenge_group("edwards25519");
    let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
    let kdc = SpakeKdc::new(&kdc_registry, &config);
    let client_registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();

    let ad = kdc.exchange(None).advertise(&mut key(), &mut OsRng).unwrap();
    let cookie = ad.cookie.expect("optimistic challenge cookie");

    let mut client = SpakeClient::new(&client_registry);
    let (response, client_key) = expect_respond(
        client
            .process(&ad.padata[0], REQUEST, &mut key(), &mut OsRng)
            .unwrap(),
    );

    let reply = kdc
        .exchange(Some(&cookie[..]))
        .process(&response[0], REQUEST, &mut key(), &mut OsRng)
        .unwrap();
    let KdcReply::Verified { reply_key, .. } = reply else {
        panic!("expected verification");
    };
    assert_eq!(reply_key, client_key);
}

/// Scenario B: a response that decrypts fine but names a second factor
/// other than "none" is rejected.
#[test]
fn test_unknown_second_factor() {
    let config = kdc_config();
    let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
    let kdc = SpakeKdc::new(&kdc_registry, &config);
    let client_registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();

    let support = PaSpake::Support {
        groups: vec![GROUP_EDWARDS25519],
    }
    .encode()
    .unwrap();
    let (challenge, cookie) = expect_challenge(
        kdc.exchange(None)
            .process(
                &PaData {
                    pa_type: spake_preauth::PA_SPAKE,
                    contents: support.clone(),
                },
                REQUEST,
                &mut key(),
                &mut OsRng,
            )
            .unwrap(),
    );
    let PaSpake::Challenge { group, pubkey, .. } = PaSpake::decode(&challenge[0].contents).unwrap()
    else {
        panic!("expected a challenge");
    };

    let response = |factor: SecondFactor| {
        let registry = &client_registry;
        let mut thash = Vec::new();
        update_thash(registry, group, &mut thash, &support, &challenge[0].contents).unwrap();
        let w = derive_w(registry, &key(), group).unwrap();
        let pair = registry.keygen(&mut OsRng, Role::Client, group, &w).unwrap();
        let shared = registry
            .result(Role::Client, group, &w, &pair.private, &pubkey)
            .unwrap();
        update_thash(registry, group, &mut thash, &pair.public, &[]).unwrap();
        let k1 = derive_key(registry, group, &key(), &w, &shared, &thash, REQUEST, 1).unwrap();
        let cipher = k1
            .encrypt(KEY_USAGE_SPAKE, &factor.encode().unwrap(), &mut OsRng)
            .unwrap();
        PaData {
            pa_type: spake_preauth::PA_SPAKE,
            contents: PaSpake::Response {
                pubkey: pair.public.clone(),
                factor: EncryptedData {
                    etype: k1.enctype().id(),
                    kvno: None,
                    cipher,
                },
            }
            .encode()
            .unwrap(),
        }
    };

    // A hand-built response with the empty factor is accepted...
    let ok = kdc
        .exchange(Some(&cookie[..]))
        .process(&response(SecondFactor::none()), REQUEST, &mut key(), &mut OsRng);
    assert!(matches!(ok, Ok(KdcReply::Verified { .. })));

    // ...but any other factor type is not.
    let other = SecondFactor {
        factor_type: 2,
        data: Some(b"otp".to_vec()),
    };
    let err = kdc
        .exchange(Some(&cookie[..]))
        .process(&response(other), REQUEST, &mut key(), &mut OsRng)
        .err();
    assert_eq!(err, Some(Error::PreauthFailed));
}

/// Scenario C: no mutually permitted group.
#[test]
fn test_no_common_group() {
    let config = kdc_config();
    let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
    let kdc = SpakeKdc::new(&kdc_registry, &config);

    let support = PaData {
        pa_type: spake_preauth::PA_SPAKE,
        contents: PaSpake::Support { groups: vec![3, 4] }.encode().unwrap(),
    };
    let mut round = kdc.exchange(None);
    let err = round.process(&support, REQUEST, &mut key(), &mut OsRng).err();
    assert_eq!(err, Some(Error::PreauthFailed));
    assert_eq!(round.state(), KdcState::Failed);
}

#[test]
fn test_encdata_after_response_is_unsupported() {
    let config = kdc_config();
    let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
    let kdc = SpakeKdc::new(&kdc_registry, &config);
    let client_registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();

    let (mut client, _, _, _) = challenge_round(&kdc, &client_registry, &mut key());
    let encdata = PaData {
        pa_type: spake_preauth::PA_SPAKE,
        contents: PaSpake::EncData(EncryptedData {
            etype: 20,
            kvno: None,
            cipher: vec![0; 48],
        })
        .encode()
        .unwrap(),
    };
    let err = client
        .process(&encdata, REQUEST, &mut key(), &mut OsRng)
        .err();
    assert_eq!(err, Some(Error::Unsupported));
    assert_eq!(client.state(), ClientState::Failed);
}

#[test]
fn test_decode_failure_after_challenge_is_fatal() {
    let config = kdc_config();
    let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
    let kdc = SpakeKdc::new(&kdc_registry, &config);
    let client_registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();

    let (mut client, _, _, _) = challenge_round(&kdc, &client_registry, &mut key());
    let garbage = PaData {
        pa_type: spake_preauth::PA_SPAKE,
        contents: vec![0xff; 4],
    };
    let err = client
        .process(&garbage, REQUEST, &mut key(), &mut OsRng)
        .err();
    assert_eq!(err, Some(Error::PreauthFailed));
}

struct NoKey;

impl KeySource for NoKey {
    fn long_term_key(&mut self) -> spake_preauth::Result<Keyblock> {
        Err(Error::KeyUnavailable)
    }
}

#[test]
fn test_missing_client_key() {
    let config = kdc_config();
    let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
    let kdc = SpakeKdc::new(&kdc_registry, &config);
    let client_registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();

    let mut client = SpakeClient::new(&client_registry);
    let support = expect_send(
        client
            .process(&PaData::advertisement(), REQUEST, &mut NoKey, &mut OsRng)
            .unwrap(),
    );
    let (challenge, _) = expect_challenge(
        kdc.exchange(None)
            .process(&support[0], REQUEST, &mut key(), &mut OsRng)
            .unwrap(),
    );
    let err = client
        .process(&challenge[0], REQUEST, &mut NoKey, &mut OsRng)
        .err();
    assert_eq!(err, Some(Error::KeyUnavailable));
    assert!(!client.fallback_disabled());
}

#[test]
fn test_missing_kdc_key_falls_back_to_advertisement() {
    let config = kdc_config().with_challenge_group("edwards25519");
    let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
    let kdc = SpakeKdc::new(&kdc_registry, &config);

    let mut round = kdc.exchange(None);
    let ad = round.advertise(&mut NoKey, &mut OsRng).unwrap();
    assert_eq!(ad.padata, vec![PaData::advertisement()]);
    assert!(ad.cookie.is_none());
    assert_eq!(round.state(), KdcState::Idle);
}

#[cfg(feature = "nist")]
mod nist {
    use super::*;

    fn run(group_name: &str) {
        let config = SpakeConfig::default().with_groups([group_name]);
        let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
        let kdc = SpakeKdc::new(&kdc_registry, &config);
        let client_registry = GroupRegistry::new(Role::Client, &config).unwrap();

        let (_, response, client_key, cookie) = challenge_round(&kdc, &client_registry, &mut key());
        let reply = kdc
            .exchange(Some(&cookie[..]))
            .process(&response[0], REQUEST, &mut key(), &mut OsRng)
            .unwrap();
        let KdcReply::Verified { reply_key, .. } = reply else {
            panic!("expected verification");
        };
        assert_eq!(reply_key, client_key);
    }

    #[test]
    fn test_p256_exchange() {
        run("P-256");
    }

    #[test]
    fn test_p384_exchange() {
        run("P-384");
    }

    #[test]
    fn test_p521_exchange() {
        run("P-521");
    }

    /// The KDC challenges optimistically with a group the client does not
    /// permit; the client answers with support once and the exchange
    /// continues in the group they share.
    #[test]
    fn test_retry_after_unpermitted_optimistic_challenge() {
        let config = SpakeConfig::default()
            .with_groups(["P-256", "edwards25519"])
            .with_challenge_group("P-256");
        let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
        let kdc = SpakeKdc::new(&kdc_registry, &config);
        let client_registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();

        let mut round = kdc.exchange(None);
        let ad = round.advertise(&mut key(), &mut OsRng).unwrap();
        let first_cookie = ad.cookie.expect("optimistic challenge cookie");

        let mut client = SpakeClient::new(&client_registry);
        let support = expect_send(
            client
                .process(&ad.padata[0], REQUEST, &mut key(), &mut OsRng)
                .unwrap(),
        );
        assert_eq!(
            PaSpake::decode(&support[0].contents).unwrap(),
            PaSpake::Support {
                groups: vec![GROUP_EDWARDS25519]
            }
        );

        let (challenge, cookie) = expect_challenge(
            kdc.exchange(Some(&first_cookie[..]))
                .process(&support[0], REQUEST, &mut key(), &mut OsRng)
                .unwrap(),
        );
        assert_eq!(Cookie::from_bytes(&cookie).unwrap().group, GROUP_EDWARDS25519);

        let (response, client_key) = expect_respond(
            client
                .process(&challenge[0], REQUEST, &mut key(), &mut OsRng)
                .unwrap(),
        );
        let reply = kdc
            .exchange(Some(&cookie[..]))
            .process(&response[0], REQUEST, &mut key(), &mut OsRng)
            .unwrap();
        let KdcReply::Verified { reply_key, .. } = reply else {
            panic!("expected verification");
        };
        assert_eq!(reply_key, client_key);
    }
}

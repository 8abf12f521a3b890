use bencher::Bencher;
use bencher::{benchmark_group, benchmark_main};
use spake_preauth::{
    util::derive_key, ClientReply, Enctype, GroupRegistry, KdcReply, Keyblock, OsRng, PaData,
    Role, SpakeClient, SpakeConfig, SpakeKdc, GROUP_EDWARDS25519,
};

fn key() -> Keyblock {
    Keyblock::new(Enctype::Aes256CtsHmacSha384, &[1; 32]).unwrap()
}

fn edwards25519_keygen(bench: &mut Bencher) {
    let registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();
    let w = [7u8; 32];
    bench.iter(|| {
        registry
            .keygen(&mut OsRng, Role::Client, GROUP_EDWARDS25519, &w)
            .unwrap()
    })
}

fn edwards25519_result(bench: &mut Bencher) {
    let registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();
    let w = [7u8; 32];
    let kdc = registry
        .keygen(&mut OsRng, Role::Kdc, GROUP_EDWARDS25519, &w)
        .unwrap();
    let client = registry
        .keygen(&mut OsRng, Role::Client, GROUP_EDWARDS25519, &w)
        .unwrap();
    bench.iter(|| {
        registry
            .result(Role::Client, GROUP_EDWARDS25519, &w, &client.private, &kdc.public)
            .unwrap()
    })
}

fn key_derivation(bench: &mut Bencher) {
    let registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();
    let ikey = key();
    bench.iter(|| {
        derive_key(
            &registry,
            GROUP_EDWARDS25519,
            &ikey,
            &[1; 32],
            &[2; 32],
            &[3; 32],
            b"request",
            0,
        )
        .unwrap()
    })
}

fn full_exchange(bench: &mut Bencher) {
    let config = SpakeConfig::default().with_groups(["edwards25519"]);
    let kdc_registry = GroupRegistry::new(Role::Kdc, &config).unwrap();
    let kdc = SpakeKdc::new(&kdc_registry, &config);
    let client_registry = GroupRegistry::new(Role::Client, &SpakeConfig::default()).unwrap();
    let mut key = key();

    bench.iter(|| {
        let mut client = SpakeClient::new(&client_registry);
        let ClientReply::Send(support) = client
            .process(&PaData::advertisement(), b"req", &mut key, &mut OsRng)
            .unwrap()
        else {
            unreachable!()
        };
        let Ok(KdcReply::Challenge { padata, cookie }) =
            kdc.exchange(None).process(&support[0], b"req", &mut key, &mut OsRng)
        else {
            unreachable!()
        };
        let ClientReply::Respond { padata: response, .. } = client
            .process(&padata[0], b"req", &mut key, &mut OsRng)
            .unwrap()
        else {
            unreachable!()
        };
        kdc.exchange(Some(&cookie[..]))
            .process(&response[0], b"req", &mut key, &mut OsRng)
            .is_ok()
    })
}

benchmark_group!(
    benches,
    edwards25519_keygen,
    edwards25519_result,
    key_derivation,
    full_exchange
);
benchmark_main!(benches);

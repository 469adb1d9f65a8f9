//! End-to-end cosigner rounds over an in-process "network" of engines.

use rand_chacha::ChaChaRng;
use rand_core::{RngCore, SeedableRng};
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;

use cosigner::messages::{
    GetEphemeralSecretPartRequest, SetEphemeralSecretPartRequest, SignRequest,
};
use cosigner::vote::{HrstKey, Vote};
use cosigner::{curve, shamir, threshold, Cosigner, CosignerKey, CosignerPeer, Error, LocalCosigner};

const SECOND_NS: i64 = 1_000_000_000;

struct Network {
    cosigners: Vec<LocalCosigner>,
    rsa_keys: Vec<RsaPrivateKey>,
    group_public: [u8; 32],
    _dirs: Vec<tempfile::TempDir>,
}

/// Provision an (n, t) cosigner set with deterministic key material.
fn network(total: u8, threshold: u8, seed: u64) -> Network {
    // Use a deterministic RNG so that test failures can be reproduced.
    let mut rng = ChaChaRng::seed_from_u64(seed);

    let mut signing_key = [0u8; 32];
    rng.fill_bytes(&mut signing_key);
    let group_public = curve::scalar_multiply_base(&signing_key);
    let key_shares = shamir::deal_shares(&signing_key, threshold, total, &mut rng).unwrap();

    let rsa_keys: Vec<RsaPrivateKey> = (0..total)
        .map(|_| RsaPrivateKey::new(&mut rng, 1024).unwrap())
        .collect();
    let peers: Vec<CosignerPeer> = rsa_keys
        .iter()
        .enumerate()
        .map(|(index, key)| CosignerPeer {
            id: index as u8 + 1,
            public_key: key.to_public_key(),
        })
        .collect();

    let mut cosigners = Vec::with_capacity(total as usize);
    let mut dirs = Vec::with_capacity(total as usize);
    for index in 0..total as usize {
        let dir = tempfile::tempdir().unwrap();
        let key = CosignerKey {
            id: index as u8 + 1,
            share_key: key_shares[index],
            group_public,
        };
        cosigners.push(
            LocalCosigner::new(
                key,
                rsa_keys[index].clone(),
                peers.clone(),
                threshold,
                dir.path().join("sign_state.json"),
            )
            .unwrap(),
        );
        dirs.push(dir);
    }

    Network {
        cosigners,
        rsa_keys,
        group_public,
        _dirs: dirs,
    }
}

fn vote(height: i64, round: i64, step: u8, timestamp: i64) -> Vote {
    Vote {
        height,
        round,
        step,
        block_id: vec![0xab; 32],
        chain_id: "test-chain".into(),
        timestamp,
    }
}

fn get_request(hrst: HrstKey, id: u8) -> GetEphemeralSecretPartRequest {
    GetEphemeralSecretPartRequest {
        height: hrst.height,
        round: hrst.round,
        step: hrst.step,
        timestamp: hrst.timestamp,
        id,
    }
}

/// Run the full share exchange for one round: every cosigner requests every
/// other cosigner's share-part and delivers it to itself.
fn exchange(net: &Network, hrst: HrstKey) {
    for receiver in &net.cosigners {
        for sender in &net.cosigners {
            if sender.id() == receiver.id() {
                continue;
            }
            let part = sender
                .get_ephemeral_secret_part(&get_request(hrst, receiver.id()))
                .unwrap();
            receiver
                .set_ephemeral_secret_part(&SetEphemeralSecretPartRequest::from((part, hrst)))
                .unwrap();
        }
    }
}

/// Complete a round: exchange shares, collect every cosigner's partial
/// signature, combine, and verify against the group key.
fn sign_round(net: &Network, vote: &Vote) -> Vec<cosigner::messages::SignResponse> {
    let hrst = vote.hrst();
    exchange(net, hrst);

    let request = SignRequest {
        sign_bytes: vote.sign_bytes().unwrap(),
    };
    let responses: Vec<_> = net
        .cosigners
        .iter()
        .map(|c| c.sign(&request).unwrap())
        .collect();

    let ids: Vec<u8> = net.cosigners.iter().map(|c| c.id()).collect();
    let fragments: Vec<[u8; 64]> = responses
        .iter()
        .map(|r| r.signature.as_slice().try_into().unwrap())
        .collect();
    let combined = threshold::combine_signatures(&ids, &fragments).unwrap();
    threshold::verify(&vote.sign_bytes().unwrap(), &net.group_public, &combined).unwrap();

    responses
}

#[test]
fn replay_of_an_identical_request_is_idempotent() {
    let net = network(2, 2, 0x01);
    let vote = vote(10, 0, 2, SECOND_NS);

    let responses = sign_round(&net, &vote);

    let state_before = net.cosigners[0].last_sign_state();
    let replay = net.cosigners[0]
        .sign(&SignRequest {
            sign_bytes: vote.sign_bytes().unwrap(),
        })
        .unwrap();

    assert_eq!(replay, responses[0]);
    assert_eq!(net.cosigners[0].last_sign_state(), state_before);
}

#[test]
fn timestamp_only_rewrite_is_signed_again() {
    let net = network(2, 2, 0x02);
    let first = vote(10, 0, 2, SECOND_NS);
    let second = vote(10, 0, 2, 2 * SECOND_NS);

    let first_responses = sign_round(&net, &first);
    let second_responses = sign_round(&net, &second);

    // A fresh nonce exchange means a fresh aggregate point and signature.
    assert_ne!(first_responses[0], second_responses[0]);
    assert_eq!(
        net.cosigners[0].last_sign_state().sign_bytes,
        second.sign_bytes().unwrap()
    );
}

#[test]
fn conflicting_content_at_the_same_coordinate_is_refused() {
    let net = network(2, 2, 0x03);
    let vote = vote(10, 0, 2, SECOND_NS);
    sign_round(&net, &vote);

    let mut conflicting = vote.clone();
    conflicting.block_id = vec![0xcd; 32];
    conflicting.timestamp = 2 * SECOND_NS;

    let state_before = net.cosigners[0].last_sign_state();
    let result = net.cosigners[0].sign(&SignRequest {
        sign_bytes: conflicting.sign_bytes().unwrap(),
    });

    assert!(matches!(result, Err(Error::ConflictingData)));
    assert_eq!(net.cosigners[0].last_sign_state(), state_before);
}

#[test]
fn regression_is_refused_and_leaves_no_metadata() {
    let net = network(2, 2, 0x04);
    sign_round(&net, &vote(10, 0, 2, SECOND_NS));

    let earlier = vote(10, 0, 1, SECOND_NS);
    let result = net.cosigners[0].sign(&SignRequest {
        sign_bytes: earlier.sign_bytes().unwrap(),
    });

    assert!(matches!(result, Err(Error::Regression { .. })));
    assert!(!net.cosigners[0]
        .metadata_keys()
        .iter()
        .any(|k| k.hrs() == earlier.hrst().hrs()));
}

#[test]
fn forged_source_id_is_rejected_and_leaves_the_slot_empty() {
    let net = network(2, 2, 0x05);
    let hrst = vote(10, 0, 2, SECOND_NS).hrst();

    // Cosigner 2 signs with its own RSA key but claims to be cosigner 1.
    let mut part = net.cosigners[1]
        .get_ephemeral_secret_part(&get_request(hrst, 1))
        .unwrap();
    part.source_id = 1;

    let result = net.cosigners[0]
        .set_ephemeral_secret_part(&SetEphemeralSecretPartRequest::from((part, hrst)));
    assert!(matches!(result, Err(Error::PeerAuth(1))));

    // Nothing was stored: signing still reports the round as undealt.
    let result = net.cosigners[0].sign(&SignRequest {
        sign_bytes: vote(10, 0, 2, SECOND_NS).sign_bytes().unwrap(),
    });
    assert!(matches!(result, Err(Error::NoMetadataForHrs(_))));
}

#[test]
fn metadata_for_earlier_rounds_is_dropped_after_signing() {
    let net = network(2, 2, 0x06);

    let stale = [
        vote(5, 0, 2, SECOND_NS).hrst(),
        vote(6, 0, 2, SECOND_NS).hrst(),
    ];
    for hrst in &stale {
        net.cosigners[0].deal_shares(hrst).unwrap();
    }

    let current = vote(7, 0, 2, SECOND_NS);
    sign_round(&net, &current);

    assert_eq!(net.cosigners[0].metadata_keys(), vec![current.hrst()]);
}

#[test]
fn dealt_shares_are_reused_within_a_round() {
    let net = network(2, 2, 0x07);
    let hrst = vote(12, 0, 2, SECOND_NS).hrst();

    // Two requests for the same round must return the same underlying
    // share, even though OAEP ciphertexts differ.
    let first = net.cosigners[0]
        .get_ephemeral_secret_part(&get_request(hrst, 2))
        .unwrap();
    let second = net.cosigners[0]
        .get_ephemeral_secret_part(&get_request(hrst, 2))
        .unwrap();

    let padding = || Oaep::new::<Sha256>();
    let first_share = net.rsa_keys[1].decrypt(padding(), &first.encrypted_share_part).unwrap();
    let second_share = net.rsa_keys[1].decrypt(padding(), &second.encrypted_share_part).unwrap();
    assert_eq!(first_share, second_share);
    assert_eq!(
        first.source_ephemeral_secret_public_key,
        second.source_ephemeral_secret_public_key
    );
}

#[test]
fn envelopes_without_a_signature_are_dropped() {
    let net = network(2, 2, 0x08);
    let hrst = vote(13, 0, 2, SECOND_NS).hrst();

    let mut part = net.cosigners[1]
        .get_ephemeral_secret_part(&get_request(hrst, 1))
        .unwrap();
    part.source_sig.clear();

    let result = net.cosigners[0]
        .set_ephemeral_secret_part(&SetEphemeralSecretPartRequest::from((part, hrst)));
    assert!(matches!(result, Err(Error::MissingSignature)));
}

#[test]
fn unknown_peers_cannot_request_shares() {
    let net = network(2, 2, 0x09);
    let hrst = vote(14, 0, 2, SECOND_NS).hrst();

    let result = net.cosigners[0].get_ephemeral_secret_part(&get_request(hrst, 9));
    assert!(matches!(result, Err(Error::UnknownPeer(9))));
}

#[test]
fn signing_below_the_threshold_of_shares_is_refused() {
    let net = network(3, 3, 0x0a);
    let vote = vote(15, 0, 2, SECOND_NS);
    let hrst = vote.hrst();

    // Cosigner 1 hears from cosigner 2 only; with itself that is two of
    // the three required shares.
    let part = net.cosigners[1]
        .get_ephemeral_secret_part(&get_request(hrst, 1))
        .unwrap();
    net.cosigners[0]
        .set_ephemeral_secret_part(&SetEphemeralSecretPartRequest::from((part, hrst)))
        .unwrap();
    net.cosigners[0]
        .get_ephemeral_secret_part(&get_request(hrst, 2))
        .unwrap();

    let result = net.cosigners[0].sign(&SignRequest {
        sign_bytes: vote.sign_bytes().unwrap(),
    });
    assert!(matches!(
        result,
        Err(Error::InsufficientShares { have: 2, need: 3 })
    ));
}

#[test]
fn sign_state_survives_restart() {
    let mut rng = ChaChaRng::seed_from_u64(0x0b);
    let mut signing_key = [0u8; 32];
    rng.fill_bytes(&mut signing_key);
    let group_public = curve::scalar_multiply_base(&signing_key);
    let key_shares = shamir::deal_shares(&signing_key, 2, 2, &mut rng).unwrap();

    let rsa_keys: Vec<RsaPrivateKey> = (0..2)
        .map(|_| RsaPrivateKey::new(&mut rng, 1024).unwrap())
        .collect();
    let peers: Vec<CosignerPeer> = rsa_keys
        .iter()
        .enumerate()
        .map(|(index, key)| CosignerPeer {
            id: index as u8 + 1,
            public_key: key.to_public_key(),
        })
        .collect();

    let dir = tempfile::tempdir().unwrap();
    let dir2 = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("sign_state.json");

    let build = |path: &std::path::Path| {
        LocalCosigner::new(
            CosignerKey {
                id: 1,
                share_key: key_shares[0],
                group_public,
            },
            rsa_keys[0].clone(),
            peers.clone(),
            2,
            path,
        )
        .unwrap()
    };

    let net = Network {
        cosigners: vec![
            build(&state_path),
            LocalCosigner::new(
                CosignerKey {
                    id: 2,
                    share_key: key_shares[1],
                    group_public,
                },
                rsa_keys[1].clone(),
                peers.clone(),
                2,
                dir2.path().join("sign_state.json"),
            )
            .unwrap(),
        ],
        rsa_keys: rsa_keys.clone(),
        group_public,
        _dirs: vec![],
    };
    sign_round(&net, &vote(10, 0, 2, SECOND_NS));
    drop(net);

    // After a crash and restart, the persisted record still refuses an
    // earlier coordinate.
    let restarted = build(&state_path);
    let result = restarted.sign(&SignRequest {
        sign_bytes: vote(9, 0, 2, SECOND_NS).sign_bytes().unwrap(),
    });
    assert!(matches!(result, Err(Error::Regression { .. })));

    // And replays the persisted signature for the identical request.
    let replay = restarted
        .sign(&SignRequest {
            sign_bytes: vote(10, 0, 2, SECOND_NS).sign_bytes().unwrap(),
        })
        .unwrap();
    assert_eq!(
        replay.signature,
        restarted.last_sign_state().signature
    );
}

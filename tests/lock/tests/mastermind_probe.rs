//! Identity/evidence hash independence over the Mastermind probe world.

use sterling_evidence::runner::EpisodeWorld;
use sterling_evidence::worlds::mastermind::{
    feedback, slot, MastermindWorld, OP_MARK, OP_PROBE,
};
use sterling_kernel::carrier::bytestate::{ByteStateV1, SlotStatus};
use sterling_kernel::carrier::compile::DomainCompiler;
use sterling_kernel::operators::apply::apply;
use sterling_kernel::profile::ExecutionProfile;
use sterling_kernel::proof::hash::canonical_hash;
use sterling_kernel::proof::hash_domain::HashDomain;

fn start(world: &MastermindWorld) -> ByteStateV1 {
    world
        .compiler()
        .compile(
            &world.fixture_payload(),
            world.schema(),
            world.registry(),
            &canonical_hash(HashDomain::PolicySnapshot, b"{}"),
        )
        .unwrap()
}

#[test]
fn belief_plane_starts_all_provisional() {
    let world = MastermindWorld::new();
    let state = start(&world);
    for s in 0..4 {
        assert_eq!(state.status_at(0, s), SlotStatus::Provisional);
    }
}

#[test]
fn status_only_change_keeps_identity_hash() {
    let world = MastermindWorld::new();
    let before = start(&world);
    let (after, _) = apply(
        &before,
        OP_MARK,
        &[slot(2)],
        world.registry(),
        world.operator_set(),
        ExecutionProfile::Cert,
    )
    .unwrap();
    assert_eq!(before.identity_hash(), after.identity_hash());
    assert_ne!(before.evidence_hash(), after.evidence_hash());
}

#[test]
fn evidence_hash_moves_exactly_once_per_probe() {
    let world = MastermindWorld::new();
    let mut state = start(&world);
    let mut evidence_hashes = vec![state.evidence_hash()];
    let mut identity_hashes = vec![state.identity_hash()];

    for s in 0..4u16 {
        let (next, _) = apply(
            &state,
            OP_PROBE,
            &[slot(s), feedback(2)],
            world.registry(),
            world.operator_set(),
            ExecutionProfile::Cert,
        )
        .unwrap();
        let evidence = next.evidence_hash();
        assert!(
            !evidence_hashes.contains(&evidence),
            "probe {s}: evidence hash must move"
        );
        evidence_hashes.push(evidence);
        identity_hashes.push(next.identity_hash());
        state = next;
    }

    // Feedback writes do move identity (they land in the identity plane);
    // all five identity hashes are distinct here.
    let unique: std::collections::BTreeSet<_> =
        identity_hashes.iter().map(sterling_kernel::proof::hash::ContentHash::as_str).collect();
    assert_eq!(unique.len(), identity_hashes.len());
}

#[test]
fn replayed_probes_are_byte_identical() {
    let world = MastermindWorld::new();
    let run = || {
        let mut state = start(&world);
        let mut records = Vec::new();
        for s in 0..3u16 {
            let (next, record) = apply(
                &state,
                OP_PROBE,
                &[slot(s), feedback(1)],
                world.registry(),
                world.operator_set(),
                ExecutionProfile::Cert,
            )
            .unwrap();
            records.push(record.to_bytes());
            state = next;
        }
        (records, state.evidence_hash())
    };
    assert_eq!(run(), run());
}

//! Escape occupancy: STAGE/COMMIT move occupants; ROLLBACK restores the
//! pre-stage identity plane byte-for-byte, verified at the trace level.

use sterling_evidence::runner::EpisodeWorld;
use sterling_evidence::worlds::escape::{
    cell, occupant, EscapeWorld, OP_COMMIT, OP_ROLLBACK, OP_STAGE,
};
use sterling_kernel::carrier::bytestate::ByteStateV1;
use sterling_kernel::carrier::bytetrace::{TraceEnvelopeV1, TraceHeaderV1};
use sterling_kernel::carrier::code32::Code32;
use sterling_kernel::carrier::compile::DomainCompiler;
use sterling_kernel::carrier::trace_writer::TraceWriter;
use sterling_kernel::operators::apply::apply;
use sterling_kernel::profile::ExecutionProfile;
use sterling_kernel::proof::hash::canonical_hash;
use sterling_kernel::proof::hash_domain::HashDomain;
use sterling_kernel::proof::replay::{replay_verify, ReplayVerdict};

fn start(world: &EscapeWorld) -> ByteStateV1 {
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

fn step(world: &EscapeWorld, state: &ByteStateV1, op: Code32, args: &[Code32]) -> ByteStateV1 {
    apply(
        state,
        op,
        args,
        world.registry(),
        world.operator_set(),
        ExecutionProfile::Cert,
    )
    .unwrap()
    .0
}

#[test]
fn rollback_restores_identity_hash() {
    let world = EscapeWorld::new();
    let before = start(&world);
    let staged = step(&world, &before, OP_STAGE, &[cell(9), occupant(3)]);
    assert_ne!(before.identity_hash(), staged.identity_hash());
    let rolled_back = step(&world, &staged, OP_ROLLBACK, &[]);
    assert_eq!(before.identity_hash(), rolled_back.identity_hash());
    assert_eq!(before.identity_bytes(), rolled_back.identity_bytes());
}

#[test]
fn stage_commit_then_stage_rollback_round_trip() {
    let world = EscapeWorld::new();
    let mut state = start(&world);
    state = step(&world, &state, OP_STAGE, &[cell(4), occupant(2)]);
    state = step(&world, &state, OP_COMMIT, &[]);
    let committed_hash = state.identity_hash();
    assert_eq!(state.identity_at(0, 4), occupant(2));

    state = step(&world, &state, OP_STAGE, &[cell(12), occupant(5)]);
    state = step(&world, &state, OP_ROLLBACK, &[]);
    assert_eq!(state.identity_hash(), committed_hash);
}

#[test]
fn transactional_program_replays_byte_for_byte() {
    let world = EscapeWorld::new();
    let initial = start(&world);

    let program: Vec<(Code32, Vec<Code32>)> = vec![
        (OP_STAGE, vec![cell(4), occupant(2)]),
        (OP_STAGE, vec![cell(5), occupant(3)]),
        (OP_COMMIT, vec![]),
        (OP_STAGE, vec![cell(6), occupant(1)]),
        (OP_ROLLBACK, vec![]),
    ];

    let header = TraceHeaderV1 {
        schema_version: world.schema().schema_version.clone(),
        domain_id: "escape".into(),
        registry_digest: world.registry().digest().unwrap().as_str().to_string(),
        operator_set_digest: world
            .operator_set()
            .digest()
            .unwrap()
            .as_str()
            .to_string(),
        policy_digest: "sha256:cc".into(),
        fixture_hash: "sha256:dd".into(),
        step_count: 0,
        layer_count: 2,
        slot_count: 36,
        arg_slot_count: 2,
        index_digest: world
            .operator_set()
            .relational_index_digest()
            .unwrap()
            .map(|d| d.as_str().to_string()),
    };
    let mut writer = TraceWriter::new(
        TraceEnvelopeV1 {
            trace_id: "escape-txn".into(),
            created_at: "1970-01-01T00:00:00Z".into(),
            writer_version: "0.1.0".into(),
            wall_time_ms: 0,
        },
        header,
    )
    .unwrap();
    writer.open().unwrap();
    writer.append_initial(&initial).unwrap();

    let mut state = initial;
    for (op, args) in &program {
        let (next, record) = apply(
            &state,
            *op,
            args,
            world.registry(),
            world.operator_set(),
            ExecutionProfile::Cert,
        )
        .unwrap();
        writer.append_step(&record).unwrap();
        state = next;
    }
    let trace = writer.close(false).unwrap();
    assert_eq!(trace.header.step_count, 6);

    let verdict = replay_verify(
        &trace,
        world.registry(),
        world.operator_set(),
        ExecutionProfile::Cert,
    )
    .unwrap();
    assert!(matches!(verdict, ReplayVerdict::Match { .. }));
    // Final state: commit landed, rollback discarded the last stage.
    assert_eq!(state.identity_at(0, 4), occupant(2));
    assert_eq!(state.identity_at(0, 5), occupant(3));
    assert_eq!(state.identity_at(1, 6), Code32::PADDING);
}

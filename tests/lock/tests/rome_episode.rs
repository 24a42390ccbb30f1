//! The minimal Rome episode, end to end: compile, apply, trace, replay,
//! and byte-flip divergence localization.

use sterling_evidence::bundle::ARTIFACT_BYTETRACE;
use sterling_evidence::bundle_dir::read_bundle_dir;
use sterling_evidence::runner::{run_episode, EpisodeScorer, EpisodeWorld};
use sterling_evidence::worlds::rome::{node, RomeWorld, OP_MOVE};
use sterling_kernel::carrier::compile::DomainCompiler;
use sterling_kernel::carrier::trace_reader::bytes_to_trace;
use sterling_kernel::operators::apply::apply;
use sterling_kernel::profile::ExecutionProfile;
use sterling_kernel::proof::divergence::FrameRegion;
use sterling_kernel::proof::hash::canonical_hash;
use sterling_kernel::proof::hash_domain::HashDomain;
use sterling_kernel::proof::replay::{replay_verify, ReplayVerdict};
use sterling_search::engine::SearchTermination;
use sterling_search::policy::SearchBudgets;

fn compiled_start(world: &RomeWorld) -> sterling_kernel::carrier::bytestate::ByteStateV1 {
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
fn initial_state_and_first_move_match_the_fixture() {
    let world = RomeWorld::new();
    let state = compiled_start(&world);
    assert_eq!(state.identity_at(0, 0).to_u32_le(), 0x0000_0102);
    assert_eq!(state.identity_at(1, 0).to_u32_le(), 0x0005_0102);

    let (next, _) = apply(
        &state,
        OP_MOVE,
        &[node(3)],
        world.registry(),
        world.operator_set(),
        ExecutionProfile::Cert,
    )
    .unwrap();
    assert_eq!(next.identity_at(0, 0).to_u32_le(), 0x0003_0102);
    // Visited gains the new landmark; path appends it.
    assert_eq!(next.identity_at(2, 3), node(3));
    assert_eq!(next.identity_at(3, 1), node(3));
}

#[test]
fn pipeline_twice_yields_identical_payload_hash() {
    let run = || {
        let dir = tempfile::tempdir().unwrap();
        run_episode(
            &RomeWorld::new(),
            &EpisodeScorer::Uniform,
            &SearchBudgets::default(),
            ExecutionProfile::Cert,
            dir.path(),
        )
        .unwrap()
    };
    let first = run();
    let second = run();
    assert!(matches!(
        first.termination,
        SearchTermination::GoalFound { .. }
    ));
    assert_eq!(first.trace_payload_hash, second.trace_payload_hash);
    assert_eq!(first.tape_chain, second.tape_chain);
}

#[test]
fn flipped_identity_bit_localizes_to_step_and_slot() {
    let world = RomeWorld::new();
    let dir = tempfile::tempdir().unwrap();
    run_episode(
        &world,
        &EpisodeScorer::Uniform,
        &SearchBudgets::default(),
        ExecutionProfile::Cert,
        dir.path(),
    )
    .unwrap();

    let bundle = read_bundle_dir(dir.path()).unwrap();
    let trace_bytes = &bundle.artifacts[ARTIFACT_BYTETRACE].content;
    let mut trace = bytes_to_trace(trace_bytes).unwrap();

    // Flip bit 7 of the result identity at slot 0 of the first transition.
    trace.frames[1].result_identity[0] ^= 0x80;

    let verdict = replay_verify(
        &trace,
        world.registry(),
        world.operator_set(),
        ExecutionProfile::Cert,
    )
    .unwrap();
    match verdict {
        ReplayVerdict::Divergence { site, .. } => {
            assert_eq!(site.step, 1);
            assert_eq!(
                site.region,
                FrameRegion::Identity {
                    layer: 0,
                    slot: 0,
                    byte: 0
                }
            );
        }
        ReplayVerdict::Match { .. } => panic!("tampered trace must diverge"),
    }
}

#[test]
fn untampered_trace_replays_to_match() {
    let world = RomeWorld::new();
    let dir = tempfile::tempdir().unwrap();
    let report = run_episode(
        &world,
        &EpisodeScorer::Uniform,
        &SearchBudgets::default(),
        ExecutionProfile::Cert,
        dir.path(),
    )
    .unwrap();

    let bundle = read_bundle_dir(dir.path()).unwrap();
    let trace = bytes_to_trace(&bundle.artifacts[ARTIFACT_BYTETRACE].content).unwrap();
    let verdict = replay_verify(
        &trace,
        world.registry(),
        world.operator_set(),
        ExecutionProfile::Cert,
    )
    .unwrap();
    match verdict {
        ReplayVerdict::Match { payload_hash } => {
            assert_eq!(payload_hash, report.trace_payload_hash);
        }
        ReplayVerdict::Divergence { site, .. } => {
            panic!("clean episode diverged at {site:?}")
        }
    }
}

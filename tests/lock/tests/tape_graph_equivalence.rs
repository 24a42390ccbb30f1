//! Tape -> graph equivalence: the persisted graph must equal the graph
//! re-derived from the persisted tape, byte-for-byte over canonical JSON.

use sterling_evidence::bundle::{ARTIFACT_SEARCH_GRAPH, ARTIFACT_SEARCH_TAPE};
use sterling_evidence::bundle_dir::read_bundle_dir;
use sterling_evidence::runner::{run_episode, EpisodeScorer};
use sterling_evidence::worlds::rome::RomeWorld;
use sterling_evidence::worlds::wordnet::WordnetWorld;
use sterling_kernel::profile::ExecutionProfile;
use sterling_search::graph::derive_graph;
use sterling_search::policy::SearchBudgets;
use sterling_search::tape_reader::parse_tape;

fn assert_equivalence(world: &dyn sterling_evidence::runner::EpisodeWorld) {
    let dir = tempfile::tempdir().unwrap();
    run_episode(
        world,
        &EpisodeScorer::Uniform,
        &SearchBudgets::default(),
        ExecutionProfile::Cert,
        dir.path(),
    )
    .unwrap();

    let bundle = read_bundle_dir(dir.path()).unwrap();
    let tape = parse_tape(&bundle.artifacts[ARTIFACT_SEARCH_TAPE].content).unwrap();
    let derived = derive_graph(&tape).unwrap().to_canonical_json_bytes().unwrap();
    assert_eq!(
        derived,
        bundle.artifacts[ARTIFACT_SEARCH_GRAPH].content,
        "persisted graph must equal the tape-derived graph byte-for-byte"
    );
}

#[test]
fn rome_graph_is_tape_derived() {
    assert_equivalence(&RomeWorld::new());
}

#[test]
fn wordnet_graph_is_tape_derived() {
    assert_equivalence(&WordnetWorld::new());
}

#[test]
fn derivation_is_stable_across_reparses() {
    let dir = tempfile::tempdir().unwrap();
    run_episode(
        &RomeWorld::new(),
        &EpisodeScorer::Uniform,
        &SearchBudgets::default(),
        ExecutionProfile::Cert,
        dir.path(),
    )
    .unwrap();
    let bundle = read_bundle_dir(dir.path()).unwrap();
    let bytes = &bundle.artifacts[ARTIFACT_SEARCH_TAPE].content;
    let first = derive_graph(&parse_tape(bytes).unwrap())
        .unwrap()
        .to_canonical_json_bytes()
        .unwrap();
    for _ in 0..5 {
        let again = derive_graph(&parse_tape(bytes).unwrap())
            .unwrap()
            .to_canonical_json_bytes()
            .unwrap();
        assert_eq!(again, first);
    }
}

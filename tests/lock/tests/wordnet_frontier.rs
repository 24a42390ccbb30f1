//! Frontier-scale determinism and the advisory-scorer contract over the
//! WordNet lattice.

use std::collections::{BTreeMap, BTreeSet};

use sterling_evidence::runner::EpisodeWorld;
use sterling_evidence::worlds::wordnet::WordnetWorld;
use sterling_kernel::carrier::compile::DomainCompiler;
use sterling_kernel::profile::ExecutionProfile;
use sterling_kernel::proof::hash::canonical_hash;
use sterling_kernel::proof::hash_domain::HashDomain;
use sterling_search::engine::{run_search, SearchBindings, SearchOutcome, SearchTermination};
use sterling_search::event::TapeEventV1;
use sterling_search::policy::SearchBudgets;
use sterling_search::scorer::{TableScorer, UniformScorer, ValueScorer};
use sterling_search::tape_reader::parse_tape;

fn bindings(world: &WordnetWorld) -> SearchBindings {
    SearchBindings {
        domain_id: "wordnet".into(),
        registry_digest: world.registry().digest().unwrap().as_str().to_string(),
        operator_set_digest: world
            .operator_set()
            .digest()
            .unwrap()
            .as_str()
            .to_string(),
        policy_digest: "sha256:cc".into(),
        fixture_hash: "sha256:dd".into(),
        index_digest: world
            .operator_set()
            .relational_index_digest()
            .unwrap()
            .map(|d| d.as_str().to_string()),
    }
}

fn run(world: &WordnetWorld, scorer: &dyn ValueScorer) -> SearchOutcome {
    let initial = world
        .compiler()
        .compile(
            &world.fixture_payload(),
            world.schema(),
            world.registry(),
            &canonical_hash(HashDomain::PolicySnapshot, b"{}"),
        )
        .unwrap();
    run_search(
        initial,
        world,
        scorer,
        world.registry(),
        world.operator_set(),
        &SearchBudgets::new(100_000, 10_000),
        &bindings(world),
        ExecutionProfile::Cert,
    )
    .unwrap()
}

fn goal_state_ids(outcome: &SearchOutcome) -> BTreeSet<String> {
    parse_tape(&outcome.tape.bytes)
        .unwrap()
        .events
        .iter()
        .filter_map(|e| match e {
            TapeEventV1::GoalFound { state_id, .. } => Some(state_id.clone()),
            _ => None,
        })
        .collect()
}

fn expand_order(outcome: &SearchOutcome) -> Vec<String> {
    parse_tape(&outcome.tape.bytes)
        .unwrap()
        .events
        .iter()
        .filter_map(|e| match e {
            TapeEventV1::NodeExpand { state_id, .. } => Some(state_id.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn same_scorer_same_tape_chain() {
    let world = WordnetWorld::new();
    let first = run(&world, &UniformScorer);
    let second = run(&world, &UniformScorer);
    assert!(matches!(
        first.termination,
        SearchTermination::GoalFound { .. }
    ));
    assert_eq!(first.tape.final_chain, second.tape.final_chain);
    assert_eq!(first.tape.bytes, second.tape.bytes);
}

#[test]
fn scorer_is_advisory_only() {
    let world = WordnetWorld::new();
    let uniform = run(&world, &UniformScorer);

    // Bias a subset of edges so sibling ordering genuinely changes.
    let mut table = BTreeMap::new();
    for node in &uniform.nodes {
        if let Some(incoming) = &node.incoming {
            if incoming.args[0].local_id() % 4 == 1 {
                table.insert(incoming.table_key(), 3);
            }
        }
    }
    let digest = canonical_hash(HashDomain::BundleArtifact, b"wordnet-bias-table");
    let biased = run(&world, &TableScorer::new(table, digest));

    // Both find the goal; the goal state set is identical.
    assert!(matches!(
        uniform.termination,
        SearchTermination::GoalFound { .. }
    ));
    assert!(matches!(
        biased.termination,
        SearchTermination::GoalFound { .. }
    ));
    assert_eq!(goal_state_ids(&uniform), goal_state_ids(&biased));

    // The expansion order genuinely moved.
    assert_ne!(expand_order(&uniform), expand_order(&biased));

    // Scorer identity is visible in the header binding, so the tapes are
    // not comparable artifacts.
    let uniform_tape = parse_tape(&uniform.tape.bytes).unwrap();
    let biased_tape = parse_tape(&biased.tape.bytes).unwrap();
    assert_eq!(uniform_tape.header.scorer_digest, None);
    assert!(biased_tape.header.scorer_digest.is_some());
}

#[test]
fn expansion_budget_terminates_deterministically() {
    let world = WordnetWorld::new();
    let initial = world
        .compiler()
        .compile(
            &world.fixture_payload(),
            world.schema(),
            world.registry(),
            &canonical_hash(HashDomain::PolicySnapshot, b"{}"),
        )
        .unwrap();
    let run_budgeted = || {
        run_search(
            initial.clone(),
            &world,
            &UniformScorer,
            world.registry(),
            world.operator_set(),
            &SearchBudgets::new(100_000, 3),
            &bindings(&world),
            ExecutionProfile::Cert,
        )
        .unwrap()
    };
    let first = run_budgeted();
    let second = run_budgeted();
    assert!(matches!(
        first.termination,
        SearchTermination::BudgetExhausted { .. }
    ));
    assert_eq!(first.expansions, 3);
    assert_eq!(first.tape.final_chain, second.tape.final_chain);
}

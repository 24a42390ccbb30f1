//! Budget exhaustion: a 5-step budget on a 20-step problem closes the trace
//! after exactly 5 transitions, marks the report truncated, and stays
//! deterministic across reruns.

use lock_tests::LinearWorld;
use sterling_evidence::bundle::ARTIFACT_BYTETRACE;
use sterling_evidence::bundle_dir::read_bundle_dir;
use sterling_evidence::runner::{run_episode, EpisodeScorer};
use sterling_evidence::verify::verify_cert;
use sterling_kernel::carrier::trace_reader::bytes_to_trace;
use sterling_kernel::profile::ExecutionProfile;
use sterling_search::engine::SearchTermination;
use sterling_search::policy::{BudgetKind, SearchBudgets};

#[test]
fn step_budget_truncates_after_exactly_five_transitions() {
    let world = LinearWorld::new(20);
    let dir = tempfile::tempdir().unwrap();
    let report = run_episode(
        &world,
        &EpisodeScorer::Uniform,
        &SearchBudgets::new(5, 10_000),
        ExecutionProfile::Cert,
        dir.path(),
    )
    .unwrap();

    assert_eq!(
        report.termination,
        SearchTermination::BudgetExhausted {
            kind: BudgetKind::Step
        }
    );
    assert!(report.truncated);

    let bundle = read_bundle_dir(dir.path()).unwrap();
    verify_cert(&bundle).unwrap();

    // Trace: sentinel + exactly 5 transitions, truncated footer.
    let trace = bytes_to_trace(&bundle.artifacts[ARTIFACT_BYTETRACE].content).unwrap();
    assert_eq!(trace.header.step_count, 6);
    assert!(trace.footer.truncated);

    // Report carries the truncated flag.
    let parsed = sterling_evidence::bundle::parse_report(&bundle.report).unwrap();
    assert!(parsed.truncated);
}

#[test]
fn truncated_episode_hash_is_deterministic() {
    let run = || {
        let dir = tempfile::tempdir().unwrap();
        run_episode(
            &LinearWorld::new(20),
            &EpisodeScorer::Uniform,
            &SearchBudgets::new(5, 10_000),
            ExecutionProfile::Cert,
            dir.path(),
        )
        .unwrap()
        .trace_payload_hash
    };
    assert_eq!(run(), run());
}

#[test]
fn generous_budget_completes_the_same_problem() {
    let dir = tempfile::tempdir().unwrap();
    let report = run_episode(
        &LinearWorld::new(20),
        &EpisodeScorer::Uniform,
        &SearchBudgets::new(100, 10_000),
        ExecutionProfile::Cert,
        dir.path(),
    )
    .unwrap();
    assert!(matches!(
        report.termination,
        SearchTermination::GoalFound { .. }
    ));
    assert!(!report.truncated);

    let bundle = read_bundle_dir(dir.path()).unwrap();
    let trace = bytes_to_trace(&bundle.artifacts[ARTIFACT_BYTETRACE].content).unwrap();
    assert_eq!(trace.header.step_count, 21);
    assert!(!trace.footer.truncated);
}

#[test]
fn cancellation_truncates_like_a_budget() {
    let world = LinearWorld::new(20);
    let dir = tempfile::tempdir().unwrap();
    let budgets = SearchBudgets::new(100, 10_000);
    budgets.cancel.cancel();
    let report = run_episode(
        &world,
        &EpisodeScorer::Uniform,
        &budgets,
        ExecutionProfile::Cert,
        dir.path(),
    )
    .unwrap();
    assert_eq!(
        report.termination,
        SearchTermination::BudgetExhausted {
            kind: BudgetKind::WallClock
        }
    );
    assert!(report.truncated);
    // The bundle still verifies; a cancelled episode is evidence too.
    let bundle = read_bundle_dir(dir.path()).unwrap();
    verify_cert(&bundle).unwrap();
}

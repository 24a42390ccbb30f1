//! The episode runner: `compile -> search -> trace -> bundle`.
//!
//! One episode runs on one logical thread. The produced bundle directory is
//! self-contained: every digest a verifier needs is an artifact in it, and
//! the runner re-verifies the directory before reporting success. Under
//! `Cert` any verification failure removes the directory and surfaces as a
//! typed error; under `Dev` failures are recorded in the report and the
//! bundle is left for inspection.

use std::collections::BTreeMap;
use std::path::Path;

use sterling_kernel::carrier::bytetrace::{TraceEnvelopeV1, TraceError, TraceHeaderV1};
use sterling_kernel::carrier::compile::{CompileError, DomainCompiler};
use sterling_kernel::carrier::registry::RegistryV1;
use sterling_kernel::carrier::schema::ByteStateSchema;
use sterling_kernel::carrier::trace_writer::{trace_to_bytes, TraceWriter};
use sterling_kernel::operators::operator_registry::OperatorSetV1;
use sterling_kernel::profile::ExecutionProfile;
use sterling_kernel::proof::hash::ContentHash;
use sterling_kernel::proof::trace_hash::payload_hash;
use sterling_search::engine::{run_search, SearchBindings, SearchTermination};
use sterling_search::error::SearchError;
use sterling_search::graph::derive_graph;
use sterling_search::policy::SearchBudgets;
use sterling_search::scorer::{TableScorer, UniformScorer, ValueScorer};
use sterling_search::source::CandidateSource;
use sterling_search::tape_reader::parse_tape;

use crate::bundle::{
    build_bundle, BundleVerifyError, ARTIFACT_BYTETRACE, ARTIFACT_FIXTURE,
    ARTIFACT_OPERATOR_REGISTRY, ARTIFACT_POLICY_SNAPSHOT, ARTIFACT_REGISTRY_SNAPSHOT,
    ARTIFACT_SCHEMA_BUNDLE, ARTIFACT_SCORER_DESCRIPTOR, ARTIFACT_SEARCH_GRAPH,
    ARTIFACT_SEARCH_TAPE,
};
use crate::bundle_dir::{write_bundle_dir, BundleDirError};
use crate::fixture::{FixtureError, FixtureV1};
use crate::policy::{PolicyError, PolicySnapshotV1};
use crate::verify::{audit, verify_cert};

/// A world the runner can drive end-to-end.
pub trait EpisodeWorld: CandidateSource {
    fn schema(&self) -> &ByteStateSchema;
    fn registry(&self) -> &RegistryV1;
    fn operator_set(&self) -> &OperatorSetV1;
    fn compiler(&self) -> &dyn DomainCompiler;
    /// The domain payload this episode compiles from.
    fn fixture_payload(&self) -> Vec<u8>;
}

/// Scorer selection. The runner owns digest computation so a table scorer's
/// binding always matches its persisted descriptor.
#[derive(Debug, Clone)]
pub enum EpisodeScorer {
    Uniform,
    Table(BTreeMap<String, i64>),
}

/// What an episode produced.
#[derive(Debug)]
pub struct EpisodeReport {
    pub termination: SearchTermination,
    pub truncated: bool,
    pub trace_payload_hash: ContentHash,
    pub tape_chain: [u8; 32],
    /// Dev-mode verification findings (always empty under Cert).
    pub recorded_faults: Vec<BundleVerifyError>,
}

/// Typed episode failure.
#[derive(Debug)]
pub enum EpisodeError {
    Compile(CompileError),
    Fixture(FixtureError),
    Policy(PolicyError),
    Search(SearchError),
    Trace(TraceError),
    Bundle(BundleVerifyError),
    Dir(BundleDirError),
    /// World-provided artifacts failed to canonicalize.
    World { detail: String },
}

impl std::fmt::Display for EpisodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compile(e) => write!(f, "compile: {e}"),
            Self::Fixture(e) => write!(f, "fixture: {e}"),
            Self::Policy(e) => write!(f, "policy: {e}"),
            Self::Search(e) => write!(f, "search: {e}"),
            Self::Trace(e) => write!(f, "trace: {e}"),
            Self::Bundle(e) => write!(f, "bundle: {e}"),
            Self::Dir(e) => write!(f, "bundle dir: {e}"),
            Self::World { detail } => write!(f, "world: {detail}"),
        }
    }
}

impl std::error::Error for EpisodeError {}

/// Run one episode and persist its bundle under `out_dir`.
///
/// # Errors
///
/// Returns [`EpisodeError`] on any stage failure. Under `Cert`, a bundle that
/// fails verification is deleted before the error is returned.
#[allow(clippy::too_many_lines)]
pub fn run_episode(
    world: &dyn EpisodeWorld,
    scorer: &EpisodeScorer,
    budgets: &SearchBudgets,
    profile: ExecutionProfile,
    out_dir: &Path,
) -> Result<EpisodeReport, EpisodeError> {
    let schema = world.schema();
    let registry = world.registry();
    let operator_set = world.operator_set();

    // Snapshots and digests.
    let registry_bytes = registry
        .canonical_bytes()
        .map_err(|e| EpisodeError::World {
            detail: format!("registry: {e}"),
        })?;
    let registry_digest = registry.digest().map_err(|e| EpisodeError::World {
        detail: format!("registry digest: {e}"),
    })?;
    let operator_bytes = operator_set
        .canonical_bytes()
        .map_err(|e| EpisodeError::World {
            detail: format!("operator set: {e}"),
        })?;
    let operator_digest = operator_set.digest().map_err(|e| EpisodeError::World {
        detail: format!("operator set digest: {e}"),
    })?;
    let index_digest = operator_set
        .relational_index_digest()
        .map_err(|e| EpisodeError::World {
            detail: format!("index digest: {e}"),
        })?
        .map(|d| d.as_str().to_string());
    let schema_bytes = schema.canonical_bytes().map_err(|e| EpisodeError::World {
        detail: format!("schema: {e}"),
    })?;

    let policy = PolicySnapshotV1::build(budgets, profile).map_err(EpisodeError::Policy)?;
    let policy_digest = policy.digest();

    let payload = world.fixture_payload();
    let fixture = FixtureV1::build(world.domain_id(), &payload).map_err(EpisodeError::Fixture)?;
    let fixture_digest = fixture.digest();

    // Scorer: digest bound to the persisted descriptor.
    let (scorer_impl, scorer_descriptor): (Box<dyn ValueScorer>, Option<Vec<u8>>) = match scorer {
        EpisodeScorer::Uniform => (Box::new(UniformScorer), None),
        EpisodeScorer::Table(table) => {
            let table_scorer = TableScorer::new(
                table.clone(),
                crate::bundle::artifact_hash(b""), // placeholder, replaced below
            );
            let descriptor = table_scorer
                .descriptor_bytes()
                .map_err(|e| EpisodeError::World {
                    detail: format!("scorer descriptor: {e}"),
                })?;
            let digest = crate::bundle::artifact_hash(&descriptor);
            (
                Box::new(TableScorer::new(table.clone(), digest)),
                Some(descriptor),
            )
        }
    };

    // Compile.
    let initial = world
        .compiler()
        .compile(&payload, schema, registry, &policy_digest)
        .map_err(EpisodeError::Compile)?;

    // Search.
    let bindings = SearchBindings {
        domain_id: schema.domain_id.clone(),
        registry_digest: registry_digest.as_str().to_string(),
        operator_set_digest: operator_digest.as_str().to_string(),
        policy_digest: policy_digest.as_str().to_string(),
        fixture_hash: fixture_digest.as_str().to_string(),
        index_digest: index_digest.clone(),
    };
    let outcome = run_search(
        initial.clone(),
        world,
        scorer_impl.as_ref(),
        registry,
        operator_set,
        budgets,
        &bindings,
        profile,
    )
    .map_err(EpisodeError::Search)?;
    let truncated = matches!(outcome.termination, SearchTermination::BudgetExhausted { .. });

    // Trace: the principal path as a linear, replayable record.
    let arg_slot_count = operator_set
        .iter()
        .map(|(_, def)| def.arg_slot_count)
        .max()
        .unwrap_or(0);
    let header = TraceHeaderV1 {
        schema_version: schema.schema_version.clone(),
        domain_id: schema.domain_id.clone(),
        registry_digest: registry_digest.as_str().to_string(),
        operator_set_digest: operator_digest.as_str().to_string(),
        policy_digest: policy_digest.as_str().to_string(),
        fixture_hash: fixture_digest.as_str().to_string(),
        step_count: 0,
        layer_count: schema.layer_count,
        slot_count: schema.slot_count,
        arg_slot_count,
        index_digest,
    };
    let envelope = TraceEnvelopeV1 {
        trace_id: fixture_digest.as_str().to_string(),
        created_at: "1970-01-01T00:00:00Z".into(),
        writer_version: env!("CARGO_PKG_VERSION").into(),
        wall_time_ms: 0,
    };
    let mut writer = TraceWriter::new(envelope, header).map_err(EpisodeError::Trace)?;
    writer.open().map_err(EpisodeError::Trace)?;
    writer.append_initial(&initial).map_err(EpisodeError::Trace)?;
    for node_id in outcome.principal_path().into_iter().skip(1) {
        let node = &outcome.nodes[usize::try_from(node_id).unwrap_or(usize::MAX)];
        let record = node.step_record.as_ref().ok_or_else(|| EpisodeError::World {
            detail: format!("node {node_id} on the principal path has no step record"),
        })?;
        writer.append_step(record).map_err(EpisodeError::Trace)?;
    }
    let trace = writer.close(truncated).map_err(EpisodeError::Trace)?;
    let trace_bytes = trace_to_bytes(&trace).map_err(EpisodeError::Trace)?;
    let trace_payload_hash = payload_hash(&trace).map_err(EpisodeError::Trace)?;

    // Graph: re-derive from the sealed tape bytes, not from engine state.
    let parsed_tape = parse_tape(&outcome.tape.bytes).map_err(|e| EpisodeError::World {
        detail: format!("freshly written tape failed to parse: {e}"),
    })?;
    let graph = derive_graph(&parsed_tape).map_err(|e| EpisodeError::World {
        detail: format!("graph derivation: {e}"),
    })?;
    let graph_bytes = graph
        .to_canonical_json_bytes()
        .map_err(|e| EpisodeError::World {
            detail: format!("graph serialization: {e}"),
        })?;

    // Bundle.
    let mut artifacts = vec![
        (ARTIFACT_BYTETRACE.to_string(), trace_bytes),
        (ARTIFACT_SEARCH_TAPE.to_string(), outcome.tape.bytes.clone()),
        (ARTIFACT_SEARCH_GRAPH.to_string(), graph_bytes),
        (ARTIFACT_OPERATOR_REGISTRY.to_string(), operator_bytes),
        (ARTIFACT_REGISTRY_SNAPSHOT.to_string(), registry_bytes),
        (ARTIFACT_POLICY_SNAPSHOT.to_string(), policy.bytes.clone()),
        (ARTIFACT_SCHEMA_BUNDLE.to_string(), schema_bytes),
        (ARTIFACT_FIXTURE.to_string(), fixture.bytes.clone()),
    ];
    if let Some(descriptor) = scorer_descriptor {
        artifacts.push((ARTIFACT_SCORER_DESCRIPTOR.to_string(), descriptor));
    }
    let bundle = build_bundle(artifacts, profile, truncated).map_err(EpisodeError::Bundle)?;
    write_bundle_dir(&bundle, out_dir).map_err(EpisodeError::Dir)?;

    // Verification at write time.
    let recorded_faults = match profile {
        ExecutionProfile::Cert => {
            if let Err(e) = verify_cert(&bundle) {
                let _ = std::fs::remove_dir_all(out_dir);
                return Err(EpisodeError::Bundle(e));
            }
            Vec::new()
        }
        ExecutionProfile::Dev => audit(&bundle),
    };

    Ok(EpisodeReport {
        termination: outcome.termination,
        truncated,
        trace_payload_hash,
        tape_chain: outcome.tape.final_chain,
        recorded_faults,
    })
}

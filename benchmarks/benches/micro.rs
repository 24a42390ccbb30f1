//! Micro benchmarks over the hot deterministic kernels: hashing, apply,
//! tape append, and divergence scan.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sterling_benchmarks::{bench_schema, bench_state};
use sterling_kernel::carrier::code32::Code32;
use sterling_kernel::carrier::registry::RegistryV1;
use sterling_kernel::operators::apply::apply;
use sterling_kernel::operators::operator_registry::{CostModel, OperatorDefV1, OperatorSetV1};
use sterling_kernel::operators::signature::{
    ArgBinding, BindSite, OperatorCategory, PlaneMaskU32,
};
use sterling_kernel::profile::ExecutionProfile;
use sterling_kernel::proof::divergence::first_differing_byte;
use sterling_kernel::proof::hash::canonical_hash;
use sterling_kernel::proof::hash_domain::HashDomain;
use sterling_search::event::{TapeEventV1, TapeHeaderV1};
use sterling_search::tape_writer::TapeWriter;

fn bench_identity_hash(c: &mut Criterion) {
    let state = bench_state();
    c.bench_function("bytestate_identity_hash_4x32", |b| {
        b.iter(|| black_box(&state).identity_hash());
    });
}

fn bench_evidence_hash(c: &mut Criterion) {
    let state = bench_state();
    c.bench_function("bytestate_evidence_hash_4x32", |b| {
        b.iter(|| black_box(&state).evidence_hash());
    });
}

fn bench_apply(c: &mut Criterion) {
    let schema = bench_schema();
    let state = bench_state();
    let registry = RegistryV1::new(
        "bench-epoch",
        vec![(Code32::new(8, 1, 1), "bench:target".into())],
    )
    .expect("static registry");
    let mut effect = PlaneMaskU32::new(schema.lane_count());
    effect.set(0, u32::MAX, 0);
    let set = OperatorSetV1::new(
        "operator_registry.v1",
        vec![OperatorDefV1 {
            op_id: Code32::new(8, 64, 1),
            name: "SET".into(),
            category: OperatorCategory::Memorize,
            arg_slot_count: 1,
            precondition: PlaneMaskU32::new(schema.lane_count()),
            effect,
            status_effect: None,
            arg_bindings: vec![ArgBinding {
                arg_index: 0,
                lane: 0,
                site: BindSite::EffectValue,
            }],
            relational: None,
            cost_model: CostModel::Unit,
            contract_epoch: "v1".into(),
        }],
    )
    .expect("static operator set");
    let args = [Code32::new(8, 1, 1)];

    c.bench_function("apply_masked_4x32", |b| {
        b.iter(|| {
            apply(
                black_box(&state),
                Code32::new(8, 64, 1),
                black_box(&args),
                &registry,
                &set,
                ExecutionProfile::Cert,
            )
            .expect("bench apply is legal")
        });
    });
}

fn bench_tape_append(c: &mut Criterion) {
    let header = TapeHeaderV1 {
        domain_id: "bench".into(),
        registry_digest: "sha256:aa".into(),
        operator_set_digest: "sha256:bb".into(),
        policy_digest: "sha256:cc".into(),
        scorer_digest: None,
        fixture_hash: "sha256:dd".into(),
        index_digest: None,
    };
    c.bench_function("tape_append_100_events", |b| {
        b.iter(|| {
            let mut writer = TapeWriter::new(&header).expect("header serializes");
            for i in 0..100u64 {
                writer
                    .append(&TapeEventV1::FrontierPush {
                        node_id: i,
                        parent_id: i.checked_sub(1),
                        state_id: format!("{i:064x}"),
                        depth: 0,
                        score: 0,
                        insertion_seq: i,
                    })
                    .expect("append succeeds");
            }
            writer.finish().expect("finish succeeds")
        });
    });
}

fn bench_divergence_scan(c: &mut Criterion) {
    let a = vec![0xA5u8; 1 << 16];
    let mut b = a.clone();
    b[(1 << 16) - 7] ^= 1;
    c.bench_function("first_differing_byte_64k", |bch| {
        bch.iter(|| first_differing_byte(black_box(&a), black_box(&b)));
    });
}

fn bench_domain_hash(c: &mut Criterion) {
    let data = vec![0x5Au8; 4096];
    c.bench_function("canonical_hash_4k", |b| {
        b.iter(|| canonical_hash(HashDomain::BundleArtifact, black_box(&data)));
    });
}

criterion_group!(
    benches,
    bench_identity_hash,
    bench_evidence_hash,
    bench_apply,
    bench_tape_append,
    bench_divergence_scan,
    bench_domain_hash
);
criterion_main!(benches);

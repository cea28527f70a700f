use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

use super::{AggregateSpec, FewestRunsPolicy, GroupBySpec, SpillableHashTable};
use crate::engine::comm::FrameWriter;
use crate::engine::context::TaskContext;
use crate::engine::data::FieldValue;
use crate::engine::errors::FlowError;
use crate::shared::config::RuntimeConfig;
use crate::test_helpers::factory::Factory;
use crate::test_helpers::writers::RecordingWriter;

fn insert_pairs(table: &mut SpillableHashTable, ctx: &TaskContext, pairs: &[(i32, i64)]) {
    let frames = Factory::frames()
        .with_frame_size(ctx.frame_size())
        .with_pairs(pairs.iter().copied())
        .create_frames();
    let input = table.spec().input().clone();
    for frame in &frames {
        let accessor = input.accessor(frame);
        for t in 0..accessor.tuple_count() {
            table.insert(&accessor, t).unwrap();
        }
    }
}

fn drain_rows(table: &mut SpillableHashTable) -> Vec<Vec<FieldValue>> {
    let mut output = RecordingWriter::new();
    output.open().unwrap();
    table.drain(&mut output).unwrap();
    output.close().unwrap();
    output.rows(table.spec().output())
}

fn counts(rows: &[Vec<FieldValue>]) -> HashMap<i32, i64> {
    rows.iter()
        .map(|row| (row[0].as_i64().unwrap() as i32, row[1].as_i64().unwrap()))
        .collect()
}

fn reference_counts(pairs: &[(i32, i64)]) -> HashMap<i32, i64> {
    let mut expected = HashMap::new();
    for (k, _) in pairs {
        *expected.entry(*k).or_insert(0i64) += 1;
    }
    expected
}

fn random_pairs(seed: u64, n: usize, keys: i32) -> Vec<(i32, i64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (rng.gen_range(0..keys), rng.gen_range(-1_000..1_000)))
        .collect()
}

#[test]
fn small_input_stays_resident() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().create_in(dir.path());
    let mut table = SpillableHashTable::new(Factory::group_spec().create_shared(), ctx.clone()).unwrap();

    let pairs = random_pairs(1, 500, 20);
    insert_pairs(&mut table, &ctx, &pairs);
    assert_eq!(table.resident_entries(), 20);
    assert_eq!(table.run_count(), 0);
    assert!(table.used_bytes() <= table.budget_bytes());

    let rows = drain_rows(&mut table);
    assert_eq!(rows.len(), 20);
    assert_eq!(counts(&rows), reference_counts(&pairs));
    assert_eq!(table.used_bytes(), 0);
    assert_eq!(ctx.metrics().spilled_runs(), 0);
}

#[test]
fn ten_thousand_tuples_with_forced_spill_match_reference_counts() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().with_budget(8 * 1024).create_in(dir.path());
    let mut table = SpillableHashTable::new(Factory::group_spec().create_shared(), ctx.clone()).unwrap();

    let pairs = random_pairs(7, 10_000, 100);
    insert_pairs(&mut table, &ctx, &pairs);
    assert!(table.run_count() > 0);
    assert!(table.used_bytes() <= table.budget_bytes());

    let rows = drain_rows(&mut table);
    assert_eq!(rows.len(), 100);
    assert_eq!(counts(&rows), reference_counts(&pairs));
    assert!(ctx.metrics().spilled_runs() > 0);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn spilled_sum_min_max_avg_equal_unbounded_aggregation() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context()
        .with_budget(4 * 1024)
        .with_fan_in(3)
        .create_in(dir.path());
    let spec = Factory::group_spec()
        .with_aggregates(vec![
            AggregateSpec::Sum { field: 1 },
            AggregateSpec::Min { field: 1 },
            AggregateSpec::Max { field: 1 },
            AggregateSpec::Avg { field: 1 },
        ])
        .create_shared();
    let mut table = SpillableHashTable::new(spec, ctx.clone()).unwrap();

    let pairs = random_pairs(11, 2_000, 40);
    insert_pairs(&mut table, &ctx, &pairs);
    let rows = drain_rows(&mut table);

    let mut expected: HashMap<i32, Vec<i64>> = HashMap::new();
    for (k, v) in &pairs {
        expected.entry(*k).or_default().push(*v);
    }

    assert_eq!(rows.len(), expected.len());
    for row in rows {
        let key = row[0].as_i64().unwrap() as i32;
        let values = &expected[&key];
        let sum: i64 = values.iter().sum();
        assert_eq!(row[1], FieldValue::Int64(sum), "sum of {}", key);
        assert_eq!(row[2], FieldValue::Int64(*values.iter().min().unwrap()));
        assert_eq!(row[3], FieldValue::Int64(*values.iter().max().unwrap()));
        let avg = row[4].as_f64().unwrap();
        assert!((avg - sum as f64 / values.len() as f64).abs() < 1e-9);
    }
    assert!(ctx.metrics().merge_passes() > 0);
}

#[test]
fn entry_larger_than_budget_is_kept_alone() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().with_budget(1).create_in(dir.path());
    let mut table = SpillableHashTable::new(Factory::group_spec().create_shared(), ctx.clone()).unwrap();

    insert_pairs(&mut table, &ctx, &[(1, 0)]);
    assert_eq!(table.resident_entries(), 1);
    assert_eq!(table.run_count(), 0);

    insert_pairs(&mut table, &ctx, &[(2, 0), (1, 0)]);
    assert_eq!(table.resident_entries(), 1);
    assert_eq!(table.run_count(), 2);

    let rows = drain_rows(&mut table);
    assert_eq!(counts(&rows), HashMap::from([(1, 2), (2, 1)]));
}

#[test]
fn multi_key_groups_with_alternate_policy() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().with_budget(4 * 1024).create_in(dir.path());
    let spec = Factory::group_spec()
        .with_keys(vec![0, 1])
        .with_aggregates(vec![AggregateSpec::Count])
        .create_shared();
    let mut table = SpillableHashTable::new(spec, ctx.clone())
        .unwrap()
        .with_policy(Box::new(FewestRunsPolicy));

    let pairs: Vec<(i32, i64)> = (0..3_000).map(|i| (i % 30, (i % 7) as i64)).collect();
    insert_pairs(&mut table, &ctx, &pairs);
    assert!(table.run_count() > 0);

    let rows = drain_rows(&mut table);
    let mut expected: HashMap<(i32, i64), i64> = HashMap::new();
    for pair in &pairs {
        *expected.entry(*pair).or_insert(0) += 1;
    }
    assert_eq!(rows.len(), expected.len());
    for row in rows {
        let key = (row[0].as_i64().unwrap() as i32, row[1].as_i64().unwrap());
        assert_eq!(row[2], FieldValue::Int64(expected[&key]));
    }
}

#[test]
fn discard_deletes_every_run() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().with_budget(512).create_in(dir.path());
    let mut table = SpillableHashTable::new(Factory::group_spec().create_shared(), ctx.clone()).unwrap();

    insert_pairs(&mut table, &ctx, &random_pairs(3, 500, 50));
    let runs = table.run_count();
    assert!(runs > 0);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), runs);

    table.discard();
    assert_eq!(table.run_count(), 0);
    assert_eq!(table.resident_entries(), 0);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn spilling_an_unknown_partition_is_a_usage_error() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().with_spill_partitions(4).create_in(dir.path());
    let mut table = SpillableHashTable::new(Factory::group_spec().create_shared(), ctx).unwrap();

    let err = table.spill(4).expect_err("no partition 4");
    assert!(matches!(err, FlowError::Usage(_)));
    table.spill(0).unwrap();
    assert_eq!(table.run_count(), 0);
}

#[test]
fn group_by_without_keys_is_rejected() {
    let record = Factory::record().create();
    let err = GroupBySpec::new(record, vec![], &[AggregateSpec::Count]).expect_err("no keys");
    assert!(matches!(err, FlowError::InvalidSpec(_)));
}

#[test]
fn table_shares_spec_with_its_owner() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().create_in(dir.path());
    let spec = Factory::group_spec().create_shared();
    let table = SpillableHashTable::new(Arc::clone(&spec), ctx).unwrap();
    assert!(Arc::ptr_eq(table.spec(), &spec));
}

#[test]
fn tables_from_separate_contexts_share_a_spill_dir() {
    let dir = tempdir().unwrap();
    let config = RuntimeConfig {
        frame_size: 256,
        table_budget_bytes: 1024,
        spill_partitions: 4,
        spill_dir: dir.path().to_string_lossy().into_owned(),
        ..RuntimeConfig::default()
    };
    let first_ctx = TaskContext::from_config(&config).unwrap();
    let second_ctx = TaskContext::from_config(&config).unwrap();
    assert_eq!(first_ctx.telemetry().label(), second_ctx.telemetry().label());

    let pairs: Vec<(i32, i64)> = (0..400).map(|k| (k, 1)).collect();
    let mut first = SpillableHashTable::new(Factory::group_spec().create_shared(), first_ctx.clone()).unwrap();
    let mut second = SpillableHashTable::new(Factory::group_spec().create_shared(), second_ctx.clone()).unwrap();
    insert_pairs(&mut first, &first_ctx, &pairs);
    insert_pairs(&mut second, &second_ctx, &pairs);
    assert!(first.run_count() > 0);
    assert!(second.run_count() > 0);

    assert_eq!(counts(&drain_rows(&mut first)), reference_counts(&pairs));
    assert_eq!(counts(&drain_rows(&mut second)), reference_counts(&pairs));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

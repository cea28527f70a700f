use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

use super::pipeline::{FrameSource, FrameVecSource, RowsSource, run_exchange};
use crate::engine::comm::FrameWriter;
use crate::engine::data::{FieldType, FieldValue, hash_function_for};
use crate::engine::errors::FlowError;
use crate::engine::group::ExternalGroupOperator;
use crate::engine::partition::{FieldHashPartitionComputerFactory, RoundRobinPartitionComputerFactory, reduce};
use crate::test_helpers::factory::Factory;
use crate::test_helpers::writers::RecordingWriter;

fn key_hash() -> FieldHashPartitionComputerFactory {
    FieldHashPartitionComputerFactory::new(vec![0], vec![hash_function_for(FieldType::Int32)])
        .expect("factory builds")
}

fn random_pairs(seed: u64, n: usize, keys: i32) -> Vec<(i32, i64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| (rng.gen_range(0..keys), rng.gen_range(0..100))).collect()
}

fn source(pairs: &[(i32, i64)]) -> FrameVecSource {
    FrameVecSource::new(
        Factory::frames()
            .with_frame_size(256)
            .with_pairs(pairs.iter().copied())
            .create_frames(),
    )
}

#[test]
fn every_tuple_reaches_its_partition_exactly_once() {
    crate::logging::init_for_tests();
    let dir = tempdir().unwrap();
    let ctx = Factory::context().create_in(dir.path());
    let record = Factory::record().create();

    let inputs: Vec<Vec<(i32, i64)>> = (0..3).map(|p| random_pairs(p, 700, 1_000)).collect();
    let sources: Vec<FrameVecSource> = inputs.iter().map(|pairs| source(pairs)).collect();
    let consumers: Vec<RecordingWriter> = (0..4).map(|_| RecordingWriter::new()).collect();

    let finished = run_exchange(&ctx, &record, &key_hash(), sources, consumers).unwrap();
    assert_eq!(finished.len(), 4);

    let mut received = Vec::new();
    for (partition, consumer) in finished.iter().enumerate() {
        assert_eq!(consumer.opens(), 1);
        assert_eq!(consumer.closes(), 1);
        assert_eq!(consumer.fails(), 0);
        for row in consumer.rows(&record) {
            let key = row[0].as_i64().unwrap() as i32;
            assert_eq!(reduce(key, 4), partition);
            received.push((key, row[1].as_i64().unwrap()));
        }
    }

    let mut expected: Vec<(i32, i64)> = inputs.into_iter().flatten().collect();
    expected.sort();
    received.sort();
    assert_eq!(received, expected);
    assert!(ctx.metrics().total_received_frames() > 0);
}

#[test]
fn exchange_into_spilling_group_by_matches_reference() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().with_budget(2 * 1024).create_in(dir.path());
    let record = Factory::record().create();
    let spec = Factory::group_spec().create_shared();

    let inputs: Vec<Vec<(i32, i64)>> = (0..2).map(|p| random_pairs(100 + p, 4_000, 100)).collect();
    let sources: Vec<FrameVecSource> = inputs.iter().map(|pairs| source(pairs)).collect();

    let outputs: Vec<RecordingWriter> = (0..3).map(|_| RecordingWriter::new()).collect();
    let consumers: Vec<ExternalGroupOperator<RecordingWriter>> = outputs
        .iter()
        .enumerate()
        .map(|(p, out)| {
            ExternalGroupOperator::new(spec.clone(), ctx.for_partition("group", p), out.clone())
                .unwrap()
        })
        .collect();

    run_exchange(&ctx, &record, &key_hash(), sources, consumers).unwrap();
    assert!(ctx.metrics().spilled_runs() > 0);

    let mut expected: HashMap<i32, i64> = HashMap::new();
    for (k, _) in inputs.iter().flatten() {
        *expected.entry(*k).or_insert(0) += 1;
    }

    let mut got: HashMap<i32, i64> = HashMap::new();
    for (partition, out) in outputs.iter().enumerate() {
        for row in out.rows(spec.output()) {
            let key = row[0].as_i64().unwrap() as i32;
            assert_eq!(reduce(key, 3), partition);
            assert!(got.insert(key, row[1].as_i64().unwrap()).is_none());
        }
    }
    assert_eq!(got, expected);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[derive(Debug)]
struct BrokenSource {
    frames: Vec<Vec<u8>>,
}

impl FrameSource for BrokenSource {
    fn produce(&mut self, writer: &mut dyn FrameWriter) -> Result<(), FlowError> {
        if let Some(first) = self.frames.first() {
            writer.next_frame(first)?;
        }
        Err(FlowError::operator("source broke"))
    }
}

#[test]
fn producer_failure_fails_every_consumer() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().create_in(dir.path());
    let record = Factory::record().create();
    let frames = Factory::frames()
        .with_frame_size(256)
        .with_pairs(random_pairs(4, 100, 50))
        .create_frames();

    let consumers: Vec<RecordingWriter> = (0..3).map(|_| RecordingWriter::new()).collect();
    let err = run_exchange(
        &ctx,
        &record,
        &key_hash(),
        vec![BrokenSource { frames }],
        consumers.clone(),
    )
    .expect_err("source fails");

    assert!(matches!(err, FlowError::Operator(ref msg) if msg == "source broke"));
    for consumer in &consumers {
        assert_eq!(consumer.fails(), 1);
        assert_eq!(consumer.closes(), 1);
    }
}

#[test]
fn consumer_failure_is_the_reported_root_cause() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().create_in(dir.path());
    let record = Factory::record().create();

    let sources: Vec<FrameVecSource> = (0..2).map(|p| source(&random_pairs(p, 500, 100))).collect();
    let consumers = vec![
        RecordingWriter::new().failing_on_frame(0),
        RecordingWriter::new(),
    ];

    let err = run_exchange(
        &ctx,
        &record,
        &RoundRobinPartitionComputerFactory,
        sources,
        consumers.clone(),
    )
    .expect_err("consumer rejects a frame");

    assert!(matches!(err, FlowError::Operator(_)));
    assert_eq!(consumers[0].fails(), 1);
    for consumer in &consumers {
        assert_eq!(consumer.closes(), 1);
    }
}

/// Keeps pushing until the exchange refuses a frame, then gives up with
/// its own error.
#[derive(Debug)]
struct StubbornSource {
    frame: Vec<u8>,
}

impl FrameSource for StubbornSource {
    fn produce(&mut self, writer: &mut dyn FrameWriter) -> Result<(), FlowError> {
        for _ in 0..10_000 {
            if writer.next_frame(&self.frame).is_err() {
                return Err(FlowError::operator("source gave up"));
            }
        }
        Ok(())
    }
}

#[test]
fn earliest_root_cause_wins_over_join_order() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().create_in(dir.path());
    let record = Factory::record().create();
    let frame = Factory::frames()
        .with_frame_size(256)
        .with_pairs(random_pairs(9, 20, 50))
        .create_frames()
        .remove(0);

    let consumer = RecordingWriter::new().failing_on_open();
    let err = run_exchange(
        &ctx,
        &record,
        &RoundRobinPartitionComputerFactory,
        vec![StubbornSource { frame }],
        vec![consumer.clone()],
    )
    .expect_err("consumer refuses to open");

    assert!(matches!(err, FlowError::Operator(ref msg) if msg == "open rejected"));
    assert_eq!(consumer.closes(), 1);
}

#[test]
fn rows_source_packs_typed_rows() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().create_in(dir.path());
    let record = Factory::record()
        .with_fields(vec![FieldType::Utf8, FieldType::Int64])
        .create();
    let rows: Vec<Vec<FieldValue>> = ["a", "b", "c", "a"]
        .iter()
        .enumerate()
        .map(|(i, s)| vec![FieldValue::from(*s), FieldValue::Int64(i as i64)])
        .collect();
    let computer = FieldHashPartitionComputerFactory::new(vec![0], vec![hash_function_for(FieldType::Utf8)])
        .unwrap();

    let finished = run_exchange(
        &ctx,
        &record,
        &computer,
        vec![RowsSource::new(record.clone(), rows.clone(), 64)],
        vec![RecordingWriter::new(), RecordingWriter::new()],
    )
    .unwrap();

    let mut received: Vec<Vec<FieldValue>> = finished.iter().flat_map(|c| c.rows(&record)).collect();
    received.sort_by_key(|row| row[1].as_i64());
    assert_eq!(received, rows);

    let a_partition: Vec<usize> = finished
        .iter()
        .enumerate()
        .filter(|(_, c)| c.rows(&record).iter().any(|r| r[0] == FieldValue::from("a")))
        .map(|(p, _)| p)
        .collect();
    assert_eq!(a_partition.len(), 1);
}

#[test]
fn exchange_without_consumers_is_rejected() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().create_in(dir.path());
    let record = Factory::record().create();

    let err = run_exchange::<FrameVecSource, RecordingWriter>(
        &ctx,
        &record,
        &key_hash(),
        vec![FrameVecSource::default()],
        vec![],
    )
    .expect_err("no consumers");
    assert!(matches!(err, FlowError::InvalidSpec(_)));
}

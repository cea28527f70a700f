use tempfile::tempdir;

use super::{AggregateSpec, PreclusteredGroupWriter};
use crate::engine::comm::{FrameWriter, WriterState};
use crate::engine::data::FieldValue;
use crate::engine::errors::FlowError;
use crate::test_helpers::factory::Factory;
use crate::test_helpers::writers::RecordingWriter;

fn sum_spec() -> std::sync::Arc<super::GroupBySpec> {
    Factory::group_spec()
        .with_aggregates(vec![AggregateSpec::Count, AggregateSpec::Sum { field: 1 }])
        .create_shared()
}

#[test]
fn groups_adjacent_keys_across_frames() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().with_frame_size(64).create_in(dir.path());
    let spec = sum_spec();
    let output = RecordingWriter::new();
    let mut writer = PreclusteredGroupWriter::new(spec.clone(), &ctx, output.clone());

    let mut pairs = Vec::new();
    for key in 0..6 {
        for v in 0..=key {
            pairs.push((key, v as i64));
        }
    }
    let frames = Factory::frames()
        .with_frame_size(64)
        .with_pairs(pairs)
        .create_frames();
    assert!(frames.len() > 1);

    writer.open().unwrap();
    for frame in &frames {
        writer.next_frame(frame).unwrap();
    }
    writer.close().unwrap();

    let rows = output.rows(spec.output());
    let expected: Vec<Vec<FieldValue>> = (0..6)
        .map(|key| {
            vec![
                FieldValue::Int32(key),
                FieldValue::Int64(key as i64 + 1),
                FieldValue::Int64((0..=key as i64).sum()),
            ]
        })
        .collect();
    assert_eq!(rows, expected);
    assert_eq!(output.closes(), 1);
}

#[test]
fn reappearing_key_starts_a_new_group() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().create_in(dir.path());
    let spec = Factory::group_spec().create_shared();
    let output = RecordingWriter::new();
    let mut writer = PreclusteredGroupWriter::new(spec.clone(), &ctx, output.clone());

    writer.open().unwrap();
    writer
        .next_frame(&Factory::frames().with_pairs([(1, 0), (1, 0), (2, 0), (1, 0)]).create())
        .unwrap();
    writer.close().unwrap();

    let keys: Vec<(i64, i64)> = output
        .rows(spec.output())
        .iter()
        .map(|r| (r[0].as_i64().unwrap(), r[1].as_i64().unwrap()))
        .collect();
    assert_eq!(keys, vec![(1, 2), (2, 1), (1, 1)]);
}

#[test]
fn fail_drops_the_open_group() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().create_in(dir.path());
    let output = RecordingWriter::new();
    let mut writer = PreclusteredGroupWriter::new(sum_spec(), &ctx, output.clone());

    writer.open().unwrap();
    writer
        .next_frame(&Factory::frames().with_pairs([(4, 1)]).create())
        .unwrap();
    writer.fail().unwrap();
    writer.close().unwrap();
    writer.close().unwrap();

    assert_eq!(writer.state(), WriterState::Closed);
    assert!(output.frames().is_empty());
    assert_eq!(output.fails(), 1);
    assert_eq!(output.closes(), 1);
}

#[test]
fn output_error_propagates_and_fails_downstream() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().with_frame_size(64).create_in(dir.path());
    let output = RecordingWriter::new().failing_on_frame(0);
    let mut writer = PreclusteredGroupWriter::new(sum_spec(), &ctx, output.clone());

    let frames = Factory::frames()
        .with_frame_size(64)
        .with_pairs((0..20).map(|k| (k, 1)))
        .create_frames();

    writer.open().unwrap();
    let mut failure = None;
    for frame in &frames {
        if let Err(err) = writer.next_frame(frame) {
            failure = Some(err);
            break;
        }
    }
    assert!(matches!(failure, Some(FlowError::Operator(_))));
    assert_eq!(writer.state(), WriterState::Failed);
    assert_eq!(output.fails(), 1);

    writer.close().unwrap();
    assert_eq!(output.closes(), 1);
}

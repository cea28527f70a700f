use std::fs;

use tempfile::tempdir;

use super::{RunFile, RunFileWriter, RunMerger};
use crate::engine::comm::{FrameTupleAppender, FrameWriter, drive};
use crate::engine::context::TaskContext;
use crate::engine::data::FieldValue;
use crate::test_helpers::factory::Factory;

/// A run of `(key, count)` partial tuples, which is also the shape of the
/// default record.
fn count_run(ctx: &TaskContext, pairs: &[(i32, i64)]) -> RunFile {
    let frames = Factory::frames()
        .with_frame_size(ctx.frame_size())
        .with_pairs(pairs.iter().copied())
        .create_frames();
    let mut writer = RunFileWriter::create(ctx.spill_store(), "merge-input").unwrap();
    drive(&mut writer, |w| {
        for frame in &frames {
            w.next_frame(frame)?;
        }
        Ok(())
    })
    .unwrap();
    writer.into_run().unwrap()
}

fn merged_pairs(ctx: &TaskContext, runs: Vec<RunFile>) -> Vec<(i32, i64)> {
    let spec = Factory::group_spec().create();
    let mut output = Factory::recording_writer();
    let mut appender = FrameTupleAppender::new(ctx.frame_size());

    output.open().unwrap();
    RunMerger::new(&spec, ctx)
        .merge_into(runs, &mut appender, &mut output)
        .unwrap();
    appender.flush(&mut output, false).unwrap();
    output.close().unwrap();

    output
        .rows(spec.output())
        .into_iter()
        .map(|row| match (&row[0], &row[1]) {
            (FieldValue::Int32(k), FieldValue::Int64(c)) => (*k, *c),
            other => panic!("unexpected row {:?}", other),
        })
        .collect()
}

#[test]
fn merges_equal_keys_across_runs_in_key_order() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().create_in(dir.path());

    let runs = vec![
        count_run(&ctx, &[(-4, 1), (1, 2), (7, 3)]),
        count_run(&ctx, &[(1, 10), (3, 1)]),
        count_run(&ctx, &[(-4, 5), (7, 1), (9, 9)]),
    ];

    assert_eq!(
        merged_pairs(&ctx, runs),
        vec![(-4, 6), (1, 12), (3, 1), (7, 4), (9, 9)]
    );
    assert_eq!(ctx.metrics().merge_passes(), 0);
}

#[test]
fn many_runs_merge_in_several_passes_and_are_deleted() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().with_fan_in(2).create_in(dir.path());

    let runs: Vec<RunFile> = (0..5)
        .map(|r| {
            let pairs: Vec<(i32, i64)> = (0..40).map(|k| (k, r as i64 + 1)).collect();
            count_run(&ctx, &pairs)
        })
        .collect();

    let merged = merged_pairs(&ctx, runs);
    assert_eq!(merged.len(), 40);
    assert!(merged.iter().all(|(_, count)| *count == 15));
    assert!(merged.windows(2).all(|w| w[0].0 < w[1].0));

    assert_eq!(ctx.metrics().merge_passes(), 3);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn empty_runs_produce_nothing() {
    let dir = tempdir().unwrap();
    let ctx = Factory::context().create_in(dir.path());

    let runs = vec![count_run(&ctx, &[]), count_run(&ctx, &[(2, 1)])];
    assert_eq!(merged_pairs(&ctx, runs), vec![(2, 1)]);
}

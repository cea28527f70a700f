use crate::engine::data::FieldValue;
use crate::test_helpers::factory::Factory;

#[test]
fn creates_frames_that_decode_back_to_rows() {
    let factory = Factory::frames().with_pairs((0..5).map(|k| (k, k as i64 * 10)));
    let record = factory.record().clone();
    let frame = factory.create();

    let rows = record.decode_frame(&frame).expect("frame decodes");
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[3], vec![FieldValue::Int32(3), FieldValue::Int64(30)]);
}

#[test]
fn splits_rows_across_small_frames() {
    let frames = Factory::frames()
        .with_frame_size(64)
        .with_pairs((0..20).map(|k| (k, 1)))
        .create_frames();

    assert!(frames.len() > 1);
    assert!(frames.iter().all(|f| f.len() == 64));
}

use harvest_core::{partition, reassemble, unique_keys, Batch, BatchError, ItemKey};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn sixty_five_keys_in_batches_of_thirty() {
    let keys: Vec<u32> = (1..=65).collect();
    let batches = partition(&keys, 30, None).unwrap();

    assert_eq!(batches.iter().map(|b| b.size).collect::<Vec<_>>(), vec![30, 30, 5]);
    assert_eq!(batches.iter().map(|b| b.index).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
fn ten_keys_in_batches_of_three_record_offsets() {
    let keys: Vec<u32> = (1..=10).collect();
    let batches = partition(&keys, 3, None).unwrap();

    assert_eq!(
        batches.iter().map(|b| b.item_keys.clone()).collect::<Vec<_>>(),
        vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9], vec![10]]
    );
    assert_eq!(
        batches
            .iter()
            .map(|b| (b.start_offset, b.end_offset))
            .collect::<Vec<_>>(),
        vec![(0, 3), (3, 6), (6, 9), (9, 10)]
    );
}

#[test]
fn concatenated_batches_reproduce_the_source() {
    let keys: Vec<ItemKey> = (0..47).map(|i| ItemKey::new(format!("A{i:04}"))).collect();

    for size in [1, 2, 7, 46, 47, 100] {
        let batches = partition(&keys, size, None).unwrap();
        let rebuilt = reassemble(&batches).unwrap();
        assert_eq!(rebuilt, keys);
        assert_eq!(partition(&rebuilt, size, None).unwrap(), batches);
    }
}

#[test]
fn empty_source_yields_no_batches() {
    let keys: Vec<String> = Vec::new();
    assert!(partition(&keys, 5, None).unwrap().is_empty());
}

#[test]
fn zero_batch_size_is_rejected() {
    assert_eq!(partition(&[1, 2], 0, None), Err(BatchError::ZeroBatchSize));
}

#[test]
fn context_is_copied_onto_every_batch() {
    let context = json!({ "category_code": "104001", "category_name": "skincare" });
    let batches = partition(&["a", "b", "c"], 2, Some(&context)).unwrap();

    assert!(batches.iter().all(|b| b.context.as_ref() == Some(&context)));
}

#[test]
fn batch_serializes_with_interchange_names() {
    let batches = partition(
        &["A1".to_string(), "A2".to_string()],
        2,
        Some(&json!({ "category": "lip" })),
    )
    .unwrap();

    let value = serde_json::to_value(&batches[0]).unwrap();
    assert_eq!(
        value,
        json!({
            "batch_index": 0,
            "item_ids": ["A1", "A2"],
            "batch_size": 2,
            "start_index": 0,
            "end_index": 2,
            "context": { "category": "lip" }
        })
    );

    let without_context = serde_json::to_value(&partition(&[1], 1, None).unwrap()[0]).unwrap();
    assert!(without_context.get("context").is_none());

    let parsed: Batch<String> = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, batches[0]);
}

#[test]
fn reassemble_rejects_gaps_and_bad_sizes() {
    let mut batches = partition(&[1, 2, 3, 4, 5], 2, None).unwrap();

    let missing_middle = vec![batches[0].clone(), batches[2].clone()];
    assert_eq!(
        reassemble(&missing_middle),
        Err(BatchError::NonContiguousIndex {
            expected: 1,
            found: 2
        })
    );

    batches[1].item_keys.pop();
    assert_eq!(
        reassemble(&batches),
        Err(BatchError::SizeMismatch {
            index: 1,
            declared: 2,
            actual: 1
        })
    );

    let mut shifted = partition(&[1, 2, 3, 4], 2, None).unwrap();
    shifted[1].start_offset = 3;
    assert_eq!(
        reassemble(&shifted),
        Err(BatchError::OffsetMismatch {
            index: 1,
            expected: 2,
            found: 3
        })
    );
}

#[test]
fn unique_keys_keeps_first_occurrence_order() {
    assert_eq!(unique_keys(&["b", "a", "b", "c", "a"]), vec!["b", "a", "c"]);
}

use super::*;

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn defaults_applied_on_empty_map() {
    let options = CoreOptions::from_map(&map(&[])).unwrap();
    assert_eq!(options.bucket, DYNAMIC_BUCKET);
    assert!(options.dynamic_bucket());
    assert_eq!(options.num_sorted_run_compaction_trigger, 5);
    assert_eq!(options.num_sorted_run_stop_trigger, 6);
    assert_eq!(options.merge_engine, MergeEngine::Deduplicate);
    assert_eq!(options.changelog_producer, ChangelogProducer::None);
    assert_eq!(options.commit_max_retries, 5);
}

#[test]
fn stop_trigger_follows_custom_trigger() {
    let options =
        CoreOptions::from_map(&map(&[("num-sorted-run.compaction-trigger", "3")])).unwrap();
    assert_eq!(options.num_sorted_run_stop_trigger, 4);
}

#[test]
fn explicit_stop_trigger_wins() {
    let options = CoreOptions::from_map(&map(&[
        ("num-sorted-run.compaction-trigger", "3"),
        ("num-sorted-run.stop-trigger", "8"),
    ]))
    .unwrap();
    assert_eq!(options.num_sorted_run_stop_trigger, 8);
}

#[test]
fn stop_below_trigger_rejected() {
    let err = CoreOptions::from_map(&map(&[
        ("num-sorted-run.compaction-trigger", "5"),
        ("num-sorted-run.stop-trigger", "3"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn merge_engine_and_changelog_parse() {
    let options = CoreOptions::from_map(&map(&[
        ("merge-engine", "partial-update"),
        ("changelog-producer", "input"),
        ("partial-update.ignore-delete", "true"),
    ]))
    .unwrap();
    assert_eq!(options.merge_engine, MergeEngine::PartialUpdate);
    assert_eq!(options.changelog_producer, ChangelogProducer::Input);
    assert!(options.partial_update_ignore_delete);
}

#[test]
fn bad_enum_value_rejected() {
    let err = CoreOptions::from_map(&map(&[("merge-engine", "overwrite")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}

#[test]
fn sequence_groups_and_aggregates_extracted() {
    let options = CoreOptions::from_map(&map(&[
        ("fields.g1.sequence-group", "a,b"),
        ("fields.g2.sequence-group", "c"),
        ("fields.total.aggregate-function", "sum"),
    ]))
    .unwrap();
    assert_eq!(
        options.sequence_groups.get("g1"),
        Some(&vec!["a".to_string(), "b".to_string()])
    );
    assert_eq!(options.sequence_groups.get("g2"), Some(&vec!["c".to_string()]));
    assert_eq!(
        options.aggregate_functions.get("total"),
        Some(&"sum".to_string())
    );
}

#[test]
fn sizes_and_durations_parse() {
    let options = CoreOptions::from_map(&map(&[
        ("write-buffer-size", "64mb"),
        ("manifest.target-file-size", "512kb"),
        ("cross-partition-upsert.index-ttl", "2h"),
        ("snapshot.time-retained", "30m"),
    ]))
    .unwrap();
    assert_eq!(options.write_buffer_size, 64 * 1024 * 1024);
    assert_eq!(options.manifest_target_file_size, 512 * 1024);
    assert_eq!(
        options.cross_partition_index_ttl,
        Some(Duration::from_secs(2 * 60 * 60))
    );
    assert_eq!(options.snapshot_time_retained, Duration::from_secs(30 * 60));
}

#[test]
fn zero_bucket_rejected() {
    let err = CoreOptions::from_map(&map(&[("bucket", "0")])).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn static_bucket_accepted() {
    let options = CoreOptions::from_map(&map(&[("bucket", "4"), ("bucket-key", "id, name")]))
        .unwrap();
    assert_eq!(options.bucket, 4);
    assert!(!options.dynamic_bucket());
    assert_eq!(options.bucket_key, vec!["id".to_string(), "name".to_string()]);
}

#[test]
fn strict_mode_rejects_unknown_keys() {
    let err = CoreOptions::from_map_strict(&map(&[("no-such-option", "1")])).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownKey(_)));
    // Non-strict ignores the same key.
    assert!(CoreOptions::from_map(&map(&[("no-such-option", "1")])).is_ok());
}

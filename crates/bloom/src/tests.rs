use super::*;

#[test]
fn inserted_keys_are_found() {
    let mut bf = BloomFilter::new(100, 0.01);
    for i in 0..100u64 {
        bf.insert(&i.to_le_bytes());
    }
    for i in 0..100u64 {
        assert!(bf.may_contain(&i.to_le_bytes()));
    }
}

#[test]
fn false_positive_rate_is_reasonable() {
    let mut bf = BloomFilter::new(1000, 0.01);
    for i in 0..1000u64 {
        bf.insert(&i.to_le_bytes());
    }
    let mut false_positives = 0;
    for i in 1000..11_000u64 {
        if bf.may_contain(&i.to_le_bytes()) {
            false_positives += 1;
        }
    }
    // 1% target; allow generous slack for hash quality.
    assert!(
        false_positives < 500,
        "false positive count too high: {false_positives}"
    );
}

#[test]
fn serialization_roundtrip() {
    let mut bf = BloomFilter::new(50, 0.05);
    for i in 0..50u64 {
        bf.insert(&i.to_le_bytes());
    }

    let mut buf = Vec::new();
    bf.write_to(&mut buf).unwrap();
    assert_eq!(buf.len(), bf.serialized_size());

    let restored = BloomFilter::read_from(&mut &buf[..]).unwrap();
    assert_eq!(restored.num_bits(), bf.num_bits());
    assert_eq!(restored.num_probes(), bf.num_probes());
    for i in 0..50u64 {
        assert!(restored.may_contain(&i.to_le_bytes()));
    }
}

#[test]
fn corrupt_block_count_rejected() {
    let mut buf = Vec::new();
    BloomFilter::new(10, 0.1).write_to(&mut buf).unwrap();
    // Overwrite block_len with an absurd value.
    buf[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
    assert!(BloomFilter::read_from(&mut &buf[..]).is_err());
}

#[test]
#[should_panic(expected = "expected_items")]
fn zero_expected_items_panics() {
    let _ = BloomFilter::new(0, 0.01);
}

use crate::DefaultLayout;
use crate::reader::collect_metadata;
use crate::reader::foreach_metadata;
use crate::reader::is_allocated;
use crate::reader::label_of;
use crate::reader::type_id_of;
use crate::tests::Harness;

#[test]
fn foreach_metadata_visits_only_allocated_slots() {
  let mut harness = Harness::new(4, 0);

  harness.allocator.allocate(1, b"a", b"label a");
  let doomed = harness.allocator.allocate(2, b"b", b"label b");
  harness.allocator.allocate(3, b"c", b"label c");
  harness.allocator.free(doomed);

  let mut visited: Vec<(u32, i32, Vec<u8>)> = Vec::new();

  // SAFETY: `metadata_ptr()` is live for `capacity` records; the harness
  // owns no other live reference into the region.
  unsafe {
    foreach_metadata::<DefaultLayout, _>(harness.metadata_ptr(), 4, |id, type_id, _key, label| {
      visited.push((id, type_id, label.to_vec()));
    });
  }

  assert_eq!(
    visited,
    vec![
      (0, 1, b"label a".to_vec()),
      (2, 3, b"label c".to_vec()),
    ]
  );
}

#[test]
fn foreach_metadata_on_an_empty_region_visits_nothing() {
  let harness = Harness::new(8, 0);
  let mut count = 0;

  // SAFETY: see above.
  unsafe {
    foreach_metadata::<DefaultLayout, _>(harness.metadata_ptr(), 8, |_, _, _, _| count += 1);
  }

  assert_eq!(count, 0);
}

#[test]
fn key_and_label_round_trip_byte_exactly() {
  let mut harness = Harness::new(1, 0);
  let key = b"connections.active";
  let label = b"Active client connections";

  harness.allocator.allocate(9, key, label);

  // SAFETY: see above.
  let snapshots = unsafe { collect_metadata::<DefaultLayout>(harness.metadata_ptr(), 1) };

  assert_eq!(snapshots.len(), 1);
  let snapshot = &snapshots[0];
  assert_eq!(snapshot.id(), 0);
  assert_eq!(snapshot.type_id(), 9);
  assert_eq!(&snapshot.key()[..key.len()], key);
  assert!(snapshot.key()[key.len()..].iter().all(|&b| b == 0));
  assert_eq!(snapshot.label(), label);
}

#[test]
fn is_allocated_reflects_free_and_reuse() {
  let mut harness = Harness::new(1, 0);

  // SAFETY: `metadata_ptr()` is live for 1 record.
  assert!(!unsafe { is_allocated::<DefaultLayout>(harness.metadata_ptr(), 1, 0) });

  let id = harness.allocator.allocate(0, b"a", b"");
  // SAFETY: see above.
  assert!(unsafe { is_allocated::<DefaultLayout>(harness.metadata_ptr(), 1, 0) });

  harness.allocator.free(id);
  // SAFETY: see above.
  assert!(!unsafe { is_allocated::<DefaultLayout>(harness.metadata_ptr(), 1, 0) });
}

#[test]
fn type_id_of_and_label_of_read_a_single_slot_without_a_full_scan() {
  let mut harness = Harness::new(2, 0);

  let id = harness.allocator.allocate(42, b"k", b"label");

  // SAFETY: `metadata_ptr()` is live for 2 records.
  assert_eq!(
    unsafe { type_id_of::<DefaultLayout>(harness.metadata_ptr(), 2, id as u32) },
    Some(42)
  );
  // SAFETY: see above.
  assert_eq!(
    unsafe { label_of::<DefaultLayout>(harness.metadata_ptr(), 2, id as u32) },
    Some(b"label".to_vec())
  );

  // SAFETY: see above.
  assert_eq!(unsafe { type_id_of::<DefaultLayout>(harness.metadata_ptr(), 2, 1) }, None);
  // SAFETY: see above.
  assert_eq!(unsafe { label_of::<DefaultLayout>(harness.metadata_ptr(), 2, 1) }, None);

  harness.allocator.free(id);
  // SAFETY: see above.
  assert_eq!(
    unsafe { type_id_of::<DefaultLayout>(harness.metadata_ptr(), 2, id as u32) },
    None
  );
}

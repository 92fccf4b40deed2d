#![cfg(loom)]

use loom::sync::Arc;
use loom::sync::atomic::AtomicI64;
use loom::thread;
use loom::thread::JoinHandle;

use shm_counters::CachedClock;
use shm_counters::ConstLayout;
use shm_counters::CounterAllocator;
use shm_counters::RegionLayout;
use shm_counters::atomics;
use shm_counters::reader::foreach_metadata;

// A tiny layout keeps loom's state space small enough to explore exhaustively.
type TinyLayout = ConstLayout<8, 8>;

/// Carries a raw pointer into a reader thread.
///
/// Sound here because the pointed-to region outlives every thread spawned in
/// these tests (it is dropped only after every `JoinHandle` is joined).
struct SendPtr(*const u8);

// SAFETY: see `SendPtr`'s doc comment.
unsafe impl Send for SendPtr {}

/// Backed by `Box<[u64]>` rather than `Box<[u8]>`: `CounterAllocator::init`
/// requires both regions to be 8-byte aligned (`deadline_ms` is an `i64`,
/// the value slot an `AtomicI64`), which only a `u64`-or-wider element type
/// guarantees.
struct Regions {
  metadata: Box<[u64]>,
  values: Box<[u64]>,
}

impl Regions {
  fn new(capacity: usize) -> Self {
    Self {
      metadata: vec![0u64; capacity * RegionLayout::<TinyLayout>::metadata_record_bytes() / 8].into(),
      values: vec![0u64; capacity * RegionLayout::<TinyLayout>::value_record_bytes() / 8].into(),
    }
  }

  fn metadata_bytes(&self) -> usize {
    self.metadata.len() * 8
  }

  fn values_bytes(&self) -> usize {
    self.values.len() * 8
  }

  fn metadata_ptr(&self) -> *const u8 {
    self.metadata.as_ptr().cast::<u8>()
  }
}

/// Runs a reader thread concurrently with the single writer thread doing an
/// allocate-then-free cycle, and asserts the reader never observes a torn or
/// partially-written record: every visit sees the exact bytes the writer
/// published before its release store.
#[test]
fn reader_never_observes_a_torn_allocation() {
  loom::model(|| {
    let mut regions = Regions::new(2);
    let metadata_ptr = regions.metadata_ptr();
    let metadata_bytes = regions.metadata_bytes();
    let values_bytes = regions.values_bytes();

    // SAFETY: `regions.metadata`/`regions.values` outlive `allocator`.
    let mut allocator = unsafe {
      CounterAllocator::<TinyLayout, CachedClock>::init(
        regions.metadata.as_mut_ptr().cast::<u8>(),
        metadata_bytes,
        regions.values.as_mut_ptr().cast::<u8>(),
        values_bytes,
        CachedClock::new(),
        0,
      )
    }
    .unwrap();

    let id = allocator.allocate(7, b"key", b"label");
    assert!(id >= 0);
    let addr = allocator.addr(id).unwrap();
    // SAFETY: `addr` is live and `id` is allocated.
    unsafe { atomics::set_release(addr, 11) };

    let metadata_ptr = SendPtr(metadata_ptr);

    let reader: JoinHandle<()> = thread::spawn(move || {
      let metadata_ptr = metadata_ptr.0;
      // SAFETY: `metadata_ptr` is live for the duration of this closure,
      // which runs while `allocator` (and its regions) are still alive.
      unsafe {
        foreach_metadata::<TinyLayout, _>(metadata_ptr, 2, |seen_id, type_id, key, label| {
          assert_eq!(seen_id, id as u32);
          assert_eq!(type_id, 7);
          assert_eq!(&key[..3], b"key");
          assert_eq!(label, b"label");
        });
      }
    });

    allocator.free(id);
    reader.join().unwrap();
  });
}

/// Two threads racing to increment the same counter must never lose an
/// update: the sum of their fetch-add return values accounts for both
/// increments exactly once each.
#[test]
fn concurrent_increments_are_not_lost() {
  loom::model(|| {
    let cell = Arc::new(AtomicI64::new(0));

    let a = Arc::clone(&cell);
    let thread_a: JoinHandle<i64> = thread::spawn(move || {
      // SAFETY: `a` owns this memory for the duration of the closure.
      unsafe { atomics::increment_release(&raw const *a as *mut i64) }
    });

    let b = Arc::clone(&cell);
    let thread_b: JoinHandle<i64> = thread::spawn(move || {
      // SAFETY: see above.
      unsafe { atomics::increment_release(&raw const *b as *mut i64) }
    });

    let prior_a = thread_a.join().unwrap();
    let prior_b = thread_b.join().unwrap();

    assert_ne!(prior_a, prior_b);
    assert_eq!(cell.load(loom::sync::atomic::Ordering::Acquire), 2);
  });
}

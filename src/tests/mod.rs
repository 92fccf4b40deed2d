mod reader;

use crate::CachedClock;
use crate::CounterAllocator;
use crate::DefaultLayout;
use crate::RegionLayout;

/// A metadata + values region pair sized for `capacity` counters, plus the
/// allocator built over them.
///
/// Keeps the backing `Vec`s alive alongside the allocator so tests can hand
/// out raw pointers into them without juggling lifetimes by hand. Backed by
/// `Vec<u64>` rather than `Vec<u8>`: `CounterAllocator::init` requires both
/// regions to be 8-byte aligned (`deadline_ms` is an `i64`, the value slot an
/// `AtomicI64`), which only a `u64`-or-wider element type guarantees.
pub(crate) struct Harness {
  metadata: Vec<u64>,
  #[expect(dead_code, reason = "kept alive for its backing allocation; values region is read only through `allocator`")]
  values: Vec<u64>,
  pub(crate) allocator: CounterAllocator<'static, DefaultLayout, CachedClock>,
}

impl Harness {
  pub(crate) fn new(capacity: usize, cooldown_ms: u64) -> Self {
    let metadata_bytes = capacity * RegionLayout::<DefaultLayout>::metadata_record_bytes();
    let values_bytes = capacity * RegionLayout::<DefaultLayout>::value_record_bytes();

    let mut metadata = vec![0u64; metadata_bytes / 8];
    let mut values = vec![0u64; values_bytes / 8];

    let metadata_ptr = metadata.as_mut_ptr().cast::<u8>();
    let values_ptr = values.as_mut_ptr().cast::<u8>();

    // SAFETY: `metadata`/`values` are heap-allocated and will not move or
    // drop before `allocator` does — both live in this struct, and the
    // pointers handed to `init` are never invalidated by the `Vec`s growing,
    // since nothing here ever pushes to them after this point.
    let allocator = unsafe {
      CounterAllocator::init(
        metadata_ptr,
        metadata_bytes,
        values_ptr,
        values_bytes,
        CachedClock::new(),
        cooldown_ms,
      )
    }
    .unwrap();

    Self {
      metadata,
      values,
      allocator,
    }
  }

  pub(crate) fn metadata_ptr(&self) -> *const u8 {
    self.metadata.as_ptr().cast::<u8>()
  }
}

use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;

use shm_counters::CachedClock;
use shm_counters::CounterAllocator;
use shm_counters::DefaultLayout;
use shm_counters::RegionLayout;
use shm_counters::atomics;

/// Backed by `Vec<u64>` rather than `Vec<u8>`: `CounterAllocator::init`
/// requires both regions to be 8-byte aligned (`deadline_ms` is an `i64`,
/// the value slot an `AtomicI64`), which only a `u64`-or-wider element type
/// guarantees.
struct Regions {
  metadata: Vec<u64>,
  values: Vec<u64>,
}

impl Regions {
  fn new(capacity: usize) -> Self {
    Self {
      metadata: vec![0u64; capacity * RegionLayout::<DefaultLayout>::metadata_record_bytes() / 8],
      values: vec![0u64; capacity * RegionLayout::<DefaultLayout>::value_record_bytes() / 8],
    }
  }

  fn allocator(&mut self, cooldown_ms: u64) -> CounterAllocator<'_, DefaultLayout, CachedClock> {
    let metadata_bytes = self.metadata.len() * 8;
    let values_bytes = self.values.len() * 8;

    // SAFETY: `self.metadata`/`self.values` outlive the returned allocator.
    unsafe {
      CounterAllocator::init(
        self.metadata.as_mut_ptr().cast::<u8>(),
        metadata_bytes,
        self.values.as_mut_ptr().cast::<u8>(),
        values_bytes,
        CachedClock::new(),
        cooldown_ms,
      )
    }
    .unwrap()
  }
}

fn allocate_free_cycle(c: &mut Criterion) {
  let mut regions = Regions::new(1 << 12);
  let mut allocator = regions.allocator(0);

  c.bench_function("allocate_free_cycle", |b| {
    b.iter(|| {
      let id = allocator.allocate(black_box(1), black_box(b"bench.counter"), black_box(b""));
      allocator.free(black_box(id));
    });
  });
}

fn allocate_until_exhausted(c: &mut Criterion) {
  c.bench_function("allocate_until_exhausted_4096", |b| {
    b.iter(|| {
      let mut regions = Regions::new(1 << 12);
      let mut allocator = regions.allocator(0);

      for _ in 0..(1 << 12) {
        black_box(allocator.allocate(0, b"k", b""));
      }
    });
  });
}

fn get_acquire_hot_path(c: &mut Criterion) {
  let mut regions = Regions::new(1);
  let mut allocator = regions.allocator(0);
  let id = allocator.allocate(0, b"hot", b"");
  let addr = allocator.addr(id).unwrap();

  c.bench_function("get_acquire", |b| {
    // SAFETY: `addr` is live for the duration of this benchmark.
    b.iter(|| black_box(unsafe { atomics::get_acquire(black_box(addr)) }));
  });
}

fn increment_release_hot_path(c: &mut Criterion) {
  let mut regions = Regions::new(1);
  let mut allocator = regions.allocator(0);
  let id = allocator.allocate(0, b"hot", b"");
  let addr = allocator.addr(id).unwrap();

  c.bench_function("increment_release", |b| {
    // SAFETY: `addr` is live for the duration of this benchmark, and this
    // closure is the counter's only writer.
    b.iter(|| unsafe { atomics::increment_release(black_box(addr)) });
  });
}

criterion_group!(
  benches,
  allocate_free_cycle,
  allocate_until_exhausted,
  get_acquire_hot_path,
  increment_release_hot_path,
);
criterion_main!(benches);

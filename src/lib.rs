//! A lock-free, fixed-capacity allocator for named counters living in
//! caller-supplied shared-memory regions.
//!
//! # Overview
//!
//! [`CounterAllocator`] hands out small integer ids for 64-bit counters
//! backed by two byte regions the caller owns and maps however it likes —
//! typically a single memory-mapped file, opened read-write by one writer
//! process and read-only by any number of reader processes. The writer
//! allocates and frees ids and increments counter values; readers discover
//! which ids are live and read their values, all without any IPC beyond the
//! shared bytes themselves.
//!
//! ```
//! use shm_counters::CachedClock;
//! use shm_counters::CounterAllocator;
//! use shm_counters::DefaultLayout;
//! use shm_counters::RegionLayout;
//! use shm_counters::atomics;
//!
//! // `CounterAllocator::init` requires both regions to be 8-byte aligned —
//! // `deadline_ms` is read as an `i64` and the value slot as an `AtomicI64`.
//! // A `Vec<u64>` guarantees that; a `Vec<u8>` only guarantees 1-byte
//! // alignment (the global allocator tends to over-align small requests in
//! // practice, but nothing requires it to).
//! fn aligned_region(bytes: usize) -> Vec<u64> {
//!   assert_eq!(bytes % 8, 0);
//!   vec![0u64; bytes / 8]
//! }
//!
//! let capacity = 4;
//! let mut metadata = aligned_region(capacity * RegionLayout::<DefaultLayout>::metadata_record_bytes());
//! let mut values = aligned_region(capacity * RegionLayout::<DefaultLayout>::value_record_bytes());
//!
//! // SAFETY: `metadata`/`values` outlive `allocator`, and nothing else
//! // touches them while `allocator` is alive.
//! let mut allocator = unsafe {
//!   CounterAllocator::init(
//!     metadata.as_mut_ptr().cast::<u8>(),
//!     metadata.len() * 8,
//!     values.as_mut_ptr().cast::<u8>(),
//!     values.len() * 8,
//!     CachedClock::new(),
//!     0,
//!   )
//! }
//! .unwrap();
//!
//! let id = allocator.allocate(1, b"requests.total", b"Total requests");
//! assert!(id >= 0);
//!
//! let addr = allocator.addr(id).unwrap();
//! // SAFETY: `addr` is live and `id` is allocated.
//! unsafe { atomics::increment_release(addr) };
//! // SAFETY: see above.
//! assert_eq!(unsafe { atomics::get_acquire(addr) }, 1);
//! ```
//!
//! # Configuration
//!
//! Record shape — the width of the opaque key and the UTF-8 label — is
//! configured at compile time through the [`Layout`] trait. [`DefaultLayout`]
//! provides a 32-byte key and a 64-byte label; [`ConstLayout`] lets a caller
//! choose both:
//!
//! ```
//! use shm_counters::ConstLayout;
//! use shm_counters::RegionLayout;
//!
//! type Narrow = ConstLayout<8, 24>;
//! assert_eq!(RegionLayout::<Narrow>::metadata_record_bytes(), (16 + 8 + 4 + 24usize).next_multiple_of(8));
//! ```
//!
//! Unlike the table capacity a generic lock-free table usually fixes at
//! compile time, capacity here is a runtime property: it falls out of the
//! lengths of the two regions the caller supplies (see [`RegionLayout::new`]).
//!
//! # Concurrency
//!
//! There is exactly one writer per pair of regions. [`CounterAllocator`]'s
//! `allocate`/`free` take `&mut self` to make that assumption a property the
//! type system enforces within one process; across processes it remains a
//! contract the caller must uphold.
//!
//! Readers never call into [`CounterAllocator`] at all — they read the same
//! bytes directly through [`foreach_metadata`] and the functions in
//! [`atomics`], both of which take raw pointers rather than borrow anything,
//! because the whole premise of this crate is that those bytes are reachable
//! through more than one mapping at once. See each function's safety section
//! for the exact contract.
//!
//! ```
//! use shm_counters::DefaultLayout;
//! use shm_counters::reader::foreach_metadata;
//! # use shm_counters::{CachedClock, CounterAllocator, RegionLayout};
//! # let capacity = 2;
//! # let mut metadata = vec![0u64; capacity * RegionLayout::<DefaultLayout>::metadata_record_bytes() / 8];
//! # let mut values = vec![0u64; capacity * RegionLayout::<DefaultLayout>::value_record_bytes() / 8];
//! # let metadata_ptr = metadata.as_mut_ptr().cast::<u8>();
//! # let mut allocator = unsafe {
//! #   CounterAllocator::init(metadata_ptr, metadata.len() * 8, values.as_mut_ptr().cast::<u8>(), values.len() * 8, CachedClock::new(), 0)
//! # }.unwrap();
//! allocator.allocate(7, b"conn.open", b"Open connections");
//!
//! let mut seen = Vec::new();
//! // SAFETY: `metadata_ptr` is live for `capacity` records.
//! unsafe {
//!   foreach_metadata::<DefaultLayout, _>(metadata_ptr, capacity, |id, type_id, _key, label| {
//!     seen.push((id, type_id, label.to_vec()));
//!   });
//! }
//! assert_eq!(seen, vec![(0, 7, b"Open connections".to_vec())]);
//! ```
//!
//! # Memory Reclamation
//!
//! There is no epoch or generation tracking: a freed id is simply marked
//! `RECLAIMED` and becomes eligible for reuse once an optional cooldown
//! elapses, giving any reader mid-iteration time to finish observing it
//! before its bytes are overwritten by the next allocation. See
//! [`CounterAllocator::free`].
//!
//! # Memory Layout
//!
//! Metadata records are laid out byte-exactly (state, type id, deadline, key,
//! label length, label); value slots are padded to a full, often
//! double-width, cache line via [`CachePadded`] to isolate independently
//! incremented counters from false sharing. See [`RegionLayout`] for the
//! exact offsets.

mod allocator;
mod clock;
mod error;
mod layout;
mod padded;
mod record;

pub mod atomics;
pub mod reader;

#[cfg(all(test, not(loom)))]
mod tests;

pub use self::allocator::CounterAllocator;
pub use self::allocator::NO_ID;
pub use self::clock::CachedClock;
pub use self::clock::ClockReader;
pub use self::error::ConstructionError;
pub use self::layout::CACHE_LINE;
pub use self::layout::ConstLayout;
pub use self::layout::DefaultLayout;
pub use self::layout::HEADER_BYTES;
pub use self::layout::LABEL_LEN_BYTES;
pub use self::layout::Layout;
pub use self::layout::RegionLayout;
pub use self::padded::CachePadded;
pub use self::reader::CounterSnapshot;
pub use self::reader::collect_metadata;
pub use self::reader::foreach_metadata;
pub use self::reader::is_allocated;
pub use self::reader::label_of;
pub use self::reader::type_id_of;
pub use self::record::State;

pub(crate) mod sync {
  #[cfg(not(loom))]
  pub(crate) mod atomic {
    pub(crate) use ::core::sync::atomic::AtomicI64;
    pub(crate) use ::core::sync::atomic::AtomicU32;
    pub(crate) use ::core::sync::atomic::AtomicU64;
    pub(crate) use ::core::sync::atomic::Ordering;
  }

  #[cfg(loom)]
  pub(crate) mod atomic {
    pub(crate) use ::loom::sync::atomic::AtomicI64;
    pub(crate) use ::loom::sync::atomic::AtomicU32;
    pub(crate) use ::loom::sync::atomic::AtomicU64;
    pub(crate) use ::loom::sync::atomic::Ordering;
  }
}

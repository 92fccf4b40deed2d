//! Wait-free iteration over a metadata region, for reader processes that
//! never allocate or free anything.

use crate::layout::Layout;
use crate::layout::RegionLayout;
use crate::record::MetadataSlot;
use crate::record::State;

/// One allocated counter's metadata, captured at the moment of observation.
///
/// Owns copies of its key and label so it outlives the region scan that
/// produced it, unlike [`MetadataSlot`] which borrows nothing but also
/// promises nothing past the instant it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
  id: u32,
  type_id: i32,
  key: Vec<u8>,
  label: Vec<u8>,
}

impl CounterSnapshot {
  /// The counter's id within the region.
  #[inline]
  pub const fn id(&self) -> u32 {
    self.id
  }

  /// The caller-defined type tag supplied at allocation.
  #[inline]
  pub const fn type_id(&self) -> i32 {
    self.type_id
  }

  /// The raw, fixed-width key window (zero-padded trailing bytes included).
  #[inline]
  pub fn key(&self) -> &[u8] {
    &self.key
  }

  /// The label, at its actual recorded length (not padded).
  #[inline]
  pub fn label(&self) -> &[u8] {
    &self.label
  }

  /// The label interpreted as UTF-8, per its documented encoding.
  ///
  /// Returns an error rather than panicking: the label area is opaque bytes
  /// as far as the allocator is concerned, so a corrupt or foreign-encoded
  /// writer producing non-UTF-8 bytes is a reader-side concern, not a panic.
  #[inline]
  pub fn label_str(&self) -> Result<&str, std::str::Utf8Error> {
    std::str::from_utf8(&self.label)
  }
}

/// Visits every currently `ALLOCATED` counter in a metadata region.
///
/// Walks `id` from `0` to `capacity() - 1` in order, skipping any slot whose
/// acquire-ordered `state` load is not `ALLOCATED` at the instant it is
/// checked — including `RECLAIMED` slots, which are never distinguished from
/// `FREE` ones here. The scan never blocks and never terminates early: a
/// concurrent `allocate`/`free` on another id can only ever cause a given
/// slot to be included or excluded for this single pass, never cause the
/// scan itself to stall or skip an unrelated id.
///
/// `visitor` receives `(id, type_id, key, label)` for each `ALLOCATED` slot
/// it reaches. The key is always `L::KEY_BYTES` wide; the label is the
/// writer's actual recorded length.
///
/// # Safety
///
/// `metadata_base` must point to a live metadata region of at least
/// `capacity * RegionLayout::<L>::metadata_record_bytes()` bytes, readable
/// for the duration of the call. The writer is permitted to concurrently
/// `allocate`/`free` counters in the same region while this runs.
pub unsafe fn foreach_metadata<L, F>(metadata_base: *const u8, capacity: usize, mut visitor: F)
where
  L: Layout,
  F: FnMut(u32, i32, &[u8], &[u8]),
{
  let layout: RegionLayout<L> = RegionLayout::for_capacity(capacity);

  for id in 0..capacity {
    // SAFETY: `id` is in `0..capacity`, and `metadata_base` is live for
    // `capacity` records per the function's safety contract.
    let slot: MetadataSlot<L> =
      unsafe { MetadataSlot::new(layout.metadata_addr(metadata_base.cast_mut(), id)) };

    // SAFETY: the record is live; this is the acquire load that pairs with
    // the writer's release store in `CounterAllocator::allocate`.
    if unsafe { slot.state_acquire() } != State::Allocated {
      continue;
    }

    // SAFETY: `state_acquire` above returned `ALLOCATED`, so every byte the
    // writer stored before its release store (type_id, key, label) is now
    // visible to this thread.
    unsafe {
      visitor(id as u32, slot.read_type_id(), slot.read_key(), slot.read_label());
    }
  }
}

/// Collects [`foreach_metadata`]'s output into owned [`CounterSnapshot`]s.
///
/// Convenience wrapper for callers that want a `Vec` rather than a visitor
/// closure (diagnostics, tests); the hot iteration path is `foreach_metadata`
/// itself, which allocates nothing.
///
/// # Safety
///
/// Same contract as [`foreach_metadata`].
pub unsafe fn collect_metadata<L>(metadata_base: *const u8, capacity: usize) -> Vec<CounterSnapshot>
where
  L: Layout,
{
  let mut out: Vec<CounterSnapshot> = Vec::new();

  // SAFETY: forwarded from this function's own contract.
  unsafe {
    foreach_metadata::<L, _>(metadata_base, capacity, |id, type_id, key, label| {
      out.push(CounterSnapshot {
        id,
        type_id,
        key: key.to_vec(),
        label: label.to_vec(),
      });
    });
  }

  out
}

/// Returns `true` if counter `id` is currently `ALLOCATED`.
///
/// # Safety
///
/// `metadata_base` must point to a live metadata region of at least
/// `capacity * RegionLayout::<L>::metadata_record_bytes()` bytes, and `id`
/// must be in bounds.
pub unsafe fn is_allocated<L>(metadata_base: *const u8, capacity: usize, id: u32) -> bool
where
  L: Layout,
{
  let layout: RegionLayout<L> = RegionLayout::for_capacity(capacity);
  // SAFETY: forwarded from this function's own contract.
  let slot: MetadataSlot<L> =
    unsafe { MetadataSlot::new(layout.metadata_addr(metadata_base.cast_mut(), id as usize)) };
  // SAFETY: see above.
  unsafe { slot.state_acquire() == State::Allocated }
}

/// Returns counter `id`'s `type_id` if it is currently `ALLOCATED`, or `None`
/// otherwise.
///
/// For callers that already know the id they care about (a writer checking
/// its own counter, a diagnostic tool jumping straight to one slot) and would
/// rather not run a full [`foreach_metadata`] scan.
///
/// # Safety
///
/// Same contract as [`is_allocated`].
pub unsafe fn type_id_of<L>(metadata_base: *const u8, capacity: usize, id: u32) -> Option<i32>
where
  L: Layout,
{
  let layout: RegionLayout<L> = RegionLayout::for_capacity(capacity);
  // SAFETY: forwarded from this function's own contract.
  let slot: MetadataSlot<L> =
    unsafe { MetadataSlot::new(layout.metadata_addr(metadata_base.cast_mut(), id as usize)) };

  // SAFETY: see above.
  if unsafe { slot.state_acquire() } != State::Allocated {
    return None;
  }

  // SAFETY: `state_acquire` above returned `ALLOCATED`, so the writer's
  // `type_id` store is visible to this thread.
  Some(unsafe { slot.read_type_id() })
}

/// Returns a copy of counter `id`'s label if it is currently `ALLOCATED`, or
/// `None` otherwise.
///
/// # Safety
///
/// Same contract as [`is_allocated`].
pub unsafe fn label_of<L>(metadata_base: *const u8, capacity: usize, id: u32) -> Option<Vec<u8>>
where
  L: Layout,
{
  let layout: RegionLayout<L> = RegionLayout::for_capacity(capacity);
  // SAFETY: forwarded from this function's own contract.
  let slot: MetadataSlot<L> =
    unsafe { MetadataSlot::new(layout.metadata_addr(metadata_base.cast_mut(), id as usize)) };

  // SAFETY: see above.
  if unsafe { slot.state_acquire() } != State::Allocated {
    return None;
  }

  // SAFETY: see `type_id_of`.
  Some(unsafe { slot.read_label() }.to_vec())
}

//! The counter-ID allocator: the state machine governing allocation,
//! cooldown-delayed reuse, and metadata publication.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::marker::PhantomData;

use log::debug;
use log::warn;

use crate::atomics;
use crate::clock::CachedClock;
use crate::clock::ClockReader;
use crate::error::ConstructionError;
use crate::layout::DefaultLayout;
use crate::layout::Layout;
use crate::layout::RegionLayout;
use crate::record::MetadataSlot;
use crate::record::State;

/// Sentinel returned by [`CounterAllocator::allocate`] when no id is
/// reusable, or when the supplied key or label is too wide for the
/// configured [`Layout`].
pub const NO_ID: i32 = -1;

/// The counter-ID allocator.
///
/// Holds a non-owning handle to two externally-supplied byte regions — the
/// metadata region and the values region — whose lifetime must strictly
/// outlive the allocator. This is enforced as an explicit "caller
/// guarantees" contract at construction (see [`CounterAllocator::init`]'s
/// safety section) rather than as a Rust borrow, because the whole point of
/// this type is that *other* mappings of the same bytes (reader processes)
/// stay live and readable for as long as the writer keeps allocating —
/// something a `&mut` borrow in this process could never describe.
///
/// Only one `CounterAllocator` may exist per pair of regions at a time
/// (`spec.md`'s single-writer assumption); nothing in this type enforces
/// that across processes, same as the system it belongs to.
pub struct CounterAllocator<'regions, L = DefaultLayout, C = CachedClock>
where
  L: Layout,
{
  layout: RegionLayout<L>,
  metadata_base: *mut u8,
  values_base: *mut u8,
  clock: C,
  cooldown_ms: u64,
  next_new: u32,
  freed: BTreeSet<u32>,
  allocated: u32,
  closed: bool,
  marker: PhantomData<&'regions mut ()>,
}

impl<'regions, L, C> CounterAllocator<'regions, L, C>
where
  L: Layout,
  C: ClockReader,
{
  /// Builds an allocator over a pair of externally-supplied byte regions.
  ///
  /// Validates both region lengths against the record sizes implied by
  /// `L` (see [`RegionLayout::new`]) before doing anything else; on error,
  /// no region byte is touched.
  ///
  /// # Safety
  ///
  /// - `metadata` must be valid for reads and writes for `metadata_len`
  ///   bytes, for the lifetime `'regions`.
  /// - `values` must be valid for reads and writes for `values_len` bytes,
  ///   for the lifetime `'regions`.
  /// - The two regions must not overlap each other.
  /// - No other `CounterAllocator` may be constructed over either region
  ///   for as long as this one is alive (single-writer).
  /// - Both pointers must be aligned to at least 8 bytes.
  pub unsafe fn init(
    metadata: *mut u8,
    metadata_len: usize,
    values: *mut u8,
    values_len: usize,
    clock: C,
    cooldown_ms: u64,
  ) -> Result<Self, ConstructionError> {
    let layout: RegionLayout<L> = match RegionLayout::new(metadata_len, values_len) {
      Ok(layout) => layout,
      Err(error) => {
        warn!("shm-counters: rejecting region construction: {error}");
        return Err(error);
      }
    };

    Ok(Self {
      layout,
      metadata_base: metadata,
      values_base: values,
      clock,
      cooldown_ms,
      next_new: 0,
      freed: BTreeSet::new(),
      allocated: 0,
      closed: false,
      marker: PhantomData,
    })
  }

  /// The number of counter slots implied by the region lengths.
  #[inline]
  pub const fn capacity(&self) -> usize {
    self.layout.capacity()
  }

  /// The number of currently `ALLOCATED` counters.
  ///
  /// Diagnostic only; not part of the allocation contract.
  #[inline]
  pub const fn len(&self) -> usize {
    self.allocated as usize
  }

  /// Returns `true` if no counter is currently allocated.
  #[inline]
  pub const fn is_empty(&self) -> bool {
    self.allocated == 0
  }

  /// Returns the clock this allocator samples for cooldown deadlines.
  ///
  /// Exposed so the owner can advance a [`CachedClock`] it keeps fresh on
  /// its own duty cycle; the allocator never advances it itself.
  #[inline]
  pub const fn clock(&self) -> &C {
    &self.clock
  }

  #[inline]
  unsafe fn slot(&self, id: u32) -> MetadataSlot<L> {
    // SAFETY: `id` is always checked against `capacity()` before this is
    // called, and `metadata_base` is valid per the `init` safety contract.
    unsafe { MetadataSlot::new(self.layout.metadata_addr(self.metadata_base, id as usize)) }
  }

  /// Allocates a counter, writing `type_id`, `key`, and `label` to its
  /// metadata and zeroing its value slot.
  ///
  /// Returns the new counter's non-negative id, or [`NO_ID`] (`-1`) if no
  /// id is reusable or a never-used id is available, or if `key`/`label`
  /// are wider than the configured [`Layout`]. On any `NO_ID` outcome no
  /// slot is mutated.
  ///
  /// Prefers the lowest reusable id whose cooldown has elapsed; falls back
  /// to the lowest never-used id. This tie-break makes allocation order
  /// deterministic for tests, even though `spec.md` makes no guarantee
  /// about it for production callers.
  pub fn allocate(&mut self, type_id: i32, key: &[u8], label: &[u8]) -> i32 {
    if self.closed {
      debug!("shm-counters: allocate() on a closed allocator");
      return NO_ID;
    }

    let Some(reservation) = self.reserve_id() else {
      debug!("shm-counters: allocate() found no reusable or fresh id");
      return NO_ID;
    };

    let id: u32 = reservation.id();

    // SAFETY: `id` came from `reserve_id`, which only returns ids in
    // `0..capacity()`.
    let slot: MetadataSlot<L> = unsafe { self.slot(id) };

    // SAFETY: `id` was not yet published as `ALLOCATED`; we are the single
    // writer and no reader can be observing its key/label/type bytes yet.
    unsafe {
      if !slot.write_key(key) || !slot.write_label(label) {
        debug!("shm-counters: allocate() rejected an oversized key or label");
        self.release_reservation(reservation);
        return NO_ID;
      }

      slot.write_type_id(type_id);
      slot.set_state_release(State::Allocated);
    }

    self.allocated += 1;

    // SAFETY: `id` is in bounds and was just allocated.
    let value: *mut i64 = unsafe { self.layout.value_addr(self.values_base, id as usize) };
    // SAFETY: `value` addresses a live slot this allocation owns exclusively.
    unsafe { atomics::set_release(value, 0) };

    id as i32
  }

  /// Frees `id`, making it eligible for reuse once any configured cooldown
  /// elapses.
  ///
  /// Returns `0` on success. Returns a negative code without mutating
  /// anything if `id` is out of range (`-1`) or not currently `ALLOCATED`
  /// (`-2`) — a programming error per `spec.md`, reported rather than
  /// thrown.
  pub fn free(&mut self, id: i32) -> i32 {
    let Ok(id) = u32::try_from(id) else {
      warn!("shm-counters: free({id}) is out of range");
      return -1;
    };

    if !self.layout.in_bounds(id as usize) {
      warn!("shm-counters: free({id}) is out of range");
      return -1;
    }

    // SAFETY: bounds-checked above.
    let slot: MetadataSlot<L> = unsafe { self.slot(id) };

    // SAFETY: we are the single writer reading our own prior writes.
    if unsafe { slot.state_plain() } != State::Allocated {
      warn!("shm-counters: free({id}) called on a slot that is not ALLOCATED");
      return -2;
    }

    if self.cooldown_ms == 0 {
      // SAFETY: see above.
      unsafe { slot.set_state_plain(State::Free) };
    } else {
      let deadline: u64 = self.clock.now_ms().saturating_add(self.cooldown_ms);

      // SAFETY: see above.
      unsafe {
        slot.write_deadline(deadline as i64);
        slot.set_state_plain(State::Reclaimed);
      }
    }

    self.freed.insert(id);
    self.allocated = self.allocated.saturating_sub(1);

    0
  }

  /// Returns the address of counter `id`'s value slot, for use with the
  /// functions in [`crate::atomics`].
  ///
  /// Returns `None` if `id` is out of range. Does not check whether `id`
  /// is currently allocated — the caller is expected to already hold a
  /// valid id (e.g. one just returned by `allocate`).
  #[inline]
  pub fn addr(&self, id: i32) -> Option<*mut i64> {
    let id: u32 = u32::try_from(id).ok()?;

    if !self.layout.in_bounds(id as usize) {
      return None;
    }

    // SAFETY: bounds-checked above.
    Some(unsafe { self.layout.value_addr(self.values_base, id as usize) })
  }

  /// Stops accepting new allocations.
  ///
  /// Subsequent `allocate` calls behave as if capacity were exhausted
  /// (`NO_ID`), without mutating any slot. There is nothing to actually
  /// deallocate — the regions are borrowed — so this only flips that one
  /// flag; it exists to give "releases any internal state" from `spec.md`
  /// a concrete, testable meaning.
  #[inline]
  pub fn close(&mut self) {
    self.closed = true;
  }

  /// Finds and reserves the next id to allocate, without touching the
  /// metadata region.
  fn reserve_id(&mut self) -> Option<Reservation> {
    let now: u64 = self.clock.now_ms();

    let reusable: Option<u32> = self.freed.iter().copied().find(|&id| {
      // SAFETY: every id in `freed` is in `0..capacity()`.
      let slot: MetadataSlot<L> = unsafe { self.slot(id) };

      // SAFETY: we are the single writer reading our own prior writes.
      match unsafe { slot.state_plain() } {
        State::Free => true,
        // SAFETY: see above.
        State::Reclaimed => now >= unsafe { slot.read_deadline() } as u64,
        State::Allocated => false,
      }
    });

    if let Some(id) = reusable {
      self.freed.remove(&id);
      return Some(Reservation::Reused(id));
    }

    if (self.next_new as usize) < self.capacity() {
      let id: u32 = self.next_new;
      self.next_new += 1;
      return Some(Reservation::Fresh(id));
    }

    None
  }

  /// Undoes `reserve_id` for an id whose allocation was aborted after
  /// reservation (oversized key/label). The id goes back in front of the
  /// line: it was never published as `ALLOCATED`, so it is immediately
  /// reusable again.
  fn release_reservation(&mut self, reservation: Reservation) {
    match reservation {
      // `reserve_id` only ever hands out `self.next_new - 1` as a `Fresh`
      // id, so undoing it is always safe to roll back directly rather than
      // re-deriving that fact from the id's numeric value.
      Reservation::Fresh(id) => {
        debug_assert_eq!(id + 1, self.next_new);
        self.next_new -= 1;
      }
      Reservation::Reused(id) => {
        self.freed.insert(id);
      }
    }
  }
}

/// Which path `reserve_id` took to produce an id, so `release_reservation`
/// can undo it precisely instead of inferring the path from the id's value.
enum Reservation {
  /// Taken from the free list (either `FREE` or a cooled-down `RECLAIMED`).
  Reused(u32),
  /// Never allocated before; `next_new` was bumped past it.
  Fresh(u32),
}

impl Reservation {
  #[inline]
  const fn id(&self) -> u32 {
    match *self {
      Reservation::Reused(id) | Reservation::Fresh(id) => id,
    }
  }
}

impl<L, C> Debug for CounterAllocator<'_, L, C>
where
  L: Layout,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("CounterAllocator")
      .field("capacity", &self.capacity())
      .field("len", &self.len())
      .field("cooldown_ms", &self.cooldown_ms)
      .field("closed", &self.closed)
      .finish()
  }
}

//! Byte-exact views over a single metadata record.
//!
//! A metadata record is, in order: a 4-byte atomic `state`, a 4-byte
//! `type_id`, an 8-byte `deadline_ms`, a `KEY_BYTES`-wide key window, a
//! 4-byte label length prefix, and a `LABEL_BYTES`-wide label window. See
//! [`Layout`] for how `KEY_BYTES`/`LABEL_BYTES` are configured.

use core::marker::PhantomData;
use core::slice;

use crate::sync::atomic::AtomicU32;
use crate::sync::atomic::Ordering::Acquire;
use crate::sync::atomic::Ordering::Relaxed;
use crate::sync::atomic::Ordering::Release;

use crate::layout::Layout;
use crate::layout::LayoutExt;

/// The three-state lifecycle of a metadata slot.
///
/// `FREE -> ALLOCATED -> RECLAIMED -> FREE`, monotone within one lifecycle
/// (the final `RECLAIMED -> FREE` edge is delayed by the allocator's
/// cooldown).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum State {
  /// Never allocated, or reclaimed and past its cooldown: eligible for the
  /// next `allocate`.
  Free = 0,
  /// Live: owned by the single writer that allocated it.
  Allocated = 1,
  /// Freed with a nonzero cooldown; not yet eligible for reuse.
  Reclaimed = 2,
}

impl State {
  #[inline]
  const fn from_raw(raw: u32) -> Self {
    match raw {
      0 => State::Free,
      1 => State::Allocated,
      _ => State::Reclaimed,
    }
  }
}

const STATE_OFFSET: usize = 0;
const TYPE_ID_OFFSET: usize = 4;
const DEADLINE_OFFSET: usize = 8;

/// A view over one metadata record, addressed at `base`.
///
/// Carries no lifetime of its own (the same reasons as [`crate::atomics`]
/// apply: the record is concurrently reachable through independent mappings
/// of the metadata region). Every method documents its own safety contract.
#[derive(Clone, Copy)]
pub(crate) struct MetadataSlot<L>
where
  L: Layout,
{
  base: *mut u8,
  marker: PhantomData<fn(L)>,
}

impl<L> MetadataSlot<L>
where
  L: Layout,
{
  /// # Safety
  ///
  /// `base` must point to a live metadata record of `RegionLayout::<L>::
  /// metadata_record_bytes()` bytes, 8-byte aligned (so that `state`,
  /// `type_id`, and `deadline_ms` each land at their required alignment).
  #[inline]
  pub(crate) const unsafe fn new(base: *mut u8) -> Self {
    Self {
      base,
      marker: PhantomData,
    }
  }

  #[inline]
  unsafe fn state_cell(&self) -> &AtomicU32 {
    // SAFETY: `state` lives at offset 0 and `AtomicU32` has the same size
    // and alignment as `u32`. Caller of `new` guarantees `base` is live.
    unsafe { &*self.base.add(STATE_OFFSET).cast::<AtomicU32>() }
  }

  /// Acquire-ordered load of `state`.
  ///
  /// # Safety
  ///
  /// The record must still be live (the region has not been unmapped).
  #[inline]
  pub(crate) unsafe fn state_acquire(&self) -> State {
    // SAFETY: see function contract.
    State::from_raw(unsafe { self.state_cell() }.load(Acquire))
  }

  /// Plain load of `state`, for the single writer's own bookkeeping.
  ///
  /// # Safety
  ///
  /// The record must still be live.
  #[inline]
  pub(crate) unsafe fn state_plain(&self) -> State {
    // SAFETY: see function contract.
    State::from_raw(unsafe { self.state_cell() }.load(Relaxed))
  }

  /// Release-ordered store of `state`. This is the linearization point at
  /// which a `FREE -> ALLOCATED` transition becomes visible to readers.
  ///
  /// # Safety
  ///
  /// The record must still be live, and the caller must be the region's
  /// single writer.
  #[inline]
  pub(crate) unsafe fn set_state_release(&self, state: State) {
    // SAFETY: see function contract.
    unsafe { self.state_cell() }.store(state as u32, Release);
  }

  /// Plain store of `state`, used for the cooldown-free `ALLOCATED ->
  /// FREE` edge and the `ALLOCATED -> RECLAIMED` edge, neither of which a
  /// concurrent reader needs acquire-paired visibility for (readers treat
  /// both `FREE` and `RECLAIMED` identically: skip and continue).
  ///
  /// # Safety
  ///
  /// The record must still be live, and the caller must be the region's
  /// single writer.
  #[inline]
  pub(crate) unsafe fn set_state_plain(&self, state: State) {
    // SAFETY: see function contract.
    unsafe { self.state_cell() }.store(state as u32, Relaxed);
  }

  /// Plain store of `type_id`.
  ///
  /// # Safety
  ///
  /// The record must still be live, and the caller must be the region's
  /// single writer, and must perform this store before the `ALLOCATED`
  /// release store in [`set_state_release`](Self::set_state_release).
  #[inline]
  pub(crate) unsafe fn write_type_id(&self, type_id: i32) {
    // SAFETY: see function contract; `type_id` lives at a 4-byte-aligned
    // offset within a record whose base is at least 4-byte aligned.
    unsafe {
      self.base.add(TYPE_ID_OFFSET).cast::<i32>().write(type_id);
    }
  }

  /// Plain load of `type_id`.
  ///
  /// # Safety
  ///
  /// The record must still be live. Callers observing `state == ALLOCATED`
  /// with acquire ordering first are guaranteed to see the writer's store.
  #[inline]
  pub(crate) unsafe fn read_type_id(&self) -> i32 {
    // SAFETY: see function contract.
    unsafe { self.base.add(TYPE_ID_OFFSET).cast::<i32>().read() }
  }

  /// Plain store of `deadline_ms`.
  ///
  /// # Safety
  ///
  /// The record must still be live, and the caller must be the region's
  /// single writer. `base` must be 8-byte aligned: `LayoutExt::RECORD_BYTES`
  /// is padded to a multiple of 8 precisely so that `base + DEADLINE_OFFSET`
  /// (`DEADLINE_OFFSET == 8`) stays 8-aligned for every slot index, not just
  /// slot 0.
  #[inline]
  pub(crate) unsafe fn write_deadline(&self, deadline_ms: i64) {
    // SAFETY: see function contract.
    unsafe {
      self.base.add(DEADLINE_OFFSET).cast::<i64>().write(deadline_ms);
    }
  }

  /// Plain load of `deadline_ms`.
  ///
  /// # Safety
  ///
  /// The record must still be live, and `base` must be 8-byte aligned (see
  /// [`write_deadline`](Self::write_deadline)).
  #[inline]
  pub(crate) unsafe fn read_deadline(&self) -> i64 {
    // SAFETY: see function contract.
    unsafe { self.base.add(DEADLINE_OFFSET).cast::<i64>().read() }
  }

  /// Writes `key`, zero-padding the remainder of the key area.
  ///
  /// Returns `false` without writing anything if `key` is wider than the
  /// configured key area.
  ///
  /// # Safety
  ///
  /// The record must still be live, and the caller must be the region's
  /// single writer.
  #[inline]
  pub(crate) unsafe fn write_key(&self, key: &[u8]) -> bool {
    if key.len() > L::KEY_BYTES {
      return false;
    }

    // SAFETY: `L::KEY_OFFSET..L::KEY_OFFSET + L::KEY_BYTES` lies within the
    // record by construction of `RegionLayout::new`.
    unsafe {
      let dst: *mut u8 = self.base.add(<L as LayoutExt>::KEY_OFFSET);
      dst.copy_from_nonoverlapping(key.as_ptr(), key.len());
      dst.add(key.len()).write_bytes(0, L::KEY_BYTES - key.len());
    }

    true
  }

  /// Returns a view of the raw key area (always `KEY_BYTES` long; unused
  /// trailing bytes are zero).
  ///
  /// # Safety
  ///
  /// The record must still be live for the lifetime of the returned slice.
  /// Callers observing `state == ALLOCATED` with acquire ordering first are
  /// guaranteed to see the writer's store.
  #[inline]
  pub(crate) unsafe fn read_key<'a>(&self) -> &'a [u8] {
    // SAFETY: see function contract.
    unsafe { slice::from_raw_parts(self.base.add(<L as LayoutExt>::KEY_OFFSET), L::KEY_BYTES) }
  }

  /// Writes `label_len` and `label`, zero-padding the remainder of the label
  /// area.
  ///
  /// Returns `false` without writing anything if `label` is wider than the
  /// configured label area.
  ///
  /// # Safety
  ///
  /// The record must still be live, and the caller must be the region's
  /// single writer.
  #[inline]
  pub(crate) unsafe fn write_label(&self, label: &[u8]) -> bool {
    if label.len() > L::LABEL_BYTES {
      return false;
    }

    // SAFETY: `L::LABEL_LEN_OFFSET`/`L::LABEL_OFFSET` lie within the record
    // by construction of `RegionLayout::new`.
    unsafe {
      self
        .base
        .add(<L as LayoutExt>::LABEL_LEN_OFFSET)
        .cast::<u32>()
        .write(label.len() as u32);

      let dst: *mut u8 = self.base.add(<L as LayoutExt>::LABEL_OFFSET);
      dst.copy_from_nonoverlapping(label.as_ptr(), label.len());
      dst.add(label.len()).write_bytes(0, L::LABEL_BYTES - label.len());
    }

    true
  }

  /// Returns the live label as a byte slice (`label_len` bytes, not padded).
  ///
  /// # Safety
  ///
  /// The record must still be live for the lifetime of the returned slice.
  /// Callers observing `state == ALLOCATED` with acquire ordering first are
  /// guaranteed to see the writer's store.
  #[inline]
  pub(crate) unsafe fn read_label<'a>(&self) -> &'a [u8] {
    // SAFETY: see function contract.
    unsafe {
      let len: u32 = self.base.add(<L as LayoutExt>::LABEL_LEN_OFFSET).cast::<u32>().read();
      let len: usize = (len as usize).min(L::LABEL_BYTES);
      slice::from_raw_parts(self.base.add(<L as LayoutExt>::LABEL_OFFSET), len)
    }
  }
}

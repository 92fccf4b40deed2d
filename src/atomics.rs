//! Atomic primitives over value-slot addresses returned by
//! [`CounterAllocator::addr`](crate::allocator::CounterAllocator::addr).
//!
//! Every function here takes a raw pointer rather than a reference because
//! the same slot is concurrently reachable through independent mappings of
//! the values region (one per reader process, plus the writer's own
//! mapping) — there is no single Rust reference that could soundly describe
//! "the" borrow of the slot. Each function instead documents the safety
//! contract directly, the way the teacher crate documents `Array::
//! get_unchecked`.

use crate::sync::atomic::AtomicI64;
use crate::sync::atomic::Ordering;
use crate::sync::atomic::Ordering::Acquire;
use crate::sync::atomic::Ordering::Relaxed;
use crate::sync::atomic::Ordering::Release;

#[inline]
unsafe fn atomic<'a>(p: *mut i64) -> &'a AtomicI64 {
  // SAFETY: `AtomicI64` is `#[repr(transparent)]` over `i64` with identical
  // size and alignment, so a pointer valid for `i64` reads/writes is valid
  // for atomic reads/writes of the same width. Caller guarantees `p` is
  // live, properly aligned, and points into a value slot for as long as the
  // returned reference is used.
  unsafe { &*p.cast::<AtomicI64>() }
}

/// Non-atomic load of the counter at `p`.
///
/// # Safety
///
/// `p` must be a live, properly aligned pointer returned by `addr(id)` for
/// some still-allocated `id`. The caller is responsible for ensuring no
/// concurrent writer is using a release/plain store on the same address
/// without the appropriate synchronization for this load to be data-race
/// free (this variant carries no ordering of its own).
#[inline]
pub unsafe fn get_plain(p: *const i64) -> i64 {
  // SAFETY: see function contract.
  unsafe { p.read() }
}

/// Acquire-ordered load of the counter at `p`.
///
/// Pairs with any release store performed by the writer (`set_release`,
/// `increment_release`, `get_and_add_release`, `propose_max_release`): a
/// reader observing the new value is guaranteed to see every write the
/// writer performed before that release store.
///
/// # Safety
///
/// `p` must be a live, properly aligned pointer returned by `addr(id)` for
/// some still-allocated `id`.
#[inline]
pub unsafe fn get_acquire(p: *const i64) -> i64 {
  // SAFETY: see function contract.
  unsafe { atomic(p.cast_mut()).load(Acquire) }
}

/// Release-ordered store of `v` to the counter at `p`.
///
/// # Safety
///
/// `p` must be a live, properly aligned pointer returned by `addr(id)` for
/// some still-allocated `id`, and the caller must be the counter's single
/// writer.
#[inline]
pub unsafe fn set_release(p: *mut i64, v: i64) {
  // SAFETY: see function contract.
  unsafe { atomic(p).store(v, Release) };
}

/// Fetch-and-add of `+1` with no ordering, returning the prior value.
///
/// # Safety
///
/// `p` must be a live, properly aligned pointer returned by `addr(id)` for
/// some still-allocated `id`.
#[inline]
pub unsafe fn increment_plain(p: *mut i64) -> i64 {
  // SAFETY: see function contract.
  unsafe { atomic(p).fetch_add(1, Relaxed) }
}

/// Fetch-and-add of `+1`, publishing the new value with release ordering,
/// returning the prior value.
///
/// # Safety
///
/// `p` must be a live, properly aligned pointer returned by `addr(id)` for
/// some still-allocated `id`, and the caller must be the counter's single
/// writer.
#[inline]
pub unsafe fn increment_release(p: *mut i64) -> i64 {
  // SAFETY: see function contract.
  unsafe { atomic(p).fetch_add(1, Release) }
}

/// Fetch-and-add of an arbitrary (possibly negative) delta with no
/// ordering, returning the prior value.
///
/// # Safety
///
/// `p` must be a live, properly aligned pointer returned by `addr(id)` for
/// some still-allocated `id`.
#[inline]
pub unsafe fn get_and_add_plain(p: *mut i64, delta: i64) -> i64 {
  // SAFETY: see function contract.
  unsafe { atomic(p).fetch_add(delta, Relaxed) }
}

/// Fetch-and-add of an arbitrary (possibly negative) delta, publishing the
/// new value with release ordering, returning the prior value.
///
/// # Safety
///
/// `p` must be a live, properly aligned pointer returned by `addr(id)` for
/// some still-allocated `id`, and the caller must be the counter's single
/// writer.
#[inline]
pub unsafe fn get_and_add_release(p: *mut i64, delta: i64) -> i64 {
  // SAFETY: see function contract.
  unsafe { atomic(p).fetch_add(delta, Release) }
}

/// Stores `v` iff `v` is strictly greater than the current value, with no
/// ordering. Returns `true` iff it stored.
///
/// # Safety
///
/// `p` must be a live, properly aligned pointer returned by `addr(id)` for
/// some still-allocated `id`.
#[inline]
pub unsafe fn propose_max_plain(p: *mut i64, v: i64) -> bool {
  // SAFETY: see function contract.
  unsafe { propose_max(p, v, Relaxed, Relaxed) }
}

/// Stores `v` iff `v` is strictly greater than the current value, publishing
/// a successful store with release ordering. Returns `true` iff it stored.
///
/// # Safety
///
/// `p` must be a live, properly aligned pointer returned by `addr(id)` for
/// some still-allocated `id`, and the caller must be the counter's single
/// writer.
#[inline]
pub unsafe fn propose_max_release(p: *mut i64, v: i64) -> bool {
  // SAFETY: see function contract.
  unsafe { propose_max(p, v, Release, Relaxed) }
}

#[inline]
unsafe fn propose_max(p: *mut i64, v: i64, success: Ordering, failure: Ordering) -> bool {
  // SAFETY: see caller contracts above.
  let cell: &AtomicI64 = unsafe { atomic(p) };
  let mut current: i64 = cell.load(Relaxed);

  loop {
    if v <= current {
      return false;
    }

    match cell.compare_exchange_weak(current, v, success, failure) {
      Ok(_) => return true,
      Err(observed) => current = observed,
    }
  }
}

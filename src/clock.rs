//! A coarse, externally-driven clock sampled on the allocator's hot path.

use crate::sync::atomic::AtomicU64;
use crate::sync::atomic::Ordering::Relaxed;

/// A time source the allocator can sample without a syscall.
///
/// Production code implements this over a real monotonic timer updated by
/// the writer's duty cycle (e.g. once per event-loop tick); tests implement
/// it by advancing a [`CachedClock`] directly. The clock is never advanced
/// by readers — it is the writer's responsibility alone.
pub trait ClockReader {
  /// Returns the clock's current millisecond reading.
  ///
  /// The freshness bound is whatever cadence the owner chooses to update the
  /// clock at; the allocator never blocks waiting for a fresher sample.
  fn now_ms(&self) -> u64;
}

/// A shared, coarse time source: a millisecond counter plus a nanosecond
/// counter for sub-millisecond precision where a caller wants it.
///
/// Sampled with plain loads on the allocator's hot path (no ordering is
/// needed: the cooldown check only ever needs an approximately-fresh value,
/// never a value causally linked to another memory operation).
pub struct CachedClock {
  time_ms: AtomicU64,
  time_ns: AtomicU64,
}

impl Default for CachedClock {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl CachedClock {
  /// Creates a clock reading zero.
  #[inline]
  pub const fn new() -> Self {
    Self {
      time_ms: AtomicU64::new(0),
      time_ns: AtomicU64::new(0),
    }
  }

  /// Creates a clock seeded with an initial reading.
  #[inline]
  pub const fn with_time(time_ms: u64, time_ns: u64) -> Self {
    Self {
      time_ms: AtomicU64::new(time_ms),
      time_ns: AtomicU64::new(time_ns),
    }
  }

  /// Returns the current nanosecond reading.
  #[inline]
  pub fn now_ns(&self) -> u64 {
    self.time_ns.load(Relaxed)
  }

  /// Advances the clock to an absolute millisecond/nanosecond reading.
  ///
  /// Called by the single external agent responsible for keeping the clock
  /// fresh (the writer's duty cycle in production, the test harness in
  /// tests). Plain store: no reader ever synchronizes on the clock itself.
  #[inline]
  pub fn advance_to(&self, time_ms: u64, time_ns: u64) {
    self.time_ms.store(time_ms, Relaxed);
    self.time_ns.store(time_ns, Relaxed);
  }
}

impl ClockReader for CachedClock {
  #[inline]
  fn now_ms(&self) -> u64 {
    self.time_ms.load(Relaxed)
  }
}

impl ClockReader for &CachedClock {
  #[inline]
  fn now_ms(&self) -> u64 {
    CachedClock::now_ms(self)
  }
}

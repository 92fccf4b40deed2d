//! Construction-time error taxonomy.
//!
//! Only construction is fallible in the `Result`/`Error` sense. Allocation
//! and free failures are reported through sentinel return codes (see
//! [`allocator`](crate::allocator)) because that is the contract the
//! writer's hot path actually relies on — promoting them to `Result` would
//! change the calling convention the rest of the system is built around.

use thiserror::Error;

/// Reasons a [`CounterAllocator::init`] call can be rejected.
///
/// [`CounterAllocator::init`]: crate::allocator::CounterAllocator::init
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConstructionError {
  /// The metadata region's length is not a positive exact multiple of the
  /// metadata record size.
  #[error("metadata region length {len} is not a multiple of the record size {record}")]
  MetadataLengthNotMultiple {
    /// Length of the supplied metadata region, in bytes.
    len: usize,
    /// Size of one metadata record, in bytes (`R_m`).
    record: usize,
  },

  /// The values region's length is not a positive exact multiple of the
  /// value record size.
  #[error("values region length {len} is not a multiple of the record size {record}")]
  ValuesLengthNotMultiple {
    /// Length of the supplied values region, in bytes.
    len: usize,
    /// Size of one value record, in bytes (`R_v`).
    record: usize,
  },

  /// The metadata and values regions imply different capacities.
  #[error("metadata region implies capacity {metadata}, values region implies capacity {values}")]
  CapacityMismatch {
    /// Capacity implied by the metadata region's length.
    metadata: usize,
    /// Capacity implied by the values region's length.
    values: usize,
  },

  /// The configured key area, together with the mutable record header, does
  /// not fit within two cache lines.
  #[error("header ({header}B) + key area ({key}B) exceeds the {limit}B false-sharing isolation limit")]
  KeyAreaTooWide {
    /// Bytes occupied by the mutable header (state, type id, deadline).
    header: usize,
    /// Bytes occupied by the configured key area.
    key: usize,
    /// The limit the combination must not exceed (two cache lines).
    limit: usize,
  },

  /// The requested cooldown could not be represented.
  ///
  /// Cooldowns are plain `u64` milliseconds today, so every value is valid
  /// and this variant is currently unreachable. It is kept in the taxonomy
  /// so a future unit-typed cooldown (e.g. `Duration`, which can represent
  /// spans `CachedClock` cannot) has somewhere to report rejection without
  /// another breaking change to this enum.
  #[error("cooldown value {millis}ms cannot be represented")]
  InvalidCooldown {
    /// The rejected cooldown, in milliseconds.
    millis: u64,
  },
}

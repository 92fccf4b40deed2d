//! Record shapes and byte-exact addressing into the caller's regions.

use core::any;
use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use core::marker::PhantomData;

use crate::error::ConstructionError;
use crate::padded::CachePadded;

// -----------------------------------------------------------------------------
// Cache-line Properties
// -----------------------------------------------------------------------------

/// The size of a cache line in bytes, derived the same way the value-slot
/// padding is derived: by measuring a [`CachePadded`] unit.
///
/// The value slot is padded to this width, which on x86_64/aarch64 is twice
/// the nominal 64-byte line (defeating adjacent-line prefetch), satisfying
/// "at least one full cache line" everywhere.
pub const CACHE_LINE: usize = size_of::<CachePadded<u8>>();

const _: () = assert!(CACHE_LINE.is_power_of_two(), "CACHE_LINE must be a power of two");

/// Bytes occupied by the mutable header fields: `state` (4) + `type_id` (4) +
/// `deadline_ms` (8).
pub const HEADER_BYTES: usize = 16;

/// Bytes occupied by the label's length prefix.
pub const LABEL_LEN_BYTES: usize = 4;

// -----------------------------------------------------------------------------
// Configurable Layout
// -----------------------------------------------------------------------------

/// Compile-time configuration of a metadata record's key and label areas.
///
/// This plays the same role the teacher crate's `Params` trait plays for
/// table capacity, but fixes the *record shape* instead: capacity itself is
/// not a compile-time property here, since it is implied by the caller's
/// region length (see [`RegionLayout`]).
///
/// # Implementing `Layout`
///
/// ```
/// use shm_counters::{Layout, RegionLayout};
///
/// struct WideKeys;
///
/// impl Layout for WideKeys {
///   const KEY_BYTES: usize = 48;
///   const LABEL_BYTES: usize = 96;
/// }
///
/// assert_eq!(RegionLayout::<WideKeys>::metadata_record_bytes(), (16 + 48 + 4 + 96usize).next_multiple_of(8));
/// ```
pub trait Layout: Sized + 'static {
  /// Width in bytes of the opaque key window.
  const KEY_BYTES: usize = DefaultLayout::KEY_BYTES;

  /// Maximum width in bytes of the UTF-8 label.
  const LABEL_BYTES: usize = DefaultLayout::LABEL_BYTES;
}

/// The default record shape: a 32-byte key window and a 64-byte label.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct DefaultLayout;

impl Layout for DefaultLayout {
  const KEY_BYTES: usize = 32;
  const LABEL_BYTES: usize = 64;
}

/// A [`Layout`] with compile-time configurable key and label widths.
///
/// ```
/// use shm_counters::{ConstLayout, RegionLayout};
///
/// type Narrow = ConstLayout<8, 24>;
/// assert_eq!(RegionLayout::<Narrow>::metadata_record_bytes(), (16 + 8 + 4 + 24usize).next_multiple_of(8));
/// ```
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub struct ConstLayout<const K: usize, const L: usize>;

impl<const K: usize, const L: usize> Layout for ConstLayout<K, L> {
  const KEY_BYTES: usize = K;
  const LABEL_BYTES: usize = L;
}

mod private {
  pub trait Sealed {}
  impl<P> Sealed for P where P: super::Layout {}
}

/// Derived record offsets computed from a [`Layout`].
///
/// Automatically implemented for every type implementing [`Layout`]; not
/// meant to be implemented directly.
pub trait LayoutExt: Layout + private::Sealed {
  /// Offset of the key area within a metadata record.
  const KEY_OFFSET: usize = HEADER_BYTES;

  /// Offset of the label's length prefix within a metadata record.
  const LABEL_LEN_OFFSET: usize = Self::KEY_OFFSET + Self::KEY_BYTES;

  /// Offset of the label bytes within a metadata record.
  const LABEL_OFFSET: usize = Self::LABEL_LEN_OFFSET + LABEL_LEN_BYTES;

  /// Unpadded content size: header + key area + label length prefix + label.
  const CONTENT_BYTES: usize = Self::LABEL_OFFSET + Self::LABEL_BYTES;

  /// Total size in bytes of a metadata record (`R_m`).
  ///
  /// Padded up from [`CONTENT_BYTES`](Self::CONTENT_BYTES) to a multiple of
  /// 8: slot `i`'s fields sit at absolute offset `i * RECORD_BYTES + field_
  /// offset`, and `deadline_ms` (an `i64`) needs 8-byte alignment there
  /// regardless of `i` — which only holds if the stride itself is a
  /// multiple of 8. Un-padded, an odd `RECORD_BYTES` (e.g. the default
  /// layout's 116-byte content, `116 % 8 == 4`) would put every odd slot's
  /// `deadline_ms` at a 4-mod-8 offset, a misaligned `i64` access.
  const RECORD_BYTES: usize = Self::CONTENT_BYTES.next_multiple_of(8);

  /// Asserts the false-sharing isolation invariant from the data model (the
  /// mutable header plus the key area must fit within two cache lines), and
  /// the alignment invariant the padding above exists to guarantee.
  fn validate() -> Result<(), ConstructionError> {
    if HEADER_BYTES + Self::KEY_BYTES > 2 * CACHE_LINE {
      return Err(ConstructionError::KeyAreaTooWide {
        header: HEADER_BYTES,
        key: Self::KEY_BYTES,
        limit: 2 * CACHE_LINE,
      });
    }

    debug_assert!(
      Self::RECORD_BYTES.is_multiple_of(8),
      "RECORD_BYTES must be a multiple of 8 so deadline_ms (i64) and state/type_id \
       (u32) land at their required alignment in every slot, not just slot 0"
    );

    Ok(())
  }
}

impl<P> LayoutExt for P where P: Layout {}

// -----------------------------------------------------------------------------
// Region Layout & Addressing
// -----------------------------------------------------------------------------

/// Bit-exact addressing into a pair of caller-supplied byte regions.
///
/// `RegionLayout` is a pure, stateless view: it holds no pointers, only the
/// capacity implied by the region lengths. [`CounterAllocator`] and
/// [`foreach_metadata`] both build their addressing on top of it.
///
/// [`CounterAllocator`]: crate::allocator::CounterAllocator
/// [`foreach_metadata`]: crate::reader::foreach_metadata
#[derive(Clone, Copy)]
pub struct RegionLayout<L = DefaultLayout>
where
  L: Layout,
{
  capacity: usize,
  marker: PhantomData<fn(L)>,
}

impl<L> RegionLayout<L>
where
  L: Layout,
{
  /// The size in bytes of one metadata record (`R_m`).
  #[inline]
  pub const fn metadata_record_bytes() -> usize {
    <L as LayoutExt>::RECORD_BYTES
  }

  /// The size in bytes of one value slot (`R_v`).
  #[inline]
  pub const fn value_record_bytes() -> usize {
    CACHE_LINE
  }

  /// Validates a pair of region lengths and derives their shared capacity.
  ///
  /// Returns a [`ConstructionError`] if either length is not a positive exact
  /// multiple of its record size, if the two regions imply different
  /// capacities, or if the key/label shape violates the false-sharing
  /// isolation invariant.
  pub fn new(metadata_len: usize, values_len: usize) -> Result<Self, ConstructionError> {
    <L as LayoutExt>::validate()?;

    let record_m: usize = Self::metadata_record_bytes();
    let record_v: usize = Self::value_record_bytes();

    if record_m == 0 || metadata_len == 0 || !metadata_len.is_multiple_of(record_m) {
      return Err(ConstructionError::MetadataLengthNotMultiple {
        len: metadata_len,
        record: record_m,
      });
    }

    if record_v == 0 || values_len == 0 || !values_len.is_multiple_of(record_v) {
      return Err(ConstructionError::ValuesLengthNotMultiple {
        len: values_len,
        record: record_v,
      });
    }

    let capacity_m: usize = metadata_len / record_m;
    let capacity_v: usize = values_len / record_v;

    if capacity_m != capacity_v {
      return Err(ConstructionError::CapacityMismatch {
        metadata: capacity_m,
        values: capacity_v,
      });
    }

    Ok(Self {
      capacity: capacity_m,
      marker: PhantomData,
    })
  }

  /// Builds a `RegionLayout` directly from an already-known capacity,
  /// skipping the length validation [`RegionLayout::new`] performs.
  ///
  /// For reader processes that only ever receive a capacity (computed once,
  /// by whichever side validated the region lengths) and need to re-derive
  /// addressing from it on every scan without repeating that validation.
  #[inline]
  pub const fn for_capacity(capacity: usize) -> Self {
    Self {
      capacity,
      marker: PhantomData,
    }
  }

  /// The number of counter slots implied by the region lengths.
  #[inline]
  pub const fn capacity(&self) -> usize {
    self.capacity
  }

  /// Returns `true` if `id` is within `0..capacity()`.
  #[inline]
  pub const fn in_bounds(&self, id: usize) -> bool {
    id < self.capacity
  }

  /// Byte offset of metadata slot `id` within the metadata region.
  ///
  /// Pure address arithmetic; does not dereference anything and does not
  /// require `id` to be in bounds (callers bounds-check separately so that a
  /// single out-of-range check can guard several addr computations).
  #[inline]
  pub const fn metadata_offset(&self, id: usize) -> usize {
    id * Self::metadata_record_bytes()
  }

  /// Byte offset of value slot `id` within the values region.
  #[inline]
  pub const fn value_offset(&self, id: usize) -> usize {
    id * Self::value_record_bytes()
  }

  /// Computes the address of metadata slot `id` given the region's base
  /// pointer.
  ///
  /// # Safety
  ///
  /// `base` must point to a metadata region at least `capacity() *
  /// metadata_record_bytes()` bytes long, and `id` must be in bounds.
  #[inline]
  pub unsafe fn metadata_addr(&self, base: *mut u8, id: usize) -> *mut u8 {
    debug_assert!(self.in_bounds(id), "metadata_addr: id out of bounds");
    // SAFETY: caller guarantees `base` addresses a region large enough for
    // `id`, which is required to be in bounds.
    unsafe { base.add(self.metadata_offset(id)) }
  }

  /// Computes the address of value slot `id` given the region's base
  /// pointer.
  ///
  /// # Safety
  ///
  /// `base` must point to a values region at least `capacity() *
  /// value_record_bytes()` bytes long, and `id` must be in bounds.
  #[inline]
  pub unsafe fn value_addr(&self, base: *mut u8, id: usize) -> *mut i64 {
    debug_assert!(self.in_bounds(id), "value_addr: id out of bounds");
    // SAFETY: caller guarantees `base` addresses a region large enough for
    // `id`, which is required to be in bounds. The value slot places the
    // counter at byte offset 0, and `CACHE_LINE` is a multiple of `align_of
    // ::<i64>()`, so the resulting pointer is suitably aligned.
    unsafe { base.add(self.value_offset(id)).cast::<i64>() }
  }
}

impl<L> Debug for RegionLayout<L>
where
  L: Layout,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("RegionLayout")
      .field("layout", &any::type_name::<L>())
      .field("capacity", &self.capacity)
      .field("metadata_record_bytes", &Self::metadata_record_bytes())
      .field("value_record_bytes", &Self::value_record_bytes())
      .finish()
  }
}

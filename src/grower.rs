//! Heap page sources.
//!
//! The engine grows one contiguous region through the [`Grower`] trait and
//! never hands memory back. [`BrkGrower`] is the production source and moves
//! the program break with `sbrk(2)`; [`ArenaGrower`] serves the same
//! contract out of a single preallocated buffer, which makes block placement
//! fully deterministic.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use libc::{c_void, intptr_t, sbrk};

use crate::align_to;
use crate::error::AllocError;

/// A grow-only source of page-granular heap memory.
///
/// Every successful [`Grower::grow`] returns a range that starts at or above
/// the end of every range returned before it, so freshly grown blocks always
/// belong at the tail of the address-ordered block list.
pub trait Grower {
  /// Grow granularity in bytes. Requests are rounded up to multiples of
  /// this before [`Grower::grow`] is called.
  fn page_size(&self) -> usize;

  /// Moves the region end upward by exactly `bytes` and returns the base of
  /// the new range. `bytes` is a nonzero multiple of [`Grower::page_size`].
  fn grow(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError>;
}

/// Grows the heap by moving the program break with `sbrk(2)`.
///
/// The break only ever moves up; memory is returned to the OS at process
/// exit, not before. The process must not move the break through any other
/// channel while this grower is in use, otherwise foreign ranges end up
/// inside the region the allocator believes it tiles.
pub struct BrkGrower;

impl Grower for BrkGrower {
  fn page_size(&self) -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
  }

  fn grow(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
    // sbrk returns the previous break, which is the base of the new range,
    // or (void*)-1 on failure.
    let previous_break = unsafe { sbrk(bytes as intptr_t) };
    if previous_break == usize::MAX as *mut c_void {
      return Err(AllocError::OutOfMemory(bytes));
    }

    NonNull::new(previous_break as *mut u8).ok_or(AllocError::OutOfMemory(bytes))
  }
}

/// Serves pages from one fixed, page-aligned buffer.
///
/// Behaves exactly like a private program break capped at `capacity`: grow
/// requests advance an internal break through the buffer and fail once it
/// is exhausted. Useful wherever the real break is unavailable or shared,
/// and for exercising out-of-memory paths on purpose.
pub struct ArenaGrower {
  base: NonNull<u8>,
  capacity: usize,
  brk: usize,
}

impl ArenaGrower {
  /// Grow granularity of the arena.
  pub const PAGE_SIZE: usize = 4096;

  /// Largest capacity the arena accepts: `Layout` rejects sizes above
  /// `isize::MAX`, so the clamp stops at the page-aligned size below it.
  const MAX_CAPACITY: usize = (isize::MAX as usize) & !(Self::PAGE_SIZE - 1);

  /// Reserves a page-aligned buffer of at least `capacity` bytes.
  ///
  /// Capacities are clamped to between one page and [`isize::MAX`]; a
  /// request beyond the clamp surfaces later as a failed grow, not here.
  ///
  /// # Panics
  ///
  /// Panics if the buffer itself cannot be reserved.
  pub fn new(capacity: usize) -> Self {
    // The clamp also keeps the page rounding below from overflowing:
    // MAX_CAPACITY is itself page-aligned.
    let capacity = capacity.clamp(Self::PAGE_SIZE, Self::MAX_CAPACITY);
    let capacity = align_to!(capacity, Self::PAGE_SIZE);
    let layout = Self::layout(capacity);

    let base = unsafe { alloc::alloc(layout) };
    let Some(base) = NonNull::new(base) else {
      alloc::handle_alloc_error(layout);
    };

    Self { base, capacity, brk: 0 }
  }

  fn layout(capacity: usize) -> Layout {
    // Page-aligned and clamped under isize::MAX, so this cannot fail.
    match Layout::from_size_align(capacity, Self::PAGE_SIZE) {
      Ok(layout) => layout,
      Err(_) => unreachable!("arena capacity is clamped and page-aligned"),
    }
  }
}

impl Grower for ArenaGrower {
  fn page_size(&self) -> usize {
    Self::PAGE_SIZE
  }

  fn grow(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
    if bytes > self.capacity - self.brk {
      return Err(AllocError::OutOfMemory(bytes));
    }

    let range = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(self.brk)) };
    self.brk += bytes;

    Ok(range)
  }
}

impl Drop for ArenaGrower {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.base.as_ptr(), Self::layout(self.capacity)) };
  }
}

// The arena owns its buffer outright; nothing else aliases it.
unsafe impl Send for ArenaGrower {}

//! Thread-safe allocator facade.
//!
//! [`FitAllocator`] is the front door: it wraps the engine in a single
//! process-wide mutex and exposes the four client operations (allocate,
//! release, stats, visualize). Every entry point takes the lock on entry and
//! drops it on every exit path; the heap is lazily seeded inside the lock
//! on the first allocation, so racing first calls are serialized and only
//! one performs the seed grow.
//!
//! The search mode and the seed size are fixed at construction for the
//! lifetime of the allocator. Construction is `const`, so a process-wide
//! instance is just a `static`:
//!
//! ```rust,no_run
//! use fitalloc::{FitAllocator, SearchMode};
//!
//! static MALLOC: FitAllocator = FitAllocator::new(SearchMode::QuickFit);
//!
//! unsafe {
//!   let p = MALLOC.allocate(64);
//!   if !p.is_null() {
//!     p.write(42);
//!     MALLOC.release(p);
//!   }
//! }
//! ```

use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::grower::{BrkGrower, Grower};
use crate::heap::{Heap, SearchMode};
use crate::stats::HeapStats;

/// Thread-safe heap allocator with a fixed placement strategy.
///
/// Generic over its page source; the default grows the program break with
/// `sbrk`. All shared state sits behind one mutex, making allocations and
/// releases from different threads linearizable.
pub struct FitAllocator<G: Grower = BrkGrower> {
  state: Mutex<Heap<G>>,
}

impl FitAllocator<BrkGrower> {
  /// Allocator backed by the program break, seeded with one page on first
  /// use.
  pub const fn new(mode: SearchMode) -> Self {
    Self::with_grower(BrkGrower, mode)
  }
}

impl<G: Grower> FitAllocator<G> {
  /// Allocator on an explicit page source.
  pub const fn with_grower(grower: G, mode: SearchMode) -> Self {
    Self {
      state: Mutex::new(Heap::new(grower, mode)),
    }
  }

  /// Allocator whose lazy seed grow requests `initial_size` bytes (rounded
  /// up to whole pages).
  pub const fn with_initial_size(
    grower: G,
    mode: SearchMode,
    initial_size: usize,
  ) -> Self {
    Self {
      state: Mutex::new(Heap::with_initial_size(grower, mode, initial_size)),
    }
  }

  /// Hands out `size` payload bytes, 8-byte aligned.
  ///
  /// Returns null when `size` is zero or the heap cannot grow; the heap is
  /// left untouched in both cases.
  ///
  /// # Safety
  ///
  /// The returned pointer is valid for `size` bytes until passed to
  /// [`FitAllocator::release`]. The allocator must outlive every
  /// outstanding payload.
  pub unsafe fn allocate(&self, size: usize) -> *mut u8 {
    let result = unsafe { self.lock().allocate(size) };

    match result {
      Ok(payload) => payload.as_ptr(),
      Err(error) => {
        debug!("allocation of {} bytes refused: {}", size, error);
        ptr::null_mut()
      }
    }
  }

  /// Gives a payload back to the allocator.
  ///
  /// Null pointers and payloads whose block is already free are silent
  /// no-ops.
  ///
  /// # Safety
  ///
  /// `address` must be null or a payload pointer obtained from
  /// [`FitAllocator::allocate`] on this allocator. The payload must not be
  /// touched afterwards.
  pub unsafe fn release(&self, address: *mut u8) {
    unsafe { self.lock().release(address) };
  }

  /// Occupancy counters and fragmentation ratios. Read-only.
  pub fn stats(&self) -> HeapStats {
    self.lock().stats()
  }

  /// Text rendering of the heap layout. Read-only.
  pub fn visualize(&self) -> String {
    self.lock().visualize()
  }

  fn lock(&self) -> MutexGuard<'_, Heap<G>> {
    // A client thread that panicked while holding the lock must not wedge
    // every later caller.
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  #[cfg(test)]
  pub(crate) fn assert_consistent(&self) {
    self.lock().assert_consistent();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grower::ArenaGrower;

  use std::sync::Arc;
  use std::thread;

  // The program break is process-global; tests that move it take turns.
  static BRK_LOCK: Mutex<()> = Mutex::new(());

  #[test]
  fn threads_share_one_allocator() {
    const THREADS: usize = 4;
    const ITERATIONS: usize = 100;

    let malloc = Arc::new(FitAllocator::with_grower(
      ArenaGrower::new(256 * ArenaGrower::PAGE_SIZE),
      SearchMode::QuickFit,
    ));

    let mut workers = Vec::new();
    for id in 0..THREADS {
      let malloc = Arc::clone(&malloc);

      workers.push(thread::spawn(move || {
        let stamp = id as u8;
        let mut survivors: Vec<(usize, usize)> = Vec::new();

        for i in 0..ITERATIONS {
          let size = i % 64 + 16;

          unsafe {
            let payload = malloc.allocate(size);
            assert!(!payload.is_null());
            ptr::write_bytes(payload, stamp, size);

            if i % 2 == 1 {
              for offset in 0..size {
                assert_eq!(payload.add(offset).read(), stamp);
              }
              malloc.release(payload);
            } else {
              survivors.push((payload as usize, size));
            }
          }
        }

        survivors
      }));
    }

    let mut survivors: Vec<(u8, usize, usize)> = Vec::new();
    for (id, worker) in workers.into_iter().enumerate() {
      for (address, size) in worker.join().unwrap() {
        survivors.push((id as u8, address, size));
      }
    }

    // Every surviving payload still carries its owner's stamp.
    for &(stamp, address, size) in &survivors {
      for offset in 0..size {
        let byte = unsafe { ((address + offset) as *const u8).read() };
        assert_eq!(byte, stamp, "stamp corrupted across threads");
      }
    }

    malloc.assert_consistent();

    for &(_, address, _) in &survivors {
      unsafe { malloc.release(address as *mut u8) };
    }
    assert_eq!(malloc.stats().used_memory, 0);
    malloc.assert_consistent();
  }

  #[test]
  fn facade_flattens_errors_to_null() {
    let malloc = FitAllocator::with_grower(
      ArenaGrower::new(ArenaGrower::PAGE_SIZE),
      SearchMode::QuickFit,
    );

    unsafe {
      assert!(malloc.allocate(0).is_null());
      // Far beyond the arena: out of memory, also null.
      assert!(malloc.allocate(1 << 20).is_null());
      // The allocator still works afterwards.
      assert!(!malloc.allocate(64).is_null());
    }
  }

  #[test]
  fn double_free_through_the_facade_is_silent() {
    let malloc = FitAllocator::with_grower(
      ArenaGrower::new(ArenaGrower::PAGE_SIZE),
      SearchMode::BestFit,
    );

    unsafe {
      let p = malloc.allocate(48);
      let _q = malloc.allocate(48);

      malloc.release(p);
      let after_first = malloc.stats();

      malloc.release(p);
      assert_eq!(malloc.stats(), after_first);

      malloc.release(ptr::null_mut());
      assert_eq!(malloc.stats(), after_first);
    }
    malloc.assert_consistent();
  }

  #[test]
  fn observers_do_not_mutate() {
    let malloc = FitAllocator::with_grower(
      ArenaGrower::new(4 * ArenaGrower::PAGE_SIZE),
      SearchMode::QuickFit,
    );

    unsafe {
      let p = malloc.allocate(300);
      malloc.allocate(200);
      malloc.release(p);
    }

    let before = malloc.stats();
    let _ = malloc.visualize();
    let _ = malloc.stats();
    assert_eq!(malloc.stats(), before);
  }

  #[test]
  fn break_backed_allocation_and_write_read() {
    let _turn = BRK_LOCK.lock().unwrap();
    let malloc = FitAllocator::new(SearchMode::BestFit);

    unsafe {
      let p = malloc.allocate(64) as *mut u64;
      assert!(!p.is_null());
      assert_eq!(p as usize % 8, 0);

      p.write(0xDEADBEEFDEADBEEF);

      let q = malloc.allocate(16) as *mut u64;
      assert!(!q.is_null());
      q.write(0x1122334455667788);

      // The first payload survives the second allocation.
      assert_eq!(p.read(), 0xDEADBEEFDEADBEEF);
      assert_eq!(q.read(), 0x1122334455667788);

      malloc.release(q as *mut u8);
      malloc.release(p as *mut u8);
    }
  }

  #[test]
  fn break_backed_release_reuses_memory() {
    let _turn = BRK_LOCK.lock().unwrap();
    let malloc = FitAllocator::new(SearchMode::QuickFit);

    unsafe {
      let first = malloc.allocate(128);
      assert!(!first.is_null());
      malloc.release(first);

      // The hole merges back and the next allocation lands on it.
      let second = malloc.allocate(64);
      assert_eq!(second, first);
      malloc.release(second);
    }
  }
}

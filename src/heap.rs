//! Block-management engine.
//!
//! A [`Heap`] owns one contiguous, grow-only region and carves it into
//! blocks. Two redundant but complementary structures track every byte:
//!
//! ```text
//!   global list (address order, dense tiling of [base, break))
//!   ┌────────┐   ┌────────┐   ┌────────┐   ┌────────┐
//!   │ used   │◄─►│ FREE   │◄─►│ used   │◄─►│ FREE   │
//!   └────────┘   └───▲────┘   └────────┘   └───▲────┘
//!                    │                         │
//!   free index       │    ┌────────────────────┘
//!   (quick-fit only) │    │
//!      bucket 3 ─────┴────┘        bucket 9 ─── ...
//! ```
//!
//! The global list answers "who is my physical neighbour" in O(1), which
//! coalescing needs; the free index answers "who can hold this request"
//! without touching used blocks, which quick-fit placement needs. Best-fit
//! placement scans the global list instead and leaves the index untouched.
//!
//! All heavy lifting happens here; the thread-safe front door lives in
//! [`crate::fit`].

use std::ptr::{self, NonNull};

use log::debug;

use crate::align::ALIGNMENT;
use crate::block::{BlockHeader, HEADER_SIZE};
use crate::error::AllocError;
use crate::freelist::{FreeIndex, bucket_index};
use crate::grower::Grower;
use crate::list::GlobalList;
use crate::stats::{HeapStats, ratio};
use crate::{align, align_to};

/// Placement strategy, fixed for the lifetime of a heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
  /// Scan the whole global list and take the smallest fitting free block,
  /// earliest address on ties. Does not maintain the free index.
  BestFit,
  /// Scan the size-segregated free index upward from the request's class
  /// and take the first fitting block.
  QuickFit,
}

/// Heap span covered by one character of the visualizer.
pub const BYTES_PER_CELL: usize = 64;
/// Characters per visualizer line.
pub const CELLS_PER_LINE: usize = 64;
/// Lines in the visualizer panel.
pub const PANEL_LINES: usize = 8;

/// The single-threaded allocator engine.
///
/// Not thread-safe on its own; [`crate::FitAllocator`] wraps it in the
/// process-wide lock.
pub struct Heap<G: Grower> {
  grower: G,
  mode: SearchMode,
  list: GlobalList,
  index: FreeIndex,
  /// Base of the region, captured at the first successful grow.
  base: *mut u8,
  /// Bytes requested for the seed grow; fixed at construction.
  initial_size: usize,
  total_memory: usize,
  used_memory: usize,
}

// Every pointer reachable from a Heap targets memory owned by its grower,
// which moves along with it.
unsafe impl<G: Grower + Send> Send for Heap<G> {}

impl<G: Grower> Heap<G> {
  /// Engine with a one-page seed region, grown lazily on first use.
  pub const fn new(grower: G, mode: SearchMode) -> Self {
    Self::with_initial_size(grower, mode, 1)
  }

  /// Engine whose lazy seed grow requests `initial_size` bytes (rounded up
  /// to whole pages). The seed size cannot change after construction.
  pub const fn with_initial_size(
    grower: G,
    mode: SearchMode,
    initial_size: usize,
  ) -> Self {
    Self {
      grower,
      mode,
      list: GlobalList::new(),
      index: FreeIndex::new(),
      base: ptr::null_mut(),
      initial_size,
      total_memory: 0,
      used_memory: 0,
    }
  }

  /// Carves `size` payload bytes out of the heap.
  ///
  /// # Safety
  ///
  /// The returned pointer is valid for `size` bytes until it is passed to
  /// [`Heap::release`]. The heap must outlive every outstanding payload.
  pub unsafe fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::InvalidSize);
    }
    // Keep the header-and-rounding arithmetic from wrapping on absurd sizes.
    if size > usize::MAX - HEADER_SIZE - ALIGNMENT {
      return Err(AllocError::OutOfMemory(size));
    }

    self.ensure_initialized()?;

    let required = align!(size + HEADER_SIZE);

    let candidate = match self.mode {
      SearchMode::BestFit => self.best_fit(required),
      SearchMode::QuickFit => unsafe {
        let found = self.index.scan_from(bucket_index(required), required);
        if !found.is_null() {
          self.index.remove(found);
        }
        found
      },
    };

    let block = if candidate.is_null() {
      unsafe { self.grow_for(required)? }
    } else {
      candidate
    };

    unsafe {
      self.split(block, required);
      (*block).is_free = false;
      (*block).requested_size = size;
      self.used_memory += (*block).total_size;

      Ok(NonNull::new_unchecked(BlockHeader::payload(block)))
    }
  }

  /// Returns the block owning payload `address` to the free state, merging
  /// it with free neighbours. Null pointers and already-free blocks are
  /// silent no-ops.
  ///
  /// # Safety
  ///
  /// `address` must be null or a payload pointer obtained from
  /// [`Heap::allocate`] on this heap.
  pub unsafe fn release(&mut self, address: *mut u8) {
    if address.is_null() {
      return;
    }

    unsafe {
      let mut block = BlockHeader::from_payload(address);

      // Double-free short-circuit: the header already reads as free.
      if (*block).is_free {
        return;
      }

      (*block).is_free = true;
      (*block).requested_size = 0;
      self.used_memory -= (*block).total_size;

      // Fold into a free predecessor first, then absorb a free successor.
      // Index removal happens before any size changes; a block's bucket is
      // derived from its size.
      let prev = (*block).gprev;
      if !prev.is_null() && (*prev).is_free {
        if let SearchMode::QuickFit = self.mode {
          self.index.remove(prev);
        }
        (*prev).total_size += (*block).total_size;
        self.list.unlink(block);
        block = prev;
      }

      let next = (*block).gnext;
      if !next.is_null() && (*next).is_free {
        if let SearchMode::QuickFit = self.mode {
          self.index.remove(next);
        }
        (*block).total_size += (*next).total_size;
        self.list.unlink(next);
      }

      match self.mode {
        SearchMode::QuickFit => self.index.insert(block),
        SearchMode::BestFit => {
          (*block).fprev = ptr::null_mut();
          (*block).fnext = ptr::null_mut();
        }
      }
    }
  }

  /// Counters and fragmentation ratios from one walk over the block list.
  pub fn stats(&self) -> HeapStats {
    let mut free_blocks = 0;
    let mut free_memory = 0;
    let mut largest_free_block = 0;
    let mut internal_slack = 0;

    for block in self.list.iter() {
      unsafe {
        if (*block).is_free {
          free_blocks += 1;
          free_memory += (*block).total_size;
          largest_free_block = largest_free_block.max((*block).total_size);
        } else {
          internal_slack += (*block).total_size - (*block).requested_size - HEADER_SIZE;
        }
      }
    }

    HeapStats {
      total_memory: self.total_memory,
      used_memory: self.used_memory,
      free_blocks,
      free_memory,
      largest_free_block,
      external_fragmentation: ratio(free_memory - largest_free_block, free_memory),
      internal_fragmentation: ratio(internal_slack, self.used_memory),
    }
  }

  /// Renders the heap as a fixed panel of [`PANEL_LINES`] lines, one
  /// character per [`BYTES_PER_CELL`] bytes: `#` used, `.` free, space
  /// unmapped. Read-only.
  pub fn visualize(&self) -> String {
    let mut panel = String::with_capacity((CELLS_PER_LINE + 1) * PANEL_LINES);
    let mut current = self.list.head();

    for cell in 0..PANEL_LINES * CELLS_PER_LINE {
      if cell > 0 && cell % CELLS_PER_LINE == 0 {
        panel.push('\n');
      }

      let offset = cell * BYTES_PER_CELL;
      let glyph = if self.base.is_null() || offset >= self.total_memory {
        ' '
      } else {
        unsafe {
          let address = self.base as usize + offset;
          while !current.is_null() && BlockHeader::end(current) as usize <= address {
            current = (*current).gnext;
          }
          match NonNull::new(current) {
            None => ' ',
            Some(block) => {
              if (*block.as_ptr()).is_free { '.' } else { '#' }
            }
          }
        }
      };
      panel.push(glyph);
    }

    panel.push('\n');
    panel
  }

  /// One-shot lazy initialization: grows the seed region and, under
  /// quick-fit, files it in the free index.
  fn ensure_initialized(&mut self) -> Result<(), AllocError> {
    if !self.base.is_null() {
      return Ok(());
    }

    let seed = self.grow_heap(self.initial_size)?;
    self.base = seed as *mut u8;

    if let SearchMode::QuickFit = self.mode {
      unsafe { self.index.insert(seed) };
    }

    debug!("heap initialized at {:p}, mode {:?}", self.base, self.mode);
    Ok(())
  }

  /// Best-fit scan over the global list: smallest fitting free block,
  /// earliest address on ties.
  fn best_fit(&self, required: usize) -> *mut BlockHeader {
    let mut best: *mut BlockHeader = ptr::null_mut();

    for block in self.list.iter() {
      unsafe {
        if !(*block).is_free || (*block).total_size < required {
          continue;
        }
        if best.is_null() || (*block).total_size < (*best).total_size {
          best = block;
        }
      }
    }

    best
  }

  /// Grow path of the placement policy. Under quick-fit the fresh block is
  /// folded into a free tail so the candidate is as large as possible and
  /// no two adjacent free blocks appear.
  unsafe fn grow_for(&mut self, required: usize) -> Result<*mut BlockHeader, AllocError> {
    let mut block = self.grow_heap(required)?;

    if let SearchMode::QuickFit = self.mode {
      unsafe {
        let prev = (*block).gprev;
        if !prev.is_null() && (*prev).is_free {
          self.index.remove(prev);
          (*prev).total_size += (*block).total_size;
          self.list.unlink(block);
          block = prev;
        }
      }
    }

    Ok(block)
  }

  /// Rounds `min_bytes` up to whole pages (at least one), moves the break,
  /// and splices the fresh free block onto the tail of the global list.
  /// The free index is the caller's concern.
  fn grow_heap(&mut self, min_bytes: usize) -> Result<*mut BlockHeader, AllocError> {
    let page = self.grower.page_size();
    if min_bytes > usize::MAX - page {
      return Err(AllocError::OutOfMemory(min_bytes));
    }

    let bytes = align_to!(min_bytes.max(1), page);
    let base = self.grower.grow(bytes)?;
    // Counters move only after the grow succeeded.
    self.total_memory += bytes;

    let block = base.as_ptr() as *mut BlockHeader;
    unsafe {
      block.write(BlockHeader::new_free(bytes));
      self.list.insert_tail(block);
    }

    debug!("heap grown by {} bytes at {:p}", bytes, base.as_ptr());
    Ok(block)
  }

  /// Truncates `block` to `required` bytes when the cut-off tail is big
  /// enough to stand alone as a free block; otherwise the block is consumed
  /// whole, tolerating up to `HEADER_SIZE + 7` bytes of slack.
  unsafe fn split(&mut self, block: *mut BlockHeader, required: usize) {
    unsafe {
      let available = (*block).total_size;
      if available < required + HEADER_SIZE + ALIGNMENT {
        return;
      }

      let remainder = (block as *mut u8).add(required) as *mut BlockHeader;
      remainder.write(BlockHeader::new_free(available - required));
      (*block).total_size = required;
      self.list.splice_after(block, remainder);

      if let SearchMode::QuickFit = self.mode {
        self.index.insert(remainder);
      }
    }
  }
}

#[cfg(test)]
impl<G: Grower> Heap<G> {
  /// Walks the whole heap asserting the structural invariants: dense
  /// tiling, no adjacent free blocks, alignment, accounting, and (under
  /// quick-fit) two-way index consistency.
  pub(crate) fn assert_consistent(&self) {
    let mut total = 0;
    let mut used = 0;
    let mut previous: *mut BlockHeader = ptr::null_mut();

    for block in self.list.iter() {
      unsafe {
        assert_eq!(block as usize % ALIGNMENT, 0, "misaligned header");
        assert_eq!((*block).total_size % ALIGNMENT, 0, "odd block size");

        if previous.is_null() {
          assert_eq!(block as *mut u8, self.base, "list head is not the heap base");
        } else {
          assert_eq!(
            BlockHeader::end(previous) as usize,
            block as usize,
            "gap or overlap between neighbouring blocks",
          );
          assert_eq!((*block).gprev, previous);
          assert!(
            !((*previous).is_free && (*block).is_free),
            "two adjacent free blocks survived coalescing",
          );
        }

        total += (*block).total_size;
        if (*block).is_free {
          assert_eq!((*block).requested_size, 0);
          if let SearchMode::QuickFit = self.mode {
            assert_eq!(
              self.index.position(block),
              Some(bucket_index((*block).total_size)),
              "free block missing from its bucket",
            );
          }
        } else {
          used += (*block).total_size;
          if let SearchMode::QuickFit = self.mode {
            assert_eq!(self.index.position(block), None, "used block left in the index");
          }
        }

        previous = block;
      }
    }

    assert_eq!(total, self.total_memory, "total_memory out of step with the list");
    assert_eq!(used, self.used_memory, "used_memory out of step with the list");

    if let SearchMode::QuickFit = self.mode {
      self.index.assert_buckets_consistent();
    }
  }
}

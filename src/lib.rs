//! # fitalloc - A Best-Fit / Quick-Fit Memory Allocator Library
//!
//! This crate provides a general-purpose **free-list allocator** in Rust
//! that manages a contiguous, grow-only heap obtained through the `sbrk`
//! system call.
//!
//! ## Overview
//!
//! Every byte the allocator owns belongs to exactly one block, and every
//! block starts with an in-band header:
//!
//! ```text
//!   Heap region [base, break), tiled by blocks with no gaps:
//!
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                          HEAP MEMORY                             │
//!   │                                                                  │
//!   │   ┌────┬─────┬────┬──────────┬────┬───────────────────────────┐  │
//!   │   │ H│A │ H│. │ H│B│ H│......│ H│C│        H│free tail        │  │
//!   │   └────┴─────┴────┴──────────┴────┴───────────────────────────┘  │
//!   │   ▲                                                         ▲    │
//!   │   │                                                         │    │
//!   │  base                                              Program Break │
//!   │                                                                  │
//!   │   H = header   A,B,C = used payloads   . = free                  │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two doubly-linked lists run through the headers:
//!
//! * the **global list** chains every block in ascending address order and
//!   is the sole adjacency oracle for coalescing;
//! * the **free index** chains free blocks into ten size-class buckets and
//!   accelerates quick-fit placement.
//!
//! ## Crate Structure
//!
//! ```text
//!   fitalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - In-band block header (internal)
//!   ├── list       - Address-ordered global list (internal)
//!   ├── freelist   - Size-segregated free index (internal)
//!   ├── grower     - Heap page sources (sbrk, fixed arena)
//!   ├── heap       - Placement, split and coalesce engine (internal)
//!   ├── stats      - Occupancy counters and fragmentation ratios
//!   └── fit        - FitAllocator, the thread-safe facade
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fitalloc::{FitAllocator, SearchMode};
//!
//! static MALLOC: FitAllocator = FitAllocator::new(SearchMode::QuickFit);
//!
//! fn main() {
//!   unsafe {
//!     let p = MALLOC.allocate(100);
//!     if !p.is_null() {
//!       p.write_bytes(0xAB, 100);
//!       MALLOC.release(p);
//!     }
//!   }
//!   println!("{}", MALLOC.stats());
//! }
//! ```
//!
//! ## Placement Strategies
//!
//! The strategy is picked at construction and fixed for the life of the
//! allocator:
//!
//! * [`SearchMode::BestFit`] walks the global list and takes the smallest
//!   fitting free block (earliest address on ties). O(blocks), no free
//!   index maintenance at all.
//! * [`SearchMode::QuickFit`] walks the free-index buckets upward from the
//!   request's size class and takes the first fit. O(free blocks in the
//!   visited buckets).
//!
//! Either way, oversized candidates are split when the remainder can stand
//! alone as a block, and released blocks are immediately coalesced with
//! free neighbours, so no two adjacent free blocks ever persist.
//!
//! ## Limitations
//!
//! - **No realloc**: grow-in-place is not supported
//! - **Fixed alignment**: every payload is 8-byte aligned, never more
//! - **Monotonic break**: memory is never returned to the OS
//! - **Single break owner**: the default `sbrk` source assumes nothing else
//!   moves the program break (see [`BrkGrower`]); use [`ArenaGrower`] for a
//!   self-contained region
//!
//! ## Safety
//!
//! The allocate/release surface deals in raw payload pointers and is
//! `unsafe`: clients must not use a payload after releasing it, must not
//! release foreign pointers, and must not write past the bytes they asked
//! for. The allocator detects double frees (silent no-op) and nothing else.

pub mod align;
mod block;
mod error;
mod fit;
mod freelist;
mod grower;
mod heap;
mod list;
mod stats;

pub use error::AllocError;
pub use fit::FitAllocator;
pub use grower::{ArenaGrower, BrkGrower, Grower};
pub use heap::SearchMode;
pub use stats::HeapStats;

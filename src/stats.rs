//! Occupancy counters and fragmentation ratios.

use std::fmt;

/// Point-in-time description of heap occupancy.
///
/// Produced by a single walk over the global block list under the allocator
/// lock; the counters are exact for the instant the walk ran.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeapStats {
  /// Bytes obtained from the heap source so far, headers included.
  pub total_memory: usize,
  /// Bytes tied up in used blocks, headers included.
  pub used_memory: usize,
  /// Number of free blocks.
  pub free_blocks: usize,
  /// Bytes sitting in free blocks.
  pub free_memory: usize,
  /// Size of the largest single free block.
  pub largest_free_block: usize,
  /// Share of free memory outside the largest free block:
  /// `(free - largest) / free`. Zero when nothing is free.
  pub external_fragmentation: f64,
  /// Share of used memory lost to rounding slack:
  /// `Σ (total - requested - header) / used`. Zero when nothing is used.
  pub internal_fragmentation: f64,
}

impl fmt::Display for HeapStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(
      f,
      "heap: {} bytes total, {} used, {} free in {} block(s) (largest {})",
      self.total_memory,
      self.used_memory,
      self.free_memory,
      self.free_blocks,
      self.largest_free_block,
    )?;
    write!(
      f,
      "fragmentation: external {:.1}%, internal {:.1}%",
      self.external_fragmentation * 100.0,
      self.internal_fragmentation * 100.0,
    )
  }
}

/// `part / whole`, with an empty whole reading as zero instead of NaN.
pub(crate) fn ratio(part: usize, whole: usize) -> f64 {
  if whole == 0 {
    0.0
  } else {
    part as f64 / whole as f64
  }
}

use thiserror::Error;

/// Failures surfaced by the allocation path.
///
/// The public facade flattens these to null payload pointers; the variants
/// exist so the engine can propagate failures with `?` and so log lines
/// carry a reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  /// The client asked for a zero-sized payload.
  #[error("allocation size must be greater than zero")]
  InvalidSize,

  /// The heap could not be extended by the requested amount.
  #[error("out of memory: failed to extend the heap by {0} bytes")]
  OutOfMemory(usize),
}

//! VM configuration

use memory_manager::{DEFAULT_DESIRED_LIMIT, DEFAULT_HEAP_SIZE};
use serde::{Deserialize, Serialize};

/// Tunables of a [`VmContext`](crate::VmContext).
///
/// Missing fields take their defaults when deserialised, so a configuration
/// file only needs to list what it changes.
///
/// # Examples
///
/// ```
/// use interpreter::VmConfig;
///
/// let config = VmConfig::default();
/// assert_eq!(config.heap_size, 4 * 1024 * 1024);
/// assert_eq!(config.max_call_depth, 512);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Bytes reserved for the heap region
    pub heap_size: usize,
    /// Step by which the heap limit grows and shrinks
    pub heap_desired_limit: usize,
    /// Instructions dispatched between two polls of the stop callback
    pub stop_check_interval: u32,
    /// Nested calls allowed before a `RangeError`
    pub max_call_depth: usize,
    /// Bytes allocated since the last collection that make the next
    /// instruction boundary collect; `0` uses a 32nd of the heap
    pub gc_limit: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            heap_size: DEFAULT_HEAP_SIZE,
            heap_desired_limit: DEFAULT_DESIRED_LIMIT,
            stop_check_interval: 1024,
            max_call_depth: 512,
            gc_limit: 0,
        }
    }
}

impl VmConfig {
    /// Allocation step between two threshold-triggered collections.
    pub fn gc_step(&self) -> usize {
        match self.gc_limit {
            0 => (self.heap_size / 32).max(1024),
            limit => limit,
        }
    }
}

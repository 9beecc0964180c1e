//! Pooled in-memory streams
//!
//! Downloads are buffered in [`PooledBuffer`]s handed out by a
//! [`StreamManager`], so repeated downloads reuse allocations instead of
//! growing fresh vectors every time.

pub mod buffer;
pub mod manager;

pub use buffer::PooledBuffer;
pub use manager::{PoolStats, StreamManager};

//! Pooled buffer manager used to buffer blob downloads
//!
//! Buffers come from two pools: small fixed-size blocks for short content and
//! large buffers sized in multiples of [`LARGE_BUFFER_MULTIPLE`]. Each pool
//! keeps at most its configured number of free bytes; anything returned
//! beyond that is released to the allocator.

use crate::config::StreamManagerOptions;
use crate::stream::buffer::PooledBuffer;
use bytes::BytesMut;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use tracing::debug;

pub const BLOCK_SIZE: usize = 1024;
pub const LARGE_BUFFER_MULTIPLE: usize = 1024 * 1024;
pub const MAX_BUFFER_SIZE: usize = 16 * LARGE_BUFFER_MULTIPLE;

/// Small pool cap of the process-wide manager when `MAX_SMALLPOOL_FREEBYTES` is unset
pub const GLOBAL_MAX_SMALL_POOL_FREE_BYTES: u64 = MAX_BUFFER_SIZE as u64 * 4;
/// Large pool cap of the process-wide manager when `MAX_LARGEPOOL_FREEBYTES` is unset
pub const GLOBAL_MAX_LARGE_POOL_FREE_BYTES: u64 = 100 * BLOCK_SIZE as u64;

static GLOBAL: OnceLock<StreamManager> = OnceLock::new();

#[derive(Debug)]
struct Pool {
    free: Vec<BytesMut>,
    free_bytes: u64,
    max_free_bytes: u64,
}

impl Pool {
    fn new(max_free_bytes: u64) -> Self {
        Self {
            free: Vec::new(),
            free_bytes: 0,
            max_free_bytes,
        }
    }

    /// Take the first free buffer holding at least `min_capacity` bytes
    fn take(&mut self, min_capacity: usize) -> Option<BytesMut> {
        let index = self
            .free
            .iter()
            .position(|buf| buf.capacity() >= min_capacity)?;
        let buf = self.free.swap_remove(index);
        self.free_bytes -= buf.capacity() as u64;
        Some(buf)
    }

    fn give(&mut self, mut buf: BytesMut) -> bool {
        let capacity = buf.capacity() as u64;
        if self.free_bytes + capacity > self.max_free_bytes {
            return false;
        }
        buf.clear();
        self.free_bytes += capacity;
        self.free.push(buf);
        true
    }
}

#[derive(Debug)]
pub(crate) struct PoolSet {
    small: Mutex<Pool>,
    large: Mutex<Pool>,
}

impl PoolSet {
    pub(crate) fn acquire(&self, min_capacity: usize) -> BytesMut {
        if min_capacity <= BLOCK_SIZE {
            return self
                .small
                .lock()
                .take(BLOCK_SIZE)
                .unwrap_or_else(|| BytesMut::with_capacity(BLOCK_SIZE));
        }

        if min_capacity > MAX_BUFFER_SIZE {
            // Oversized buffers are never pooled
            return BytesMut::with_capacity(min_capacity);
        }

        if let Some(buf) = self.large.lock().take(min_capacity) {
            return buf;
        }

        let rounded = min_capacity.div_ceil(LARGE_BUFFER_MULTIPLE) * LARGE_BUFFER_MULTIPLE;
        BytesMut::with_capacity(rounded)
    }

    pub(crate) fn release(&self, buf: BytesMut) {
        let capacity = buf.capacity();
        if capacity < BLOCK_SIZE || capacity > MAX_BUFFER_SIZE {
            return;
        }

        let pooled = if capacity < LARGE_BUFFER_MULTIPLE {
            self.small.lock().give(buf)
        } else {
            self.large.lock().give(buf)
        };

        if !pooled {
            debug!(capacity, "Buffer pool full, releasing buffer");
        }
    }
}

/// Snapshot of the free buffers currently retained by a [`StreamManager`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub small_free_buffers: usize,
    pub small_free_bytes: u64,
    pub large_free_buffers: usize,
    pub large_free_bytes: u64,
}

/// Hands out reusable in-memory buffers; cheap to clone
#[derive(Debug, Clone)]
pub struct StreamManager {
    pools: Arc<PoolSet>,
}

impl StreamManager {
    pub fn new(options: &StreamManagerOptions) -> Self {
        Self::with_thresholds(options.small_pool_cap(), options.large_pool_cap())
    }

    pub fn with_thresholds(max_small_pool_free_bytes: u64, max_large_pool_free_bytes: u64) -> Self {
        Self {
            pools: Arc::new(PoolSet {
                small: Mutex::new(Pool::new(max_small_pool_free_bytes)),
                large: Mutex::new(Pool::new(max_large_pool_free_bytes)),
            }),
        }
    }

    /// Process-wide manager, constructed on first use
    ///
    /// Thresholds come from `MAX_SMALLPOOL_FREEBYTES` and `MAX_LARGEPOOL_FREEBYTES`
    /// when those hold valid numbers.
    pub fn global() -> &'static StreamManager {
        GLOBAL.get_or_init(|| {
            let small = env_bytes("MAX_SMALLPOOL_FREEBYTES")
                .unwrap_or(GLOBAL_MAX_SMALL_POOL_FREE_BYTES);
            let large = env_bytes("MAX_LARGEPOOL_FREEBYTES")
                .unwrap_or(GLOBAL_MAX_LARGE_POOL_FREE_BYTES);
            debug!(small, large, "Initializing global stream manager");
            StreamManager::with_thresholds(small, large)
        })
    }

    /// Get an empty buffer positioned at 0
    pub fn get_stream(&self) -> PooledBuffer {
        self.get_stream_with_capacity(0)
    }

    /// Get an empty buffer able to hold `capacity` bytes without growing
    pub fn get_stream_with_capacity(&self, capacity: usize) -> PooledBuffer {
        PooledBuffer::new(self.pools.acquire(capacity), Arc::clone(&self.pools))
    }

    pub fn stats(&self) -> PoolStats {
        let small = self.pools.small.lock();
        let large = self.pools.large.lock();
        PoolStats {
            small_free_buffers: small.free.len(),
            small_free_bytes: small.free_bytes,
            large_free_buffers: large.free.len(),
            large_free_bytes: large.free_bytes,
        }
    }
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new(&StreamManagerOptions::default())
    }
}

fn env_bytes(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<u64>().ok())
}

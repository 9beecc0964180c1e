use crate::stream::manager::{PoolSet, MAX_BUFFER_SIZE};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Growable in-memory stream whose allocation goes back to its pool on drop
pub struct PooledBuffer {
    buf: BytesMut,
    position: usize,
    pools: Arc<PoolSet>,
}

impl PooledBuffer {
    pub(crate) fn new(buf: BytesMut, pools: Arc<PoolSet>) -> Self {
        Self {
            buf,
            position: 0,
            pools,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Bytes between the read position and the end
    pub fn remaining(&self) -> &[u8] {
        self.buf.get(self.position..).unwrap_or_default()
    }

    /// Copy the content out; the pooled allocation stays with this buffer
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf)
    }

    /// Append at the end, independent of the read position
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.reserve(data.len());
        self.buf.extend_from_slice(data);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.position = 0;
    }

    /// Make room for at least `additional` more bytes
    ///
    /// Capacity at least doubles on each growth. Growth stops at
    /// [`MAX_BUFFER_SIZE`] while the content still fits in a pooled buffer.
    pub fn reserve(&mut self, additional: usize) {
        let capacity = self.buf.capacity();
        let required = self.buf.len().saturating_add(additional);
        if required <= capacity {
            return;
        }

        let doubled = capacity.saturating_mul(2);
        let target = if required <= MAX_BUFFER_SIZE {
            required.max(doubled.min(MAX_BUFFER_SIZE))
        } else {
            required.max(doubled)
        };

        let mut grown = self.pools.acquire(target);
        grown.extend_from_slice(&self.buf);
        let outgrown = std::mem::replace(&mut self.buf, grown);
        self.pools.release(outgrown);
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pools.release(buf);
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buf.len())
            .field("capacity", &self.buf.capacity())
            .field("position", &self.position)
            .finish()
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl Write for PooledBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for PooledBuffer {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        let n = remaining.len().min(out.len());
        out[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

impl Seek for PooledBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset as i64),
            SeekFrom::End(offset) => (self.buf.len() as i64).checked_add(offset),
            SeekFrom::Current(offset) => (self.position as i64).checked_add(offset),
        };

        match target {
            Some(target) if target >= 0 => {
                self.position = target as usize;
                Ok(target as u64)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

impl AsyncRead for PooledBuffer {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let remaining = this.remaining();
        let n = remaining.len().min(out.remaining());
        out.put_slice(&remaining[..n]);
        this.position += n;
        Poll::Ready(Ok(()))
    }
}

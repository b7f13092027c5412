//! # Message Pool
//!
//! Free list of payload buffers for the loopback queue, so steady-state traffic
//! between a host's client and server stops allocating.
//!
//! Buffers come back cleared but keep their capacity. Buffers that grew past
//! [`MAX_POOLED_BUFFER_SIZE`] are dropped instead of pooled.
//!
//! ## Usage
//! ```rust
//! use game_netcore::utils::message_pool::MessagePool;
//!
//! let mut pool = MessagePool::new(8);
//! let mut payload = pool.acquire();
//! payload.extend_from_slice(b"spawn");
//! pool.release(payload);
//! assert_eq!(pool.available(), 8);
//! ```

/// Largest buffer kept for reuse (4KB)
pub const MAX_POOLED_BUFFER_SIZE: usize = 4096;

/// Capacity of freshly allocated buffers
const DEFAULT_BUFFER_CAPACITY: usize = 64;

/// Single-threaded pool of payload buffers
#[derive(Debug)]
pub struct MessagePool {
    free: Vec<Vec<u8>>,
    max_pooled: usize,
}

impl MessagePool {
    /// Create a pool pre-filled with `pool_size` buffers; it never holds more.
    pub fn new(pool_size: usize) -> Self {
        let free = (0..pool_size)
            .map(|_| Vec::with_capacity(DEFAULT_BUFFER_CAPACITY))
            .collect();
        Self {
            free,
            max_pooled: pool_size,
        }
    }

    /// An empty buffer, reused when one is available.
    pub fn acquire(&mut self) -> Vec<u8> {
        self.free
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(DEFAULT_BUFFER_CAPACITY))
    }

    /// A buffer holding a copy of `bytes`.
    pub fn acquire_with(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut buffer = self.acquire();
        buffer.extend_from_slice(bytes);
        buffer
    }

    /// Return a buffer for reuse.
    pub fn release(&mut self, mut buffer: Vec<u8>) {
        if buffer.capacity() > MAX_POOLED_BUFFER_SIZE || self.free.len() >= self.max_pooled {
            return;
        }
        buffer.clear();
        self.free.push(buffer);
    }

    /// Buffers currently waiting for reuse.
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_basic() {
        let mut pool = MessagePool::new(10);
        assert_eq!(pool.available(), 10);

        let mut buf = pool.acquire();
        assert_eq!(pool.available(), 9);

        buf.push(42);
        pool.release(buf);
        assert_eq!(pool.available(), 10);
    }

    #[test]
    fn test_pool_reuse_is_cleared() {
        let mut pool = MessagePool::new(1);
        let buf = pool.acquire_with(b"test");
        assert_eq!(buf.len(), 4);
        pool.release(buf);

        let buf = pool.acquire();
        assert_eq!(buf.len(), 0);
        assert!(buf.capacity() >= 4);
    }

    #[test]
    fn test_pool_empty_allocates() {
        let mut pool = MessagePool::new(1);
        let _a = pool.acquire();
        let _b = pool.acquire();
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_pool_bounded() {
        let mut pool = MessagePool::new(1);
        pool.release(Vec::new());
        assert_eq!(pool.available(), 1);

        let _ = pool.acquire();
        pool.release(vec![0u8; MAX_POOLED_BUFFER_SIZE + 1]);
        assert_eq!(pool.available(), 0);
    }
}

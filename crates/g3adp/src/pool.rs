// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Size-class frame buffer pool.
//!
//! Frame buffers come in a small set of fixed size classes (the default
//! mirrors the stack's configured pools: 1x1280, 3x400, 3x100 bytes).
//! `acquire` hands out the smallest class that fits and decrements that
//! class's budget; `release` returns the budget. The pool bounds how many
//! frames can be staged at once; exhaustion is a backpressure signal, the
//! caller drops the frame.

/// One buffer size class.
#[derive(Debug, Clone, Copy)]
pub struct PoolClass {
    pub size: usize,
    pub count: usize,
}

/// Pool layout.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Classes in ascending size order.
    pub classes: Vec<PoolClass>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            classes: vec![
                PoolClass { size: 100, count: 3 },
                PoolClass { size: 400, count: 3 },
                PoolClass {
                    size: 1280,
                    count: 1,
                },
            ],
        }
    }
}

/// A buffer checked out of the pool. Return it via [`BufferPool::release`].
#[derive(Debug)]
pub struct FrameBuffer {
    class: usize,
    pub data: Vec<u8>,
}

impl FrameBuffer {
    pub fn class_size(&self, pool: &BufferPool) -> usize {
        pool.classes[self.class].size
    }
}

/// Counting pool over the configured size classes.
#[derive(Debug)]
pub struct BufferPool {
    classes: Vec<PoolClass>,
    available: Vec<usize>,
}

impl BufferPool {
    pub fn new(config: &PoolConfig) -> Self {
        let mut classes = config.classes.clone();
        classes.sort_by_key(|c| c.size);
        let available = classes.iter().map(|c| c.count).collect();
        Self { classes, available }
    }

    /// Check out a buffer from the smallest class that fits `len`.
    /// `None` when every fitting class is exhausted.
    pub fn acquire(&mut self, len: usize) -> Option<FrameBuffer> {
        for (i, class) in self.classes.iter().enumerate() {
            if class.size >= len && self.available[i] > 0 {
                self.available[i] -= 1;
                return Some(FrameBuffer {
                    class: i,
                    data: Vec::with_capacity(class.size),
                });
            }
        }
        log::debug!("[pool] no buffer available for len={}", len);
        None
    }

    /// Return a buffer's budget to its class.
    pub fn release(&mut self, buffer: FrameBuffer) {
        debug_assert!(self.available[buffer.class] < self.classes[buffer.class].count);
        self.available[buffer.class] += 1;
    }

    /// Free buffers per class, ascending size order.
    pub fn available(&self) -> &[usize] {
        &self.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smallest_fitting_class() {
        let mut pool = BufferPool::new(&PoolConfig::default());
        let b = pool.acquire(80).unwrap();
        assert_eq!(b.class_size(&pool), 100);
        let b2 = pool.acquire(250).unwrap();
        assert_eq!(b2.class_size(&pool), 400);
        let b3 = pool.acquire(1000).unwrap();
        assert_eq!(b3.class_size(&pool), 1280);
    }

    #[test]
    fn test_exhaustion_and_release() {
        let mut pool = BufferPool::new(&PoolConfig {
            classes: vec![PoolClass { size: 100, count: 1 }],
        });
        let b = pool.acquire(50).unwrap();
        assert!(pool.acquire(50).is_none());
        pool.release(b);
        assert!(pool.acquire(50).is_some());
    }

    #[test]
    fn test_overflow_to_larger_class() {
        let mut pool = BufferPool::new(&PoolConfig::default());
        // Exhaust the small class; small requests spill into the next one.
        let _b1 = pool.acquire(50).unwrap();
        let _b2 = pool.acquire(50).unwrap();
        let _b3 = pool.acquire(50).unwrap();
        let spill = pool.acquire(50).unwrap();
        assert_eq!(spill.class_size(&pool), 400);
    }

    #[test]
    fn test_too_large_request() {
        let mut pool = BufferPool::new(&PoolConfig::default());
        assert!(pool.acquire(4096).is_none());
    }
}

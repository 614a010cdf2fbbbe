use crate::config::PoolConfig;
use crate::graph::NodeId;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Recycles `Vec<T>` allocations between evaluation steps
pub struct BufferPool<T> {
    idle: Mutex<Vec<Vec<T>>>,
    max_idle: usize,
    initial_capacity: usize,
    allocated: AtomicUsize,
    reused: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub allocated: usize,
    pub reused: usize,
}

impl<T> BufferPool<T> {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle: config.max_idle_buffers,
            initial_capacity: config.initial_capacity,
            allocated: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
        }
    }

    /// Takes an empty buffer, reusing an idle one when available.
    pub fn get_buffer(&self) -> Vec<T> {
        if let Some(buffer) = self.idle.lock().pop() {
            self.reused.fetch_add(1, Ordering::Relaxed);
            return buffer;
        }
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Vec::with_capacity(self.initial_capacity)
    }

    /// Returns a buffer to the pool. Buffers beyond the idle limit are dropped.
    pub fn recycle(&self, mut buffer: Vec<T>) {
        buffer.clear();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(buffer);
        }
    }

    /// Buffer that goes back to the pool when dropped.
    pub fn scoped(&self) -> PooledBuffer<'_, T> {
        PooledBuffer {
            pool: self,
            buffer: Some(self.get_buffer()),
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.lock().len(),
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
        }
    }
}

pub struct PooledBuffer<'a, T> {
    pool: &'a BufferPool<T>,
    buffer: Option<Vec<T>>,
}

impl<T> PooledBuffer<'_, T> {
    /// Keeps the buffer out of the pool.
    pub fn into_inner(mut self) -> Vec<T> {
        self.buffer.take().unwrap_or_default()
    }
}

impl<T> Deref for PooledBuffer<'_, T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        // Only `into_inner` and `drop` take the buffer, both consume self.
        self.buffer.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T> DerefMut for PooledBuffer<'_, T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        self.buffer.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T> Drop for PooledBuffer<'_, T> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.recycle(buffer);
        }
    }
}

/// The pools shared by every processor of a runtime
pub struct Pools {
    pub node_ids: BufferPool<NodeId>,
}

impl Pools {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            node_ids: BufferPool::new(config),
        }
    }
}

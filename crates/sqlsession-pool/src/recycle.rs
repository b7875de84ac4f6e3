//! Recycling of session and cursor state objects.
//!
//! Closing a session or cursor hands its state back here instead of freeing
//! it. The state must drop every reference to connections, transactions and
//! arenas in [`Recycle::recycle`] so a pooled object never keeps a finished
//! handle alive.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::Mutex;

/// State that can be scrubbed and reused.
pub trait Recycle {
    /// Reset to the freshly constructed state, releasing all references.
    fn recycle(&mut self);
}

impl<T: Recycle + ?Sized> Recycle for Box<T> {
    fn recycle(&mut self) {
        (**self).recycle();
    }
}

/// A capped pool of recyclable objects.
pub struct ObjectPool<T> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
    enabled: bool,
    in_use: AtomicI64,
    allocated: AtomicU64,
    reused: AtomicU64,
}

impl<T: Recycle> ObjectPool<T> {
    /// Create a pool keeping at most `max_idle` idle objects.
    #[must_use]
    pub fn new(max_idle: usize) -> Self {
        Self::with_enabled(max_idle, true)
    }

    /// Create a pool that never keeps objects; every `get` allocates.
    #[must_use]
    pub fn disabled() -> Self {
        Self::with_enabled(0, false)
    }

    /// Create a pool, recycling only when `enabled`.
    #[must_use]
    pub fn with_enabled(max_idle: usize, enabled: bool) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
            enabled,
            in_use: AtomicI64::new(0),
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Take an idle object or build one with `make`.
    pub fn get_or_else(&self, make: impl FnOnce() -> T) -> T {
        let recycled = if self.enabled {
            self.idle.lock().pop()
        } else {
            None
        };
        let obj = match recycled {
            Some(obj) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                obj
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                make()
            }
        };
        self.in_use.fetch_add(1, Ordering::Relaxed);
        obj
    }

    /// Recycle an object and keep it if there is room.
    pub fn put(&self, mut obj: T) {
        obj.recycle();
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        if !self.enabled {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(obj);
        }
    }

    /// Whether recycling is on.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> ObjectPoolStats {
        ObjectPoolStats {
            in_use: self.in_use.load(Ordering::Relaxed),
            idle: self.idle.lock().len(),
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
        }
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("max_idle", &self.max_idle)
            .field("enabled", &self.enabled)
            .field("in_use", &self.in_use.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Statistics about an object pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectPoolStats {
    /// Objects currently checked out.
    pub in_use: i64,
    /// Objects waiting for reuse.
    pub idle: usize,
    /// Objects built because none were idle.
    pub allocated: u64,
    /// Objects served from the idle list.
    pub reused: u64,
}

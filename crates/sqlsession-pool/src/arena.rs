//! Per-session-tree borrow list of pooled slots.
//!
//! One arena belongs to one root session and every nested session and cursor
//! derived from it. Slots handed out by the arena stay exclusively with that
//! tree until [`ValueArena::clear()`] returns them all at once; arenas are
//! never shared across trees, which is what makes a handle safe to read until
//! its tree is closed.

use std::sync::Arc;

use sqlsession_types::ValueKind;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::value_pool::{Poolable, PooledValue, Slot, ValuePool};

/// Borrow list for one session tree.
#[derive(Debug)]
pub struct ValueArena {
    pool: Arc<ValuePool>,
    in_use: Vec<PooledValue>,
    closed: bool,
}

impl ValueArena {
    /// Create an empty arena drawing from `pool`.
    #[must_use]
    pub fn new(pool: Arc<ValuePool>) -> Self {
        Self::with_capacity(pool, 0)
    }

    /// Create an arena sized from `config.arena_capacity`.
    #[must_use]
    pub fn with_config(pool: Arc<ValuePool>, config: &PoolConfig) -> Self {
        Self::with_capacity(pool, config.arena_capacity)
    }

    /// Create an arena whose in-use list starts with room for `capacity`.
    #[must_use]
    pub fn with_capacity(pool: Arc<ValuePool>, capacity: usize) -> Self {
        Self {
            pool,
            in_use: Vec::with_capacity(capacity),
            closed: false,
        }
    }

    /// Borrow a slot of type `T`.
    pub fn acquire<T: Poolable>(&mut self) -> Result<Slot<T>, PoolError> {
        if self.closed {
            return Err(PoolError::ArenaClosed);
        }
        let slot = self.pool.take::<T>();
        self.in_use.push(T::wrap(slot.clone()));
        Ok(slot)
    }

    /// Borrow a slot whose kind is only known at run time.
    pub fn acquire_kind(&mut self, kind: ValueKind) -> Result<PooledValue, PoolError> {
        Ok(match kind {
            ValueKind::String => PooledValue::String(self.acquire()?),
            ValueKind::Int64 => PooledValue::Int64(self.acquire()?),
            ValueKind::Float64 => PooledValue::Float64(self.acquire()?),
            ValueKind::Bool => PooledValue::Bool(self.acquire()?),
        })
    }

    /// Borrow a nullable string slot.
    pub fn string(&mut self) -> Result<Slot<String>, PoolError> {
        self.acquire()
    }

    /// Borrow a nullable i64 slot.
    pub fn int64(&mut self) -> Result<Slot<i64>, PoolError> {
        self.acquire()
    }

    /// Borrow a nullable f64 slot.
    pub fn float64(&mut self) -> Result<Slot<f64>, PoolError> {
        self.acquire()
    }

    /// Borrow a nullable bool slot.
    pub fn bool(&mut self) -> Result<Slot<bool>, PoolError> {
        self.acquire()
    }

    /// Reset every borrowed slot and return it to the pool.
    ///
    /// Calling this on an empty arena does nothing.
    pub fn clear(&mut self) {
        if self.in_use.is_empty() {
            return;
        }
        let released = self.in_use.len();
        for value in self.in_use.drain(..) {
            self.pool.release(value);
        }
        tracing::trace!(released = released, "value arena cleared");
    }

    /// Clear and refuse further borrows.
    pub fn close(&mut self) {
        self.clear();
        self.closed = true;
    }

    /// Whether the arena has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of borrowed slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.in_use.len()
    }

    /// Whether nothing is borrowed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.in_use.is_empty()
    }

    /// The pool this arena draws from.
    #[must_use]
    pub fn pool(&self) -> &Arc<ValuePool> {
        &self.pool
    }
}

impl Drop for ValueArena {
    fn drop(&mut self) {
        self.clear();
    }
}

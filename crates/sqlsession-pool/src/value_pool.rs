//! Typed free lists of nullable scan-target slots.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use sqlsession_types::{FromSql, Nullable, SqlValue, ToSql, ValueKind};

use crate::config::PoolConfig;
use crate::error::PoolError;

static GLOBAL: Lazy<Arc<ValuePool>> = Lazy::new(|| Arc::new(ValuePool::new(&PoolConfig::default())));

/// A shared handle to one pooled nullable value.
///
/// Cloning the handle does not copy the value; both clones observe the same
/// slot. Once the owning arena is cleared the handle is stale: it reads as
/// NULL and refuses to scan, even after the slot is handed to another
/// borrower.
pub struct Slot<T> {
    inner: Arc<Mutex<SlotCell<T>>>,
    generation: u64,
}

/// Slot payload plus the number of times it was released.
struct SlotCell<T> {
    value: Nullable<T>,
    generation: u64,
}

impl<T: Poolable> Slot<T> {
    fn fresh() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotCell {
                value: Nullable::null(),
                generation: 0,
            })),
            generation: 0,
        }
    }

    /// Snapshot the current contents, NULL for a stale handle.
    #[must_use]
    pub fn get(&self) -> Nullable<T> {
        let cell = self.inner.lock();
        if cell.generation == self.generation {
            cell.value.clone()
        } else {
            Nullable::null()
        }
    }

    /// The payload if valid.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        let cell = self.inner.lock();
        if cell.generation != self.generation {
            return None;
        }
        cell.value.get().cloned()
    }

    /// Whether the slot holds a non-NULL value.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let cell = self.inner.lock();
        cell.generation == self.generation && cell.value.is_valid()
    }

    /// Whether the owning arena has released this handle's slot.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.inner.lock().generation != self.generation
    }

    /// Fill the slot from a driver value.
    ///
    /// Fails with [`PoolError::ArenaClosed`] once the slot was released.
    pub fn scan(&self, value: &SqlValue) -> Result<(), PoolError> {
        let mut cell = self.inner.lock();
        if cell.generation != self.generation {
            return Err(PoolError::ArenaClosed);
        }
        cell.value.scan(value)?;
        Ok(())
    }

    /// Whether two handles refer to the same underlying slot.
    #[must_use]
    pub fn same_slot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Reset the payload and invalidate every outstanding handle.
    fn reset(&self) {
        let mut cell = self.inner.lock();
        cell.value.clear();
        cell.generation = cell.generation.wrapping_add(1);
    }

    /// Adopt the slot's current generation when handing it out again.
    fn renew(mut self) -> Self {
        self.generation = self.inner.lock().generation;
        self
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            generation: self.generation,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.inner.lock();
        if cell.generation == self.generation {
            f.debug_tuple("Slot").field(&cell.value).finish()
        } else {
            f.debug_tuple("Slot").field(&"<released>").finish()
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for String {}
    impl Sealed for i64 {}
    impl Sealed for f64 {}
    impl Sealed for bool {}
}

/// Payload types the value pool recycles.
///
/// Sealed: implemented for `String`, `i64`, `f64` and `bool` only.
pub trait Poolable:
    sealed::Sealed + FromSql + ToSql + Default + Clone + Send + 'static
{
    /// The slot kind for this payload.
    const KIND: ValueKind;

    /// Wrap a typed slot for the arena's in-use list.
    fn wrap(slot: Slot<Self>) -> PooledValue;

    /// This type's free list inside a pool.
    fn free_list(pool: &ValuePool) -> &FreeList<Self>;
}

impl Poolable for String {
    const KIND: ValueKind = ValueKind::String;

    fn wrap(slot: Slot<Self>) -> PooledValue {
        PooledValue::String(slot)
    }

    fn free_list(pool: &ValuePool) -> &FreeList<Self> {
        &pool.strings
    }
}

impl Poolable for i64 {
    const KIND: ValueKind = ValueKind::Int64;

    fn wrap(slot: Slot<Self>) -> PooledValue {
        PooledValue::Int64(slot)
    }

    fn free_list(pool: &ValuePool) -> &FreeList<Self> {
        &pool.ints
    }
}

impl Poolable for f64 {
    const KIND: ValueKind = ValueKind::Float64;

    fn wrap(slot: Slot<Self>) -> PooledValue {
        PooledValue::Float64(slot)
    }

    fn free_list(pool: &ValuePool) -> &FreeList<Self> {
        &pool.floats
    }
}

impl Poolable for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn wrap(slot: Slot<Self>) -> PooledValue {
        PooledValue::Bool(slot)
    }

    fn free_list(pool: &ValuePool) -> &FreeList<Self> {
        &pool.bools
    }
}

/// A borrowed slot of any of the four pooled kinds.
#[derive(Debug, Clone)]
pub enum PooledValue {
    /// Nullable text slot.
    String(Slot<String>),
    /// Nullable integer slot.
    Int64(Slot<i64>),
    /// Nullable float slot.
    Float64(Slot<f64>),
    /// Nullable boolean slot.
    Bool(Slot<bool>),
}

impl PooledValue {
    /// The slot kind.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::String(_) => ValueKind::String,
            Self::Int64(_) => ValueKind::Int64,
            Self::Float64(_) => ValueKind::Float64,
            Self::Bool(_) => ValueKind::Bool,
        }
    }

    /// Whether the slot holds a non-NULL value.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::String(s) => s.is_valid(),
            Self::Int64(s) => s.is_valid(),
            Self::Float64(s) => s.is_valid(),
            Self::Bool(s) => s.is_valid(),
        }
    }

    /// Fill the slot from a driver value.
    pub fn scan(&self, value: &SqlValue) -> Result<(), PoolError> {
        match self {
            Self::String(s) => s.scan(value),
            Self::Int64(s) => s.scan(value),
            Self::Float64(s) => s.scan(value),
            Self::Bool(s) => s.scan(value),
        }
    }

    /// Snapshot the slot as a driver-neutral value (`Null` when invalid).
    #[must_use]
    pub fn to_sql_value(&self) -> SqlValue {
        fn snapshot<T: Poolable>(slot: &Slot<T>) -> SqlValue {
            slot.get().to_sql().unwrap_or(SqlValue::Null)
        }
        match self {
            Self::String(s) => snapshot(s),
            Self::Int64(s) => snapshot(s),
            Self::Float64(s) => snapshot(s),
            Self::Bool(s) => snapshot(s),
        }
    }

    fn reset(&self) {
        match self {
            Self::String(s) => s.reset(),
            Self::Int64(s) => s.reset(),
            Self::Float64(s) => s.reset(),
            Self::Bool(s) => s.reset(),
        }
    }
}

/// A capped, mutex-guarded stack of idle slots.
pub struct FreeList<T> {
    slots: Mutex<Vec<Slot<T>>>,
    max_idle: usize,
}

impl<T> FreeList<T> {
    fn new(max_idle: usize) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    fn pop(&self) -> Option<Slot<T>> {
        self.slots.lock().pop()
    }

    /// Returns `false` when the list is full and the slot was dropped.
    fn push(&self, slot: Slot<T>) -> bool {
        let mut slots = self.slots.lock();
        if slots.len() >= self.max_idle {
            return false;
        }
        slots.push(slot);
        true
    }

    /// Number of idle slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether no slots are idle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pool of recyclable nullable slots.
///
/// Thread-safe; each free list has its own lock so borrowers of different
/// kinds never contend.
pub struct ValuePool {
    strings: FreeList<String>,
    ints: FreeList<i64>,
    floats: FreeList<f64>,
    bools: FreeList<bool>,
    in_use: AtomicI64,
    allocated: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
}

impl ValuePool {
    /// Create a pool using the idle cap from `config`.
    #[must_use]
    pub fn new(config: &PoolConfig) -> Self {
        Self::with_max_idle(config.max_idle_values)
    }

    /// Create a pool keeping at most `max_idle` idle slots per type.
    #[must_use]
    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            strings: FreeList::new(max_idle),
            ints: FreeList::new(max_idle),
            floats: FreeList::new(max_idle),
            bools: FreeList::new(max_idle),
            in_use: AtomicI64::new(0),
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// The process-wide shared pool.
    #[must_use]
    pub fn global() -> Arc<ValuePool> {
        Arc::clone(&GLOBAL)
    }

    /// Take a slot from the free list, allocating on a miss.
    pub(crate) fn take<T: Poolable>(&self) -> Slot<T> {
        let slot = match T::free_list(self).pop() {
            Some(slot) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                slot.renew()
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Slot::fresh()
            }
        };
        self.in_use.fetch_add(1, Ordering::Relaxed);
        slot
    }

    /// Reset a slot and return it to its free list.
    pub(crate) fn release(&self, value: PooledValue) {
        value.reset();
        let kept = match value {
            PooledValue::String(s) => self.strings.push(s),
            PooledValue::Int64(s) => self.ints.push(s),
            PooledValue::Float64(s) => self.floats.push(s),
            PooledValue::Bool(s) => self.bools.push(s),
        };
        if !kept {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
        self.in_use.fetch_sub(1, Ordering::Relaxed);
    }

    /// Number of idle slots of one kind.
    #[must_use]
    pub fn idle(&self, kind: ValueKind) -> usize {
        match kind {
            ValueKind::String => self.strings.len(),
            ValueKind::Int64 => self.ints.len(),
            ValueKind::Float64 => self.floats.len(),
            ValueKind::Bool => self.bools.len(),
        }
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> ValuePoolStats {
        ValuePoolStats {
            in_use: self.in_use.load(Ordering::Relaxed),
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            idle: ValueKind::ALL.map(|kind| self.idle(kind)).iter().sum(),
        }
    }
}

impl Default for ValuePool {
    fn default() -> Self {
        Self::new(&PoolConfig::default())
    }
}

impl fmt::Debug for ValuePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValuePool")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Statistics about a value pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValuePoolStats {
    /// Slots currently borrowed by arenas. Diagnostic only.
    pub in_use: i64,
    /// Slots created because a free list was empty.
    pub allocated: u64,
    /// Slots served from a free list.
    pub reused: u64,
    /// Released slots dropped because a free list was full.
    pub discarded: u64,
    /// Idle slots across all four free lists.
    pub idle: usize,
}

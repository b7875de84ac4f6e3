//! # sqlsession-pool
//!
//! Recycling pools behind the sqlsession layer.
//!
//! High-throughput query paths scan every column into a nullable target.
//! Allocating those targets per row is wasteful, so this crate keeps them on
//! typed free lists and hands them out through a per-session [`ValueArena`]:
//!
//! - [`ValuePool`] owns four free lists (string, i64, f64, bool) plus
//!   diagnostics counters. It is injected into each database handle;
//!   [`ValuePool::global()`] exists for callers that want one per process.
//! - [`ValueArena`] records every slot borrowed by one session tree and
//!   returns them all in one [`ValueArena::clear()`].
//! - [`ObjectPool`] recycles larger state objects (session and cursor
//!   state) that implement [`Recycle`].
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sqlsession_pool::{PoolConfig, ValueArena, ValuePool};
//! use sqlsession_types::SqlValue;
//!
//! let pool = Arc::new(ValuePool::new(&PoolConfig::default()));
//! let mut arena = ValueArena::new(pool.clone());
//!
//! let id = arena.int64().unwrap();
//! id.scan(&SqlValue::Int(7)).unwrap();
//! assert_eq!(id.value(), Some(7));
//!
//! arena.clear();
//! assert!(!id.is_valid());
//! assert_eq!(pool.stats().in_use, 0);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod arena;
pub mod config;
pub mod error;
pub mod recycle;
pub mod value_pool;

pub use arena::ValueArena;
pub use config::PoolConfig;
pub use error::PoolError;
pub use recycle::{ObjectPool, ObjectPoolStats, Recycle};
pub use value_pool::{FreeList, Poolable, PooledValue, Slot, ValuePool, ValuePoolStats};

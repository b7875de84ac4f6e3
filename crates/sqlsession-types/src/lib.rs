//! # sqlsession-types
//!
//! Value types shared by the sqlsession crates.
//!
//! This crate defines the driver-neutral [`SqlValue`] that drivers hand back
//! for every column, the nullable scan targets ([`NullString`],
//! [`NullInt64`], [`NullFloat64`], [`NullBool`]) that the session layer pools
//! and recycles, and the conversions between them and Rust types.
//!
//! ## Type Mappings
//!
//! | Column kind | SqlValue | Scan target |
//! |-------------|----------|-------------|
//! | text | `SqlValue::String` | `NullString` |
//! | integer | `SqlValue::Int` | `NullInt64` |
//! | floating point | `SqlValue::Float` | `NullFloat64` |
//! | boolean | `SqlValue::Bool` | `NullBool` |
//!
//! Binary columns travel as `SqlValue::Binary` and are not pooled.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod from_sql;
pub mod nullable;
pub mod to_sql;
pub mod value;

pub use error::TypeError;
pub use from_sql::FromSql;
pub use nullable::{NullBool, NullFloat64, NullInt64, NullString, Nullable};
pub use to_sql::{ToSql, to_params};
pub use value::{SqlValue, ValueKind};

//! # sqlsession-testing
//!
//! Test infrastructure for sqlsession.
//!
//! This crate provides a scripted in-memory driver so session, transaction,
//! hook and metrics behavior can be tested without a database.
//!
//! ## Features
//!
//! - Mock driver implementing every sqlsession driver trait
//! - Ordered expectations with scripted rows, outcomes, errors and delays
//! - A log of every driver call for assertions
//! - Canned result sets and a tracing setup for tests
//!
//! ## Mock Driver Example
//!
//! ```rust,ignore
//! use sqlsession::{Context, Db};
//! use sqlsession_testing::{fixtures, mock_driver::MockDatabase};
//!
//! #[tokio::test]
//! async fn test_with_mock_driver() {
//!     let mock = MockDatabase::new();
//!     mock.expect_query(fixtures::USERS_SQL).returning(fixtures::users());
//!
//!     let db = Db::new(mock.handle());
//!     let session = db.session().unwrap();
//!     let rows = session
//!         .query(&Context::new(), fixtures::USERS_SQL, &[])
//!         .await
//!         .unwrap()
//!         .fetch_all()
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(rows.len(), 3);
//!     mock.verify().unwrap();
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_driver;

pub use mock_driver::{ExpectationBuilder, MockDatabase, MockError, MockEvent, MockRows};

//! Database management and control.
//!
//! Only SQLite is supported at present. Do not reach into this module from outside the crate;
//! use the [`crate::FeedApi`]/[`crate::ReconcileApi`] surface instead. The row types are public
//! via [`crate::db_types`].

#[cfg(feature = "sqlite")]
pub mod sqlite;

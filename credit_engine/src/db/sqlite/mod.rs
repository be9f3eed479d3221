//! # SQLite database methods
//!
//! This module contains the "low-level" SQLite interactions for the feed cache.
//!
//! All interactions are plain functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool, or open a
//! transaction and pass `&mut *tx` without any other changes.

use std::env;

use log::info;
use sqlx::{migrate::Migrator, sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

mod sqlite_impl;

pub mod feed;
pub mod history;
pub mod messages;
pub mod metadata;
pub mod requests;

pub use sqlite_impl::SqliteFeedStore;

pub static MIGRATOR: Migrator = sqlx::migrate!("src/db/sqlite/migrations");

const SQLITE_DB_URL: &str = "sqlite://data/credit_feed.db";

pub fn db_url() -> String {
    let result = env::var("CPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("CPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

//! The HTTP binding of the credit payment gateway.
//!
//! This crate is intentionally thin: configuration, the actix routes, the scheduled
//! reconciliation worker, and the adapters that plug the `partner_tools` HTTP clients into the
//! `credit_engine` capability traits. All pipeline behaviour lives in the engine.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod integrations;
pub mod routes;
pub mod server;
pub mod sync_worker;

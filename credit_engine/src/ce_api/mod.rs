//! The engine's public API surface.
//!
//! Three API structs split the pipeline by collaborator footprint: [`SubmissionApi`] creates
//! applications, [`ReconcileApi`] keeps bank/CRM/cache state aligned, and [`FeedApi`] serves
//! cached reads without any partner access.

pub mod errors;
pub mod feed_api;
pub mod flow_objects;
pub mod reconcile_api;
pub mod submission_api;

pub use errors::CreditFlowError;
pub use feed_api::FeedApi;
pub use reconcile_api::ReconcileApi;
pub use submission_api::SubmissionApi;

//! Credit Payment Engine
//!
//! The core of a gateway that connects a CRM's order pipeline to consumer-credit providers.
//! Store orders become loan applications at one of the configured partners, bank-side status
//! changes are polled and mapped into the CRM's canonical payment statuses, and the reconciled
//! view is cached locally so CRM-facing reads never wait on a partner API.
//!
//! The crate is organised in three layers:
//! 1. Collaborator capabilities ([`mod@traits`]). The CRM, the partner APIs and the feed store
//!    are injected behind traits; the engine contains no HTTP and no ambient configuration.
//! 2. Pure domain logic: the per-partner status adapters and product tables ([`mod@status`]),
//!    the submission guard ([`mod@guard`]) and field normalization ([`mod@helpers`]).
//! 3. The public API structs ([`SubmissionApi`], [`ReconcileApi`], [`FeedApi`]) that compose the
//!    above into the submission, reconciliation and cached-read flows.
//!
//! A SQLite implementation of the feed store is provided behind the `sqlite` feature (on by
//! default).

mod ce_api;
mod db;

pub mod db_types;
pub mod guard;
pub mod helpers;
pub mod status;
pub mod traits;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{db_url, new_pool, SqliteFeedStore, MIGRATOR};

pub use ce_api::{flow_objects, CreditFlowError, FeedApi, ReconcileApi, SubmissionApi};

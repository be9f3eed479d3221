//! HTTP clients for the gateway's external collaborators: the Simla CRM and the three credit
//! partners (Microinvest, Easy Credit, Iute).
//!
//! These clients speak each service's wire format and nothing else: no canonical status
//! vocabulary, no reconciliation rules. The `credit_server` crate adapts them to the engine's
//! capability traits.

mod config;
mod data_objects;
mod easycredit;
mod error;
mod helpers;
mod iute;
mod microinvest;
mod simla;

pub use config::{EasyCreditConfig, IuteConfig, MicroinvestConfig, SimlaConfig};
pub use data_objects::*;
pub use easycredit::EasyCreditApi;
pub use error::PartnerApiError;
pub use helpers::{content_type_for, is_contract_filename};
pub use iute::IuteApi;
pub use microinvest::MicroinvestApi;
pub use simla::{crm_fields as simla_fields, SimlaApi};

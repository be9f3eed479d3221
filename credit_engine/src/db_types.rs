use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use cpg_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

/// CRM lifecycle statuses that take an order out of the active credit pipeline. Orders in one of
/// these states are excluded from reconciliation passes and shown under the "archive" feed filter.
pub const ARCHIVED_ORDER_STATUSES: [&str; 12] = [
    "delivering",
    "delivered",
    "complete",
    "shipped",
    "no-call",
    "no-product",
    "already-buyed",
    "delyv-did-not-suit",
    "prices-did-not-suit",
    "cancel-other",
    "purchase-return",
    "ne-zabral-zakaz",
];

pub fn is_archived_status(status: Option<&str>) -> bool {
    status.map(|s| ARCHIVED_ORDER_STATUSES.contains(&s)).unwrap_or(false)
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(pub String);

//--------------------------------------       OrderId        ---------------------------------------------------------
/// The CRM's numeric order identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub i64);

impl OrderId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------     ApplicationId    ---------------------------------------------------------
/// The partner's opaque application reference. A numeric id for Microinvest, a URN for Easy
/// Credit, and a synthetic `CRM-{order}` code for Iute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ApplicationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ApplicationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------    CreditProvider    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CreditProvider {
    Microinvest,
    EasyCredit,
    Iute,
}

impl Display for CreditProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreditProvider::Microinvest => write!(f, "microinvest"),
            CreditProvider::EasyCredit => write!(f, "easycredit"),
            CreditProvider::Iute => write!(f, "iute"),
        }
    }
}

impl FromStr for CreditProvider {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "microinvest" => Ok(Self::Microinvest),
            "easycredit" => Ok(Self::EasyCredit),
            // The CRM select field historically used the long spelling
            "iute" | "iutecredit" => Ok(Self::Iute),
            other => Err(ConversionError(format!("Unknown credit company: {other}"))),
        }
    }
}

//--------------------------------------      CrmStatus       ---------------------------------------------------------
/// The canonical payment-status vocabulary. Every partner's raw status space maps onto this
/// closed set; raw strings never leave the adapter layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum CrmStatus {
    CreditCheck,
    CreditApproved,
    ConditionsChanged,
    CreditDeclined,
    SignedOnline,
    Paid,
}

impl CrmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrmStatus::CreditCheck => "credit-check",
            CrmStatus::CreditApproved => "credit-approved",
            CrmStatus::ConditionsChanged => "conditions-changed",
            CrmStatus::CreditDeclined => "credit-declined",
            CrmStatus::SignedOnline => "signed-online",
            CrmStatus::Paid => "paid",
        }
    }
}

impl Display for CrmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrmStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit-check" => Ok(Self::CreditCheck),
            "credit-approved" => Ok(Self::CreditApproved),
            "conditions-changed" => Ok(Self::ConditionsChanged),
            "credit-declined" => Ok(Self::CreditDeclined),
            "signed-online" => Ok(Self::SignedOnline),
            "paid" => Ok(Self::Paid),
            other => Err(ConversionError(format!("Invalid payment status: {other}"))),
        }
    }
}

//--------------------------------------   StatusScope/Source  --------------------------------------------------------
/// Which side of the integration a history row records: the raw bank transition, or the canonical
/// CRM transition derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StatusScope {
    Bank,
    Crm,
}

impl Display for StatusScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusScope::Bank => write!(f, "bank"),
            StatusScope::Crm => write!(f, "crm"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StatusSource {
    Api,
    Cron,
    Webhook,
    User,
}

impl Display for StatusSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusSource::Api => write!(f, "api"),
            StatusSource::Cron => write!(f, "cron"),
            StatusSource::Webhook => write!(f, "webhook"),
            StatusSource::User => write!(f, "user"),
        }
    }
}

//--------------------------------------      ProductType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    #[default]
    #[serde(rename = "retail")]
    Retail,
    #[serde(rename = "0%")]
    ZeroInterest,
}

impl Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductType::Retail => write!(f, "retail"),
            ProductType::ZeroInterest => write!(f, "0%"),
        }
    }
}

//--------------------------------------    TermsSnapshot     ---------------------------------------------------------
/// One side of the requested-vs-approved comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermsSnapshot {
    pub amount: Money,
    pub term: u32,
    pub product_type: ProductType,
}

impl TermsSnapshot {
    pub fn new(amount: Money, term: u32, product_type: ProductType) -> Self {
        Self { amount, term, product_type }
    }
}

/// What the customer asked for next to what the bank approved, persisted alongside the feed row so
/// managers can see the delta without another partner round-trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsComparison {
    pub requested: TermsSnapshot,
    pub approved: Option<TermsSnapshot>,
}

//--------------------------------------     BankSnapshot     ---------------------------------------------------------
/// A partner's current view of one application. `None` from the gateway means the partner has not
/// finished processing the application yet, which is not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BankSnapshot {
    pub raw_status: String,
    pub document_status: Option<String>,
    pub approved_amount: Option<Money>,
    pub approved_term: Option<u32>,
    /// Microinvest reports the approved product as a catalogue UUID; the engine resolves it
    /// against the loan-product table to detect a retail/zero-interest switch.
    pub approved_product_id: Option<String>,
    pub message: Option<String>,
}

//--------------------------------------     CreditPayment    ---------------------------------------------------------
/// The credit-type payment attached to a CRM order. Orders paid by other means never enter this
/// pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CreditPayment {
    pub id: String,
    pub kind: String,
    pub amount: Money,
    pub status: Option<String>,
}

impl CreditPayment {
    pub fn is_credit(&self) -> bool {
        matches!(self.kind.as_str(), "credit" | "kredit-onlain")
    }
}

//--------------------------------------       GoodsLine      ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GoodsLine {
    pub id: String,
    pub name: String,
    pub sku: Option<String>,
    pub price: Money,
    pub quantity: u32,
    pub image_url: Option<String>,
    pub url: Option<String>,
}

//--------------------------------------       CrmOrder       ---------------------------------------------------------
/// A CRM order reduced to the fields the credit pipeline branches on. Produced by the CRM gateway
/// from the raw order payload; read-only to this crate.
#[derive(Debug, Clone, Default)]
pub struct CrmOrder {
    pub id: OrderId,
    pub number: Option<String>,
    pub site: Option<String>,
    pub phone: Option<String>,
    /// CRM order lifecycle status (delivering, complete, ...), not the payment status.
    pub status: Option<String>,
    pub manager_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub idnp: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birthday: Option<String>,
    pub residence: Option<String>,
    /// Raw value of the credit-company select field, as the CRM stores it.
    pub credit_company: Option<String>,
    pub credit_term: Option<String>,
    pub zero_interest: bool,
    pub application_id: Option<ApplicationId>,
    pub payment: Option<CreditPayment>,
    pub goods: Vec<GoodsLine>,
    pub total: Money,
}

impl CrmOrder {
    /// Resolve the credit-company selector strictly. An unset selector falls back to Microinvest
    /// (the CRM's default); an unknown value is an error.
    pub fn resolve_provider(&self) -> Result<CreditProvider, ConversionError> {
        match self.credit_company.as_deref() {
            None | Some("") => Ok(CreditProvider::Microinvest),
            Some(raw) => raw.parse(),
        }
    }

    /// Provider for read-side paths, where an unknown selector falls back to Microinvest rather
    /// than failing the whole pass.
    pub fn provider_or_default(&self) -> CreditProvider {
        self.resolve_provider().unwrap_or(CreditProvider::Microinvest)
    }

    pub fn credit_term_months(&self) -> u32 {
        self.credit_term.as_deref().and_then(|t| t.trim().parse().ok()).unwrap_or(0)
    }

    pub fn requested_amount(&self) -> Money {
        self.payment.as_ref().map(|p| p.amount).unwrap_or_default()
    }

    pub fn customer_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let name = name.trim();
        if name.is_empty() {
            "-".to_string()
        } else {
            name.to_string()
        }
    }

    pub fn is_archived(&self) -> bool {
        is_archived_status(self.status.as_deref())
    }
}

//--------------------------------------       FileBlob       ---------------------------------------------------------
/// An order attachment as the CRM serves it: a filename plus base64 content. The pipeline never
/// inspects the bytes, it only moves them between the CRM and the partners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlob {
    pub name: String,
    pub data: String,
}

//--------------------------------------       FeedItem       ---------------------------------------------------------
/// The cached, CRM-facing view of one order's credit application. One row per order, upserted by
/// the reconciliation loop and only ever deleted explicitly.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub order_id: OrderId,
    pub order_number: Option<String>,
    pub application_id: ApplicationId,
    pub credit_company: CreditProvider,
    pub customer_name: String,
    pub bank_status: String,
    pub document_status: Option<String>,
    /// Raw CRM payment status string. Not restricted to the canonical set: the CRM also reports
    /// states like `not-paid` that this system never writes.
    pub crm_status: Option<String>,
    pub payment_type: Option<String>,
    pub order_status: Option<String>,
    pub manager_id: Option<i64>,
    pub manager_name: Option<String>,
    pub conditions_changed: bool,
    /// JSON-serialized [`TermsComparison`].
    pub comparison: Option<String>,
    pub order_created_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedItem {
    pub fn terms_comparison(&self) -> Option<TermsComparison> {
        self.comparison.as_deref().and_then(|json| serde_json::from_str(json).ok())
    }

    pub fn is_archived(&self) -> bool {
        is_archived_status(self.order_status.as_deref())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewFeedItem {
    pub order_id: OrderId,
    pub order_number: Option<String>,
    pub application_id: ApplicationId,
    pub credit_company: CreditProvider,
    pub customer_name: String,
    pub bank_status: String,
    pub document_status: Option<String>,
    pub crm_status: Option<String>,
    pub payment_type: Option<String>,
    pub order_status: Option<String>,
    pub manager_id: Option<i64>,
    pub manager_name: Option<String>,
    pub conditions_changed: bool,
    pub comparison: Option<TermsComparison>,
    pub order_created_at: Option<DateTime<Utc>>,
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self(String::new())
    }
}

impl Default for CreditProvider {
    fn default() -> Self {
        CreditProvider::Microinvest
    }
}

impl From<&FeedItem> for NewFeedItem {
    fn from(item: &FeedItem) -> Self {
        Self {
            order_id: item.order_id,
            order_number: item.order_number.clone(),
            application_id: item.application_id.clone(),
            credit_company: item.credit_company,
            customer_name: item.customer_name.clone(),
            bank_status: item.bank_status.clone(),
            document_status: item.document_status.clone(),
            crm_status: item.crm_status.clone(),
            payment_type: item.payment_type.clone(),
            order_status: item.order_status.clone(),
            manager_id: item.manager_id,
            manager_name: item.manager_name.clone(),
            conditions_changed: item.conditions_changed,
            comparison: item.terms_comparison(),
            order_created_at: item.order_created_at,
        }
    }
}

//--------------------------------------    Status history    ---------------------------------------------------------
/// One observed status transition. Append-only: rows are never mutated or deleted, so the table
/// is a faithful audit trail rather than authoritative state.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub application_id: ApplicationId,
    pub status_type: StatusScope,
    pub old_status: Option<String>,
    pub new_status: String,
    pub source: StatusSource,
    pub details: Option<String>,
    pub manager_id: Option<i64>,
    pub manager_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStatusEntry {
    pub application_id: ApplicationId,
    pub status_type: StatusScope,
    pub old_status: Option<String>,
    pub new_status: String,
    pub source: StatusSource,
    pub details: Option<String>,
    pub manager_id: Option<i64>,
    pub manager_name: Option<String>,
}

impl NewStatusEntry {
    pub fn bank(
        application_id: ApplicationId,
        old_status: Option<String>,
        new_status: impl Into<String>,
        source: StatusSource,
    ) -> Self {
        Self {
            application_id,
            status_type: StatusScope::Bank,
            old_status,
            new_status: new_status.into(),
            source,
            details: None,
            manager_id: None,
            manager_name: None,
        }
    }

    pub fn crm(
        application_id: ApplicationId,
        old_status: Option<String>,
        new_status: impl Into<String>,
        source: StatusSource,
    ) -> Self {
        Self {
            application_id,
            status_type: StatusScope::Crm,
            old_status,
            new_status: new_status.into(),
            source,
            details: None,
            manager_id: None,
            manager_name: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_manager(mut self, manager_id: Option<i64>, manager_name: Option<String>) -> Self {
        self.manager_id = manager_id;
        self.manager_name = manager_name;
        self
    }
}

//--------------------------------------  ApplicationRequest  ---------------------------------------------------------
/// Audit copy of the exact payload submitted to a partner, for read-back when a bank disputes
/// what was sent. File contents are not kept, only the manifest.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRequest {
    pub application_id: ApplicationId,
    pub order_id: OrderId,
    pub credit_company: CreditProvider,
    pub request_data: String,
    pub files_count: i64,
    /// JSON array of the attached filenames.
    pub file_names: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewApplicationRequest {
    pub application_id: ApplicationId,
    pub order_id: OrderId,
    pub credit_company: CreditProvider,
    pub request_data: serde_json::Value,
    pub files_count: i64,
    pub file_names: Vec<String>,
}

//--------------------------------------     SentMessage      ---------------------------------------------------------
/// Manager attribution for messages sent to a partner chat. The bank echoes messages back without
/// saying which CRM user wrote them; matching against this table restores the attribution.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub id: i64,
    pub application_id: ApplicationId,
    pub message_text: String,
    pub manager_id: Option<i64>,
    pub manager_name: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSentMessage {
    pub application_id: ApplicationId,
    pub message_text: String,
    pub manager_id: Option<i64>,
    pub manager_name: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn provider_spellings() {
        assert_eq!("microinvest".parse::<CreditProvider>().unwrap(), CreditProvider::Microinvest);
        assert_eq!("iutecredit".parse::<CreditProvider>().unwrap(), CreditProvider::Iute);
        assert_eq!("iute".parse::<CreditProvider>().unwrap(), CreditProvider::Iute);
        assert!("bancamea".parse::<CreditProvider>().is_err());
    }

    #[test]
    fn unset_selector_defaults_to_microinvest() {
        let order = CrmOrder::default();
        assert_eq!(order.resolve_provider().unwrap(), CreditProvider::Microinvest);
        let order = CrmOrder { credit_company: Some("snailbank".into()), ..Default::default() };
        assert!(order.resolve_provider().is_err());
        assert_eq!(order.provider_or_default(), CreditProvider::Microinvest);
    }

    #[test]
    fn crm_status_round_trip() {
        for status in [
            CrmStatus::CreditCheck,
            CrmStatus::CreditApproved,
            CrmStatus::ConditionsChanged,
            CrmStatus::CreditDeclined,
            CrmStatus::SignedOnline,
            CrmStatus::Paid,
        ] {
            assert_eq!(status.as_str().parse::<CrmStatus>().unwrap(), status);
        }
        assert!("not-paid".parse::<CrmStatus>().is_err());
    }

    #[test]
    fn archived_status_set() {
        assert!(is_archived_status(Some("complete")));
        assert!(is_archived_status(Some("delivering")));
        assert!(!is_archived_status(Some("credit-check")));
        assert!(!is_archived_status(None));
    }

    #[test]
    fn customer_name_falls_back_to_dash() {
        let order = CrmOrder::default();
        assert_eq!(order.customer_name(), "-");
        let order = CrmOrder { first_name: Some("Ion".into()), ..Default::default() };
        assert_eq!(order.customer_name(), "Ion");
    }
}

//! Per-partner status vocabulary adapters.
//!
//! Each partner reports application state in its own vocabulary; the adapters map those raw
//! strings onto the canonical [`CrmStatus`] set and carry the partner-specific rules the
//! reconciliation engine branches on: which raw statuses count as approved, which are terminal,
//! and how far an approved amount may drift from the requested one before the order is flagged as
//! `conditions-changed`.
//!
//! The tables are plain owned data handed to the adapter at construction. Tests substitute their
//! own tables; production code uses the `microinvest()`/`easy_credit()`/`iute()` constructors.

use std::collections::{HashMap, HashSet};

use cpg_common::Money;
use log::debug;

use crate::db_types::{CreditProvider, CrmStatus, ProductType, TermsSnapshot};

//--------------------------------------    StatusAdapter     ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct StatusAdapter {
    provider: CreditProvider,
    table: HashMap<String, CrmStatus>,
    approved_like: HashSet<String>,
    final_statuses: HashSet<String>,
    /// Maximum approved-vs-requested amount drift that does NOT count as a condition change.
    /// Zero for partners that echo the requested amount exactly.
    amount_tolerance: Money,
}

impl StatusAdapter {
    pub fn new(
        provider: CreditProvider,
        table: &[(&str, CrmStatus)],
        approved_like: &[&str],
        final_statuses: &[&str],
        amount_tolerance: Money,
    ) -> Self {
        Self {
            provider,
            table: table.iter().map(|(raw, canonical)| (raw.to_string(), *canonical)).collect(),
            approved_like: approved_like.iter().map(|s| s.to_string()).collect(),
            final_statuses: final_statuses.iter().map(|s| s.to_string()).collect(),
            amount_tolerance,
        }
    }

    pub fn microinvest() -> Self {
        use CrmStatus::*;
        Self::new(
            CreditProvider::Microinvest,
            &[
                ("Placed", CreditCheck),
                ("Processing", CreditCheck),
                ("Approved", CreditApproved),
                ("Refused", CreditDeclined),
                ("SignedOnline", SignedOnline),
                ("SignedPhysically", SignedOnline),
                ("Issued", Paid),
                ("PendingIssue", CreditApproved),
                ("IssueRejected", CreditDeclined),
            ],
            &["Approved", "SignedOnline", "SignedPhysically", "Issued", "PendingIssue"],
            &["Refused", "Issued", "IssueRejected"],
            // Microinvest echoes the requested amount verbatim, so any drift is a real change
            Money::from_bani(0),
        )
    }

    pub fn easy_credit() -> Self {
        use CrmStatus::*;
        Self::new(
            CreditProvider::EasyCredit,
            &[
                ("New", CreditCheck),
                ("Approved", CreditApproved),
                ("More Data", CreditCheck),
                ("Refused", CreditDeclined),
                ("Rejected", CreditDeclined),
                ("Canceled", CreditDeclined),
                ("Disbursed", Paid),
                ("Settled", Paid),
            ],
            &["Approved", "Disbursed", "Settled"],
            &["Refused", "Rejected", "Canceled", "Disbursed", "Settled"],
            // Easy Credit rounds the approved amount; up to one leu of drift is not a change
            Money::from_lei(1),
        )
    }

    pub fn iute() -> Self {
        use CrmStatus::*;
        Self::new(
            CreditProvider::Iute,
            &[
                ("CUSTOMER_NOT_EXISTS", CreditCheck),
                ("PENDING", CreditCheck),
                ("IN_PROGRESS", CreditCheck),
                ("PAID", Paid),
                ("CANCELLED", CreditDeclined),
            ],
            // Iute has no approval step, so there is nothing to compare conditions against
            &[],
            &["PAID", "CANCELLED"],
            Money::from_bani(0),
        )
    }

    pub fn provider(&self) -> CreditProvider {
        self.provider
    }

    /// Map a raw partner status to the canonical vocabulary. `None` for anything outside the
    /// table; callers must treat that as "no state change", not as an error.
    pub fn map_status(&self, raw: &str) -> Option<CrmStatus> {
        self.table.get(raw).copied()
    }

    pub fn is_approved_like(&self, raw: &str) -> bool {
        self.approved_like.contains(raw)
    }

    pub fn is_final(&self, raw: &str) -> bool {
        self.final_statuses.contains(raw)
    }

    /// True when the bank approved materially different terms than the customer requested.
    /// Term and product type use exact equality; the amount check honours the per-partner
    /// tolerance.
    pub fn conditions_changed(&self, requested: &TermsSnapshot, approved: &TermsSnapshot) -> bool {
        let amount_changed = requested.amount.abs_diff(approved.amount) > self.amount_tolerance;
        let term_changed = requested.term != approved.term;
        let product_changed = requested.product_type != approved.product_type;
        if amount_changed || term_changed || product_changed {
            debug!(
                "🧮️ {} conditions comparison: requested {}/{}m/{} vs approved {}/{}m/{} \
                 (amount: {amount_changed}, term: {term_changed}, product: {product_changed})",
                self.provider,
                requested.amount,
                requested.term,
                requested.product_type,
                approved.amount,
                approved.term,
                approved.product_type,
            );
            return true;
        }
        false
    }
}

//--------------------------------------    StatusAdapters    ---------------------------------------------------------
/// The full adapter set, selected by the provider tag stored on the order. Adding a partner means
/// adding a variant here and a table above; nothing in the engine enumerates providers elsewhere.
#[derive(Debug, Clone)]
pub struct StatusAdapters {
    microinvest: StatusAdapter,
    easy_credit: StatusAdapter,
    iute: StatusAdapter,
}

impl StatusAdapters {
    pub fn new(microinvest: StatusAdapter, easy_credit: StatusAdapter, iute: StatusAdapter) -> Self {
        Self { microinvest, easy_credit, iute }
    }

    pub fn for_provider(&self, provider: CreditProvider) -> &StatusAdapter {
        match provider {
            CreditProvider::Microinvest => &self.microinvest,
            CreditProvider::EasyCredit => &self.easy_credit,
            CreditProvider::Iute => &self.iute,
        }
    }
}

impl Default for StatusAdapters {
    fn default() -> Self {
        Self::new(StatusAdapter::microinvest(), StatusAdapter::easy_credit(), StatusAdapter::iute())
    }
}

//--------------------------------------   LoanProductTable   ---------------------------------------------------------
/// The partner loan-product catalogues.
///
/// Microinvest products are catalogue UUIDs keyed by a zero-interest flag and term; the reverse
/// lookup classifies an approved product back into retail/zero-interest for the conditions
/// comparison. Easy Credit products are plain numeric codes per term range.
#[derive(Debug, Clone)]
pub struct LoanProductTable {
    products: Vec<(String, String)>,
}

const MICROINVEST_RETAIL: &str = "retail";

impl LoanProductTable {
    pub fn new(products: &[(&str, &str)]) -> Self {
        Self { products: products.iter().map(|(name, id)| (name.to_string(), id.to_string())).collect() }
    }

    pub fn microinvest_product_id(&self, zero_interest: bool, term: u32) -> &str {
        if zero_interest {
            let key = format!("0%_{term}");
            if let Some((_, id)) = self.products.iter().find(|(name, _)| *name == key) {
                return id;
            }
        }
        self.products
            .iter()
            .find(|(name, _)| name == MICROINVEST_RETAIL)
            .map(|(_, id)| id.as_str())
            .unwrap_or("")
    }

    /// Catalogue name for a product id, or `unknown` for ids outside the table.
    pub fn product_name(&self, product_id: &str) -> &str {
        self.products
            .iter()
            .find(|(_, id)| id == product_id)
            .map(|(name, _)| name.as_str())
            .unwrap_or("unknown")
    }

    pub fn product_type_for_id(&self, product_id: &str) -> ProductType {
        if self.product_name(product_id).starts_with("0%") {
            ProductType::ZeroInterest
        } else {
            ProductType::Retail
        }
    }

    /// Product type the customer effectively requested. A zero-interest request for a term the
    /// catalogue does not carry falls back to the retail product, and classifies as retail.
    pub fn requested_product_type(&self, zero_interest: bool, term: u32) -> ProductType {
        let id = self.microinvest_product_id(zero_interest, term).to_string();
        self.product_type_for_id(&id)
    }

    /// Easy Credit product code for a requested term. Terms outside the catalogue fall back to
    /// the shortest bracket.
    pub fn easy_credit_product_code(term: u32) -> u32 {
        match term {
            6..=11 => 54,
            12 => 55,
            13..=18 => 56,
            19..=24 => 57,
            25..=36 => 58,
            _ => 54,
        }
    }
}

impl Default for LoanProductTable {
    fn default() -> Self {
        Self::new(&[
            ("0%_2", "6eddefc9-fbf9-11ee-b780-00155d65140c"),
            ("0%_3", "52d986f7-0171-11ef-b782-00155d65140c"),
            ("0%_4", "6eddefdd-fbf9-11ee-b780-00155d65140c"),
            ("0%_6", "74ff15ad-fbf9-11ee-b780-00155d65140c"),
            ("retail", "55cc08c9-b61b-11ef-b7b7-00155d65140c"),
        ])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn terms(amount_lei: i64, term: u32, product_type: ProductType) -> TermsSnapshot {
        TermsSnapshot::new(Money::from_lei(amount_lei), term, product_type)
    }

    #[test]
    fn microinvest_table_is_total_over_known_statuses() {
        let adapter = StatusAdapter::microinvest();
        let cases = [
            ("Placed", CrmStatus::CreditCheck),
            ("Processing", CrmStatus::CreditCheck),
            ("Approved", CrmStatus::CreditApproved),
            ("Refused", CrmStatus::CreditDeclined),
            ("SignedOnline", CrmStatus::SignedOnline),
            ("SignedPhysically", CrmStatus::SignedOnline),
            ("Issued", CrmStatus::Paid),
            ("PendingIssue", CrmStatus::CreditApproved),
            ("IssueRejected", CrmStatus::CreditDeclined),
        ];
        for (raw, expected) in cases {
            assert_eq!(adapter.map_status(raw), Some(expected), "{raw}");
        }
        assert_eq!(adapter.map_status("SomethingNew"), None);
        assert!(adapter.is_final("Issued"));
        assert!(!adapter.is_final("Approved"));
    }

    #[test]
    fn easy_credit_table() {
        let adapter = StatusAdapter::easy_credit();
        assert_eq!(adapter.map_status("More Data"), Some(CrmStatus::CreditCheck));
        assert_eq!(adapter.map_status("Disbursed"), Some(CrmStatus::Paid));
        assert_eq!(adapter.map_status("disbursed"), None);
        assert!(adapter.is_final("Settled"));
        assert!(adapter.is_approved_like("Settled"));
        assert!(!adapter.is_approved_like("New"));
    }

    #[test]
    fn iute_table() {
        let adapter = StatusAdapter::iute();
        assert_eq!(adapter.map_status("CUSTOMER_NOT_EXISTS"), Some(CrmStatus::CreditCheck));
        assert_eq!(adapter.map_status("PAID"), Some(CrmStatus::Paid));
        assert!(adapter.is_final("CANCELLED"));
        assert!(!adapter.is_approved_like("PAID"));
    }

    #[test]
    fn identical_terms_are_not_a_change() {
        let adapter = StatusAdapter::microinvest();
        let requested = terms(5000, 6, ProductType::Retail);
        assert!(!adapter.conditions_changed(&requested, &requested));
    }

    #[test]
    fn microinvest_amount_check_is_exact() {
        let adapter = StatusAdapter::microinvest();
        let requested = terms(5000, 6, ProductType::Retail);
        let approved = TermsSnapshot::new(Money::from_bani(500_001), 6, ProductType::Retail);
        assert!(adapter.conditions_changed(&requested, &approved));
    }

    // The tolerance asymmetry between partners is deliberate: Easy Credit rounds the amount it
    // reports back, Microinvest does not.
    #[test]
    fn easy_credit_tolerates_one_leu_of_drift() {
        let adapter = StatusAdapter::easy_credit();
        let requested = terms(5000, 6, ProductType::Retail);
        let within = TermsSnapshot::new(Money::from_bani(500_100), 6, ProductType::Retail);
        assert!(!adapter.conditions_changed(&requested, &within), "a drift of exactly 1.00 is not flagged");
        let beyond = TermsSnapshot::new(Money::from_bani(500_101), 6, ProductType::Retail);
        assert!(adapter.conditions_changed(&requested, &beyond), "a drift of 1.01 is flagged");
    }

    #[test]
    fn term_and_product_changes_are_flagged() {
        let adapter = StatusAdapter::easy_credit();
        let requested = terms(5000, 6, ProductType::Retail);
        assert!(adapter.conditions_changed(&requested, &terms(5000, 12, ProductType::Retail)));
        let adapter = StatusAdapter::microinvest();
        assert!(adapter.conditions_changed(&requested, &terms(5000, 6, ProductType::ZeroInterest)));
    }

    #[test]
    fn product_table_lookup() {
        let table = LoanProductTable::default();
        assert_eq!(table.microinvest_product_id(true, 4), "6eddefdd-fbf9-11ee-b780-00155d65140c");
        assert_eq!(table.microinvest_product_id(false, 4), "55cc08c9-b61b-11ef-b7b7-00155d65140c");
        // no 0% product for a 12 month term: falls back to retail
        assert_eq!(table.microinvest_product_id(true, 12), "55cc08c9-b61b-11ef-b7b7-00155d65140c");
        assert_eq!(table.requested_product_type(true, 6), ProductType::ZeroInterest);
        assert_eq!(table.requested_product_type(true, 12), ProductType::Retail);
        assert_eq!(table.product_type_for_id("6eddefc9-fbf9-11ee-b780-00155d65140c"), ProductType::ZeroInterest);
        assert_eq!(table.product_type_for_id("something-else"), ProductType::Retail);
        assert_eq!(table.product_name("not-in-table"), "unknown");
    }

    #[test]
    fn easy_credit_product_codes() {
        assert_eq!(LoanProductTable::easy_credit_product_code(6), 54);
        assert_eq!(LoanProductTable::easy_credit_product_code(11), 54);
        assert_eq!(LoanProductTable::easy_credit_product_code(12), 55);
        assert_eq!(LoanProductTable::easy_credit_product_code(18), 56);
        assert_eq!(LoanProductTable::easy_credit_product_code(24), 57);
        assert_eq!(LoanProductTable::easy_credit_product_code(36), 58);
        assert_eq!(LoanProductTable::easy_credit_product_code(48), 54);
        assert_eq!(LoanProductTable::easy_credit_product_code(0), 54);
    }
}

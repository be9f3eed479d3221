//! Wire types for the partner and CRM APIs, named after each service's own field spellings.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A filename plus base64 payload, the attachment shape shared by every integration here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub name: String,
    pub data: String,
}

/// Some endpoints report ids as JSON numbers and others as strings; accept both.
fn de_opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where D: Deserializer<'de> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

//--------------------------------------     Microinvest      ---------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct MicroinvestApplication {
    pub idnp: String,
    pub name: String,
    pub surname: String,
    #[serde(rename = "birthDate")]
    pub birth_date: String,
    #[serde(rename = "phoneCell")]
    pub phone_cell: String,
    #[serde(rename = "agreementLoanHistoryPD")]
    pub agreement_loan_history_pd: bool,
    #[serde(rename = "marketingAgreement")]
    pub marketing_agreement: bool,
    #[serde(rename = "loanProductID")]
    pub loan_product_id: String,
    #[serde(rename = "loanTerm")]
    pub loan_term: String,
    /// Decimal lei, as a string.
    pub amount: String,
    pub comment: String,
    #[serde(rename = "fileAttachmentSet", skip_serializing_if = "Vec::is_empty")]
    pub file_attachment_set: Vec<FileAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MicroinvestApplicationResponse {
    #[serde(rename = "applicationID", default, deserialize_with = "de_opt_string_or_number")]
    pub application_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MicroinvestStatus {
    pub status: Option<String>,
    pub amount: Option<f64>,
    #[serde(rename = "loanTerm")]
    pub loan_term: Option<u32>,
    #[serde(rename = "loanProductID", default, deserialize_with = "de_opt_string_or_number")]
    pub loan_product_id: Option<String>,
    pub name: Option<String>,
    pub surname: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MicroinvestContracts {
    #[serde(rename = "fileAttachmentSet", default)]
    pub file_attachment_set: Vec<FileAttachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MicroinvestMessages {
    #[serde(rename = "messageSet", default)]
    pub message_set: Vec<MicroinvestMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MicroinvestMessage {
    pub date: Option<String>,
    #[serde(rename = "senderID")]
    pub sender_id: Option<String>,
    #[serde(rename = "senderName")]
    pub sender_name: Option<String>,
    pub text: Option<String>,
}

//--------------------------------------     Easy Credit      ---------------------------------------------------------
/// Easy Credit wraps every response body in a `response` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct EcEnvelope<T> {
    pub response: Option<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EcRequestAck {
    #[serde(rename = "Status")]
    pub status: Option<String>,
    #[serde(rename = "URN")]
    pub urn: Option<String>,
    #[serde(rename = "Message")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EcStatus {
    #[serde(rename = "Status")]
    pub status: Option<String>,
    #[serde(rename = "RequestStatus")]
    pub request_status: Option<String>,
    #[serde(rename = "DocumentStatus")]
    pub document_status: Option<String>,
    #[serde(rename = "LoanAmount")]
    pub loan_amount: Option<f64>,
    #[serde(rename = "Installments")]
    pub installments: Option<u32>,
    #[serde(rename = "Message")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EcContract {
    /// Base64 PDF of the signed-contract document, when the application is approved.
    #[serde(rename = "DocTypeA")]
    pub doc_type_a: Option<String>,
}

//--------------------------------------        Iute          ---------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct IuteOrderRequest {
    #[serde(rename = "myiutePhone")]
    pub myiute_phone: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "totalAmount")]
    pub total_amount: f64,
    pub currency: String,
    pub merchant: IuteMerchant,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<IuteItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IuteMerchant {
    #[serde(rename = "posIdentifier")]
    pub pos_identifier: String,
    #[serde(rename = "salesmanIdentifier")]
    pub salesman_identifier: String,
    #[serde(rename = "userConfirmationUrl")]
    pub user_confirmation_url: String,
    #[serde(rename = "userCancelUrl")]
    pub user_cancel_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IuteItem {
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(rename = "unitPrice")]
    pub unit_price: f64,
    pub qty: u32,
    #[serde(rename = "itemImageUrl", skip_serializing_if = "Option::is_none")]
    pub item_image_url: Option<String>,
    #[serde(rename = "itemUrl", skip_serializing_if = "Option::is_none")]
    pub item_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IuteOrderResponse {
    pub status: Option<String>,
    #[serde(rename = "myiuteCustomer", default)]
    pub myiute_customer: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IuteStatusResponse {
    pub status: Option<String>,
}

//--------------------------------------        Simla         ---------------------------------------------------------
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimlaOrder {
    pub id: i64,
    pub number: Option<String>,
    pub site: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "managerId")]
    pub manager_id: Option<i64>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<String>,
    #[serde(rename = "totalSumm")]
    pub total_summ: Option<f64>,
    #[serde(rename = "customFields", default)]
    pub custom_fields: HashMap<String, Value>,
    /// Keyed by payment id.
    #[serde(default)]
    pub payments: HashMap<String, SimlaPayment>,
    #[serde(default)]
    pub items: Vec<SimlaOrderItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimlaPayment {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string_or_number")]
    pub amount: Option<String>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string_or_number")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimlaOrderItem {
    pub id: Option<i64>,
    #[serde(rename = "initialPrice")]
    pub initial_price: Option<f64>,
    pub quantity: Option<u32>,
    pub offer: Option<SimlaOffer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimlaOffer {
    pub id: Option<i64>,
    pub name: Option<String>,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    pub article: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimlaFile {
    pub id: i64,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimlaUser {
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName")]
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimlaHistoryChange {
    pub id: i64,
    pub field: Option<String>,
    #[serde(rename = "oldValue", default)]
    pub old_value: Value,
    #[serde(rename = "newValue", default)]
    pub new_value: Value,
    pub source: Option<String>,
    #[serde(default)]
    pub order: Option<SimlaRef>,
    #[serde(default)]
    pub user: Option<SimlaRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimlaRef {
    pub id: Option<i64>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn microinvest_numeric_application_id_decodes_as_string() {
        let numeric: MicroinvestApplicationResponse = serde_json::from_str(r#"{"applicationID": 123456}"#).unwrap();
        assert_eq!(numeric.application_id.as_deref(), Some("123456"));
        let string: MicroinvestApplicationResponse =
            serde_json::from_str(r#"{"applicationID": "123456"}"#).unwrap();
        assert_eq!(string.application_id.as_deref(), Some("123456"));
        let missing: MicroinvestApplicationResponse = serde_json::from_str("{}").unwrap();
        assert!(missing.application_id.is_none());
    }

    #[test]
    fn easy_credit_envelope_decodes() {
        let body = r#"{"response": {"Status": "OK", "RequestStatus": "Approved", "LoanAmount": 4500.0, "Installments": 6}}"#;
        let envelope: EcEnvelope<EcStatus> = serde_json::from_str(body).unwrap();
        let status = envelope.response.unwrap();
        assert_eq!(status.status.as_deref(), Some("OK"));
        assert_eq!(status.request_status.as_deref(), Some("Approved"));
        assert_eq!(status.loan_amount, Some(4500.0));
    }

    #[test]
    fn simla_order_decodes_object_keyed_payments() {
        let body = r#"{
            "id": 42,
            "number": "W-42",
            "site": "store",
            "customFields": {"credit_company": ["microinvest"], "indp": "2004012345678"},
            "payments": {"900": {"type": "credit", "amount": 5000, "status": "not-paid", "id": 900}}
        }"#;
        let order: SimlaOrder = serde_json::from_str(body).unwrap();
        assert_eq!(order.id, 42);
        let payment = order.payments.get("900").unwrap();
        assert_eq!(payment.kind.as_deref(), Some("credit"));
        assert_eq!(payment.amount.as_deref(), Some("5000"));
        assert_eq!(payment.id.as_deref(), Some("900"));
    }
}

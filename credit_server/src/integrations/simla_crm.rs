use chrono::{DateTime, NaiveDateTime, Utc};
use cpg_common::{parse_boolean_flag, Money};
use credit_engine::{
    db_types::{
        ApplicationId,
        CreditPayment,
        CreditProvider,
        CrmOrder,
        CrmStatus,
        FileBlob,
        GoodsLine,
        OrderId,
    },
    traits::{CrmFieldChange, CrmGateway, CrmGatewayError},
};
use partner_tools::{simla_fields, PartnerApiError, SimlaApi, SimlaOrder};
use serde_json::{json, Value};

/// [`CrmGateway`] over the Simla client: raw CRM orders in, the engine's normalized view out.
#[derive(Clone)]
pub struct SimlaCrm {
    api: SimlaApi,
}

impl SimlaCrm {
    pub fn new(api: SimlaApi) -> Self {
        Self { api }
    }
}

fn crm_error(e: PartnerApiError) -> CrmGatewayError {
    match e {
        PartnerApiError::JsonError(m) | PartnerApiError::ResponseError(m) => CrmGatewayError::Decode(m),
        other => CrmGatewayError::Request(other.to_string()),
    }
}

fn field_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => items.first().and_then(field_string),
        _ => None,
    }
}

fn parse_crm_datetime(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

/// Reduce a raw CRM order to the fields the credit pipeline branches on.
pub fn to_crm_order(order: SimlaOrder) -> CrmOrder {
    let field = |key: &str| order.custom_fields.get(key).and_then(field_string);

    let payment = order
        .payments
        .iter()
        .find(|(_, p)| matches!(p.kind.as_deref(), Some("credit") | Some("kredit-onlain")))
        .map(|(key, p)| CreditPayment {
            id: p.id.clone().unwrap_or_else(|| key.clone()),
            kind: p.kind.clone().unwrap_or_default(),
            amount: p.amount.as_deref().and_then(|a| a.parse().ok()).unwrap_or_default(),
            status: p.status.clone(),
        });

    let goods = order
        .items
        .iter()
        .map(|item| {
            let offer = item.offer.as_ref();
            GoodsLine {
                id: offer
                    .and_then(|o| o.id)
                    .or(item.id)
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                name: offer
                    .and_then(|o| o.display_name.clone().or_else(|| o.name.clone()))
                    .unwrap_or_else(|| "Товар".to_string()),
                sku: offer.and_then(|o| o.article.clone()),
                price: Money::from_mdl(item.initial_price.unwrap_or(0.0)),
                quantity: item.quantity.unwrap_or(1),
                image_url: offer.and_then(|o| o.images.first().cloned()),
                url: offer.and_then(|o| o.url.clone()),
            }
        })
        .collect();

    CrmOrder {
        id: OrderId(order.id),
        number: order.number.clone(),
        site: order.site.clone(),
        phone: order.phone.clone(),
        status: order.status.clone(),
        manager_id: order.manager_id,
        created_at: order.created_at.as_deref().and_then(parse_crm_datetime),
        idnp: field(simla_fields::IDNP),
        first_name: field(simla_fields::NAME),
        last_name: field(simla_fields::SURNAME),
        birthday: field(simla_fields::BIRTHDAY),
        residence: field(simla_fields::RESIDENCE),
        credit_company: field(simla_fields::CREDIT_COMPANY),
        credit_term: field(simla_fields::CREDIT_TERM),
        zero_interest: parse_boolean_flag(field(simla_fields::ZERO_CREDIT), false),
        application_id: field(simla_fields::LOAN_APPLICATION_ID).map(ApplicationId::from),
        payment,
        goods,
        total: Money::from_mdl(order.total_summ.unwrap_or(0.0)),
    }
}

fn change_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl CrmGateway for SimlaCrm {
    async fn fetch_order(&self, id: OrderId) -> Result<Option<CrmOrder>, CrmGatewayError> {
        let order = self.api.get_order(id.value()).await.map_err(crm_error)?;
        Ok(order.map(to_crm_order))
    }

    async fn orders_with_active_applications(&self) -> Result<Vec<CrmOrder>, CrmGatewayError> {
        let orders = self.api.get_orders_with_active_applications().await.map_err(crm_error)?;
        Ok(orders.into_iter().map(to_crm_order).collect())
    }

    async fn link_application(
        &self,
        id: OrderId,
        application_id: &ApplicationId,
        provider: CreditProvider,
        site: Option<&str>,
    ) -> Result<(), CrmGatewayError> {
        let mut fields = json!({ simla_fields::LOAN_APPLICATION_ID: application_id.as_str() });
        // Bank applications are created for an already-selected company; POS orders set the
        // selector as part of the linkage.
        if provider == CreditProvider::Iute {
            fields[simla_fields::CREDIT_COMPANY] = json!(provider.to_string());
        }
        self.api
            .update_order_custom_fields(id.value(), fields, site)
            .await
            .map_err(crm_error)
    }

    async fn update_payment_status(
        &self,
        id: OrderId,
        payment_id: &str,
        status: CrmStatus,
        site: Option<&str>,
    ) -> Result<(), CrmGatewayError> {
        self.api
            .update_payment_status(id.value(), payment_id, status.as_str(), site)
            .await
            .map_err(crm_error)
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: &str,
        site: Option<&str>,
    ) -> Result<(), CrmGatewayError> {
        self.api.update_order_status(id.value(), status, site).await.map_err(crm_error)
    }

    async fn order_files(&self, id: OrderId, site: Option<&str>) -> Result<Vec<FileBlob>, CrmGatewayError> {
        let files = self
            .api
            .get_order_files_as_base64(id.value(), site)
            .await
            .map_err(crm_error)?;
        Ok(files.into_iter().map(|f| FileBlob { name: f.name, data: f.data }).collect())
    }

    async fn upload_file(
        &self,
        id: OrderId,
        name: &str,
        data: &str,
        site: Option<&str>,
    ) -> Result<(), CrmGatewayError> {
        self.api
            .upload_file_to_order(id.value(), name, data, site)
            .await
            .map_err(crm_error)
    }

    async fn has_contract_files(&self, id: OrderId, site: Option<&str>) -> Result<bool, CrmGatewayError> {
        self.api
            .check_order_has_contract_files(id.value(), site)
            .await
            .map_err(crm_error)
    }

    async fn manager_name(&self, manager_id: i64) -> Result<Option<String>, CrmGatewayError> {
        Ok(self.api.get_manager_name(manager_id).await)
    }

    async fn history_since(&self, since_id: Option<i64>, limit: u32) -> Result<Vec<CrmFieldChange>, CrmGatewayError> {
        let changes = self.api.get_orders_history(since_id, limit).await.map_err(crm_error)?;
        Ok(changes
            .into_iter()
            .map(|c| CrmFieldChange {
                id: c.id,
                order_id: c.order.and_then(|o| o.id).map(OrderId),
                field: c.field,
                old_value: change_value(&c.old_value),
                new_value: change_value(&c.new_value),
                source: c.source,
                user_id: c.user.and_then(|u| u.id),
            })
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_conversion_extracts_credit_fields() {
        let raw = r#"{
            "id": 42,
            "number": "W-42",
            "site": "store",
            "phone": "069123456",
            "status": "credit-check",
            "managerId": 7,
            "createdAt": "2024-05-01 10:30:00",
            "totalSumm": 7500.5,
            "customFields": {
                "indp": "2004012345678",
                "name": "Ion",
                "surname": "Popescu",
                "birthday": "05.03.1990",
                "credit_company": ["easycredit"],
                "credit_term": "12",
                "zero_credit": "true",
                "loan_application_id": "URN-77"
            },
            "payments": {
                "900": {"type": "credit", "amount": 5000, "status": "not-paid", "id": 900}
            },
            "items": [
                {"initialPrice": 7500.5, "quantity": 1, "offer": {"id": 5, "displayName": "Frigider"}}
            ]
        }"#;
        let order: SimlaOrder = serde_json::from_str(raw).unwrap();
        let crm = to_crm_order(order);

        assert_eq!(crm.id, OrderId(42));
        assert_eq!(crm.idnp.as_deref(), Some("2004012345678"));
        assert_eq!(crm.credit_company.as_deref(), Some("easycredit"));
        assert!(crm.zero_interest);
        assert_eq!(crm.application_id, Some(ApplicationId::from("URN-77")));
        assert_eq!(crm.credit_term_months(), 12);
        let payment = crm.payment.unwrap();
        assert_eq!(payment.id, "900");
        assert_eq!(payment.amount, Money::from_lei(5000));
        assert_eq!(payment.status.as_deref(), Some("not-paid"));
        assert_eq!(crm.goods.len(), 1);
        assert_eq!(crm.goods[0].name, "Frigider");
        assert_eq!(crm.total, Money::from_bani(750_050));
        assert!(crm.created_at.is_some());
    }

    #[test]
    fn orders_without_credit_payment_have_none() {
        let raw = r#"{
            "id": 43,
            "payments": {"901": {"type": "cash", "amount": 100, "status": "paid", "id": 901}}
        }"#;
        let order: SimlaOrder = serde_json::from_str(raw).unwrap();
        let crm = to_crm_order(order);
        assert!(crm.payment.is_none());
        assert!(crm.application_id.is_none());
    }
}

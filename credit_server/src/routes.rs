//! Request handler definitions.
//!
//! Handlers are thin: parse the body, call the matching engine API, serialize the outcome. Any
//! logic beyond that belongs in `credit_engine`. Handlers that are more than a line or two of
//! glue MUST go into a separate module; keep this module neat and tidy 🙏
//!
//! The engine APIs are registered under concrete type aliases because actix handlers cannot be
//! generic without macro gymnastics, and nothing here needs an alternative backend.

use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use cpg_common::{Money, Secret};
use credit_engine::{
    db_types::{ApplicationId, OrderId},
    flow_objects::WebhookKind,
    CreditFlowError,
    FeedApi,
    ReconcileApi,
    SqliteFeedStore,
    SubmissionApi,
};
use log::*;
use serde::Serialize;
use serde_json::json;

use crate::{
    data_objects::{
        ApplicationRequestQuery,
        FeedQuery,
        IuteOrderBody,
        IuteWebhookBody,
        JsonResponse,
        MessagesQuery,
        OrderRequest,
        RefuseRequest,
        SendMessageRequest,
        UpdateOrderStatusRequest,
    },
    errors::ServerError,
    integrations::{verify_webhook_signature, PartnerClients, SimlaCrm},
};

pub type Submissions = SubmissionApi<SimlaCrm, PartnerClients, SqliteFeedStore>;
pub type Reconciler = ReconcileApi<SimlaCrm, PartnerClients, SqliteFeedStore>;
pub type Feed = FeedApi<SqliteFeedStore>;

/// Webhook verification settings shared with the handlers.
#[derive(Clone)]
pub struct WebhookSettings {
    pub secret: Option<Secret<String>>,
}

/// Serialize an outcome and fold a `success: true` marker into it, the reply shape the embedded
/// widget expects.
fn ok_json<T: Serialize>(value: T) -> HttpResponse {
    let mut body = serde_json::to_value(value).unwrap_or_else(|_| json!({}));
    if let Some(object) = body.as_object_mut() {
        object.insert("success".to_string(), json!(true));
    }
    HttpResponse::Ok().json(body)
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() }))
}

#[post("/send-application")]
pub async fn send_application(
    body: web::Json<OrderRequest>,
    api: web::Data<Submissions>,
) -> Result<HttpResponse, ServerError> {
    let outcome = api.submit_application(OrderId(body.order_id), &body.manager()).await?;
    Ok(ok_json(outcome))
}

#[post("/send-iute-application")]
pub async fn send_iute_application(
    body: web::Json<IuteOrderBody>,
    api: web::Data<Submissions>,
) -> Result<HttpResponse, ServerError> {
    let manager = credit_engine::flow_objects::ManagerInfo::new(body.manager_id, body.manager_name.clone());
    let outcome = api
        .submit_iute_order(
            OrderId(body.order_id),
            body.phone.clone(),
            body.amount.map(Money::from_mdl),
            &manager,
        )
        .await?;
    Ok(ok_json(outcome))
}

#[post("/check-status")]
pub async fn check_status(
    body: web::Json<OrderRequest>,
    api: web::Data<Reconciler>,
) -> Result<HttpResponse, ServerError> {
    let result = api.check_order(OrderId(body.order_id)).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "result": result })))
}

#[post("/check-all")]
pub async fn check_all(api: web::Data<Reconciler>) -> Result<HttpResponse, ServerError> {
    let summary = api.check_all_pending().await?;
    Ok(ok_json(summary))
}

#[post("/send-files")]
pub async fn send_files(
    body: web::Json<OrderRequest>,
    api: web::Data<Reconciler>,
) -> Result<HttpResponse, ServerError> {
    let outcome = api.send_files_to_bank(OrderId(body.order_id)).await?;
    Ok(ok_json(outcome))
}

#[get("/contracts/{order_id}")]
pub async fn contracts(
    path: web::Path<i64>,
    api: web::Data<Reconciler>,
) -> Result<HttpResponse, ServerError> {
    let outcome = api.contracts_for_download(OrderId(path.into_inner())).await?;
    Ok(ok_json(outcome))
}

#[post("/refuse")]
pub async fn refuse(
    body: web::Json<RefuseRequest>,
    api: web::Data<Reconciler>,
) -> Result<HttpResponse, ServerError> {
    let manager = credit_engine::flow_objects::ManagerInfo::new(body.manager_id, body.manager_name.clone());
    let outcome = api
        .refuse_application(OrderId(body.order_id), body.reason.clone(), &manager)
        .await?;
    Ok(ok_json(outcome))
}

#[get("/messages")]
pub async fn get_messages(
    query: web::Query<MessagesQuery>,
    api: web::Data<Reconciler>,
) -> Result<HttpResponse, ServerError> {
    let messages = api
        .get_messages(OrderId(query.order_id), query.new_only.unwrap_or(true))
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "orderId": query.order_id,
        "messages": messages,
    })))
}

#[post("/messages")]
pub async fn send_message(
    body: web::Json<SendMessageRequest>,
    api: web::Data<Reconciler>,
) -> Result<HttpResponse, ServerError> {
    let manager = credit_engine::flow_objects::ManagerInfo::new(body.manager_id, body.manager_name.clone());
    let outcome = api
        .send_message(OrderId(body.order_id), &body.text, body.with_files, &manager)
        .await?;
    Ok(ok_json(outcome))
}

#[get("/feed")]
pub async fn cached_feed(
    query: web::Query<FeedQuery>,
    api: web::Data<Feed>,
) -> Result<HttpResponse, ServerError> {
    let feed = api.cached_feed(&query.to_filter()).await?;
    let mut body = serde_json::to_value(&feed).unwrap_or_else(|_| json!({}));
    if let Some(object) = body.as_object_mut() {
        object.insert("success".to_string(), json!(true));
        object.insert("cached".to_string(), json!(true));
    }
    Ok(HttpResponse::Ok().json(body))
}

#[post("/feed/sync")]
pub async fn sync_feed(api: web::Data<Reconciler>) -> Result<HttpResponse, ServerError> {
    let report = api.sync_feed().await?;
    Ok(ok_json(report))
}

#[delete("/feed/{order_id}")]
pub async fn remove_feed_item(
    path: web::Path<i64>,
    api: web::Data<Feed>,
) -> Result<HttpResponse, ServerError> {
    let removed = api.remove_item(OrderId(path.into_inner())).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "removed": removed })))
}

#[get("/history/{application_id}")]
pub async fn status_history(
    path: web::Path<String>,
    api: web::Data<Feed>,
) -> Result<HttpResponse, ServerError> {
    let application_id = ApplicationId::from(path.into_inner());
    let history = api.status_history(&application_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "applicationId": application_id,
        "history": history,
    })))
}

#[get("/application-request")]
pub async fn application_request(
    query: web::Query<ApplicationRequestQuery>,
    api: web::Data<Feed>,
) -> Result<HttpResponse, ServerError> {
    let application_id = query.application_id.clone().map(ApplicationId::from);
    let request = api
        .application_request(application_id.as_ref(), query.order_id.map(OrderId))
        .await?;
    match request {
        Some(request) => Ok(ok_json(request)),
        None => Ok(HttpResponse::Ok().json(json!({
            "success": false,
            "error": "Данные заявки не найдены. Они сохраняются только для новых заявок.",
        }))),
    }
}

#[post("/update-order-status")]
pub async fn update_order_status(
    body: web::Json<UpdateOrderStatusRequest>,
    api: web::Data<Reconciler>,
) -> Result<HttpResponse, ServerError> {
    api.set_order_status(OrderId(body.order_id), &body.status).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!(
        "Order {} moved to '{}'",
        body.order_id, body.status
    ))))
}

/// Iute's confirm/cancel callback. The body is taken raw so the signature can be checked over
/// the exact bytes Iute signed.
#[post("/iute/{kind}")]
pub async fn iute_webhook(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    api: web::Data<Reconciler>,
    settings: web::Data<WebhookSettings>,
) -> Result<HttpResponse, ServerError> {
    let kind: WebhookKind = path
        .into_inner()
        .parse()
        .map_err(|_| ServerError::Flow(CreditFlowError::UnknownWebhookEvent("bad path".to_string())))?;

    if let Some(secret) = &settings.secret {
        let timestamp = header_value(&req, "X-Iute-Timestamp");
        let signature = header_value(&req, "X-Iute-Signature");
        let verified = match (timestamp, signature) {
            (Some(ts), Some(sig)) => verify_webhook_signature(secret.reveal(), &body, &ts, &sig),
            _ => false,
        };
        if !verified {
            warn!("🪝️ Rejecting Iute webhook with a missing or invalid signature");
            return Err(ServerError::InvalidWebhookSignature);
        }
    } else {
        warn!("🪝️ Accepting Iute webhook without signature verification (no secret configured)");
    }

    let payload: IuteWebhookBody = serde_json::from_slice(&body)
        .map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    let outcome = api
        .apply_webhook(&ApplicationId::from(payload.order_id), kind, payload.description)
        .await?;
    Ok(ok_json(outcome))
}

fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers().get(name).and_then(|v| v.to_str().ok()).map(String::from)
}

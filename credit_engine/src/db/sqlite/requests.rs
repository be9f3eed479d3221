use sqlx::SqliteConnection;

use crate::{
    db_types::{ApplicationId, ApplicationRequest, NewApplicationRequest, OrderId},
    traits::FeedStoreError,
};

/// Store the audit copy of a submitted payload, keyed by the partner's application reference.
pub async fn upsert_request(
    request: &NewApplicationRequest,
    conn: &mut SqliteConnection,
) -> Result<(), FeedStoreError> {
    let request_data = serde_json::to_string(&request.request_data)?;
    let file_names = serde_json::to_string(&request.file_names)?;
    sqlx::query(
        r#"
        INSERT INTO application_requests (application_id, order_id, credit_company, request_data, files_count, file_names)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (application_id) DO UPDATE SET
            order_id = excluded.order_id,
            credit_company = excluded.credit_company,
            request_data = excluded.request_data,
            files_count = excluded.files_count,
            file_names = excluded.file_names,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&request.application_id)
    .bind(request.order_id)
    .bind(request.credit_company)
    .bind(request_data)
    .bind(request.files_count)
    .bind(file_names)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_request(
    application_id: &ApplicationId,
    conn: &mut SqliteConnection,
) -> Result<Option<ApplicationRequest>, FeedStoreError> {
    let request = sqlx::query_as("SELECT * FROM application_requests WHERE application_id = $1")
        .bind(application_id)
        .fetch_optional(conn)
        .await?;
    Ok(request)
}

pub async fn fetch_request_for_order(
    order_id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<ApplicationRequest>, FeedStoreError> {
    let request =
        sqlx::query_as("SELECT * FROM application_requests WHERE order_id = $1 ORDER BY created_at DESC LIMIT 1")
            .bind(order_id)
            .fetch_optional(conn)
            .await?;
    Ok(request)
}

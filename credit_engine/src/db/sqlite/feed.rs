use log::debug;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{ApplicationId, FeedItem, NewFeedItem, OrderId, ARCHIVED_ORDER_STATUSES},
    flow_objects::FeedQueryFilter,
    traits::FeedStoreError,
};

/// Insert or update the feed row for `item.order_id`. The `created_at` of an existing row is
/// preserved; `updated_at` always moves forward.
pub async fn upsert_feed_item(item: &NewFeedItem, conn: &mut SqliteConnection) -> Result<(), FeedStoreError> {
    let comparison = item.comparison.as_ref().map(serde_json::to_string).transpose()?;
    sqlx::query(
        r#"
        INSERT INTO feed_items (
            order_id, order_number, application_id, credit_company, customer_name,
            bank_status, document_status, crm_status, payment_type, order_status,
            manager_id, manager_name, conditions_changed, comparison, order_created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (order_id) DO UPDATE SET
            order_number = excluded.order_number,
            application_id = excluded.application_id,
            credit_company = excluded.credit_company,
            customer_name = excluded.customer_name,
            bank_status = excluded.bank_status,
            document_status = excluded.document_status,
            crm_status = excluded.crm_status,
            payment_type = excluded.payment_type,
            order_status = excluded.order_status,
            manager_id = excluded.manager_id,
            manager_name = excluded.manager_name,
            conditions_changed = excluded.conditions_changed,
            comparison = excluded.comparison,
            order_created_at = excluded.order_created_at,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(item.order_id)
    .bind(&item.order_number)
    .bind(&item.application_id)
    .bind(item.credit_company)
    .bind(&item.customer_name)
    .bind(&item.bank_status)
    .bind(&item.document_status)
    .bind(&item.crm_status)
    .bind(&item.payment_type)
    .bind(&item.order_status)
    .bind(item.manager_id)
    .bind(&item.manager_name)
    .bind(item.conditions_changed)
    .bind(comparison)
    .bind(item.order_created_at)
    .execute(conn)
    .await?;
    debug!("🗃️ Feed row for order {} upserted", item.order_id);
    Ok(())
}

/// Fetch feed rows matching the filter, newest orders first.
pub async fn fetch_feed_items(
    filter: &FeedQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<FeedItem>, FeedStoreError> {
    let mut builder = QueryBuilder::new("SELECT * FROM feed_items ");
    if !filter.is_empty() {
        builder.push("WHERE ");
    }
    let mut clause = builder.separated(" AND ");
    if let Some(bank_status) = &filter.bank_status {
        clause.push("bank_status = ");
        clause.push_bind_unseparated(bank_status.clone());
    }
    if let Some(provider) = filter.provider {
        clause.push("credit_company = ");
        clause.push_bind_unseparated(provider);
    }
    if let Some(changed) = filter.conditions_changed {
        clause.push("conditions_changed = ");
        clause.push_bind_unseparated(changed);
    }
    match filter.archived {
        Some(true) => {
            clause.push("order_status IN (");
            for (i, status) in ARCHIVED_ORDER_STATUSES.iter().enumerate() {
                if i > 0 {
                    clause.push_unseparated(", ");
                }
                clause.push_bind_unseparated(*status);
            }
            clause.push_unseparated(")");
        },
        Some(false) => {
            clause.push("(order_status IS NULL OR order_status NOT IN (");
            for (i, status) in ARCHIVED_ORDER_STATUSES.iter().enumerate() {
                if i > 0 {
                    clause.push_unseparated(", ");
                }
                clause.push_bind_unseparated(*status);
            }
            clause.push_unseparated("))");
        },
        None => {},
    }
    builder.push(" ORDER BY order_created_at DESC");
    let items = builder.build_query_as::<FeedItem>().fetch_all(conn).await?;
    Ok(items)
}

pub async fn fetch_feed_item(
    order_id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<FeedItem>, FeedStoreError> {
    let item = sqlx::query_as("SELECT * FROM feed_items WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(item)
}

/// Returns the first row carrying the given application reference. References are unique per
/// partner in practice, so "first" is "the" row.
pub async fn fetch_feed_item_by_application(
    application_id: &ApplicationId,
    conn: &mut SqliteConnection,
) -> Result<Option<FeedItem>, FeedStoreError> {
    let item = sqlx::query_as("SELECT * FROM feed_items WHERE application_id = $1 LIMIT 1")
        .bind(application_id)
        .fetch_optional(conn)
        .await?;
    Ok(item)
}

pub async fn delete_feed_item(order_id: OrderId, conn: &mut SqliteConnection) -> Result<bool, FeedStoreError> {
    let result = sqlx::query("DELETE FROM feed_items WHERE order_id = $1").bind(order_id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Point update of the cached statuses for an application, leaving the rest of the row intact.
pub async fn update_application_status(
    application_id: &ApplicationId,
    bank_status: &str,
    crm_status: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), FeedStoreError> {
    sqlx::query(
        r#"
        UPDATE feed_items
        SET bank_status = $2, crm_status = COALESCE($3, crm_status), updated_at = CURRENT_TIMESTAMP
        WHERE application_id = $1
        "#,
    )
    .bind(application_id)
    .bind(bank_status)
    .bind(crm_status)
    .execute(conn)
    .await?;
    Ok(())
}

use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{ApplicationId, NewStatusEntry, StatusHistoryEntry},
    traits::FeedStoreError,
};

/// Append one transition to the log. There is deliberately no update or delete counterpart.
pub async fn append_entry(entry: &NewStatusEntry, conn: &mut SqliteConnection) -> Result<(), FeedStoreError> {
    sqlx::query(
        r#"
        INSERT INTO status_history (
            application_id, status_type, old_status, new_status, source, details, manager_id, manager_name
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&entry.application_id)
    .bind(entry.status_type)
    .bind(&entry.old_status)
    .bind(&entry.new_status)
    .bind(entry.source)
    .bind(&entry.details)
    .bind(entry.manager_id)
    .bind(&entry.manager_name)
    .execute(conn)
    .await?;
    trace!(
        "🗃️ History: [{}] {} {:?} -> {} ({})",
        entry.application_id,
        entry.status_type,
        entry.old_status,
        entry.new_status,
        entry.source
    );
    Ok(())
}

/// All transitions for an application in the order they were observed by this process.
pub async fn fetch_history(
    application_id: &ApplicationId,
    conn: &mut SqliteConnection,
) -> Result<Vec<StatusHistoryEntry>, FeedStoreError> {
    let entries = sqlx::query_as(
        "SELECT * FROM status_history WHERE application_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(application_id)
    .fetch_all(conn)
    .await?;
    Ok(entries)
}

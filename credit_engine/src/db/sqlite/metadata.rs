use sqlx::SqliteConnection;

use crate::traits::FeedStoreError;

pub async fn get(key: &str, conn: &mut SqliteConnection) -> Result<Option<String>, FeedStoreError> {
    let value: Option<(String,)> = sqlx::query_as("SELECT value FROM sync_metadata WHERE key = $1")
        .bind(key)
        .fetch_optional(conn)
        .await?;
    Ok(value.map(|(v,)| v))
}

pub async fn set(key: &str, value: &str, conn: &mut SqliteConnection) -> Result<(), FeedStoreError> {
    sqlx::query(
        r#"
        INSERT INTO sync_metadata (key, value) VALUES ($1, $2)
        ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(conn)
    .await?;
    Ok(())
}

use sqlx::SqliteConnection;

use crate::{
    db_types::{ApplicationId, NewSentMessage, SentMessage},
    traits::FeedStoreError,
};

pub async fn insert_sent_message(
    message: &NewSentMessage,
    conn: &mut SqliteConnection,
) -> Result<(), FeedStoreError> {
    sqlx::query(
        r#"
        INSERT INTO sent_messages (application_id, message_text, manager_id, manager_name)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&message.application_id)
    .bind(&message.message_text)
    .bind(message.manager_id)
    .bind(&message.manager_name)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_sent_messages(
    application_id: &ApplicationId,
    conn: &mut SqliteConnection,
) -> Result<Vec<SentMessage>, FeedStoreError> {
    let messages = sqlx::query_as("SELECT * FROM sent_messages WHERE application_id = $1 ORDER BY sent_at ASC")
        .bind(application_id)
        .fetch_all(conn)
        .await?;
    Ok(messages)
}

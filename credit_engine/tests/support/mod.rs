pub mod mocks;

use credit_engine::SqliteFeedStore;

/// A fresh single-connection in-memory store with the schema applied. Each call returns an
/// isolated database.
pub async fn prepare_test_store() -> SqliteFeedStore {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::builder().is_test(true).try_init();
    let store = SqliteFeedStore::new_with_url("sqlite::memory:", 1)
        .await
        .expect("Error creating in-memory store");
    store.run_migrations().await.expect("Error running migrations");
    store
}

mod support;

use credit_engine::{
    db_types::{
        ApplicationId,
        CreditProvider,
        NewApplicationRequest,
        NewFeedItem,
        NewSentMessage,
        NewStatusEntry,
        OrderId,
        StatusScope,
        StatusSource,
        TermsComparison,
        TermsSnapshot,
    },
    flow_objects::FeedQueryFilter,
    traits::FeedStore,
};
use support::prepare_test_store;

fn feed_item(order_id: i64, application_id: &str) -> NewFeedItem {
    NewFeedItem {
        order_id: OrderId(order_id),
        order_number: Some(format!("W-{order_id}")),
        application_id: ApplicationId::from(application_id),
        credit_company: CreditProvider::Microinvest,
        customer_name: "Ion Popescu".to_string(),
        bank_status: "Placed".to_string(),
        crm_status: Some("credit-check".to_string()),
        payment_type: Some("credit".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn upsert_is_create_then_update() {
    let store = prepare_test_store().await;
    let mut item = feed_item(100, "A-100");
    store.upsert_feed_item(&item).await.unwrap();

    let stored = store.feed_item(OrderId(100)).await.unwrap().unwrap();
    assert_eq!(stored.bank_status, "Placed");
    assert_eq!(stored.customer_name, "Ion Popescu");

    item.bank_status = "Approved".to_string();
    item.conditions_changed = true;
    item.comparison = Some(TermsComparison {
        requested: TermsSnapshot::new(cpg_common::Money::from_lei(5000), 6, Default::default()),
        approved: Some(TermsSnapshot::new(cpg_common::Money::from_lei(4500), 6, Default::default())),
    });
    store.upsert_feed_item(&item).await.unwrap();

    let all = store.feed_items(&FeedQueryFilter::default()).await.unwrap();
    assert_eq!(all.len(), 1, "upsert must not create a second row");
    let stored = &all[0];
    assert_eq!(stored.bank_status, "Approved");
    assert!(stored.conditions_changed);
    let comparison = stored.terms_comparison().unwrap();
    assert_eq!(comparison.approved.unwrap().amount, cpg_common::Money::from_lei(4500));
}

#[tokio::test]
async fn feed_filters() {
    let store = prepare_test_store().await;
    let mut active = feed_item(1, "A-1");
    active.order_status = Some("credit-check".to_string());
    store.upsert_feed_item(&active).await.unwrap();

    let mut archived = feed_item(2, "A-2");
    archived.order_status = Some("complete".to_string());
    archived.bank_status = "Issued".to_string();
    archived.credit_company = CreditProvider::EasyCredit;
    store.upsert_feed_item(&archived).await.unwrap();

    let mut no_status = feed_item(3, "A-3");
    no_status.order_status = None;
    store.upsert_feed_item(&no_status).await.unwrap();

    let archived_rows = store.feed_items(&FeedQueryFilter::default().archived(true)).await.unwrap();
    assert_eq!(archived_rows.len(), 1);
    assert_eq!(archived_rows[0].order_id, OrderId(2));

    // A null order status counts as non-archived
    let active_rows = store.feed_items(&FeedQueryFilter::default().archived(false)).await.unwrap();
    let ids: Vec<i64> = active_rows.iter().map(|i| i.order_id.value()).collect();
    assert_eq!(active_rows.len(), 2);
    assert!(ids.contains(&1) && ids.contains(&3));

    let by_status = store
        .feed_items(&FeedQueryFilter::default().with_bank_status("Issued"))
        .await
        .unwrap();
    assert_eq!(by_status.len(), 1);

    let by_provider = store
        .feed_items(&FeedQueryFilter::default().with_provider(CreditProvider::EasyCredit))
        .await
        .unwrap();
    assert_eq!(by_provider.len(), 1);
    assert_eq!(by_provider[0].order_id, OrderId(2));
}

#[tokio::test]
async fn delete_is_explicit_and_reports_absence() {
    let store = prepare_test_store().await;
    store.upsert_feed_item(&feed_item(7, "A-7")).await.unwrap();
    assert!(store.delete_feed_item(OrderId(7)).await.unwrap());
    assert!(!store.delete_feed_item(OrderId(7)).await.unwrap());
    assert!(store.feed_item(OrderId(7)).await.unwrap().is_none());
}

#[tokio::test]
async fn application_status_point_update() {
    let store = prepare_test_store().await;
    store.upsert_feed_item(&feed_item(8, "CRM-8")).await.unwrap();
    let app = ApplicationId::from("CRM-8");

    store.update_application_status(&app, "PAID", Some("paid")).await.unwrap();
    let item = store.feed_item_by_application(&app).await.unwrap().unwrap();
    assert_eq!(item.bank_status, "PAID");
    assert_eq!(item.crm_status.as_deref(), Some("paid"));

    // a missing CRM status leaves the cached one alone
    store.update_application_status(&app, "CANCELLED", None).await.unwrap();
    let item = store.feed_item_by_application(&app).await.unwrap().unwrap();
    assert_eq!(item.bank_status, "CANCELLED");
    assert_eq!(item.crm_status.as_deref(), Some("paid"));
}

#[tokio::test]
async fn history_is_append_only_and_ordered() {
    let store = prepare_test_store().await;
    let app = ApplicationId::from("A-55");

    let first = NewStatusEntry::bank(app.clone(), None, "Placed", StatusSource::Api);
    let second = NewStatusEntry::crm(app.clone(), Some("not-paid".into()), "credit-check", StatusSource::Api)
        .with_details("Application submitted")
        .with_manager(Some(9), Some("Ana".into()));
    store.append_status_history(&first).await.unwrap();
    store.append_status_history(&second).await.unwrap();

    let history = store.status_history(&app).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status_type, StatusScope::Bank);
    assert_eq!(history[0].new_status, "Placed");
    assert_eq!(history[1].status_type, StatusScope::Crm);
    assert_eq!(history[1].details.as_deref(), Some("Application submitted"));
    assert_eq!(history[1].manager_name.as_deref(), Some("Ana"));
    assert!(history[0].id < history[1].id);
}

#[tokio::test]
async fn application_request_round_trip() {
    let store = prepare_test_store().await;
    let request = NewApplicationRequest {
        application_id: ApplicationId::from("URN-9"),
        order_id: OrderId(9),
        credit_company: CreditProvider::EasyCredit,
        request_data: serde_json::json!({"idnp": "123", "amount": "5000"}),
        files_count: 2,
        file_names: vec!["passport.jpg".to_string(), "passport_back.jpg".to_string()],
    };
    store.save_application_request(&request).await.unwrap();

    let by_app = store.application_request(&ApplicationId::from("URN-9")).await.unwrap().unwrap();
    assert_eq!(by_app.order_id, OrderId(9));
    assert_eq!(by_app.files_count, 2);
    assert!(by_app.file_names.contains("passport.jpg"));

    let by_order = store.application_request_for_order(OrderId(9)).await.unwrap().unwrap();
    assert_eq!(by_order.application_id, ApplicationId::from("URN-9"));
    assert!(store.application_request(&ApplicationId::from("URN-404")).await.unwrap().is_none());
}

#[tokio::test]
async fn metadata_and_last_sync() {
    let store = prepare_test_store().await;
    assert!(store.metadata("last_history_id").await.unwrap().is_none());
    store.set_metadata("last_history_id", "120").await.unwrap();
    store.set_metadata("last_history_id", "121").await.unwrap();
    assert_eq!(store.metadata("last_history_id").await.unwrap().as_deref(), Some("121"));

    assert!(store.last_sync().await.unwrap().is_none());
    let stamped = store.touch_last_sync().await.unwrap();
    let read_back = store.last_sync().await.unwrap().unwrap();
    assert_eq!(stamped.timestamp(), read_back.timestamp());
}

#[tokio::test]
async fn sent_messages_round_trip() {
    let store = prepare_test_store().await;
    let app = ApplicationId::from("A-77");
    store
        .save_sent_message(&NewSentMessage {
            application_id: app.clone(),
            message_text: "Cererea este gata".to_string(),
            manager_id: Some(4),
            manager_name: Some("Maria".to_string()),
        })
        .await
        .unwrap();
    let messages = store.sent_messages(&app).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_text, "Cererea este gata");
    assert_eq!(messages[0].manager_name.as_deref(), Some("Maria"));
}

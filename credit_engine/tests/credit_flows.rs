mod support;

use std::time::Duration;

use cpg_common::Money;
use credit_engine::{
    db_types::{
        ApplicationId,
        BankSnapshot,
        CreditPayment,
        CreditProvider,
        CrmOrder,
        CrmStatus,
        FileBlob,
        OrderId,
        StatusScope,
        StatusSource,
    },
    flow_objects::{FeedQueryFilter, ManagerInfo, WebhookKind},
    guard::SubmissionGuard,
    traits::FeedStore,
    CreditFlowError,
    FeedApi,
    ReconcileApi,
    SubmissionApi,
};
use support::{
    mocks::{MockCrm, MockPartners},
    prepare_test_store,
};

fn credit_order(id: i64, company: &str, amount_lei: i64, term: &str) -> CrmOrder {
    CrmOrder {
        id: OrderId(id),
        number: Some(format!("W-{id}")),
        site: Some("store".to_string()),
        phone: Some("069123456".to_string()),
        status: Some("credit-check".to_string()),
        idnp: Some("2004012345678".to_string()),
        first_name: Some("Ion".to_string()),
        last_name: Some("Popescu".to_string()),
        birthday: Some("05.03.1990".to_string()),
        credit_company: Some(company.to_string()),
        credit_term: Some(term.to_string()),
        payment: Some(CreditPayment {
            id: "900".to_string(),
            kind: "credit".to_string(),
            amount: Money::from_lei(amount_lei),
            status: Some("not-paid".to_string()),
        }),
        ..Default::default()
    }
}

fn passport() -> Vec<FileBlob> {
    vec![FileBlob { name: "passport.jpg".to_string(), data: "aGVsbG8=".to_string() }]
}

async fn submission_api(
    crm: MockCrm,
    partners: MockPartners,
) -> SubmissionApi<MockCrm, MockPartners, credit_engine::SqliteFeedStore> {
    let store = prepare_test_store().await;
    SubmissionApi::new(crm, partners, store, SubmissionGuard::new())
}

fn reconcile_api(
    crm: MockCrm,
    partners: MockPartners,
    store: credit_engine::SqliteFeedStore,
) -> ReconcileApi<MockCrm, MockPartners, credit_engine::SqliteFeedStore> {
    ReconcileApi::new(crm, partners, store).with_delays(Duration::ZERO, Duration::ZERO)
}

//--------------------------------------     submission      ----------------------------------------------------------

#[tokio::test]
async fn concurrent_double_submit_yields_one_success() {
    let order = credit_order(1, "microinvest", 5000, "6");
    let crm = MockCrm::default().with_order(order).with_files(1, passport());
    let partners = MockPartners::default().with_application_id("7001");
    *partners.submit_delay.lock().unwrap() = Duration::from_millis(100);
    let api = submission_api(crm, partners.clone()).await;

    let manager = ManagerInfo::default();
    let (first, second) = tokio::join!(
        api.submit_application(OrderId(1), &manager),
        api.submit_application(OrderId(1), &manager),
    );

    let results = [first, second];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(CreditFlowError::DuplicateSubmission(_))))
        .count();
    assert_eq!(successes, 1, "exactly one submission must reach the partner");
    assert_eq!(duplicates, 1, "the loser must see a duplicate-submission error");
    assert_eq!(partners.submission_count(), 1);
}

#[tokio::test]
async fn cyrillic_name_fails_before_any_partner_call() {
    let mut order = credit_order(2, "microinvest", 5000, "6");
    order.first_name = Some("Иван".to_string());
    let crm = MockCrm::default().with_order(order).with_files(2, passport());
    let partners = MockPartners::default().with_application_id("7002");
    let api = submission_api(crm, partners.clone()).await;

    let err = api.submit_application(OrderId(2), &ManagerInfo::default()).await.unwrap_err();
    assert!(err.to_string().contains("латинице"));
    assert_eq!(partners.submission_count(), 0, "validation must run before the partner call");
}

#[tokio::test]
async fn microinvest_requires_an_attached_document() {
    let order = credit_order(3, "microinvest", 5000, "6");
    let crm = MockCrm::default().with_order(order);
    let api = submission_api(crm, MockPartners::default().with_application_id("7003")).await;

    let err = api.submit_application(OrderId(3), &ManagerInfo::default()).await.unwrap_err();
    assert!(err.to_string().contains("паспорта"));
}

#[tokio::test]
async fn submission_normalizes_fields_and_records_linkage() {
    let order = credit_order(4, "microinvest", 5000, "4");
    let mut order = order;
    order.zero_interest = true;
    let crm = MockCrm::default().with_order(order).with_files(4, passport());
    let partners = MockPartners::default().with_application_id("7004");
    let api = submission_api(crm.clone(), partners.clone()).await;

    let outcome = api
        .submit_application(OrderId(4), &ManagerInfo::new(Some(11), Some("Ana".to_string())))
        .await
        .unwrap();
    assert_eq!(outcome.application_id, ApplicationId::from("7004"));
    assert_eq!(outcome.files_count, 1);
    assert!(outcome.files_uploaded);

    let request = partners.submissions.lock().unwrap()[0].clone();
    assert_eq!(request.phone, "+37369123456");
    assert_eq!(request.birth_date, "1990-03-05");
    assert!(matches!(
        &request.product,
        credit_engine::traits::ProductSelector::LoanProduct(id)
            if id == "6eddefdd-fbf9-11ee-b780-00155d65140c"
    ));

    let linked = crm.linked.lock().unwrap().clone();
    assert_eq!(linked, vec![(OrderId(4), ApplicationId::from("7004"), CreditProvider::Microinvest)]);
    let updates = crm.payment_updates.lock().unwrap().clone();
    assert_eq!(updates, vec![(OrderId(4), "credit-check".to_string())]);
}

#[tokio::test]
async fn easy_credit_upload_failure_is_partial_success() {
    let order = credit_order(5, "easycredit", 5000, "12");
    let crm = MockCrm::default().with_order(order).with_files(5, passport());
    let partners = MockPartners::default().with_application_id("URN-5");
    *partners.fail_uploads.lock().unwrap() = true;
    let api = submission_api(crm.clone(), partners.clone()).await;

    let outcome = api.submit_application(OrderId(5), &ManagerInfo::default()).await.unwrap();
    assert_eq!(outcome.application_id, ApplicationId::from("URN-5"));
    assert!(!outcome.files_uploaded, "a failed upload is surfaced, not rolled back");
    assert_eq!(crm.linked.lock().unwrap().len(), 1, "the application linkage must still be recorded");

    let request = partners.submissions.lock().unwrap()[0].clone();
    assert_eq!(request.phone, "069123456");
    assert!(matches!(request.product, credit_engine::traits::ProductSelector::ProductCode(55)));
}

#[tokio::test]
async fn resubmission_with_existing_application_fails() {
    let mut order = credit_order(6, "microinvest", 5000, "6");
    order.application_id = Some(ApplicationId::from("7006"));
    let crm = MockCrm::default().with_order(order).with_files(6, passport());
    let api = submission_api(crm, MockPartners::default().with_application_id("dup")).await;

    let err = api.submit_application(OrderId(6), &ManagerInfo::default()).await.unwrap_err();
    assert!(matches!(err, CreditFlowError::ApplicationExists(OrderId(6), _)));
}

#[tokio::test]
async fn iute_selector_cannot_use_the_bank_submission_path() {
    let order = credit_order(7, "iutecredit", 5000, "6");
    let crm = MockCrm::default().with_order(order).with_files(7, passport());
    let api = submission_api(crm, MockPartners::default().with_application_id("nope")).await;

    let err = api.submit_application(OrderId(7), &ManagerInfo::default()).await.unwrap_err();
    assert!(matches!(err, CreditFlowError::UnknownProvider { .. }));
}

#[tokio::test]
async fn iute_order_gets_synthetic_reference_and_feed_row() {
    let order = credit_order(8, "", 7000, "0");
    let crm = MockCrm::default().with_order(order);
    let partners = MockPartners::default();
    let store = prepare_test_store().await;
    let api = SubmissionApi::new(crm.clone(), partners, store.clone(), SubmissionGuard::new());

    let outcome = api
        .submit_iute_order(OrderId(8), None, None, &ManagerInfo::default())
        .await
        .unwrap();
    assert_eq!(outcome.application_id, ApplicationId::from("CRM-8"));
    assert_eq!(outcome.status, "PENDING");
    assert!(outcome.myiute_customer);

    let item = store.feed_item(OrderId(8)).await.unwrap().unwrap();
    assert_eq!(item.credit_company, CreditProvider::Iute);
    assert_eq!(item.bank_status, "PENDING");

    let history = store.status_history(&outcome.application_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status_type, StatusScope::Bank);
    assert_eq!(history[0].source, StatusSource::Api);
    assert_eq!(history[0].details.as_deref(), Some("Клиент MyIute"));
}

//--------------------------------------    reconciliation    ---------------------------------------------------------

fn approved_snapshot(amount_lei: i64, term: u32) -> BankSnapshot {
    BankSnapshot {
        raw_status: "Approved".to_string(),
        approved_amount: Some(Money::from_lei(amount_lei)),
        approved_term: Some(term),
        approved_product_id: Some("55cc08c9-b61b-11ef-b7b7-00155d65140c".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn approved_with_matching_terms_maps_to_credit_approved() {
    let mut order = credit_order(10, "microinvest", 5000, "6");
    order.application_id = Some(ApplicationId::from("A-10"));
    let crm = MockCrm::default().with_order(order);
    let partners = MockPartners::default().with_snapshot("A-10", approved_snapshot(5000, 6));
    let store = prepare_test_store().await;
    let api = reconcile_api(crm.clone(), partners, store.clone());

    let outcome = api.check_order(OrderId(10)).await.unwrap().unwrap();
    assert_eq!(outcome.crm_status, CrmStatus::CreditApproved);
    assert_eq!(outcome.bank_status, "Approved");
    assert!(!outcome.is_final);

    let updates = crm.payment_updates.lock().unwrap().clone();
    assert_eq!(updates, vec![(OrderId(10), "credit-approved".to_string())]);
    let history = store.status_history(&ApplicationId::from("A-10")).await.unwrap();
    assert_eq!(history.len(), 2, "one bank row and one crm row");
    assert_eq!(history[0].status_type, StatusScope::Bank);
    assert_eq!(history[1].status_type, StatusScope::Crm);
    assert_eq!(history[1].source, StatusSource::Cron);
    assert!(history[1].details.is_none());
}

#[tokio::test]
async fn approved_with_lower_amount_downgrades_to_conditions_changed() {
    let mut order = credit_order(11, "microinvest", 5000, "6");
    order.application_id = Some(ApplicationId::from("A-11"));
    let crm = MockCrm::default().with_order(order);
    let partners = MockPartners::default().with_snapshot("A-11", approved_snapshot(4500, 6));
    let store = prepare_test_store().await;
    let api = reconcile_api(crm.clone(), partners, store.clone());

    let outcome = api.check_order(OrderId(11)).await.unwrap().unwrap();
    assert_eq!(outcome.crm_status, CrmStatus::ConditionsChanged);

    let history = store.status_history(&ApplicationId::from("A-11")).await.unwrap();
    let crm_row = history.iter().find(|h| h.status_type == StatusScope::Crm).unwrap();
    assert_eq!(crm_row.new_status, "conditions-changed");
    assert_eq!(crm_row.details.as_deref(), Some("Bank changed conditions"));
}

#[tokio::test]
async fn reconcile_is_idempotent_without_new_bank_state() {
    let mut order = credit_order(12, "microinvest", 5000, "6");
    order.application_id = Some(ApplicationId::from("A-12"));
    let crm = MockCrm::default().with_order(order);
    let partners = MockPartners::default().with_snapshot("A-12", approved_snapshot(5000, 6));
    let store = prepare_test_store().await;
    let api = reconcile_api(crm.clone(), partners, store.clone());

    api.check_order(OrderId(12)).await.unwrap().unwrap();
    let history_after_first = store.status_history(&ApplicationId::from("A-12")).await.unwrap().len();
    let updates_after_first = crm.payment_update_count();

    // second pass with unchanged bank state: no CRM write, no new history rows
    api.check_order(OrderId(12)).await.unwrap().unwrap();
    let history_after_second = store.status_history(&ApplicationId::from("A-12")).await.unwrap().len();
    assert_eq!(history_after_first, history_after_second);
    assert_eq!(crm.payment_update_count(), updates_after_first);
}

#[tokio::test]
async fn order_without_application_is_a_noop() {
    let order = credit_order(13, "microinvest", 5000, "6");
    let crm = MockCrm::default().with_order(order);
    let partners = MockPartners::default();
    let store = prepare_test_store().await;
    let api = reconcile_api(crm, partners.clone(), store);

    let outcome = api.check_order(OrderId(13)).await.unwrap();
    assert!(outcome.is_none());
    assert_eq!(partners.status_call_count(), 0, "no partner may be called without an application");
}

#[tokio::test]
async fn unknown_bank_status_changes_nothing() {
    let mut order = credit_order(14, "microinvest", 5000, "6");
    order.application_id = Some(ApplicationId::from("A-14"));
    let crm = MockCrm::default().with_order(order);
    let partners = MockPartners::default().with_snapshot(
        "A-14",
        BankSnapshot { raw_status: "MysteriousNewState".to_string(), ..Default::default() },
    );
    let store = prepare_test_store().await;
    let api = reconcile_api(crm.clone(), partners, store.clone());

    let outcome = api.check_order(OrderId(14)).await.unwrap();
    assert!(outcome.is_none());
    assert_eq!(crm.payment_update_count(), 0);
    assert!(store.status_history(&ApplicationId::from("A-14")).await.unwrap().is_empty());
}

#[tokio::test]
async fn approved_credit_order_attaches_contracts_once() {
    let mut order = credit_order(15, "microinvest", 5000, "6");
    order.application_id = Some(ApplicationId::from("A-15"));
    let crm = MockCrm::default().with_order(order);
    let partners = MockPartners::default()
        .with_snapshot("A-15", approved_snapshot(5000, 6))
        .with_contracts("A-15", vec![FileBlob { name: "contract_A-15.pdf".to_string(), data: "cGRm".to_string() }]);
    let store = prepare_test_store().await;
    let api = reconcile_api(crm.clone(), partners, store);

    api.check_order(OrderId(15)).await.unwrap().unwrap();
    let uploaded = crm.uploaded.lock().unwrap().clone();
    assert_eq!(uploaded, vec![(OrderId(15), "contract_A-15.pdf".to_string())]);

    // the order now carries contract files: the next pass must not upload again
    crm.orders_with_contracts.lock().unwrap().insert(15);
    api.check_order(OrderId(15)).await.unwrap().unwrap();
    assert_eq!(crm.uploaded.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn batch_pass_covers_every_order_despite_failures() {
    let mut good = credit_order(16, "microinvest", 5000, "6");
    good.application_id = Some(ApplicationId::from("A-16"));
    let mut finalized = credit_order(17, "microinvest", 5000, "6");
    finalized.application_id = Some(ApplicationId::from("A-17"));
    let mut archived = credit_order(18, "microinvest", 5000, "6");
    archived.application_id = Some(ApplicationId::from("A-18"));
    archived.status = Some("complete".to_string());

    let crm = MockCrm::default().with_order(good).with_order(finalized).with_order(archived);
    let partners = MockPartners::default()
        .with_snapshot("A-16", approved_snapshot(5000, 6))
        .with_snapshot("A-17", BankSnapshot { raw_status: "Issued".to_string(), ..Default::default() });
    let store = prepare_test_store().await;
    let api = reconcile_api(crm, partners, store);

    let summary = api.check_all_pending().await.unwrap();
    assert_eq!(summary.total, 2, "archived orders are filtered out");
    assert_eq!(summary.updated, 2);
    assert_eq!(summary.finalized, 1);
}

#[tokio::test]
async fn sync_feed_caches_live_state_and_stamps_sync_time() {
    let mut order = credit_order(19, "microinvest", 5000, "6");
    order.application_id = Some(ApplicationId::from("A-19"));
    order.manager_id = Some(3);
    let crm = MockCrm::default().with_order(order);
    let partners = MockPartners::default().with_snapshot("A-19", approved_snapshot(4000, 6));
    let store = prepare_test_store().await;
    let api = reconcile_api(crm, partners, store.clone());

    let report = api.sync_feed().await.unwrap();
    assert_eq!(report.synced, 1);

    let item = store.feed_item(OrderId(19)).await.unwrap().unwrap();
    assert_eq!(item.bank_status, "Approved");
    assert!(item.conditions_changed);
    assert_eq!(item.manager_name.as_deref(), Some("Manager 3"));
    let comparison = item.terms_comparison().unwrap();
    assert_eq!(comparison.requested.amount, Money::from_lei(5000));
    assert_eq!(comparison.approved.unwrap().amount, Money::from_lei(4000));
    assert!(store.last_sync().await.unwrap().is_some());
}

#[tokio::test]
async fn stale_rows_get_lifecycle_refresh_without_bank_calls() {
    let store = prepare_test_store().await;
    // cached row for an order that no longer matches the active filters
    store
        .upsert_feed_item(&credit_engine::db_types::NewFeedItem {
            order_id: OrderId(20),
            application_id: ApplicationId::from("A-20"),
            credit_company: CreditProvider::Microinvest,
            customer_name: "Ion Popescu".to_string(),
            bank_status: "Issued".to_string(),
            order_status: Some("credit-check".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    // the CRM now reports the order as delivered; it is NOT in the active set
    let mut delivered = credit_order(20, "microinvest", 5000, "6");
    delivered.application_id = None;
    delivered.status = Some("delivered".to_string());
    let crm = MockCrm::default().with_order(delivered);
    let partners = MockPartners::default();
    let api = reconcile_api(crm, partners.clone(), store.clone());

    let report = api.sync_feed().await.unwrap();
    assert_eq!(report.stale_refreshed, 1);
    let item = store.feed_item(OrderId(20)).await.unwrap().unwrap();
    assert_eq!(item.order_status.as_deref(), Some("delivered"));
    assert_eq!(item.bank_status, "Issued", "the stale pass never re-checks the bank");
    assert_eq!(partners.status_call_count(), 0);
}

//--------------------------------------       webhook        ---------------------------------------------------------

#[tokio::test]
async fn webhook_confirm_marks_paid_and_appends_history() {
    let store = prepare_test_store().await;
    store
        .upsert_feed_item(&credit_engine::db_types::NewFeedItem {
            order_id: OrderId(21),
            application_id: ApplicationId::from("CRM-21"),
            credit_company: CreditProvider::Iute,
            customer_name: "Ion Popescu".to_string(),
            bank_status: "PENDING".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let mut order = credit_order(21, "iutecredit", 7000, "0");
    order.application_id = Some(ApplicationId::from("CRM-21"));
    let crm = MockCrm::default().with_order(order);
    let api = reconcile_api(crm.clone(), MockPartners::default(), store.clone());

    let app = ApplicationId::from("CRM-21");
    let outcome = api.apply_webhook(&app, WebhookKind::Confirm, None).await.unwrap();
    assert_eq!(outcome.status, "PAID");

    let item = store.feed_item_by_application(&app).await.unwrap().unwrap();
    assert_eq!(item.bank_status, "PAID");
    assert_eq!(crm.payment_updates.lock().unwrap().clone(), vec![(OrderId(21), "paid".to_string())]);

    let history = store.status_history(&app).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source, StatusSource::Webhook);
    assert_eq!(history[0].old_status.as_deref(), Some("PENDING"));
    assert_eq!(history[0].new_status, "PAID");

    // unknown references are rejected
    let err = api.apply_webhook(&ApplicationId::from("CRM-404"), WebhookKind::Cancel, None).await.unwrap_err();
    assert!(matches!(err, CreditFlowError::UnknownApplication(_)));
}

//--------------------------------------     cached reads     ---------------------------------------------------------

#[tokio::test]
async fn cached_feed_reads_need_no_collaborators() {
    let store = prepare_test_store().await;
    store
        .upsert_feed_item(&credit_engine::db_types::NewFeedItem {
            order_id: OrderId(30),
            application_id: ApplicationId::from("A-30"),
            credit_company: CreditProvider::EasyCredit,
            customer_name: "Ion Popescu".to_string(),
            bank_status: "Approved".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    store.touch_last_sync().await.unwrap();

    // FeedApi is constructed from the store alone: there is no partner to call even in principle
    let api = FeedApi::new(store);
    let feed = api.cached_feed(&FeedQueryFilter::default()).await.unwrap();
    assert_eq!(feed.count, 1);
    assert_eq!(feed.items[0].application_id, ApplicationId::from("A-30"));
    assert!(feed.last_sync.is_some());

    assert!(api.remove_item(OrderId(30)).await.unwrap());
    assert!(!api.remove_item(OrderId(30)).await.unwrap());
}

#[tokio::test]
async fn refusal_declines_payment_and_records_reason() {
    let mut order = credit_order(31, "microinvest", 5000, "6");
    order.application_id = Some(ApplicationId::from("A-31"));
    let crm = MockCrm::default().with_order(order);
    let partners = MockPartners::default();
    let store = prepare_test_store().await;
    let api = reconcile_api(crm.clone(), partners.clone(), store.clone());

    let outcome = api
        .refuse_application(OrderId(31), Some("клиент передумал".to_string()), &ManagerInfo::default())
        .await
        .unwrap();
    assert_eq!(outcome.application_id, ApplicationId::from("A-31"));

    let refusals = partners.refusals.lock().unwrap().clone();
    assert_eq!(refusals.len(), 1);
    assert_eq!(refusals[0].2.as_deref(), Some("клиент передумал"));
    assert_eq!(crm.payment_updates.lock().unwrap().clone(), vec![(OrderId(31), "credit-declined".to_string())]);

    let history = store.status_history(&ApplicationId::from("A-31")).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].details.as_deref(), Some("Refused: клиент передумал"));
}

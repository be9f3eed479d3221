use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use credit_engine::{guard::SubmissionGuard, FeedApi, ReconcileApi, SqliteFeedStore, SubmissionApi};
use partner_tools::{EasyCreditApi, IuteApi, MicroinvestApi, SimlaApi};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::{PartnerClients, SimlaCrm},
    routes,
    routes::WebhookSettings,
    sync_worker::start_sync_worker,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let store = SqliteFeedStore::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    store
        .run_migrations()
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let srv = create_server_instance(config, store)?;
    srv.await.map_err(|e| ServerError::InitializeError(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, store: SqliteFeedStore) -> Result<Server, ServerError> {
    let init = |e: partner_tools::PartnerApiError| ServerError::InitializeError(e.to_string());
    let simla = SimlaApi::new(config.simla.clone()).map_err(init)?;
    let microinvest = MicroinvestApi::new(config.microinvest.clone()).map_err(init)?;
    let easycredit = EasyCreditApi::new(config.easycredit.clone()).map_err(init)?;
    let iute = IuteApi::new(config.iute.clone()).map_err(init)?;

    let crm = SimlaCrm::new(simla);
    let partners = PartnerClients::new(microinvest, easycredit, iute);
    // One guard for the whole process: workers share it, or two HTTP workers could submit the
    // same order side by side
    let guard = SubmissionGuard::new();
    let webhook = WebhookSettings { secret: config.webhook_secret.clone() };

    let worker_api = ReconcileApi::new(crm.clone(), partners.clone(), store.clone());
    let every = config
        .status_check_interval
        .to_std()
        .unwrap_or(Duration::from_secs(60));
    let initial_delay = config.initial_sync_delay.to_std().unwrap_or(Duration::from_secs(5));
    let _worker = start_sync_worker(worker_api, every, initial_delay);

    let srv = HttpServer::new(move || {
        let submissions = SubmissionApi::new(crm.clone(), partners.clone(), store.clone(), guard.clone());
        let reconciler = ReconcileApi::new(crm.clone(), partners.clone(), store.clone());
        let feed = FeedApi::new(store.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("cpg::access_log"))
            .app_data(web::Data::new(submissions))
            .app_data(web::Data::new(reconciler))
            .app_data(web::Data::new(feed))
            .app_data(web::Data::new(webhook.clone()))
            .service(routes::health)
            .service(
                web::scope("/api")
                    .service(routes::send_application)
                    .service(routes::send_iute_application)
                    .service(routes::check_status)
                    .service(routes::check_all)
                    .service(routes::send_files)
                    .service(routes::contracts)
                    .service(routes::refuse)
                    .service(routes::get_messages)
                    .service(routes::send_message)
                    .service(routes::cached_feed)
                    .service(routes::sync_feed)
                    .service(routes::remove_feed_item)
                    .service(routes::status_history)
                    .service(routes::application_request)
                    .service(routes::update_order_status)
                    .service(routes::iute_webhook),
            )
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

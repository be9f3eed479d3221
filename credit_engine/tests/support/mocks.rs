//! Hand-rolled collaborator fakes for exercising the API flows without any network or CRM.
//!
//! State lives behind `Arc<Mutex<_>>` so tests can inspect what the engine did, and so the fakes
//! stay `Clone` the way the real gateways are.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use credit_engine::{
    db_types::{
        ApplicationId,
        BankSnapshot,
        CreditProvider,
        CrmOrder,
        CrmStatus,
        FileBlob,
        OrderId,
    },
    traits::{
        CrmFieldChange,
        CrmGateway,
        CrmGatewayError,
        PartnerMessage,
        PosOrderAck,
        ProviderGateway,
        ProviderGatewayError,
        SubmissionRequest,
    },
};

//--------------------------------------       MockCrm        ---------------------------------------------------------
#[derive(Clone, Default)]
pub struct MockCrm {
    pub orders: Arc<Mutex<HashMap<i64, CrmOrder>>>,
    pub linked: Arc<Mutex<Vec<(OrderId, ApplicationId, CreditProvider)>>>,
    pub payment_updates: Arc<Mutex<Vec<(OrderId, String)>>>,
    pub order_status_updates: Arc<Mutex<Vec<(OrderId, String)>>>,
    pub files: Arc<Mutex<HashMap<i64, Vec<FileBlob>>>>,
    pub uploaded: Arc<Mutex<Vec<(OrderId, String)>>>,
    pub orders_with_contracts: Arc<Mutex<HashSet<i64>>>,
    pub history: Arc<Mutex<Vec<CrmFieldChange>>>,
}

impl MockCrm {
    pub fn with_order(self, order: CrmOrder) -> Self {
        self.orders.lock().unwrap().insert(order.id.value(), order);
        self
    }

    pub fn with_files(self, order_id: i64, files: Vec<FileBlob>) -> Self {
        self.files.lock().unwrap().insert(order_id, files);
        self
    }

    pub fn payment_update_count(&self) -> usize {
        self.payment_updates.lock().unwrap().len()
    }
}

impl CrmGateway for MockCrm {
    async fn fetch_order(&self, id: OrderId) -> Result<Option<CrmOrder>, CrmGatewayError> {
        Ok(self.orders.lock().unwrap().get(&id.value()).cloned())
    }

    async fn orders_with_active_applications(&self) -> Result<Vec<CrmOrder>, CrmGatewayError> {
        Ok(self.orders.lock().unwrap().values().cloned().collect())
    }

    async fn link_application(
        &self,
        id: OrderId,
        application_id: &ApplicationId,
        provider: CreditProvider,
        _site: Option<&str>,
    ) -> Result<(), CrmGatewayError> {
        self.linked.lock().unwrap().push((id, application_id.clone(), provider));
        if let Some(order) = self.orders.lock().unwrap().get_mut(&id.value()) {
            order.application_id = Some(application_id.clone());
        }
        Ok(())
    }

    async fn update_payment_status(
        &self,
        id: OrderId,
        _payment_id: &str,
        status: CrmStatus,
        _site: Option<&str>,
    ) -> Result<(), CrmGatewayError> {
        self.payment_updates.lock().unwrap().push((id, status.to_string()));
        if let Some(order) = self.orders.lock().unwrap().get_mut(&id.value()) {
            if let Some(payment) = order.payment.as_mut() {
                payment.status = Some(status.to_string());
            }
        }
        Ok(())
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: &str,
        _site: Option<&str>,
    ) -> Result<(), CrmGatewayError> {
        self.order_status_updates.lock().unwrap().push((id, status.to_string()));
        if let Some(order) = self.orders.lock().unwrap().get_mut(&id.value()) {
            order.status = Some(status.to_string());
        }
        Ok(())
    }

    async fn order_files(&self, id: OrderId, _site: Option<&str>) -> Result<Vec<FileBlob>, CrmGatewayError> {
        Ok(self.files.lock().unwrap().get(&id.value()).cloned().unwrap_or_default())
    }

    async fn upload_file(
        &self,
        id: OrderId,
        name: &str,
        _data: &str,
        _site: Option<&str>,
    ) -> Result<(), CrmGatewayError> {
        self.uploaded.lock().unwrap().push((id, name.to_string()));
        Ok(())
    }

    async fn has_contract_files(&self, id: OrderId, _site: Option<&str>) -> Result<bool, CrmGatewayError> {
        Ok(self.orders_with_contracts.lock().unwrap().contains(&id.value()))
    }

    async fn manager_name(&self, manager_id: i64) -> Result<Option<String>, CrmGatewayError> {
        Ok(Some(format!("Manager {manager_id}")))
    }

    async fn history_since(
        &self,
        since_id: Option<i64>,
        _limit: u32,
    ) -> Result<Vec<CrmFieldChange>, CrmGatewayError> {
        let cursor = since_id.unwrap_or(0);
        Ok(self.history.lock().unwrap().iter().filter(|c| c.id > cursor).cloned().collect())
    }
}

//--------------------------------------     MockPartners     ---------------------------------------------------------
#[derive(Clone, Default)]
pub struct MockPartners {
    pub snapshots: Arc<Mutex<HashMap<String, BankSnapshot>>>,
    pub contracts: Arc<Mutex<HashMap<String, Vec<FileBlob>>>>,
    pub submissions: Arc<Mutex<Vec<SubmissionRequest>>>,
    pub uploads: Arc<Mutex<Vec<(CreditProvider, ApplicationId, usize)>>>,
    pub refusals: Arc<Mutex<Vec<(CreditProvider, ApplicationId, Option<String>)>>>,
    pub sent_messages: Arc<Mutex<Vec<(ApplicationId, String)>>>,
    pub status_calls: Arc<Mutex<usize>>,
    pub next_application_id: Arc<Mutex<Option<String>>>,
    /// Delay applied inside `submit_application`, for overlap tests.
    pub submit_delay: Arc<Mutex<Duration>>,
    pub fail_uploads: Arc<Mutex<bool>>,
}

impl MockPartners {
    pub fn with_snapshot(self, application_id: &str, snapshot: BankSnapshot) -> Self {
        self.snapshots.lock().unwrap().insert(application_id.to_string(), snapshot);
        self
    }

    pub fn with_application_id(self, application_id: &str) -> Self {
        *self.next_application_id.lock().unwrap() = Some(application_id.to_string());
        self
    }

    pub fn with_contracts(self, application_id: &str, files: Vec<FileBlob>) -> Self {
        self.contracts.lock().unwrap().insert(application_id.to_string(), files);
        self
    }

    pub fn status_call_count(&self) -> usize {
        *self.status_calls.lock().unwrap()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

impl ProviderGateway for MockPartners {
    async fn submit_application(
        &self,
        request: &SubmissionRequest,
    ) -> Result<ApplicationId, ProviderGatewayError> {
        let delay = *self.submit_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.submissions.lock().unwrap().push(request.clone());
        match self.next_application_id.lock().unwrap().clone() {
            Some(id) => Ok(ApplicationId::from(id)),
            None => Err(ProviderGatewayError::PartnerMessage("Refuzat de banca".to_string())),
        }
    }

    async fn submit_pos_order(&self, request: &SubmissionRequest) -> Result<PosOrderAck, ProviderGatewayError> {
        self.submissions.lock().unwrap().push(request.clone());
        Ok(PosOrderAck { status: "PENDING".to_string(), myiute_customer: true, message: None })
    }

    async fn fetch_status(
        &self,
        _provider: CreditProvider,
        application_id: &ApplicationId,
    ) -> Result<Option<BankSnapshot>, ProviderGatewayError> {
        *self.status_calls.lock().unwrap() += 1;
        Ok(self.snapshots.lock().unwrap().get(application_id.as_str()).cloned())
    }

    async fn upload_files(
        &self,
        provider: CreditProvider,
        application_id: &ApplicationId,
        files: &[FileBlob],
    ) -> Result<(), ProviderGatewayError> {
        if *self.fail_uploads.lock().unwrap() {
            return Err(ProviderGatewayError::Transport(provider, "file endpoint unavailable".to_string()));
        }
        self.uploads.lock().unwrap().push((provider, application_id.clone(), files.len()));
        Ok(())
    }

    async fn fetch_contracts(
        &self,
        _provider: CreditProvider,
        application_id: &ApplicationId,
    ) -> Result<Vec<FileBlob>, ProviderGatewayError> {
        Ok(self.contracts.lock().unwrap().get(application_id.as_str()).cloned().unwrap_or_default())
    }

    async fn refuse_application(
        &self,
        provider: CreditProvider,
        application_id: &ApplicationId,
        reason: Option<&str>,
    ) -> Result<(), ProviderGatewayError> {
        self.refusals.lock().unwrap().push((provider, application_id.clone(), reason.map(String::from)));
        Ok(())
    }

    async fn send_message(
        &self,
        _provider: CreditProvider,
        application_id: &ApplicationId,
        text: &str,
        _files: Option<&[FileBlob]>,
    ) -> Result<(), ProviderGatewayError> {
        self.sent_messages.lock().unwrap().push((application_id.clone(), text.to_string()));
        Ok(())
    }

    async fn fetch_messages(
        &self,
        _provider: CreditProvider,
        _application_id: &ApplicationId,
        _new_only: bool,
    ) -> Result<Vec<PartnerMessage>, ProviderGatewayError> {
        Ok(Vec::new())
    }
}

use std::fmt::Debug;

use log::*;

use crate::{
    ce_api::{
        errors::CreditFlowError,
        flow_objects::{IuteSubmissionOutcome, ManagerInfo, SubmissionOutcome},
    },
    db_types::{
        ApplicationId,
        CreditPayment,
        CreditProvider,
        CrmOrder,
        CrmStatus,
        FileBlob,
        NewApplicationRequest,
        NewFeedItem,
        NewStatusEntry,
        OrderId,
        StatusSource,
    },
    guard::SubmissionGuard,
    helpers::{contains_cyrillic, first_installment_date, format_birthday, format_phone_e164, format_phone_local, goods_label},
    status::{LoanProductTable, StatusAdapters},
    traits::{CrmGateway, FeedStore, ProductSelector, ProviderGateway, SubmissionRequest},
};

/// Days between submission and the first Easy Credit installment, per store policy.
const FIRST_INSTALLMENT_OFFSET_DAYS: i64 = 20;
/// Easy Credit needs a moment after application creation before its file endpoint accepts
/// uploads for the new URN.
const EASY_CREDIT_UPLOAD_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

/// `SubmissionApi` owns the end-to-end creation of loan applications: order validation, payload
/// normalization, the partner call, and recording the application linkage back into the CRM and
/// the feed store.
pub struct SubmissionApi<C, P, B> {
    crm: C,
    partners: P,
    db: B,
    guard: SubmissionGuard,
    products: LoanProductTable,
    adapters: StatusAdapters,
}

impl<C, P, B> Debug for SubmissionApi<C, P, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SubmissionApi")
    }
}

impl<C, P, B> SubmissionApi<C, P, B> {
    pub fn new(crm: C, partners: P, db: B, guard: SubmissionGuard) -> Self {
        Self {
            crm,
            partners,
            db,
            guard,
            products: LoanProductTable::default(),
            adapters: StatusAdapters::default(),
        }
    }

    pub fn with_products(mut self, products: LoanProductTable) -> Self {
        self.products = products;
        self
    }
}

impl<C, P, B> SubmissionApi<C, P, B>
where
    C: CrmGateway,
    P: ProviderGateway,
    B: FeedStore,
{
    /// Submit the order's loan application to the credit company its selector names.
    ///
    /// Exactly one submission may be in flight per order, and an order that already carries an
    /// application reference can never be submitted again. Validation failures are reported
    /// before any partner call is made.
    pub async fn submit_application(
        &self,
        order_id: OrderId,
        manager: &ManagerInfo,
    ) -> Result<SubmissionOutcome, CreditFlowError> {
        info!("📮️ Submitting application for order {order_id}");
        let _permit = self.guard.acquire(order_id).ok_or(CreditFlowError::DuplicateSubmission(order_id))?;

        let order = self
            .crm
            .fetch_order(order_id)
            .await?
            .ok_or(CreditFlowError::OrderNotFound(order_id))?;
        let provider = match order.resolve_provider() {
            Ok(CreditProvider::Microinvest) => CreditProvider::Microinvest,
            Ok(CreditProvider::EasyCredit) => CreditProvider::EasyCredit,
            Ok(other) => {
                return Err(CreditFlowError::UnknownProvider { order_id, company: other.to_string() });
            },
            Err(_) => {
                return Err(CreditFlowError::UnknownProvider {
                    order_id,
                    company: order.credit_company.clone().unwrap_or_default(),
                });
            },
        };
        validate_personal_fields(&order)?;
        let payment =
            order.payment.clone().ok_or_else(|| {
                CreditFlowError::Validation(format!("Заказ {order_id} не имеет кредитного типа оплаты"))
            })?;

        let files = self.crm.order_files(order_id, order.site.as_deref()).await?;

        match provider {
            CreditProvider::Microinvest => self.submit_microinvest(&order, &payment, files, manager).await,
            CreditProvider::EasyCredit => self.submit_easy_credit(&order, &payment, files, manager).await,
            CreditProvider::Iute => unreachable!("filtered above"),
        }
    }

    async fn submit_microinvest(
        &self,
        order: &CrmOrder,
        payment: &CreditPayment,
        files: Vec<FileBlob>,
        manager: &ManagerInfo,
    ) -> Result<SubmissionOutcome, CreditFlowError> {
        if files.is_empty() {
            return Err(CreditFlowError::Validation("Необходимо прикрепить фото паспорта к заказу".to_string()));
        }
        let term = order.credit_term_months();
        let product_id = self.products.microinvest_product_id(order.zero_interest, term).to_string();
        let request = SubmissionRequest {
            provider: CreditProvider::Microinvest,
            idnp: order.idnp.clone().unwrap_or_default(),
            first_name: order.first_name.clone().unwrap_or_default(),
            last_name: order.last_name.clone().unwrap_or_default(),
            birth_date: format_birthday(order.birthday.as_deref().unwrap_or_default()),
            phone: order.phone.as_deref().map(format_phone_e164).unwrap_or_default(),
            amount: payment.amount,
            term,
            product: ProductSelector::LoanProduct(product_id),
            goods_name: String::new(),
            order_reference: order.number.clone().unwrap_or_else(|| order.id.value().to_string()),
            comment: Some(format!(
                "Nr. comenzii: {}",
                order.number.clone().unwrap_or_else(|| order.id.value().to_string())
            )),
            first_installment_date: None,
            currency: cpg_common::MDL_CURRENCY_CODE.to_string(),
            files: files.clone(),
            goods: Vec::new(),
        };
        debug!("📮️ Microinvest application data prepared for order {}", order.id);

        let application_id = self.partners.submit_application(&request).await?;
        self.record_linkage(order, &application_id, CreditProvider::Microinvest, payment, manager).await?;
        self.save_audit_copy(order.id, &application_id, CreditProvider::Microinvest, &request).await;

        info!(
            "📮️ Microinvest application [{application_id}] submitted for order {} with {} files",
            order.id,
            files.len()
        );
        Ok(SubmissionOutcome {
            order_id: order.id,
            application_id,
            files_count: files.len(),
            files_uploaded: true,
        })
    }

    async fn submit_easy_credit(
        &self,
        order: &CrmOrder,
        payment: &CreditPayment,
        files: Vec<FileBlob>,
        manager: &ManagerInfo,
    ) -> Result<SubmissionOutcome, CreditFlowError> {
        let term = match order.credit_term_months() {
            0 => 6,
            t => t,
        };
        let request = SubmissionRequest {
            provider: CreditProvider::EasyCredit,
            idnp: order.idnp.clone().unwrap_or_default(),
            first_name: order.first_name.clone().unwrap_or_default(),
            last_name: order.last_name.clone().unwrap_or_default(),
            birth_date: format_birthday(order.birthday.as_deref().unwrap_or_default()),
            phone: order.phone.as_deref().map(format_phone_local).unwrap_or_default(),
            amount: payment.amount,
            term,
            product: ProductSelector::ProductCode(LoanProductTable::easy_credit_product_code(term)),
            goods_name: goods_label(&order.goods),
            order_reference: order.number.clone().unwrap_or_else(|| order.id.value().to_string()),
            comment: None,
            first_installment_date: Some(first_installment_date(FIRST_INSTALLMENT_OFFSET_DAYS)),
            currency: cpg_common::MDL_CURRENCY_CODE.to_string(),
            files: files.clone(),
            goods: Vec::new(),
        };
        debug!("📮️ Easy Credit application data prepared for order {}", order.id);

        let application_id = self.partners.submit_application(&request).await?;

        // The application is already live at the bank: a failed document upload is reported as a
        // partial success, never rolled back.
        let mut files_uploaded = true;
        if !files.is_empty() {
            tokio::time::sleep(EASY_CREDIT_UPLOAD_DELAY).await;
            debug!("📮️ Uploading {} files to Easy Credit for [{application_id}]", files.len());
            if let Err(e) = self
                .partners
                .upload_files(CreditProvider::EasyCredit, &application_id, &files)
                .await
            {
                error!("📮️ File upload to Easy Credit failed for [{application_id}]: {e}");
                files_uploaded = false;
            }
        }

        self.record_linkage(order, &application_id, CreditProvider::EasyCredit, payment, manager).await?;
        self.save_audit_copy(order.id, &application_id, CreditProvider::EasyCredit, &request).await;

        info!(
            "📮️ Easy Credit application [{application_id}] submitted for order {} with {} files",
            order.id,
            files.len()
        );
        Ok(SubmissionOutcome {
            order_id: order.id,
            application_id,
            files_count: files.len(),
            files_uploaded,
        })
    }

    /// Create an Iute point-of-sale financing order. Unlike the bank partners, Iute keys the
    /// order by a caller-synthesized code, needs only a phone and an amount, and confirms or
    /// cancels asynchronously via webhook.
    pub async fn submit_iute_order(
        &self,
        order_id: OrderId,
        phone: Option<String>,
        amount: Option<cpg_common::Money>,
        manager: &ManagerInfo,
    ) -> Result<IuteSubmissionOutcome, CreditFlowError> {
        info!("📮️ Submitting Iute order for {order_id}");
        let _permit = self.guard.acquire(order_id).ok_or(CreditFlowError::DuplicateSubmission(order_id))?;

        let order = self
            .crm
            .fetch_order(order_id)
            .await?
            .ok_or(CreditFlowError::OrderNotFound(order_id))?;
        if let Some(existing) = &order.application_id {
            return Err(CreditFlowError::ApplicationExists(order_id, existing.clone()));
        }
        let amount = amount.unwrap_or(order.total);
        let phone = phone
            .or_else(|| order.phone.clone())
            .ok_or_else(|| CreditFlowError::Validation("Телефон клиента не указан в заказе".to_string()))?;

        let application_id = ApplicationId::from(format!("CRM-{}", order_id.value()));
        let request = SubmissionRequest {
            provider: CreditProvider::Iute,
            idnp: String::new(),
            first_name: order.first_name.clone().unwrap_or_default(),
            last_name: order.last_name.clone().unwrap_or_default(),
            birth_date: String::new(),
            phone: format_phone_e164(&phone),
            amount,
            term: 0,
            product: ProductSelector::None,
            goods_name: String::new(),
            order_reference: application_id.to_string(),
            comment: None,
            first_installment_date: None,
            currency: cpg_common::MDL_CURRENCY_CODE.to_string(),
            files: Vec::new(),
            goods: order.goods.clone(),
        };

        let ack = self.partners.submit_pos_order(&request).await?;
        self.crm
            .link_application(order_id, &application_id, CreditProvider::Iute, order.site.as_deref())
            .await?;

        if let Some(crm_status) = self.adapters.for_provider(CreditProvider::Iute).map_status(&ack.status) {
            if let Some(payment) = &order.payment {
                self.crm
                    .update_payment_status(order_id, &payment.id, crm_status, order.site.as_deref())
                    .await?;
            }
        }

        self.db
            .upsert_feed_item(&NewFeedItem {
                order_id,
                order_number: order.number.clone(),
                application_id: application_id.clone(),
                credit_company: CreditProvider::Iute,
                customer_name: order.customer_name(),
                bank_status: ack.status.clone(),
                crm_status: order.payment.as_ref().and_then(|p| p.status.clone()),
                payment_type: order.payment.as_ref().map(|p| p.kind.clone()),
                order_status: order.status.clone(),
                manager_id: order.manager_id,
                order_created_at: order.created_at,
                ..Default::default()
            })
            .await?;

        let details = if ack.myiute_customer {
            "Клиент MyIute"
        } else {
            "Клиент не в MyIute, отправлено SMS"
        };
        let entry = NewStatusEntry::bank(application_id.clone(), None, ack.status.clone(), StatusSource::Api)
            .with_details(details)
            .with_manager(manager.manager_id, manager.manager_name.clone());
        if let Err(e) = self.db.append_status_history(&entry).await {
            error!("📮️ Could not record Iute submission history for [{application_id}]: {e}");
        }

        info!("📮️ Iute order [{application_id}] created with status {}", ack.status);
        Ok(IuteSubmissionOutcome {
            order_id,
            application_id,
            status: ack.status,
            myiute_customer: ack.myiute_customer,
            message: ack.message,
        })
    }

    /// Record the application reference in the CRM, advance the credit payment to `credit-check`
    /// and write the corresponding history row.
    ///
    /// The CRM linkage write is the one persistence step that must not fail quietly: the bank
    /// already holds a live application, and losing the reference would orphan it.
    async fn record_linkage(
        &self,
        order: &CrmOrder,
        application_id: &ApplicationId,
        provider: CreditProvider,
        payment: &CreditPayment,
        manager: &ManagerInfo,
    ) -> Result<(), CreditFlowError> {
        self.crm
            .link_application(order.id, application_id, provider, order.site.as_deref())
            .await?;
        self.crm
            .update_payment_status(order.id, &payment.id, CrmStatus::CreditCheck, order.site.as_deref())
            .await?;
        let entry = NewStatusEntry::crm(
            application_id.clone(),
            payment.status.clone(),
            CrmStatus::CreditCheck.as_str(),
            StatusSource::Api,
        )
        .with_details("Application submitted")
        .with_manager(manager.manager_id, manager.manager_name.clone());
        if let Err(e) = self.db.append_status_history(&entry).await {
            error!("📮️ Could not record submission history for [{application_id}]: {e}");
        }
        Ok(())
    }

    /// Keep an audit copy of what was actually sent to the partner. Failure to save it does not
    /// fail the submission; the application itself is already recorded.
    async fn save_audit_copy(
        &self,
        order_id: OrderId,
        application_id: &ApplicationId,
        provider: CreditProvider,
        request: &SubmissionRequest,
    ) {
        let request_data = match serde_json::to_value(request) {
            Ok(v) => v,
            Err(e) => {
                error!("📮️ Could not serialize the audit copy for [{application_id}]: {e}");
                return;
            },
        };
        let audit = NewApplicationRequest {
            application_id: application_id.clone(),
            order_id,
            credit_company: provider,
            request_data,
            files_count: request.files.len() as i64,
            file_names: request.file_names(),
        };
        if let Err(e) = self.db.save_application_request(&audit).await {
            error!("📮️ Could not save the application request for [{application_id}]: {e}");
        }
    }
}

/// Field checks in the order managers expect them reported, each with a message specific to the
/// missing field. Names must be Latin-script: the banks reject Cyrillic outright, so the check
/// runs before any partner call.
fn validate_personal_fields(order: &CrmOrder) -> Result<(), CreditFlowError> {
    if let Some(existing) = &order.application_id {
        return Err(CreditFlowError::ApplicationExists(order.id, existing.clone()));
    }
    if order.idnp.as_deref().map(str::trim).unwrap_or_default().is_empty() {
        return Err(CreditFlowError::Validation("Не указан IDNP клиента".to_string()));
    }
    let name = order.first_name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(CreditFlowError::Validation("Не указано имя клиента".to_string()));
    }
    if contains_cyrillic(name) {
        return Err(CreditFlowError::Validation("Имя должно быть на латинице".to_string()));
    }
    let surname = order.last_name.as_deref().map(str::trim).unwrap_or_default();
    if surname.is_empty() {
        return Err(CreditFlowError::Validation("Не указана фамилия клиента".to_string()));
    }
    if contains_cyrillic(surname) {
        return Err(CreditFlowError::Validation("Фамилия должна быть на латинице".to_string()));
    }
    if order.birthday.as_deref().map(str::trim).unwrap_or_default().is_empty() {
        return Err(CreditFlowError::Validation("Не указана дата рождения клиента".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::CreditPayment;

    fn valid_order() -> CrmOrder {
        CrmOrder {
            id: OrderId(1),
            idnp: Some("2004012345678".into()),
            first_name: Some("Ion".into()),
            last_name: Some("Popescu".into()),
            birthday: Some("05.03.1990".into()),
            payment: Some(CreditPayment {
                id: "77".into(),
                kind: "credit".into(),
                amount: cpg_common::Money::from_lei(5000),
                status: Some("not-paid".into()),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn validation_passes_for_a_complete_order() {
        assert!(validate_personal_fields(&valid_order()).is_ok());
    }

    #[test]
    fn cyrillic_names_are_rejected() {
        let mut order = valid_order();
        order.first_name = Some("Иван".into());
        let err = validate_personal_fields(&order).unwrap_err();
        assert!(err.to_string().contains("латинице"));
    }

    #[test]
    fn each_missing_field_gets_its_own_message() {
        let mut order = valid_order();
        order.idnp = None;
        assert!(validate_personal_fields(&order).unwrap_err().to_string().contains("IDNP"));

        let mut order = valid_order();
        order.last_name = Some("  ".into());
        assert!(validate_personal_fields(&order).unwrap_err().to_string().contains("фамилия"));

        let mut order = valid_order();
        order.birthday = None;
        assert!(validate_personal_fields(&order).unwrap_err().to_string().contains("дата рождения"));
    }

    #[test]
    fn existing_application_blocks_resubmission() {
        let mut order = valid_order();
        order.application_id = Some(ApplicationId::from("A-100"));
        assert!(matches!(
            validate_personal_fields(&order).unwrap_err(),
            CreditFlowError::ApplicationExists(_, _)
        ));
    }
}

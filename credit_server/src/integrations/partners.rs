use chrono::Utc;
use cpg_common::Money;
use credit_engine::{
    db_types::{ApplicationId, BankSnapshot, CreditProvider, FileBlob},
    traits::{
        PartnerMessage,
        PosOrderAck,
        ProductSelector,
        ProviderGateway,
        ProviderGatewayError,
        SubmissionRequest,
    },
};
use partner_tools::{
    EasyCreditApi,
    FileAttachment,
    IuteApi,
    IuteItem,
    IuteMerchant,
    IuteOrderRequest,
    MicroinvestApi,
    MicroinvestApplication,
    PartnerApiError,
};
use serde_json::json;

/// One [`ProviderGateway`] fronting all configured partners, dispatching on the provider tag.
/// Adding a partner means adding a client field and one arm per method.
#[derive(Clone)]
pub struct PartnerClients {
    microinvest: MicroinvestApi,
    easycredit: EasyCreditApi,
    iute: IuteApi,
}

impl PartnerClients {
    pub fn new(microinvest: MicroinvestApi, easycredit: EasyCreditApi, iute: IuteApi) -> Self {
        Self { microinvest, easycredit, iute }
    }
}

fn gateway_error(provider: CreditProvider, e: PartnerApiError) -> ProviderGatewayError {
    match e {
        PartnerApiError::PartnerMessage(m) => ProviderGatewayError::PartnerMessage(m),
        PartnerApiError::MissingReference => ProviderGatewayError::MissingReference(provider),
        PartnerApiError::JsonError(m) | PartnerApiError::ResponseError(m) => {
            ProviderGatewayError::Decode(provider, m)
        },
        other => ProviderGatewayError::Transport(provider, other.to_string()),
    }
}

fn unsupported(provider: CreditProvider, what: &str) -> ProviderGatewayError {
    ProviderGatewayError::Unsupported(provider, what.to_string())
}

fn to_attachments(files: &[FileBlob]) -> Vec<FileAttachment> {
    files.iter().map(|f| FileAttachment { name: f.name.clone(), data: f.data.clone() }).collect()
}

impl ProviderGateway for PartnerClients {
    async fn submit_application(&self, request: &SubmissionRequest) -> Result<ApplicationId, ProviderGatewayError> {
        match request.provider {
            CreditProvider::Microinvest => {
                let ProductSelector::LoanProduct(product_id) = &request.product else {
                    return Err(ProviderGatewayError::Decode(
                        CreditProvider::Microinvest,
                        "submission without a loan product id".to_string(),
                    ));
                };
                let application = MicroinvestApplication {
                    idnp: request.idnp.clone(),
                    name: request.first_name.clone(),
                    surname: request.last_name.clone(),
                    birth_date: request.birth_date.clone(),
                    phone_cell: request.phone.clone(),
                    agreement_loan_history_pd: true,
                    marketing_agreement: true,
                    loan_product_id: product_id.clone(),
                    loan_term: request.term.to_string(),
                    amount: request.amount.to_lei_string(),
                    comment: request.comment.clone().unwrap_or_default(),
                    file_attachment_set: to_attachments(&request.files),
                };
                let response = self
                    .microinvest
                    .import_loan_application(&application)
                    .await
                    .map_err(|e| gateway_error(CreditProvider::Microinvest, e))?;
                response
                    .application_id
                    .map(ApplicationId::from)
                    .ok_or(ProviderGatewayError::MissingReference(CreditProvider::Microinvest))
            },
            CreditProvider::EasyCredit => {
                let ProductSelector::ProductCode(code) = &request.product else {
                    return Err(ProviderGatewayError::Decode(
                        CreditProvider::EasyCredit,
                        "submission without a product code".to_string(),
                    ));
                };
                let payload = json!({
                    "Product": code,
                    "UIN": request.idnp,
                    "ApDateOfBirth": request.birth_date,
                    "ApFirstName": request.first_name,
                    "ApLastName": request.last_name,
                    "CaMobile": request.phone,
                    "GoodsName": request.goods_name,
                    "CreditAmount": request.amount.to_mdl(),
                    "NumberOfInstallments": request.term,
                    "FirstInstallmentDate": request.first_installment_date,
                });
                let ack = self
                    .easycredit
                    .create_request(payload)
                    .await
                    .map_err(|e| gateway_error(CreditProvider::EasyCredit, e))?;
                match (ack.status.as_deref(), ack.urn) {
                    (Some("OK"), Some(urn)) => Ok(ApplicationId::from(urn)),
                    (Some(status), _) => Err(ProviderGatewayError::PartnerMessage(status.to_string())),
                    (None, _) => Err(ProviderGatewayError::PartnerMessage("No URN in response".to_string())),
                }
            },
            CreditProvider::Iute => Err(unsupported(CreditProvider::Iute, "bank-style application submission")),
        }
    }

    async fn submit_pos_order(&self, request: &SubmissionRequest) -> Result<PosOrderAck, ProviderGatewayError> {
        if request.provider != CreditProvider::Iute {
            return Err(unsupported(request.provider, "point-of-sale order creation"));
        }
        let config = self.iute.config();
        let order = IuteOrderRequest {
            myiute_phone: request.phone.clone(),
            order_id: request.order_reference.clone(),
            total_amount: request.amount.to_mdl(),
            currency: request.currency.clone(),
            merchant: IuteMerchant {
                pos_identifier: config.pos_id.clone(),
                salesman_identifier: config.salesman_id.clone(),
                user_confirmation_url: format!("{}/api/iute/confirm", config.webhook_base_url),
                user_cancel_url: format!("{}/api/iute/cancel", config.webhook_base_url),
            },
            items: request
                .goods
                .iter()
                .map(|g| IuteItem {
                    display_name: g.name.clone(),
                    id: g.id.clone(),
                    sku: g.sku.clone(),
                    unit_price: g.price.to_mdl(),
                    qty: g.quantity,
                    item_image_url: g.image_url.clone(),
                    item_url: g.url.clone(),
                })
                .collect(),
        };
        let ack = self
            .iute
            .create_order(&order)
            .await
            .map_err(|e| gateway_error(CreditProvider::Iute, e))?;
        Ok(PosOrderAck {
            status: ack.status.unwrap_or_else(|| "UNKNOWN".to_string()),
            myiute_customer: ack.myiute_customer,
            message: ack.message,
        })
    }

    async fn fetch_status(
        &self,
        provider: CreditProvider,
        application_id: &ApplicationId,
    ) -> Result<Option<BankSnapshot>, ProviderGatewayError> {
        match provider {
            CreditProvider::Microinvest => {
                let status = self
                    .microinvest
                    .check_application_status(application_id.as_str())
                    .await
                    .map_err(|e| gateway_error(provider, e))?;
                Ok(status.and_then(|s| {
                    let raw_status = s.status?;
                    Some(BankSnapshot {
                        raw_status,
                        document_status: None,
                        approved_amount: s.amount.map(Money::from_mdl),
                        approved_term: s.loan_term,
                        approved_product_id: s.loan_product_id,
                        message: None,
                    })
                }))
            },
            CreditProvider::EasyCredit => {
                let status = self
                    .easycredit
                    .check_status(application_id.as_str())
                    .await
                    .map_err(|e| gateway_error(provider, e))?;
                Ok(status.and_then(|s| {
                    if s.status.as_deref() != Some("OK") {
                        return None;
                    }
                    let raw_status = s.request_status?;
                    Some(BankSnapshot {
                        raw_status,
                        document_status: s.document_status,
                        approved_amount: s.loan_amount.map(Money::from_mdl),
                        approved_term: s.installments,
                        approved_product_id: None,
                        message: s.message,
                    })
                }))
            },
            CreditProvider::Iute => {
                let status = self
                    .iute
                    .get_order_status(application_id.as_str())
                    .await
                    .map_err(|e| gateway_error(provider, e))?;
                Ok(status.and_then(|s| {
                    let raw_status = s.status?;
                    Some(BankSnapshot { raw_status, ..Default::default() })
                }))
            },
        }
    }

    async fn upload_files(
        &self,
        provider: CreditProvider,
        application_id: &ApplicationId,
        files: &[FileBlob],
    ) -> Result<(), ProviderGatewayError> {
        match provider {
            CreditProvider::Microinvest => self
                .microinvest
                .send_contracts(application_id.as_str(), &to_attachments(files))
                .await
                .map_err(|e| gateway_error(provider, e)),
            CreditProvider::EasyCredit => self
                .easycredit
                .upload_files(application_id.as_str(), &to_attachments(files))
                .await
                .map_err(|e| gateway_error(provider, e)),
            CreditProvider::Iute => Err(unsupported(provider, "file upload")),
        }
    }

    async fn fetch_contracts(
        &self,
        provider: CreditProvider,
        application_id: &ApplicationId,
    ) -> Result<Vec<FileBlob>, ProviderGatewayError> {
        match provider {
            CreditProvider::Microinvest => {
                let contracts = self
                    .microinvest
                    .get_contracts(application_id.as_str())
                    .await
                    .map_err(|e| gateway_error(provider, e))?;
                Ok(contracts
                    .file_attachment_set
                    .into_iter()
                    .map(|f| FileBlob { name: f.name, data: f.data })
                    .collect())
            },
            CreditProvider::EasyCredit => {
                let contract = self
                    .easycredit
                    .get_contract(application_id.as_str(), "RO")
                    .await
                    .map_err(|e| gateway_error(provider, e))?;
                Ok(contract
                    .and_then(|c| c.doc_type_a)
                    .map(|data| {
                        vec![FileBlob { name: format!("contract_{application_id}.pdf"), data }]
                    })
                    .unwrap_or_default())
            },
            CreditProvider::Iute => Err(unsupported(provider, "contract download")),
        }
    }

    async fn refuse_application(
        &self,
        provider: CreditProvider,
        application_id: &ApplicationId,
        reason: Option<&str>,
    ) -> Result<(), ProviderGatewayError> {
        match provider {
            CreditProvider::Microinvest => self
                .microinvest
                .send_refuse_request(application_id.as_str(), reason)
                .await
                .map_err(|e| gateway_error(provider, e)),
            CreditProvider::EasyCredit => self
                .easycredit
                .cancel_request(application_id.as_str())
                .await
                .map_err(|e| gateway_error(provider, e)),
            CreditProvider::Iute => self
                .iute
                .withdraw_order(application_id.as_str())
                .await
                .map_err(|e| gateway_error(provider, e)),
        }
    }

    async fn send_message(
        &self,
        provider: CreditProvider,
        application_id: &ApplicationId,
        text: &str,
        _files: Option<&[FileBlob]>,
    ) -> Result<(), ProviderGatewayError> {
        match provider {
            // The partner's chat endpoint takes text only; attachments go through the contract
            // upload channel instead.
            CreditProvider::Microinvest => self
                .microinvest
                .send_message(application_id.as_str(), text)
                .await
                .map_err(|e| gateway_error(provider, e)),
            other => Err(unsupported(other, "chat messages")),
        }
    }

    async fn fetch_messages(
        &self,
        provider: CreditProvider,
        application_id: &ApplicationId,
        new_only: bool,
    ) -> Result<Vec<PartnerMessage>, ProviderGatewayError> {
        match provider {
            CreditProvider::Microinvest => {
                let messages = self
                    .microinvest
                    .get_messages(application_id.as_str(), new_only)
                    .await
                    .map_err(|e| gateway_error(provider, e))?;
                Ok(messages
                    .message_set
                    .into_iter()
                    .map(|m| PartnerMessage {
                        date: m.date,
                        sender_id: m.sender_id,
                        sender_name: m.sender_name,
                        text: m.text.unwrap_or_default(),
                        manager_id: None,
                        manager_name: None,
                    })
                    .collect())
            },
            CreditProvider::EasyCredit => {
                // Easy Credit has no chat; the bank pushes one-way comments through the status
                // response's Message field.
                let status = self
                    .easycredit
                    .check_status(application_id.as_str())
                    .await
                    .map_err(|e| gateway_error(provider, e))?;
                let message = status.and_then(|s| s.message).filter(|m| {
                    let trimmed = m.trim();
                    !trimmed.is_empty() && trimmed != "#"
                });
                Ok(message
                    .map(|text| {
                        vec![PartnerMessage {
                            date: Some(Utc::now().to_rfc3339()),
                            sender_id: Some("easycredit".to_string()),
                            sender_name: Some("Easy Credit".to_string()),
                            text,
                            manager_id: None,
                            manager_name: None,
                        }]
                    })
                    .unwrap_or_default())
            },
            CreditProvider::Iute => Err(unsupported(provider, "chat messages")),
        }
    }
}

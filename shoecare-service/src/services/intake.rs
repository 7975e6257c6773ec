//! Order intake: one service request becomes a customer (resolved or
//! created), N line items, a transaction, and optionally an initial payment,
//! written as a single atomic unit. Nothing persists if any step fails.

use mongodb::bson::DateTime;
use service_core::error::AppError;
use std::collections::BTreeSet;
use std::sync::Arc;
use validator::Validate;

use crate::dtos::CreateServiceRequest;
use crate::models::{
    line_item::STATUS_QUEUED, Customer, LineItem, Location, Payment, ServiceLine, Transaction,
};
use crate::services::broadcaster::RealtimeHub;
use crate::services::catalog::{Branch, CatalogApi};
use crate::services::metrics::record_order_created;
use crate::services::repository::LedgerRepository;
use crate::services::sequence::{derive_line_item_id, SequenceAllocator};

#[derive(Clone)]
pub struct OrderIntake {
    repository: LedgerRepository,
    sequences: SequenceAllocator,
    catalog: Arc<dyn CatalogApi>,
    hub: RealtimeHub,
}

pub struct CreatedOrder {
    pub customer: Customer,
    pub line_items: Vec<LineItem>,
    pub transaction: Transaction,
}

impl OrderIntake {
    pub fn new(
        repository: LedgerRepository,
        sequences: SequenceAllocator,
        catalog: Arc<dyn CatalogApi>,
        hub: RealtimeHub,
    ) -> Self {
        Self {
            repository,
            sequences,
            catalog,
            hub,
        }
    }

    pub async fn create_order(&self, input: CreateServiceRequest) -> Result<CreatedOrder, AppError> {
        input.validate()?;
        if input.amount_paid > 0.0 && input.payment_mode.is_none() {
            return Err(AppError::Validation(vec![
                "payment_mode: required when amount_paid > 0".to_string(),
            ]));
        }

        // Batch existence check; any unknown id aborts the whole order.
        let service_ids: Vec<String> = input
            .line_items
            .iter()
            .flat_map(|item| item.services.iter().map(|s| s.service_id.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let invalid = self.catalog.verify_services(&service_ids).await?;
        if !invalid.is_empty() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "unknown service ids: {}",
                invalid.join(", ")
            )));
        }

        let branch = self
            .catalog
            .branch(&input.branch_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("branch not found: {}", input.branch_id))
            })?;

        let mut session = self.repository.start_txn_session().await?;
        let order = match self.write_order(&mut session, &input, &branch).await {
            Ok(order) => {
                LedgerRepository::commit_with_retry(&mut session).await?;
                order
            }
            Err(err) => {
                session.abort_transaction().await.ok();
                return Err(err);
            }
        };

        record_order_created(&branch.branch_code, order.line_items.len());
        tracing::info!(
            transaction_id = %order.transaction.transaction_id,
            cust_id = %order.customer.cust_id,
            pairs = order.line_items.len(),
            amount_paid = order.transaction.amount_paid,
            "order created"
        );

        // Immediate-emit fast path for the rows just written; the durable
        // subscription will deliver the same rows again shortly, in the same
        // envelope, so subscribers can dedupe on document id.
        for item in &order.line_items {
            if let Ok(document) = serde_json::to_value(item) {
                self.hub.emit(
                    "lineItemUpdated",
                    serde_json::json!({ "operation": "insert", "document": document }),
                );
            }
        }

        Ok(order)
    }

    async fn write_order(
        &self,
        session: &mut mongodb::ClientSession,
        input: &CreateServiceRequest,
        branch: &Branch,
    ) -> Result<CreatedOrder, AppError> {
        let now = DateTime::now();

        // Resolve or create the customer by its (name, birthdate) identity.
        let customer = match self
            .repository
            .find_customer_by_identity(
                session,
                &input.first_name,
                &input.last_name,
                &input.birthdate,
            )
            .await?
        {
            Some(existing) => existing,
            None => {
                let cust_id = self.sequences.next_customer_id(branch.branch_number).await?;
                let customer = Customer {
                    cust_id,
                    first_name: input.first_name.clone(),
                    last_name: input.last_name.clone(),
                    birthdate: input.birthdate.clone(),
                    contact_number: input.contact_number.clone(),
                    email: input.email.clone(),
                    branch_id: input.branch_id.clone(),
                    total_services: 0,
                    total_expenditure: 0.0,
                    date_registered: now,
                };
                self.repository.insert_customer(session, &customer).await?;
                customer
            }
        };

        let transaction_id = self
            .sequences
            .next_transaction_id(&branch.branch_code)
            .await?;

        let mut line_items = Vec::with_capacity(input.line_items.len());
        for (index, spec) in input.line_items.iter().enumerate() {
            let line_item_id = derive_line_item_id(&transaction_id, index)?;
            let item = LineItem {
                line_item_id,
                transaction_id: transaction_id.clone(),
                cust_id: customer.cust_id.clone(),
                branch_id: input.branch_id.clone(),
                shoe_description: spec.shoe_description.clone(),
                services: spec
                    .services
                    .iter()
                    .map(|s| ServiceLine {
                        service_id: s.service_id.clone(),
                        quantity: s.quantity,
                    })
                    .collect(),
                priority: spec.priority,
                storage_fee: spec.storage_fee.unwrap_or(0.0),
                current_location: spec.current_location.unwrap_or(Location::Branch),
                current_status: STATUS_QUEUED.to_string(),
                due_date: spec.due_date.map(DateTime::from_chrono),
                latest_update: now,
                before_img: None,
                after_img: None,
                pick_up_notice: None,
            };
            self.repository.insert_line_item(session, &item).await?;
            line_items.push(item);
        }

        let amount_paid = input.amount_paid.min(input.total_amount);
        let mut payments = Vec::new();
        let mut payment_mode = String::new();
        if amount_paid > 0.0 {
            // Checked before the session opened: a positive initial payment
            // carries a mode.
            let mode = input.payment_mode.ok_or_else(|| {
                AppError::Validation(vec![
                    "payment_mode: required when amount_paid > 0".to_string(),
                ])
            })?;
            let payment_id = self.sequences.next_payment_id(&branch.branch_code).await?;
            let payment = Payment {
                payment_id: payment_id.clone(),
                transaction_id: transaction_id.clone(),
                payment_amount: amount_paid,
                payment_mode: mode,
                payment_date: now,
            };
            self.repository.insert_payment(session, &payment).await?;
            payments.push(payment_id);
            payment_mode = mode.as_str().to_string();
        }

        let transaction = Transaction {
            transaction_id,
            line_item_ids: line_items.iter().map(|i| i.line_item_id.clone()).collect(),
            cust_id: customer.cust_id.clone(),
            branch_id: input.branch_id.clone(),
            received_by: input.received_by.clone(),
            no_pairs: line_items.len() as i64,
            no_released: 0,
            total_amount: input.total_amount,
            discount_amount: input.discount_amount,
            amount_paid,
            payment_status: input.payment_status,
            payments,
            payment_mode,
            date_in: now,
            date_out: None,
            version: 0,
        };
        self.repository
            .insert_transaction(session, &transaction)
            .await?;

        Ok(CreatedOrder {
            customer,
            line_items,
            transaction,
        })
    }
}

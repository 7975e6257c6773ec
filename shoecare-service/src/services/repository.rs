use futures::TryStreamExt;
use mongodb::bson::{doc, DateTime, Document};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument, TransactionOptions,
};
use mongodb::{error::UNKNOWN_TRANSACTION_COMMIT_RESULT, Client, ClientSession, Collection,
    Database, IndexModel};
use service_core::error::AppError;

use crate::models::{line_item::STATUS_PICKED_UP, Customer, LineItem, Payment, Transaction};

/// Durable record storage for the four ledger entity types. Human-readable
/// identifiers are stored as `_id`, so the uniqueness backstop for the
/// allocator is the primary index itself.
#[derive(Clone)]
pub struct LedgerRepository {
    client: Client,
    customers: Collection<Customer>,
    transactions: Collection<Transaction>,
    line_items: Collection<LineItem>,
    payments: Collection<Payment>,
}

impl LedgerRepository {
    pub fn new(client: &Client, db: &Database) -> Self {
        Self {
            client: client.clone(),
            customers: db.collection("customers"),
            transactions: db.collection("transactions"),
            line_items: db.collection("line_items"),
            payments: db.collection("payments"),
        }
    }

    /// Initialize lookup indexes. Identity lookups resolve repeat customers;
    /// the parent-reference indexes back the detail and queue endpoints.
    pub async fn init_indexes(&self) -> Result<(), AppError> {
        let identity_index = IndexModel::builder()
            .keys(doc! { "first_name": 1, "last_name": 1, "birthdate": 1 })
            .options(
                IndexOptions::builder()
                    .name("customer_identity_idx".to_string())
                    .build(),
            )
            .build();
        self.customers.create_index(identity_index, None).await?;

        let parent_index = IndexModel::builder()
            .keys(doc! { "transaction_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("line_item_parent_idx".to_string())
                    .build(),
            )
            .build();
        let queue_index = IndexModel::builder()
            .keys(doc! { "branch_id": 1, "current_status": 1 })
            .options(
                IndexOptions::builder()
                    .name("line_item_queue_idx".to_string())
                    .build(),
            )
            .build();
        self.line_items
            .create_indexes([parent_index, queue_index], None)
            .await?;

        let payment_parent_index = IndexModel::builder()
            .keys(doc! { "transaction_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("payment_parent_idx".to_string())
                    .build(),
            )
            .build();
        self.payments
            .create_index(payment_parent_index, None)
            .await?;

        tracing::info!("Ledger indexes initialized");
        Ok(())
    }

    /// Open a causally consistent session with a transaction already started.
    /// Every write of an atomic unit must go through this session.
    pub async fn start_txn_session(&self) -> Result<ClientSession, AppError> {
        let mut session = self.client.start_session(None).await?;
        session
            .start_transaction(TransactionOptions::default())
            .await?;
        Ok(session)
    }

    /// Commit, retrying while the outcome of the commit itself is unknown.
    pub async fn commit_with_retry(session: &mut ClientSession) -> Result<(), AppError> {
        loop {
            match session.commit_transaction().await {
                Ok(()) => return Ok(()),
                Err(err) if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) => {
                    tracing::warn!("commit outcome unknown, retrying");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    // ---- customers ----

    pub async fn find_customer_by_identity(
        &self,
        session: &mut ClientSession,
        first_name: &str,
        last_name: &str,
        birthdate: &str,
    ) -> Result<Option<Customer>, AppError> {
        let filter = doc! {
            "first_name": first_name,
            "last_name": last_name,
            "birthdate": birthdate,
        };
        Ok(self
            .customers
            .find_one_with_session(filter, None, session)
            .await?)
    }

    pub async fn insert_customer(
        &self,
        session: &mut ClientSession,
        customer: &Customer,
    ) -> Result<(), AppError> {
        self.customers
            .insert_one_with_session(customer, None, session)
            .await?;
        Ok(())
    }

    pub async fn find_customer(&self, cust_id: &str) -> Result<Option<Customer>, AppError> {
        Ok(self.customers.find_one(doc! { "_id": cust_id }, None).await?)
    }

    /// Accrue pickup totals: one service and the full transaction total per
    /// release event.
    pub async fn bump_customer_totals(
        &self,
        session: &mut ClientSession,
        cust_id: &str,
        expenditure: f64,
    ) -> Result<(), AppError> {
        let update = doc! {
            "$inc": { "total_services": 1_i64, "total_expenditure": expenditure }
        };
        self.customers
            .update_one_with_session(doc! { "_id": cust_id }, update, None, session)
            .await?;
        Ok(())
    }

    // ---- transactions ----

    pub async fn insert_transaction(
        &self,
        session: &mut ClientSession,
        transaction: &Transaction,
    ) -> Result<(), AppError> {
        self.transactions
            .insert_one_with_session(transaction, None, session)
            .await?;
        Ok(())
    }

    pub async fn find_transaction(&self, id: &str) -> Result<Option<Transaction>, AppError> {
        Ok(self.transactions.find_one(doc! { "_id": id }, None).await?)
    }

    pub async fn find_transaction_in_session(
        &self,
        session: &mut ClientSession,
        id: &str,
    ) -> Result<Option<Transaction>, AppError> {
        Ok(self
            .transactions
            .find_one_with_session(doc! { "_id": id }, None, session)
            .await?)
    }

    /// Versioned write for the payment ledger: matches only when nobody else
    /// committed since our read. Returns false on a version miss.
    pub async fn update_transaction_versioned(
        &self,
        session: &mut ClientSession,
        id: &str,
        version: i64,
        set: Document,
    ) -> Result<bool, AppError> {
        let filter = doc! { "_id": id, "version": version };
        let update = doc! { "$set": set, "$inc": { "version": 1_i64 } };
        let result = self
            .transactions
            .update_one_with_session(filter, update, None, session)
            .await?;
        Ok(result.matched_count == 1)
    }

    /// Direct field patch for `PUT /transactions/:id`; the caller has already
    /// stripped restricted fields.
    pub async fn patch_transaction(
        &self,
        id: &str,
        set: Document,
    ) -> Result<Option<Transaction>, AppError> {
        if set.is_empty() {
            return self.find_transaction(id).await;
        }
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .transactions
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set }, options)
            .await?)
    }

    pub async fn delete_transaction(&self, id: &str) -> Result<bool, AppError> {
        let result = self.transactions.delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count == 1)
    }

    // ---- line items ----

    pub async fn insert_line_item(
        &self,
        session: &mut ClientSession,
        item: &LineItem,
    ) -> Result<(), AppError> {
        self.line_items
            .insert_one_with_session(item, None, session)
            .await?;
        Ok(())
    }

    pub async fn find_line_item(&self, id: &str) -> Result<Option<LineItem>, AppError> {
        Ok(self.line_items.find_one(doc! { "_id": id }, None).await?)
    }

    pub async fn find_line_item_in_session(
        &self,
        session: &mut ClientSession,
        id: &str,
    ) -> Result<Option<LineItem>, AppError> {
        Ok(self
            .line_items
            .find_one_with_session(doc! { "_id": id }, None, session)
            .await?)
    }

    pub async fn line_items_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<LineItem>, AppError> {
        let cursor = self
            .line_items
            .find(doc! { "transaction_id": transaction_id }, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn mark_line_item_picked_up(
        &self,
        session: &mut ClientSession,
        id: &str,
        now: DateTime,
    ) -> Result<(), AppError> {
        let update = doc! {
            "$set": { "current_status": STATUS_PICKED_UP, "latest_update": now }
        };
        self.line_items
            .update_one_with_session(doc! { "_id": id }, update, None, session)
            .await?;
        Ok(())
    }

    /// Workflow patch for `PUT /line-items/:id`. `storage_fee` accumulates via
    /// `$inc`; everything else in `set` replaces the field.
    pub async fn patch_line_item(
        &self,
        id: &str,
        mut set: Document,
        inc_storage_fee: Option<f64>,
    ) -> Result<Option<LineItem>, AppError> {
        set.insert("latest_update", DateTime::now());
        let mut update = doc! { "$set": set };
        if let Some(fee) = inc_storage_fee {
            update.insert("$inc", doc! { "storage_fee": fee });
        }
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .line_items
            .find_one_and_update(doc! { "_id": id }, update, options)
            .await?)
    }

    /// Active-queue listing: everything in the branch that has not been
    /// picked up yet.
    pub async fn active_line_items(&self, branch_id: &str) -> Result<Vec<LineItem>, AppError> {
        let filter = doc! {
            "branch_id": branch_id,
            "current_status": { "$ne": STATUS_PICKED_UP },
        };
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self.line_items.find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }

    // ---- payments ----

    pub async fn insert_payment(
        &self,
        session: &mut ClientSession,
        payment: &Payment,
    ) -> Result<(), AppError> {
        self.payments
            .insert_one_with_session(payment, None, session)
            .await?;
        Ok(())
    }

    pub async fn payments_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<Payment>, AppError> {
        let options = FindOptions::builder()
            .sort(doc! { "payment_date": 1 })
            .build();
        let cursor = self
            .payments
            .find(doc! { "transaction_id": transaction_id }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }
}

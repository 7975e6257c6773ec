use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// A customer, identified by a branch-scoped sequential id and looked up by
/// (name, birthdate) on repeat orders. `total_services` and
/// `total_expenditure` accrue on pickup events.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Customer {
    #[serde(rename = "_id")]
    pub cust_id: String,
    pub first_name: String,
    pub last_name: String,
    /// ISO date string, part of the identity pair with the name.
    pub birthdate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub branch_id: String,
    pub total_services: i64,
    pub total_expenditure: f64,
    pub date_registered: DateTime,
}

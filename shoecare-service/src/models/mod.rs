pub mod customer;
pub mod line_item;
pub mod payment;
pub mod transaction;

pub use customer::Customer;
pub use line_item::{LineItem, Location, Priority, ServiceLine};
pub use payment::{Payment, PaymentMode};
pub use transaction::{append_payment_mode, PaymentStatus, Transaction};

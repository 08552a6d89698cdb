//! Transactions and their coordinator.

mod coordinator;
mod transaction;

pub use coordinator::{TransactionCoordinator, TxHandle};
pub use transaction::{OpKind, Operation, Transaction, TxState, TxSummary};

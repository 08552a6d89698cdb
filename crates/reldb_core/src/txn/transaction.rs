//! Transaction state.

use crate::error::{CoreError, CoreResult};
use crate::store::Snapshot;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// The transaction can execute operations.
    Open,
    /// Commit is in progress.
    Committing,
    /// The transaction has been committed.
    Committed,
    /// The transaction has been aborted.
    Aborted,
}

/// The kind of operation a transaction executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// A read.
    Select,
    /// A count.
    Count,
    /// A row insert.
    Insert,
    /// A row overwrite.
    Update,
    /// A row removal.
    Delete,
}

/// One operation routed through a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// What the operation did.
    pub kind: OpKind,
    /// The table it ran against.
    pub table: String,
}

impl Operation {
    /// Creates an operation record.
    #[must_use]
    pub fn new(kind: OpKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
        }
    }
}

/// An open transaction: the per-table version snapshot taken at open plus
/// the ordered operation logs.
#[derive(Debug)]
pub struct Transaction {
    id: u64,
    snapshot: Snapshot,
    operations: Vec<Operation>,
    executed: Vec<Operation>,
    state: TxState,
    abort_reason: Option<String>,
}

impl Transaction {
    pub(crate) fn new(id: u64, snapshot: Snapshot) -> Self {
        Self {
            id,
            snapshot,
            operations: Vec::new(),
            executed: Vec::new(),
            state: TxState::Open,
            abort_reason: None,
        }
    }

    /// The transaction id. Ids increase monotonically and order commits.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The table→version snapshot captured at open.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> TxState {
        self.state
    }

    /// True while operations may still execute.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == TxState::Open
    }

    /// The abort reason, if the transaction was aborted.
    #[must_use]
    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    /// Operations issued, in order.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Operations that ran to completion, in order. Always a prefix-wise
    /// subset of `operations`.
    #[must_use]
    pub fn executed(&self) -> &[Operation] {
        &self.executed
    }

    /// Appends to the operation log.
    pub(crate) fn begin_op(&mut self, op: Operation) -> CoreResult<()> {
        self.ensure_open()?;
        self.operations.push(op);
        Ok(())
    }

    /// Marks the most recent operation executed.
    pub(crate) fn finish_op(&mut self, op: Operation) {
        self.executed.push(op);
    }

    pub(crate) fn mark_committing(&mut self) {
        self.state = TxState::Committing;
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = TxState::Committed;
    }

    pub(crate) fn mark_aborted(&mut self, reason: impl Into<String>) {
        self.state = TxState::Aborted;
        self.abort_reason = Some(reason.into());
    }

    /// Fails unless the transaction is still open.
    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        match self.state {
            TxState::Open => Ok(()),
            TxState::Aborted => Err(CoreError::transaction_aborted(
                self.abort_reason.clone().unwrap_or_else(|| "aborted".into()),
            )),
            TxState::Committing | TxState::Committed => {
                Err(CoreError::transaction_aborted("transaction already closed"))
            }
        }
    }
}

/// The observable outcome of a closed transaction.
#[derive(Debug, Clone)]
pub struct TxSummary {
    /// Transaction id.
    pub id: u64,
    /// Final state: `Committed` or `Aborted`.
    pub state: TxState,
    /// Abort reason, when aborted.
    pub abort_reason: Option<String>,
    /// Operations issued.
    pub operations: Vec<Operation>,
    /// Operations that ran to completion.
    pub executed: Vec<Operation>,
}

impl TxSummary {
    pub(crate) fn of(txn: &Transaction) -> Self {
        Self {
            id: txn.id,
            state: txn.state,
            abort_reason: txn.abort_reason.clone(),
            operations: txn.operations.clone(),
            executed: txn.executed.clone(),
        }
    }
}

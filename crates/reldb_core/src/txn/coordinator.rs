//! Transaction coordination.

use crate::error::{CoreError, CoreResult};
use crate::store::{Snapshot, TableStore};
use crate::txn::transaction::{Operation, Transaction, TxState, TxSummary};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Coordinates transactions over the table store.
///
/// The model is cooperative: several transactions may be open, but exactly
/// one executes at any instant. [`TransactionCoordinator::execute`] claims
/// the executing slot for the duration of a block; entering it again while
/// claimed fails with `NestedTransaction`.
///
/// Commits defer consolidation while other transactions remain open: the
/// snapshot joins a FIFO queue that is flushed in ascending transaction-id
/// order when the last open transaction closes.
pub struct TransactionCoordinator {
    store: Arc<RwLock<TableStore>>,
    next_txid: AtomicU64,
    state: Mutex<CoordState>,
}

#[derive(Default)]
struct CoordState {
    /// The ambient transaction an `execute` block runs under.
    current: Option<Transaction>,
    /// Ids of all open transactions, ambient and explicit.
    open_ids: Vec<u64>,
    /// Committed snapshots awaiting consolidation, flushed when the last
    /// open transaction closes.
    pending: Vec<(u64, Snapshot)>,
    /// Outcome of the most recently closed ambient transaction.
    last_closed: Option<TxSummary>,
}

impl TransactionCoordinator {
    /// Creates a coordinator over the given store.
    pub fn new(store: Arc<RwLock<TableStore>>) -> Self {
        Self {
            store,
            next_txid: AtomicU64::new(1),
            state: Mutex::new(CoordState::default()),
        }
    }

    /// The shared table store.
    pub fn store(&self) -> &Arc<RwLock<TableStore>> {
        &self.store
    }

    /// Opens an explicit transaction.
    ///
    /// Explicit transactions are driven through [`Self::apply`],
    /// [`Self::commit`] and [`Self::abort`]; they coexist with other open
    /// transactions and exercise the deferred-consolidation path.
    pub fn begin(&self) -> Transaction {
        let id = self.next_txid.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.store.read().versions();
        self.state.lock().open_ids.push(id);
        debug!(txid = id, "transaction opened");
        Transaction::new(id, snapshot)
    }

    /// Runs one operation inside an explicit transaction.
    ///
    /// The operation is appended to the transaction's log and, on
    /// completion, to its executed log. An error rolls the transaction
    /// back to its snapshot and marks it aborted before propagating.
    pub fn apply<T>(
        &self,
        txn: &mut Transaction,
        op: Operation,
        f: impl FnOnce(&mut TableStore) -> CoreResult<T>,
    ) -> CoreResult<T> {
        txn.begin_op(op.clone())?;
        match f(&mut self.store.write()) {
            Ok(value) => {
                txn.finish_op(op);
                Ok(value)
            }
            Err(err) => {
                self.rollback_and_close(txn, err.to_string());
                Err(err)
            }
        }
    }

    /// Commits an explicit transaction.
    ///
    /// If other transactions remain open, consolidation is deferred into
    /// the pending queue; otherwise the queue (and this snapshot) is
    /// flushed in ascending transaction-id order.
    pub fn commit(&self, txn: &mut Transaction) -> CoreResult<()> {
        txn.ensure_open()?;
        txn.mark_committing();
        let mut state = self.state.lock();
        state.pending.push((txn.id(), txn.snapshot().clone()));
        state.open_ids.retain(|&id| id != txn.id());
        self.flush_if_idle(&mut state);
        txn.mark_committed();
        debug!(txid = txn.id(), "transaction committed");
        Ok(())
    }

    /// Aborts an explicit transaction, synchronously rolling the store
    /// back to the transaction's snapshot.
    pub fn abort(&self, txn: &mut Transaction, reason: impl Into<String>) -> CoreResult<()> {
        txn.ensure_open()?;
        self.rollback_and_close(txn, reason.into());
        Ok(())
    }

    /// Runs a block under an ambient transaction.
    ///
    /// Repository operations issued inside the block join the transaction
    /// through [`Self::run_op`]. The transaction commits when the block
    /// returns `Ok`, and rolls back (propagating the error) when it
    /// returns `Err`. An abort through [`TxHandle::abort`] wins over the
    /// block's result.
    pub fn execute<T>(
        &self,
        block: impl FnOnce(&TxHandle<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        {
            let mut state = self.state.lock();
            if state.current.is_some() {
                return Err(CoreError::NestedTransaction);
            }
            let id = self.next_txid.fetch_add(1, Ordering::SeqCst);
            let snapshot = self.store.read().versions();
            state.open_ids.push(id);
            state.current = Some(Transaction::new(id, snapshot));
            debug!(txid = id, "transaction opened");
        }

        let result = block(&TxHandle { coordinator: self });

        let mut state = self.state.lock();
        let mut txn = state.current.take().expect("executing slot claimed");
        match (&result, txn.state()) {
            // Aborted inside the block (explicitly or by a failed
            // operation): the store is already rolled back.
            (_, TxState::Aborted) => {
                state.open_ids.retain(|&id| id != txn.id());
                self.flush_if_idle(&mut state);
            }
            (Ok(_), _) => {
                txn.mark_committing();
                state.pending.push((txn.id(), txn.snapshot().clone()));
                state.open_ids.retain(|&id| id != txn.id());
                self.flush_if_idle(&mut state);
                txn.mark_committed();
                debug!(txid = txn.id(), "transaction committed");
            }
            (Err(err), _) => {
                self.store.write().rollback(txn.snapshot());
                txn.mark_aborted(err.to_string());
                state.open_ids.retain(|&id| id != txn.id());
                self.flush_if_idle(&mut state);
                debug!(txid = txn.id(), "transaction rolled back");
            }
        }
        state.last_closed = Some(TxSummary::of(&txn));
        result
    }

    /// Runs one operation, joining the ambient transaction when one is
    /// executing and auto-committing otherwise.
    pub fn run_op<T>(
        &self,
        op: Operation,
        f: impl FnOnce(&mut TableStore) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut state = self.state.lock();
        if let Some(txn) = state.current.as_mut() {
            txn.begin_op(op.clone())?;
            match f(&mut self.store.write()) {
                Ok(value) => {
                    txn.finish_op(op);
                    Ok(value)
                }
                Err(err) => {
                    // Constraint failures abort the enclosing transaction.
                    self.store.write().rollback(txn.snapshot());
                    txn.mark_aborted(err.to_string());
                    debug!(txid = txn.id(), error = %err, "operation failed, transaction aborted");
                    Err(err)
                }
            }
        } else {
            drop(state);
            self.auto_commit(op, f)
        }
    }

    /// Wraps a single operation in its own transaction.
    fn auto_commit<T>(
        &self,
        op: Operation,
        f: impl FnOnce(&mut TableStore) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut txn = self.begin();
        match self.apply(&mut txn, op, f) {
            Ok(value) => {
                self.commit(&mut txn)?;
                Ok(value)
            }
            // `apply` already rolled back and closed the transaction.
            Err(err) => Err(err),
        }
    }

    /// The outcome of the most recently closed ambient transaction.
    #[must_use]
    pub fn last_transaction(&self) -> Option<TxSummary> {
        self.state.lock().last_closed.clone()
    }

    /// Number of open transactions.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().open_ids.len()
    }

    fn rollback_and_close(&self, txn: &mut Transaction, reason: String) {
        self.store.write().rollback(txn.snapshot());
        txn.mark_aborted(reason);
        let mut state = self.state.lock();
        state.open_ids.retain(|&id| id != txn.id());
        self.flush_if_idle(&mut state);
        debug!(txid = txn.id(), "transaction rolled back");
    }

    /// Flushes the pending-consolidate queue once no transaction remains
    /// open, in ascending transaction-id order.
    fn flush_if_idle(&self, state: &mut CoordState) {
        if !state.open_ids.is_empty() || state.pending.is_empty() {
            return;
        }
        state.pending.sort_by_key(|(id, _)| *id);
        let mut store = self.store.write();
        for (id, snapshot) in state.pending.drain(..) {
            debug!(txid = id, "consolidating");
            store.consolidate(&snapshot);
        }
    }
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("open_count", &self.open_count())
            .finish_non_exhaustive()
    }
}

/// Handle to the ambient transaction inside an `execute` block.
pub struct TxHandle<'a> {
    coordinator: &'a TransactionCoordinator,
}

impl TxHandle<'_> {
    /// The ambient transaction's id.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.coordinator
            .state
            .lock()
            .current
            .as_ref()
            .map(Transaction::id)
    }

    /// Aborts the ambient transaction with a reason.
    ///
    /// The store rolls back synchronously; later operations in the block
    /// fail with `TransactionAborted`, and the block's own result no
    /// longer commits anything.
    pub fn abort(&self, reason: impl Into<String>) -> CoreResult<()> {
        let mut state = self.coordinator.state.lock();
        let txn = state
            .current
            .as_mut()
            .ok_or(CoreError::NestedTransaction)?;
        txn.ensure_open()?;
        self.coordinator.store.write().rollback(txn.snapshot());
        txn.mark_aborted(reason);
        debug!(txid = txn.id(), "transaction aborted by caller");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityDescriptor, FieldDef, FieldType, SchemaRegistry};
    use crate::txn::OpKind;
    use reldb_value::{Id, Record, Value};

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.register(EntityDescriptor::new(
            "Item",
            "item",
            "id",
            vec![
                FieldDef::new("id", FieldType::Int),
                FieldDef::new("name", FieldType::Text),
            ],
        ));
        registry
    }

    fn coordinator() -> (TransactionCoordinator, SchemaRegistry) {
        let store = Arc::new(RwLock::new(TableStore::new()));
        (TransactionCoordinator::new(store), registry())
    }

    fn row(name: &str) -> Record {
        let mut record = Record::new();
        record.set("name", name);
        record
    }

    fn insert(name: &'static str) -> impl FnOnce(&mut TableStore) -> CoreResult<u64> + 'static {
        move |store| {
            let registry = registry();
            store.put(&registry, "item", Id::Int(1), row(name))
        }
    }

    #[test]
    fn execute_commits_on_ok() {
        let (tc, _) = coordinator();
        tc.execute(|_| tc.run_op(Operation::new(OpKind::Insert, "item"), insert("a")))
            .unwrap();
        assert_eq!(tc.store().read().len("item"), 1);
        let summary = tc.last_transaction().unwrap();
        assert_eq!(summary.state, TxState::Committed);
        assert_eq!(summary.executed.len(), 1);
    }

    #[test]
    fn execute_rolls_back_on_error() {
        let (tc, _) = coordinator();
        let result: CoreResult<()> = tc.execute(|_| {
            tc.run_op(Operation::new(OpKind::Insert, "item"), insert("a"))?;
            Err(CoreError::fetch_failed("boom"))
        });
        assert!(result.is_err());
        assert_eq!(tc.store().read().len("item"), 0);
        let summary = tc.last_transaction().unwrap();
        assert_eq!(summary.state, TxState::Aborted);
    }

    #[test]
    fn explicit_abort_inside_block() {
        let (tc, _) = coordinator();
        let result = tc.execute(|tx| {
            tc.run_op(Operation::new(OpKind::Insert, "item"), insert("a"))?;
            tx.abort("Test")?;
            Ok(42)
        });
        // The block itself succeeded; its writes did not.
        assert_eq!(result.unwrap(), 42);
        assert_eq!(tc.store().read().len("item"), 0);
        let summary = tc.last_transaction().unwrap();
        assert_eq!(summary.state, TxState::Aborted);
        assert_eq!(summary.abort_reason.as_deref(), Some("Test"));
    }

    #[test]
    fn operations_after_abort_fail() {
        let (tc, _) = coordinator();
        let result: CoreResult<()> = tc.execute(|tx| {
            tx.abort("Test")?;
            tc.run_op(Operation::new(OpKind::Insert, "item"), insert("a"))
                .map(|_| ())
        });
        match result {
            Err(CoreError::TransactionAborted { reason }) => assert_eq!(reason, "Test"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nested_execute_is_forbidden() {
        let (tc, _) = coordinator();
        let result = tc.execute(|_| tc.execute(|_| Ok(())));
        assert!(matches!(result, Err(CoreError::NestedTransaction)));
    }

    #[test]
    fn auto_commit_outside_transaction() {
        let (tc, _) = coordinator();
        tc.run_op(Operation::new(OpKind::Insert, "item"), insert("a"))
            .unwrap();
        assert_eq!(tc.store().read().len("item"), 1);
        assert_eq!(tc.open_count(), 0);
    }

    #[test]
    fn failed_operation_aborts_enclosing_transaction() {
        let (tc, _) = coordinator();
        let result: CoreResult<()> = tc.execute(|_| {
            tc.run_op(Operation::new(OpKind::Insert, "item"), insert("a"))?;
            tc.run_op(Operation::new(OpKind::Insert, "ghost"), |store| {
                store.put(&registry(), "ghost", Id::Int(1), row("x"))
            })
            .map(|_| ())
        });
        assert!(matches!(result, Err(CoreError::UnknownTable { .. })));
        // The first insert rolled back with the transaction.
        assert_eq!(tc.store().read().len("item"), 0);
    }

    #[test]
    fn overlapping_commits_defer_consolidation() {
        let (tc, registry) = coordinator();

        let mut t1 = tc.begin();
        tc.apply(&mut t1, Operation::new(OpKind::Insert, "item"), |store| {
            store.put(&registry, "item", Id::Int(1), row("a"))
        })
        .unwrap();

        // t2 opens after t1's write and keeps the store busy across t1's
        // commit, so t1's consolidation is deferred.
        let mut t2 = tc.begin();
        tc.commit(&mut t1).unwrap();
        assert_eq!(tc.open_count(), 1);

        tc.apply(&mut t2, Operation::new(OpKind::Insert, "item"), |store| {
            store.put(&registry, "item", Id::Int(2), row("b"))
        })
        .unwrap();
        tc.commit(&mut t2).unwrap();

        assert_eq!(tc.open_count(), 0);
        assert_eq!(tc.store().read().len("item"), 2);
    }

    #[test]
    fn abort_of_last_open_transaction_flushes_queue() {
        let (tc, registry) = coordinator();

        let mut t1 = tc.begin();
        tc.apply(&mut t1, Operation::new(OpKind::Insert, "item"), |store| {
            store.put(&registry, "item", Id::Int(1), row("a"))
        })
        .unwrap();

        let mut t2 = tc.begin();
        tc.commit(&mut t1).unwrap();

        tc.apply(&mut t2, Operation::new(OpKind::Insert, "item"), |store| {
            store.put(&registry, "item", Id::Int(2), row("b"))
        })
        .unwrap();
        tc.abort(&mut t2, "changed my mind").unwrap();

        // t2's write is gone, t1's committed write survives.
        assert_eq!(tc.store().read().len("item"), 1);
        assert!(tc.store().read().get("item", &Id::Int(1)).is_some());
        assert_eq!(t2.abort_reason(), Some("changed my mind"));
    }

    #[test]
    fn commit_after_abort_fails() {
        let (tc, _) = coordinator();
        let mut txn = tc.begin();
        tc.abort(&mut txn, "Test").unwrap();
        assert!(matches!(
            tc.commit(&mut txn),
            Err(CoreError::TransactionAborted { .. })
        ));
    }
}

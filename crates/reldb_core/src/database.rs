//! Database facade.

use crate::adapter::{CompiledQuery, StoreAdapter};
use crate::config::Config;
use crate::entity::Entity;
use crate::error::{ConstraintKind, CoreError, CoreResult};
use crate::repository::Repository;
use crate::resolve::{ResolutionRules, Resolver, StoreResolver};
use crate::schema::SchemaRegistry;
use crate::store::TableStore;
use crate::txn::{OpKind, Operation, TransactionCoordinator, TxHandle, TxSummary};
use parking_lot::{Mutex, RwLock};
use reldb_query::{parse, Cond, Evaluator};
use reldb_value::{Id, Record, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// The in-memory entity store.
///
/// `Database` wires the schema registry, the versioned table store and
/// the transaction coordinator, and implements the backend
/// [`StoreAdapter`] contract the repositories run against.
///
/// ```rust,ignore
/// let db = Database::open(Config::default());
/// db.register::<User>();
/// db.populate()?;
///
/// let users = db.repository::<User>();
/// let id = users.store(&mut user)?;
/// ```
///
/// Handles are cheap to clone and share one store.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    config: Config,
    registry: RwLock<SchemaRegistry>,
    coordinator: TransactionCoordinator,
    /// Condition ASTs cached by query text.
    query_cache: Mutex<HashMap<String, Arc<Cond>>>,
}

impl Database {
    /// Opens an empty store.
    #[must_use]
    pub fn open(config: Config) -> Self {
        let store = Arc::new(RwLock::new(TableStore::new()));
        Self {
            inner: Arc::new(DatabaseInner {
                config,
                registry: RwLock::new(SchemaRegistry::new()),
                coordinator: TransactionCoordinator::new(store),
                query_cache: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Opens an empty store with default configuration.
    #[must_use]
    pub fn open_default() -> Self {
        Self::open(Config::default())
    }

    /// Registers an entity type's schema.
    pub fn register<T: Entity>(&self) {
        self.register_descriptor(T::descriptor().clone());
    }

    /// Registers a schema description directly.
    pub fn register_descriptor(&self, descriptor: crate::schema::EntityDescriptor) {
        info!(entity = %descriptor.entity, table = %descriptor.table, "schema registered");
        if self.inner.config.generate_tables {
            self.inner
                .coordinator
                .store()
                .write()
                .ensure_table(&descriptor.table);
        }
        self.inner.registry.write().register(descriptor);
    }

    /// Inserts the configured seed rows. Call after registering every
    /// entity type the seed rows mention.
    pub fn populate(&self) -> CoreResult<()> {
        let populate = self.inner.config.populate.clone();
        if populate.is_empty() {
            return Ok(());
        }
        self.transaction(|_| {
            let registry = self.inner.registry.read();
            for (table, rows) in &populate {
                info!(table = %table, rows = rows.len(), "populating");
                for row in rows {
                    let row = registry.build_row(table, row)?;
                    self.inner.coordinator.run_op(
                        Operation::new(OpKind::Insert, table.clone()),
                        |store| Resolver::new(&registry).store_record(store, table, row),
                    )?;
                }
            }
            Ok(())
        })
    }

    /// The repository for an entity type, registering its schema on
    /// first use.
    #[must_use]
    pub fn repository<T: Entity>(&self) -> Repository<T> {
        if self
            .inner
            .registry
            .read()
            .descriptor(&T::descriptor().table)
            .is_none()
        {
            self.register::<T>();
        }
        Repository::new(self.clone())
    }

    /// Runs a block under one transaction (see
    /// [`TransactionCoordinator::execute`]).
    pub fn transaction<T>(
        &self,
        block: impl FnOnce(&TxHandle<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        self.inner.coordinator.execute(block)
    }

    /// The outcome of the most recently closed transaction.
    #[must_use]
    pub fn last_transaction(&self) -> Option<TxSummary> {
        self.inner.coordinator.last_transaction()
    }

    /// The transaction coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.inner.coordinator
    }

    /// The schema registry.
    pub(crate) fn registry(&self) -> &RwLock<SchemaRegistry> {
        &self.inner.registry
    }

    /// Parses a condition, caching the AST by its text.
    pub fn cached_cond(&self, text: &str) -> CoreResult<Arc<Cond>> {
        if let Some(cond) = self.inner.query_cache.lock().get(text) {
            return Ok(Arc::clone(cond));
        }
        let cond = Arc::new(parse(text)?);
        self.inner
            .query_cache
            .lock()
            .insert(text.to_string(), Arc::clone(&cond));
        Ok(cond)
    }

    /// Number of live rows in a table.
    #[must_use]
    pub fn table_len(&self, table: &str) -> usize {
        self.inner.coordinator.store().read().len(table)
    }

    /// Rows of `table` matching `query`, in identifier order.
    fn matching_rows(
        registry: &SchemaRegistry,
        store: &TableStore,
        table: &str,
        query: &CompiledQuery,
    ) -> CoreResult<Vec<(Id, Record)>> {
        let rows: Vec<(Id, Record)> = store
            .entries(table)
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        let Some(cond) = &query.cond else {
            return Ok(rows);
        };
        let resolver = StoreResolver { registry, store };
        let evaluator = Evaluator::new(&resolver);
        let mut matched = Vec::new();
        for (id, record) in rows {
            if evaluator.matches(cond, table, &record, &query.params)? {
                matched.push((id, record));
            }
        }
        Ok(matched)
    }
}

impl StoreAdapter for Database {
    fn count(&self, _entity: &str, table: &str, query: &CompiledQuery) -> CoreResult<usize> {
        let registry = self.inner.registry.read();
        self.inner
            .coordinator
            .run_op(Operation::new(OpKind::Count, table), |store| {
                Ok(Self::matching_rows(&registry, store, table, query)?.len())
            })
    }

    fn select(
        &self,
        _entity: &str,
        table: &str,
        query: &CompiledQuery,
        rules: ResolutionRules,
    ) -> CoreResult<Vec<Record>> {
        let registry = self.inner.registry.read();
        self.inner
            .coordinator
            .run_op(Operation::new(OpKind::Select, table), |store| {
                let resolver = Resolver::new(&registry);
                Ok(Self::matching_rows(&registry, store, table, query)?
                    .into_iter()
                    .map(|(_, record)| resolver.materialize(store, table, record, rules))
                    .collect())
            })
    }

    fn insert(&self, _entity: &str, table: &str, record: Record) -> CoreResult<Id> {
        let registry = self.inner.registry.read();
        self.inner
            .coordinator
            .run_op(Operation::new(OpKind::Insert, table), |store| {
                Resolver::new(&registry).store_record(store, table, record)
            })
    }

    fn update(&self, _entity: &str, table: &str, record: Record) -> CoreResult<Id> {
        let registry = self.inner.registry.read();
        let allow_auto_insert = self.inner.config.allow_auto_insert;
        self.inner
            .coordinator
            .run_op(Operation::new(OpKind::Update, table), |store| {
                let id_field = registry
                    .id_field(table)
                    .ok_or_else(|| CoreError::unknown_table(table))?;
                let id = match record.get(id_field) {
                    Some(Value::Id(id)) => id.clone(),
                    Some(Value::Int(n)) => Id::Int(*n),
                    _ => {
                        return Err(CoreError::field_invalid(
                            ConstraintKind::Required,
                            table,
                            id_field,
                            &Value::Null,
                        ))
                    }
                };
                if store.get(table, &id).is_none() && !allow_auto_insert {
                    return Err(CoreError::field_invalid(
                        ConstraintKind::Range,
                        table,
                        id_field,
                        &Value::Id(id),
                    ));
                }
                Resolver::new(&registry).store_record(store, table, record)
            })
    }

    fn delete(&self, _entity: &str, table: &str, query: &CompiledQuery) -> CoreResult<Vec<Record>> {
        let registry = self.inner.registry.read();
        self.inner
            .coordinator
            .run_op(Operation::new(OpKind::Delete, table), |store| {
                let matched = Self::matching_rows(&registry, store, table, query)?;
                let resolver = Resolver::new(&registry);
                let mut deleted = Vec::with_capacity(matched.len());
                for (id, _) in matched {
                    if let Some(record) = resolver.delete_checked(store, table, &id)? {
                        deleted.push(record);
                    }
                }
                Ok(deleted)
            })
    }

    fn delete_cascade(
        &self,
        _entity: &str,
        table: &str,
        id: &Id,
    ) -> CoreResult<Vec<(String, Record)>> {
        self.transaction(|_| {
            let registry = self.inner.registry.read();
            self.inner
                .coordinator
                .run_op(Operation::new(OpKind::Delete, table), |store| {
                    let mut deleted = Vec::new();
                    Resolver::new(&registry).delete_cascade(store, table, id, &mut deleted)?;
                    Ok(deleted)
                })
        })
    }

    fn insert_relationship(&self, rel_table: &str, source: &Id, target: &Id) -> CoreResult<Id> {
        let registry = self.inner.registry.read();
        self.inner
            .coordinator
            .run_op(Operation::new(OpKind::Insert, rel_table), |store| {
                let rel = registry
                    .relationship_by_table(rel_table)
                    .ok_or_else(|| CoreError::unknown_table(rel_table))?;
                // Full-field dedup: an identical row's identifier is
                // reused.
                let existing = store.entries(rel_table).find_map(|(row_id, row)| {
                    let same_source =
                        row.get(&rel.source_column).and_then(Value::as_id) == Some(source);
                    let same_target =
                        row.get(&rel.target_column).and_then(Value::as_id) == Some(target);
                    (same_source && same_target).then(|| row_id.clone())
                });
                if let Some(row_id) = existing {
                    return Ok(row_id);
                }
                let row_id = store.allocate_id(&registry, rel_table)?;
                let mut row = Record::new();
                row.set(rel.source_column.clone(), Value::Id(source.clone()));
                row.set(rel.target_column.clone(), Value::Id(target.clone()));
                store.put(&registry, rel_table, row_id.clone(), row)?;
                Ok(row_id)
            })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("open_transactions", &self.inner.coordinator.open_count())
            .finish_non_exhaustive()
    }
}

//! # RelDB Core
//!
//! In-memory transactional entity store.
//!
//! This crate provides:
//! - Schema registry with foreign-key and relationship-table derivation
//! - Versioned table store with consolidate/rollback
//! - Transaction coordination with snapshot capture and deferred
//!   consolidation
//! - Relationship resolution (read-time materialization, depth-first
//!   nested stores, delete constraints)
//! - Per-type entity repositories
//! - Lazy entity references with fetch hooks

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod config;
mod database;
mod entity;
mod error;
mod pool;
mod reference;
mod repository;
mod resolve;
mod schema;
mod store;
mod txn;

pub use adapter::{CompiledQuery, StoreAdapter};
pub use config::{Config, RemoteConfig};
pub use database::Database;
pub use entity::Entity;
pub use error::{ConstraintKind, CoreError, CoreResult};
pub use pool::{ConnectionFactory, ConnectionPool, PoolConfig, PooledConn};
pub use reference::{EntityRef, EntityRefList, FetchFn};
pub use repository::Repository;
pub use resolve::ResolutionRules;
pub use schema::{EntityDescriptor, FieldDef, FieldType, Reference, Relationship, SchemaRegistry};
pub use store::{Snapshot, TableStore, VersionedTable};
pub use txn::{
    OpKind, Operation, Transaction, TransactionCoordinator, TxHandle, TxState, TxSummary,
};

// The query language and value model are part of the public surface.
pub use reldb_query::{
    parse, CmpOp, Cond, Evaluator, NoRelations, Operand, Params, Path, PathResolver, QueryError,
};
pub use reldb_value::{Id, Record, Value, ValueError};

//! # RelDB Query
//!
//! The condition language evaluated against table rows.
//!
//! Surface form:
//!
//! ```text
//! query    := or
//! or       := and ('||' and)*
//! and      := expr ('&&' expr)*
//! expr     := path op value | '(' or ')'
//! path     := ident ('.' ident)*
//! op       := '==' | '!=' | '=~' | '<' | '<=' | '>' | '>=' | ' IN '
//! value    := '?' | ':' ident | literal
//! ```
//!
//! Dotted paths traverse foreign keys and relationship fields through a
//! [`PathResolver`] supplied by the store; list-valued paths evaluate
//! existentially. `#ID` binds to the primary-key field of the current row.
//!
//! ```
//! use reldb_query::{parse, Params};
//! use reldb_value::Record;
//!
//! let cond = parse("email == ? && age >= 21").unwrap();
//! assert_eq!(cond.to_text(), "email == ? && age >= 21");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ast;
mod error;
mod eval;
mod params;
mod parse;
mod token;

pub use ast::{CmpOp, Cond, Operand, Path};
pub use error::{QueryError, QueryResult};
pub use eval::{Evaluator, NoRelations, PathResolver};
pub use params::Params;
pub use parse::parse;

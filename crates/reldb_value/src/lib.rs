//! # RelDB Value
//!
//! Row value model for RelDB.
//!
//! This crate provides:
//! - [`Id`] — row identifiers (counter-allocated integers or content hashes)
//! - [`Value`] — the tagged union carried through table rows
//! - [`Record`] — an ordered field→value row
//! - JSON conversion for the external surface (canonical decimal strings,
//!   millisecond timestamps, `HH:MM:SS` times, hex blobs)

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod id;
mod json;
mod record;
mod value;

pub use error::{ValueError, ValueResult};
pub use id::Id;
pub use json::{parse_time, record_from_json, record_to_json, value_to_json};
pub use record::Record;
pub use value::Value;

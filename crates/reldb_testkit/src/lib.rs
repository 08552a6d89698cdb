//! # RelDB Testkit
//!
//! Fixtures for exercising the store: a small user/address/role entity
//! model and ready-made database builders.

#![deny(unsafe_code)]

mod fixtures;

pub use fixtures::{sample_database, Address, Role, User};

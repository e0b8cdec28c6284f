//! Association portal core - shared domain types.
//!
//! This crate provides the types used across the portal components:
//! - `identity` - Current-user cache, session adapter and profile fetcher
//! - `cli` - Command-line tools for migrations and user management
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no
//! provider clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Identifiers, emails, roles, associations and persistence modes

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

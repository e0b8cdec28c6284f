//! Core types for the association portal.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod association;
pub mod email;
pub mod id;
pub mod role;

pub use association::{Association, AssociationError};
pub use email::{Email, EmailError};
pub use id::UserId;
pub use role::{Persistence, Role};

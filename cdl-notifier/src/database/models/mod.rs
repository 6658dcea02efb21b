//! Database models.
//!
//! These models map directly to the SQLite schema and convert to and from
//! the domain entities.

pub mod notification;

pub use notification::*;

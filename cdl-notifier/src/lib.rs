//! cdl-notifier library crate.
//!
//! Background dispatch of queued email/SMS notifications for the CDL
//! training school platform. Exposed as a library for the host binary and
//! integration tests.

pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod notification;
pub mod utils;

pub use error::{Error, Result};

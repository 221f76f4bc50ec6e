//! Core of the post → SMS monitor.
//!
//! Framework-agnostic: the social feed, the SMS provider and state storage sit
//! behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod feed;
pub mod formatting;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod retry;
pub mod state;
pub mod usage;

pub use errors::{Error, Result};

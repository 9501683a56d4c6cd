//! Lakeglass Shared Library
//!
//! The core of the lakeglass warehouse datasource: dashboard macro expansion,
//! credential injection, resilient statement execution and frame shaping.
//!
//! # Modules
//!
//! - [`query`] - Macro expansion, interval formatting and statement splitting
//! - [`auth`] - Credentials attached to every outgoing warehouse request
//! - [`config`] - Datasource and connection settings
//! - [`engine`] - Warehouse connections and session-expiry recovery
//! - [`models`] - Query payloads, row sets and frames
//! - [`datasource`] - The datasource instance tying everything together
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use shared::models::{QueryContext, TimeRange};
//! use shared::query::expand_macros;
//! use std::time::Duration;
//!
//! let range = TimeRange::new(
//!     Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
//! );
//! let template = "SELECT $__timeFilter(ts)";
//! let ctx = QueryContext::new(range, Duration::from_secs(60), template);
//!
//! assert_eq!(
//!     expand_macros(template, &ctx),
//!     "SELECT ts BETWEEN '2024-01-01 00:00:00' AND '2024-01-02 00:00:00'"
//! );
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod auth;
pub mod config;
pub mod datasource;
pub mod engine;
pub mod models;
pub mod query;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use tokio_util;
pub use validator;

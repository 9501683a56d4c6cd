//! Query text processing.
//!
//! Everything that happens to a dashboard SQL template before it reaches the
//! warehouse: macro expansion, interval formatting and statement splitting.
//!
//! # Supported Macros
//!
//! ```sql
//! SELECT $__time(ts), $__value(v) FROM t WHERE $__timeFilter(ts) GROUP BY $__timeWindow(ts)
//! SELECT * FROM t WHERE ts BETWEEN $__timeFrom() AND $__timeTo()
//! SELECT * FROM t WHERE epoch BETWEEN $__unixEpochFrom() AND $__unixEpochTo()
//! ```

mod interval;
mod macros;
mod statements;

pub use interval::format_interval;
pub use macros::{catalog, expand_macros, MacroRule};
pub use statements::{split_statements, Statements, SEPARATOR};

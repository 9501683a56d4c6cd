//! Dashboard macro expansion.
//!
//! Rewrites `$__name(...)` placeholders in a SQL template into warehouse SQL
//! driven by the query's time range and sampling interval. Expansion is plain
//! pattern substitution over the text; nothing here parses SQL.
//!
//! Rules run in a fixed order and each one scans the output of the previous
//! one:
//!
//! 1. `$__timeWindow(col)`. When present, `$__time(col)` becomes the window
//!    start and `$__value(col)` becomes `avg(col) AS value`.
//! 2. Otherwise `$__time(col)` and `$__value(col)` become plain aliases.
//! 3. `$__timeGroup(col, 'interval')`.
//! 4. `$__timeFilter(col)`, `$__unixEpochFilter(col)`, `$__unixEpochNanoFilter(col)`.
//! 5. Token substitutions (`$__timeFrom()`, `$__interval`, ...).
//!
//! A placeholder that does not match its pattern is left untouched.

use super::interval::format_interval;
use crate::models::QueryContext;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::fmt;

/// Column names a placeholder may capture.
const COLUMN: &str = r"([a-zA-Z0-9_-]+)";

/// Format of quoted range endpoints, always rendered in UTC.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

type Expansion = fn(&Captures<'_>, &QueryContext, &str) -> String;

/// A single placeholder pattern and how to rewrite it.
pub struct MacroRule {
    placeholder: &'static str,
    pattern: Regex,
    expansion: Expansion,
}

impl MacroRule {
    fn new(placeholder: &'static str, pattern: &str, expansion: Expansion) -> Self {
        Self {
            placeholder,
            pattern: Regex::new(pattern).expect("macro patterns are valid regular expressions"),
            expansion,
        }
    }

    /// A rule with no captures that replaces `token` verbatim.
    fn token(token: &'static str, expansion: Expansion) -> Self {
        Self::new(token, &regex::escape(token), expansion)
    }

    /// The placeholder syntax this rule recognizes, as shown to users.
    #[must_use]
    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    /// Returns true if the rule matches anywhere in `sql`.
    #[must_use]
    pub fn is_match(&self, sql: &str) -> bool {
        self.pattern.is_match(sql)
    }

    /// Rewrites every match of the rule in `sql`.
    fn apply(&self, sql: String, ctx: &QueryContext, interval: &str) -> String {
        if !self.is_match(&sql) {
            return sql;
        }
        tracing::debug!(placeholder = self.placeholder, "Macro placeholder found");
        self.pattern
            .replace_all(&sql, |caps: &Captures<'_>| (self.expansion)(caps, ctx, interval))
            .into_owned()
    }
}

impl fmt::Debug for MacroRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroRule")
            .field("placeholder", &self.placeholder)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

struct Catalog {
    window: MacroRule,
    windowed: [MacroRule; 2],
    aliases: [MacroRule; 2],
    ranges: [MacroRule; 4],
    tokens: [MacroRule; 9],
}

static CATALOG: Lazy<Catalog> = Lazy::new(|| Catalog {
    window: MacroRule::new(
        "$__timeWindow(column)",
        &format!(r"\$__timeWindow\({COLUMN}\)"),
        |caps, _, interval| format!("window({}, '{interval}')", &caps[1]),
    ),
    windowed: [
        MacroRule::new(
            "$__time(column)",
            &format!(r"\$__time\({COLUMN}\)"),
            |_, _, _| "window.start".to_string(),
        ),
        MacroRule::new(
            "$__value(column)",
            &format!(r"\$__value\({COLUMN}\)"),
            |caps, _, _| format!("avg({}) AS value", &caps[1]),
        ),
    ],
    aliases: [
        MacroRule::new(
            "$__time(column)",
            &format!(r"\$__time\({COLUMN}\)"),
            |caps, _, _| format!("{} AS time", &caps[1]),
        ),
        MacroRule::new(
            "$__value(column)",
            &format!(r"\$__value\({COLUMN}\)"),
            |caps, _, _| format!("{} AS value", &caps[1]),
        ),
    ],
    ranges: [
        MacroRule::new(
            "$__timeGroup(column, 'interval')",
            &format!(r"\$__timeGroup\({COLUMN}\s*,\s*'([^']*)'\)"),
            |caps, _, _| format!("window({}, '{}')", &caps[1], &caps[2]),
        ),
        MacroRule::new(
            "$__timeFilter(column)",
            &format!(r"\$__timeFilter\({COLUMN}\)"),
            |caps, ctx, _| {
                format!(
                    "{} BETWEEN {} AND {}",
                    &caps[1],
                    quoted(ctx.time_range.from),
                    quoted(ctx.time_range.to)
                )
            },
        ),
        MacroRule::new(
            "$__unixEpochFilter(column)",
            &format!(r"\$__unixEpochFilter\({COLUMN}\)"),
            |caps, ctx, _| {
                format!(
                    "{} BETWEEN {} AND {}",
                    &caps[1],
                    ctx.time_range.from.timestamp(),
                    ctx.time_range.to.timestamp()
                )
            },
        ),
        MacroRule::new(
            "$__unixEpochNanoFilter(column)",
            &format!(r"\$__unixEpochNanoFilter\({COLUMN}\)"),
            |caps, ctx, _| {
                format!(
                    "{} BETWEEN {} AND {}",
                    &caps[1],
                    epoch_nanos(ctx.time_range.from),
                    epoch_nanos(ctx.time_range.to)
                )
            },
        ),
    ],
    // Call forms come before the bare forms they start with.
    tokens: [
        MacroRule::token("$__timeFrom()", |_, ctx, _| {
            format!("timestamp_seconds({})", ctx.time_range.from.timestamp())
        }),
        MacroRule::token("$__timeTo()", |_, ctx, _| {
            format!("timestamp_seconds({})", ctx.time_range.to.timestamp())
        }),
        MacroRule::token("$__unixEpochFrom()", |_, ctx, _| {
            ctx.time_range.from.timestamp().to_string()
        }),
        MacroRule::token("$__unixEpochTo()", |_, ctx, _| {
            ctx.time_range.to.timestamp().to_string()
        }),
        MacroRule::token("$__unixEpochNanoFrom()", |_, ctx, _| {
            epoch_nanos(ctx.time_range.from).to_string()
        }),
        MacroRule::token("$__unixEpochNanoTo()", |_, ctx, _| {
            epoch_nanos(ctx.time_range.to).to_string()
        }),
        MacroRule::token("$__timeFrom", |_, ctx, _| quoted(ctx.time_range.from)),
        MacroRule::token("$__timeTo", |_, ctx, _| quoted(ctx.time_range.to)),
        MacroRule::token("$__interval", |_, _, interval| interval.to_string()),
    ],
});

fn quoted(instant: DateTime<Utc>) -> String {
    format!("'{}'", instant.format(TIMESTAMP_FORMAT))
}

fn epoch_nanos(instant: DateTime<Utc>) -> i128 {
    i128::from(instant.timestamp()) * 1_000_000_000 + i128::from(instant.timestamp_subsec_nanos())
}

/// Iterates over every macro rule in application order.
///
/// `$__time` and `$__value` appear twice: once for the windowed branch and
/// once for the plain alias branch.
pub fn catalog() -> impl Iterator<Item = &'static MacroRule> {
    let catalog = &*CATALOG;
    std::iter::once(&catalog.window)
        .chain(catalog.windowed.iter())
        .chain(catalog.aliases.iter())
        .chain(catalog.ranges.iter())
        .chain(catalog.tokens.iter())
}

/// Expands every macro placeholder in `template`.
///
/// Never fails: placeholders that do not match their pattern stay as literal
/// text and a template without placeholders is returned unchanged.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use shared::models::{QueryContext, TimeRange};
/// use shared::query::expand_macros;
/// use std::time::Duration;
///
/// let range = TimeRange::new(
///     Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
///     Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
/// );
/// let ctx = QueryContext::new(range, Duration::from_secs(60), "SELECT $__timeFilter(ts)");
///
/// assert_eq!(
///     expand_macros(&ctx.raw_template, &ctx),
///     "SELECT ts BETWEEN '2024-01-01 00:00:00' AND '2024-01-02 00:00:00'"
/// );
/// ```
#[must_use]
pub fn expand_macros(template: &str, ctx: &QueryContext) -> String {
    let catalog = &*CATALOG;
    let interval = format_interval(ctx.interval);
    let mut sql = template.to_string();

    if catalog.window.is_match(&sql) {
        sql = catalog.window.apply(sql, ctx, &interval);
        for rule in &catalog.windowed {
            sql = rule.apply(sql, ctx, &interval);
        }
    } else {
        for rule in &catalog.aliases {
            sql = rule.apply(sql, ctx, &interval);
        }
    }

    for rule in catalog.ranges.iter().chain(catalog.tokens.iter()) {
        sql = rule.apply(sql, ctx, &interval);
    }

    sql
}

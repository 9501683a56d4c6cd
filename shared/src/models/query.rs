//! Dashboard query payloads.
//!
//! Defines the inbound query batch, the per-query model carried in each query's
//! JSON, and the immutable [`QueryContext`] the macro expander works from.

use crate::models::Frame;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Absolute time range selected on the dashboard.
///
/// Endpoints deserialize from RFC 3339 strings or from Unix epoch milliseconds
/// (either as a JSON number or a numeric string, which is what dashboards send).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start of the range.
    #[serde(deserialize_with = "deserialize_instant")]
    pub from: DateTime<Utc>,
    /// Inclusive end of the range.
    #[serde(deserialize_with = "deserialize_instant")]
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a new time range.
    #[must_use]
    pub const fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }
}

fn deserialize_instant<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Instant {
        Millis(i64),
        Text(String),
    }

    let from_millis = |ms: i64| {
        Utc.timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}")))
    };

    match Instant::deserialize(deserializer)? {
        Instant::Millis(ms) => from_millis(ms),
        Instant::Text(text) => match text.parse::<i64>() {
            Ok(ms) => from_millis(ms),
            Err(_) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(serde::de::Error::custom),
        },
    }
}

/// Everything the macro expander may read about one query invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryContext {
    /// The dashboard time range.
    pub time_range: TimeRange,
    /// The sampling interval chosen by the dashboard.
    pub interval: Duration,
    /// The SQL template as typed by the user.
    pub raw_template: String,
}

impl QueryContext {
    /// Creates a new query context.
    #[must_use]
    pub fn new(time_range: TimeRange, interval: Duration, raw_template: impl Into<String>) -> Self {
        Self {
            time_range,
            interval,
            raw_template: raw_template.into(),
        }
    }
}

/// How cells missing from the long layout are filled when pivoting to wide.
///
/// Serialized as the integer the query editor sends: `0` previous, `1` null,
/// `2` fixed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FillMode {
    /// Repeat the last seen value of the series, or null if there is none.
    #[default]
    Previous,
    /// Leave the cell null.
    Null,
    /// Use the caller supplied fill value.
    Value,
}

impl TryFrom<u8> for FillMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Previous),
            1 => Ok(Self::Null),
            2 => Ok(Self::Value),
            other => Err(format!("unknown fill mode: {other}")),
        }
    }
}

impl From<FillMode> for u8 {
    fn from(mode: FillMode) -> Self {
        match mode {
            FillMode::Previous => 0,
            FillMode::Null => 1,
            FillMode::Value => 2,
        }
    }
}

/// Per-query result shaping options.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuerySettings {
    /// Pivot the long result into one column per series.
    pub convert_long_to_wide: bool,
    /// Fill policy for cells absent after pivoting.
    pub fill_mode: FillMode,
    /// Value used when `fill_mode` is [`FillMode::Value`].
    pub fill_value: f64,
}

/// The query model stored in a dashboard panel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryModel {
    /// The raw SQL template, possibly containing macro placeholders.
    #[serde(default, alias = "rawSql")]
    pub raw_sql_query: String,
    /// Result shaping options.
    #[serde(default)]
    pub query_settings: QuerySettings,
}

/// One query of a dashboard request.
///
/// Only `refId` is read when the batch arrives. The rest of the query stays
/// raw JSON until [`DataQuery::parse`], so a malformed query (bad time range,
/// bad panel model) fails only its own entry of the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub struct DataQuery {
    /// Identifier the response is keyed by.
    pub ref_id: String,
    payload: serde_json::Value,
}

impl DataQuery {
    /// Parses the typed contents of the query.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error if the time range, interval or panel
    /// model is malformed.
    pub fn parse(&self) -> Result<ParsedQuery, serde_json::Error> {
        ParsedQuery::deserialize(&self.payload)
    }
}

impl From<serde_json::Value> for DataQuery {
    fn from(payload: serde_json::Value) -> Self {
        let ref_id = match payload.get("refId") {
            Some(serde_json::Value::String(id)) => id.clone(),
            Some(serde_json::Value::Number(id)) => id.to_string(),
            _ => String::new(),
        };
        Self { ref_id, payload }
    }
}

impl From<DataQuery> for serde_json::Value {
    fn from(query: DataQuery) -> Self {
        query.payload
    }
}

/// The typed contents of a [`DataQuery`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedQuery {
    /// Dashboard time range.
    pub time_range: TimeRange,
    /// Suggested sampling interval in milliseconds.
    #[serde(default)]
    pub interval_ms: u64,
    /// The panel model.
    #[serde(flatten)]
    pub model: QueryModel,
}

impl ParsedQuery {
    /// Returns the sampling interval as a duration.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// A batch of dashboard queries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryDataRequest {
    /// The queries to run.
    #[serde(default)]
    pub queries: Vec<DataQuery>,
}

/// The outcome of a single query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataResponse {
    /// Result frames.
    pub frames: Vec<Frame>,
    /// Error text, if the query failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DataResponse {
    /// Creates a successful response holding one frame.
    #[must_use]
    pub fn with_frame(frame: Frame) -> Self {
        Self {
            frames: vec![frame],
            error: None,
        }
    }

    /// Creates a failed response.
    #[must_use]
    pub fn with_error(error: impl ToString) -> Self {
        Self {
            frames: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Responses for a batch, keyed by `refId`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryDataResponse {
    /// One response per query.
    pub results: BTreeMap<String, DataResponse>,
}

//! Columnar result frames and the long to wide pivot.

use super::FillMode;
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors raised while shaping frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// A row is narrower or wider than the column list.
    #[error("row {row} has {found} cells, expected {expected}")]
    RowWidth {
        /// Zero-based row index.
        row: usize,
        /// Number of cells found.
        found: usize,
        /// Number of columns.
        expected: usize,
    },

    /// A cell does not parse as its column type.
    #[error("cannot parse {value:?} in column {column} as {kind}")]
    InvalidCell {
        /// Column name.
        column: String,
        /// Target type.
        kind: &'static str,
        /// Offending text.
        value: String,
    },

    /// Pivoting needs a time field.
    #[error("long to wide conversion requires a time field")]
    MissingTimeField,

    /// Pivoting needs at least one numeric field.
    #[error("long to wide conversion requires at least one numeric field")]
    MissingValueField,
}

/// The values of one field, typed.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValues {
    /// Instants in UTC.
    Time(Vec<Option<DateTime<Utc>>>),
    /// Numbers.
    Number(Vec<Option<f64>>),
    /// Text.
    String(Vec<Option<String>>),
    /// Booleans.
    Bool(Vec<Option<bool>>),
}

impl FieldValues {
    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Time(v) => v.len(),
            Self::Number(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    /// Returns `true` if there are no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the type name used on the wire.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Time(_) => "time",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Bool(_) => "boolean",
        }
    }

    /// Renders value `index` as a series label; nulls become empty labels.
    fn label_at(&self, index: usize) -> String {
        match self {
            Self::String(v) => v[index].clone().unwrap_or_default(),
            Self::Bool(v) => v[index].map(|b| b.to_string()).unwrap_or_default(),
            Self::Number(v) => v[index].map(|n| n.to_string()).unwrap_or_default(),
            Self::Time(v) => v[index].map(|t| t.to_rfc3339()).unwrap_or_default(),
        }
    }
}

/// A named column of a frame, optionally labelled.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Series labels, set by the long to wide pivot.
    pub labels: BTreeMap<String, String>,
    /// The values.
    pub values: FieldValues,
}

impl Field {
    /// Creates an unlabelled field.
    #[must_use]
    pub fn new(name: impl Into<String>, values: FieldValues) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            values,
        }
    }

    /// Sets the labels.
    #[must_use]
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Field", 4)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("type", self.values.kind())?;
        state.serialize_field("labels", &self.labels)?;
        match &self.values {
            FieldValues::Time(v) => {
                let millis: Vec<Option<i64>> =
                    v.iter().map(|t| t.map(|t| t.timestamp_millis())).collect();
                state.serialize_field("values", &millis)?;
            }
            FieldValues::Number(v) => state.serialize_field("values", v)?,
            FieldValues::String(v) => state.serialize_field("values", v)?,
            FieldValues::Bool(v) => state.serialize_field("values", v)?,
        }
        state.end()
    }
}

/// A named table of equally long fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    /// Frame name.
    pub name: String,
    /// Columns.
    pub fields: Vec<Field>,
}

impl Frame {
    /// Creates a frame.
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.fields.first().map_or(0, |f| f.values.len())
    }

    /// Returns the field called `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Fill policy for cells that have no sample after pivoting.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FillMissing {
    /// How to fill.
    pub mode: FillMode,
    /// Value used by [`FillMode::Value`].
    pub value: f64,
}

/// Pivots a long frame (one row per time, series and value) into a wide frame
/// with one numeric field per series.
///
/// String and boolean fields identify the series and become labels; numeric
/// fields carry the values. Rows are ordered by time and series keep the order
/// in which they first appear. Only cells without any sample are filled; a
/// sample that is itself null stays null. Rows without a time are dropped.
///
/// # Errors
///
/// Returns [`FrameError::MissingTimeField`] or
/// [`FrameError::MissingValueField`] if the frame lacks a time or a numeric
/// field.
pub fn long_to_wide(frame: &Frame, fill: FillMissing) -> Result<Frame, FrameError> {
    let (time_index, times) = frame
        .fields
        .iter()
        .enumerate()
        .find_map(|(i, f)| match &f.values {
            FieldValues::Time(v) => Some((i, v)),
            _ => None,
        })
        .ok_or(FrameError::MissingTimeField)?;

    let mut label_fields = Vec::new();
    let mut value_fields = Vec::new();
    for (i, field) in frame.fields.iter().enumerate() {
        match &field.values {
            FieldValues::String(_) | FieldValues::Bool(_) => label_fields.push(field),
            FieldValues::Number(v) => value_fields.push((field, v)),
            FieldValues::Time(_) if i == time_index => {}
            FieldValues::Time(_) => label_fields.push(field),
        }
    }
    if value_fields.is_empty() {
        return Err(FrameError::MissingValueField);
    }

    let mut order: Vec<(usize, DateTime<Utc>)> = times
        .iter()
        .enumerate()
        .filter_map(|(row, t)| t.map(|t| (row, t)))
        .collect();
    order.sort_by_key(|&(row, t)| (t, row));

    let mut wide_times: Vec<DateTime<Utc>> = Vec::new();
    let mut series_index: HashMap<Vec<String>, usize> = HashMap::new();
    let mut series_keys: Vec<Vec<String>> = Vec::new();
    // cells[series][value_field][time] is None while no sample was seen.
    let mut cells: Vec<Vec<Vec<Option<Option<f64>>>>> = Vec::new();

    for (row, time) in order {
        if wide_times.last() != Some(&time) {
            wide_times.push(time);
            for series in &mut cells {
                for column in series.iter_mut() {
                    column.push(None);
                }
            }
        }
        let slot = wide_times.len() - 1;

        let key: Vec<String> = label_fields.iter().map(|f| f.values.label_at(row)).collect();
        let series = *series_index.entry(key.clone()).or_insert_with(|| {
            series_keys.push(key);
            cells.push(vec![vec![None; slot + 1]; value_fields.len()]);
            cells.len() - 1
        });

        for (column, (_, values)) in value_fields.iter().enumerate() {
            cells[series][column][slot] = Some(values[row]);
        }
    }

    let mut fields = vec![Field::new(
        frame.fields[time_index].name.clone(),
        FieldValues::Time(wide_times.into_iter().map(Some).collect()),
    )];
    for (key, series) in series_keys.iter().zip(cells) {
        let labels: BTreeMap<String, String> = label_fields
            .iter()
            .map(|f| f.name.clone())
            .zip(key.iter().cloned())
            .collect();
        for ((field, _), column) in value_fields.iter().zip(series) {
            fields.push(
                Field::new(field.name.clone(), FieldValues::Number(fill_column(column, fill)))
                    .with_labels(labels.clone()),
            );
        }
    }

    Ok(Frame::new(frame.name.clone(), fields))
}

fn fill_column(column: Vec<Option<Option<f64>>>, fill: FillMissing) -> Vec<Option<f64>> {
    let mut previous = None;
    column
        .into_iter()
        .map(|cell| match cell {
            Some(value) => {
                previous = value;
                value
            }
            None => match fill.mode {
                FillMode::Previous => previous,
                FillMode::Null => None,
                FillMode::Value => Some(fill.value),
            },
        })
        .collect()
}

//! Row set to frame conversion.

use crate::models::{Field, FieldValues, Frame, FrameError, RowSet};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Name of the frame produced for a query result.
pub const RESPONSE_FRAME: &str = "response";

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Timestamp,
    Date,
    Number,
    Bool,
    Text,
}

impl ColumnKind {
    fn of(type_name: &str) -> Self {
        let upper = type_name.trim().to_ascii_uppercase();
        let base = upper
            .split(|c: char| c == '(' || c == '<')
            .next()
            .unwrap_or_default()
            .trim();
        match base {
            "DATE" => Self::Date,
            "TINYINT" | "BYTE" | "SMALLINT" | "SHORT" | "INT" | "INTEGER" | "BIGINT" | "LONG"
            | "FLOAT" | "REAL" | "DOUBLE" | "DECIMAL" | "DEC" | "NUMERIC" => Self::Number,
            "BOOLEAN" => Self::Bool,
            t if t.starts_with("TIMESTAMP") => Self::Timestamp,
            _ => Self::Text,
        }
    }
}

/// Converts an engine row set into a frame named `response`.
///
/// Columns are typed from the engine type name: timestamps and dates become
/// time fields, integer, decimal and floating types numbers, `BOOLEAN`
/// booleans and everything else strings. Nulls are preserved.
///
/// # Errors
///
/// Returns a [`FrameError`] if a row does not match the column count or a
/// cell cannot be parsed as its column type.
pub fn rows_to_frame(rows: &RowSet) -> Result<Frame, FrameError> {
    let expected = rows.columns.len();
    if let Some((row, cells)) = rows
        .rows
        .iter()
        .enumerate()
        .find(|(_, cells)| cells.len() != expected)
    {
        return Err(FrameError::RowWidth {
            row,
            found: cells.len(),
            expected,
        });
    }

    let fields = rows
        .columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let cells = rows.rows.iter().map(|row| row[index].as_deref());
            let invalid = |kind: &'static str, value: &str| FrameError::InvalidCell {
                column: column.name.clone(),
                kind,
                value: value.to_string(),
            };

            let values = match ColumnKind::of(&column.type_name) {
                ColumnKind::Timestamp => FieldValues::Time(
                    cells
                        .map(|c| {
                            c.map(|v| parse_timestamp(v).ok_or_else(|| invalid("timestamp", v)))
                                .transpose()
                        })
                        .collect::<Result<_, _>>()?,
                ),
                ColumnKind::Date => FieldValues::Time(
                    cells
                        .map(|c| c.map(|v| parse_date(v).ok_or_else(|| invalid("date", v))).transpose())
                        .collect::<Result<_, _>>()?,
                ),
                ColumnKind::Number => FieldValues::Number(
                    cells
                        .map(|c| {
                            c.map(|v| v.trim().parse::<f64>().map_err(|_| invalid("number", v)))
                                .transpose()
                        })
                        .collect::<Result<_, _>>()?,
                ),
                ColumnKind::Bool => FieldValues::Bool(
                    cells
                        .map(|c| c.map(|v| parse_bool(v).ok_or_else(|| invalid("boolean", v))).transpose())
                        .collect::<Result<_, _>>()?,
                ),
                ColumnKind::Text => FieldValues::String(cells.map(|c| c.map(ToString::to_string)).collect()),
            };
            Ok(Field::new(column.name.clone(), values))
        })
        .collect::<Result<Vec<_>, FrameError>>()?;

    Ok(Frame::new(RESPONSE_FRAME, fields))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .or_else(|| parse_date(value))
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        v if v.eq_ignore_ascii_case("true") => Some(true),
        v if v.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

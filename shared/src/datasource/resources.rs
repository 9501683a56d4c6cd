//! Catalog introspection resources used by the query editor.

use crate::engine::ExecError;
use crate::models::RowSet;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by resource calls.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The resource path is unknown.
    #[error("Unknown URL: {0}")]
    NotFound(String),

    /// A catalog, schema or table name contains forbidden characters.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The request body is not valid JSON.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// The introspection statement failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Body of a resource call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequest {
    /// Catalog to inspect.
    pub catalog: String,
    /// Schema to inspect.
    pub schema: String,
    /// Table to describe.
    pub table: String,
}

impl ResourceRequest {
    /// Parses a request body; an empty body is an empty request.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidBody`] if the body is not valid JSON.
    pub fn from_body(body: &[u8]) -> Result<Self, ResourceError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| ResourceError::InvalidBody(e.to_string()))
    }
}

/// A column as listed by the `columns` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub column_type: String,
}

/// Current catalog and schema of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Defaults {
    /// Current catalog.
    pub default_catalog: String,
    /// Current schema.
    pub default_schema: String,
}

/// The resource paths served by a datasource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// `catalogs`
    Catalogs,
    /// `schemas`
    Schemas,
    /// `tables`
    Tables,
    /// `columns`
    Columns,
    /// `defaults`
    Defaults,
}

impl FromStr for Resource {
    type Err = ResourceError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        match path.trim_matches('/') {
            "catalogs" => Ok(Self::Catalogs),
            "schemas" => Ok(Self::Schemas),
            "tables" => Ok(Self::Tables),
            "columns" => Ok(Self::Columns),
            "defaults" => Ok(Self::Defaults),
            other => Err(ResourceError::NotFound(other.to_string())),
        }
    }
}

impl Resource {
    /// Builds the introspection statement for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidIdentifier`] if a name could smuggle
    /// SQL, or a required table name is empty.
    pub fn statement(self, request: &ResourceRequest) -> Result<String, ResourceError> {
        Ok(match self {
            Self::Catalogs => "SHOW CATALOGS".to_string(),
            Self::Schemas => match identifier(&request.catalog)? {
                Some(catalog) => format!("SHOW SCHEMAS IN {catalog}"),
                None => "SHOW SCHEMAS".to_string(),
            },
            Self::Tables => {
                match (identifier(&request.catalog)?, identifier(&request.schema)?) {
                    (Some(catalog), Some(schema)) => format!("SHOW TABLES IN {catalog}.{schema}"),
                    (None, Some(schema)) => format!("SHOW TABLES IN {schema}"),
                    (_, None) => "SHOW TABLES".to_string(),
                }
            }
            Self::Columns => match identifier(&request.table)? {
                Some(table) => format!("DESCRIBE TABLE {table}"),
                None => return Err(ResourceError::InvalidIdentifier(String::new())),
            },
            Self::Defaults => "SELECT current_catalog(), current_schema()".to_string(),
        })
    }

    /// Shapes the statement result into the resource's JSON reply.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Exec`] if `defaults` returned no row.
    pub fn shape(self, rows: &RowSet) -> Result<serde_json::Value, ResourceError> {
        let value = match self {
            Self::Catalogs | Self::Schemas => {
                let names: Vec<String> = rows.rows.iter().map(|row| cell(row, 0)).collect();
                serde_json::json!(names)
            }
            Self::Tables => {
                let names: Vec<String> = rows.rows.iter().map(|row| cell(row, 1)).collect();
                serde_json::json!(names)
            }
            Self::Columns => {
                let columns: Vec<ColumnInfo> = rows
                    .rows
                    .iter()
                    .map(|row| ColumnInfo {
                        name: cell(row, 0),
                        column_type: cell(row, 1),
                    })
                    .collect();
                serde_json::json!(columns)
            }
            Self::Defaults => {
                let row = rows.rows.first().ok_or_else(|| {
                    ResourceError::Exec(ExecError::Decode("no rows returned".to_string()))
                })?;
                serde_json::json!(Defaults {
                    default_catalog: cell(row, 0),
                    default_schema: cell(row, 1),
                })
            }
        };
        Ok(value)
    }
}

fn cell(row: &[Option<String>], index: usize) -> String {
    row.get(index).cloned().flatten().unwrap_or_default()
}

/// Returns the trimmed identifier, `None` if blank.
fn identifier(name: &str) -> Result<Option<&str>, ResourceError> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }
    if name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '`' | '-'))
    {
        Ok(Some(name))
    } else {
        Err(ResourceError::InvalidIdentifier(name.to_string()))
    }
}

//! Data models for lakeglass.
//!
//! Query payloads and contexts, raw engine row sets, and the columnar frames
//! returned to dashboards.

pub mod frame;
pub mod query;
pub mod rows;

pub use frame::{long_to_wide, Field, FieldValues, FillMissing, Frame, FrameError};
pub use query::{
    DataQuery, DataResponse, FillMode, ParsedQuery, QueryContext, QueryDataRequest,
    QueryDataResponse, QueryModel, QuerySettings, TimeRange,
};
pub use rows::{ColumnMeta, RowSet};

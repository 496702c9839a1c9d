//! 投放数据层：CSV 读取与校验、声明式查询

pub mod query;
pub mod schema;
pub mod table;

pub use query::{Filter, FilterOp, Metric, QueryResult, SortBy, TableQuery, GROUP_ALL, NO_ROWS};
pub use schema::{validate_headers, RowIssue, REQUIRED_COLUMNS};
pub use table::{AdRecord, AdsTable, CellValue};

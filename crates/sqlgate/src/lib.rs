//! Metadata-driven request validation and query construction for Postgres.
//!
//! Callers describe a read or update as data (field names, operators and
//! values) instead of SQL. sqlgate checks every reference and value against
//! the model's registered fields, then builds a parameterized statement:
//!
//! ```ignore
//! let registry = Registry::new();
//! registry.register::<Employee>()?;
//!
//! let req: QueryRequest = serde_json::from_str(r#"{
//!     "select": ["id", "name"],
//!     "where": [{"field": "id", "operator": "=", "value": 25}]
//! }"#)?;
//!
//! let meta = registry.metadata::<Employee>()?;
//! let built = QueryBuilder::new(&registry).select(&req, &meta)?;
//! assert_eq!(built.sql, r#"SELECT "id", "name" FROM "employees" WHERE "id" = $1"#);
//! ```
//!
//! # Models
//!
//! A model names its table and lists the fields it exposes. Each field has an
//! external name (what requests use), a column name and a declared type:
//!
//! ```ignore
//! impl Table for Employee {
//!     fn table_name() -> &'static str { "employees" }
//! }
//!
//! impl Model for Employee {
//!     fn fields() -> &'static [FieldDef] {
//!         const FIELDS: &[FieldDef] = &[
//!             FieldDef::new("id", "id", FieldType::I64),
//!             FieldDef::new("name", "name", FieldType::Text),
//!         ];
//!         FIELDS
//!     }
//! }
//!
//! inventory::submit!(ModelRegistration::of::<Employee>());
//! ```
//!
//! Columns not listed are invisible: they cannot be selected, filtered,
//! ordered by or updated.
//!
//! # Raw queries
//!
//! [`raw::prepare`] accepts a SELECT with `{{name}}` placeholders, checks the
//! supplied parameters against a [`ParamSchema`], rewrites placeholders to
//! `$n` and refuses anything that is not a single read-only SELECT.
//!
//! # Execution
//!
//! [`Executor`] runs built statements on a `tokio_postgres::Client`, a
//! `deadpool_postgres::Pool` or a pooled object, under a statement timeout.

pub mod build;
pub mod config;
mod error;
pub mod executor;
pub mod model;
pub mod pagination;
pub mod raw;
pub mod registry;
pub mod request;
pub mod row;
mod traced;
pub mod types;
pub mod validate;
pub mod value;

pub use build::{BuiltQuery, QueryBuilder};
pub use config::Config;
pub use error::{Clause, Error, Result};
pub use executor::{Driver, Executor};
pub use model::{FieldDef, Model, ModelMetadata, Table};
pub use pagination::{PageLimits, PageMeta, PaginationRequest};
pub use raw::{ParamDef, ParamSchema, PreparedRaw};
pub use registry::{ModelRegistration, Registry};
pub use request::{
    Condition, ExecuteRawRequest, Operator, OrderByClause, QueryRequest, QueryResponse, Record,
    SELECT_ALL, UpdateRequest,
};
pub use traced::{Connection, ConnectionExt, TracedConn};
pub use types::{FieldType, NormalizedType};
pub use validate::{validate_query, validate_update};
pub use value::{SqlParam, Value, ValueKind};

// Re-export so `inventory::submit!` works without a direct dependency
pub use inventory;

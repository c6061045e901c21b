//! Running built statements against Postgres.
//!
//! The executor accepts any handle and picks a [`Driver`] for it at runtime.
//! Requests are validated and built before the handle is even inspected, so
//! a bad request never costs a round trip.

use std::any::{Any, type_name};
use std::future::Future;
use std::sync::Arc;

use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

use crate::build::{QueryBuilder, selected_fields};
use crate::config::Config;
use crate::model::{Model, ModelMetadata};
use crate::pagination::PageMeta;
use crate::raw::{ParamSchema, output_fields, prepare};
use crate::registry::Registry;
use crate::request::{ExecuteRawRequest, QueryRequest, QueryResponse, Record, UpdateRequest};
use crate::row::decode_rows;
use crate::traced::ConnectionExt;
use crate::value::{SqlParam, Value};
use crate::{Error, Result};

/// A supported database handle.
pub enum Driver<'h> {
    Client(&'h tokio_postgres::Client),
    Pool(&'h deadpool_postgres::Pool),
    Object(&'h deadpool_postgres::Object),
}

impl<'h> Driver<'h> {
    /// Pick the driver for `handle` by its concrete type.
    pub fn detect<H: Any>(handle: &'h H) -> Result<Self> {
        let any: &'h dyn Any = handle;
        if let Some(client) = any.downcast_ref::<tokio_postgres::Client>() {
            return Ok(Driver::Client(client));
        }
        if let Some(pool) = any.downcast_ref::<deadpool_postgres::Pool>() {
            return Ok(Driver::Pool(pool));
        }
        if let Some(object) = any.downcast_ref::<deadpool_postgres::Object>() {
            return Ok(Driver::Object(object));
        }
        Err(Error::UnsupportedDriver {
            type_name: type_name::<H>(),
        })
    }

    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        let rows = match self {
            Driver::Client(client) => client.traced().query(sql, params).await?,
            Driver::Object(object) => object.traced().query(sql, params).await?,
            Driver::Pool(pool) => {
                let object = pool.get().await?;
                object.traced().query(sql, params).await?
            }
        };
        Ok(rows)
    }

    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64> {
        let affected = match self {
            Driver::Client(client) => client.traced().execute(sql, params).await?,
            Driver::Object(object) => object.traced().execute(sql, params).await?,
            Driver::Pool(pool) => {
                let object = pool.get().await?;
                object.traced().execute(sql, params).await?
            }
        };
        Ok(affected)
    }
}

/// Validates, builds and runs requests for registered models.
pub struct Executor<'r> {
    registry: &'r Registry,
    config: Config,
}

impl<'r> Executor<'r> {
    pub fn new(registry: &'r Registry, config: Config) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn builder(&self) -> QueryBuilder<'r> {
        QueryBuilder::new(self.registry).with_limits(self.config.page_limits())
    }

    fn metadata<M: Model>(&self) -> Result<Arc<ModelMetadata>> {
        if self.config.lazy_registration {
            self.registry.metadata_or_register::<M>()
        } else {
            self.registry.metadata::<M>()
        }
    }

    /// Run a structured read. When the request is paginated a COUNT runs
    /// first and the response carries page metadata.
    pub async fn query<M: Model, H: Any>(
        &self,
        handle: &H,
        req: &QueryRequest,
    ) -> Result<QueryResponse> {
        let meta = self.metadata::<M>()?;
        let builder = self.builder();
        let select = builder.select(req, &meta)?;
        let fields = selected_fields(&req.select, &meta)?;
        let count = match &req.pagination {
            Some(pagination) => Some((
                builder.count(req, &meta)?,
                pagination.normalize(&self.config.page_limits()),
            )),
            None => None,
        };

        let driver = Driver::detect(handle)?;

        let pagination = match count {
            Some((count, page)) => {
                let rows = self.fetch(&driver, &count.sql, &count.args).await?;
                let total = match rows.first() {
                    Some(row) => row.try_get::<_, i64>(0)?,
                    None => 0,
                };
                Some(PageMeta::new(page, total))
            }
            None => None,
        };

        let rows = self.fetch(&driver, &select.sql, &select.args).await?;
        let data = decode_rows(&rows, &fields, self.registry)?;
        Ok(QueryResponse { data, pagination })
    }

    /// Run a structured update, returning the number of rows affected.
    pub async fn update<M: Model, H: Any>(&self, handle: &H, req: &UpdateRequest) -> Result<u64> {
        let meta = self.metadata::<M>()?;
        let update = self.builder().update(req, &meta)?;

        let driver = Driver::detect(handle)?;
        let affected = self.run(&driver, &update.sql, &update.args).await?;
        if affected == 0 && self.config.reject_zero_rows_updated {
            return Err(Error::NoRowsAffected);
        }
        Ok(affected)
    }

    /// Run a raw SELECT, typing its parameters with `P` and shaping rows as `R`.
    pub async fn raw<P: ParamSchema, R: Model, H: Any>(
        &self,
        handle: &H,
        req: &ExecuteRawRequest,
    ) -> Result<Vec<Record>> {
        let meta = self.metadata::<R>()?;
        let prepared = prepare::<P>(req)?;
        let fields = output_fields(&req.select_fields, &meta)?;

        let driver = Driver::detect(handle)?;
        let rows = self.fetch(&driver, &prepared.sql, &prepared.args).await?;
        decode_rows(&rows, &fields, self.registry)
    }

    async fn fetch(&self, driver: &Driver<'_>, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let params: Vec<SqlParam<'_>> = args.iter().map(SqlParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        self.timed(driver.query(sql, &refs)).await
    }

    async fn run(&self, driver: &Driver<'_>, sql: &str, args: &[Value]) -> Result<u64> {
        let params: Vec<SqlParam<'_>> = args.iter().map(SqlParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        self.timed(driver.execute(sql, &refs)).await
    }

    async fn timed<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.config.statement_timeout;
        tokio::time::timeout(limit, fut).await.map_err(|_| {
            tracing::debug!(timeout = ?limit, "statement timed out");
            Error::Timeout(limit)
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, Table};
    use crate::request::{Condition, Operator};
    use crate::types::FieldType;

    struct User;

    impl Table for User {
        fn table_name() -> &'static str {
            "users"
        }
    }

    impl Model for User {
        fn fields() -> &'static [FieldDef] {
            const FIELDS: &[FieldDef] = &[
                FieldDef::new("id", "id", FieldType::I64),
                FieldDef::new("name", "name", FieldType::Text),
            ];
            FIELDS
        }
    }

    #[test]
    fn unsupported_handles_are_named() {
        let err = Driver::detect(&42u32).err().unwrap();
        assert!(matches!(err, Error::UnsupportedDriver { type_name: "u32" }));
        assert_eq!(err.to_string(), "unsupported database type: u32");
    }

    #[tokio::test]
    async fn validation_runs_before_driver_detection() {
        let registry = Registry::new();
        registry.register::<User>().unwrap();
        let executor = Executor::new(&registry, Config::default());

        let bad = QueryRequest::select(["password"]);
        let err = executor.query::<User, _>(&"not a db", &bad).await.unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));

        let good = QueryRequest::select(["id"]).filter(Condition::new("id", Operator::Eq, 1i64));
        let err = executor.query::<User, _>(&"not a db", &good).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedDriver { .. }));
    }

    #[tokio::test]
    async fn unregistered_models_fail_unless_lazy() {
        let registry = Registry::new();
        let strict = Executor::new(&registry, Config::default());
        let req = QueryRequest::select(["id"]);
        assert!(matches!(
            strict.query::<User, _>(&(), &req).await,
            Err(Error::NotRegistered { .. })
        ));

        let lazy = Executor::new(
            &registry,
            Config {
                lazy_registration: true,
                ..Config::default()
            },
        );
        assert!(matches!(
            lazy.query::<User, _>(&(), &req).await,
            Err(Error::UnsupportedDriver { .. })
        ));
        assert!(registry.is_registered::<User>());
    }

    #[tokio::test]
    async fn update_and_raw_check_before_running() {
        let registry = Registry::new();
        registry.register::<User>().unwrap();
        let executor = Executor::new(&registry, Config::default());

        let unsafe_update = UpdateRequest::default().set("name", "x");
        assert!(matches!(
            executor.update::<User, _>(&(), &unsafe_update).await,
            Err(Error::MissingWhere)
        ));

        let mutation = ExecuteRawRequest::new("DELETE FROM users");
        assert!(matches!(
            executor.raw::<(), User, _>(&(), &mutation).await,
            Err(Error::NotSelect(_))
        ));
    }
}

//! PostgreSQL chunk source.
//!
//! Reads one table in primary key order using keyset pagination over a
//! deadpool-postgres pool. Each call to `next_chunk` issues one
//! `WHERE pk > last ORDER BY pk LIMIT n` query.

use std::time::Instant;

use async_trait::async_trait;
use deadpool_postgres::Pool;
use serde::Serialize;
use tokio_postgres::types::FromSql;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use crate::config::{DatabaseConfig, VerifySettings};
use crate::core::{Chunk, PkValue, Row, Side, SqlValue};
use crate::error::{Result, VerifyError};
use crate::source::tls::{build_pool, SslMode};
use crate::source::ChunkSource;

/// Types read natively. Everything else is selected as `::text`.
const NATIVE_TYPES: &[&str] = &[
    "bool",
    "int2",
    "int4",
    "int8",
    "float4",
    "float8",
    "numeric",
    "uuid",
    "bytea",
    "timestamp",
    "timestamptz",
    "date",
    "time",
    "json",
    "jsonb",
    "text",
    "varchar",
    "bpchar",
    "name",
];

/// Key column types whose PostgreSQL order matches [`PkValue`]'s order.
const KEY_TYPES: &[&str] = &["int2", "int4", "int8", "uuid", "text", "varchar", "bpchar"];

/// Key types compared under `COLLATE "C"`, i.e. by bytes like Rust strings.
const TEXT_KEY_TYPES: &[&str] = &["text", "varchar", "bpchar"];

/// A column as reported by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub udt_name: String,
}

impl ColumnInfo {
    fn select_expr(&self) -> String {
        if NATIVE_TYPES.contains(&self.udt_name.as_str()) {
            quote_ident(&self.name)
        } else {
            format!("{}::text", quote_ident(&self.name))
        }
    }

    /// Key expression for WHERE and ORDER BY.
    fn key_expr(&self) -> String {
        if TEXT_KEY_TYPES.contains(&self.udt_name.as_str()) {
            format!("{} COLLATE \"C\"", quote_ident(&self.name))
        } else {
            quote_ident(&self.name)
        }
    }
}

/// Result of probing one database.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub connected: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl HealthStatus {
    /// Status for a database that could not be reached at all.
    pub fn failed(err: &VerifyError) -> Self {
        Self {
            connected: false,
            latency_ms: 0,
            error: Some(err.to_string()),
        }
    }
}

/// Chunk source over one PostgreSQL table.
pub struct PostgresChunkSource {
    pool: Pool,
    side: Side,
    label: String,
    schema: String,
    table: Option<String>,
    primary_key: String,
    chunk_size: usize,
    columns: Option<Vec<ColumnInfo>>,
    last_key: Option<PkValue>,
    exhausted: bool,
}

impl PostgresChunkSource {
    /// Create the pool for one side and test the connection.
    pub async fn connect(
        side: Side,
        config: &DatabaseConfig,
        settings: &VerifySettings,
    ) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("pg-migrate-verify");

        let ssl_mode: SslMode = config.ssl_mode.parse()?;
        let pool = build_pool(side, pg_config, ssl_mode, config.max_connections)?;

        let client = pool
            .get()
            .await
            .map_err(|e| VerifyError::pool(e, format!("testing connection for side {}", side)))?;
        client.simple_query("SELECT 1").await?;

        let label = format!("{}:{}/{}", config.host, config.port, config.database);
        info!("Side {}: connected to PostgreSQL {}", side, label);

        Ok(Self {
            pool,
            side,
            label,
            schema: config.schema.clone(),
            table: settings.table.clone(),
            primary_key: settings.primary_key.clone(),
            chunk_size: settings.chunk_size.max(1),
            columns: None,
            last_key: None,
            exhausted: false,
        })
    }

    /// Point the source at a table. Resets pagination.
    pub fn set_table(&mut self, table: impl Into<String>) {
        self.table = Some(table.into());
        self.columns = None;
        self.last_key = None;
        self.exhausted = false;
    }

    /// Find the user table of the configured schema.
    ///
    /// System relations (`pg_*`, `sql_*`) are skipped. When the schema holds
    /// several tables the first by name is taken and a warning is logged.
    pub async fn discover_table(&self) -> Result<String> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| VerifyError::pool(e, "getting connection for table discovery"))?;

        let query = r#"
            SELECT c.relname
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1
              AND c.relkind IN ('r', 'p')
              AND c.relname NOT LIKE 'pg\_%'
              AND c.relname NOT LIKE 'sql\_%'
            ORDER BY c.relname
        "#;
        let rows = client.query(query, &[&self.schema]).await?;
        let names: Vec<String> = rows.iter().map(|r| r.get(0)).collect();

        match names.as_slice() {
            [] => Err(VerifyError::TableDiscovery(format!(
                "no user tables in schema '{}' on side {} ({})",
                self.schema, self.side, self.label
            ))),
            [only] => Ok(only.clone()),
            [first, rest @ ..] => {
                warn!(
                    "Side {}: schema '{}' holds {} tables, verifying '{}' (set verify.table to choose)",
                    self.side,
                    self.schema,
                    rest.len() + 1,
                    first
                );
                Ok(first.clone())
            }
        }
    }

    /// Run `SELECT 1` and measure the round trip.
    pub async fn health_check(&self) -> HealthStatus {
        let start = Instant::now();
        let outcome = async {
            let client = self
                .pool
                .get()
                .await
                .map_err(|e| VerifyError::pool(e, "getting connection for health check"))?;
            client.simple_query("SELECT 1").await?;
            Ok::<_, VerifyError>(())
        }
        .await;

        let latency_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => HealthStatus {
                connected: true,
                latency_ms,
                error: None,
            },
            Err(e) => HealthStatus {
                connected: false,
                latency_ms,
                error: Some(e.to_string()),
            },
        }
    }

    /// Load the column list, primary key first.
    async fn load_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| VerifyError::pool(e, "getting connection for load_columns"))?;

        let query = r#"
            SELECT column_name::text, udt_name::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;
        let rows = client.query(query, &[&self.schema, &table]).await?;
        let columns: Vec<ColumnInfo> = rows
            .iter()
            .map(|r| ColumnInfo {
                name: r.get(0),
                udt_name: r.get(1),
            })
            .collect();

        if columns.is_empty() {
            return Err(VerifyError::TableDiscovery(format!(
                "table {}.{} not found on side {} ({})",
                self.schema, table, self.side, self.label
            )));
        }

        let ordered = key_first(columns, &self.primary_key).ok_or_else(|| {
            VerifyError::TableDiscovery(format!(
                "primary key column '{}' not found in {}.{} on side {}",
                self.primary_key, self.schema, table, self.side
            ))
        })?;
        check_key_type(self.side, &ordered[0])?;
        debug!(
            "Side {}: {} columns for {}.{}",
            self.side,
            ordered.len(),
            self.schema,
            table
        );
        Ok(ordered)
    }
}

#[async_trait]
impl ChunkSource for PostgresChunkSource {
    async fn next_chunk(&mut self) -> Result<Chunk> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let table = match &self.table {
            Some(t) => t.clone(),
            None => {
                let t = self.discover_table().await?;
                self.table = Some(t.clone());
                t
            }
        };

        let columns = match &self.columns {
            Some(c) => c.clone(),
            None => {
                let c = self.load_columns(&table).await?;
                self.columns = Some(c.clone());
                c
            }
        };

        let sql = build_chunk_query(
            &self.schema,
            &table,
            &columns,
            self.last_key.as_ref(),
            self.chunk_size,
        );

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| VerifyError::pool(e, "getting connection for next_chunk"))?;
        let rows = client.query(&sql, &[]).await?;

        let mut chunk = Vec::with_capacity(rows.len());
        for pg_row in &rows {
            let mut values = Vec::with_capacity(pg_row.len());
            for idx in 0..pg_row.len() {
                values.push(convert_pg_row_value(pg_row, idx)?);
            }
            chunk.push(Row::new(values));
        }

        if let Some(last) = chunk.last() {
            self.last_key = Some(last.key(self.side)?);
        }
        if chunk.len() < self.chunk_size {
            self.exhausted = true;
        }

        debug!(
            "Side {}: fetched {} rows from {}.{}",
            self.side,
            chunk.len(),
            self.schema,
            table
        );
        Ok(chunk)
    }

    fn table_name(&self) -> Option<String> {
        self.table.clone()
    }

    fn describe(&self) -> String {
        format!(
            "postgres:{}/{}.{}",
            self.label,
            self.schema,
            self.table.as_deref().unwrap_or("?")
        )
    }
}

/// Move the key column to the front; None when it is missing.
fn key_first(mut columns: Vec<ColumnInfo>, primary_key: &str) -> Option<Vec<ColumnInfo>> {
    let idx = columns.iter().position(|c| c.name == primary_key)?;
    let pk = columns.remove(idx);
    columns.insert(0, pk);
    Some(columns)
}

/// Reject key columns whose database order the reconciler cannot reproduce.
fn check_key_type(side: Side, key: &ColumnInfo) -> Result<()> {
    if KEY_TYPES.contains(&key.udt_name.as_str()) {
        Ok(())
    } else {
        Err(VerifyError::invalid_key(
            side,
            format!(
                "key column '{}' has type {}; supported key types are {}",
                key.name,
                key.udt_name,
                KEY_TYPES.join(", ")
            ),
        ))
    }
}

/// Build the keyset pagination query for one chunk.
///
/// Text keys are ordered with `COLLATE "C"` so the database returns them in
/// byte order, whatever the column or database collation.
fn build_chunk_query(
    schema: &str,
    table: &str,
    columns: &[ColumnInfo],
    after: Option<&PkValue>,
    limit: usize,
) -> String {
    let select = columns
        .iter()
        .map(ColumnInfo::select_expr)
        .collect::<Vec<_>>()
        .join(", ");
    let pk = columns[0].key_expr();

    let mut sql = format!(
        "SELECT {} FROM {}.{}",
        select,
        quote_ident(schema),
        quote_ident(table)
    );
    if let Some(key) = after {
        sql.push_str(&format!(" WHERE {} > {}", pk, key.to_sql_literal()));
    }
    sql.push_str(&format!(" ORDER BY {} ASC LIMIT {}", pk, limit));
    sql
}

/// Quote a PostgreSQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize) -> Result<Option<T>> {
    Ok(row.try_get::<_, Option<T>>(idx)?)
}

/// Convert a PostgreSQL row value to SqlValue, by column type name.
fn convert_pg_row_value(row: &tokio_postgres::Row, idx: usize) -> Result<SqlValue> {
    let value = match row.columns()[idx].type_().name() {
        "bool" => get::<bool>(row, idx)?.into(),
        "int2" => get::<i16>(row, idx)?.into(),
        "int4" => get::<i32>(row, idx)?.into(),
        "int8" => get::<i64>(row, idx)?.into(),
        "float4" => get::<f32>(row, idx)?.map_or(SqlValue::Null, SqlValue::F32),
        "float8" => get::<f64>(row, idx)?.into(),
        "numeric" => get::<rust_decimal::Decimal>(row, idx)?.into(),
        "uuid" => get::<uuid::Uuid>(row, idx)?.into(),
        "bytea" => get::<Vec<u8>>(row, idx)?.into(),
        "timestamp" => get::<chrono::NaiveDateTime>(row, idx)?.into(),
        "timestamptz" => get::<chrono::DateTime<chrono::FixedOffset>>(row, idx)?
            .map_or(SqlValue::Null, SqlValue::DateTimeOffset),
        "date" => get::<chrono::NaiveDate>(row, idx)?.into(),
        "time" => get::<chrono::NaiveTime>(row, idx)?.map_or(SqlValue::Null, SqlValue::Time),
        "json" | "jsonb" => get::<serde_json::Value>(row, idx)?
            .map_or(SqlValue::Null, |v| SqlValue::Text(v.to_string())),
        _ => get::<String>(row, idx)?.into(),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, udt: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            udt_name: udt.to_string(),
        }
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_key_first_moves_primary_key() {
        let cols = vec![col("name", "text"), col("id", "int4"), col("age", "int4")];
        let ordered = key_first(cols, "id").unwrap();
        let names: Vec<_> = ordered.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "name", "age"]);
    }

    #[test]
    fn test_key_first_missing_key() {
        assert!(key_first(vec![col("name", "text")], "id").is_none());
    }

    #[test]
    fn test_first_chunk_query_has_no_lower_bound() {
        let cols = vec![col("id", "int8"), col("name", "text")];
        let sql = build_chunk_query("public", "users", &cols, None, 100);
        assert_eq!(
            sql,
            "SELECT \"id\", \"name\" FROM \"public\".\"users\" ORDER BY \"id\" ASC LIMIT 100"
        );
    }

    #[test]
    fn test_next_chunk_query_resumes_after_key() {
        let cols = vec![col("id", "int8"), col("ip", "inet")];
        let key = PkValue::Int(200);
        let sql = build_chunk_query("public", "hosts", &cols, Some(&key), 50);
        assert_eq!(
            sql,
            "SELECT \"id\", \"ip\"::text FROM \"public\".\"hosts\" \
             WHERE \"id\" > 200 ORDER BY \"id\" ASC LIMIT 50"
        );
    }

    #[test]
    fn test_text_key_literal_is_escaped() {
        let cols = vec![col("code", "varchar")];
        let key = PkValue::from("o'hare");
        let sql = build_chunk_query("s", "t", &cols, Some(&key), 1);
        assert!(sql.contains("WHERE \"code\" COLLATE \"C\" > 'o''hare'"));
    }

    #[test]
    fn test_text_key_is_paged_in_byte_order() {
        let cols = vec![col("code", "text"), col("label", "text")];
        let key = PkValue::from("Banana");
        let sql = build_chunk_query("public", "fruit", &cols, Some(&key), 10);
        assert_eq!(
            sql,
            "SELECT \"code\", \"label\" FROM \"public\".\"fruit\" \
             WHERE \"code\" COLLATE \"C\" > 'Banana' \
             ORDER BY \"code\" COLLATE \"C\" ASC LIMIT 10"
        );
    }

    #[test]
    fn test_bpchar_key_uses_byte_order() {
        let sql = build_chunk_query("s", "t", &[col("code", "bpchar")], None, 5);
        assert!(sql.ends_with("ORDER BY \"code\" COLLATE \"C\" ASC LIMIT 5"));
    }

    #[test]
    fn test_integer_and_uuid_keys_have_no_collation() {
        for udt in ["int4", "uuid"] {
            let sql = build_chunk_query("s", "t", &[col("id", udt)], None, 5);
            assert!(!sql.contains("COLLATE"), "{}", sql);
        }
    }

    #[test]
    fn test_supported_key_types() {
        for udt in ["int2", "int4", "int8", "uuid", "text", "varchar", "bpchar"] {
            assert!(check_key_type(Side::A, &col("id", udt)).is_ok(), "{}", udt);
        }
    }

    #[test]
    fn test_unsupported_key_types_are_rejected() {
        for udt in ["citext", "inet", "numeric", "timestamptz", "name", "float8"] {
            let err = check_key_type(Side::B, &col("id", udt)).unwrap_err();
            assert!(
                matches!(err, VerifyError::InvalidKey { side: Side::B, .. }),
                "{}",
                udt
            );
            assert!(err.to_string().contains(udt));
        }
    }

    #[test]
    fn test_health_status_failed() {
        let status = HealthStatus::failed(&VerifyError::Config("bad".into()));
        assert!(!status.connected);
        assert!(status.error.unwrap().contains("bad"));
    }
}

//! Blocking Postgres connection over `tokio-postgres`.
//!
//! The builder is synchronous, so [`PgConnection`] owns a current-thread tokio
//! runtime and drives every request to completion with `block_on`. Do not call
//! it from inside an async context.
//!
//! Statements without parameters go through the simple query protocol, which
//! returns every column as text. Statements with parameters are prepared and
//! decoded by column type.

use super::{BufferedRows, Connection, RowHandle, StatementInfo};
use crate::error::{QbError, QbResult};
use crate::naming::TableNaming;
use crate::row::Row;
use crate::value::Value;
use bytes::BytesMut;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

/// Connection settings for [`PgConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgConfig {
    /// libpq-style connection string or `postgres://` URL.
    pub url: String,
    /// Prefix applied to every table name.
    pub table_prefix: String,
}

impl PgConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            table_prefix: String::new(),
        }
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Read `DATABASE_URL` and the optional `CHAINQL_TABLE_PREFIX`.
    pub fn from_env() -> QbResult<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| QbError::configuration("DATABASE_URL is not set"))?;
        let prefix = std::env::var("CHAINQL_TABLE_PREFIX").unwrap_or_default();
        Ok(Self::new(url).with_table_prefix(prefix))
    }
}

#[derive(Debug, Default)]
struct PgState {
    affected_rows: u64,
    num_rows: u64,
    last_was_insert: bool,
    last: StatementInfo,
}

/// A [`Connection`] backed by a live Postgres session.
pub struct PgConnection {
    runtime: Runtime,
    client: Client,
    naming: TableNaming,
    state: Mutex<PgState>,
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("prefix", &self.naming.prefix())
            .finish_non_exhaustive()
    }
}

impl PgConnection {
    /// Connect using `config`.
    pub fn connect(config: &PgConfig) -> QbResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| QbError::Connection(format!("failed to start runtime: {e}")))?;

        let (client, connection) = runtime
            .block_on(tokio_postgres::connect(&config.url, NoTls))
            .map_err(|e| QbError::Connection(e.to_string()))?;

        runtime.spawn(async move {
            if let Err(e) = connection.await {
                crate::log::connection_error(&e);
            }
        });

        Ok(Self {
            runtime,
            client,
            naming: TableNaming::new(config.table_prefix.clone()),
            state: Mutex::new(PgState::default()),
        })
    }

    /// Connect to `url` without a table prefix.
    pub fn connect_url(url: &str) -> QbResult<Self> {
        Self::connect(&PgConfig::new(url))
    }

    /// Connect using [`PgConfig::from_env`].
    pub fn from_env() -> QbResult<Self> {
        Self::connect(&PgConfig::from_env()?)
    }

    /// Shared handle suitable for [`QueryBuilder::new`](crate::QueryBuilder::new).
    pub fn into_shared(self) -> Arc<dyn Connection> {
        Arc::new(self)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PgState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn simple(&self, sql: &str) -> Result<(BufferedRows, u64), tokio_postgres::Error> {
        let messages = self.runtime.block_on(self.client.simple_query(sql))?;

        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::new();
        let mut affected = 0;
        for message in messages {
            match message {
                SimpleQueryMessage::RowDescription(desc) => {
                    columns = desc.iter().map(|c| c.name().to_string()).collect();
                    rows.clear();
                }
                SimpleQueryMessage::Row(row) => {
                    if columns.is_empty() {
                        columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                    }
                    let values = (0..row.len())
                        .map(|i| row.get(i).map_or(Value::Null, Value::from))
                        .collect();
                    rows.push(values);
                }
                SimpleQueryMessage::CommandComplete(n) => affected = n,
                _ => {}
            }
        }
        Ok((BufferedRows::from_values(columns, rows), affected))
    }

    fn extended(&self, sql: &str, params: &[Value]) -> QbResult<(BufferedRows, u64)> {
        let statement = self.runtime.block_on(self.client.prepare(sql))?;
        let encoded: Vec<PgParam<'_>> = params.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            encoded.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        if statement.columns().is_empty() {
            let affected = self
                .runtime
                .block_on(self.client.execute(&statement, &refs))?;
            return Ok((BufferedRows::empty(), affected));
        }

        let pg_rows = self
            .runtime
            .block_on(self.client.query(&statement, &refs))?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let shared: Arc<[String]> = columns.clone().into();

        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let values = (0..pg_row.len())
                .map(|i| decode_column(pg_row, i))
                .collect::<QbResult<Vec<_>>>()?;
            rows.push(Row::new(shared.clone(), values));
        }
        let affected = rows.len() as u64;
        Ok((BufferedRows::new(columns, rows), affected))
    }
}

impl Connection for PgConnection {
    fn naming(&self) -> &TableNaming {
        &self.naming
    }

    fn query(&self, sql: &str, params: &[Value]) -> QbResult<Box<dyn RowHandle>> {
        let outcome = if params.is_empty() {
            self.simple(sql).map_err(QbError::from)
        } else {
            self.extended(sql, params)
        };

        let mut state = self.lock();
        state.last = StatementInfo {
            sql: sql.to_string(),
            ..StatementInfo::default()
        };
        state.last_was_insert = first_keyword_is(sql, "INSERT");
        match outcome {
            Ok((rows, affected)) => {
                state.num_rows = rows.len() as u64;
                state.affected_rows = affected;
                state.last.status = Some(format!("OK {affected}"));
                Ok(Box::new(rows))
            }
            Err(err) => {
                state.num_rows = 0;
                state.affected_rows = 0;
                state.last.status = err.sqlstate().map(str::to_string);
                state.last.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn affected_rows(&self) -> u64 {
        self.lock().affected_rows
    }

    fn num_rows(&self) -> u64 {
        self.lock().num_rows
    }

    fn insert_id(&self) -> QbResult<Option<i64>> {
        if !self.lock().last_was_insert {
            return Ok(None);
        }
        let mut rows = match self.simple("SELECT lastval()") {
            Ok((rows, _)) => rows,
            Err(err) if is_lastval_undefined(&err) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match rows.fetch_row()? {
            Some(row) => row.try_get_index::<Option<i64>>(0),
            None => Ok(None),
        }
    }

    fn last_statement(&self) -> StatementInfo {
        self.lock().last.clone()
    }
}

/// `lastval()` raises 55000 until a sequence has been used in the session.
fn is_lastval_undefined(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE)
}

fn first_keyword_is(sql: &str, keyword: &str) -> bool {
    sql.split_whitespace()
        .next()
        .is_some_and(|w| w.eq_ignore_ascii_case(keyword))
}

fn decode_column(row: &tokio_postgres::Row, idx: usize) -> QbResult<Value> {
    let column = &row.columns()[idx];
    let name = column.name();
    let decode_err = |e: tokio_postgres::Error| QbError::decode(name, e.to_string());

    let value = match *column.type_() {
        Type::BOOL => Value::from(row.try_get::<_, Option<bool>>(idx).map_err(decode_err)?),
        Type::INT2 => Value::from(row.try_get::<_, Option<i16>>(idx).map_err(decode_err)?),
        Type::INT4 => Value::from(row.try_get::<_, Option<i32>>(idx).map_err(decode_err)?),
        Type::INT8 => Value::from(row.try_get::<_, Option<i64>>(idx).map_err(decode_err)?),
        Type::OID => Value::from(row.try_get::<_, Option<u32>>(idx).map_err(decode_err)?),
        Type::FLOAT4 => Value::from(row.try_get::<_, Option<f32>>(idx).map_err(decode_err)?),
        Type::FLOAT8 => Value::from(row.try_get::<_, Option<f64>>(idx).map_err(decode_err)?),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .map_err(decode_err)?
            .map_or(Value::Null, Value::Json),
        Type::UUID => Value::from(
            row.try_get::<_, Option<uuid::Uuid>>(idx)
                .map_err(decode_err)?,
        ),
        Type::DATE => Value::from(
            row.try_get::<_, Option<chrono::NaiveDate>>(idx)
                .map_err(decode_err)?,
        ),
        Type::TIME => Value::from(
            row.try_get::<_, Option<chrono::NaiveTime>>(idx)
                .map_err(decode_err)?,
        ),
        Type::TIMESTAMP => Value::from(
            row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
                .map_err(decode_err)?,
        ),
        Type::TIMESTAMPTZ => Value::from(
            row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
                .map_err(decode_err)?,
        ),
        _ => Value::from(row.try_get::<_, Option<String>>(idx).map_err(|_| {
            QbError::decode(
                name,
                format!("unsupported column type {}", column.type_()),
            )
        })?),
    };
    Ok(value)
}

/// A [`Value`] bound as a statement parameter, encoded for the declared type.
#[derive(Debug)]
struct PgParam<'a>(&'a Value);

type EncodeError = Box<dyn Error + Sync + Send>;

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, EncodeError> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => encode_int(*i, ty, out),
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::FLOAT8 => f.to_sql(ty, out),
                _ => encode_text(&f.to_string(), ty, out),
            },
            Value::Json(v) => match *ty {
                Type::JSON | Type::JSONB => v.to_sql(ty, out),
                _ => encode_text(&v.to_string(), ty, out),
            },
            Value::Text(s) => encode_text(s, ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

fn encode_int(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, EncodeError> {
    match *ty {
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::INT8 => i.to_sql(ty, out),
        Type::OID => u32::try_from(i)?.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        _ => encode_text(&i.to_string(), ty, out),
    }
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, EncodeError> {
    match *ty {
        Type::BOOL => match s {
            "t" | "true" | "TRUE" | "1" => true.to_sql(ty, out),
            "f" | "false" | "FALSE" | "0" => false.to_sql(ty, out),
            _ => Err(format!("cannot encode '{s}' as bool").into()),
        },
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => encode_int(s.trim().parse()?, ty, out),
        Type::FLOAT4 | Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(s)?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)
            .unwrap_or_else(|_| serde_json::Value::String(s.to_string()))
            .to_sql(ty, out),
        Type::DATE => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIMESTAMP => {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")?.to_sql(ty, out)
        }
        Type::TIMESTAMPTZ => chrono::DateTime::parse_from_rfc3339(s)?
            .with_timezone(&chrono::Utc)
            .to_sql(ty, out),
        _ if <&str as ToSql>::accepts(ty) => s.to_sql(ty, out),
        _ => Err(format!("cannot encode text as {ty}").into()),
    }
}

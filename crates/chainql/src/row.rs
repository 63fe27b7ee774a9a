//! Row type and mapping traits

use crate::error::{QbError, QbResult};
use crate::value::{FromValue, Value};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// One fetched row: ordered column names plus their values.
///
/// Column names are shared between all rows of a result, so cloning a row only
/// copies its values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row. Missing trailing values are filled with NULL.
    pub fn new(columns: Arc<[String]>, mut values: Vec<Value>) -> Self {
        values.resize(columns.len(), Value::Null);
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a column by name (first match wins).
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// Value of a column by position.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Typed column access, returning [`QbError::Decode`] on failure.
    pub fn try_get<T: FromValue>(&self, column: &str) -> QbResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| QbError::decode(column, "no such column"))?;
        T::from_value(value).map_err(|message| QbError::decode(column, message))
    }

    /// Typed positional access.
    pub fn try_get_index<T: FromValue>(&self, index: usize) -> QbResult<T> {
        let column = self
            .columns
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("#{index}"));
        let value = self
            .values
            .get(index)
            .ok_or_else(|| QbError::decode(&column, "no such column"))?;
        T::from_value(value).map_err(|message| QbError::decode(column, message))
    }

    /// The row as a JSON object, preserving column order.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Deserialize the row into any `serde` type, matching fields by column name.
    pub fn deserialize<T: DeserializeOwned>(&self) -> QbResult<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}

/// Trait for converting a fetched row into a Rust struct by hand.
///
/// Types that implement `serde::Deserialize` can skip this and use
/// [`Row::deserialize`] instead.
///
/// # Example
///
/// ```
/// use chainql::{FromRow, QbResult, Row};
///
/// struct User {
///     id: i64,
///     username: String,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &Row) -> QbResult<Self> {
///         Ok(Self {
///             id: row.try_get("id")?,
///             username: row.try_get("username")?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// Convert a row into Self
    fn from_row(row: &Row) -> QbResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> QbResult<Self> {
        Ok(row.clone())
    }
}

impl FromRow for serde_json::Value {
    fn from_row(row: &Row) -> QbResult<Self> {
        Ok(row.to_json())
    }
}

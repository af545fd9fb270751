/*
 * Copyright 2022 Jordan Matelsky
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Key-value table services for the table backend.
//!
//! A table service is a hosted store of named tables. Each table holds items keyed by a string
//! partition key and an optional numeric sort key. Table services provide only the handful of
//! operations the [`TableBackend`] needs, so supporting a new hosted table store is a matter of
//! implementing [`TableService`].
//!
//! The following table services are provided:
//! - `MemoryTableService` keeps tables in memory. It is useful for testing.
//! - `SqliteTableService` keeps tables in a SQLite database. It requires the `table-sqlite`
//! feature.
//! - `DynamoDbTableService` keeps tables in Amazon DynamoDB. It requires the `table-dynamodb`
//! feature.
//!
//! [`TableBackend`]: crate::backend::TableBackend

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use static_assertions::assert_obj_safe;

#[cfg(feature = "table-dynamodb")]
pub use self::dynamodb_table::{DynamoDbConfig, DynamoDbTableService};
pub use self::memory_table::MemoryTableService;
#[cfg(feature = "table-sqlite")]
pub use self::sqlite_table::{SqliteTableConfig, SqliteTableService};

mod dynamodb_table;
mod memory_table;
mod sqlite_table;

/// An item in a table.
pub type Item = Map<String, Value>;

/// The type of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeType {
    String,
    Number,
}

/// An attribute which is part of a table's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttribute {
    /// The name of the attribute.
    pub name: String,

    /// The type of the attribute.
    pub kind: AttributeType,
}

impl KeyAttribute {
    /// Return a new string key attribute.
    pub fn string(name: impl Into<String>) -> Self {
        KeyAttribute {
            name: name.into(),
            kind: AttributeType::String,
        }
    }

    /// Return a new numeric key attribute.
    pub fn number(name: impl Into<String>) -> Self {
        KeyAttribute {
            name: name.into(),
            kind: AttributeType::Number,
        }
    }
}

/// The key schema of a table.
///
/// Tables are always created with on-demand capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// The name of the table.
    pub name: String,

    /// The partition key.
    pub partition_key: KeyAttribute,

    /// The optional sort key.
    pub sort_key: Option<KeyAttribute>,
}

/// The lifecycle state of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// The table is being created and can't be used yet.
    Creating,

    /// The table is ready for reads and writes.
    Active,

    /// The table is being deleted.
    Deleting,
}

/// A condition attached to a put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutCondition {
    /// Write the item, replacing any item with the same key.
    Always,

    /// Write the item only if no item with the same key exists.
    ///
    /// `attribute` names the table's partition key.
    IfAbsent { attribute: String },
}

/// The outcome of a put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The item was written.
    Written,

    /// The item was not written because its condition did not hold.
    ConditionFailed,
}

/// A query for the items under one partition key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// The name of the partition key attribute.
    pub partition_key: String,

    /// The partition key value to match.
    pub partition_value: String,

    /// Whether to return items in ascending sort key order.
    pub ascending: bool,

    /// The maximum number of items to return.
    pub limit: Option<usize>,
}

/// A hosted store of key-value tables.
///
/// Every operation is a single blocking call to the service. Implementations do not retry.
pub trait TableService: Debug + Send {
    /// Return the names of all tables.
    fn list_tables(&mut self) -> anyhow::Result<Vec<String>>;

    /// Start creating a table described by `spec` with on-demand capacity.
    ///
    /// The table may not be usable until [`table_status`] reports `TableStatus::Active`.
    ///
    /// [`table_status`]: crate::table::TableService::table_status
    fn create_table(&mut self, spec: &TableSpec) -> anyhow::Result<()>;

    /// Return the status of the table named `table`, or `None` if it does not exist.
    fn table_status(&mut self, table: &str) -> anyhow::Result<Option<TableStatus>>;

    /// Start deleting the table named `table` and all of its items.
    fn delete_table(&mut self, table: &str) -> anyhow::Result<()>;

    /// Return the item whose primary key attributes equal those in `key`.
    fn get_item(&mut self, table: &str, key: &Item) -> anyhow::Result<Option<Item>>;

    /// Write `item`, subject to `condition`.
    ///
    /// Each put is atomic on its own.
    fn put_item(
        &mut self,
        table: &str,
        item: Item,
        condition: PutCondition,
    ) -> anyhow::Result<PutOutcome>;

    /// Return the items matching `query`, ordered by sort key.
    fn query(&mut self, table: &str, query: &Query) -> anyhow::Result<Vec<Item>>;
}

assert_obj_safe!(TableService);

/// A value which can be used to connect to a `TableService`.
pub trait OpenTableService {
    /// The type of `TableService` which this value can be used to connect to.
    type Service: TableService + 'static;

    /// Connect to the table service.
    ///
    /// # Errors
    /// - `Error::Store`: An error occurred with the table service.
    /// - `Error::Io`: An I/O error occurred.
    fn open(&self) -> crate::Result<Self::Service>;
}

/// Return the primary key of `item` under `spec` as a partition value and sort value.
///
/// Tables without a sort key use `0` as the sort value.
pub(crate) fn item_key(spec: &TableSpec, item: &Item) -> anyhow::Result<(String, i64)> {
    let partition = match (spec.partition_key.kind, item.get(&spec.partition_key.name)) {
        (AttributeType::String, Some(Value::String(value))) => value.clone(),
        (AttributeType::Number, Some(Value::Number(value))) => value.to_string(),
        _ => anyhow::bail!(
            "The item has no valid partition key attribute '{}'.",
            spec.partition_key.name
        ),
    };

    let sort = match &spec.sort_key {
        None => 0,
        Some(attribute) => match item.get(&attribute.name).and_then(Value::as_i64) {
            Some(value) if attribute.kind == AttributeType::Number => value,
            _ => anyhow::bail!(
                "The item has no valid sort key attribute '{}'.",
                attribute.name
            ),
        },
    };

    Ok((partition, sort))
}

/// Check that `name` is a valid table name.
///
/// Table names are between 3 and 255 ASCII letters, digits, `_`, `-` and `.`.
pub(crate) fn validate_table_name(name: &str) -> anyhow::Result<()> {
    let valid_symbols = name
        .chars()
        .all(|symbol| symbol.is_ascii_alphanumeric() || matches!(symbol, '_' | '-' | '.'));
    if !(3..=255).contains(&name.len()) || !valid_symbols {
        anyhow::bail!("'{}' is not a valid table name.", name);
    }
    Ok(())
}

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

#![cfg(feature = "table-sqlite")]

use std::fmt::{self, Debug, Formatter};
use std::path::PathBuf;

use anyhow::bail;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    item_key, validate_table_name, Item, OpenTableService, PutCondition, PutOutcome, Query,
    TableService, TableSpec, TableStatus,
};

/// The configuration for opening a [`SqliteTableService`].
///
/// [`SqliteTableService`]: crate::table::SqliteTableService
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(docsrs, doc(cfg(feature = "table-sqlite")))]
pub struct SqliteTableConfig {
    /// The path of the SQLite database.
    pub path: PathBuf,
}

impl OpenTableService for SqliteTableConfig {
    type Service = SqliteTableService;

    fn open(&self) -> crate::Result<Self::Service> {
        let connection = Connection::open(&self.path)
            .map_err(|error| crate::Error::Store(anyhow::Error::from(error)))?;
        SqliteTableService::from_connection(connection)
    }
}

/// A `TableService` which keeps tables in a SQLite database.
///
/// Each table is a SQLite table of serialized items keyed by partition and sort value. The key
/// schema of each table is kept in a catalogue table. Tables are active as soon as they are
/// created.
///
/// You can use [`SqliteTableConfig`] to open a table service of this type.
///
/// [`SqliteTableConfig`]: crate::table::SqliteTableConfig
#[cfg_attr(docsrs, doc(cfg(feature = "table-sqlite")))]
pub struct SqliteTableService {
    connection: Connection,
}

impl Debug for SqliteTableService {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteTableService")
            .field("path", &self.connection.path())
            .finish_non_exhaustive()
    }
}

/// Return the name of the SQLite table which stores the items of `table`.
///
/// Table names are validated before they get here, so quoting them is enough.
fn storage_table(table: &str) -> String {
    format!("\"items:{}\"", table)
}

impl SqliteTableService {
    /// Return a table service backed by a private in-memory database.
    pub fn in_memory() -> crate::Result<Self> {
        let connection = Connection::open_in_memory()
            .map_err(|error| crate::Error::Store(anyhow::Error::from(error)))?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> crate::Result<Self> {
        connection
            .execute_batch(
                r#"
                    CREATE TABLE IF NOT EXISTS Tables (
                        name TEXT PRIMARY KEY,
                        spec TEXT NOT NULL
                    );
                "#,
            )
            .map_err(|error| crate::Error::Store(anyhow::Error::from(error)))?;

        Ok(SqliteTableService { connection })
    }

    /// Return the spec of the table named `table`.
    fn spec(&self, table: &str) -> anyhow::Result<TableSpec> {
        let spec: Option<String> = self
            .connection
            .query_row(
                r#"
                    SELECT spec FROM Tables
                    WHERE name = ?1;
                "#,
                params![table],
                |row| row.get(0),
            )
            .optional()?;

        match spec {
            Some(spec) => Ok(serde_json::from_str(&spec)?),
            None => bail!("The table '{}' does not exist.", table),
        }
    }
}

impl TableService for SqliteTableService {
    fn list_tables(&mut self) -> anyhow::Result<Vec<String>> {
        let mut statement = self
            .connection
            .prepare(r#"SELECT name FROM Tables ORDER BY name;"#)?;

        let names = statement
            .query_map(params![], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(names)
    }

    fn create_table(&mut self, spec: &TableSpec) -> anyhow::Result<()> {
        validate_table_name(&spec.name)?;

        let transaction = self.connection.transaction()?;
        transaction.execute(
            r#"
                INSERT INTO Tables (name, spec)
                VALUES (?1, ?2);
            "#,
            params![spec.name, serde_json::to_string(spec)?],
        )?;
        transaction.execute_batch(&format!(
            r#"
                CREATE TABLE {} (
                    pk TEXT NOT NULL,
                    sk INTEGER NOT NULL,
                    item TEXT NOT NULL,
                    PRIMARY KEY (pk, sk)
                );
            "#,
            storage_table(&spec.name)
        ))?;
        transaction.commit()?;

        Ok(())
    }

    fn table_status(&mut self, table: &str) -> anyhow::Result<Option<TableStatus>> {
        let exists = self
            .connection
            .query_row(
                r#"
                    SELECT 1 FROM Tables
                    WHERE name = ?1;
                "#,
                params![table],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        Ok(if exists {
            Some(TableStatus::Active)
        } else {
            None
        })
    }

    fn delete_table(&mut self, table: &str) -> anyhow::Result<()> {
        validate_table_name(table)?;

        let transaction = self.connection.transaction()?;
        let removed = transaction.execute(
            r#"
                DELETE FROM Tables
                WHERE name = ?1;
            "#,
            params![table],
        )?;
        if removed == 0 {
            bail!("The table '{}' does not exist.", table);
        }
        transaction.execute_batch(&format!("DROP TABLE {};", storage_table(table)))?;
        transaction.commit()?;

        Ok(())
    }

    fn get_item(&mut self, table: &str, key: &Item) -> anyhow::Result<Option<Item>> {
        let (partition, sort) = item_key(&self.spec(table)?, key)?;

        let item: Option<String> = self
            .connection
            .query_row(
                &format!(
                    "SELECT item FROM {} WHERE pk = ?1 AND sk = ?2;",
                    storage_table(table)
                ),
                params![partition, sort],
                |row| row.get(0),
            )
            .optional()?;

        match item {
            Some(item) => Ok(Some(serde_json::from_str(&item)?)),
            None => Ok(None),
        }
    }

    fn put_item(
        &mut self,
        table: &str,
        item: Item,
        condition: PutCondition,
    ) -> anyhow::Result<PutOutcome> {
        let (partition, sort) = item_key(&self.spec(table)?, &item)?;
        let verb = match condition {
            PutCondition::Always => "INSERT OR REPLACE",
            PutCondition::IfAbsent { .. } => "INSERT OR IGNORE",
        };

        let written = self.connection.execute(
            &format!(
                "{} INTO {} (pk, sk, item) VALUES (?1, ?2, ?3);",
                verb,
                storage_table(table)
            ),
            params![partition, sort, serde_json::to_string(&item)?],
        )?;

        Ok(if written == 0 {
            PutOutcome::ConditionFailed
        } else {
            PutOutcome::Written
        })
    }

    fn query(&mut self, table: &str, query: &Query) -> anyhow::Result<Vec<Item>> {
        let spec = self.spec(table)?;
        if query.partition_key != spec.partition_key.name {
            bail!(
                "'{}' is not the partition key of table '{}'.",
                query.partition_key,
                table
            );
        }

        let order = if query.ascending { "ASC" } else { "DESC" };
        // SQLite treats a negative limit as no limit.
        let limit = query
            .limit
            .map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX));

        let mut statement = self.connection.prepare(&format!(
            "SELECT item FROM {} WHERE pk = ?1 ORDER BY sk {} LIMIT ?2;",
            storage_table(table),
            order
        ))?;

        let serialized = statement
            .query_map(params![query.partition_value, limit], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        let items = serialized
            .iter()
            .map(|item| serde_json::from_str(item))
            .collect::<Result<Vec<Item>, _>>()?;

        Ok(items)
    }
}

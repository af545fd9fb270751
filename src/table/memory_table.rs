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

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail};

use super::{
    item_key, validate_table_name, Item, OpenTableService, PutCondition, PutOutcome, Query,
    TableService, TableSpec, TableStatus,
};

#[derive(Debug)]
struct MemoryTable {
    spec: TableSpec,

    /// The number of status polls left before the table becomes active.
    pending_polls: u32,

    items: BTreeMap<(String, i64), Item>,
}

/// A `TableService` which keeps tables in memory.
///
/// Clones of a `MemoryTableService` share the same tables, so a clone can be kept around to
/// inspect the tables a backend has written to. Data is not stored persistently and is only
/// accessible to the current process. This table service is useful for testing.
///
/// A new table reports `TableStatus::Creating` for a configurable number of status polls before
/// it becomes active, and rejects reads and writes until then.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableService {
    tables: Arc<Mutex<HashMap<String, MemoryTable>>>,
    creation_polls: u32,
}

impl MemoryTableService {
    /// Create a new `MemoryTableService` with no tables whose tables are active immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new `MemoryTableService` whose tables stay in the creating state for
    /// `creation_polls` status polls.
    pub fn with_creation_polls(creation_polls: u32) -> Self {
        MemoryTableService {
            tables: Arc::default(),
            creation_polls,
        }
    }

    /// Return the number of items in the table named `table`, or `None` if it does not exist.
    pub fn item_count(&self, table: &str) -> Option<usize> {
        let tables = self.tables.lock().ok()?;
        tables.get(table).map(|table| table.items.len())
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, HashMap<String, MemoryTable>>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("The memory table lock is poisoned."))
    }
}

/// Return the table named `name` if it exists and is active.
fn active_table<'a>(
    tables: &'a mut HashMap<String, MemoryTable>,
    name: &str,
) -> anyhow::Result<&'a mut MemoryTable> {
    match tables.get_mut(name) {
        Some(table) if table.pending_polls == 0 => Ok(table),
        Some(_) => bail!("The table '{}' is still being created.", name),
        None => bail!("The table '{}' does not exist.", name),
    }
}

impl OpenTableService for MemoryTableService {
    type Service = MemoryTableService;

    fn open(&self) -> crate::Result<Self::Service> {
        Ok(self.clone())
    }
}

impl TableService for MemoryTableService {
    fn list_tables(&mut self) -> anyhow::Result<Vec<String>> {
        let mut names = self.lock()?.keys().cloned().collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }

    fn create_table(&mut self, spec: &TableSpec) -> anyhow::Result<()> {
        validate_table_name(&spec.name)?;
        let pending_polls = self.creation_polls;
        let mut tables = self.lock()?;

        if tables.contains_key(&spec.name) {
            bail!("The table '{}' already exists.", spec.name);
        }

        tables.insert(
            spec.name.clone(),
            MemoryTable {
                spec: spec.clone(),
                pending_polls,
                items: BTreeMap::new(),
            },
        );

        Ok(())
    }

    fn table_status(&mut self, table: &str) -> anyhow::Result<Option<TableStatus>> {
        let mut tables = self.lock()?;
        Ok(tables.get_mut(table).map(|table| {
            if table.pending_polls == 0 {
                TableStatus::Active
            } else {
                table.pending_polls -= 1;
                TableStatus::Creating
            }
        }))
    }

    fn delete_table(&mut self, table: &str) -> anyhow::Result<()> {
        match self.lock()?.remove(table) {
            Some(_) => Ok(()),
            None => bail!("The table '{}' does not exist.", table),
        }
    }

    fn get_item(&mut self, table: &str, key: &Item) -> anyhow::Result<Option<Item>> {
        let mut tables = self.lock()?;
        let table = active_table(&mut tables, table)?;
        let key = item_key(&table.spec, key)?;
        Ok(table.items.get(&key).cloned())
    }

    fn put_item(
        &mut self,
        table: &str,
        item: Item,
        condition: PutCondition,
    ) -> anyhow::Result<PutOutcome> {
        let mut tables = self.lock()?;
        let table = active_table(&mut tables, table)?;
        let key = item_key(&table.spec, &item)?;

        if let PutCondition::IfAbsent { .. } = condition {
            if table.items.contains_key(&key) {
                return Ok(PutOutcome::ConditionFailed);
            }
        }

        table.items.insert(key, item);
        Ok(PutOutcome::Written)
    }

    fn query(&mut self, table: &str, query: &Query) -> anyhow::Result<Vec<Item>> {
        let mut tables = self.lock()?;
        let table = active_table(&mut tables, table)?;

        if query.partition_key != table.spec.partition_key.name {
            bail!(
                "'{}' is not the partition key of table '{}'.",
                query.partition_key,
                table.spec.name
            );
        }

        let start = (query.partition_value.clone(), i64::MIN);
        let end = (query.partition_value.clone(), i64::MAX);
        let matching = table.items.range(start..=end).map(|(_, item)| item.clone());
        let limit = query.limit.unwrap_or(usize::MAX);

        let items = if query.ascending {
            matching.take(limit).collect()
        } else {
            matching.rev().take(limit).collect()
        };

        Ok(items)
    }
}

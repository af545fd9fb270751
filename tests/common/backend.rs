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

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use rstest::*;
use tempfile::TempDir;

use datatops::backend::{FileBackend, FileConfig, OpenBackend, TableBackend, TableConfig};
use datatops::clock::FixedClock;
use datatops::key::RandomKeyGenerator;
use datatops::table::{MemoryTableService, OpenTableService};
#[cfg(feature = "table-dynamodb")]
use datatops::table::{DynamoDbConfig, DynamoDbTableService};
#[cfg(feature = "table-sqlite")]
use datatops::table::{SqliteTableConfig, SqliteTableService};

use super::TEST_TIME;

/// The name of the records table used by table backend fixtures.
pub const DATA_TABLE: &str = "datatops_test_records";

/// The name of the project table used by table backend fixtures.
pub const PROJECT_TABLE: &str = "datatops_test_projects";

/// A value which is tied to the lifetime of a temporary directory.
pub struct WithTempDir<T> {
    pub directory: TempDir,
    pub value: T,
}

impl<T> Deref for WithTempDir<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> DerefMut for WithTempDir<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

/// Return a table backend config for `tables` which doesn't wait between status polls.
pub fn table_config<T: OpenTableService>(tables: T) -> TableConfig<T> {
    let mut config = TableConfig::new(tables, DATA_TABLE);
    config.project_table = String::from(PROJECT_TABLE);
    config.ready_poll_interval = Duration::ZERO;
    config
}

/// Open a table backend with deterministic keys and a stopped clock.
pub fn open_table_backend<T: OpenTableService>(config: &TableConfig<T>) -> TableBackend<T::Service> {
    config
        .open()
        .unwrap()
        .with_key_generator(RandomKeyGenerator::seeded(2))
        .with_clock(FixedClock::at_unix(TEST_TIME))
}

#[fixture]
pub fn file_backend() -> WithTempDir<FileBackend> {
    let directory = tempfile::tempdir().unwrap();
    let config = FileConfig {
        path: directory.as_ref().join("data"),
    };
    let backend = config
        .open()
        .unwrap()
        .with_key_generator(RandomKeyGenerator::seeded(1))
        .with_clock(FixedClock::at_unix(TEST_TIME));
    WithTempDir {
        directory,
        value: backend,
    }
}

/// A table backend over in-memory tables which take a few polls to become active.
#[fixture]
pub fn table_backend() -> TableBackend<MemoryTableService> {
    open_table_backend(&table_config(MemoryTableService::with_creation_polls(2)))
}

#[cfg(feature = "table-sqlite")]
#[fixture]
pub fn sqlite_table_backend() -> WithTempDir<TableBackend<SqliteTableService>> {
    let directory = tempfile::tempdir().unwrap();
    let config = table_config(SqliteTableConfig {
        path: directory.as_ref().join("tables.db"),
    });
    let backend = open_table_backend(&config);
    WithTempDir {
        directory,
        value: backend,
    }
}

/// A table backend over DynamoDB, configured from the environment.
///
/// Tests which use this must drop the tables when they are done.
#[cfg(feature = "table-dynamodb")]
pub fn dynamodb_table_backend() -> TableBackend<DynamoDbTableService> {
    let tables = DynamoDbConfig {
        region: dotenv::var("DYNAMODB_REGION").ok(),
        endpoint: dotenv::var("DYNAMODB_ENDPOINT").ok(),
    };
    let mut config = table_config(tables);
    config.ready_poll_interval = Duration::from_secs(1);
    config.ready_attempts = 120;
    open_table_backend(&config)
}

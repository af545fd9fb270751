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

use std::thread::sleep;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::contract::Backend;
use super::open_backend::OpenBackend;
use crate::clock::{Clock, SystemClock};
use crate::key::{KeyGenerator, RandomKeyGenerator};
use crate::project::{validate_project_name, Credentials, Project, ReadPolicy};
use crate::record::{Record, PROJECT_KEY, TIMESTAMP_KEY};
use crate::table::{
    Item, KeyAttribute, OpenTableService, PutCondition, PutOutcome, Query, TableService,
    TableSpec, TableStatus,
};

/// The default name of the table which holds project keys.
pub const DEFAULT_PROJECT_TABLE: &str = "datatops_project_list";

/// The partition key of the project table.
const PROJECT_NAME_ATTRIBUTE: &str = "name";

/// The configuration for opening a [`TableBackend`].
///
/// [`TableBackend`]: crate::backend::TableBackend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig<T> {
    /// The table service to connect to.
    pub tables: T,

    /// The name of the table which holds records.
    pub data_table: String,

    /// The name of the table which holds project keys.
    pub project_table: String,

    /// Which keys grant read access to a project.
    pub read_policy: ReadPolicy,

    /// How long to wait between polls while a table is being created or deleted.
    pub ready_poll_interval: Duration,

    /// How many times to poll a table before giving up on it.
    pub ready_attempts: u32,
}

impl<T> TableConfig<T> {
    /// Return a config for a backend which stores records in `data_table` on `tables`, with the
    /// default project table and polling behavior.
    pub fn new(tables: T, data_table: impl Into<String>) -> Self {
        TableConfig {
            tables,
            data_table: data_table.into(),
            project_table: DEFAULT_PROJECT_TABLE.to_string(),
            read_policy: ReadPolicy::AnyKey,
            ready_poll_interval: Duration::from_secs(20),
            ready_attempts: 25,
        }
    }
}

impl<T: OpenTableService> OpenBackend for TableConfig<T> {
    type Backend = TableBackend<T::Service>;

    fn open(&self) -> crate::Result<Self::Backend> {
        let mut backend = TableBackend {
            service: self.tables.open()?,
            data_table: self.data_table.clone(),
            project_table: self.project_table.clone(),
            read_policy: self.read_policy,
            ready_poll_interval: self.ready_poll_interval,
            ready_attempts: self.ready_attempts,
            keys: Box::new(RandomKeyGenerator::new()),
            clock: Box::new(SystemClock),
        };

        for spec in [backend.data_spec(), backend.project_spec()] {
            backend.ensure_table(&spec)?;
        }

        Ok(backend)
    }
}

/// A `Backend` which stores projects and records in two key-value tables.
///
/// Records live in a data table keyed by project name (partition key) and integer epoch-second
/// timestamp (sort key). Each stored record is stamped with that timestamp, replacing any
/// timestamp the caller supplied, and with the project's name. Project keys live in a project
/// table keyed by project name, so authorization is a single item lookup.
///
/// Both tables are created with on-demand capacity if they don't exist when the backend is
/// opened, and opening blocks until both are active.
///
/// A record is never overwritten. When its timestamp second is already taken, it is stamped with
/// the second after the project's latest record instead, so sort order is append order as long
/// as the clock does not run backwards.
///
/// You can use [`TableConfig`] to open a backend of this type.
///
/// [`TableConfig`]: crate::backend::TableConfig
#[derive(Debug)]
pub struct TableBackend<S> {
    service: S,
    data_table: String,
    project_table: String,
    read_policy: ReadPolicy,
    ready_poll_interval: Duration,
    ready_attempts: u32,
    keys: Box<dyn KeyGenerator>,
    clock: Box<dyn Clock>,
}

impl<S: TableService> TableBackend<S> {
    /// Use `keys` to generate the keys of new projects.
    pub fn with_key_generator(mut self, keys: impl KeyGenerator + 'static) -> Self {
        self.keys = Box::new(keys);
        self
    }

    /// Use `clock` to stamp records.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Delete both tables and every project and record in them.
    ///
    /// This is for tearing down test fixtures. It is not part of [`Backend`] and must never be
    /// reachable from a network-facing path. Nothing happens unless `confirm` is `true`.
    ///
    /// This blocks until both tables are gone.
    ///
    /// # Errors
    /// - `Error::NotConfirmed`: `confirm` was `false`.
    /// - `Error::TableNotReady`: A table was not deleted in time.
    /// - `Error::Store`: An error occurred with the table service.
    ///
    /// [`Backend`]: crate::backend::Backend
    pub fn drop_tables(&mut self, confirm: bool) -> crate::Result<()> {
        if !confirm {
            warn!("refused to drop tables without confirmation");
            return Err(crate::Error::NotConfirmed);
        }

        for table in [self.data_table.clone(), self.project_table.clone()] {
            warn!(table = %table, "dropping table");
            self.service
                .delete_table(&table)
                .map_err(crate::Error::Store)?;
            self.wait_for_status(&table, None)?;
        }

        Ok(())
    }

    fn data_spec(&self) -> TableSpec {
        TableSpec {
            name: self.data_table.clone(),
            partition_key: KeyAttribute::string(PROJECT_KEY),
            sort_key: Some(KeyAttribute::number(TIMESTAMP_KEY)),
        }
    }

    fn project_spec(&self) -> TableSpec {
        TableSpec {
            name: self.project_table.clone(),
            partition_key: KeyAttribute::string(PROJECT_NAME_ATTRIBUTE),
            sort_key: None,
        }
    }

    /// Create the table described by `spec` if it does not exist and wait until it is active.
    fn ensure_table(&mut self, spec: &TableSpec) -> crate::Result<()> {
        let tables = self.service.list_tables().map_err(crate::Error::Store)?;

        if !tables.contains(&spec.name) {
            info!(table = %spec.name, "creating table");
            self.service
                .create_table(spec)
                .map_err(crate::Error::Store)?;
        }

        self.wait_for_status(&spec.name, Some(TableStatus::Active))
    }

    /// Poll the status of `table` until it is `expected`.
    fn wait_for_status(
        &mut self,
        table: &str,
        expected: Option<TableStatus>,
    ) -> crate::Result<()> {
        for attempt in 0..=self.ready_attempts {
            if attempt > 0 {
                sleep(self.ready_poll_interval);
            }

            let status = self
                .service
                .table_status(table)
                .map_err(crate::Error::Store)?;
            if status == expected {
                return Ok(());
            }

            debug!(table, ?status, ?expected, "waiting for table");
        }

        Err(crate::Error::TableNotReady(table.to_string()))
    }

    /// Return the project called `name`, or `None` if there is none.
    fn get_project(&mut self, name: &str) -> crate::Result<Option<Project>> {
        if validate_project_name(name).is_err() {
            return Ok(None);
        }

        let mut key = Item::new();
        key.insert(
            PROJECT_NAME_ATTRIBUTE.to_string(),
            Value::String(name.to_string()),
        );

        let item = self
            .service
            .get_item(&self.project_table, &key)
            .map_err(crate::Error::Store)?;

        match item {
            None => Ok(None),
            Some(item) => serde_json::from_value(Value::Object(item))
                .map(Some)
                .map_err(|error| {
                    crate::Error::Corrupt(format!("The project item '{}' is invalid: {}", name, error))
                }),
        }
    }

    /// Return the timestamp of the latest record of `project`.
    fn latest_timestamp(&mut self, project: &str) -> crate::Result<Option<i64>> {
        let query = Query {
            partition_key: PROJECT_KEY.to_string(),
            partition_value: project.to_string(),
            ascending: false,
            limit: Some(1),
        };

        let latest = self
            .service
            .query(&self.data_table, &query)
            .map_err(crate::Error::Store)?;

        Ok(latest
            .first()
            .and_then(|item| item.get(TIMESTAMP_KEY))
            .and_then(Value::as_i64))
    }
}

impl<S: TableService> Backend for TableBackend<S> {
    fn create_project(&mut self, name: &str) -> crate::Result<Project> {
        validate_project_name(name)?;

        let project = Project {
            name: name.to_string(),
            user_key: self.keys.generate_user_key(),
            admin_key: self.keys.generate_admin_key(),
        };

        let mut item = Item::new();
        item.insert(
            PROJECT_NAME_ATTRIBUTE.to_string(),
            Value::String(project.name.clone()),
        );
        item.insert(
            String::from("user_key"),
            Value::String(project.user_key.clone()),
        );
        item.insert(
            String::from("admin_key"),
            Value::String(project.admin_key.clone()),
        );

        let condition = PutCondition::IfAbsent {
            attribute: PROJECT_NAME_ATTRIBUTE.to_string(),
        };
        let outcome = self
            .service
            .put_item(&self.project_table, item, condition)
            .map_err(crate::Error::Store)?;

        match outcome {
            PutOutcome::Written => {
                info!(project = name, "created project");
                Ok(project)
            }
            PutOutcome::ConditionFailed => {
                debug!(project = name, "project already exists");
                Err(crate::Error::AlreadyExists)
            }
        }
    }

    fn store(
        &mut self,
        project: &str,
        credentials: &Credentials,
        data: Record,
    ) -> crate::Result<bool> {
        debug!(project, "storing record");

        if !self.is_authorized_to_write(project, credentials)? {
            warn!(project, "refused unauthorized write");
            return Ok(false);
        }

        let mut item = data;
        item.insert(
            PROJECT_KEY.to_string(),
            Value::String(project.to_string()),
        );

        let now = self.clock.now().unix_timestamp();
        let mut timestamp = now;
        let condition = PutCondition::IfAbsent {
            attribute: PROJECT_KEY.to_string(),
        };

        loop {
            item.insert(TIMESTAMP_KEY.to_string(), Value::from(timestamp));

            let outcome = self
                .service
                .put_item(&self.data_table, item.clone(), condition.clone())
                .map_err(crate::Error::Store)?;

            match outcome {
                PutOutcome::Written => return Ok(true),
                PutOutcome::ConditionFailed => {
                    let latest = self.latest_timestamp(project)?.unwrap_or(timestamp);
                    timestamp = now.max(latest.saturating_add(1)).max(timestamp.saturating_add(1));
                    debug!(project, timestamp, "timestamp taken, moving record forward");
                }
            }
        }
    }

    fn list_data(
        &mut self,
        project: &str,
        credentials: &Credentials,
        limit: Option<usize>,
    ) -> crate::Result<Vec<Record>> {
        debug!(project, ?limit, "listing records");

        if !self.is_authorized_to_read(project, credentials)? {
            warn!(project, "refused unauthorized read");
            return Ok(Vec::new());
        }

        // Some table services reject a limit of zero.
        if limit == Some(0) {
            return Ok(Vec::new());
        }

        let query = Query {
            partition_key: PROJECT_KEY.to_string(),
            partition_value: project.to_string(),
            ascending: true,
            limit,
        };

        self.service
            .query(&self.data_table, &query)
            .map_err(crate::Error::Store)
    }

    fn list_projects(&mut self) -> crate::Result<Vec<String>> {
        Err(crate::Error::NotImplemented("list_projects"))
    }

    fn is_authorized_to_write(
        &mut self,
        project: &str,
        credentials: &Credentials,
    ) -> crate::Result<bool> {
        Ok(self
            .get_project(project)?
            .map_or(false, |project| project.grants_write(credentials)))
    }

    fn is_authorized_to_read(
        &mut self,
        project: &str,
        credentials: &Credentials,
    ) -> crate::Result<bool> {
        let read_policy = self.read_policy;
        Ok(self
            .get_project(project)?
            .map_or(false, |project| project.grants_read(credentials, read_policy)))
    }

    fn delete_project(&mut self, _project: &str, _admin_key: Option<&str>) -> crate::Result<()> {
        Err(crate::Error::NotImplemented("delete_project"))
    }
}

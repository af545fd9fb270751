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

use std::fmt;

use static_assertions::assert_obj_safe;

use crate::project::{Credentials, Project};
use crate::record::Record;

/// A persistent store of projects and their records.
///
/// A `Backend` stores projects, each uniquely identified by its name, and an append-only
/// sequence of records for each project. Every operation is a single synchronous call which
/// either succeeds or propagates the storage substrate's failure without retrying.
///
/// An absent project is never distinguished from a project the caller may not access. Both
/// make authorization checks return `false`, `store` return `false` and `list_data` return no
/// records, so that callers can't use a backend to enumerate project names.
pub trait Backend: fmt::Debug + Send {
    /// Create a new project called `name` with freshly generated keys.
    ///
    /// Creation is create-if-absent: an existing project is never overwritten, and its keys are
    /// never regenerated. A new project has no records.
    ///
    /// # Errors
    /// - `Error::AlreadyExists`: A project with this name already exists.
    /// - `Error::InvalidProject`: The name is not a valid project name.
    /// - `Error::Store`: An error occurred with the storage substrate.
    /// - `Error::Io`: An I/O error occurred.
    fn create_project(&mut self, name: &str) -> crate::Result<Project>;

    /// Append `data` to the records of `project`.
    ///
    /// This checks authorization itself, even if the caller already has. The backend stamps the
    /// record with its own timestamp representation before storing it.
    ///
    /// This returns `true` if the record was stored and `false` if the credentials do not allow
    /// writing to the project or the project does not exist.
    ///
    /// # Errors
    /// - `Error::Store`: An error occurred with the storage substrate.
    /// - `Error::Io`: An I/O error occurred.
    fn store(&mut self, project: &str, credentials: &Credentials, data: Record)
        -> crate::Result<bool>;

    /// Return the records of `project` in the order they were appended.
    ///
    /// If `limit` is `Some`, at most that many records are returned, taken from the start of the
    /// sequence. If the credentials do not allow reading the project or the project does not
    /// exist, this returns no records.
    ///
    /// # Errors
    /// - `Error::Store`: An error occurred with the storage substrate.
    /// - `Error::Io`: An I/O error occurred.
    fn list_data(
        &mut self,
        project: &str,
        credentials: &Credentials,
        limit: Option<usize>,
    ) -> crate::Result<Vec<Record>>;

    /// Return the names of all projects.
    ///
    /// # Errors
    /// - `Error::NotImplemented`: This backend can't list projects.
    /// - `Error::Store`: An error occurred with the storage substrate.
    /// - `Error::Io`: An I/O error occurred.
    fn list_projects(&mut self) -> crate::Result<Vec<String>>;

    /// Return whether `credentials` allow appending records to `project`.
    fn is_authorized_to_write(
        &mut self,
        project: &str,
        credentials: &Credentials,
    ) -> crate::Result<bool>;

    /// Return whether `credentials` allow listing the records of `project`.
    fn is_authorized_to_read(
        &mut self,
        project: &str,
        credentials: &Credentials,
    ) -> crate::Result<bool>;

    /// Delete `project` and all of its records.
    ///
    /// No backend implements this yet.
    ///
    /// # Errors
    /// - `Error::NotImplemented`: Always.
    fn delete_project(&mut self, project: &str, admin_key: Option<&str>) -> crate::Result<()>;
}

assert_obj_safe!(Backend);

impl Backend for Box<dyn Backend> {
    fn create_project(&mut self, name: &str) -> crate::Result<Project> {
        self.as_mut().create_project(name)
    }

    fn store(
        &mut self,
        project: &str,
        credentials: &Credentials,
        data: Record,
    ) -> crate::Result<bool> {
        self.as_mut().store(project, credentials, data)
    }

    fn list_data(
        &mut self,
        project: &str,
        credentials: &Credentials,
        limit: Option<usize>,
    ) -> crate::Result<Vec<Record>> {
        self.as_mut().list_data(project, credentials, limit)
    }

    fn list_projects(&mut self) -> crate::Result<Vec<String>> {
        self.as_mut().list_projects()
    }

    fn is_authorized_to_write(
        &mut self,
        project: &str,
        credentials: &Credentials,
    ) -> crate::Result<bool> {
        self.as_mut().is_authorized_to_write(project, credentials)
    }

    fn is_authorized_to_read(
        &mut self,
        project: &str,
        credentials: &Credentials,
    ) -> crate::Result<bool> {
        self.as_mut().is_authorized_to_read(project, credentials)
    }

    fn delete_project(&mut self, project: &str, admin_key: Option<&str>) -> crate::Result<()> {
        self.as_mut().delete_project(project, admin_key)
    }
}

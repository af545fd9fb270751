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

//! Storage backends for projects and their records.
//!
//! This module contains the [`Backend`] trait, which is implemented by every storage substrate,
//! and the [`OpenBackend`] trait, which is implemented by the config values used to open them.
//!
//! The following backends are provided:
//! - `FileBackend` stores JSON documents in a directory in the local file system. It is meant for
//! development and testing.
//! - `TableBackend` stores records and project keys in two tables of a [`TableService`].
//!
//! Both backends fold a missing project into the unauthorized case, so `store` returns `false`
//! and `list_data` returns no records. They differ in how records are timestamped and in whether
//! read access can be restricted to the admin key, so callers shouldn't assume the two behave
//! identically in those respects.
//!
//! [`Backend`]: crate::backend::Backend
//! [`OpenBackend`]: crate::backend::OpenBackend
//! [`TableService`]: crate::table::TableService

pub use self::contract::Backend;
pub use self::file_backend::{FileBackend, FileConfig};
pub use self::open_backend::OpenBackend;
pub use self::table_backend::{TableBackend, TableConfig, DEFAULT_PROJECT_TABLE};

mod contract;
mod file_backend;
mod open_backend;
mod table_backend;

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

//! `datatops` is a super-simple multi-tenant append-only data logger.
//!
//! Clients create named projects, receive a user key and an admin key, and then append arbitrary
//! JSON records to a project or read them back. Either key grants access to its project.
//!
//! Records are kept by a `Backend`, which is a small trait that can be implemented to support new
//! storage substrates. The following backends are provided:
//! - `FileBackend` stores JSON documents in a directory in the local file system.
//! - `TableBackend` stores records and project keys in two tables of a `TableService`, such as
//! `MemoryTableService`, `SqliteTableService` or `DynamoDbTableService`.
//!
//! A `Server` binds one backend to a request/response surface, and the `http-server` feature
//! serves it over HTTP.
//!
//! # Examples
//! ```
//! use datatops::backend::{Backend, FileConfig, OpenBackend};
//! use datatops::project::Credentials;
//! use serde_json::json;
//!
//! fn main() -> datatops::Result<()> {
//!     let directory = tempfile::tempdir()?;
//!     let mut backend = FileConfig { path: directory.path().to_path_buf() }.open()?;
//!
//!     // Create a project and use its user key to append a record.
//!     let project = backend.create_project("alpha")?;
//!     let credentials = Credentials::user(project.user_key);
//!
//!     let record = json!({"x": 1}).as_object().cloned().unwrap_or_default();
//!     assert!(backend.store("alpha", &credentials, record)?);
//!
//!     let records = backend.list_data("alpha", &credentials, None)?;
//!     assert_eq!(records.len(), 1);
//!     assert_eq!(records[0]["x"], json!(1));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Features
//! Some functionality is gated behind cargo features:
//!
//! Type | Cargo Feature
//! --- | ---
//! `SqliteTableService` | `table-sqlite`
//! `DynamoDbTableService` | `table-dynamodb`
//! `server::http` | `http-server`
//!
//! To use one of these types, you must enable the corresponding feature in your `Cargo.toml`.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use uuid;

pub use error::{Error, Result};

pub mod backend;
pub mod clock;
mod error;
pub mod key;
pub mod project;
pub mod record;
pub mod server;
pub mod table;

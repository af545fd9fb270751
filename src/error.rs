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

use std::io;
use std::result;

use thiserror::Error as DeriveError;

/// The error type for operations with a backend.
#[derive(Debug, DeriveError)]
pub enum Error {
    /// A project with the given name already exists.
    #[error("A project with this name already exists.")]
    AlreadyExists,

    /// The given project name is not valid.
    #[error("The project name is invalid: {0}")]
    InvalidProject(String),

    /// The operation is declared by the backend contract but not implemented by this backend.
    #[error("This operation is not implemented: {0}")]
    NotImplemented(&'static str),

    /// A destructive operation was called without confirmation.
    #[error("This destructive operation was not confirmed.")]
    NotConfirmed,

    /// A table did not reach the expected state in time.
    #[error("The table '{0}' did not become ready.")]
    TableNotReady(String),

    /// A persisted document does not have the expected shape.
    #[error("A stored document is corrupt: {0}")]
    Corrupt(String),

    /// A timestamp could not be formatted.
    #[error("A timestamp could not be formatted.")]
    Timestamp(#[from] time::error::Format),

    /// An error occurred with the storage substrate.
    #[error("{0}")]
    Store(anyhow::Error),

    /// An I/O error occurred.
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// The result type for operations with a backend.
pub type Result<T> = result::Result<T, Error>;

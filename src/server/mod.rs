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

//! The request orchestrator which binds a backend to a request/response surface.
//!
//! A [`Server`] owns exactly one [`Backend`] for its lifetime. It turns requests into backend
//! calls and backend results into [`Reply`] values, which carry a status and a JSON envelope of
//! the form `{"status": "success", "data": ...}` or `{"status": "error", "message": ...}`.
//!
//! Missing input, authorization failures and name collisions become error envelopes. Substrate
//! failures and unimplemented operations are returned as `Err` so the transport layer can fail
//! the request.
//!
//! The `http-server` feature adds an HTTP transport in [`http`].
//!
//! [`Server`]: crate::server::Server
//! [`Backend`]: crate::backend::Backend
//! [`Reply`]: crate::server::Reply
//! [`http`]: crate::server::http

use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::clock::{Clock, SystemClock};
use crate::project::Credentials;
use crate::record::stamp_iso;

#[cfg(feature = "http-server")]
pub mod http;

/// The header which carries the user key.
pub const USER_KEY_HEADER: &str = "X-User-Key";

/// The header which carries the admin key.
pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

/// The header which carries the project creation secret.
pub const PROJECT_CREATION_SECRET_HEADER: &str = "X-Project-Creation-Secret";

/// The version reported by the index.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The message reported by the index.
pub const WELCOME_MESSAGE: &str = "Welcome to the Datatops API!";

/// The configuration of a [`Server`].
///
/// [`Server`]: crate::server::Server
#[derive(Default)]
pub struct ServerConfig {
    /// The secret which must accompany project creation requests.
    ///
    /// If this is `None`, anyone may create projects.
    pub project_creation_secret: Option<SecretString>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field(
                "project_creation_secret",
                &self.project_creation_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// The JSON body of a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope {
    /// The request succeeded.
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },

    /// The request failed.
    Error { message: String },
}

impl Envelope {
    fn error(message: impl Into<String>) -> Self {
        Envelope::Error {
            message: message.into(),
        }
    }
}

/// The outcome class of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    /// The request succeeded.
    Ok,

    /// The request was missing input or its input was invalid.
    BadRequest,

    /// The caller is not allowed to do this.
    Forbidden,
}

impl ReplyStatus {
    /// Return the HTTP status code of this status.
    pub fn code(self) -> u16 {
        match self {
            ReplyStatus::Ok => 200,
            ReplyStatus::BadRequest => 400,
            ReplyStatus::Forbidden => 403,
        }
    }
}

/// The reply to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: ReplyStatus,
    pub body: Envelope,
}

impl Reply {
    fn success(data: Option<Value>) -> Self {
        Reply {
            status: ReplyStatus::Ok,
            body: Envelope::Success { data },
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Reply {
            status: ReplyStatus::BadRequest,
            body: Envelope::error(message),
        }
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Reply {
            status: ReplyStatus::Forbidden,
            body: Envelope::error(message),
        }
    }
}

/// The body of the index reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub status: String,
    pub version: String,
    pub message: String,

    /// The server's time in fractional seconds since the Unix epoch.
    pub server_time: f64,
}

impl ServerInfo {
    /// Return the index body for a server whose clock reads `now`.
    pub fn at(now: OffsetDateTime) -> Self {
        ServerInfo {
            status: String::from("success"),
            version: VERSION.to_string(),
            message: WELCOME_MESSAGE.to_string(),
            server_time: now.unix_timestamp_nanos() as f64 / 1e9,
        }
    }
}

/// An orchestrator which serves requests from one `Backend`.
#[derive(Debug)]
pub struct Server<B> {
    backend: B,
    config: ServerConfig,
    clock: Arc<dyn Clock>,
}

impl<B: Backend> Server<B> {
    /// Return a server which serves requests from `backend`.
    pub fn new(backend: B, config: ServerConfig) -> Self {
        Server {
            backend,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` to stamp records and report the server time.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Return a handle to the clock this server reads.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Return a reference to the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Return a mutable reference to the backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Create a project called `project`.
    ///
    /// If a creation secret is configured, `secret` must match it or the request is refused
    /// before it reaches the backend.
    ///
    /// # Errors
    /// - `Error::Store`: An error occurred with the storage substrate.
    /// - `Error::Io`: An I/O error occurred.
    pub fn create_project(
        &mut self,
        project: Option<&str>,
        secret: Option<&str>,
    ) -> crate::Result<Reply> {
        if let Some(expected) = &self.config.project_creation_secret {
            if secret != Some(expected.expose_secret().as_str()) {
                warn!("refused project creation without a valid creation secret");
                return Ok(Reply::forbidden("Project could not be created."));
            }
        }

        let name = match project {
            Some(name) => name,
            None => return Ok(Reply::bad_request("Missing project name.")),
        };

        match self.backend.create_project(name) {
            Ok(project) => {
                let data = serde_json::to_value(project)
                    .map_err(|error| crate::Error::Store(anyhow::Error::from(error)))?;
                Ok(Reply::success(Some(data)))
            }
            Err(crate::Error::AlreadyExists) => Ok(Reply::bad_request(
                "Project could not be created. (Maybe it already exists?)",
            )),
            Err(crate::Error::InvalidProject(message)) => Ok(Reply::bad_request(message)),
            Err(error) => Err(error),
        }
    }

    /// Store `data` as a new record of `project`.
    ///
    /// The record is stamped with the current time as an ISO-8601 string. A backend may replace
    /// this with its own timestamp representation.
    ///
    /// # Errors
    /// - `Error::Store`: An error occurred with the storage substrate.
    /// - `Error::Io`: An I/O error occurred.
    pub fn store(
        &mut self,
        project: &str,
        credentials: &Credentials,
        data: Option<Value>,
    ) -> crate::Result<Reply> {
        let mut record = match data {
            None | Some(Value::Null) => return Ok(Reply::bad_request("Missing data.")),
            Some(Value::Object(record)) => record,
            Some(_) => return Ok(Reply::bad_request("Data must be a JSON object.")),
        };

        stamp_iso(&mut record, self.clock.now())?;

        if self.backend.store(project, credentials, record)? {
            Ok(Reply::success(None))
        } else {
            Ok(Reply::forbidden("Not authorized."))
        }
    }

    /// List the records of `project`.
    ///
    /// `limit` is the unparsed limit parameter, if one was given. Unauthorized callers get an
    /// empty list rather than an error.
    ///
    /// # Errors
    /// - `Error::Store`: An error occurred with the storage substrate.
    /// - `Error::Io`: An I/O error occurred.
    pub fn list_data(
        &mut self,
        project: &str,
        credentials: &Credentials,
        limit: Option<&str>,
    ) -> crate::Result<Reply> {
        let limit = match limit.map(|limit| limit.trim().parse::<usize>()) {
            None => None,
            Some(Ok(limit)) => Some(limit),
            Some(Err(_)) => {
                debug!(project, "rejected invalid limit");
                return Ok(Reply::bad_request("Invalid limit."));
            }
        };

        let records = self.backend.list_data(project, credentials, limit)?;
        let data = records.into_iter().map(Value::Object).collect();

        Ok(Reply::success(Some(Value::Array(data))))
    }

    /// Return information about the server.
    pub fn index(&self) -> ServerInfo {
        ServerInfo::at(self.clock.now())
    }
}

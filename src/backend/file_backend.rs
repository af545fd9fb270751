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

use std::fs::{create_dir_all, remove_file, rename, File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::contract::Backend;
use super::open_backend::OpenBackend;
use crate::clock::{Clock, SystemClock};
use crate::key::{KeyGenerator, RandomKeyGenerator};
use crate::project::{validate_project_name, Credentials, Project, ReadPolicy};
use crate::record::{stamp_iso, truncate, Record, TIMESTAMP_KEY};

// The names of top-level files in the backend's directory.
const REGISTRY_FILE: &str = "projects.json";
const STAGING_PREFIX: &str = ".staging-";

/// The project name which would collide with the registry document.
const RESERVED_NAME: &str = "projects";

/// The registry document, which holds every project and its keys.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    projects: Vec<Project>,
}

/// The document which holds the records of one project.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ProjectDocument {
    records: Vec<Record>,
}

/// Check that `name` can be used as a project name in a `FileBackend`.
fn validate_file_project_name(name: &str) -> crate::Result<()> {
    validate_project_name(name)?;
    if name == RESERVED_NAME {
        return Err(crate::Error::InvalidProject(format!(
            "The name '{}' is reserved.",
            RESERVED_NAME
        )));
    }
    Ok(())
}

/// The configuration for opening a [`FileBackend`].
///
/// [`FileBackend`]: crate::backend::FileBackend
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FileConfig {
    /// The path of the directory the backend stores its documents in.
    pub path: PathBuf,
}

impl OpenBackend for FileConfig {
    type Backend = FileBackend;

    fn open(&self) -> crate::Result<Self::Backend> {
        create_dir_all(&self.path)?;

        Ok(FileBackend {
            path: self.path.clone(),
            keys: Box::new(RandomKeyGenerator::new()),
            clock: Box::new(SystemClock),
        })
    }
}

/// A `Backend` which stores JSON documents in a directory in the local file system.
///
/// Each project's records are stored in `<project>.json` as `{"records": [...]}`, and every
/// project's keys are stored in the registry document `projects.json` as
/// `{"projects": [{"name", "user_key", "admin_key"}, ...]}`. Records are stamped with an ISO-8601
/// timestamp unless the caller already stamped them.
///
/// Every write replaces a whole document. Documents are replaced atomically, but there is no
/// locking: concurrent writers to the same project or to the registry can lose updates. Creating
/// the same name twice is still safe, since only one creator can create the project's document.
/// Concurrently creating different names is not: a creator whose registry update is lost still
/// gets keys back, but those keys never authorize anything, and its leftover `<project>.json`
/// makes further attempts to create that name fail with `Error::AlreadyExists`. This backend is
/// meant for development and testing, not production workloads.
///
/// You can use [`FileConfig`] to open a backend of this type.
///
/// [`FileConfig`]: crate::backend::FileConfig
#[derive(Debug)]
pub struct FileBackend {
    /// The path of the backend's root directory.
    path: PathBuf,

    keys: Box<dyn KeyGenerator>,

    clock: Box<dyn Clock>,
}

impl FileBackend {
    /// Use `keys` to generate the keys of new projects.
    pub fn with_key_generator(mut self, keys: impl KeyGenerator + 'static) -> Self {
        self.keys = Box::new(keys);
        self
    }

    /// Use `clock` to stamp records which arrive without a timestamp.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Return the path of the backend's root directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the path of the document which holds the records of `project`.
    fn project_path(&self, project: &str) -> PathBuf {
        self.path.join(format!("{}.json", project))
    }

    fn registry_path(&self) -> PathBuf {
        self.path.join(REGISTRY_FILE)
    }

    /// Return a new staging path.
    fn staging_path(&self) -> PathBuf {
        let uuid_str = Uuid::new_v4().as_hyphenated().to_string();
        self.path.join(format!("{}{}", STAGING_PREFIX, uuid_str))
    }

    fn read_document<T: DeserializeOwned>(path: &Path) -> crate::Result<T> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file)).map_err(|error| {
            if error.is_io() {
                crate::Error::Io(io::Error::from(error))
            } else {
                crate::Error::Corrupt(format!("{}: {}", path.display(), error))
            }
        })
    }

    /// Replace the document at `path` with `document`.
    fn write_document<T: Serialize>(&self, path: &Path, document: &T) -> crate::Result<()> {
        let staging_path = self.staging_path();

        // Write to a staging file and then atomically move it to its final destination.
        let written = File::create(&staging_path).and_then(|mut staging_file| {
            serde_json::to_writer(&mut staging_file, document)?;
            staging_file.flush()?;
            rename(&staging_path, path)
        });

        if written.is_err() {
            let _ = remove_file(&staging_path);
        }

        Ok(written?)
    }

    fn read_registry(&self) -> crate::Result<Registry> {
        let registry_path = self.registry_path();
        if registry_path.exists() {
            Self::read_document(&registry_path)
        } else {
            Ok(Registry::default())
        }
    }

    /// Return the project called `name`, or `None` if there is none.
    ///
    /// This scans the registry linearly.
    fn find_project(&self, name: &str) -> crate::Result<Option<Project>> {
        if validate_file_project_name(name).is_err() || !self.project_path(name).exists() {
            return Ok(None);
        }

        Ok(self
            .read_registry()?
            .projects
            .into_iter()
            .find(|project| project.name == name))
    }

    /// Add `project` to the registry, replacing any stale entry with the same name.
    fn register(&self, project: &Project) -> crate::Result<()> {
        let mut registry = self.read_registry()?;
        registry.projects.retain(|existing| existing.name != project.name);
        registry.projects.push(project.clone());
        self.write_document(&self.registry_path(), &registry)
    }
}

impl Backend for FileBackend {
    fn create_project(&mut self, name: &str) -> crate::Result<Project> {
        validate_file_project_name(name)?;
        let project_path = self.project_path(name);

        // Creating the document is the create-if-absent step, so two creators of the same name
        // can't both succeed.
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&project_path)
        {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(project = name, "project already exists");
                return Err(crate::Error::AlreadyExists);
            }
            Err(error) => return Err(error.into()),
        };

        let project = Project {
            name: name.to_string(),
            user_key: self.keys.generate_user_key(),
            admin_key: self.keys.generate_admin_key(),
        };

        let created = serde_json::to_writer(&mut file, &ProjectDocument::default())
            .map_err(io::Error::from)
            .and_then(|()| file.flush())
            .map_err(crate::Error::from)
            .and_then(|()| self.register(&project));

        if let Err(error) = created {
            drop(file);
            let _ = remove_file(&project_path);
            return Err(error);
        }

        info!(project = name, "created project");
        Ok(project)
    }

    fn store(
        &mut self,
        project: &str,
        credentials: &Credentials,
        mut data: Record,
    ) -> crate::Result<bool> {
        debug!(project, "storing record");

        if !self.is_authorized_to_write(project, credentials)? {
            warn!(project, "refused unauthorized write");
            return Ok(false);
        }

        if !data.contains_key(TIMESTAMP_KEY) {
            stamp_iso(&mut data, self.clock.now())?;
        }

        let project_path = self.project_path(project);
        let mut document: ProjectDocument = Self::read_document(&project_path)?;
        document.records.push(data);
        self.write_document(&project_path, &document)?;

        Ok(true)
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

        let document: ProjectDocument = Self::read_document(&self.project_path(project))?;
        Ok(truncate(document.records, limit))
    }

    fn list_projects(&mut self) -> crate::Result<Vec<String>> {
        Ok(self
            .read_registry()?
            .projects
            .into_iter()
            .map(|project| project.name)
            .collect())
    }

    fn is_authorized_to_write(
        &mut self,
        project: &str,
        credentials: &Credentials,
    ) -> crate::Result<bool> {
        Ok(self
            .find_project(project)?
            .map_or(false, |project| project.grants_write(credentials)))
    }

    fn is_authorized_to_read(
        &mut self,
        project: &str,
        credentials: &Credentials,
    ) -> crate::Result<bool> {
        Ok(self
            .find_project(project)?
            .map_or(false, |project| {
                project.grants_read(credentials, ReadPolicy::AnyKey)
            }))
    }

    fn delete_project(&mut self, _project: &str, _admin_key: Option<&str>) -> crate::Result<()> {
        Err(crate::Error::NotImplemented("delete_project"))
    }
}

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

use serde::{Deserialize, Serialize};

/// The maximum length of a project name in bytes.
pub const MAX_PROJECT_NAME_LEN: usize = 255;

/// A named, independently keyed data bucket.
///
/// This is what a backend returns when a project is created. It is the only time the keys are
/// handed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// The unique name of the project.
    pub name: String,

    /// The key which grants read and write access.
    pub user_key: String,

    /// The privileged key, which also grants read and write access.
    pub admin_key: String,
}

impl Project {
    /// Return whether `credentials` allow writing records to this project.
    pub fn grants_write(&self, credentials: &Credentials) -> bool {
        credentials.has_user_key(&self.user_key) || credentials.has_admin_key(&self.admin_key)
    }

    /// Return whether `credentials` allow reading records from this project under `policy`.
    pub fn grants_read(&self, credentials: &Credentials, policy: ReadPolicy) -> bool {
        match policy {
            ReadPolicy::AnyKey => self.grants_write(credentials),
            ReadPolicy::AdminOnly => credentials.has_admin_key(&self.admin_key),
        }
    }
}

/// The keys a caller presents with a request.
///
/// Either key may be absent. A missing key never matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// The presented user key.
    pub user_key: Option<String>,

    /// The presented admin key.
    pub admin_key: Option<String>,
}

impl Credentials {
    /// Return new credentials from an optional user key and an optional admin key.
    pub fn new(user_key: Option<String>, admin_key: Option<String>) -> Self {
        Credentials {
            user_key,
            admin_key,
        }
    }

    /// Return credentials consisting of only a user key.
    pub fn user(key: impl Into<String>) -> Self {
        Credentials {
            user_key: Some(key.into()),
            admin_key: None,
        }
    }

    /// Return credentials consisting of only an admin key.
    pub fn admin(key: impl Into<String>) -> Self {
        Credentials {
            user_key: None,
            admin_key: Some(key.into()),
        }
    }

    fn has_user_key(&self, expected: &str) -> bool {
        self.user_key.as_deref() == Some(expected)
    }

    fn has_admin_key(&self, expected: &str) -> bool {
        self.admin_key.as_deref() == Some(expected)
    }
}

/// Which keys grant read access to a project.
///
/// Write access is always granted by either key. The file backend only supports
/// `ReadPolicy::AnyKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Either the user key or the admin key grants read access.
    #[default]
    AnyKey,

    /// Only the admin key grants read access.
    AdminOnly,
}

/// Check that `name` can be used as a project name.
///
/// A project name is between 1 and [`MAX_PROJECT_NAME_LEN`] bytes of ASCII letters, digits, `-`,
/// `_` and `.`, and does not start with `.`.
///
/// # Errors
/// - `Error::InvalidProject`: The name is not valid.
pub fn validate_project_name(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::Error::InvalidProject(String::from(
            "The name must not be empty.",
        )));
    }

    if name.len() > MAX_PROJECT_NAME_LEN {
        return Err(crate::Error::InvalidProject(format!(
            "The name must be at most {} bytes long.",
            MAX_PROJECT_NAME_LEN
        )));
    }

    if name.starts_with('.') {
        return Err(crate::Error::InvalidProject(String::from(
            "The name must not start with '.'.",
        )));
    }

    if let Some(symbol) = name
        .chars()
        .find(|symbol| !(symbol.is_ascii_alphanumeric() || matches!(symbol, '-' | '_' | '.')))
    {
        return Err(crate::Error::InvalidProject(format!(
            "The name must not contain {:?}.",
            symbol
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        Project {
            name: String::from("alpha"),
            user_key: String::from("uk1abcde"),
            admin_key: String::from("a-00000000-0000-4000-8000-000000000000"),
        }
    }

    #[test]
    fn either_key_grants_write() {
        let project = project();

        assert!(project.grants_write(&Credentials::user("uk1abcde")));
        assert!(project.grants_write(&Credentials::admin(
            "a-00000000-0000-4000-8000-000000000000"
        )));
        assert!(project.grants_write(&Credentials::new(
            Some(String::from("wrong")),
            Some(project.admin_key.clone())
        )));
    }

    #[test]
    fn mismatched_or_missing_keys_do_not_grant_write() {
        let project = project();

        assert!(!project.grants_write(&Credentials::default()));
        assert!(!project.grants_write(&Credentials::user("wrong")));
        // Keys are only checked against their own slot.
        assert!(!project.grants_write(&Credentials::admin("uk1abcde")));
        assert!(!project.grants_write(&Credentials::user(project.admin_key.clone())));
    }

    #[test]
    fn admin_only_policy_ignores_user_key() {
        let project = project();

        assert!(project.grants_read(&Credentials::user("uk1abcde"), ReadPolicy::AnyKey));
        assert!(!project.grants_read(&Credentials::user("uk1abcde"), ReadPolicy::AdminOnly));
        assert!(project.grants_read(
            &Credentials::admin(project.admin_key.clone()),
            ReadPolicy::AdminOnly
        ));
    }

    #[test]
    fn valid_project_names() {
        for name in ["alpha", "my-project_2", "v1.0", "A"] {
            assert!(validate_project_name(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn invalid_project_names() {
        let too_long = "x".repeat(MAX_PROJECT_NAME_LEN + 1);
        for name in ["", ".hidden", "../etc", "a/b", "a b", "naïve", too_long.as_str()] {
            assert!(
                matches!(
                    validate_project_name(name),
                    Err(crate::Error::InvalidProject(_))
                ),
                "{:?} should be invalid",
                name
            );
        }
    }
}

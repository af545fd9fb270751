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

use crate::backend::Backend;

/// A value which can be used to open a `Backend`.
pub trait OpenBackend {
    /// The type of `Backend` which this value can be used to open.
    type Backend: Backend + 'static;

    /// Open or create a backend of type `Backend`.
    ///
    /// This prepares the storage the backend needs, creating it if it does not already exist.
    ///
    /// # Errors
    /// - `Error::TableNotReady`: A table did not become ready in time.
    /// - `Error::Store`: An error occurred with the storage substrate.
    /// - `Error::Io`: An I/O error occurred.
    fn open(&self) -> crate::Result<Self::Backend>;
}

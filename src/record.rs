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

use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// One stored payload: a mapping of string keys to JSON values.
pub type Record = Map<String, Value>;

/// The reserved field every stored record is stamped with.
///
/// The file backend stores an ISO-8601 string here and the table backend stores integer seconds
/// since the Unix epoch.
pub const TIMESTAMP_KEY: &str = "__datatops_timestamp_iso";

/// The reserved field the table backend stores the owning project's name in.
pub const PROJECT_KEY: &str = "__datatops_project";

/// Format `instant` the way records stamped with an ISO-8601 timestamp store it.
pub fn iso_timestamp(instant: OffsetDateTime) -> crate::Result<String> {
    Ok(instant.format(&Rfc3339)?)
}

/// Stamp `record` with `instant` as an ISO-8601 string, replacing any existing timestamp.
pub fn stamp_iso(record: &mut Record, instant: OffsetDateTime) -> crate::Result<()> {
    record.insert(
        TIMESTAMP_KEY.to_string(),
        Value::String(iso_timestamp(instant)?),
    );
    Ok(())
}

/// Return the first `limit` records of `records`, or all of them if `limit` is `None`.
pub(crate) fn truncate(mut records: Vec<Record>, limit: Option<usize>) -> Vec<Record> {
    if let Some(limit) = limit {
        records.truncate(limit);
    }
    records
}

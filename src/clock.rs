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

use std::fmt::Debug;

use static_assertions::assert_obj_safe;
use time::OffsetDateTime;

/// A source of the current time, used to stamp incoming records.
pub trait Clock: Debug + Send + Sync {
    /// Return the current time.
    fn now(&self) -> OffsetDateTime;
}

assert_obj_safe!(Clock);

/// A `Clock` which reads the system time in UTC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A `Clock` which is stopped at a single instant.
///
/// This is useful for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock {
    instant: OffsetDateTime,
}

impl FixedClock {
    /// Return a clock stopped at `instant`.
    pub fn new(instant: OffsetDateTime) -> Self {
        FixedClock { instant }
    }

    /// Return a clock stopped at the given number of seconds since the Unix epoch.
    ///
    /// Out-of-range values are clamped to the Unix epoch.
    pub fn at_unix(seconds: i64) -> Self {
        FixedClock {
            instant: OffsetDateTime::from_unix_timestamp(seconds)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.instant
    }
}

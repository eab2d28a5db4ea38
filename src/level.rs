// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Named levels and numeric severities.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::Error;

/// A named logging level.
///
/// Levels are ordered by severity, from the most verbose `Trace` to the most severe `Critical`:
///
/// | Level      | Severity |
/// |------------|----------|
/// | `TRACE`    | 5        |
/// | `DEBUG`    | 10       |
/// | `INFO`     | 20       |
/// | `SUCCESS`  | 25       |
/// | `WARNING`  | 30       |
/// | `ERROR`    | 40       |
/// | `CRITICAL` | 50       |
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Success,
    Warning,
    Error,
    Critical,
}

impl Level {
    const ALL: [Level; 7] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Success,
        Level::Warning,
        Level::Error,
        Level::Critical,
    ];

    /// The upper-case name of this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Success => "SUCCESS",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }

    /// The numeric severity of this level.
    pub fn severity(&self) -> u32 {
        match self {
            Level::Trace => 5,
            Level::Debug => 10,
            Level::Info => 20,
            Level::Success => 25,
            Level::Warning => 30,
            Level::Error => 40,
            Level::Critical => 50,
        }
    }

    /// Look up a level by its name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Level> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(name))
    }

    /// Look up a level by its exact severity.
    pub fn from_severity(severity: u32) -> Option<Level> {
        Level::ALL
            .into_iter()
            .find(|level| level.severity() == severity)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::from_name(s.trim())
            .ok_or_else(|| Error::config("unknown level").with_context("level", s))
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Level::Error,
            log::Level::Warn => Level::Warning,
            log::Level::Info => Level::Info,
            log::Level::Debug => Level::Debug,
            log::Level::Trace => Level::Trace,
        }
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Severity(u32),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Name(name) => Level::from_name(name.trim())
                .ok_or_else(|| serde::de::Error::custom(format!("unknown level: {name}"))),
            Repr::Severity(n) => Level::from_severity(n)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown level severity: {n}"))),
        }
    }
}

/// The severity a record is emitted with.
///
/// Records from ambient facilities may carry levels this crate has no name for; those keep their
/// numeric severity instead of failing.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Severity {
    Named(Level),
    Numeric(u32),
}

impl Severity {
    /// Map an ambient `(name, number)` pair onto a severity.
    ///
    /// A same-named [`Level`] wins; otherwise the number passes through unchanged.
    pub fn from_ambient(name: &str, number: u32) -> Severity {
        match Level::from_name(name) {
            Some(level) => Severity::Named(level),
            None => Severity::Numeric(number),
        }
    }

    /// The numeric severity.
    pub fn number(&self) -> u32 {
        match self {
            Severity::Named(level) => level.severity(),
            Severity::Numeric(n) => *n,
        }
    }

    /// The display name; numeric severities render as `Level <n>`.
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Severity::Named(level) => Cow::Borrowed(level.as_str()),
            Severity::Numeric(n) => Cow::Owned(format!("Level {n}")),
        }
    }

    /// Whether this severity passes a handler threshold.
    pub fn passes(&self, threshold: Level) -> bool {
        self.number() >= threshold.severity()
    }
}

impl From<Level> for Severity {
    fn from(level: Level) -> Self {
        Severity::Named(level)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.name())
    }
}

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

//! Rotation policy for file sinks.
//!
//! A [`Rotation`] holds the thresholds only: either a time of day (`"00:00:00"`), a size
//! (`"10 MB"`, `"5 MiB"`) or a plain number of bytes. Every mounted file sink builds its own
//! [`RotationChecker`] from it, so a remount starts unanchored.

use jiff::civil::Time;
use serde::Deserialize;
use serde::Deserializer;

pub use self::checker::RotationChecker;
use crate::Error;

mod checker;
mod clock;

/// The rotation thresholds of one file sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    max_bytes: Option<u64>,
    daily_boundary: Option<Time>,
}

impl Rotation {
    /// Rotate on whichever trigger fires first; either may be absent.
    pub fn new(max_bytes: Option<u64>, daily_boundary: Option<Time>) -> Self {
        Rotation {
            max_bytes,
            daily_boundary,
        }
    }

    /// Rotate once the file reaches `max_bytes`.
    pub fn size(max_bytes: u64) -> Self {
        Rotation::new(Some(max_bytes), None)
    }

    /// Rotate every day at `boundary`.
    pub fn daily(boundary: Time) -> Self {
        Rotation::new(None, Some(boundary))
    }

    /// The size trigger, in bytes.
    pub fn max_bytes(&self) -> Option<u64> {
        self.max_bytes
    }

    /// The time-of-day trigger.
    pub fn daily_boundary(&self) -> Option<Time> {
        self.daily_boundary
    }

    /// A fresh, unanchored checker for one mounted sink.
    pub fn checker(&self) -> RotationChecker {
        RotationChecker::new(self.max_bytes, self.daily_boundary)
    }
}

impl<'de> Deserialize<'de> for Rotation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bytes(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bytes(n) => Ok(Rotation::size(n)),
            Repr::Text(text) => match text.trim().parse::<Time>() {
                Ok(boundary) => Ok(Rotation::daily(boundary)),
                Err(_) => parse_size(&text)
                    .map(Rotation::size)
                    .map_err(serde::de::Error::custom),
            },
        }
    }
}

/// Parse a human-friendly size such as `"10 MB"`, `"1.5GiB"` or `"4096"` into bytes.
///
/// Decimal units (`KB`, `MB`, `GB`) are powers of 1000, binary units (`KiB`, `MiB`, `GiB`) are
/// powers of 1024.
pub fn parse_size(text: &str) -> Result<u64, Error> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);

    let invalid = || Error::config("invalid size").with_context("size", text);
    let number = number.parse::<f64>().map_err(|_| invalid())?;
    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        _ => return Err(invalid()),
    };
    Ok((number * multiplier as f64) as u64)
}

/// Deserialize a size field that accepts either a number of bytes or a [`parse_size`] string.
pub(crate) fn deserialize_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Bytes(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Bytes(n) => Ok(n),
        Repr::Text(text) => parse_size(&text).map_err(serde::de::Error::custom),
    }
}

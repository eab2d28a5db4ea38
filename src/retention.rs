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

//! Retention policy for rotated files.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use jiff::Span;
use jiff::SpanRelativeTo;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::Error;

/// How many rotated files of one sink are kept.
///
/// Decoded from a number (`90` files, or `"90 files"`) or a friendly duration string
/// (`"30 days"`, `"1 week"`, `"12 hours"`, `"1d 12h"`); days count as 24 hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keep at most this many rotated files.
    Files(usize),
    /// Remove rotated files older than this.
    Age(Duration),
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retention::Files(n) => write!(f, "{n} files"),
            Retention::Age(age) => write!(f, "{} seconds", age.as_secs()),
        }
    }
}

impl FromStr for Retention {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::config("invalid retention").with_context("retention", s);

        let text = s.trim().to_ascii_lowercase();
        let files = text
            .strip_suffix("files")
            .or_else(|| text.strip_suffix("file"))
            .unwrap_or(&text);
        if let Ok(n) = files.trim().parse::<usize>() {
            return Ok(Retention::Files(n));
        }

        let span: Span = text.parse().map_err(|err| invalid().with_source(err))?;
        let age = span
            .to_duration(SpanRelativeTo::days_are_24_hours())
            .and_then(Duration::try_from)
            .map_err(|err| invalid().with_source(err))?;
        Ok(Retention::Age(age))
    }
}

impl Serialize for Retention {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Retention::Files(n) => serializer.serialize_u64(*n as u64),
            Retention::Age(_) => serializer.collect_str(self),
        }
    }
}

impl<'de> Deserialize<'de> for Retention {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Files(usize),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Files(n) => Ok(Retention::Files(n)),
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retention() {
        assert_eq!("90".parse::<Retention>().unwrap(), Retention::Files(90));
        assert_eq!(
            "30 days".parse::<Retention>().unwrap(),
            Retention::Age(Duration::from_secs(30 * 24 * 3600))
        );
        assert_eq!(
            "1 week".parse::<Retention>().unwrap(),
            Retention::Age(Duration::from_secs(7 * 24 * 3600))
        );
        assert_eq!(
            "1d 12h".parse::<Retention>().unwrap(),
            Retention::Age(Duration::from_secs(36 * 3600))
        );
        assert_eq!("10 files".parse::<Retention>().unwrap(), Retention::Files(10));
        assert!("thirty days".parse::<Retention>().is_err());
        assert!("3 fortnights".parse::<Retention>().is_err());
        assert!("1 day ago".parse::<Retention>().is_err());
    }

    #[test]
    fn test_out_of_range_retention_is_rejected() {
        let err = "18446744073709551615 days".parse::<Retention>().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Config);
        assert_eq!(err.message(), "invalid retention");

        let err = serde_json::from_str::<Retention>("\"99999999999 weeks\"").unwrap_err();
        assert!(err.to_string().contains("invalid retention"), "{err}");
    }

    #[test]
    fn test_retention_serde() {
        let retention: Retention = serde_json::from_str("10").unwrap();
        assert_eq!(retention, Retention::Files(10));

        let age = Retention::Age(Duration::from_secs(3600));
        let json = serde_json::to_string(&age).unwrap();
        assert_eq!(json, "\"3600 seconds\"");
        assert_eq!(serde_json::from_str::<Retention>(&json).unwrap(), age);
    }
}

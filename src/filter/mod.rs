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

//! Filters for log records.
//!
//! Every handler carries exactly one [`Filter`]. The canonical filters are keyed by a
//! [`FilterClass`] and implement a two-layer opt-out: a record whose context sets
//! `disable_all_handlers` is rejected everywhere, and a record that sets
//! `disable_<class>_handler` is rejected only by handlers of that class.
//!
//! ```
//! use logforth_loader::filter::Filter;
//! use logforth_loader::filter::FilterClass;
//! use logforth_loader::record::Record;
//!
//! let record = Record::builder()
//!     .message("only on the console")
//!     .extra("disable_file_handler", "true")
//!     .build();
//!
//! assert!(Filter::from(FilterClass::Std).matches(&record));
//! assert!(!Filter::from(FilterClass::File).matches(&record));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;

pub use self::custom::CustomFilter;
use crate::Error;
use crate::record::Record;

mod custom;

/// The class of a canonical filter.
///
/// Each class matches one family of handlers and owns one `disable_<class>_handler` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterClass {
    /// Catch-all for handlers that are neither stream nor file; checks only the global flag.
    All,
    /// Stream handlers.
    Std,
    /// Plain-text file handlers.
    File,
    /// Plain-text error file handlers.
    FileErr,
    /// JSON file handlers.
    Json,
    /// JSON error file handlers.
    JsonErr,
}

impl FilterClass {
    /// The short name of this class.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterClass::All => "all",
            FilterClass::Std => "std",
            FilterClass::File => "file",
            FilterClass::FileErr => "file_err",
            FilterClass::Json => "json",
            FilterClass::JsonErr => "json_err",
        }
    }

    /// The context key that disables this class, if the class has one.
    pub fn disable_key(&self) -> Option<String> {
        match self {
            FilterClass::All => None,
            class => Some(format!("disable_{}_handler", class.as_str())),
        }
    }

    pub(crate) fn from_disable_key(key: &str) -> Option<FilterClass> {
        let class = key.strip_prefix("disable_")?.strip_suffix("_handler")?;
        match class.parse() {
            Ok(FilterClass::All) | Err(_) => None,
            Ok(class) => Some(class),
        }
    }
}

impl fmt::Display for FilterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FilterClass::All),
            "std" | "stream" => Ok(FilterClass::Std),
            "file" => Ok(FilterClass::File),
            "file_err" => Ok(FilterClass::FileErr),
            "json" => Ok(FilterClass::Json),
            "json_err" => Ok(FilterClass::JsonErr),
            _ => Err(Error::config("unknown filter class").with_context("filter", s)),
        }
    }
}

/// Derive the short level label shown by layouts.
///
/// `SUCCESS` becomes `OK`, `WARNING` becomes `WARN`, `CRITICAL` becomes `CRIT`; any other name
/// longer than five characters is truncated to five.
pub fn level_short(name: &str) -> &str {
    match name {
        "SUCCESS" => "OK",
        "WARNING" => "WARN",
        "CRITICAL" => "CRIT",
        name => match name.char_indices().nth(5) {
            Some((idx, _)) => &name[..idx],
            None => name,
        },
    }
}

/// Memoize the short level label into the record context and return it.
pub fn add_level_short(record: &Record) -> &str {
    record
        .extra()
        .level_short_or_init(|| level_short(&record.severity().name()).to_string())
}

/// Represents a filter that can be applied to log records.
#[derive(Debug, Clone)]
pub enum Filter {
    /// A canonical class filter.
    Class(FilterClass),
    /// A custom filter.
    Custom(CustomFilter),
}

impl Filter {
    /// Whether the record passes this filter.
    ///
    /// The short level label is memoized into the record context first, whatever the result.
    pub fn matches(&self, record: &Record) -> bool {
        add_level_short(record);

        match self {
            Filter::Class(class) => {
                let extra = record.extra();
                if extra.disable_all_handlers() {
                    return false;
                }
                *class == FilterClass::All || !extra.is_disabled(*class)
            }
            Filter::Custom(filter) => filter.matches(record),
        }
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Filter::Class(a), Filter::Class(b)) => a == b,
            (Filter::Custom(a), Filter::Custom(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<FilterClass> for Filter {
    fn from(class: FilterClass) -> Self {
        Filter::Class(class)
    }
}

impl FromStr for Filter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterClass::from_str(s).map(Filter::Class)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Filter::from_str(&name).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::level::Severity;
    use crate::record::DISABLE_ALL_HANDLERS;

    const CLASSES: [FilterClass; 6] = [
        FilterClass::All,
        FilterClass::Std,
        FilterClass::File,
        FilterClass::FileErr,
        FilterClass::Json,
        FilterClass::JsonErr,
    ];

    #[test]
    fn test_level_short() {
        assert_eq!(level_short("WARNING"), "WARN");
        assert_eq!(level_short("SUCCESS"), "OK");
        assert_eq!(level_short("CRITICAL"), "CRIT");
        assert_eq!(level_short("ERROR"), "ERROR");
        assert_eq!(level_short("TRACE"), "TRACE");
        assert_eq!(level_short("INFO"), "INFO");
        assert_eq!(level_short("Level 25"), "Level");
    }

    #[test]
    fn test_filter_memoizes_level_short() {
        let record = Record::builder().severity(Level::Warning).build();
        assert_eq!(record.extra().level_short(), None);

        assert!(Filter::from(FilterClass::Std).matches(&record));
        assert_eq!(record.extra().level_short(), Some("WARN"));

        let record = Record::builder().severity(Severity::Numeric(42)).build();
        assert!(Filter::from(FilterClass::All).matches(&record));
        assert_eq!(record.extra().level_short(), Some("Level"));
    }

    #[test]
    fn test_disable_all_handlers_wins() {
        let record = Record::builder()
            .extra(DISABLE_ALL_HANDLERS, "true")
            .build();
        for class in CLASSES {
            assert!(!Filter::from(class).matches(&record), "{class} accepted");
        }
    }

    #[test]
    fn test_disable_one_class() {
        let record = Record::builder()
            .extra("disable_file_handler", "true")
            .build();
        assert!(Filter::from(FilterClass::Std).matches(&record));
        assert!(!Filter::from(FilterClass::File).matches(&record));
        assert!(Filter::from(FilterClass::FileErr).matches(&record));
        assert!(Filter::from(FilterClass::Json).matches(&record));
        assert!(Filter::from(FilterClass::All).matches(&record));
    }

    #[test]
    fn test_plain_record_passes_everywhere() {
        let record = Record::builder().build();
        for class in CLASSES {
            assert!(Filter::from(class).matches(&record), "{class} rejected");
        }
    }

    #[test]
    fn test_disable_keys() {
        assert_eq!(FilterClass::All.disable_key(), None);
        assert_eq!(
            FilterClass::JsonErr.disable_key().as_deref(),
            Some("disable_json_err_handler")
        );
        assert_eq!(
            FilterClass::from_disable_key("disable_file_err_handler"),
            Some(FilterClass::FileErr)
        );
        assert_eq!(FilterClass::from_disable_key("disable_all_handler"), None);
        assert_eq!(FilterClass::from_disable_key("request_id"), None);
    }

    #[test]
    fn test_deserialize_filter() {
        let filter: Filter = serde_json::from_str("\"json_err\"").unwrap();
        assert_eq!(filter, Filter::Class(FilterClass::JsonErr));
        assert!(serde_json::from_str::<Filter>("\"bogus\"").is_err());
    }
}

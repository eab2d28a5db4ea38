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

//! Log record and its per-record context.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use jiff::Timestamp;

use crate::filter::FilterClass;
use crate::level::Level;
use crate::level::Severity;

/// The context key that disables every handler for one record.
pub const DISABLE_ALL_HANDLERS: &str = "disable_all_handlers";

/// The payload of a log message.
#[derive(Clone, Debug)]
pub struct Record {
    // the observed time
    time: Timestamp,

    // the metadata
    severity: Severity,
    name: String,
    module: Option<String>,
    file: Option<String>,
    line: Option<u32>,
    function: Option<String>,

    // the payload
    message: String,
    exception: Option<String>,

    // per-record context
    extra: Extra,
}

impl Record {
    /// Returns a new builder.
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    /// The observed time.
    pub fn time(&self) -> Timestamp {
        self.time
    }

    /// The severity of the message.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// The name of the logger that emitted the message.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module path of the message.
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// The source file containing the message.
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// The filename of the source file.
    pub fn filename(&self) -> Cow<'_, str> {
        self.file()
            .map(Path::new)
            .and_then(Path::file_name)
            .map(std::ffi::OsStr::to_string_lossy)
            .unwrap_or_default()
    }

    /// The line containing the message.
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    /// The function that emitted the message.
    pub fn function(&self) -> Option<&str> {
        self.function.as_deref()
    }

    /// The message body.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The rendered exception or error chain attached to the message.
    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    /// The per-record context.
    pub fn extra(&self) -> &Extra {
        &self.extra
    }
}

/// Per-record context carrying derived values and per-call routing overrides.
///
/// Filters memoize the short level label here so layouts can display it without recomputing.
/// The disable flags let a single log call silence one class of handlers, or all of them.
#[derive(Clone, Debug, Default)]
pub struct Extra {
    level_short: OnceLock<String>,
    disable_all_handlers: bool,
    disabled: BTreeSet<FilterClass>,
    kvs: Vec<(String, String)>,
}

impl Extra {
    /// Record one context entry.
    ///
    /// Known routing keys (`disable_all_handlers` and `disable_<class>_handler`) become flags;
    /// every other key is kept as a plain key-value.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if key == DISABLE_ALL_HANDLERS {
            self.disable_all_handlers = is_truthy(&value);
        } else if let Some(class) = FilterClass::from_disable_key(key) {
            if is_truthy(&value) {
                self.disabled.insert(class);
            } else {
                self.disabled.remove(&class);
            }
        } else {
            self.kvs.push((key.to_string(), value));
        }
    }

    /// Whether the record is disabled for all handlers.
    pub fn disable_all_handlers(&self) -> bool {
        self.disable_all_handlers
    }

    /// Whether the record is disabled for handlers of the given class.
    pub fn is_disabled(&self, class: FilterClass) -> bool {
        self.disabled.contains(&class)
    }

    /// The memoized short level label, if a filter has already derived it.
    pub fn level_short(&self) -> Option<&str> {
        self.level_short.get().map(String::as_str)
    }

    pub(crate) fn level_short_or_init(&self, f: impl FnOnce() -> String) -> &str {
        self.level_short.get_or_init(f)
    }

    /// Plain key-values that are not routing flags.
    pub fn key_values(&self) -> &[(String, String)] {
        &self.kvs
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Builder for [`Record`].
#[derive(Debug)]
pub struct RecordBuilder {
    record: Record,
}

impl Default for RecordBuilder {
    fn default() -> Self {
        RecordBuilder {
            record: Record {
                time: Timestamp::now(),
                severity: Severity::Named(Level::Info),
                name: String::new(),
                module: None,
                file: None,
                line: None,
                function: None,
                message: String::new(),
                exception: None,
                extra: Extra::default(),
            },
        }
    }
}

impl RecordBuilder {
    /// Set [`time`](Record::time).
    pub fn time(mut self, time: Timestamp) -> Self {
        self.record.time = time;
        self
    }

    /// Set [`severity`](Record::severity).
    pub fn severity(mut self, severity: impl Into<Severity>) -> Self {
        self.record.severity = severity.into();
        self
    }

    /// Set [`name`](Record::name).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.record.name = name.into();
        self
    }

    /// Set [`module`](Record::module).
    pub fn module(mut self, module: Option<&str>) -> Self {
        self.record.module = module.map(str::to_string);
        self
    }

    /// Set [`file`](Record::file).
    pub fn file(mut self, file: Option<&str>) -> Self {
        self.record.file = file.map(str::to_string);
        self
    }

    /// Set [`line`](Record::line).
    pub fn line(mut self, line: Option<u32>) -> Self {
        self.record.line = line;
        self
    }

    /// Set [`function`](Record::function).
    pub fn function(mut self, function: Option<&str>) -> Self {
        self.record.function = function.map(str::to_string);
        self
    }

    /// Set [`message`](Record::message).
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.record.message = message.into();
        self
    }

    /// Set [`exception`](Record::exception).
    pub fn exception(mut self, exception: Option<String>) -> Self {
        self.record.exception = exception;
        self
    }

    /// Add one context entry, see [`Extra::insert`].
    pub fn extra(mut self, key: &str, value: impl Into<String>) -> Self {
        self.record.extra.insert(key, value);
        self
    }

    /// Invoke the builder and return a `Record`
    pub fn build(self) -> Record {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_routing_keys() {
        let record = Record::builder()
            .extra("disable_file_handler", "true")
            .extra("request_id", "42")
            .extra(DISABLE_ALL_HANDLERS, "0")
            .build();

        let extra = record.extra();
        assert!(extra.is_disabled(FilterClass::File));
        assert!(!extra.is_disabled(FilterClass::Std));
        assert!(!extra.disable_all_handlers());
        assert_eq!(
            extra.key_values(),
            &[("request_id".to_string(), "42".to_string())]
        );
    }

    #[test]
    fn test_filename() {
        let record = Record::builder().file(Some("src/app/main.rs")).build();
        assert_eq!(record.filename(), "main.rs");
        assert_eq!(Record::builder().build().filename(), "");
    }
}

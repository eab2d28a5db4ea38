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

use std::fmt;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use jiff::Timestamp;

use crate::engine::Engine;
use crate::intercept::AmbientRegistry;
use crate::intercept::Route;
use crate::level::Severity;
use crate::record::Record;

/// One call frame of an ambient record, innermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub module: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
}

/// A record emitted by an ambient logging facility.
#[derive(Debug, Clone)]
pub struct AmbientRecord {
    pub name: String,
    pub level_name: String,
    pub level_no: u32,
    pub message: String,
    pub exception: Option<String>,
    pub time: Timestamp,
    /// Call frames from the emitting call outward.
    pub frames: Vec<Frame>,
    pub key_values: Vec<(String, String)>,
}

impl AmbientRecord {
    /// A record with the current time and no frames.
    pub fn new(
        name: impl Into<String>,
        level_name: impl Into<String>,
        level_no: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            level_name: level_name.into(),
            level_no,
            message: message.into(),
            exception: None,
            time: Timestamp::now(),
            frames: Vec::new(),
            key_values: Vec::new(),
        }
    }
}

/// The catch-all adapter installed as the root route of an ambient facility.
///
/// It forwards every record whose logger is not muted to the engine, with the severity mapped
/// and the call site attributed to the first frame outside the facility.
#[derive(Clone)]
pub struct Adapter {
    engine: Arc<dyn Engine>,
    registry: Arc<RwLock<dyn AmbientRegistry>>,
    facility: Vec<String>,
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("facility", &self.facility)
            .finish_non_exhaustive()
    }
}

impl Adapter {
    /// Creates an adapter that writes to `engine` and consults `registry` for routes.
    pub fn new(engine: Arc<dyn Engine>, registry: Arc<RwLock<dyn AmbientRegistry>>) -> Self {
        Self {
            engine,
            registry,
            facility: Vec::new(),
        }
    }

    /// Adds a module of the facility's own implementation; its frames are never the caller.
    pub fn facility_module(mut self, module: impl Into<String>) -> Self {
        self.facility.push(module.into());
        self
    }

    /// Whether records of the logger `name` reach the engine.
    ///
    /// Unknown loggers are registered on the way.
    pub fn enabled(&self, name: &str) -> bool {
        self.route(name) != Route::Muted
    }

    /// Forwards one ambient record to the engine.
    pub fn emit(&self, record: AmbientRecord) {
        if !self.enabled(&record.name) {
            return;
        }

        let caller = attribute_caller(&record.frames, &self.facility);
        let mut builder = Record::builder()
            .time(record.time)
            .severity(Severity::from_ambient(&record.level_name, record.level_no))
            .name(record.name)
            .message(record.message)
            .exception(record.exception);
        if let Some(frame) = caller {
            builder = builder
                .module(Some(frame.module.as_str()))
                .file(frame.file.as_deref())
                .line(frame.line)
                .function(frame.function.as_deref());
        }
        for (key, value) in record.key_values {
            builder = builder.extra(&key, value);
        }

        self.engine.log(&builder.build());
    }

    /// Flushes the engine.
    pub fn flush(&self) {
        self.engine.flush();
    }

    fn route(&self, name: &str) -> Route {
        {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            if name.is_empty() || registry.is_registered(name) {
                return registry.route(name);
            }
        }

        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.register(name);
        registry.route(name)
    }
}

/// The first frame, walking outward, whose module is not part of the facility.
///
/// Falls back to the outermost frame when every frame belongs to the facility.
pub fn attribute_caller<'a>(frames: &'a [Frame], facility: &[String]) -> Option<&'a Frame> {
    frames
        .iter()
        .find(|frame| !facility.iter().any(|m| within(&frame.module, m)))
        .or_else(|| frames.last())
}

fn within(module: &str, facility: &str) -> bool {
    match module.strip_prefix(facility) {
        Some(rest) => rest.is_empty() || rest.starts_with("::") || rest.starts_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::Error;
    use crate::engine::HandlerId;
    use crate::handler::ResolvedHandler;
    use crate::intercept::Registry;
    use crate::level::Level;

    #[derive(Debug, Default)]
    struct Recording {
        records: Mutex<Vec<Record>>,
    }

    impl Engine for Recording {
        fn add(&self, _: ResolvedHandler) -> Result<HandlerId, Error> {
            Ok(HandlerId(0))
        }

        fn remove(&self, _: HandlerId) -> Result<(), Error> {
            Ok(())
        }

        fn log(&self, record: &Record) {
            self.records.lock().unwrap().push(record.clone());
        }

        fn flush(&self) {}
    }

    fn frame(module: &str, line: u32) -> Frame {
        Frame {
            module: module.to_string(),
            file: Some(format!("src/{}.rs", module.replace("::", "/"))),
            line: Some(line),
            function: Some("call".to_string()),
        }
    }

    #[test]
    fn test_attribute_caller() {
        let facility = vec!["log".to_string()];
        let frames = vec![
            frame("log", 1),
            frame("log::__private_api", 2),
            frame("logger_ext", 3),
            frame("app", 4),
        ];
        let caller = attribute_caller(&frames, &facility).unwrap();
        assert_eq!(caller.module, "logger_ext");
        assert_eq!(caller.line, Some(3));

        let inside = vec![frame("log", 1), frame("log::kv", 2)];
        let caller = attribute_caller(&inside, &facility).unwrap();
        assert_eq!(caller.line, Some(2));

        assert!(attribute_caller(&[], &facility).is_none());
    }

    #[test]
    fn test_emit() {
        let engine = Arc::new(Recording::default());
        let mut registry = Registry::new();
        registry.set_root(Route::Intercepted);
        registry.set_route("noisy", Route::Muted);
        let registry = Arc::new(RwLock::new(registry));

        let adapter = Adapter::new(engine.clone(), registry.clone()).facility_module("log");

        let mut record = AmbientRecord::new("pkg.sub", "WARNING", 30, "disk almost full");
        record.frames = vec![frame("log", 10), frame("pkg::sub", 42)];
        record.key_values = vec![("disable_file_handler".to_string(), "1".to_string())];
        adapter.emit(record);
        adapter.emit(AmbientRecord::new("noisy.child", "INFO", 20, "dropped"));
        adapter.emit(AmbientRecord::new("pkg", "NOTICE", 25, "custom level"));

        let records = engine.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].severity(), Severity::Named(Level::Warning));
        assert_eq!(records[0].module(), Some("pkg::sub"));
        assert_eq!(records[0].file(), Some("src/pkg/sub.rs"));
        assert_eq!(records[0].line(), Some(42));
        assert!(records[0].extra().is_disabled(crate::filter::FilterClass::File));
        assert_eq!(records[1].severity(), Severity::Numeric(25));

        let registry = registry.read().unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "noisy".to_string(),
                "noisy.child".to_string(),
                "pkg".to_string(),
                "pkg.sub".to_string()
            ]
        );
    }
}

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

use std::fs;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;

use jiff::tz::TimeZone;
use logforth_loader::Engine;
use logforth_loader::ErrorKind;
use logforth_loader::HandlerSpec;
use logforth_loader::Level;
use logforth_loader::Loader;
use logforth_loader::LoggerConfig;
use logforth_loader::Record;
use logforth_loader::engine::Dispatcher;
use logforth_loader::handler::Sink;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn record(level: Level, message: &str) -> Record {
    Record::builder()
        .name("billing.api")
        .module(Some("billing::api"))
        .file(Some("src/api.rs"))
        .line(Some(51))
        .function(Some("charge"))
        .severity(level)
        .message(message)
        .build()
}

fn config(logs_dir: &TempDir) -> LoggerConfig {
    LoggerConfig::from_value(json!({
        "app_name": "billing",
        "default": {
            "format": "{level_short:<5} {name}:{function}:{line} {message}",
            "file": {"logs_dir": logs_dir.path()},
        },
    }))
    .unwrap()
}

#[test]
fn test_default_file_handlers() {
    let logs_dir = TempDir::new().expect("failed to create a temporary directory");
    let mut config = config(&logs_dir);
    for handler in &mut config.handlers {
        handler.enabled = handler.kind != logforth_loader::handler::HandlerKind::Stream;
    }

    let loader = Loader::new(config, Dispatcher::default().timezone(TimeZone::UTC));
    let engine = loader.load().unwrap();
    assert_eq!(engine.mounted().len(), 4);

    engine.log(&record(Level::Info, "charged"));
    engine.log(&record(Level::Error, "declined"));
    engine.log(
        &Record::builder()
            .name("billing.api")
            .severity(Level::Error)
            .message("not in plain files")
            .extra("disable_file_handler", "true")
            .extra("disable_file_err_handler", "true")
            .build(),
    );
    engine.flush();
    loader.remove_handler(None).unwrap();

    let all = fs::read_to_string(logs_dir.path().join("billing.std.all.log")).unwrap();
    assert_eq!(
        all,
        "INFO  billing.api:charge:51 charged\nERROR billing.api:charge:51 declined\n"
    );
    let err = fs::read_to_string(logs_dir.path().join("billing.std.err.log")).unwrap();
    assert_eq!(err, "ERROR billing.api:charge:51 declined\n");

    let json_all = fs::read_to_string(logs_dir.path().join("json/billing.json.all.log")).unwrap();
    let lines: Vec<Value> = json_all
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["record"]["message"], "charged");
    assert_eq!(lines[0]["record"]["function"], "charge");
    assert_eq!(lines[2]["record"]["message"], "not in plain files");

    let json_err = fs::read_to_string(logs_dir.path().join("json/billing.json.err.log")).unwrap();
    assert_eq!(json_err.lines().count(), 2);
}

#[test]
fn test_custom_serialize_and_debug() {
    let logs_dir = TempDir::new().expect("failed to create a temporary directory");
    let buffer = Buffer::default();
    let mut config = config(&logs_dir);
    config.debug = true;
    config.default.custom_serialize = true;
    config.handlers = vec![
        HandlerSpec {
            serialize: true,
            ..HandlerSpec::custom("json", Sink::writer(buffer.clone()))
        },
        HandlerSpec {
            is_error: true,
            ..HandlerSpec::custom("errors", Sink::writer(io::sink()))
        },
    ];

    let loader = Loader::new(config, Dispatcher::default());
    let engine = loader.load().unwrap();
    engine.log(&record(Level::Trace, "too verbose"));
    engine.log(&record(Level::Debug, "lowered by debug mode"));

    let contents = buffer.contents();
    let lines: Vec<Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 1, "{contents}");
    assert_eq!(lines[0]["level"]["name"], "DEBUG");
    assert_eq!(lines[0]["level_short"], "DEBUG");
    assert_eq!(lines[0]["message"], "lowered by debug mode");
}

#[test]
fn test_reload_after_update() {
    let logs_dir = TempDir::new().expect("failed to create a temporary directory");
    let buffer = Buffer::default();
    let mut config = config(&logs_dir);
    config.handlers = vec![HandlerSpec::custom("capture", Sink::writer(buffer.clone()))];

    let loader = Loader::new(config, Dispatcher::default());
    let engine = loader.load().unwrap();
    engine.log(&record(Level::Debug, "dropped at INFO"));

    loader
        .update_config(json!({"default": {"level": {"base": "DEBUG"}}}))
        .unwrap();
    engine.log(&record(Level::Debug, "still dropped before reload"));

    loader.load().unwrap();
    engine.log(&record(Level::Debug, "kept after reload"));

    assert_eq!(
        buffer.contents(),
        "DEBUG billing.api:charge:51 kept after reload\n"
    );
    assert_eq!(engine.mounted().len(), 1);
}

#[test]
fn test_incompatible_sink() {
    let logs_dir = TempDir::new().expect("failed to create a temporary directory");
    let mut config = config(&logs_dir);
    config.handlers = vec![
        HandlerSpec::custom("fine", Sink::writer(io::sink())),
        HandlerSpec {
            rotation: Some(logforth_loader::rotation::Rotation::size(1024)),
            ..HandlerSpec::custom("rotating-writer", Sink::writer(io::sink()))
        },
    ];

    let loader = Loader::new(config, Dispatcher::default());
    let err = loader.load().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(err.message(), "incompatible sink");
    assert!(loader.engine().mounted().is_empty());
    assert!(loader.handlers().is_empty());
}

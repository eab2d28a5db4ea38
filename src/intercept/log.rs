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

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use crate::intercept::Adapter;
use crate::intercept::AmbientRecord;
use crate::intercept::Frame;

static ADAPTER: RwLock<Option<Arc<Adapter>>> = RwLock::new(None);

/// Replaces the adapter `log` records are forwarded to.
pub(crate) fn set_adapter(adapter: Adapter) {
    let mut current = ADAPTER.write().unwrap_or_else(PoisonError::into_inner);
    *current = Some(Arc::new(adapter));
}

fn current_adapter() -> Option<Arc<Adapter>> {
    // cloned out so no lock is held while the engine writes
    ADAPTER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

struct LogCrateLogger(());

impl log::Log for LogCrateLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        current_adapter().is_some_and(|adapter| adapter.enabled(metadata.target()))
    }

    fn log(&self, record: &log::Record) {
        if let Some(adapter) = current_adapter() {
            adapter.emit(ambient_record(record));
        }
    }

    fn flush(&self) {
        if let Some(adapter) = current_adapter() {
            adapter.flush();
        }
    }
}

/// Set up the log crate global logger.
///
/// Records are forwarded to the adapter of the most recent
/// [`Loader::load`](crate::loader::Loader::load); before the first load they are dropped.
/// Per-call routing flags travel as key-values:
///
/// ```no_run
/// logforth_loader::intercept::setup_log_crate();
/// log::info!(disable_file_handler = true; "console only");
/// ```
///
/// # Errors
///
/// Return an error if the log crate global logger has already been set.
pub fn try_setup_log_crate() -> Result<(), log::SetLoggerError> {
    static LOGGER: LogCrateLogger = LogCrateLogger(());
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

/// Set up the log crate global logger.
///
/// This function calls [`try_setup_log_crate`] and panics if the log crate global logger has
/// already been set.
///
/// # Panics
///
/// Panic if the log crate global logger has already been set.
pub fn setup_log_crate() {
    try_setup_log_crate().expect(
        "logforth_loader::intercept::setup_log_crate must be called before the log crate global logger initialized",
    )
}

/// The ambient name and number of a `log` level.
fn level_of(level: log::Level) -> (&'static str, u32) {
    match level {
        log::Level::Error => ("ERROR", 40),
        log::Level::Warn => ("WARNING", 30),
        log::Level::Info => ("INFO", 20),
        log::Level::Debug => ("DEBUG", 10),
        log::Level::Trace => ("TRACE", 5),
    }
}

fn ambient_record(record: &log::Record) -> AmbientRecord {
    let (level_name, level_no) = level_of(record.level());
    let mut ambient = AmbientRecord::new(
        record.target(),
        level_name,
        level_no,
        record.args().to_string(),
    );

    // `log` reports the call site directly, so the only frame is the caller
    ambient.frames.push(Frame {
        module: record
            .module_path()
            .unwrap_or(record.target())
            .to_string(),
        file: record.file().map(str::to_string),
        line: record.line(),
        function: None,
    });

    struct KeyValueVisitor<'a> {
        kvs: &'a mut Vec<(String, String)>,
    }

    impl<'kvs> log::kv::VisitSource<'kvs> for KeyValueVisitor<'_> {
        fn visit_pair(
            &mut self,
            key: log::kv::Key<'kvs>,
            value: log::kv::Value<'kvs>,
        ) -> Result<(), log::kv::Error> {
            self.kvs.push((key.to_string(), value.to_string()));
            Ok(())
        }
    }

    let mut visitor = KeyValueVisitor {
        kvs: &mut ambient.key_values,
    };
    // the visitor never fails
    let _ = record.key_values().visit(&mut visitor);

    ambient
}

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

use std::path::Path;
use std::path::PathBuf;

use crate::Error;
use crate::config::LoggerConfig;
use crate::filter::Filter;
use crate::filter::FilterClass;
use crate::handler::HandlerKind;
use crate::handler::HandlerSpec;
use crate::handler::ResolvedHandler;
use crate::handler::Sink;
use crate::layout::Format;
use crate::level::Level;
use crate::rotation::Rotation;

const APP_NAME: &str = "{app_name}";

/// Fill every unset field of `spec` from the `config` defaults.
///
/// Only unset fields are touched, so resolving the [`to_spec`](ResolvedHandler::to_spec) of a
/// resolved handler yields the same handler. The rules, in order:
///
/// 1. sink: standard output for stream handlers; for file handlers one of the four path
///    templates under the logs directory, picked by JSON-ness and `is_error`; other kinds must
///    declare one.
/// 2. level: the error level for error handlers, otherwise the base level, lowered to `DEBUG`
///    in debug mode.
/// 3. serializing handlers inherit the custom-serialize default.
/// 4. custom serialization turns engine serialization off and installs the JSON format.
/// 5. format: the stream format for stream handlers, otherwise the generic format, unless the
///    engine serializes.
/// 6. filter: the class matching kind, JSON-ness and `is_error`.
/// 7. `backtrace` on; `diagnose` only at `TRACE`; stream handlers inherit `colorize`.
/// 8. file handlers enqueue and get the configured rotation thresholds, the retention and the
///    encoding; other kinds do not enqueue.
pub fn resolve(spec: &HandlerSpec, config: &LoggerConfig) -> Result<ResolvedHandler, Error> {
    let defaults = &config.default;
    let sink = match (&spec.sink, spec.kind) {
        (Some(Sink::Path(path)), _) => Sink::Path(substitute_path(path, &config.app_name)),
        (Some(sink), _) => sink.clone(),
        (None, HandlerKind::Stream) => Sink::Stdout,
        (None, HandlerKind::File) => {
            let templates = if spec.serialize || spec.use_custom_serialize == Some(true) {
                &defaults.file.json
            } else {
                &defaults.file.plain
            };
            let template = if spec.is_error {
                &templates.err_path
            } else {
                &templates.log_path
            };
            let subpath = template.replace(APP_NAME, &config.app_name);
            Sink::Path(defaults.file.logs_dir.join(subpath))
        }
        (None, HandlerKind::Custom) => {
            return Err(Error::config("missing sink")
                .with_context("handler", &spec.name)
                .with_context("kind", spec.kind));
        }
    };

    let level = match spec.level {
        Some(level) => level,
        None if spec.is_error => defaults.level.err,
        None if config.debug && defaults.level.base > Level::Debug => Level::Debug,
        None => defaults.level.base,
    };

    let use_custom_serialize = match spec.use_custom_serialize {
        None if spec.serialize => Some(defaults.custom_serialize),
        custom => custom,
    };
    let custom = use_custom_serialize == Some(true);

    let (serialize, format) = if custom {
        (false, Some(Format::Json))
    } else {
        let format = match &spec.format {
            Some(Format::Text(template)) => {
                Some(Format::Text(template.replace(APP_NAME, &config.app_name)))
            }
            Some(format) => Some(format.clone()),
            None if spec.serialize => None,
            None if spec.kind == HandlerKind::Stream => Some(Format::text(
                defaults.std.format.replace(APP_NAME, &config.app_name),
            )),
            None => Some(Format::text(
                defaults.format.replace(APP_NAME, &config.app_name),
            )),
        };
        (spec.serialize, format)
    };

    let filter = match &spec.filter {
        Some(filter) => filter.clone(),
        None => Filter::Class(filter_class(
            spec.kind,
            spec.serialize || custom,
            spec.is_error,
        )),
    };

    let colorize = match spec.colorize {
        None if spec.kind == HandlerKind::Stream => Some(defaults.std.colorize),
        colorize => colorize,
    };

    let (enqueue, rotation, retention, encoding) = if spec.kind == HandlerKind::File {
        let rotation = spec.rotation.unwrap_or_else(|| {
            Rotation::new(Some(defaults.file.rotate_size), Some(defaults.file.rotate_time))
        });
        (
            spec.enqueue.unwrap_or(true),
            Some(rotation),
            Some(spec.retention.unwrap_or(defaults.file.retention)),
            Some(
                spec.encoding
                    .clone()
                    .unwrap_or_else(|| defaults.file.encoding.clone()),
            ),
        )
    } else {
        (
            spec.enqueue.unwrap_or(false),
            spec.rotation,
            spec.retention,
            spec.encoding.clone(),
        )
    };

    if !sink.is_path_like() {
        let declared = [
            ("rotation", rotation.is_some()),
            ("retention", retention.is_some()),
            ("encoding", encoding.is_some()),
        ];
        if let Some((option, _)) = declared.iter().find(|(_, set)| *set) {
            return Err(Error::config("incompatible sink")
                .with_context("handler", &spec.name)
                .with_context("option", option)
                .with_context("reason", "only file path sinks take this option"));
        }
    }

    Ok(ResolvedHandler {
        name: spec.name.clone(),
        kind: spec.kind,
        sink,
        level,
        is_error: spec.is_error,
        serialize,
        use_custom_serialize,
        format,
        filter,
        colorize,
        backtrace: spec.backtrace.unwrap_or(true),
        diagnose: spec.diagnose.unwrap_or(level == Level::Trace),
        enqueue,
        rotation,
        retention,
        encoding,
        enabled: spec.enabled,
    })
}

fn filter_class(kind: HandlerKind, json: bool, is_error: bool) -> FilterClass {
    match (kind, json, is_error) {
        (HandlerKind::Stream, _, _) => FilterClass::Std,
        (HandlerKind::File, false, false) => FilterClass::File,
        (HandlerKind::File, false, true) => FilterClass::FileErr,
        (HandlerKind::File, true, false) => FilterClass::Json,
        (HandlerKind::File, true, true) => FilterClass::JsonErr,
        (HandlerKind::Custom, _, _) => FilterClass::All,
    }
}

fn substitute_path(path: &Path, app_name: &str) -> PathBuf {
    match path.to_str() {
        Some(s) if s.contains(APP_NAME) => PathBuf::from(s.replace(APP_NAME, app_name)),
        _ => path.to_path_buf(),
    }
}

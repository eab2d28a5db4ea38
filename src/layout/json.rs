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

use jiff::Zoned;
use jiff::tz::TimeZone;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::Error;
use crate::filter::add_level_short;
use crate::layout::Layout;
use crate::layout::TextLayout;
use crate::record::Record;

/// The template of the `text` member of serialized records when the handler declares none.
pub const DEFAULT_SERIALIZED_TEXT: &str =
    "{time:%Y-%m-%d %H:%M:%S.%3f} | {level:<8} | {name}:{function}:{line} - {message}";

/// A JSON layout that writes one flat object per record.
///
/// Output format:
///
/// ```json
/// {"timestamp":"2024-08-11T22:44:57.172051+08:00","level":{"name":"ERROR","no":40},"level_short":"ERROR","name":"billing.api","module":"billing::api","file":"api.rs","line":51,"function":"charge","message":"Hello error!","exception":null,"extra":{}}
/// ```
///
/// # Examples
///
/// ```
/// use jiff::tz::TimeZone;
/// use logforth_loader::layout::JsonLayout;
///
/// let json_layout = JsonLayout::default().timezone(TimeZone::UTC);
/// ```
#[derive(Default, Debug, Clone)]
pub struct JsonLayout {
    tz: Option<TimeZone>,
}

impl JsonLayout {
    /// Sets the timezone for timestamps.
    pub fn timezone(mut self, tz: TimeZone) -> Self {
        self.tz = Some(tz);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
struct RecordLine<'a> {
    #[serde(serialize_with = "serialize_time_zone")]
    timestamp: Zoned,
    level: LevelLine<'a>,
    level_short: &'a str,
    name: &'a str,
    module: Option<&'a str>,
    file: &'a str,
    line: Option<u32>,
    function: Option<&'a str>,
    message: &'a str,
    exception: Option<&'a str>,
    extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
struct LevelLine<'a> {
    name: &'a str,
    no: u32,
}

fn serialize_time_zone<S>(timestamp: &Zoned, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(&format_args!("{timestamp:.6}"))
}

fn zoned(record: &Record, tz: Option<&TimeZone>) -> Zoned {
    record
        .time()
        .to_zoned(tz.cloned().unwrap_or_else(TimeZone::system))
}

fn collect_extra(record: &Record) -> Map<String, Value> {
    record
        .extra()
        .key_values()
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

impl Layout for JsonLayout {
    fn format(&self, record: &Record) -> Result<Vec<u8>, Error> {
        let severity = record.severity();
        let level_name = severity.name();
        let filename = record.filename();
        let record_line = RecordLine {
            timestamp: zoned(record, self.tz.as_ref()),
            level: LevelLine {
                name: &level_name,
                no: severity.number(),
            },
            level_short: add_level_short(record),
            name: record.name(),
            module: record.module(),
            file: &filename,
            line: record.line(),
            function: record.function(),
            message: record.message(),
            exception: record.exception(),
            extra: collect_extra(record),
        };

        serde_json::to_vec(&record_line)
            .map_err(|err| Error::unexpected("failed to serialize record").with_source(err))
    }
}

/// The engine serialization of a record: the rendered text plus the full record as JSON.
///
/// Output format:
///
/// ```json
/// {"text":"2024-08-11 22:44:57.172 | ERROR    | billing.api:charge:51 - Hello error!","record":{...}}
/// ```
#[derive(Debug, Clone)]
pub struct SerializedLayout {
    text: TextLayout,
    tz: Option<TimeZone>,
}

impl SerializedLayout {
    /// Creates a layout whose `text` member is rendered by `text`.
    pub fn new(text: TextLayout) -> Self {
        Self { text, tz: None }
    }

    /// Sets the timezone of the record time.
    pub fn timezone(mut self, tz: TimeZone) -> Self {
        self.text = self.text.timezone(tz.clone());
        self.tz = Some(tz);
        self
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    text: String,
    record: SerializedRecord<'a>,
}

#[derive(Debug, Serialize)]
struct SerializedRecord<'a> {
    time: TimeLine,
    level: LevelLine<'a>,
    name: &'a str,
    module: Option<&'a str>,
    file: FileLine<'a>,
    line: Option<u32>,
    function: Option<&'a str>,
    message: &'a str,
    exception: Option<&'a str>,
    extra: Map<String, Value>,
    process: ProcessLine,
}

#[derive(Debug, Serialize)]
struct TimeLine {
    #[serde(serialize_with = "serialize_time_zone")]
    repr: Zoned,
    timestamp: f64,
}

#[derive(Debug, Serialize)]
struct FileLine<'a> {
    name: &'a str,
    path: &'a str,
}

#[derive(Debug, Serialize)]
struct ProcessLine {
    id: u32,
}

impl Layout for SerializedLayout {
    fn format(&self, record: &Record) -> Result<Vec<u8>, Error> {
        let severity = record.severity();
        let level_name = severity.name();
        let filename = record.filename();
        let envelope = Envelope {
            text: self.text.render(record)?,
            record: SerializedRecord {
                time: TimeLine {
                    repr: zoned(record, self.tz.as_ref()),
                    timestamp: record.time().as_microsecond() as f64 / 1e6,
                },
                level: LevelLine {
                    name: &level_name,
                    no: severity.number(),
                },
                name: record.name(),
                module: record.module(),
                file: FileLine {
                    name: &filename,
                    path: record.file().unwrap_or_default(),
                },
                line: record.line(),
                function: record.function(),
                message: record.message(),
                exception: record.exception(),
                extra: collect_extra(record),
                process: ProcessLine {
                    id: std::process::id(),
                },
            },
        };

        serde_json::to_vec(&envelope)
            .map_err(|err| Error::unexpected("failed to serialize record").with_source(err))
    }
}

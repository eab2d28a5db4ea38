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

use std::borrow::Cow;
use std::fmt::Write;

#[cfg(feature = "colored")]
use colored::Color;
#[cfg(feature = "colored")]
use colored::Colorize;
use jiff::Timestamp;
use jiff::tz::TimeZone;

use crate::Error;
use crate::filter::add_level_short;
use crate::layout::Layout;
#[cfg(feature = "colored")]
use crate::level::Level;
#[cfg(feature = "colored")]
use crate::level::Severity;
use crate::record::Record;

/// The time format of a bare `{time}` field.
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.%6f%:z";

/// A layout that renders log records through a text template.
///
/// Recognized fields:
///
/// | Field                 | Value                                             |
/// |-----------------------|---------------------------------------------------|
/// | `{time}`              | the record time, `{time:<strftime>}` to customize |
/// | `{level}`             | the level name                                    |
/// | `{level_short}`       | the short level label                             |
/// | `{name}`              | the logger name                                   |
/// | `{module}`            | the module path                                   |
/// | `{file}`              | the source file name                              |
/// | `{line}`              | the source line                                   |
/// | `{function}`          | the emitting function                             |
/// | `{message}`           | the message                                       |
/// | `{extra[key]}`        | one context value                                 |
///
/// Every field but `{time}` takes an alignment spec such as `{level_short:<5}` or
/// `{line:>4}`. Literal braces are written `{{` and `}}`.
///
/// Output of `"{time} {level_short:<5} {name}:{line} {message}"`:
///
/// ```text
/// 2024-08-11T22:44:57.172105+08:00 ERROR billing.api:51 Hello error!
/// 2024-08-11T22:44:57.172219+08:00 WARN  billing.api:52 Hello warn!
/// 2024-08-11T22:44:57.172276+08:00 OK    billing.api:53 Hello success!
/// ```
///
/// The level fields are colored when `colorize` is on and the `colored` feature is enabled.
#[derive(Debug, Clone)]
pub struct TextLayout {
    segments: Vec<Segment>,
    tz: TimeZone,
    colorize: bool,
    backtrace: bool,
    diagnose: bool,
    #[cfg(feature = "colored")]
    colors: LevelColor,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Field { field: Field, align: Option<Align> },
}

#[derive(Debug, Clone, PartialEq)]
enum Field {
    Time(String),
    Level,
    LevelShort,
    Name,
    Module,
    File,
    Line,
    Function,
    Message,
    Extra(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Align {
    Left(usize),
    Right(usize),
    Center(usize),
}

impl TextLayout {
    /// Compiles a template; fails when the template does not parse.
    pub fn new(template: &str) -> Result<Self, Error> {
        Ok(Self {
            segments: compile(template)?,
            tz: TimeZone::system(),
            colorize: false,
            backtrace: false,
            diagnose: false,
            #[cfg(feature = "colored")]
            colors: LevelColor::default(),
        })
    }

    /// Sets the timezone of the `{time}` field. Defaults to the system timezone.
    pub fn timezone(mut self, tz: TimeZone) -> Self {
        self.tz = tz;
        self
    }

    /// Colors the level fields.
    pub fn colorize(mut self, colorize: bool) -> Self {
        self.colorize = colorize;
        self
    }

    /// Appends the record's exception on the following lines.
    pub fn backtrace(mut self, backtrace: bool) -> Self {
        self.backtrace = backtrace;
        self
    }

    /// Appends the record's context key-values.
    pub fn diagnose(mut self, diagnose: bool) -> Self {
        self.diagnose = diagnose;
        self
    }

    /// Customizes the color of each level.
    #[cfg(feature = "colored")]
    pub fn colors(mut self, colors: LevelColor) -> Self {
        self.colors = colors;
        self
    }

    /// Renders only the template, without exception or key-values.
    pub(crate) fn render(&self, record: &Record) -> Result<String, Error> {
        let mut out = String::new();
        for segment in &self.segments {
            let (field, align) = match segment {
                Segment::Literal(literal) => {
                    out.push_str(literal);
                    continue;
                }
                Segment::Field { field, align } => (field, *align),
            };

            let value: Cow<'_, str> = match field {
                Field::Time(format) => {
                    let zoned = record.time().to_zoned(self.tz.clone());
                    Cow::Owned(jiff::fmt::strtime::format(format.as_str(), &zoned).map_err(
                        |err| Error::unexpected("failed to format record time").with_source(err),
                    )?)
                }
                Field::Level => record.severity().name(),
                Field::LevelShort => Cow::Borrowed(add_level_short(record)),
                Field::Name => Cow::Borrowed(record.name()),
                Field::Module => Cow::Borrowed(record.module().unwrap_or_default()),
                Field::File => record.filename(),
                Field::Line => Cow::Owned(record.line().unwrap_or_default().to_string()),
                Field::Function => Cow::Borrowed(record.function().unwrap_or_default()),
                Field::Message => Cow::Borrowed(record.message()),
                Field::Extra(key) => Cow::Borrowed(lookup_extra(record, key)),
            };
            let value = pad(value, align);

            match field {
                Field::Level | Field::LevelShort if self.colorize => {
                    self.push_colored(&mut out, record, &value)
                }
                _ => out.push_str(&value),
            }
        }
        Ok(out)
    }

    #[cfg(feature = "colored")]
    fn push_colored(&self, out: &mut String, record: &Record, value: &str) {
        match self.colors.color_of(record.severity()) {
            Some(color) => {
                let _ = write!(out, "{}", value.color(color));
            }
            None => out.push_str(value),
        }
    }

    #[cfg(not(feature = "colored"))]
    fn push_colored(&self, out: &mut String, _: &Record, value: &str) {
        out.push_str(value);
    }
}

impl Layout for TextLayout {
    fn format(&self, record: &Record) -> Result<Vec<u8>, Error> {
        let mut out = self.render(record)?;

        if self.diagnose {
            for (key, value) in record.extra().key_values() {
                let _ = write!(out, " {key}={value}");
            }
        }
        if self.backtrace {
            if let Some(exception) = record.exception() {
                out.push('\n');
                out.push_str(exception.trim_end());
            }
        }

        Ok(out.into_bytes())
    }
}

fn lookup_extra<'a>(record: &'a Record, key: &str) -> &'a str {
    if key == "level_short" {
        return add_level_short(record);
    }
    record
        .extra()
        .key_values()
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or_default()
}

fn pad(value: Cow<'_, str>, align: Option<Align>) -> Cow<'_, str> {
    match align {
        None => value,
        Some(Align::Left(width)) => Cow::Owned(format!("{value:<width$}")),
        Some(Align::Right(width)) => Cow::Owned(format!("{value:>width$}")),
        Some(Align::Center(width)) => Cow::Owned(format!("{value:^width$}")),
    }
}

fn compile(template: &str) -> Result<Vec<Segment>, Error> {
    let invalid = |reason: &'static str| {
        Error::config("unparsable format template")
            .with_context("reason", reason)
            .with_context("template", template)
    };

    let mut segments = vec![];
    let mut literal = String::new();
    let mut rest = template;
    while let Some(idx) = rest.find(['{', '}']) {
        literal.push_str(&rest[..idx]);
        let after = &rest[idx + 1..];

        if rest[idx..].starts_with('}') {
            if !after.starts_with('}') {
                return Err(invalid("unmatched '}'"));
            }
            literal.push('}');
            rest = &after[1..];
            continue;
        }
        if after.starts_with('{') {
            literal.push('{');
            rest = &after[1..];
            continue;
        }

        let end = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
        let (field, align) = parse_field(&after[..end]).map_err(invalid)?;
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Field { field, align });
        rest = &after[end + 1..];
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(segments)
}

fn parse_field(body: &str) -> Result<(Field, Option<Align>), &'static str> {
    let (name, spec) = match body.split_once(':') {
        Some((name, spec)) => (name.trim(), Some(spec)),
        None => (body.trim(), None),
    };

    if name == "time" {
        let format = spec.unwrap_or(DEFAULT_TIME_FORMAT);
        // probe the format once so bad specifiers fail at load time
        let probe = Timestamp::UNIX_EPOCH.to_zoned(TimeZone::UTC);
        jiff::fmt::strtime::format(format, &probe).map_err(|_| "invalid time format")?;
        return Ok((Field::Time(format.to_string()), None));
    }

    let field = match name {
        "level" => Field::Level,
        "level_short" => Field::LevelShort,
        "name" => Field::Name,
        "module" => Field::Module,
        "file" => Field::File,
        "line" => Field::Line,
        "function" => Field::Function,
        "message" => Field::Message,
        name => match name
            .strip_prefix("extra[")
            .and_then(|key| key.strip_suffix(']'))
        {
            Some(key) if !key.is_empty() => Field::Extra(key.to_string()),
            _ => return Err("unknown field"),
        },
    };

    let align = match spec.map(str::trim) {
        None | Some("") => None,
        Some(spec) => Some(parse_align(spec).ok_or("invalid alignment")?),
    };
    Ok((field, align))
}

fn parse_align(spec: &str) -> Option<Align> {
    let (ctor, width): (fn(usize) -> Align, &str) = match spec.as_bytes()[0] {
        b'<' => (Align::Left, &spec[1..]),
        b'>' => (Align::Right, &spec[1..]),
        b'^' => (Align::Center, &spec[1..]),
        _ => (Align::Left, spec),
    };
    width.parse().ok().map(ctor)
}

/// Customize the color of each log level.
#[cfg(feature = "colored")]
#[derive(Debug, Clone)]
pub struct LevelColor {
    pub trace: Color,
    pub debug: Color,
    pub info: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub critical: Color,
}

#[cfg(feature = "colored")]
impl Default for LevelColor {
    fn default() -> Self {
        Self {
            trace: Color::Cyan,
            debug: Color::Blue,
            info: Color::White,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            critical: Color::BrightRed,
        }
    }
}

#[cfg(feature = "colored")]
impl LevelColor {
    fn color_of(&self, severity: Severity) -> Option<Color> {
        let Severity::Named(level) = severity else {
            return None;
        };
        Some(match level {
            Level::Trace => self.trace,
            Level::Debug => self.debug,
            Level::Info => self.info,
            Level::Success => self.success,
            Level::Warning => self.warning,
            Level::Error => self.error,
            Level::Critical => self.critical,
        })
    }
}

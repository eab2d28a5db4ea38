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

//! Handler declarations and their resolution.
//!
//! A [`HandlerSpec`] is what a configuration says about one handler; every field but the name
//! and kind may be left unset. [`resolve`] fills the gaps from the [`LoggerConfig`] defaults and
//! returns a [`ResolvedHandler`] that an [`Engine`](crate::engine::Engine) can mount.
//!
//! [`LoggerConfig`]: crate::config::LoggerConfig

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Deserializer;

pub use self::resolve::resolve;
pub use self::sink::CallableSink;
pub use self::sink::SharedWriter;
pub use self::sink::Sink;
use crate::Error;
use crate::filter::Filter;
use crate::layout::Format;
use crate::level::Level;
use crate::retention::Retention;
use crate::rotation::Rotation;

mod resolve;
mod sink;

/// The prefix of generated handler names.
pub const GENERATED_NAME_PREFIX: &str = "log_handler.";

/// The family a handler belongs to; drives every defaulting rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Standard output or standard error.
    Stream,
    /// A file under the configured logs directory.
    File,
    /// Anything else; the sink must be declared.
    Custom,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Stream => "stream",
            HandlerKind::File => "file",
            HandlerKind::Custom => "custom",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandlerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream" | "std" => Ok(HandlerKind::Stream),
            "file" => Ok(HandlerKind::File),
            "custom" | "other" | "socket" | "http" | "syslog" | "queue" | "memory" | "null"
            | "unknown" => Ok(HandlerKind::Custom),
            _ => Err(Error::config("unknown handler kind").with_context("kind", s)),
        }
    }
}

impl<'de> Deserialize<'de> for HandlerKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kind = String::deserialize(deserializer)?;
        HandlerKind::from_str(&kind).map_err(serde::de::Error::custom)
    }
}

/// The declaration of one handler.
///
/// Fields left `None` are filled by [`resolve`]. Decoding accepts `"type"` (or `"kind"`) for the
/// kind, `"error"` for `is_error` and `"custom_serialize"` for `use_custom_serialize`; a missing
/// name is generated as `log_handler.<n>`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HandlerSpec {
    #[serde(default = "generate_name")]
    pub name: String,
    #[serde(default = "default_kind", rename = "type", alias = "kind")]
    pub kind: HandlerKind,
    #[serde(default)]
    pub sink: Option<Sink>,
    #[serde(default)]
    pub level: Option<Level>,
    #[serde(default, alias = "error")]
    pub is_error: bool,
    #[serde(default)]
    pub serialize: bool,
    #[serde(default, alias = "custom_serialize")]
    pub use_custom_serialize: Option<bool>,
    #[serde(default)]
    pub format: Option<Format>,
    #[serde(default)]
    pub filter: Option<Filter>,
    #[serde(default)]
    pub colorize: Option<bool>,
    #[serde(default)]
    pub backtrace: Option<bool>,
    #[serde(default)]
    pub diagnose: Option<bool>,
    #[serde(default)]
    pub enqueue: Option<bool>,
    #[serde(default)]
    pub rotation: Option<Rotation>,
    #[serde(default)]
    pub retention: Option<Retention>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for HandlerSpec {
    fn default() -> Self {
        HandlerSpec::new(generate_name(), default_kind())
    }
}

impl HandlerSpec {
    /// An enabled handler with every optional field unset.
    pub fn new(name: impl Into<String>, kind: HandlerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            sink: None,
            level: None,
            is_error: false,
            serialize: false,
            use_custom_serialize: None,
            format: None,
            filter: None,
            colorize: None,
            backtrace: None,
            diagnose: None,
            enqueue: None,
            rotation: None,
            retention: None,
            encoding: None,
            enabled: true,
        }
    }

    /// A stream handler.
    pub fn stream(name: impl Into<String>) -> Self {
        HandlerSpec::new(name, HandlerKind::Stream)
    }

    /// A file handler.
    pub fn file(name: impl Into<String>) -> Self {
        HandlerSpec::new(name, HandlerKind::File)
    }

    /// A custom handler writing to `sink`.
    pub fn custom(name: impl Into<String>, sink: Sink) -> Self {
        Self {
            sink: Some(sink),
            ..HandlerSpec::new(name, HandlerKind::Custom)
        }
    }
}

fn generate_name() -> String {
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    format!(
        "{GENERATED_NAME_PREFIX}{}",
        NEXT.fetch_add(1, Ordering::Relaxed)
    )
}

fn default_kind() -> HandlerKind {
    HandlerKind::Custom
}

fn default_enabled() -> bool {
    true
}

/// A handler with every field its kind requires.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedHandler {
    pub name: String,
    pub kind: HandlerKind,
    pub sink: Sink,
    pub level: Level,
    pub is_error: bool,
    /// Engine serialization; never set together with the custom JSON format.
    pub serialize: bool,
    pub use_custom_serialize: Option<bool>,
    /// Unset only when `serialize` is set.
    pub format: Option<Format>,
    pub filter: Filter,
    pub colorize: Option<bool>,
    pub backtrace: bool,
    pub diagnose: bool,
    pub enqueue: bool,
    /// Set for file handlers, or when declared on a path sink.
    pub rotation: Option<Rotation>,
    pub retention: Option<Retention>,
    pub encoding: Option<String>,
    pub enabled: bool,
}

impl ResolvedHandler {
    /// Turns the handler back into a declaration with every field set.
    pub fn to_spec(&self) -> HandlerSpec {
        HandlerSpec {
            name: self.name.clone(),
            kind: self.kind,
            sink: Some(self.sink.clone()),
            level: Some(self.level),
            is_error: self.is_error,
            serialize: self.serialize,
            use_custom_serialize: self.use_custom_serialize,
            format: self.format.clone(),
            filter: Some(self.filter.clone()),
            colorize: self.colorize,
            backtrace: Some(self.backtrace),
            diagnose: Some(self.diagnose),
            enqueue: Some(self.enqueue),
            rotation: self.rotation,
            retention: self.retention,
            encoding: self.encoding.clone(),
            enabled: self.enabled,
        }
    }

    /// The file path, for path sinks.
    pub fn path(&self) -> Option<&std::path::Path> {
        self.sink.as_path().map(|p| p.as_path())
    }
}

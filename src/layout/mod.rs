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

//! Layouts for formatting log records.
//!
//! A handler declares its output shape as a [`Format`]; the engine compiles it into a
//! [`Layout`] when the handler is mounted.

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;

pub use self::custom::CustomLayout;
pub use self::json::DEFAULT_SERIALIZED_TEXT;
pub use self::json::JsonLayout;
pub use self::json::SerializedLayout;
pub use self::text::DEFAULT_TIME_FORMAT;
#[cfg(feature = "colored")]
pub use self::text::LevelColor;
pub use self::text::TextLayout;
use crate::Error;
use crate::record::Record;

mod custom;
mod json;
mod text;

/// A layout for formatting log records.
///
/// Layouts produce one entry without the trailing line break; appenders that write lines add it.
pub trait Layout: fmt::Debug + Send + Sync + 'static {
    /// Formats a log record.
    fn format(&self, record: &Record) -> Result<Vec<u8>, Error>;
}

impl<T: Layout> From<T> for Box<dyn Layout> {
    fn from(value: T) -> Self {
        Box::new(value)
    }
}

/// The declared output format of a handler.
#[derive(Debug, Clone)]
pub enum Format {
    /// A text template, see [`TextLayout`] for the recognized fields.
    Text(String),
    /// The custom one-object-per-line JSON format, see [`JsonLayout`].
    Json,
    /// A custom formatting function.
    Custom(CustomLayout),
}

impl Format {
    /// A text template format.
    pub fn text(template: impl Into<String>) -> Self {
        Format::Text(template.into())
    }

    /// The template string, for text formats.
    pub fn as_template(&self) -> Option<&str> {
        match self {
            Format::Text(template) => Some(template),
            _ => None,
        }
    }
}

impl PartialEq for Format {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Format::Text(a), Format::Text(b)) => a == b,
            (Format::Json, Format::Json) => true,
            (Format::Custom(a), Format::Custom(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<CustomLayout> for Format {
    fn from(layout: CustomLayout) -> Self {
        Format::Custom(layout)
    }
}

impl<'de> Deserialize<'de> for Format {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Format::Text)
    }
}

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

//! Appenders write formatted records to a sink.

use std::fmt;

pub use self::callable::Callable;
pub(crate) use self::file::check_encoding;
pub use self::file::File;
pub use self::file::RotatingFileWriter;
pub use self::file::RotatingFileWriterBuilder;
pub use self::queued::Queued;
pub use self::stdio::Stderr;
pub use self::stdio::Stdout;
pub use self::writer::Writer;
use crate::Error;
use crate::record::Record;

mod callable;
mod file;
mod queued;
mod stdio;
mod writer;

/// An appender that can process log records.
pub trait Append: fmt::Debug + Send + Sync + 'static {
    /// Dispatch one formatted entry to the append target.
    ///
    /// `entry` is the layout output without a line break.
    fn append(&self, record: &Record, entry: &[u8]) -> Result<(), Error>;

    /// Flush any buffered records.
    ///
    /// Default to a no-op.
    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

impl<T: Append> From<T> for Box<dyn Append> {
    fn from(value: T) -> Self {
        Box::new(value)
    }
}

fn line(entry: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(entry.len() + 1);
    bytes.extend_from_slice(entry);
    bytes.push(b'\n');
    bytes
}

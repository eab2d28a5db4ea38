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

//! Appender for writing log records to rotated files.

use std::io::Write;
use std::sync::Mutex;

pub use self::rolling::RotatingFileWriter;
pub use self::rolling::RotatingFileWriterBuilder;
use crate::Error;
use crate::append::Append;
use crate::append::line;
use crate::record::Record;

mod rolling;

/// An appender that writes log records to a file on the calling thread.
///
/// Handlers that enqueue wrap the [`RotatingFileWriter`] in a
/// [`Queued`](crate::append::Queued) appender instead.
#[derive(Debug)]
pub struct File {
    writer: Mutex<RotatingFileWriter>,
}

impl File {
    pub fn new(writer: RotatingFileWriter) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl Append for File {
    fn append(&self, _: &Record, entry: &[u8]) -> Result<(), Error> {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.write_all(&line(entry)).map_err(Error::from_io_error)
    }

    fn flush(&self) -> Result<(), Error> {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.flush().map_err(Error::from_io_error)
    }
}

/// Check that entries can be written in `encoding`.
///
/// Records are UTF-8 throughout, so only UTF-8 spellings are accepted.
pub(crate) fn check_encoding(encoding: &str) -> Result<(), Error> {
    match encoding.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
        "utf8" => Ok(()),
        _ => Err(Error::config("unsupported encoding").with_context("encoding", encoding)),
    }
}

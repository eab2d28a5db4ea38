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

use std::io;
use std::io::Write;
use std::sync::MutexGuard;

use crate::Error;
use crate::append::Append;
use crate::append::line;
use crate::handler::SharedWriter;
use crate::record::Record;

/// An appender that writes one line per record to a shared writer.
#[derive(Debug)]
pub struct Writer {
    writer: SharedWriter,
}

impl Writer {
    pub fn new(writer: SharedWriter) -> Self {
        Self { writer }
    }
}

impl Append for Writer {
    fn append(&self, _: &Record, entry: &[u8]) -> Result<(), Error> {
        self.writer
            .lock()
            .write_all(&line(entry))
            .map_err(Error::from_io_error)
    }

    fn flush(&self) -> Result<(), Error> {
        self.writer.lock().flush().map_err(Error::from_io_error)
    }
}

impl SharedWriter {
    fn lock(&self) -> MutexGuard<'_, dyn Write + Send + 'static> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        // one lock per entry keeps concurrent lines whole
        self.lock().write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flush()
    }
}

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

use crate::Error;
use crate::append::Append;
use crate::append::line;
use crate::non_blocking::NonBlocking;
use crate::non_blocking::WorkerGuard;
use crate::record::Record;

/// An appender that queues entries for a worker thread.
///
/// Dropping the appender drains the queue through its [`WorkerGuard`].
#[derive(Debug)]
pub struct Queued {
    writer: NonBlocking,
    _guard: WorkerGuard,
}

impl Queued {
    pub fn new(writer: NonBlocking, guard: WorkerGuard) -> Self {
        Self {
            writer,
            _guard: guard,
        }
    }
}

impl Append for Queued {
    fn append(&self, _: &Record, entry: &[u8]) -> Result<(), Error> {
        self.writer.send(line(entry))
    }

    fn flush(&self) -> Result<(), Error> {
        self.writer.flush()
    }
}

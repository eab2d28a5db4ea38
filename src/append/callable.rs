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
use crate::handler::CallableSink;
use crate::record::Record;

/// An appender that hands every formatted entry to a function.
#[derive(Debug)]
pub struct Callable {
    sink: CallableSink,
}

impl Callable {
    pub fn new(sink: CallableSink) -> Self {
        Self { sink }
    }
}

impl Append for Callable {
    fn append(&self, record: &Record, entry: &[u8]) -> Result<(), Error> {
        (self.sink.0)(record, &String::from_utf8_lossy(entry));
        Ok(())
    }
}

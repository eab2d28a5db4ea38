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

//! The registration contract between the loader and the engine that performs writes.

use std::fmt;

pub use self::dispatch::Dispatcher;
use crate::Error;
use crate::handler::ResolvedHandler;
use crate::record::Record;

mod dispatch;

/// The handle of a mounted handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(pub(crate) u64);

impl HandlerId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A structured-logging engine that mounts resolved handlers and writes records to them.
pub trait Engine: Send + Sync + 'static {
    /// Mounts a handler; the returned id stays valid until [`Engine::remove`].
    ///
    /// Fails when the sink cannot be prepared, e.g. the log file cannot be opened.
    fn add(&self, handler: ResolvedHandler) -> Result<HandlerId, Error>;

    /// Unmounts a handler, flushing whatever it buffered.
    ///
    /// Fails with [`ErrorKind::NotFound`](crate::ErrorKind::NotFound) for an unknown id.
    fn remove(&self, id: HandlerId) -> Result<(), Error>;

    /// Writes one record to every mounted handler that accepts it.
    fn log(&self, record: &Record);

    /// Flushes every mounted handler.
    fn flush(&self);
}

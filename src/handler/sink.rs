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

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Deserializer;

use crate::record::Record;

/// Where a handler writes.
#[derive(Debug, Clone)]
pub enum Sink {
    /// The process's standard output.
    Stdout,
    /// The process's standard error.
    Stderr,
    /// A file path; the file is created on mount and rotated when a rotation is set.
    Path(PathBuf),
    /// Any shared writer, one line per record.
    Writer(SharedWriter),
    /// A function called once per record with the formatted entry.
    Callable(CallableSink),
}

impl Sink {
    /// A writer sink.
    pub fn writer(writer: impl io::Write + Send + 'static) -> Self {
        Sink::Writer(SharedWriter::new(writer))
    }

    /// A callable sink.
    pub fn callable(f: impl Fn(&Record, &str) + Send + Sync + 'static) -> Self {
        Sink::Callable(CallableSink::new(f))
    }

    /// Whether rotation, retention and encoding make sense for this sink.
    pub fn is_path_like(&self) -> bool {
        matches!(self, Sink::Path(_))
    }

    /// The file path, for path sinks.
    pub fn as_path(&self) -> Option<&PathBuf> {
        match self {
            Sink::Path(path) => Some(path),
            _ => None,
        }
    }
}

impl PartialEq for Sink {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Sink::Stdout, Sink::Stdout) | (Sink::Stderr, Sink::Stderr) => true,
            (Sink::Path(a), Sink::Path(b)) => a == b,
            (Sink::Writer(a), Sink::Writer(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Sink::Callable(a), Sink::Callable(b)) => Arc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl From<PathBuf> for Sink {
    fn from(path: PathBuf) -> Self {
        Sink::Path(path)
    }
}

impl<'de> Deserialize<'de> for Sink {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let sink = String::deserialize(deserializer)?;
        Ok(match sink.trim() {
            "stdout" | "sys.stdout" | "ext://sys.stdout" => Sink::Stdout,
            "stderr" | "sys.stderr" | "ext://sys.stderr" => Sink::Stderr,
            path => Sink::Path(PathBuf::from(path)),
        })
    }
}

/// A writer shared between the handler declaration and the mounted appender.
#[derive(Clone)]
pub struct SharedWriter(pub(crate) Arc<Mutex<dyn io::Write + Send>>);

impl SharedWriter {
    pub fn new(writer: impl io::Write + Send + 'static) -> Self {
        SharedWriter(Arc::new(Mutex::new(writer)))
    }
}

impl fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedWriter {{ ... }}")
    }
}

/// A sink function.
#[derive(Clone)]
pub struct CallableSink(pub(crate) Arc<dyn Fn(&Record, &str) + Send + Sync>);

impl CallableSink {
    pub fn new(f: impl Fn(&Record, &str) + Send + Sync + 'static) -> Self {
        CallableSink(Arc::new(f))
    }
}

impl fmt::Debug for CallableSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallableSink {{ ... }}")
    }
}

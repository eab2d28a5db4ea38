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
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use jiff::tz::TimeZone;

use crate::Error;
use crate::append::Append;
use crate::append::Callable;
use crate::append::File;
use crate::append::Queued;
use crate::append::RotatingFileWriter;
use crate::append::Stderr;
use crate::append::Stdout;
use crate::append::Writer;
use crate::append::check_encoding;
use crate::engine::Engine;
use crate::engine::HandlerId;
use crate::filter::Filter;
use crate::handler::ResolvedHandler;
use crate::handler::Sink;
use crate::layout::DEFAULT_SERIALIZED_TEXT;
use crate::layout::Format;
use crate::layout::JsonLayout;
use crate::layout::Layout;
use crate::layout::SerializedLayout;
use crate::layout::TextLayout;
use crate::level::Level;
use crate::non_blocking::NonBlockingBuilder;
use crate::record::Record;
use crate::trap::DefaultTrap;
use crate::trap::Trap;

/// The built-in [`Engine`].
///
/// Every mounted handler owns a level threshold, a [`Filter`], a [`Layout`] compiled from its
/// format and an [`Append`] built from its sink. Records go to the handlers in mount order.
///
/// # Examples
///
/// ```
/// use logforth_loader::config::LoggerConfig;
/// use logforth_loader::engine::Dispatcher;
/// use logforth_loader::engine::Engine;
/// use logforth_loader::handler::HandlerSpec;
/// use logforth_loader::handler::Sink;
/// use logforth_loader::handler::resolve;
/// use logforth_loader::record::Record;
///
/// let config = LoggerConfig::default();
/// let spec = HandlerSpec::custom("audit", Sink::callable(|_, line| println!("{line}")));
///
/// let dispatcher = Dispatcher::default();
/// let id = dispatcher.add(resolve(&spec, &config).unwrap()).unwrap();
/// dispatcher.log(&Record::builder().name("billing").message("charged").build());
/// dispatcher.remove(id).unwrap();
/// ```
#[derive(Debug)]
pub struct Dispatcher {
    handlers: RwLock<Vec<Mounted>>,
    next_id: AtomicU64,
    tz: Option<TimeZone>,
    trap: Arc<dyn Trap>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates an engine with no handler mounted.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            tz: None,
            trap: Arc::new(DefaultTrap::default()),
        }
    }

    /// Sets the trap for errors raised while writing records.
    pub fn trap(mut self, trap: impl Trap) -> Self {
        self.trap = Arc::new(trap);
        self
    }

    /// Sets the timezone of rendered timestamps. Defaults to the system timezone.
    pub fn timezone(mut self, tz: TimeZone) -> Self {
        self.tz = Some(tz);
        self
    }

    /// The ids and names of the mounted handlers, in mount order.
    pub fn mounted(&self) -> Vec<(HandlerId, String)> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.iter().map(|h| (h.id, h.name.clone())).collect()
    }

    fn build_layout(&self, handler: &ResolvedHandler) -> Result<Box<dyn Layout>, Error> {
        let text_layout = |template: &str| -> Result<TextLayout, Error> {
            let layout = TextLayout::new(template)?;
            Ok(match &self.tz {
                Some(tz) => layout.timezone(tz.clone()),
                None => layout,
            })
        };
        let serialized = |text: TextLayout| -> Box<dyn Layout> {
            let layout = SerializedLayout::new(text);
            match &self.tz {
                Some(tz) => layout.timezone(tz.clone()).into(),
                None => layout.into(),
            }
        };

        let layout: Box<dyn Layout> = match &handler.format {
            Some(Format::Json) => {
                let layout = JsonLayout::default();
                match &self.tz {
                    Some(tz) => layout.timezone(tz.clone()).into(),
                    None => layout.into(),
                }
            }
            Some(Format::Custom(layout)) => layout.clone().into(),
            Some(Format::Text(template)) if handler.serialize => {
                serialized(text_layout(template)?)
            }
            Some(Format::Text(template)) => text_layout(template)?
                .colorize(handler.colorize.unwrap_or(false))
                .backtrace(handler.backtrace)
                .diagnose(handler.diagnose)
                .into(),
            None => serialized(text_layout(DEFAULT_SERIALIZED_TEXT)?),
        };
        Ok(layout)
    }

    fn build_append(&self, handler: &ResolvedHandler) -> Result<Box<dyn Append>, Error> {
        let append: Box<dyn Append> = match &handler.sink {
            Sink::Path(path) => {
                if let Some(encoding) = &handler.encoding {
                    check_encoding(encoding)?;
                }
                let writer = RotatingFileWriter::builder(path)
                    .rotation(handler.rotation)
                    .retention(handler.retention)
                    .timezone(self.tz.clone())
                    .trap(self.trap.clone())
                    .build()?;
                if handler.enqueue {
                    self.queued(&handler.name, writer)?
                } else {
                    File::new(writer).into()
                }
            }
            Sink::Stdout if handler.enqueue => self.queued(&handler.name, io::stdout())?,
            Sink::Stdout => Stdout::default().into(),
            Sink::Stderr if handler.enqueue => self.queued(&handler.name, io::stderr())?,
            Sink::Stderr => Stderr::default().into(),
            Sink::Writer(writer) if handler.enqueue => {
                self.queued(&handler.name, writer.clone())?
            }
            Sink::Writer(writer) => Writer::new(writer.clone()).into(),
            // callables run on the caller's thread
            Sink::Callable(sink) => Callable::new(sink.clone()).into(),
        };
        Ok(append)
    }

    fn queued(
        &self,
        name: &str,
        writer: impl Write + Send + 'static,
    ) -> Result<Box<dyn Append>, Error> {
        let (non_blocking, guard) = NonBlockingBuilder::new(format!("logforth-{name}"), writer)
            .trap(self.trap.clone())
            .build()?;
        Ok(Queued::new(non_blocking, guard).into())
    }
}

impl Engine for Dispatcher {
    fn add(&self, handler: ResolvedHandler) -> Result<HandlerId, Error> {
        let layout = self.build_layout(&handler)?;
        let append = self.build_append(&handler)?;

        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mounted = Mounted {
            id,
            name: handler.name,
            level: handler.level,
            filter: handler.filter,
            layout,
            append,
        };

        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.push(mounted);
        Ok(id)
    }

    fn remove(&self, id: HandlerId) -> Result<(), Error> {
        let removed = {
            let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
            let pos = handlers.iter().position(|h| h.id == id).ok_or_else(|| {
                Error::not_found("handler is not mounted").with_context("id", id)
            })?;
            handlers.remove(pos)
        };

        // drained outside the lock; dropping joins any worker
        if let Err(err) = removed.append.flush() {
            self.trap.trap(&err.with_context("handler", &removed.name));
        }
        drop(removed);
        Ok(())
    }

    fn log(&self, record: &Record) {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        for handler in handlers.iter() {
            if let Err(err) = handler.log(record) {
                self.trap.trap(&err.with_context("handler", &handler.name));
            }
        }
    }

    fn flush(&self) {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        for handler in handlers.iter() {
            if let Err(err) = handler.append.flush() {
                self.trap.trap(&err.with_context("handler", &handler.name));
            }
        }
    }
}

#[derive(Debug)]
struct Mounted {
    id: HandlerId,
    name: String,
    level: Level,
    filter: Filter,
    layout: Box<dyn Layout>,
    append: Box<dyn Append>,
}

impl Mounted {
    fn log(&self, record: &Record) -> Result<(), Error> {
        if !record.severity().passes(self.level) {
            return Ok(());
        }
        if !self.filter.matches(record) {
            return Ok(());
        }

        let entry = self.layout.format(record)?;
        self.append.append(record, &entry)
    }
}

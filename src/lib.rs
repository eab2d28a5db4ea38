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

//! Declarative handler loading for structured logging pipelines.
//!
//! # Overview
//!
//! A [`LoggerConfig`] declares handlers that may leave most of their fields unset. The
//! [`Loader`] resolves every declaration against the configured defaults, mounts the result on
//! an [`Engine`], and redirects ambient loggers (the `log` crate included) into the same
//! handlers, so all output is formatted, filtered and rotated the same way.
//!
//! - [`handler::resolve`] fills the gaps of a [`HandlerSpec`] with strict precedence.
//! - [`rotation::RotationChecker`] decides when a file rolls over, by size or at a daily time.
//! - [`Filter`] lets a single log call silence one class of handlers, or all of them.
//! - [`intercept::install`] routes ambient loggers to the engine, muting the noisy ones.
//! - [`Dispatcher`] is the built-in engine with stream, file, writer and callable sinks.
//!
//! # Examples
//!
//! Load the default handler set and log through the `log` crate:
//!
//! ```
//! use logforth_loader::Loader;
//!
//! logforth_loader::intercept::setup_log_crate();
//! Loader::from_env().load().unwrap();
//!
//! log::info!("This is an info message.");
//! log::warn!(disable_std_handler = true; "This one skips the console.");
//! ```
//!
//! Declare handlers in JSON:
//!
//! ```
//! use logforth_loader::Loader;
//! use logforth_loader::LoggerConfig;
//! use logforth_loader::engine::Dispatcher;
//! use serde_json::json;
//!
//! let logs_dir = tempfile::tempdir().unwrap();
//! let config = LoggerConfig::from_value(json!({
//!     "app_name": "billing",
//!     "default": {"file": {"logs_dir": logs_dir.path()}},
//!     "handlers": [
//!         {"name": "console", "type": "stream", "sink": "stderr", "colorize": false},
//!         {"name": "errors", "type": "file", "error": true, "rotation": "10 MB"},
//!     ],
//! }))
//! .unwrap();
//!
//! let engine = Loader::new(config, Dispatcher::default()).load().unwrap();
//! assert_eq!(engine.mounted().len(), 2);
//! assert!(logs_dir.path().join("billing.std.err.log").exists());
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod append;
pub mod config;
pub mod engine;
pub mod filter;
pub mod handler;
pub mod intercept;
pub mod layout;
pub mod level;
pub mod loader;
pub mod non_blocking;
pub mod record;
pub mod retention;
pub mod rotation;
pub mod trap;

mod error;

pub use self::config::LoggerConfig;
pub use self::engine::Dispatcher;
pub use self::engine::Engine;
pub use self::error::Error;
pub use self::error::ErrorKind;
pub use self::filter::Filter;
pub use self::handler::HandlerSpec;
pub use self::level::Level;
pub use self::level::Severity;
pub use self::loader::HandlerRef;
pub use self::loader::Loader;
pub use self::record::Record;

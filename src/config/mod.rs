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

//! Logger configuration.
//!
//! A [`LoggerConfig`] holds the default policy every handler falls back to, the intercept policy
//! for ambient loggers, and the ordered handler declarations. Every block has defaults, so a
//! partial JSON document decodes into a complete configuration:
//!
//! ```
//! use logforth_loader::config::LoggerConfig;
//! use logforth_loader::level::Level;
//! use serde_json::json;
//!
//! let config = LoggerConfig::from_value(json!({
//!     "app_name": "billing",
//!     "default": {"level": {"base": "DEBUG"}},
//!     "intercept": {"mute_modules": ["hyper"]},
//! }))
//! .unwrap();
//!
//! assert_eq!(config.default.level.base, Level::Debug);
//! assert_eq!(config.default.level.err, Level::Warning);
//! assert!(config.intercept.mute_modules.contains("hyper"));
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;

use jiff::civil::Time;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

pub use self::merge::deep_merge;
use crate::Error;
use crate::handler::HandlerKind;
use crate::handler::HandlerSpec;
use crate::level::Level;
use crate::retention::Retention;
use crate::rotation::deserialize_size;

mod merge;

/// Name of the default stream handler.
pub const DEFAULT_ALL_STD_HANDLER_NAME: &str = "default.all.std_handler";
/// Name of the default plain-text file handler.
pub const DEFAULT_ALL_FILE_HANDLER_NAME: &str = "default.all.file_handler";
/// Name of the default plain-text error file handler.
pub const DEFAULT_ERR_FILE_HANDLER_NAME: &str = "default.err.file_handler";
/// Name of the default JSON file handler.
pub const DEFAULT_ALL_JSON_HANDLER_NAME: &str = "default.all.json_handler";
/// Name of the default JSON error file handler.
pub const DEFAULT_ERR_JSON_HANDLER_NAME: &str = "default.err.json_handler";

/// The environment variable that turns on debug mode.
pub const DEBUG_ENV: &str = "DEBUG";

/// The complete logger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Substituted for `{app_name}` in path templates and formats.
    pub app_name: String,
    /// Debug mode lowers defaulted base levels to `DEBUG`.
    pub debug: bool,
    pub default: DefaultConfig,
    pub intercept: InterceptConfig,
    // handlers may hold writers and closures, so they never take part in serialization
    #[serde(skip_serializing)]
    pub handlers: Vec<HandlerSpec>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            debug: false,
            default: DefaultConfig::default(),
            intercept: InterceptConfig::default(),
            handlers: default_handlers(),
        }
    }
}

impl LoggerConfig {
    /// The default configuration with environment signals applied.
    ///
    /// Currently this reads the debug flag from [`DEBUG_ENV`].
    pub fn from_env() -> Self {
        let mut config = LoggerConfig::default();
        config.debug = debug_mode_from(std::env::var(DEBUG_ENV).ok().as_deref());
        config
    }

    /// Decode and validate a configuration document.
    ///
    /// Missing keys take their defaults; a document without `handlers` gets the default handler
    /// set.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let config: LoggerConfig = serde_json::from_value(value)
            .map_err(|err| Error::config("invalid logger configuration").with_source(err))?;
        config.validate()?;
        Ok(config)
    }

    /// Deep-merge a partial document into this configuration and validate the result.
    ///
    /// Maps merge key by key; every other value, lists included, is replaced wholesale. When the
    /// patch carries no `handlers` key the current handler declarations are kept as they are.
    pub fn merged(&self, patch: Value) -> Result<Self, Error> {
        let mut base = serde_json::to_value(self)
            .map_err(|err| Error::config("failed to encode logger configuration").with_source(err))?;
        let replaces_handlers = patch.get("handlers").is_some();
        deep_merge(&mut base, patch);

        let mut config = LoggerConfig::from_value(base)?;
        if !replaces_handlers {
            config.handlers = self.handlers.clone();
            config.validate()?;
        }
        Ok(config)
    }

    /// Check the invariants that span more than one field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.app_name.is_empty() || self.app_name.len() > 128 {
            return Err(Error::config("app_name must be 1 to 128 characters")
                .with_context("app_name", &self.app_name));
        }

        let mut names = BTreeSet::new();
        for handler in &self.handlers {
            if !names.insert(handler.name.as_str()) {
                return Err(Error::config("duplicate name").with_context("handler", &handler.name));
            }
        }
        Ok(())
    }
}

/// Defaults every handler falls back to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultConfig {
    pub level: LevelConfig,
    /// The format of non-stream handlers.
    pub format: String,
    pub std: StdConfig,
    pub file: FileConfig,
    /// Whether serializing handlers use the custom JSON format instead of engine serialization.
    pub custom_serialize: bool,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            level: LevelConfig::default(),
            format: "[{time:%Y-%m-%d %H:%M:%S.%6f %:z} | {level_short:<5} | {name}:{function}:{line}]: {message}"
                .to_string(),
            std: StdConfig::default(),
            file: FileConfig::default(),
            custom_serialize: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    pub base: Level,
    pub err: Level,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            base: Level::Info,
            err: Level::Warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StdConfig {
    pub format: String,
    pub colorize: bool,
}

impl Default for StdConfig {
    fn default() -> Self {
        Self {
            format: "[{time:%Y-%m-%d %H:%M:%S.%3f %:z} | {level_short:<5} | {name}:{line}]: {message}"
                .to_string(),
            colorize: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub logs_dir: PathBuf,
    /// Rotate once a file reaches this many bytes.
    #[serde(deserialize_with = "deserialize_size")]
    pub rotate_size: u64,
    /// Rotate every day at this time.
    pub rotate_time: Time,
    pub retention: Retention,
    pub encoding: String,
    pub plain: PathTemplates,
    pub json: PathTemplates,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            rotate_size: 10_000_000,
            rotate_time: Time::midnight(),
            retention: Retention::Files(90),
            encoding: "utf8".to_string(),
            plain: PathTemplates {
                log_path: "{app_name}.std.all.log".to_string(),
                err_path: "{app_name}.std.err.log".to_string(),
            },
            json: PathTemplates {
                log_path: "json/{app_name}.json.all.log".to_string(),
                err_path: "json/{app_name}.json.err.log".to_string(),
            },
        }
    }
}

/// Paths relative to [`FileConfig::logs_dir`]; `{app_name}` is substituted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathTemplates {
    pub log_path: String,
    pub err_path: String,
}

/// How records of ambient loggers are captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    /// Redirect every known ambient logger.
    pub enabled: bool,
    /// Redirect the leading segment of each logger name instead of the full name.
    pub only_base: bool,
    /// Loggers left untouched by the blanket redirect.
    pub ignore_modules: BTreeSet<String>,
    /// Loggers redirected even when not known yet.
    pub include_modules: BTreeSet<String>,
    /// Loggers silenced entirely; wins over the other lists.
    pub mute_modules: BTreeSet<String>,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            only_base: false,
            ignore_modules: BTreeSet::new(),
            include_modules: BTreeSet::new(),
            mute_modules: BTreeSet::new(),
        }
    }
}

fn default_handlers() -> Vec<HandlerSpec> {
    let file = |name: &str, is_error: bool, serialize: bool| HandlerSpec {
        is_error,
        serialize,
        enabled: false,
        ..HandlerSpec::new(name, HandlerKind::File)
    };

    vec![
        HandlerSpec::new(DEFAULT_ALL_STD_HANDLER_NAME, HandlerKind::Stream),
        file(DEFAULT_ALL_FILE_HANDLER_NAME, false, false),
        file(DEFAULT_ERR_FILE_HANDLER_NAME, true, false),
        file(DEFAULT_ALL_JSON_HANDLER_NAME, false, true),
        file(DEFAULT_ERR_JSON_HANDLER_NAME, true, true),
    ]
}

fn default_app_name() -> String {
    let name = std::env::current_exe()
        .ok()
        .and_then(|path| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_default();
    let slug = slugify(&name);
    if slug.is_empty() {
        "app".to_string()
    } else {
        slug
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').chars().take(128).collect()
}

/// Interpret the value of [`DEBUG_ENV`].
pub fn debug_mode_from(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

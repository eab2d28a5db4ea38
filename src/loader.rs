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

//! The composition root: loads a [`LoggerConfig`] into an [`Engine`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::RwLock;

use serde_json::Value;

use crate::Error;
use crate::ErrorKind;
use crate::config::LoggerConfig;
use crate::engine::Dispatcher;
use crate::engine::Engine;
use crate::engine::HandlerId;
use crate::handler::HandlerSpec;
use crate::handler::ResolvedHandler;
use crate::handler::resolve;
use crate::intercept;
use crate::intercept::Adapter;
use crate::intercept::AmbientRegistry;
use crate::intercept::Registry;
use crate::level::Level;
use crate::record::Record;

/// The key of the logger section in a configuration file.
pub const CONFIG_FILE_KEY: &str = "logger";

/// The configuration file [`Loader::from_env`] reads, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "configs/logger.yml";

/// A mounted handler, by name or by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerRef {
    Name(String),
    Id(HandlerId),
}

impl From<&str> for HandlerRef {
    fn from(name: &str) -> Self {
        HandlerRef::Name(name.to_string())
    }
}

impl From<String> for HandlerRef {
    fn from(name: String) -> Self {
        HandlerRef::Name(name)
    }
}

impl From<HandlerId> for HandlerRef {
    fn from(id: HandlerId) -> Self {
        HandlerRef::Id(id)
    }
}

impl fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerRef::Name(name) => write!(f, "{name}"),
            HandlerRef::Id(id) => write!(f, "#{id}"),
        }
    }
}

/// Loads a [`LoggerConfig`] into an [`Engine`] and keeps track of what it mounted.
///
/// Every operation is serialized by one lock over the configuration, the name to id map of
/// mounted handlers and the intercept routes.
///
/// # Examples
///
/// ```no_run
/// use logforth_loader::Loader;
/// use serde_json::json;
///
/// logforth_loader::intercept::setup_log_crate();
///
/// let loader = Loader::from_env();
/// loader
///     .update_config(json!({"app_name": "billing", "default": {"level": {"base": "DEBUG"}}}))
///     .unwrap();
/// loader.load().unwrap();
///
/// log::info!("ready");
/// log::warn!(disable_std_handler = true; "only in files");
/// ```
pub struct Loader<E: Engine = Dispatcher> {
    engine: Arc<E>,
    registry: Arc<RwLock<dyn AmbientRegistry>>,
    config_path: Option<PathBuf>,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    config: LoggerConfig,
    handlers: BTreeMap<String, HandlerId>,
}

impl<E: Engine + fmt::Debug> fmt::Debug for Loader<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("engine", &self.engine)
            .field("registry", &self.registry)
            .field("config_path", &self.config_path)
            .field("state", &self.state)
            .finish()
    }
}

impl Loader<Dispatcher> {
    /// A loader over a fresh [`Dispatcher`] with [`LoggerConfig::from_env`], overlaid by
    /// [`DEFAULT_CONFIG_PATH`] when that file exists.
    pub fn from_env() -> Self {
        Loader::new(LoggerConfig::from_env(), Dispatcher::default())
            .config_path(DEFAULT_CONFIG_PATH)
    }
}

impl<E: Engine> Loader<E> {
    /// Creates a loader; nothing is mounted until [`Loader::load`].
    pub fn new(config: LoggerConfig, engine: E) -> Self {
        Self {
            engine: Arc::new(engine),
            registry: Arc::new(RwLock::new(Registry::new())),
            config_path: None,
            state: Mutex::new(State {
                config,
                handlers: BTreeMap::new(),
            }),
        }
    }

    /// Uses an externally owned ambient registry instead of a private one.
    pub fn registry(mut self, registry: Arc<RwLock<dyn AmbientRegistry>>) -> Self {
        self.registry = registry;
        self
    }

    /// Merges the `logger` section of this file into the configuration on every load.
    ///
    /// The format follows the extension: `.json`, `.yml`/`.yaml` or `.toml`; any other
    /// extension fails the load. A missing file is skipped.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// The engine handlers are mounted on.
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// A snapshot of the current configuration.
    pub fn config(&self) -> LoggerConfig {
        self.lock().config.clone()
    }

    /// The names and ids of the mounted handlers.
    pub fn handlers(&self) -> Vec<(String, HandlerId)> {
        let state = self.lock();
        state
            .handlers
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect()
    }

    /// Remounts every enabled handler of the configuration and installs the intercept routes.
    ///
    /// Mounted handlers are removed first. When a handler fails to resolve or mount, the ones
    /// mounted by this call are removed again and the error is returned.
    pub fn load(&self) -> Result<Arc<E>, Error> {
        let mut state = self.lock();

        self.remove_all(&mut state)?;
        if let Some(path) = &self.config_path {
            if let Some(patch) = read_config_file(path)? {
                state.config = state.config.merged(patch)?;
            }
        }
        state.config.validate()?;

        let mut mounted = Vec::new();
        let mut failure = None;
        for spec in &state.config.handlers {
            match self.mount(spec, &state.config) {
                Ok(Some(id)) => mounted.push((spec.name.clone(), id)),
                Ok(None) => {}
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if let Some(mut err) = failure {
            // handlers that cannot be removed stay tracked so a later call can retry
            for (name, id) in mounted {
                if let Err(rollback) = self.engine.remove(id) {
                    err = err.with_context("rollback", format!("{name}: {rollback}"));
                    state.handlers.insert(name, id);
                }
            }
            return Err(err);
        }
        state.handlers = mounted.into_iter().collect();

        self.install(&state.config);
        Ok(self.engine.clone())
    }

    /// Removes one mounted handler, or every one when `handler` is `None`.
    ///
    /// Fails with [`ErrorKind::NotFound`] when no handler of that name or id is mounted.
    pub fn remove_handler(&self, handler: Option<HandlerRef>) -> Result<(), Error> {
        let mut state = self.lock();
        let Some(handler) = handler else {
            return self.remove_all(&mut state);
        };

        let name = match &handler {
            HandlerRef::Name(name) => state.handlers.contains_key(name).then(|| name.clone()),
            HandlerRef::Id(id) => state
                .handlers
                .iter()
                .find(|(_, mounted)| *mounted == id)
                .map(|(name, _)| name.clone()),
        };
        let Some(name) = name else {
            return Err(
                Error::not_found("handler is not mounted").with_context("handler", handler)
            );
        };

        if let Some(id) = state.handlers.remove(&name) {
            self.engine.remove(id)?;
        }
        Ok(())
    }

    /// Resolves and mounts one handler.
    ///
    /// A handler already mounted under the same name is removed first. Returns `None` for a
    /// disabled handler, which is resolved but not mounted.
    pub fn add_handler(&self, spec: HandlerSpec) -> Result<Option<HandlerId>, Error> {
        let mut state = self.lock();

        let handler = resolve(&spec, &state.config)?;
        if let Some(stale) = state.handlers.remove(&spec.name) {
            ignore_not_found(self.engine.remove(stale))?;
        }

        let id = self.mount_resolved(handler)?;
        if let Some(id) = id {
            state.handlers.insert(spec.name, id);
        }
        Ok(id)
    }

    /// Deep-merges a partial configuration document and validates the result.
    ///
    /// Mounted handlers are left alone until the next [`Loader::load`].
    pub fn update_config(&self, patch: Value) -> Result<(), Error> {
        let mut state = self.lock();
        state.config = state.config.merged(patch)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_all(&self, state: &mut State) -> Result<(), Error> {
        let handlers = std::mem::take(&mut state.handlers);
        for (_, id) in handlers {
            ignore_not_found(self.engine.remove(id))?;
        }
        Ok(())
    }

    fn mount(&self, spec: &HandlerSpec, config: &LoggerConfig) -> Result<Option<HandlerId>, Error> {
        let handler = resolve(spec, config)?;
        self.mount_resolved(handler)
    }

    fn mount_resolved(&self, handler: ResolvedHandler) -> Result<Option<HandlerId>, Error> {
        if !handler.enabled {
            return Ok(None);
        }
        if let Some(path) = handler.path() {
            create_parent_dir(path)?;
        }
        self.engine.add(handler).map(Some)
    }

    fn install(&self, config: &LoggerConfig) {
        let installed = {
            let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            intercept::install(&config.intercept, &mut *registry)
        };

        let engine: Arc<dyn Engine> = self.engine.clone();
        intercept::set_adapter(Adapter::new(engine, self.registry.clone()).facility_module("log"));

        let record = Record::builder()
            .severity(Level::Trace)
            .name(env!("CARGO_CRATE_NAME"))
            .module(Some(module_path!()))
            .file(Some(file!()))
            .line(Some(line!()))
            .function(Some("install"))
            .message(installed.to_string())
            .build();
        self.engine.log(&record);
    }
}

fn ignore_not_found(result: Result<(), Error>) -> Result<(), Error> {
    match result {
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

fn create_parent_dir(path: &Path) -> Result<(), Error> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(|err| {
            Error::unexpected("failed to create log directory")
                .with_context("path", dir.display())
                .with_source(err)
        }),
        _ => Ok(()),
    }
}

/// The formats a configuration file may be written in, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    fn of(path: &Path) -> Result<ConfigFormat, Error> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yml" | "yaml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            _ => Err(Error::config("unsupported config file format")
                .with_context("path", path.display())
                .with_context("expected", ".yml, .yaml, .json or .toml")),
        }
    }

    fn decode(self, content: &str) -> Result<Value, anyhow::Error> {
        Ok(match self {
            ConfigFormat::Json => serde_json::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
        })
    }
}

fn read_config_file(path: &Path) -> Result<Option<Value>, Error> {
    let format = ConfigFormat::of(path)?;
    if !path.is_file() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|err| {
        Error::unexpected("failed to read config file")
            .with_context("path", path.display())
            .with_source(err)
    })?;
    let mut document = format.decode(&content).map_err(|err| {
        Error::config("invalid config file")
            .with_context("path", path.display())
            .with_source(err)
    })?;

    Ok(document
        .get_mut(CONFIG_FILE_KEY)
        .map(Value::take)
        .filter(|section| !section.is_null()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::AtomicU64;
    use std::sync::atomic::Ordering;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::handler::HandlerKind;
    use crate::handler::Sink;

    /// Counts mounts; fails to mount handlers whose name starts with `broken`, and fails every
    /// removal once `stuck` is set.
    #[derive(Debug, Default)]
    struct Counting {
        next: AtomicU64,
        mounted: Mutex<Vec<HandlerId>>,
        stuck: AtomicBool,
    }

    impl Engine for Counting {
        fn add(&self, handler: ResolvedHandler) -> Result<HandlerId, Error> {
            if handler.name.starts_with("broken") {
                return Err(Error::unexpected("sink is unavailable"));
            }
            let id = HandlerId(self.next.fetch_add(1, Ordering::Relaxed));
            self.mounted.lock().unwrap().push(id);
            Ok(id)
        }

        fn remove(&self, id: HandlerId) -> Result<(), Error> {
            if self.stuck.load(Ordering::Relaxed) {
                return Err(Error::unexpected("sink refuses to close"));
            }
            let mut mounted = self.mounted.lock().unwrap();
            let pos = mounted
                .iter()
                .position(|m| *m == id)
                .ok_or_else(|| Error::not_found("handler is not mounted"))?;
            mounted.remove(pos);
            Ok(())
        }

        fn log(&self, _: &Record) {}

        fn flush(&self) {}
    }

    fn stream(name: &str) -> HandlerSpec {
        HandlerSpec::custom(name, Sink::Stderr)
    }

    fn config(handlers: Vec<HandlerSpec>) -> LoggerConfig {
        LoggerConfig {
            app_name: "demo".to_string(),
            handlers,
            ..LoggerConfig::default()
        }
    }

    #[test]
    fn test_load_mounts_enabled_handlers() {
        let disabled = HandlerSpec {
            enabled: false,
            ..stream("disabled")
        };
        let loader = Loader::new(
            config(vec![stream("a"), disabled, stream("b")]),
            Counting::default(),
        );

        let engine = loader.load().unwrap();
        let names: Vec<_> = loader.handlers().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(engine.mounted.lock().unwrap().len(), 2);

        // reloading replaces, never accumulates
        loader.load().unwrap();
        assert_eq!(engine.mounted.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_load_rolls_back_on_error() {
        let loader = Loader::new(
            config(vec![stream("a"), stream("broken"), stream("c")]),
            Counting::default(),
        );

        let err = loader.load().unwrap_err();
        assert_eq!(err.message(), "sink is unavailable");
        assert!(loader.handlers().is_empty());
        assert!(loader.engine().mounted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failed_rollback_is_reported() {
        let loader = Loader::new(config(vec![stream("a"), stream("broken")]), Counting::default());
        loader.engine().stuck.store(true, Ordering::Relaxed);

        let err = loader.load().unwrap_err();
        assert_eq!(err.message(), "sink is unavailable");
        assert!(err.to_string().contains("rollback: a: "), "{err}");
        assert!(err.to_string().contains("sink refuses to close"), "{err}");

        // the stranded handler is still tracked and removable once the engine recovers
        assert_eq!(loader.handlers().len(), 1);
        assert_eq!(loader.handlers()[0].0, "a");
        loader.engine().stuck.store(false, Ordering::Relaxed);
        loader.remove_handler(Some("a".into())).unwrap();
        assert!(loader.engine().mounted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_load_fails_on_unresolvable_handler() {
        let missing = HandlerSpec::new("missing", HandlerKind::Custom);
        let loader = Loader::new(config(vec![stream("a"), missing]), Counting::default());

        let err = loader.load().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.message(), "missing sink");
        assert!(loader.engine().mounted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_remove_handler() {
        let loader = Loader::new(
            config(vec![stream("a"), stream("b"), stream("c")]),
            Counting::default(),
        );
        loader.load().unwrap();
        let ids: BTreeMap<_, _> = loader.handlers().into_iter().collect();

        loader.remove_handler(Some("a".into())).unwrap();
        loader.remove_handler(Some(ids["b"].into())).unwrap();
        let names: Vec<_> = loader.handlers().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["c".to_string()]);

        let err = loader.remove_handler(Some("a".into())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = loader.remove_handler(Some(ids["b"].into())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        loader.remove_handler(None).unwrap();
        assert!(loader.handlers().is_empty());
        assert!(loader.engine().mounted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_add_handler() {
        let loader = Loader::new(config(vec![]), Counting::default());
        loader.load().unwrap();

        let first = loader.add_handler(stream("extra")).unwrap().unwrap();
        let second = loader.add_handler(stream("extra")).unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(loader.handlers(), vec![("extra".to_string(), second)]);
        assert_eq!(*loader.engine().mounted.lock().unwrap(), vec![second]);

        // failures leave no bookkeeping behind
        loader.add_handler(stream("broken")).unwrap_err();
        let err = loader
            .add_handler(HandlerSpec::new("sinkless", HandlerKind::Custom))
            .unwrap_err();
        assert_eq!(err.message(), "missing sink");
        assert_eq!(loader.handlers(), vec![("extra".to_string(), second)]);

        let disabled = HandlerSpec {
            enabled: false,
            ..stream("disabled")
        };
        assert_eq!(loader.add_handler(disabled).unwrap(), None);
        assert_eq!(loader.handlers().len(), 1);
    }

    #[test]
    fn test_update_config() {
        let loader = Loader::new(config(vec![stream("a")]), Counting::default());
        loader
            .update_config(json!({"default": {"level": {"base": "DEBUG"}}}))
            .unwrap();

        let updated = loader.config();
        assert_eq!(updated.default.level.base, Level::Debug);
        assert_eq!(updated.default.level.err, Level::Warning);
        assert_eq!(updated.app_name, "demo");
        assert_eq!(updated.handlers.len(), 1);
        // not remounted until the next load
        assert!(loader.handlers().is_empty());

        let err = loader.update_config(json!({"app_name": ""})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(loader.config().app_name, "demo");
    }

    #[test]
    fn test_file_handler_creates_directory() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let logs_dir = temp_dir.path().join("nested").join("logs");
        let mut config = config(vec![HandlerSpec {
            serialize: true,
            ..HandlerSpec::file("json")
        }]);
        config.default.file.logs_dir = logs_dir.clone();

        let loader = Loader::new(config, Counting::default());
        loader.load().unwrap();
        assert!(logs_dir.join("json").is_dir());
    }

    #[test]
    fn test_config_file() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"logger": {"app_name": "from-file", "intercept": {"mute_modules": ["hyper"]}}}"#,
        )
        .unwrap();

        let loader =
            Loader::new(config(vec![stream("a")]), Counting::default()).config_path(&path);
        loader.load().unwrap();

        let loaded = loader.config();
        assert_eq!(loaded.app_name, "from-file");
        assert!(loaded.intercept.mute_modules.contains("hyper"));
        assert_eq!(loader.handlers().len(), 1);

        let missing = Loader::new(config(vec![]), Counting::default())
            .config_path(temp_dir.path().join("absent.json"));
        missing.load().unwrap();
        assert_eq!(missing.config().app_name, "demo");
    }

    #[test]
    fn test_config_file_formats() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let files = [
            (
                "logger.yml",
                "logger:\n  app_name: from-yml\n  default:\n    level:\n      base: DEBUG\n",
            ),
            (
                "logger.YAML",
                "logger:\n  app_name: from-yaml\n  default:\n    level:\n      base: DEBUG\n",
            ),
            (
                "logger.toml",
                "[logger]\napp_name = \"from-toml\"\n\n[logger.default.level]\nbase = \"DEBUG\"\n",
            ),
        ];

        for (filename, content) in files {
            let path = temp_dir.path().join(filename);
            fs::write(&path, content).unwrap();

            let loader =
                Loader::new(config(vec![stream("a")]), Counting::default()).config_path(&path);
            loader.load().unwrap();

            let loaded = loader.config();
            let expected = format!("from-{}", filename.rsplit('.').next().unwrap().to_lowercase());
            assert_eq!(loaded.app_name, expected, "{filename}");
            assert_eq!(loaded.default.level.base, Level::Debug, "{filename}");
            assert_eq!(loaded.default.level.err, LoggerConfig::default().default.level.err);
        }
    }

    #[test]
    fn test_config_file_errors() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");

        let broken = temp_dir.path().join("logger.yaml");
        fs::write(&broken, "logger: [unclosed\n").unwrap();
        let err = Loader::new(config(vec![]), Counting::default())
            .config_path(&broken)
            .load()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.message(), "invalid config file");

        // the format is checked even when the file does not exist
        let err = Loader::new(config(vec![]), Counting::default())
            .config_path(temp_dir.path().join("logger.ini"))
            .load()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.message(), "unsupported config file format");
    }
}

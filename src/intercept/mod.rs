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

//! Interception of ambient loggers.
//!
//! Libraries log through facilities of their own. [`install`] points the routes of an
//! [`AmbientRegistry`] at one catch-all [`Adapter`], which forwards records into the engine so
//! they are formatted, filtered and rotated like everything else. The `log` crate is bridged by
//! [`setup_log_crate`].

use std::collections::BTreeSet;
use std::fmt;

pub use self::adapter::Adapter;
pub use self::adapter::AmbientRecord;
pub use self::adapter::Frame;
pub use self::adapter::attribute_caller;
pub use self::log::setup_log_crate;
pub use self::log::try_setup_log_crate;
pub use self::registry::Registry;
use crate::config::InterceptConfig;

mod adapter;
mod log;
mod registry;

pub(crate) use self::log::set_adapter;

/// Where records of one ambient logger go.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Defer to the closest ancestor with a route of its own.
    #[default]
    Default,
    /// Handled by the adapter only, without propagating further.
    Intercepted,
    /// Dropped, for this logger and every descendant without its own route.
    Muted,
}

/// The named loggers of an ambient facility and their routes.
pub trait AmbientRegistry: fmt::Debug + Send + Sync + 'static {
    /// The names of every registered logger.
    fn names(&self) -> Vec<String>;

    /// Whether a logger of this exact name is registered.
    fn is_registered(&self, name: &str) -> bool;

    /// Registers a logger with [`Route::Default`]; a no-op when it already exists.
    fn register(&mut self, name: &str);

    /// Sets the route of the root logger.
    fn set_root(&mut self, route: Route);

    /// Sets the route of one logger, registering it when unknown.
    fn set_route(&mut self, name: &str, route: Route);

    /// The effective route of a logger, following ancestors up to the root.
    fn route(&self, name: &str) -> Route;
}

/// What one [`install`] did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Installed {
    pub intercepted: Vec<String>,
    pub muted: Vec<String>,
}

impl fmt::Display for Installed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "intercepted modules: {:?}; muted modules: {:?}",
            self.intercepted, self.muted
        )
    }
}

/// Points the registry's routes at the adapter according to `policy`.
///
/// The root is always intercepted. With `enabled`, every registered logger (reduced to its
/// leading segment under `only_base`) that is neither ignored nor muted is intercepted;
/// `include_modules` are intercepted even when unknown; `mute_modules` are muted last, so muting
/// wins. Routes left by a previous install are reset first, which makes the call idempotent.
///
/// ```
/// use logforth_loader::config::InterceptConfig;
/// use logforth_loader::intercept::AmbientRegistry;
/// use logforth_loader::intercept::Registry;
/// use logforth_loader::intercept::Route;
/// use logforth_loader::intercept::install;
///
/// let mut registry = Registry::new();
/// registry.register("hyper::proto");
/// registry.register("billing::api");
///
/// let mut policy = InterceptConfig::default();
/// policy.only_base = true;
/// policy.mute_modules.insert("hyper".to_string());
///
/// let installed = install(&policy, &mut registry);
/// assert_eq!(installed.intercepted, vec!["billing".to_string()]);
/// assert_eq!(registry.route("hyper::proto"), Route::Muted);
/// ```
pub fn install(policy: &InterceptConfig, registry: &mut dyn AmbientRegistry) -> Installed {
    let registered = registry.names();
    for name in &registered {
        registry.set_route(name, Route::Default);
    }
    registry.set_root(Route::Intercepted);

    let mut intercepted = BTreeSet::new();
    if policy.enabled {
        for name in &registered {
            let name = if policy.only_base {
                registry::base_name(name)
            } else {
                name.as_str()
            };
            if policy.ignore_modules.contains(name) || policy.mute_modules.contains(name) {
                continue;
            }
            intercepted.insert(name.to_string());
        }
    }
    for name in &policy.include_modules {
        if !policy.mute_modules.contains(name) {
            intercepted.insert(name.clone());
        }
    }

    for name in &intercepted {
        registry.set_route(name, Route::Intercepted);
    }
    for name in &policy.mute_modules {
        registry.set_route(name, Route::Muted);
    }

    Installed {
        intercepted: intercepted.into_iter().collect(),
        muted: policy.mute_modules.iter().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> InterceptConfig {
        InterceptConfig::default()
    }

    #[test]
    fn test_only_base_muted() {
        let mut registry = Registry::new();
        registry.register("pkg.sub");
        let mut policy = policy();
        policy.only_base = true;
        policy.mute_modules.insert("pkg".to_string());

        let installed = install(&policy, &mut registry);

        assert_eq!(registry.route("pkg.sub"), Route::Muted);
        assert_eq!(registry.route("pkg"), Route::Muted);
        assert!(installed.intercepted.is_empty());
        assert_eq!(installed.muted, vec!["pkg".to_string()]);
    }

    #[test]
    fn test_ignore_and_include() {
        let mut registry = Registry::new();
        registry.register("billing.api");
        registry.register("metrics");
        let mut policy = policy();
        policy.ignore_modules.insert("metrics".to_string());
        policy.include_modules.insert("late.loader".to_string());

        let installed = install(&policy, &mut registry);

        assert_eq!(
            installed.intercepted,
            vec!["billing.api".to_string(), "late.loader".to_string()]
        );
        assert!(registry.is_registered("late.loader"));
        assert_eq!(registry.route("billing.api"), Route::Intercepted);
        // ignored loggers still reach the root adapter through propagation
        assert_eq!(registry.route("metrics"), Route::Intercepted);
        assert_eq!(registry.root(), Route::Intercepted);
    }

    #[test]
    fn test_mute_wins_over_include() {
        let mut registry = Registry::new();
        let mut policy = policy();
        policy.include_modules.insert("noisy".to_string());
        policy.mute_modules.insert("noisy".to_string());

        let installed = install(&policy, &mut registry);

        assert!(installed.intercepted.is_empty());
        assert_eq!(registry.route("noisy.child"), Route::Muted);
    }

    #[test]
    fn test_disabled_intercepts_root_only() {
        let mut registry = Registry::new();
        registry.register("billing");
        let mut policy = policy();
        policy.enabled = false;

        let installed = install(&policy, &mut registry);

        assert!(installed.intercepted.is_empty());
        assert_eq!(registry.route("billing"), Route::Intercepted);
    }

    #[test]
    fn test_install_is_idempotent() {
        let mut registry = Registry::new();
        registry.register("pkg.sub");
        registry.register("other");
        let mut policy = policy();
        policy.mute_modules.insert("other".to_string());

        let first = install(&policy, &mut registry);
        let snapshot = registry.clone();
        let second = install(&policy, &mut registry);
        assert_eq!(first, second);
        assert_eq!(registry.names(), snapshot.names());

        // a later install without the mute lifts it
        policy.mute_modules.clear();
        install(&policy, &mut registry);
        assert_eq!(registry.route("other"), Route::Intercepted);
    }
}

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

use std::collections::BTreeMap;

use crate::intercept::AmbientRegistry;
use crate::intercept::Route;

/// An in-memory ambient logger registry.
///
/// Logger names are hierarchical: `a.b.c` and `a::b::c` both descend from `a::b`/`a.b` and `a`.
/// A logger without a route of its own inherits the route of its closest routed ancestor, and
/// finally the root route.
///
/// ```
/// use logforth_loader::intercept::AmbientRegistry;
/// use logforth_loader::intercept::Registry;
/// use logforth_loader::intercept::Route;
///
/// let mut registry = Registry::new();
/// registry.set_root(Route::Intercepted);
/// registry.set_route("hyper", Route::Muted);
///
/// assert_eq!(registry.route("hyper::proto::h1"), Route::Muted);
/// assert_eq!(registry.route("billing.api"), Route::Intercepted);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Registry {
    root: Route,
    loggers: BTreeMap<String, Route>,
}

impl Registry {
    /// An empty registry whose root route is [`Route::Default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The route set on the root logger.
    pub fn root(&self) -> Route {
        self.root
    }
}

impl AmbientRegistry for Registry {
    fn names(&self) -> Vec<String> {
        self.loggers.keys().cloned().collect()
    }

    fn is_registered(&self, name: &str) -> bool {
        self.loggers.contains_key(name)
    }

    fn register(&mut self, name: &str) {
        if !name.is_empty() && !self.loggers.contains_key(name) {
            self.loggers.insert(name.to_string(), Route::Default);
        }
    }

    fn set_root(&mut self, route: Route) {
        self.root = route;
    }

    fn set_route(&mut self, name: &str, route: Route) {
        if name.is_empty() {
            self.root = route;
        } else {
            self.loggers.insert(name.to_string(), route);
        }
    }

    fn route(&self, name: &str) -> Route {
        let mut current = name;
        loop {
            match self.loggers.get(current) {
                Some(Route::Default) | None => {}
                Some(route) => return *route,
            }
            match parent(current) {
                Some(parent) => current = parent,
                None => return self.root,
            }
        }
    }
}

/// The leading segment of a logger name.
pub(crate) fn base_name(name: &str) -> &str {
    let end = name.find(['.', ':']).unwrap_or(name.len());
    &name[..end]
}

fn parent(name: &str) -> Option<&str> {
    let dot = name.rfind('.');
    let colons = name.rfind("::");
    match (dot, colons) {
        (Some(d), Some(c)) if d > c => Some(&name[..d]),
        (_, Some(c)) => Some(&name[..c]),
        (Some(d), None) => Some(&name[..d]),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent() {
        assert_eq!(parent("a.b.c"), Some("a.b"));
        assert_eq!(parent("a::b::c"), Some("a::b"));
        assert_eq!(parent("a::b.c"), Some("a::b"));
        assert_eq!(parent("a.b::c"), Some("a.b"));
        assert_eq!(parent("a"), None);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("pkg.sub.leaf"), "pkg");
        assert_eq!(base_name("hyper::proto"), "hyper");
        assert_eq!(base_name("solo"), "solo");
    }

    #[test]
    fn test_hierarchical_route() {
        let mut registry = Registry::new();
        registry.register("pkg.sub");
        assert_eq!(registry.route("pkg.sub"), Route::Default);

        registry.set_root(Route::Intercepted);
        assert_eq!(registry.route("pkg.sub"), Route::Intercepted);

        registry.set_route("pkg", Route::Muted);
        assert_eq!(registry.route("pkg.sub"), Route::Muted);
        assert_eq!(registry.route("pkg.sub.leaf"), Route::Muted);
        assert_eq!(registry.route("pkgs"), Route::Intercepted);

        registry.set_route("pkg.sub", Route::Intercepted);
        assert_eq!(registry.route("pkg.sub.leaf"), Route::Intercepted);
    }

    #[test]
    fn test_register_keeps_route() {
        let mut registry = Registry::new();
        registry.set_route("pkg", Route::Muted);
        registry.register("pkg");
        assert_eq!(registry.route("pkg"), Route::Muted);
        assert!(registry.is_registered("pkg"));
        assert_eq!(registry.names(), vec!["pkg".to_string()]);
    }
}

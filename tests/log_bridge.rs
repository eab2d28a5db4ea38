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

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;

use logforth_loader::Loader;
use logforth_loader::LoggerConfig;
use logforth_loader::engine::Dispatcher;
use logforth_loader::handler::HandlerSpec;
use logforth_loader::handler::Sink;
use logforth_loader::intercept::AmbientRegistry;
use logforth_loader::intercept::Registry;
use logforth_loader::intercept::Route;
use logforth_loader::layout::Format;
use serde_json::json;

// one test per binary: the log crate logger is process-wide
#[test]
fn test_log_crate_is_intercepted() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let lines = lines.clone();
        Sink::callable(move |_, line| lines.lock().unwrap().push(line.to_string()))
    };

    let mut config = LoggerConfig::from_value(json!({
        "app_name": "bridge",
        "intercept": {"only_base": true, "mute_modules": ["hyper"]},
    }))
    .unwrap();
    config.handlers = vec![HandlerSpec {
        format: Some(Format::text("{level_short} {name} {file}:{function} {message}")),
        ..HandlerSpec::custom("capture", sink)
    }];

    let mut registry = Registry::new();
    registry.register("hyper::proto::h1");
    registry.register("billing::api");
    let registry = Arc::new(RwLock::new(registry));

    logforth_loader::intercept::setup_log_crate();
    let loader = Loader::new(config, Dispatcher::default()).registry(registry.clone());
    loader.load().unwrap();

    {
        let registry = registry.read().unwrap();
        assert_eq!(registry.route("hyper::proto::h1"), Route::Muted);
        assert_eq!(registry.route("billing::api"), Route::Intercepted);
    }

    log::info!(target: "hyper::proto::h1", "muted by ancestor");
    log::info!(target: "hyper::client", "muted when seen later");
    log::warn!(target: "billing::api", "charge retried");
    log::info!(target: "billing::api", disable_all_handlers = true; "silenced at the call site");
    log::debug!(target: "billing::api", "below the base level");
    log::error!("from the test itself");

    let lines = lines.lock().unwrap();
    assert_eq!(
        *lines,
        vec![
            "WARN billing::api log_bridge.rs: charge retried".to_string(),
            "ERROR log_bridge log_bridge.rs: from the test itself".to_string(),
        ]
    );
}

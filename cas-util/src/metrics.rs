// Copyright 2024 The Cascache Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A tiny metrics-gathering surface (A4), mirroring the teacher's
//! `MetricsComponent`/`Registry` pattern in `fast_slow_store.rs`, but
//! backed by a flat counter map instead of a full Prometheus client so the
//! core crates stay dependency-light. The HTTP layer (`cas-service`)
//! formats a `Registry` into Prometheus exposition text for `GET /metrics`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Collects `(name, help, value)` triples published by `MetricsComponent`
/// implementors.
#[derive(Default)]
pub struct CollectorState {
    entries: BTreeMap<String, (String, u64)>,
}

impl CollectorState {
    pub fn publish(&mut self, name: &str, value: &AtomicU64, help: &str) {
        self.entries
            .insert(name.to_string(), (help.to_string(), value.load(Ordering::Acquire)));
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, u64)> {
        self.entries.iter().map(|(name, (help, value))| (name.as_str(), help.as_str(), *value))
    }

    /// Renders every published entry as Prometheus exposition text.
    pub fn to_prometheus_text(&self) -> String {
        let mut out = String::new();
        for (name, help, value) in self.entries() {
            out.push_str(&format!("# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"));
        }
        out
    }
}

/// Implemented by anything that wants to expose counters through a
/// [`Registry`].
pub trait MetricsComponent: Send + Sync {
    fn gather_metrics(&self, collector: &mut CollectorState);
}

/// A named group of metrics, mirroring the registry `fast_slow_store.rs`
/// hands its counters to.
#[derive(Default)]
pub struct Registry {
    components: Vec<Arc<dyn MetricsComponent>>,
}

impl Registry {
    /// Registers a component whose counters are included in the next
    /// `gather()` call.
    pub fn register(&mut self, component: Arc<dyn MetricsComponent>) {
        self.components.push(component);
    }

    /// Render every registered component into Prometheus exposition format.
    pub fn gather(&self) -> String {
        let mut state = CollectorState::default();
        for component in &self.components {
            component.gather_metrics(&mut state);
        }
        state.to_prometheus_text()
    }
}

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

//! Request-facing counters exposed at `GET /metrics` (A4).

use std::sync::atomic::{AtomicU64, Ordering};

use cas_util::metrics::{CollectorState, MetricsComponent};

#[derive(Default)]
pub struct ServiceMetrics {
    pub stores_total: AtomicU64,
    pub duplicates_total: AtomicU64,
    pub retrieves_total: AtomicU64,
    pub not_found_total: AtomicU64,
    pub verify_runs_total: AtomicU64,
    pub cleanup_runs_total: AtomicU64,
}

impl ServiceMetrics {
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl MetricsComponent for ServiceMetrics {
    fn gather_metrics(&self, collector: &mut CollectorState) {
        collector.publish("cas_stores_total", &self.stores_total, "Total accepted store requests");
        collector.publish("cas_duplicates_total", &self.duplicates_total, "Total duplicate store requests");
        collector.publish("cas_retrieves_total", &self.retrieves_total, "Total successful retrieves");
        collector.publish("cas_not_found_total", &self.not_found_total, "Total retrieve misses");
        collector.publish("cas_verify_runs_total", &self.verify_runs_total, "Total verification task runs");
        collector.publish("cas_cleanup_runs_total", &self.cleanup_runs_total, "Total cleanup task runs");
    }
}

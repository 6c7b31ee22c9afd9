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

//! Wires C1-C8 together into a single handle the HTTP layer holds one of.
//! Mirrors the role the teacher's `fast_slow_store.rs` plays as the
//! top-level composite store: it owns the collaborators and orchestrates
//! them, but holds no storage logic of its own beyond that orchestration.

use std::sync::Arc;

use crate::bulk_store::SharedBulkStore;
use crate::metadata_store::MetadataStore;
use crate::read_cache::ReadCache;
use crate::scheduler::TaskScheduler;

/// Shared, cloneable handle to the whole storage engine. Every component's
/// methods live in `impl CasEngine` blocks split across `ingest.rs`,
/// `verify.rs`, `presence.rs`, and `cleanup.rs`.
#[derive(Clone)]
pub struct CasEngine {
    pub(crate) metadata: Arc<dyn MetadataStore>,
    pub(crate) bulk: SharedBulkStore,
    pub(crate) cache: Arc<ReadCache>,
    pub(crate) scheduler: Arc<dyn TaskScheduler>,
    pub(crate) retention_days: u32,
}

impl CasEngine {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        bulk: SharedBulkStore,
        cache: Arc<ReadCache>,
        scheduler: Arc<dyn TaskScheduler>,
        retention_days: u32,
    ) -> Self {
        CasEngine {
            metadata,
            bulk,
            cache,
            scheduler,
            retention_days,
        }
    }

    /// Exposes the metadata store collaborator for introspection in tests
    /// and in ambient-stack code (e.g. `/healthz` liveness checks).
    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// Exposes the bulk object store collaborator.
    pub fn bulk(&self) -> &SharedBulkStore {
        &self.bulk
    }

    /// Exposes the read cache collaborator.
    pub fn cache(&self) -> &Arc<ReadCache> {
        &self.cache
    }
}

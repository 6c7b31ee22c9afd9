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

use serde::{Deserialize, Serialize};

/// Selects the backend used for the bulk object store (C3). Modeled after
/// the teacher's `StoreConfig` backend enum, trimmed to the two backends
/// this service actually needs.
#[allow(non_camel_case_types)]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum BulkStoreConfig {
    /// Keeps bulk objects in a process-local hashmap. Useful for tests and
    /// single-node deployments; nothing survives a restart.
    memory(MemoryStore),

    /// Stores bulk objects under a directory on the local filesystem, using
    /// the same temp-then-rename discipline the teacher's `FilesystemStore`
    /// uses so a crash mid-write never leaves a partial object visible.
    filesystem(FilesystemStore),
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct MemoryStore {
    /// Reserved for future eviction-policy configuration; the in-memory
    /// bulk store never evicts on its own, it only ever responds to
    /// explicit deletes from the cleanup state machine (C8).
    #[serde(default)]
    pub _reserved: Option<()>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FilesystemStore {
    /// Directory where bulk objects are stored, one file per `bulk_name`.
    pub content_path: String,

    /// Directory on the same filesystem as `content_path` used to stage
    /// writes before an atomic rename into place.
    pub temp_path: String,
}

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

//! The storage engine: the namespace/digest entry model, the hybrid
//! inline/bulk placement policy, asynchronous integrity verification, the
//! batched presence-check/tag pipeline, the eviction/cleanup state
//! machine, and the tiered read cache.

pub mod bulk_store;
pub mod cleanup;
pub mod engine;
pub mod entry;
pub mod ingest;
pub mod metadata_store;
pub mod presence;
pub mod read_cache;
pub mod retrieve;
pub mod scheduler;
pub mod verify;

pub use bulk_store::{BulkStore, FilesystemBulkStore, MemoryBulkStore, SharedBulkStore};
pub use engine::CasEngine;
pub use entry::{Entry, Placement};
pub use ingest::StoreOutcome;
pub use metadata_store::{EntryUpdate, InMemoryMetadataStore, MetadataStore, ScanFilter};
pub use read_cache::ReadCache;
pub use scheduler::{CleanupKind, FailingTaskScheduler, InProcessTaskScheduler, RecordingTaskScheduler, Task, TaskScheduler};

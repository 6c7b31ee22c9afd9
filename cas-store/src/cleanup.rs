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

//! The cleanup state machine (C8): old-entry eviction, testing-namespace
//! eviction, full obliteration, and the orphan blob sweep. All four share
//! the same in-flight-handle backpressure discipline.

use std::collections::VecDeque;

use cas_error::{Error, ResultExt};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use tokio::task::JoinHandle;

use crate::engine::CasEngine;
use crate::entry::ITEMS_TO_DELETE_ASYNC;
use crate::metadata_store::ScanFilter;

const MAX_IN_FLIGHT: usize = 10 * ITEMS_TO_DELETE_ASYNC;

/// A bounded queue of in-flight delete handles. Pushing past `MAX_IN_FLIGHT`
/// awaits (and drops) the oldest handle first, bounding memory for scans
/// over arbitrarily large namespaces.
struct InFlightDeletes {
    handles: VecDeque<JoinHandle<Result<(), Error>>>,
}

impl InFlightDeletes {
    fn new() -> Self {
        InFlightDeletes { handles: VecDeque::new() }
    }

    async fn push(&mut self, handle: JoinHandle<Result<(), Error>>) {
        if self.handles.len() >= MAX_IN_FLIGHT {
            if let Some(oldest) = self.handles.pop_front() {
                let _ = oldest.await;
            }
        }
        self.handles.push_back(handle);
    }

    async fn drain(mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

impl CasEngine {
    /// `old`: evicts entries with `last_access < today - retention_days`.
    /// Returns whether any entries were found.
    pub async fn cleanup_old(&self) -> Result<bool, Error> {
        let cutoff = Utc::now().date_naive() - ChronoDuration::days(self.retention_days as i64);
        let mut found_any = false;
        for namespace in self.metadata.list_namespaces().await.err_tip(|| "While listing namespaces")? {
            let keys = self
                .metadata
                .scan(ScanFilter::LastAccessBefore { namespace: namespace.clone(), cutoff })
                .await
                .err_tip(|| "While scanning for old entries")?;
            if keys.is_empty() {
                continue;
            }
            found_any = true;
            self.delete_keys_with_bulk_objects(keys).await?;
        }
        Ok(found_any)
    }

    /// `testing`: within every `temporary*` namespace, evicts entries with
    /// `last_access < today - 1`. A namespace left empty by this pass is
    /// scheduled for deletion.
    pub async fn cleanup_testing(&self) -> Result<bool, Error> {
        let cutoff = Utc::now().date_naive() - ChronoDuration::days(1);
        let mut found_any = false;
        for namespace in self.metadata.list_namespaces().await.err_tip(|| "While listing namespaces")? {
            if !namespace.starts_with("temporary") {
                continue;
            }
            let keys = self
                .metadata
                .scan(ScanFilter::LastAccessBefore { namespace: namespace.clone(), cutoff })
                .await
                .err_tip(|| "While scanning testing namespace")?;
            if !keys.is_empty() {
                found_any = true;
                self.delete_keys_with_bulk_objects(keys).await?;
            }

            let remaining = self
                .metadata
                .scan(ScanFilter::Namespace { namespace: namespace.clone() })
                .await
                .err_tip(|| "While checking namespace emptiness")?;
            if remaining.is_empty() {
                // The real deployment defers this by an extra day because
                // its entry deletes are fire-and-forget; here the deletes
                // above are already awaited, so it's safe to drop the
                // namespace row immediately.
                let _ = self.metadata.delete_namespace(&namespace).await;
            }
        }
        Ok(found_any)
    }

    /// `obliterate`: wipes every entry, then every namespace, then every
    /// bulk object, then flushes the read cache. Disaster-reset only.
    pub async fn obliterate(&self) -> Result<(), Error> {
        let keys = self.metadata.scan(ScanFilter::All).await.err_tip(|| "While scanning all entries")?;
        self.delete_keys_with_bulk_objects(keys).await?;

        for namespace in self.metadata.list_namespaces().await.err_tip(|| "While listing namespaces")? {
            let _ = self.metadata.delete_namespace(&namespace).await;
        }

        let bulk_names = self.bulk.list("").await.err_tip(|| "While listing bulk objects")?;
        self.bulk.delete(&bulk_names).await;

        self.cache.clear();
        Ok(())
    }

    /// Orphan sweep: deletes bulk objects that have no corresponding entry.
    /// Reuses the same listing/backpressure discipline as obliteration.
    pub async fn sweep_orphans(&self) -> Result<u64, Error> {
        let live_bulk_names: std::collections::HashSet<String> = {
            let keys = self.metadata.scan(ScanFilter::All).await.err_tip(|| "While scanning entries for orphan sweep")?;
            let mut names = std::collections::HashSet::new();
            for (namespace, digest) in keys {
                if let Some(entry) = self.metadata.get(&namespace, &digest).await.err_tip(|| "While loading entry")? {
                    if let Some(bulk_name) = entry.bulk_name {
                        names.insert(bulk_name);
                    }
                }
            }
            names
        };

        let all_bulk_names = self.bulk.list("").await.err_tip(|| "While listing bulk objects for orphan sweep")?;
        let orphans: Vec<String> = all_bulk_names
            .into_iter()
            .filter(|name| !live_bulk_names.contains(name))
            .collect();
        let count = orphans.len() as u64;

        for chunk in orphans.chunks(ITEMS_TO_DELETE_ASYNC) {
            self.bulk.delete(chunk).await;
        }
        Ok(count)
    }

    async fn delete_keys_with_bulk_objects(&self, keys: Vec<(String, String)>) -> Result<(), Error> {
        let mut in_flight = InFlightDeletes::new();
        for chunk in keys.chunks(ITEMS_TO_DELETE_ASYNC) {
            // Snapshot bulk_name before the entry itself is deleted.
            let mut bulk_names = Vec::new();
            for (namespace, digest) in chunk {
                if let Some(entry) = self.metadata.get(namespace, digest).await.err_tip(|| "While snapshotting entry")? {
                    if let Some(bulk_name) = entry.bulk_name {
                        bulk_names.push(bulk_name);
                    }
                }
            }

            let handles = self
                .metadata
                .delete_many(chunk.to_vec())
                .await
                .err_tip(|| "While deleting entry batch")?;
            for handle in handles {
                in_flight.push(handle).await;
            }

            if !bulk_names.is_empty() {
                self.bulk.delete(&bulk_names).await;
            }
        }
        in_flight.drain().await;
        Ok(())
    }
}

#[allow(dead_code)]
fn cutoff_for(retention_days: u32, today: NaiveDate) -> NaiveDate {
    today - ChronoDuration::days(retention_days as i64)
}

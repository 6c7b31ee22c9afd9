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

//! The metadata store (C2): a durable key to [`Entry`](crate::entry::Entry)
//! mapping with ancestor-scoped scans and async batch delete.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use cas_error::{Code, Error, ResultExt};
use chrono::NaiveDate;
use futures::future::try_join_all;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::entry::Entry;

/// A filter passed to [`MetadataStore::scan`].
#[derive(Debug, Clone)]
pub enum ScanFilter {
    /// Every entry in `namespace`.
    Namespace { namespace: String },
    /// Entries in `namespace` whose `last_access` is strictly before `cutoff`.
    LastAccessBefore { namespace: String, cutoff: NaiveDate },
    /// Every entry in every namespace (used by obliteration only).
    All,
}

/// Durable key→entry mapping. All methods are safe to call concurrently;
/// [`MetadataStore::insert_if_absent`] is the only operation required to be
/// linearizable per key.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, namespace: &str, digest: &str) -> Result<Option<Entry>, Error>;

    /// Issues `digests.len()` lookups concurrently; the returned bitmap
    /// preserves input order.
    async fn exists_batch(&self, namespace: &str, digests: &[String]) -> Result<Vec<bool>, Error> {
        let checks = digests
            .iter()
            .map(|digest| self.get(namespace, digest))
            .collect::<Vec<_>>();
        let results = try_join_all(checks).await.err_tip(|| "While batch-checking existence")?;
        Ok(results.into_iter().map(|e| e.is_some()).collect())
    }

    /// Inserts `entry` iff no entry exists yet for its `(namespace, digest)`
    /// key. Returns `true` if the insert happened.
    async fn insert_if_absent(&self, entry: Entry) -> Result<bool, Error>;

    /// Updates the mutable fields (`expanded_size`, `last_access`) of an
    /// existing entry. No-op (but not an error) if the entry is gone.
    async fn update(&self, namespace: &str, digest: &str, f: EntryUpdate) -> Result<(), Error>;

    /// Deletes `keys` asynchronously, returning a handle per key the caller
    /// may await. Deleting a key that doesn't exist is not an error.
    async fn delete_many(
        &self,
        keys: Vec<(String, String)>,
    ) -> Result<Vec<JoinHandle<Result<(), Error>>>, Error>;

    /// Returns every key matching `filter`, namespace-sorted and
    /// digest-sorted so cleanup passes are deterministic in tests.
    async fn scan(&self, filter: ScanFilter) -> Result<Vec<(String, String)>, Error>;

    /// All namespace names known to the store, e.g. for the testing-eviction
    /// pass over `is_testing` namespaces.
    async fn list_namespaces(&self) -> Result<Vec<String>, Error>;

    /// Deletes the namespace row itself. Only legal once the namespace holds
    /// no entries; callers are responsible for that precondition.
    async fn delete_namespace(&self, namespace: &str) -> Result<(), Error>;
}

/// The mutation an [`MetadataStore::update`] call is allowed to make.
#[derive(Debug, Clone, Copy)]
pub enum EntryUpdate {
    SetExpandedSize(i64),
    BumpLastAccess(NaiveDate),
}

#[derive(Default, Clone)]
struct NamespaceRow {
    is_testing: bool,
    entries: BTreeMap<String, Entry>,
}

/// The only `MetadataStore` implementation this service ships: an
/// in-process map guarded by a `tokio::sync::RwLock`, sharded by namespace
/// so unrelated namespaces never contend on the same lock.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    namespaces: RwLock<BTreeMap<String, Arc<RwLock<NamespaceRow>>>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn namespace_row(&self, namespace: &str, is_testing: bool) -> Arc<RwLock<NamespaceRow>> {
        if let Some(row) = self.namespaces.read().await.get(namespace) {
            return row.clone();
        }
        let mut namespaces = self.namespaces.write().await;
        namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| {
                Arc::new(RwLock::new(NamespaceRow {
                    is_testing,
                    entries: BTreeMap::new(),
                }))
            })
            .clone()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, namespace: &str, digest: &str) -> Result<Option<Entry>, Error> {
        let Some(row) = self.namespaces.read().await.get(namespace).cloned() else {
            return Ok(None);
        };
        Ok(row.read().await.entries.get(digest).cloned())
    }

    async fn insert_if_absent(&self, entry: Entry) -> Result<bool, Error> {
        let row = self.namespace_row(&entry.namespace, entry.namespace.starts_with("temporary")).await;
        let mut row = row.write().await;
        if row.entries.contains_key(&entry.digest) {
            return Ok(false);
        }
        row.entries.insert(entry.digest.clone(), entry);
        Ok(true)
    }

    async fn update(&self, namespace: &str, digest: &str, update: EntryUpdate) -> Result<(), Error> {
        let Some(row) = self.namespaces.read().await.get(namespace).cloned() else {
            return Ok(());
        };
        let mut row = row.write().await;
        let Some(entry) = row.entries.get_mut(digest) else {
            return Ok(());
        };
        match update {
            EntryUpdate::SetExpandedSize(size) => entry.expanded_size = size,
            EntryUpdate::BumpLastAccess(day) => {
                if day > entry.last_access {
                    entry.last_access = day;
                }
            }
        }
        Ok(())
    }

    async fn delete_many(
        &self,
        keys: Vec<(String, String)>,
    ) -> Result<Vec<JoinHandle<Result<(), Error>>>, Error> {
        let mut handles = Vec::with_capacity(keys.len());
        for (namespace, digest) in keys {
            let Some(row) = self.namespaces.read().await.get(&namespace).cloned() else {
                handles.push(tokio::spawn(async { Ok(()) }));
                continue;
            };
            handles.push(tokio::spawn(async move {
                row.write().await.entries.remove(&digest);
                Ok(())
            }));
        }
        Ok(handles)
    }

    async fn scan(&self, filter: ScanFilter) -> Result<Vec<(String, String)>, Error> {
        match filter {
            ScanFilter::Namespace { namespace } => {
                let Some(row) = self.namespaces.read().await.get(&namespace).cloned() else {
                    return Ok(Vec::new());
                };
                Ok(row
                    .read()
                    .await
                    .entries
                    .keys()
                    .map(|digest| (namespace.clone(), digest.clone()))
                    .collect())
            }
            ScanFilter::LastAccessBefore { namespace, cutoff } => {
                let Some(row) = self.namespaces.read().await.get(&namespace).cloned() else {
                    return Ok(Vec::new());
                };
                Ok(row
                    .read()
                    .await
                    .entries
                    .values()
                    .filter(|e| e.last_access < cutoff)
                    .map(|e| (namespace.clone(), e.digest.clone()))
                    .collect())
            }
            ScanFilter::All => {
                let namespaces = self.namespaces.read().await.clone();
                let mut keys = Vec::new();
                for (name, row) in namespaces {
                    for digest in row.read().await.entries.keys() {
                        keys.push((name.clone(), digest.clone()));
                    }
                }
                Ok(keys)
            }
        }
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, Error> {
        Ok(self.namespaces.read().await.keys().cloned().collect())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), Error> {
        let is_empty = match self.namespaces.read().await.get(namespace) {
            Some(row) => row.read().await.entries.is_empty(),
            None => true,
        };
        if !is_empty {
            return Err(cas_error::make_err!(
                Code::Internal,
                "Refusing to delete non-empty namespace '{namespace}'"
            ));
        }
        self.namespaces.write().await.remove(namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Placement;
    use pretty_assertions::assert_eq;

    fn entry(namespace: &str, digest: &str, day: NaiveDate) -> Entry {
        Entry {
            namespace: namespace.to_string(),
            digest: digest.to_string(),
            placement: Placement::Inline,
            inline_bytes: Some(b"x".to_vec()),
            bulk_name: None,
            size: 1,
            expanded_size: 1,
            is_high_priority: false,
            last_access: day,
            created_at: day,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn insert_if_absent_is_linearizable_per_key() {
        let store = InMemoryMetadataStore::new();
        let d = day(2024, 1, 1);
        assert!(store.insert_if_absent(entry("ns", "aa", d)).await.unwrap());
        assert!(!store.insert_if_absent(entry("ns", "aa", d)).await.unwrap());
    }

    #[tokio::test]
    async fn exists_batch_preserves_order() {
        let store = InMemoryMetadataStore::new();
        let d = day(2024, 1, 1);
        store.insert_if_absent(entry("ns", "aa", d)).await.unwrap();
        store.insert_if_absent(entry("ns", "cc", d)).await.unwrap();
        let results = store
            .exists_batch("ns", &["aa".to_string(), "bb".to_string(), "cc".to_string()])
            .await
            .unwrap();
        assert_eq!(results, vec![true, false, true]);
    }

    #[tokio::test]
    async fn update_bumps_last_access_monotonically() {
        let store = InMemoryMetadataStore::new();
        store.insert_if_absent(entry("ns", "aa", day(2024, 1, 1))).await.unwrap();
        store
            .update("ns", "aa", EntryUpdate::BumpLastAccess(day(2024, 1, 5)))
            .await
            .unwrap();
        assert_eq!(store.get("ns", "aa").await.unwrap().unwrap().last_access, day(2024, 1, 5));
        // An older date must never move last_access backwards.
        store
            .update("ns", "aa", EntryUpdate::BumpLastAccess(day(2024, 1, 2)))
            .await
            .unwrap();
        assert_eq!(store.get("ns", "aa").await.unwrap().unwrap().last_access, day(2024, 1, 5));
    }

    #[tokio::test]
    async fn delete_many_removes_entries_via_handles() {
        let store = InMemoryMetadataStore::new();
        store.insert_if_absent(entry("ns", "aa", day(2024, 1, 1))).await.unwrap();
        let handles = store.delete_many(vec![("ns".to_string(), "aa".to_string())]).await.unwrap();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert!(store.get("ns", "aa").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scan_last_access_before_filters_correctly() {
        let store = InMemoryMetadataStore::new();
        store.insert_if_absent(entry("ns", "old", day(2024, 1, 1))).await.unwrap();
        store.insert_if_absent(entry("ns", "new", day(2024, 6, 1))).await.unwrap();
        let keys = store
            .scan(ScanFilter::LastAccessBefore {
                namespace: "ns".to_string(),
                cutoff: day(2024, 3, 1),
            })
            .await
            .unwrap();
        assert_eq!(keys, vec![("ns".to_string(), "old".to_string())]);
    }

    #[tokio::test]
    async fn delete_namespace_refuses_when_not_empty() {
        let store = InMemoryMetadataStore::new();
        store.insert_if_absent(entry("ns", "aa", day(2024, 1, 1))).await.unwrap();
        assert!(store.delete_namespace("ns").await.is_err());
    }
}

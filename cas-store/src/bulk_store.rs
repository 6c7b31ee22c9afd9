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

//! The bulk object store (C3): byte-stream storage for blobs that exceed
//! [`crate::entry::MIN_SIZE_FOR_BULK`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cas_error::{Code, Error, ResultExt};
use cas_util::buf_channel::{buf_channel_from_bytes, DropCloserReadHalf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;

/// Byte-stream storage for large blobs. Implementations must make `put`
/// immediately visible to `open_read`/`delete`/`list` (read-your-writes
/// within the bulk store itself; cross-component staleness is handled
/// above this trait).
#[async_trait]
pub trait BulkStore: Send + Sync {
    /// Issues a time-limited URL a client can POST bytes to. The bulk store
    /// invokes `callback_url` once the upload completes.
    async fn issue_upload_url(
        &self,
        namespace: &str,
        digest: &str,
        callback_url: &str,
    ) -> Result<String, Error>;

    /// Direct server-side write, returning the chosen stable `bulk_name`.
    async fn put(&self, namespace: &str, digest: &str, bytes: &[u8]) -> Result<String, Error>;

    /// Opens a streaming reader over `bulk_name`.
    async fn open_read(&self, bulk_name: &str) -> Result<DropCloserReadHalf, Error>;

    /// Best-effort bulk delete. Failures are logged, not retried inline.
    async fn delete(&self, bulk_names: &[String]);

    /// Lists every `bulk_name` under `prefix`. Used only by obliteration and
    /// the orphan sweep.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, Error>;
}

/// In-process bulk store backed by a hashmap. Nothing survives a restart;
/// intended for tests and single-node deployments.
#[derive(Default)]
pub struct MemoryBulkStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    next_id: AtomicU64,
}

impl MemoryBulkStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bulk_name_for(&self, namespace: &str, digest: &str) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{namespace}/{digest}-{id:x}")
    }
}

#[async_trait]
impl BulkStore for MemoryBulkStore {
    async fn issue_upload_url(
        &self,
        namespace: &str,
        digest: &str,
        callback_url: &str,
    ) -> Result<String, Error> {
        // There is no real blobstore to hand out a pre-signed URL for in the
        // in-memory backend, so the "URL" is just the callback URL the
        // caller will immediately POST to; this keeps the contract uniform
        // across backends for tests that exercise the full upload flow.
        Ok(callback_url.to_string())
    }

    async fn put(&self, namespace: &str, digest: &str, bytes: &[u8]) -> Result<String, Error> {
        let bulk_name = self.bulk_name_for(namespace, digest);
        self.objects.write().await.insert(bulk_name.clone(), bytes.to_vec());
        Ok(bulk_name)
    }

    async fn open_read(&self, bulk_name: &str) -> Result<DropCloserReadHalf, Error> {
        let data = self
            .objects
            .read()
            .await
            .get(bulk_name)
            .cloned()
            .err_tip(|| format!("Bulk object '{bulk_name}' not found"))?;
        buf_channel_from_bytes(data.into()).await
    }

    async fn delete(&self, bulk_names: &[String]) {
        let mut objects = self.objects.write().await;
        for name in bulk_names {
            objects.remove(name);
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Bulk store backed by the local filesystem, one file per `bulk_name`,
/// using a temp-then-rename discipline so a crash mid-write never leaves a
/// partially-written object visible to readers.
pub struct FilesystemBulkStore {
    content_path: PathBuf,
    temp_path: PathBuf,
    next_id: AtomicU64,
}

impl FilesystemBulkStore {
    pub fn new(content_path: &str, temp_path: &str) -> Self {
        FilesystemBulkStore {
            content_path: PathBuf::from(shellexpand::full(content_path).unwrap_or_default().to_string()),
            temp_path: PathBuf::from(shellexpand::full(temp_path).unwrap_or_default().to_string()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Splits a `"{namespace}/{filename}"` bulk_name into its on-disk path,
    /// one real subdirectory per namespace rather than flattening the slash
    /// into the filename — `list` below depends on this being reversible.
    fn path_for(&self, bulk_name: &str) -> PathBuf {
        self.content_path.join(bulk_name)
    }
}

#[async_trait]
impl BulkStore for FilesystemBulkStore {
    async fn issue_upload_url(
        &self,
        _namespace: &str,
        _digest: &str,
        callback_url: &str,
    ) -> Result<String, Error> {
        Ok(callback_url.to_string())
    }

    async fn put(&self, namespace: &str, digest: &str, bytes: &[u8]) -> Result<String, Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let bulk_name = format!("{namespace}/{digest}-{id:x}");
        let dest = self.path_for(&bulk_name);
        tokio::fs::create_dir_all(&self.temp_path).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_file = self.temp_path.join(format!("{id:x}.tmp"));
        let mut f = tokio::fs::File::create(&tmp_file).await?;
        f.write_all(bytes).await?;
        f.flush().await?;
        drop(f);
        tokio::fs::rename(&tmp_file, &dest).await?;
        Ok(bulk_name)
    }

    async fn open_read(&self, bulk_name: &str) -> Result<DropCloserReadHalf, Error> {
        let path = self.path_for(bulk_name);
        let mut f = tokio::fs::File::open(&path)
            .await
            .err_tip(|| format!("Bulk object '{bulk_name}' not found on disk"))?;
        let mut data = Vec::new();
        f.read_to_end(&mut data).await?;
        buf_channel_from_bytes(data.into()).await
    }

    async fn delete(&self, bulk_names: &[String]) {
        for name in bulk_names {
            if let Err(err) = tokio::fs::remove_file(self.path_for(name)).await {
                tracing::warn!(bulk_name = %name, %err, "Failed to delete bulk object");
            }
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let mut out = Vec::new();
        let mut namespaces = match tokio::fs::read_dir(&self.content_path).await {
            Ok(dir) => dir,
            Err(_) => return Ok(out),
        };
        while let Some(ns_entry) = namespaces.next_entry().await.map_err(Error::from)? {
            if !ns_entry.file_type().await.map_err(Error::from)?.is_dir() {
                continue;
            }
            let Some(namespace) = ns_entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let mut files = tokio::fs::read_dir(ns_entry.path()).await.map_err(Error::from)?;
            while let Some(file_entry) = files.next_entry().await.map_err(Error::from)? {
                let Some(filename) = file_entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let bulk_name = format!("{namespace}/{filename}");
                if bulk_name.starts_with(prefix) {
                    out.push(bulk_name);
                }
            }
        }
        Ok(out)
    }
}

/// Type-erased handle used by the store engine so C5-C8 don't need to be
/// generic over the concrete bulk backend.
pub type SharedBulkStore = Arc<dyn BulkStore>;

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

//! Placement & ingest (C5): the inline-store path and the bulk-upload
//! callback path.

use std::io::Read;

use cas_error::{Code, Error, ResultExt};
use cas_util::digest::{self, Compression, Namespace};
use chrono::Utc;
use flate2::read::ZlibDecoder;

use crate::engine::CasEngine;
use crate::entry::{Entry, Placement, MIN_SIZE_FOR_BULK, UNVERIFIED};
use crate::scheduler::Task;

/// Outcome of a store call. `Duplicate` is a success from the client's
/// point of view (§7: `duplicate` never surfaces as an error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    Duplicate,
}

/// Decompresses `raw` through `ns`'s compression setting while hashing it,
/// returning `(expanded_len, computed_hex_digest)`. A decompression failure
/// is surfaced as `corrupt_payload` (`InvalidArgument`).
pub(crate) fn hash_payload(ns: &Namespace, raw: &[u8]) -> Result<(usize, String), Error> {
    let mut hasher = digest::hash_for(ns);
    let expanded_len = match ns.compression {
        Compression::None => {
            hasher.update(raw);
            raw.len()
        }
        Compression::Zlib => {
            let mut decoder = ZlibDecoder::new(raw);
            let mut buf = [0u8; 8192];
            let mut total = 0usize;
            loop {
                let n = decoder
                    .read(&mut buf)
                    .map_err(|e| cas_error::make_err!(Code::InvalidArgument, "corrupt_payload: {e}"))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                total += n;
            }
            total
        }
    };
    Ok((expanded_len, hasher.finalize_hex()))
}

impl CasEngine {
    /// Handles `POST /content/store/<ns>/<hex>`: a single-request store of
    /// bytes that are either kept inline or, if they exceed
    /// `MIN_SIZE_FOR_BULK`, written straight to the bulk store. Either way
    /// the digest is verified synchronously, so no verification task is
    /// ever scheduled for this path.
    pub async fn store_inline(
        &self,
        namespace: &str,
        hex_digest: &str,
        bytes: Vec<u8>,
        priority: u32,
    ) -> Result<StoreOutcome, Error> {
        let ns = digest::parse_and_validate(namespace, hex_digest).err_tip(|| "While validating store request")?;

        let today = Utc::now().date_naive();
        let is_high_priority = priority == 0;
        let size = bytes.len() as u64;

        // Placement only depends on the declared size, so it (and, for the
        // bulk case, the object write) can happen before the payload is
        // hashed at all. The entry goes in with expanded_size=UNVERIFIED; a
        // racing duplicate request is turned away by insert_if_absent below
        // without ever touching the hasher.
        let (placement, inline_bytes, bulk_name) = if bytes.len() < MIN_SIZE_FOR_BULK {
            (Placement::Inline, Some(bytes.clone()), None)
        } else {
            let bulk_name = self
                .bulk
                .put(&ns.name, hex_digest, &bytes)
                .await
                .map_err(|e| e.append("bulk_put_failed"))
                .err_tip_with_code(|_| (Code::Unavailable, "While writing to bulk store"))?;
            (Placement::Bulk, None, Some(bulk_name))
        };

        let entry = Entry {
            namespace: ns.name.clone(),
            digest: hex_digest.to_string(),
            placement,
            inline_bytes,
            bulk_name: bulk_name.clone(),
            size,
            expanded_size: UNVERIFIED,
            is_high_priority,
            last_access: today,
            created_at: today,
        };

        if !self
            .metadata
            .insert_if_absent(entry)
            .await
            .err_tip(|| "While inserting provisional entry")?
        {
            if let Some(bulk_name) = bulk_name {
                self.bulk.delete(&[bulk_name]).await;
            }
            return Ok(StoreOutcome::Duplicate);
        }

        let (expanded_len, computed_hex) = match hash_payload(&ns, &bytes) {
            Ok(v) => v,
            Err(err) => {
                self.discard_provisional_entry(&ns.name, hex_digest, bulk_name.as_deref()).await?;
                return Err(err);
            }
        };
        if computed_hex != hex_digest {
            self.discard_provisional_entry(&ns.name, hex_digest, bulk_name.as_deref()).await?;
            return Err(cas_error::make_err!(
                Code::InvalidArgument,
                "digest_mismatch: declared '{hex_digest}' computed '{computed_hex}'"
            ));
        }

        self.metadata
            .update(&ns.name, hex_digest, crate::metadata_store::EntryUpdate::SetExpandedSize(expanded_len as i64))
            .await
            .err_tip(|| "While finalizing verified entry")?;

        if is_high_priority && placement == Placement::Bulk && (expanded_len as u64) <= crate::entry::MAX_CACHED as u64 {
            self.cache.maybe_insert(&ns.name, hex_digest, &bytes, true);
        }

        Ok(StoreOutcome::Stored)
    }

    /// Removes a provisional entry (and its bulk object, if any) inserted by
    /// `store_inline` once hashing proves it was never going to be valid.
    async fn discard_provisional_entry(
        &self,
        namespace: &str,
        hex_digest: &str,
        bulk_name: Option<&str>,
    ) -> Result<(), Error> {
        let handles = self
            .metadata
            .delete_many(vec![(namespace.to_string(), hex_digest.to_string())])
            .await
            .err_tip(|| "While discarding provisional entry")?;
        for h in handles {
            let _ = h.await;
        }
        if let Some(bulk_name) = bulk_name {
            self.bulk.delete(&[bulk_name.to_string()]).await;
        }
        self.cache.remove(namespace, hex_digest);
        Ok(())
    }

    /// Handles `POST /content/generate_blobstore_url/<ns>/<hex>`: issues an
    /// upload URL the client POSTs bytes to directly.
    pub async fn generate_upload_url(
        &self,
        namespace: &str,
        hex_digest: &str,
        callback_url: &str,
    ) -> Result<String, Error> {
        let ns = digest::parse_and_validate(namespace, hex_digest).err_tip(|| "While validating upload request")?;
        self.bulk
            .issue_upload_url(&ns.name, hex_digest, callback_url)
            .await
            .err_tip(|| "While issuing upload URL")
    }

    /// Handles `POST /restricted/content/store_blobstore/<ns>/<hex>/<id>`:
    /// the bulk store's callback once the client's direct upload lands.
    /// The bytes are already sitting in the bulk store under `bulk_name`;
    /// this only needs to record the (unverified) entry and schedule C6.
    pub async fn store_blobstore_callback(
        &self,
        namespace: &str,
        hex_digest: &str,
        bulk_name: String,
        size: u64,
        is_high_priority: bool,
    ) -> Result<StoreOutcome, Error> {
        let ns = digest::parse_and_validate(namespace, hex_digest).err_tip(|| "While validating blobstore callback")?;

        if !bulk_name.starts_with(&format!("{}/", ns.name)) {
            self.bulk.delete(&[bulk_name]).await;
            return Err(cas_error::make_err!(
                Code::InvalidArgument,
                "Uploaded object path does not match namespace '{}'",
                ns.name
            ));
        }

        let today = Utc::now().date_naive();
        let entry = Entry {
            namespace: ns.name.clone(),
            digest: hex_digest.to_string(),
            placement: Placement::Bulk,
            inline_bytes: None,
            bulk_name: Some(bulk_name.clone()),
            size,
            expanded_size: UNVERIFIED,
            is_high_priority,
            last_access: today,
            created_at: today,
        };

        if !self
            .metadata
            .insert_if_absent(entry)
            .await
            .err_tip(|| "While inserting unverified entry")?
        {
            self.bulk.delete(&[bulk_name]).await;
            return Ok(StoreOutcome::Duplicate);
        }

        if let Err(enqueue_err) = self
            .scheduler
            .enqueue(Task::Verify { namespace: ns.name.clone(), digest: hex_digest.to_string() })
            .await
        {
            tracing::error!(namespace = %ns.name, digest = %hex_digest, %enqueue_err, "enqueue_failed");
            let handles = self
                .metadata
                .delete_many(vec![(ns.name.clone(), hex_digest.to_string())])
                .await
                .err_tip(|| "While rolling back entry after enqueue failure")?;
            for h in handles {
                let _ = h.await;
            }
            self.bulk.delete(&[bulk_name]).await;
            return Err(cas_error::make_err!(
                Code::Internal,
                "enqueue_failed: could not schedule verification"
            ));
        }

        Ok(StoreOutcome::Stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk_store::MemoryBulkStore;
    use crate::metadata_store::InMemoryMetadataStore;
    use crate::read_cache::ReadCache;
    use crate::scheduler::RecordingTaskScheduler;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::sync::Arc;

    fn test_engine() -> (CasEngine, Arc<RecordingTaskScheduler>) {
        let scheduler = Arc::new(RecordingTaskScheduler::new());
        let engine = CasEngine::new(
            Arc::new(InMemoryMetadataStore::new()),
            Arc::new(MemoryBulkStore::new()),
            Arc::new(ReadCache::default()),
            scheduler.clone(),
            30,
        );
        (engine, scheduler)
    }

    #[tokio::test]
    async fn stores_small_payload_inline() {
        let (engine, _) = test_engine();
        let outcome = engine
            .store_inline("default", "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d", b"hello".to_vec(), 0)
            .await
            .unwrap();
        assert_eq!(outcome, StoreOutcome::Stored);
    }

    #[tokio::test]
    async fn rejects_mismatched_digest() {
        let (engine, _) = test_engine();
        let err = engine
            .store_inline("default", "0000000000000000000000000000000000000000", b"hello".to_vec(), 0)
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }

    #[tokio::test]
    async fn second_store_of_same_digest_is_duplicate() {
        let (engine, _) = test_engine();
        let digest = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
        let first = engine.store_inline("default", digest, b"hello".to_vec(), 0).await.unwrap();
        let second = engine.store_inline("default", digest, b"hello".to_vec(), 0).await.unwrap();
        assert_eq!(first, StoreOutcome::Stored);
        assert_eq!(second, StoreOutcome::Duplicate);
    }

    #[tokio::test]
    async fn duplicate_digest_with_mismatched_bytes_reports_duplicate_not_mismatch() {
        let (engine, _) = test_engine();
        let digest = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
        let first = engine.store_inline("default", digest, b"hello".to_vec(), 0).await.unwrap();
        assert_eq!(first, StoreOutcome::Stored);

        // A second request racing the same digest with bytes that don't
        // actually hash to it must short-circuit on the duplicate check
        // before the hash is ever computed.
        let second = engine.store_inline("default", digest, b"not-hello-at-all".to_vec(), 0).await.unwrap();
        assert_eq!(second, StoreOutcome::Duplicate);
    }

    #[tokio::test]
    async fn large_payload_routes_through_bulk_store() {
        let (engine, _) = test_engine();
        let bytes = vec![b'x'; 1024];
        let mut hasher = sha1::Sha1::new();
        use sha1::Digest;
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());
        let outcome = engine.store_inline("default", &digest, bytes, 0).await.unwrap();
        assert_eq!(outcome, StoreOutcome::Stored);
        let stored = engine.metadata.get("default", &digest).await.unwrap().unwrap();
        assert_eq!(stored.placement, Placement::Bulk);
        assert_eq!(stored.expanded_size, 1024);
    }

    #[tokio::test]
    async fn compressed_namespace_hashes_uncompressed_content() {
        let (engine, _) = test_engine();
        let plain = vec![b'y'; 2000];
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&plain).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut hasher = sha1::Sha1::new();
        use sha1::Digest;
        hasher.update(&plain);
        let digest = hex::encode(hasher.finalize());

        let outcome = engine
            .store_inline("default-deflate", &digest, compressed, 0)
            .await
            .unwrap();
        assert_eq!(outcome, StoreOutcome::Stored);
        let stored = engine.metadata.get("default-deflate", &digest).await.unwrap().unwrap();
        assert_eq!(stored.expanded_size, 2000);
    }

    #[tokio::test]
    async fn blobstore_callback_schedules_verification() {
        let (engine, scheduler) = test_engine();
        let bulk_name = engine.bulk.put("default", "aa", b"payload").await.unwrap();
        let outcome = engine
            .store_blobstore_callback("default", "aa", bulk_name, 7, false)
            .await
            .unwrap();
        assert_eq!(outcome, StoreOutcome::Stored);
        assert_eq!(scheduler.drain().len(), 1);
    }

    #[tokio::test]
    async fn blobstore_callback_rejects_namespace_mismatch() {
        let (engine, _) = test_engine();
        let bulk_name = engine.bulk.put("other", "aa", b"payload").await.unwrap();
        let err = engine
            .store_blobstore_callback("default", "aa", bulk_name, 7, false)
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }
}

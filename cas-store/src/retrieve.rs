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

//! `GET /content/retrieve/<ns>/<hex>`: consults the read cache, then the
//! metadata/bulk stores. Always serves the bytes exactly as stored — for a
//! compressed namespace that means the compressed stream, never the
//! expanded content (§8 property 2).

use cas_error::{Code, Error, ResultExt};
use cas_util::digest::Namespace;

use crate::engine::CasEngine;
use crate::entry::{Placement, MAX_CACHED};
use crate::ingest::hash_payload;
use crate::metadata_store::EntryUpdate;

impl CasEngine {
    pub async fn retrieve(&self, namespace: &str, hex_digest: &str) -> Result<Vec<u8>, Error> {
        if let Some(cached) = self.cache.get(namespace, hex_digest) {
            return Ok(cached);
        }

        let ns = Namespace::parse(namespace).err_tip(|| "While validating retrieve request")?;

        let entry = self
            .metadata
            .get(namespace, hex_digest)
            .await
            .err_tip(|| "While loading entry")?
            .err_tip_with_code(|_| (Code::NotFound, format!("No entry for digest '{hex_digest}'")))?;

        match entry.placement {
            Placement::Inline => entry
                .inline_bytes
                .err_tip_with_code(|_| (Code::Internal, "Inline entry is missing its bytes")),
            Placement::Bulk => {
                let bulk_name = entry
                    .bulk_name
                    .clone()
                    .err_tip_with_code(|_| (Code::Internal, "Bulk entry is missing its bulk_name"))?;
                let mut reader = self.bulk.open_read(&bulk_name).await.err_tip(|| "While opening bulk object")?;
                let raw = reader.collect_all().await.err_tip(|| "While reading bulk object")?;

                if !entry.is_verified() {
                    let (expanded_len, computed_hex) = hash_payload(&ns, &raw)?;
                    if computed_hex != hex_digest {
                        self.discard_entry(namespace, hex_digest, &bulk_name).await?;
                        return Err(cas_error::make_err!(
                            Code::NotFound,
                            "Entry failed verification on read and was discarded"
                        ));
                    }
                    self.metadata
                        .update(namespace, hex_digest, EntryUpdate::SetExpandedSize(expanded_len as i64))
                        .await
                        .err_tip(|| "While persisting on-read verification result")?;
                }

                if entry.is_high_priority && raw.len() <= MAX_CACHED {
                    self.cache.maybe_insert(namespace, hex_digest, &raw, true);
                }

                Ok(raw)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk_store::MemoryBulkStore;
    use crate::entry::{Entry, UNVERIFIED};
    use crate::metadata_store::InMemoryMetadataStore;
    use crate::read_cache::ReadCache;
    use crate::scheduler::RecordingTaskScheduler;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn test_engine() -> CasEngine {
        CasEngine::new(
            Arc::new(InMemoryMetadataStore::new()),
            Arc::new(MemoryBulkStore::new()),
            Arc::new(ReadCache::default()),
            Arc::new(RecordingTaskScheduler::new()),
            30,
        )
    }

    #[tokio::test]
    async fn retrieves_inline_entry_verbatim() {
        let engine = test_engine();
        let digest = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
        engine.store_inline("default", digest, b"hello".to_vec(), 0).await.unwrap();
        let bytes = engine.retrieve("default", digest).await.unwrap();
        assert_eq!(bytes, b"hello".to_vec());
    }

    #[tokio::test]
    async fn retrieve_of_unknown_digest_is_not_found() {
        let engine = test_engine();
        let err = engine.retrieve("default", &"0".repeat(40)).await.unwrap_err();
        assert_eq!(err.code, Code::NotFound);
    }

    #[tokio::test]
    async fn retrieve_verifies_unverified_bulk_entry_on_demand() {
        let engine = test_engine();
        let bytes = vec![b'x'; 1024];
        let mut hasher = sha1::Sha1::new();
        use sha1::Digest;
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());
        let bulk_name = engine.bulk.put("default", &digest, &bytes).await.unwrap();
        let today = Utc::now().date_naive();
        engine
            .metadata
            .insert_if_absent(Entry {
                namespace: "default".into(),
                digest: digest.clone(),
                placement: Placement::Bulk,
                inline_bytes: None,
                bulk_name: Some(bulk_name),
                size: bytes.len() as u64,
                expanded_size: UNVERIFIED,
                is_high_priority: false,
                last_access: today,
                created_at: today,
            })
            .await
            .unwrap();

        let retrieved = engine.retrieve("default", &digest).await.unwrap();
        assert_eq!(retrieved, bytes);
        let entry = engine.metadata.get("default", &digest).await.unwrap().unwrap();
        assert_eq!(entry.expanded_size, 1024);
    }
}

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

//! Presence check & tag pipeline (C7): a batched `contains` query followed
//! by an asynchronous last-access bump for every hit.

use cas_error::{Code, Error, ResultExt};
use cas_util::digest::{self, Namespace};
use chrono::{NaiveDate, Utc};

use crate::engine::CasEngine;
use crate::entry::MAX_KEYS_PER_CALL;
use crate::metadata_store::EntryUpdate;
use crate::scheduler::Task;

impl CasEngine {
    /// Handles `POST /content/contains/<ns>`. `raw_digests` is the
    /// concatenation of `N` raw (non-hex) digest byte strings; returns an
    /// `N`-byte response where each byte is `1` if present, else `0`, and
    /// asynchronously enqueues a tag task for the hits.
    pub async fn contains(&self, namespace: &str, raw_digests: &[u8]) -> Result<Vec<u8>, Error> {
        let ns = Namespace::parse(namespace).err_tip(|| "While validating contains request")?;
        let digest_size = digest::digest_size_bytes(&ns);

        if digest_size == 0 || raw_digests.len() % digest_size != 0 {
            return Err(cas_error::make_err!(
                Code::InvalidArgument,
                "contains payload length {} is not a multiple of digest size {digest_size}",
                raw_digests.len()
            ));
        }
        let n = raw_digests.len() / digest_size;
        if n > MAX_KEYS_PER_CALL {
            return Err(cas_error::make_err!(
                Code::InvalidArgument,
                "contains request has {n} keys, exceeding the limit of {MAX_KEYS_PER_CALL}"
            ));
        }

        let hex_digests: Vec<String> = raw_digests.chunks(digest_size).map(hex::encode).collect();
        let present = self
            .metadata
            .exists_batch(&ns.name, &hex_digests)
            .await
            .err_tip(|| "While batch-checking presence")?;

        let response: Vec<u8> = present.iter().map(|&p| if p { 1 } else { 0 }).collect();

        let hit_digests: Vec<String> = hex_digests
            .into_iter()
            .zip(present.iter())
            .filter_map(|(digest, &present)| present.then_some(digest))
            .collect();

        if !hit_digests.is_empty() {
            let today = Utc::now().date_naive();
            if let Err(err) = self
                .scheduler
                .enqueue(Task::Tag { namespace: ns.name.clone(), day: today, digests: hit_digests })
                .await
            {
                // Presence correctness isn't at stake if the tag task never
                // runs, so this is logged rather than surfaced to the caller.
                tracing::warn!(namespace = %ns.name, %err, "Failed to enqueue tag task");
            }
        }

        Ok(response)
    }

    /// Runs a tag task: bumps `last_access` to `day` for every digest in
    /// `digests` that doesn't already carry it.
    pub async fn run_tag_task(&self, namespace: &str, day: NaiveDate, digests: &[String]) -> Result<(), Error> {
        for digest in digests {
            self.metadata
                .update(namespace, digest, EntryUpdate::BumpLastAccess(day))
                .await
                .err_tip(|| format!("While tagging digest '{digest}'"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk_store::MemoryBulkStore;
    use crate::entry::{Entry, Placement};
    use crate::metadata_store::InMemoryMetadataStore;
    use crate::read_cache::ReadCache;
    use crate::scheduler::{RecordingTaskScheduler, Task};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(namespace: &str, digest: &str, last_access: NaiveDate) -> Entry {
        Entry {
            namespace: namespace.to_string(),
            digest: digest.to_string(),
            placement: Placement::Inline,
            inline_bytes: Some(b"x".to_vec()),
            bulk_name: None,
            size: 1,
            expanded_size: 1,
            is_high_priority: false,
            last_access,
            created_at: last_access,
        }
    }

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
    async fn contains_reports_hits_in_input_order_and_tags_only_hits() {
        let (engine, scheduler) = test_engine();
        let d = day(2024, 1, 1);
        let digest_a = "aa".repeat(10);
        let digest_c = "cc".repeat(10);
        engine.metadata.insert_if_absent(entry("ns", &digest_a, d)).await.unwrap();
        engine.metadata.insert_if_absent(entry("ns", &digest_c, d)).await.unwrap();

        let digest_b = "bb".repeat(10);
        let mut raw = Vec::new();
        raw.extend(hex::decode(&digest_a).unwrap());
        raw.extend(hex::decode(&digest_b).unwrap());
        raw.extend(hex::decode(&digest_c).unwrap());

        let response = engine.contains("ns", &raw).await.unwrap();
        assert_eq!(response, vec![1, 0, 1]);

        let tasks = scheduler.drain();
        assert_eq!(tasks.len(), 1);
        match &tasks[0] {
            Task::Tag { digests, .. } => assert_eq!(digests, &vec![digest_a, digest_c]),
            other => panic!("expected Tag task, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn contains_rejects_misaligned_payload() {
        let (engine, _) = test_engine();
        assert!(engine.contains("ns", &[0u8; 7]).await.is_err());
    }

    #[tokio::test]
    async fn contains_rejects_too_many_keys() {
        let (engine, _) = test_engine();
        let raw = vec![0u8; 20 * (MAX_KEYS_PER_CALL + 1)];
        assert!(engine.contains("ns", &raw).await.is_err());
    }

    #[tokio::test]
    async fn tag_task_bumps_last_access_monotonically() {
        let (engine, _) = test_engine();
        let digest = "aa".repeat(10);
        engine.metadata.insert_if_absent(entry("ns", &digest, day(2024, 1, 1))).await.unwrap();
        engine.run_tag_task("ns", day(2024, 6, 1), &[digest.clone()]).await.unwrap();
        let updated = engine.metadata.get("ns", &digest).await.unwrap().unwrap();
        assert_eq!(updated.last_access, day(2024, 6, 1));
    }
}

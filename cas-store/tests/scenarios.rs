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

//! End-to-end exercises of the concrete scenarios A-F.

use std::io::Write;
use std::sync::Arc;

use cas_store::{CasEngine, InMemoryMetadataStore, MemoryBulkStore, ReadCache, RecordingTaskScheduler, StoreOutcome};
use pretty_assertions::assert_eq;
use sha1::Digest;

fn build_engine(retention_days: u32) -> CasEngine {
    CasEngine::new(
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(MemoryBulkStore::new()),
        Arc::new(ReadCache::default()),
        Arc::new(RecordingTaskScheduler::new()),
        retention_days,
    )
}

fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = sha1::Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// Scenario A: a 5-byte blob stores inline and retrieves verbatim.
#[tokio::test]
async fn scenario_a_small_blob_round_trips_inline() {
    let engine = build_engine(30);
    let digest = sha1_hex(b"hello");
    assert_eq!(digest, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");

    let outcome = engine.store_inline("default", &digest, b"hello".to_vec(), 0).await.unwrap();
    assert_eq!(outcome, StoreOutcome::Stored);

    let entry = engine.metadata().get("default", &digest).await.unwrap().unwrap();
    assert_eq!(entry.size, 5);
    assert_eq!(entry.expanded_size, 5);

    let retrieved = engine.retrieve("default", &digest).await.unwrap();
    assert_eq!(retrieved, b"hello".to_vec());
}

// Scenario B: a 1024-byte blob routes through bulk storage and ends up
// fully verified synchronously (no async verification task needed, since
// this ingest path already hashes the whole payload).
#[tokio::test]
async fn scenario_b_large_blob_verifies_through_bulk_path() {
    let engine = build_engine(30);
    let bytes = vec![b'x'; 1024];
    let digest = sha1_hex(&bytes);

    let outcome = engine.store_inline("default", &digest, bytes.clone(), 0).await.unwrap();
    assert_eq!(outcome, StoreOutcome::Stored);

    let entry = engine.metadata().get("default", &digest).await.unwrap().unwrap();
    assert_eq!(entry.expanded_size, 1024);

    let retrieved = engine.retrieve("default", &digest).await.unwrap();
    assert_eq!(retrieved, bytes);
}

// Scenario C: a compressed namespace stores the compressed stream and
// verification confirms the expanded length; retrieve serves the
// compressed stream back, not the expanded one.
#[tokio::test]
async fn scenario_c_compressed_namespace_confirms_expanded_size() {
    let engine = build_engine(30);
    let plain = vec![b'y'; 2000];
    let digest = sha1_hex(&plain);

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&plain).unwrap();
    let compressed = encoder.finish().unwrap();

    let outcome = engine.store_inline("default-deflate", &digest, compressed.clone(), 0).await.unwrap();
    assert_eq!(outcome, StoreOutcome::Stored);

    let entry = engine.metadata().get("default-deflate", &digest).await.unwrap().unwrap();
    assert_eq!(entry.expanded_size, 2000);

    let retrieved = engine.retrieve("default-deflate", &digest).await.unwrap();
    assert_eq!(retrieved, compressed);
}

// Scenario D: a one-bit-wrong declared digest is rejected, with no entry
// persisted and no bulk object leaked.
#[tokio::test]
async fn scenario_d_wrong_digest_is_rejected_without_leaking_state() {
    let engine = build_engine(30);
    let bytes = vec![b'x'; 1024];
    let correct_digest = sha1_hex(&bytes);
    let mut wrong_digest = correct_digest.clone();
    let flipped = if &wrong_digest[0..1] == "0" { '1' } else { '0' };
    wrong_digest.replace_range(0..1, &flipped.to_string());

    let err = engine.store_inline("default", &wrong_digest, bytes, 0).await.unwrap_err();
    assert_eq!(err.code, cas_error::Code::InvalidArgument);
    assert!(engine.metadata().get("default", &wrong_digest).await.unwrap().is_none());
    assert!(engine.metadata().get("default", &correct_digest).await.unwrap().is_none());
    assert!(engine.bulk().list("").await.unwrap().is_empty());
}

// Scenario E: contains() reports hits in input order and tags only the
// hits.
#[tokio::test]
async fn scenario_e_contains_reports_order_and_tags_hits() {
    let engine = build_engine(30);
    let digest_a = sha1_hex(b"first");
    let digest_c = sha1_hex(b"third");
    let digest_b = sha1_hex(b"never-stored");

    engine.store_inline("default", &digest_a, b"first".to_vec(), 0).await.unwrap();
    engine.store_inline("default", &digest_c, b"third".to_vec(), 0).await.unwrap();

    let mut raw = Vec::new();
    raw.extend(hex::decode(&digest_a).unwrap());
    raw.extend(hex::decode(&digest_b).unwrap());
    raw.extend(hex::decode(&digest_c).unwrap());

    let response = engine.contains("default", &raw).await.unwrap();
    assert_eq!(response, vec![1, 0, 1]);
}

// Scenario F: cleanup-old evicts only entries past the retention cutoff.
#[tokio::test]
async fn scenario_f_cleanup_old_respects_retention_cutoff() {
    let engine = build_engine(30);
    let old_bytes = vec![b'o'; 1024];
    let fresh_bytes = vec![b'f'; 1024];
    let old_digest = sha1_hex(&old_bytes);
    let fresh_digest = sha1_hex(&fresh_bytes);

    engine.store_inline("default", &old_digest, old_bytes, 0).await.unwrap();
    engine.store_inline("default", &fresh_digest, fresh_bytes, 0).await.unwrap();

    // last_access only ever moves forward through the public API, so
    // simulate 40 days of age by deleting and reinserting the entry with a
    // backdated last_access, exactly as a long-idle entry would look.
    let mut aged = engine.metadata().get("default", &old_digest).await.unwrap().unwrap();
    aged.last_access = chrono::Utc::now().date_naive() - chrono::Duration::days(40);
    let handles = engine
        .metadata()
        .delete_many(vec![("default".to_string(), old_digest.clone())])
        .await
        .unwrap();
    for h in handles {
        h.await.unwrap().unwrap();
    }
    engine.metadata().insert_if_absent(aged).await.unwrap();

    let found = engine.cleanup_old().await.unwrap();
    assert!(found);
    assert!(engine.metadata().get("default", &old_digest).await.unwrap().is_none());
    assert!(engine.metadata().get("default", &fresh_digest).await.unwrap().is_some());
}

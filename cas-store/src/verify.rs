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

//! The verification worker (C6): re-hashes a bulk entry to confirm the
//! digest it was stored under, asynchronously. Never retries itself —
//! either the entry is accepted or it is removed, per the `expanded_size
//! != -1` idempotence guard.

use std::io::Write;
use std::time::Duration;

use cas_error::{Error, ResultExt};
use cas_util::digest;
use flate2::write::ZlibDecoder as ZlibWriteDecoder;

use crate::engine::CasEngine;
use crate::entry::{Placement, MAX_CACHED, UNVERIFIED};
use crate::metadata_store::EntryUpdate;

/// How long a single verification pass may stream-read the bulk object for
/// before giving up and leaving the entry for a later sweep.
const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(300);

impl CasEngine {
    pub async fn verify(&self, namespace: &str, hex_digest: &str) -> Result<(), Error> {
        self.verify_with_timeout(namespace, hex_digest, DEFAULT_VERIFY_TIMEOUT).await
    }

    pub async fn verify_with_timeout(
        &self,
        namespace: &str,
        hex_digest: &str,
        timeout: Duration,
    ) -> Result<(), Error> {
        let Some(entry) = self
            .metadata
            .get(namespace, hex_digest)
            .await
            .err_tip(|| "While loading entry for verification")?
        else {
            tracing::info!(namespace, hex_digest, "Verification scheduled for entry that no longer exists");
            return Ok(());
        };

        if entry.expanded_size != UNVERIFIED {
            tracing::info!(namespace, hex_digest, "Verification skipped: entry already verified");
            return Ok(());
        }

        if entry.placement == Placement::Inline {
            tracing::error!(namespace, hex_digest, "Verification scheduled for an inline entry");
            return Ok(());
        }

        let Some(bulk_name) = entry.bulk_name.clone() else {
            tracing::error!(namespace, hex_digest, "Bulk entry has no bulk_name");
            return Ok(());
        };

        let ns = digest::Namespace::parse(namespace).err_tip(|| "While re-parsing namespace for verification")?;
        let capture = entry.is_high_priority && entry.size as usize <= MAX_CACHED;

        let result = tokio::time::timeout(timeout, self.verify_stream(&ns, &bulk_name, capture)).await;

        let stream_result = match result {
            Ok(inner) => inner,
            Err(_timeout_elapsed) => {
                tracing::warn!(namespace, hex_digest, "deadline_exceeded during verification; leaving unverified");
                return Ok(());
            }
        };

        let (computed_expanded_size, computed_hex, captured_bytes) = match stream_result {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(namespace, hex_digest, %err, "Verification stream error; discarding entry");
                self.discard_entry(namespace, hex_digest, &bulk_name).await?;
                return Ok(());
            }
        };

        if computed_hex != hex_digest {
            tracing::warn!(namespace, hex_digest, computed_hex, "digest_mismatch during verification; discarding entry");
            self.discard_entry(namespace, hex_digest, &bulk_name).await?;
            return Ok(());
        }

        self.metadata
            .update(namespace, hex_digest, EntryUpdate::SetExpandedSize(computed_expanded_size as i64))
            .await
            .err_tip(|| "While persisting verified expanded_size")?;

        if capture {
            if let Some(bytes) = captured_bytes {
                self.cache.maybe_insert(namespace, hex_digest, &bytes, true);
            }
        }

        Ok(())
    }

    pub(crate) async fn discard_entry(&self, namespace: &str, hex_digest: &str, bulk_name: &str) -> Result<(), Error> {
        let handles = self
            .metadata
            .delete_many(vec![(namespace.to_string(), hex_digest.to_string())])
            .await
            .err_tip(|| "While discarding unverifiable entry")?;
        for h in handles {
            let _ = h.await;
        }
        self.bulk.delete(&[bulk_name.to_string()]).await;
        self.cache.remove(namespace, hex_digest);
        Ok(())
    }

    /// Streams `bulk_name` through decompression (if `ns` is compressed)
    /// and the hasher, optionally capturing the expanded bytes for the read
    /// cache. Returns `(expanded_size, computed_hex_digest, captured_bytes)`.
    async fn verify_stream(
        &self,
        ns: &digest::Namespace,
        bulk_name: &str,
        capture: bool,
    ) -> Result<(usize, String, Option<Vec<u8>>), Error> {
        let mut reader = self.bulk.open_read(bulk_name).await.err_tip(|| "While opening bulk object")?;
        let mut hasher = digest::hash_for(ns);
        let mut expanded_len = 0usize;
        let mut captured = capture.then(Vec::new);

        match ns.compression {
            digest::Compression::None => {
                while let Some(chunk) = reader.recv().await.err_tip(|| "While streaming bulk object")? {
                    hasher.update(&chunk);
                    expanded_len += chunk.len();
                    if let Some(buf) = captured.as_mut() {
                        buf.extend_from_slice(&chunk);
                    }
                }
            }
            digest::Compression::Zlib => {
                let mut decoder = ZlibDecoderSink::new();
                while let Some(chunk) = reader.recv().await.err_tip(|| "While streaming bulk object")? {
                    let expanded_chunk = decoder
                        .push(&chunk)
                        .map_err(|e| cas_error::make_err!(cas_error::Code::Internal, "corrupt_payload: {e}"))?;
                    hasher.update(&expanded_chunk);
                    expanded_len += expanded_chunk.len();
                    // The cache serves retrieve responses verbatim, and
                    // retrieve must hand back the stored (compressed)
                    // stream (§8 property 2), so the cache captures the
                    // stored bytes, not the expanded copy used for hashing.
                    if let Some(buf) = captured.as_mut() {
                        buf.extend_from_slice(&chunk);
                    }
                }
            }
        }

        Ok((expanded_len, hasher.finalize_hex(), captured))
    }
}

/// Incremental zlib decoder used to feed a chunked stream through
/// decompression without buffering the whole (potentially large) object.
struct ZlibDecoderSink {
    decoder: ZlibWriteDecoder<Vec<u8>>,
}

impl ZlibDecoderSink {
    fn new() -> Self {
        ZlibDecoderSink { decoder: ZlibWriteDecoder::new(Vec::new()) }
    }

    fn push(&mut self, chunk: &[u8]) -> std::io::Result<Vec<u8>> {
        self.decoder.write_all(chunk)?;
        self.decoder.flush()?;
        let out = std::mem::take(self.decoder.get_mut());
        Ok(out)
    }
}

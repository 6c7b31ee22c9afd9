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

//! The read cache (C4): a process-wide LRU of small, high-priority blobs
//! keyed by `(namespace, digest)`. No negative caching, no durability
//! guarantee — a miss always falls through to C2/C3.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::entry::MAX_CACHED;

const DEFAULT_CAPACITY: usize = 4096;

pub struct ReadCache {
    map: Mutex<LruCache<(String, String), Vec<u8>>>,
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ReadCache {
    pub fn with_capacity(capacity: usize) -> Self {
        ReadCache {
            map: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
        }
    }

    /// Inserts `bytes` iff `is_high_priority` and `bytes.len() <= MAX_CACHED`,
    /// per §4.4. Returns whether the insert happened.
    pub fn maybe_insert(
        &self,
        namespace: &str,
        digest: &str,
        bytes: &[u8],
        is_high_priority: bool,
    ) -> bool {
        if !is_high_priority || bytes.len() > MAX_CACHED {
            return false;
        }
        self.map
            .lock()
            .put((namespace.to_string(), digest.to_string()), bytes.to_vec());
        true
    }

    pub fn get(&self, namespace: &str, digest: &str) -> Option<Vec<u8>> {
        self.map
            .lock()
            .get(&(namespace.to_string(), digest.to_string()))
            .cloned()
    }

    pub fn remove(&self, namespace: &str, digest: &str) {
        self.map.lock().pop(&(namespace.to_string(), digest.to_string()));
    }

    /// Wipes the cache entirely. Used only by obliteration (C8).
    pub fn clear(&self) {
        self.map.lock().clear();
    }
}

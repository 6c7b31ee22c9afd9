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

//! The entry type shared by every component in this crate (§3 DATA MODEL).

use chrono::NaiveDate;

/// Objects smaller than this are stored inline in the metadata row instead
/// of round-tripping through the bulk object store.
pub const MIN_SIZE_FOR_BULK: usize = 501;

/// The largest blob the read cache (C4) will hold.
pub const MAX_CACHED: usize = 500 * 1024;

/// Upper bound on digests accepted by a single `contains` call.
pub const MAX_KEYS_PER_CALL: usize = 1000;

/// Batch size used by the cleanup state machine (C8) when scanning for
/// deletion candidates.
pub const ITEMS_TO_DELETE_ASYNC: usize = 100;

/// Sentinel `expanded_size` meaning "not yet verified".
pub const UNVERIFIED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Inline,
    Bulk,
}

/// A single `(namespace, digest)` entry as described in §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub namespace: String,
    pub digest: String,
    pub placement: Placement,
    pub inline_bytes: Option<Vec<u8>>,
    pub bulk_name: Option<String>,
    pub size: u64,
    pub expanded_size: i64,
    pub is_high_priority: bool,
    pub last_access: NaiveDate,
    pub created_at: NaiveDate,
}

impl Entry {
    pub fn key(&self) -> (String, String) {
        (self.namespace.clone(), self.digest.clone())
    }

    pub fn is_verified(&self) -> bool {
        self.expanded_size != UNVERIFIED
    }
}

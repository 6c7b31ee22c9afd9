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

//! Typed, `serde`-deserializable configuration for the CAS service. The
//! on-disk format is JSON5, matching the teacher's `nativelink-config`
//! crate.

use serde::{Deserialize, Serialize};

pub mod backends;

pub use backends::{BulkStoreConfig, FilesystemStore, MemoryStore};

/// Top-level configuration for the CAS service.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CasConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Backend used for the bulk object store (C3).
    pub bulk_store: BulkStoreConfig,

    /// Number of days an entry may go unaccessed before `cleanup old`
    /// evicts it.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Logical bucket name prefix used when composing bulk object paths.
    #[serde(default = "default_bucket_name")]
    pub bucket_name: String,
}

fn default_retention_days() -> u32 {
    30
}

fn default_bucket_name() -> String {
    "cas-cache".to_string()
}

impl Default for CasConfig {
    fn default() -> Self {
        CasConfig {
            server: ServerConfig::default(),
            bulk_store: BulkStoreConfig::memory(MemoryStore::default()),
            retention_days: default_retention_days(),
            bucket_name: default_bucket_name(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: default_bind_address(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

/// Parse a `CasConfig` from a JSON5 document, expanding `~` and `$VAR` in
/// any path-like fields the same way the teacher's stores do for
/// `content_path`/`temp_path`.
pub fn from_json5(data: &str) -> Result<CasConfig, String> {
    serde_json5::from_str(data).map_err(|e| format!("Failed to parse config: {e}"))
}

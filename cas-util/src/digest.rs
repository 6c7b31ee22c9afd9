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

//! Namespace parsing and digest validation (component C1).

use cas_error::{error_if, Code, Error, ResultExt};
use sha1::{Digest as _, Sha1};

/// Maximum length of a namespace name. AppEngine's blobstore historically
/// could not locate blobs in Cloud Storage for longer namespaces; we keep
/// the limit as a hard contract rather than a historical accident.
pub const MAX_NAMESPACE_LEN: usize = 29;

/// Whether the bytes stored for entries in a namespace are a raw zlib
/// stream of the (uncompressed) content the digest was computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
}

/// A parsed, validated namespace name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub name: String,
    pub is_testing: bool,
    pub compression: Compression,
}

impl Namespace {
    /// Parses and validates a namespace string. Rejects anything longer
    /// than [`MAX_NAMESPACE_LEN`] or containing characters outside
    /// `[A-Za-z0-9-]`.
    pub fn parse(name: &str) -> Result<Self, Error> {
        error_if!(
            name.len() > MAX_NAMESPACE_LEN,
            "Namespace '{name}' is longer than {MAX_NAMESPACE_LEN} characters"
        );
        error_if!(
            name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'),
            "Namespace '{name}' must match [A-Za-z0-9-]+"
        );

        // Both `-gzip` and `-deflate` mean "the stored bytes are a raw
        // zlib stream"; `-gzip` is a historical misnomer that was never
        // corrected because renaming a namespace suffix in production
        // would have required a data migration.
        let compression = if name.ends_with("-deflate") || name.ends_with("-gzip") {
            Compression::Zlib
        } else {
            Compression::None
        };

        Ok(Namespace {
            is_testing: name.starts_with("temporary"),
            compression,
            name: name.to_string(),
        })
    }
}

/// Abstraction over a streaming hash algorithm, kept as a trait object so
/// additional algorithms can be added per-namespace without touching
/// callers.
pub trait DigestHasher: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize_hex(self: Box<Self>) -> String;
}

struct Sha1Hasher(Sha1);

impl DigestHasher for Sha1Hasher {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize_hex(self: Box<Self>) -> String {
        hex::encode(self.0.finalize())
    }
}

/// Number of raw bytes in the digest used for `namespace`. Currently every
/// namespace uses SHA-1 (20 bytes); kept as a function (rather than a
/// constant) so a future per-namespace algorithm selection only touches
/// this one spot.
pub fn digest_size_bytes(_namespace: &Namespace) -> usize {
    20
}

/// Returns a fresh hasher instance for `namespace`.
pub fn hash_for(_namespace: &Namespace) -> Box<dyn DigestHasher> {
    Box::new(Sha1Hasher(Sha1::new()))
}

/// Validates that `hex_digest` is exactly `2 * digest_size_bytes(namespace)`
/// lowercase hex characters.
pub fn validate_digest(namespace: &Namespace, hex_digest: &str) -> bool {
    let expected_len = digest_size_bytes(namespace) * 2;
    hex_digest.len() == expected_len
        && hex_digest
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Parses a namespace and validates a digest against it in one call,
/// returning a tip-annotated error suitable for a 400 response.
pub fn parse_and_validate(namespace: &str, hex_digest: &str) -> Result<Namespace, Error> {
    let ns = Namespace::parse(namespace).err_tip(|| "While parsing namespace")?;
    if !validate_digest(&ns, hex_digest) {
        return Err(cas_error::make_err!(
            Code::InvalidArgument,
            "Digest '{hex_digest}' is not valid for namespace '{}'",
            ns.name
        ));
    }
    Ok(ns)
}

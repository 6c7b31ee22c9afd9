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

//! The IP/domain whitelist collaborator named in §6 as external. The core
//! doesn't depend on any particular policy, only on this trait.

use async_trait::async_trait;
use axum::http::HeaderMap;

#[async_trait]
pub trait AuthChecker: Send + Sync {
    /// Returns `true` if the request identified by `headers` may proceed.
    async fn is_allowed(&self, headers: &HeaderMap) -> bool;
}

/// The default policy: always allow. Production deployments substitute a
/// real `AuthChecker` without touching the core.
pub struct AllowAllAuth;

#[async_trait]
impl AuthChecker for AllowAllAuth {
    async fn is_allowed(&self, _headers: &HeaderMap) -> bool {
        true
    }
}

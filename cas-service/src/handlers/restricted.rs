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

//! Restricted-path handlers: the bulk store's upload callback, and the
//! cleanup/verify/tag task-queue entry points. Every route here sits behind
//! [`crate::layers::RestrictedLayer`] and is never reachable from the public
//! listener.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use cas_error::{Code, Error};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::error_response::ApiError;
use crate::metrics::ServiceMetrics;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub priority: u32,
}

/// `POST /restricted/content/store_blobstore/<ns>/<hex>/<upload_id>`: the
/// bulk store's callback once a client's direct upload lands. `upload_id`
/// identifies the in-flight upload session but carries no data this
/// implementation needs beyond routing, since the bytes arrive in the body.
pub async fn store_blobstore_callback(
    State(state): State<AppState>,
    Path((namespace, hex_digest, _upload_id)): Path<(String, String, String)>,
    Query(query): Query<CallbackQuery>,
    body: axum::body::Bytes,
) -> Result<&'static str, ApiError> {
    let size = body.len() as u64;
    let bulk_name = state
        .engine
        .bulk()
        .put(&namespace, &hex_digest, &body)
        .await
        .map_err(|e| e.append("bulk_put_failed"))?;
    state
        .engine
        .store_blobstore_callback(&namespace, &hex_digest, bulk_name, size, query.priority == 0)
        .await?;
    Ok("Content saved.")
}

/// `GET /restricted/cleanup/trigger/<name>`: runs a cleanup pass inline and
/// reports what it did, for operators driving cleanup by hand.
pub async fn cleanup_trigger(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<String, ApiError> {
    ServiceMetrics::inc(&state.metrics.cleanup_runs_total);
    match name.as_str() {
        "old" => {
            let ran = state.engine.cleanup_old().await?;
            Ok(format!("cleanup_old: {}", if ran { "ran" } else { "nothing to do" }))
        }
        "testing" => {
            let ran = state.engine.cleanup_testing().await?;
            Ok(format!("cleanup_testing: {}", if ran { "ran" } else { "nothing to do" }))
        }
        "obliterate" => {
            state.engine.obliterate().await?;
            Ok("obliterate: done".to_string())
        }
        "orphaned" => {
            let swept = state.engine.sweep_orphans().await?;
            Ok(format!("sweep_orphans: removed {swept} objects"))
        }
        other => Err(unknown_cleanup_kind(other).into()),
    }
}

/// `POST /restricted/taskqueue/cleanup/<old|testing|obliterate>`: the
/// task-queue's entry point for a `Task::Cleanup` delivery.
pub async fn cleanup_taskqueue(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    ServiceMetrics::inc(&state.metrics.cleanup_runs_total);
    match name.as_str() {
        "old" => {
            state.engine.cleanup_old().await?;
        }
        "testing" => {
            state.engine.cleanup_testing().await?;
        }
        "obliterate" => {
            state.engine.obliterate().await?;
        }
        other => return Err(unknown_cleanup_kind(other).into()),
    }
    Ok(StatusCode::OK)
}

fn unknown_cleanup_kind(name: &str) -> Error {
    cas_error::make_err!(Code::NotFound, "Unknown cleanup kind '{name}'")
}

/// `POST /restricted/taskqueue/verify/<ns>/<hex>`: the task-queue's entry
/// point for a `Task::Verify` delivery (C6).
pub async fn verify_taskqueue(
    State(state): State<AppState>,
    Path((namespace, hex_digest)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.engine.verify(&namespace, &hex_digest).await?;
    ServiceMetrics::inc(&state.metrics.verify_runs_total);
    Ok(StatusCode::OK)
}

/// `POST /restricted/taskqueue/tag/<ns>/<YYYY-MM-DD>`: the task-queue's
/// entry point for a `Task::Tag` delivery. The body is the same raw,
/// concatenated digest encoding `contains` accepts.
pub async fn tag_taskqueue(
    State(state): State<AppState>,
    Path((namespace, day)): Path<(String, String)>,
    body: axum::body::Bytes,
) -> Result<StatusCode, ApiError> {
    let day = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
        .map_err(|_| cas_error::make_err!(Code::InvalidArgument, "Invalid tag day '{day}', expected YYYY-MM-DD"))?;
    let ns = cas_util::digest::Namespace::parse(&namespace)?;
    let digest_size = cas_util::digest::digest_size_bytes(&ns);
    if digest_size == 0 || body.len() % digest_size != 0 {
        return Err(cas_error::make_err!(
            Code::InvalidArgument,
            "tag payload length {} is not a multiple of digest size {digest_size}",
            body.len()
        )
        .into());
    }
    let digests: Vec<String> = body.chunks(digest_size).map(hex::encode).collect();
    state.engine.run_tag_task(&namespace, day, &digests).await?;
    Ok(StatusCode::OK)
}

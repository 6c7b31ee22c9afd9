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

//! Public content-path handlers: batch presence, inline/bulk store, upload
//! URL issuance, and retrieval.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use cas_store::StoreOutcome;
use serde::Deserialize;

use crate::error_response::ApiError;
use crate::metrics::ServiceMetrics;
use crate::state::AppState;

pub async fn contains(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    body: axum::body::Bytes,
) -> Result<Vec<u8>, ApiError> {
    let response = state.engine.contains(&namespace, &body).await?;
    Ok(response)
}

#[derive(Deserialize)]
pub struct StoreQuery {
    #[serde(default)]
    pub priority: u32,
}

pub async fn store(
    State(state): State<AppState>,
    Path((namespace, hex_digest)): Path<(String, String)>,
    Query(query): Query<StoreQuery>,
    body: axum::body::Bytes,
) -> Result<Response, ApiError> {
    let outcome = state
        .engine
        .store_inline(&namespace, &hex_digest, body.to_vec(), query.priority)
        .await?;
    match outcome {
        StoreOutcome::Stored => {
            ServiceMetrics::inc(&state.metrics.stores_total);
            Ok((StatusCode::OK, "Content saved.").into_response())
        }
        StoreOutcome::Duplicate => {
            ServiceMetrics::inc(&state.metrics.duplicates_total);
            Ok((StatusCode::OK, "Content already existed.").into_response())
        }
    }
}

#[derive(Deserialize)]
pub struct UploadUrlQuery {
    #[serde(default)]
    pub token: Option<String>,
}

pub async fn generate_blobstore_url(
    State(state): State<AppState>,
    Path((namespace, hex_digest)): Path<(String, String)>,
    Query(_query): Query<UploadUrlQuery>,
) -> Result<String, ApiError> {
    let callback_url = format!("/restricted/content/store_blobstore/{namespace}/{hex_digest}/upload");
    let url = state.engine.generate_upload_url(&namespace, &hex_digest, &callback_url).await?;
    Ok(url)
}

pub async fn retrieve(
    State(state): State<AppState>,
    Path((namespace, hex_digest)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    match state.engine.retrieve(&namespace, &hex_digest).await {
        Ok(bytes) => {
            ServiceMetrics::inc(&state.metrics.retrieves_total);
            Ok((
                [
                    (header::CONTENT_TYPE, "application/octet-stream"),
                    (header::CACHE_CONTROL, "public, max-age=43200"),
                ],
                bytes,
            )
                .into_response())
        }
        Err(err) => {
            ServiceMetrics::inc(&state.metrics.not_found_total);
            Err(err.into())
        }
    }
}

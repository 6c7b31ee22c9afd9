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

//! The HTTP transport (A5): wires every route named in §6 onto an
//! `axum::Router`, with [`layers::RestrictedLayer`] guarding the
//! task-queue-only surface and [`layers::AuthLayer`] guarding everything.

pub mod auth;
pub mod error_response;
pub mod handlers;
pub mod layers;
pub mod metrics;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use cas_store::CasEngine;

use auth::AuthChecker;
use layers::{AuthLayer, RestrictedLayer};
use state::AppState;

/// Builds the full router for `engine`, guarding restricted routes with the
/// internal-dispatch check and everything with `auth_checker`.
pub fn build_router(engine: Arc<CasEngine>, auth_checker: Arc<dyn AuthChecker>) -> Router {
    let state = AppState::new(engine);

    let public = Router::new()
        .route("/content/contains/:ns", post(handlers::content::contains))
        .route("/content/store/:ns/:hex", post(handlers::content::store))
        .route(
            "/content/generate_blobstore_url/:ns/:hex",
            post(handlers::content::generate_blobstore_url),
        )
        .route("/content/retrieve/:ns/:hex", get(handlers::content::retrieve))
        .route("/healthz", get(handlers::ops::healthz))
        .route("/metrics", get(handlers::ops::metrics));

    let restricted = Router::new()
        .route(
            "/restricted/content/store_blobstore/:ns/:hex/:id",
            post(handlers::restricted::store_blobstore_callback),
        )
        .route("/restricted/cleanup/trigger/:name", get(handlers::restricted::cleanup_trigger))
        .route(
            "/restricted/taskqueue/cleanup/:name",
            post(handlers::restricted::cleanup_taskqueue),
        )
        .route(
            "/restricted/taskqueue/verify/:ns/:hex",
            post(handlers::restricted::verify_taskqueue),
        )
        .route(
            "/restricted/taskqueue/tag/:ns/:day",
            post(handlers::restricted::tag_taskqueue),
        )
        .layer(RestrictedLayer);

    public
        .merge(restricted)
        .layer(AuthLayer::new(auth_checker))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth::AllowAllAuth;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use cas_store::{InMemoryMetadataStore, MemoryBulkStore, ReadCache, RecordingTaskScheduler};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    fn test_engine() -> Arc<CasEngine> {
        Arc::new(CasEngine::new(
            Arc::new(InMemoryMetadataStore::new()),
            Arc::new(MemoryBulkStore::new()),
            Arc::new(ReadCache::default()),
            Arc::new(RecordingTaskScheduler::new()),
            30,
        ))
    }

    #[tokio::test]
    async fn healthz_is_reachable_without_any_header() {
        let router = build_router(test_engine(), Arc::new(AllowAllAuth));
        let response = router
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn restricted_route_without_dispatch_header_is_rejected() {
        let router = build_router(test_engine(), Arc::new(AllowAllAuth));
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/restricted/taskqueue/verify/ns/aa")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn restricted_route_with_dispatch_header_reaches_handler() {
        let router = build_router(test_engine(), Arc::new(AllowAllAuth));
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/restricted/taskqueue/verify/ns/aa")
                    .header(layers::INTERNAL_DISPATCH_HEADER, "1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // Digest "aa" names no entry; the request reaches the handler (past
        // the 405 gate) and verify() is a no-op for an unknown digest.
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn store_then_retrieve_round_trips_through_the_router() {
        let router = build_router(test_engine(), Arc::new(AllowAllAuth));
        let digest = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
        let store_response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/content/store/default/{digest}"))
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(store_response.status(), StatusCode::OK);

        let retrieve_response = router
            .oneshot(
                Request::builder()
                    .uri(format!("/content/retrieve/default/{digest}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(retrieve_response.status(), StatusCode::OK);
    }
}

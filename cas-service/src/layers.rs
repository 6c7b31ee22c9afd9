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

//! Two `tower::Layer`s guarding the HTTP surface (A5/A12):
//! - [`RestrictedLayer`] stands in for "only a task-queue caller may invoke
//!   this", checking an internal dispatch marker header.
//! - [`AuthLayer`] wraps the pluggable [`crate::auth::AuthChecker`]
//!   collaborator named in §6 as external.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{BoxBody, Body};
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use tower::{Layer, Service};

use crate::auth::AuthChecker;

pub const INTERNAL_DISPATCH_HEADER: &str = "X-Internal-Dispatch";

/// Rejects any request missing [`INTERNAL_DISPATCH_HEADER`] with 405,
/// mirroring the original's "only the task queue may call this" check.
#[derive(Clone, Default)]
pub struct RestrictedLayer;

impl<S> Layer<S> for RestrictedLayer {
    type Service = RestrictedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RestrictedService { inner }
    }
}

#[derive(Clone)]
pub struct RestrictedService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RestrictedService<S>
where
    S: Service<Request<Body>, Response = Response<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<BoxBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        if !request.headers().contains_key(INTERNAL_DISPATCH_HEADER) {
            return Box::pin(async move {
                Ok((StatusCode::METHOD_NOT_ALLOWED, "Restricted endpoint").into_response())
            });
        }
        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(request).await })
    }
}

/// Wraps every request in the pluggable [`AuthChecker`] policy, rejecting
/// with 403 if it declines. Stubbed as always-allow in the core.
#[derive(Clone)]
pub struct AuthLayer {
    checker: Arc<dyn AuthChecker>,
}

impl AuthLayer {
    pub fn new(checker: Arc<dyn AuthChecker>) -> Self {
        AuthLayer { checker }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService { inner, checker: self.checker.clone() }
    }
}

#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    checker: Arc<dyn AuthChecker>,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<BoxBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let checker = self.checker.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move {
            if !checker.is_allowed(request.headers()).await {
                return Ok((StatusCode::FORBIDDEN, "auth_failed").into_response());
            }
            inner.call(request).await
        })
    }
}

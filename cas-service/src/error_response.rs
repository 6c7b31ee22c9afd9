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

//! Maps `cas_error::Code` onto HTTP status codes (§6/§7). This is the only
//! layer allowed to think in HTTP terms; everything below speaks `Code`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cas_error::Code;

pub struct ApiError(pub cas_error::Error);

impl From<cas_error::Error> for ApiError {
    fn from(err: cas_error::Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // The legacy 402 status this rewrite's source carried for
        // validation failures is treated as a typo for 400 everywhere; no
        // code path here ever emits 402.
        let status = match self.0.code {
            Code::InvalidArgument => StatusCode::BAD_REQUEST,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::AlreadyExists => StatusCode::OK,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Code::PermissionDenied | Code::Unauthenticated => StatusCode::FORBIDDEN,
            Code::DeadlineExceeded => StatusCode::OK,
            Code::Internal | Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

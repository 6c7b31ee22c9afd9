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

//! The `axum` extractor state shared by every handler.

use std::sync::Arc;

use cas_store::CasEngine;

use crate::metrics::ServiceMetrics;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CasEngine>,
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    pub fn new(engine: Arc<CasEngine>) -> Self {
        AppState { engine, metrics: Arc::new(ServiceMetrics::default()) }
    }
}

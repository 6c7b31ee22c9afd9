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

use std::net::SocketAddr;
use std::sync::Arc;

use cas_config::{BulkStoreConfig, CasConfig};
use cas_service::auth::AllowAllAuth;
use cas_service::build_router;
use cas_store::{
    CasEngine, FilesystemBulkStore, InMemoryMetadataStore, InProcessTaskScheduler, MemoryBulkStore,
    ReadCache, SharedBulkStore, Task,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// How many workers drain the in-process task queue (verify/tag/cleanup).
const TASK_WORKER_COUNT: usize = 4;
const TASK_QUEUE_CAPACITY: usize = 1024;

#[derive(Parser, Debug)]
#[clap(name = "cas-cache", about = "A content-addressed storage cache service")]
struct Args {
    /// Path to a JSON5 configuration file.
    config: String,
}

fn bulk_store_from_config(config: &BulkStoreConfig) -> SharedBulkStore {
    match config {
        BulkStoreConfig::memory(_) => Arc::new(MemoryBulkStore::new()),
        BulkStoreConfig::filesystem(fs) => {
            Arc::new(FilesystemBulkStore::new(&fs.content_path, &fs.temp_path))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config_text = std::fs::read_to_string(&args.config)
        .map_err(|e| format!("Failed to read config file '{}': {e}", args.config))?;
    let config: CasConfig = cas_config::from_json5(&config_text)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let metadata = Arc::new(InMemoryMetadataStore::new());
    let bulk = bulk_store_from_config(&config.bulk_store);
    let cache = Arc::new(ReadCache::default());
    let retention_days = config.retention_days;

    // The task-queue handler needs to call back into the very engine whose
    // `enqueue` calls feed it, so the engine is published into this cell
    // right after construction, before the first task can possibly arrive.
    let engine_cell: Arc<tokio::sync::OnceCell<Arc<CasEngine>>> = Arc::new(tokio::sync::OnceCell::new());
    let handler_cell = engine_cell.clone();
    let scheduler = InProcessTaskScheduler::spawn(TASK_WORKER_COUNT, TASK_QUEUE_CAPACITY, move |task| {
        let handler_cell = handler_cell.clone();
        async move {
            let Some(engine) = handler_cell.get() else {
                tracing::error!("Task delivered before engine was initialized");
                return;
            };
            if let Err(err) = run_task(engine, task).await {
                tracing::error!(%err, "Task execution failed");
            }
        }
    });

    let engine = Arc::new(CasEngine::new(metadata, bulk, cache, scheduler, retention_days));
    let _ = engine_cell.set(engine.clone());

    let router = build_router(engine, Arc::new(AllowAllAuth));

    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .map_err(|e| format!("Invalid bind address/port: {e}"))?;
    tracing::info!(%addr, "Starting cas-cache");

    axum::Server::bind(&addr)
        .serve(router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn run_task(engine: &CasEngine, task: Task) -> Result<(), cas_error::Error> {
    match task {
        Task::Verify { namespace, digest } => engine.verify(&namespace, &digest).await,
        Task::Tag { namespace, day, digests } => engine.run_tag_task(&namespace, day, &digests).await,
        Task::Cleanup { kind } => match kind {
            cas_store::CleanupKind::Old => engine.cleanup_old().await.map(|_| ()),
            cas_store::CleanupKind::Testing => engine.cleanup_testing().await.map(|_| ()),
            cas_store::CleanupKind::Obliterate => engine.obliterate().await,
            cas_store::CleanupKind::Orphaned => engine.sweep_orphans().await.map(|_| ()),
        },
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}

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

//! The task scheduler (A6): an explicit, in-process stand-in for the
//! external task-queue collaborator. The production implementation spawns
//! a bounded `tokio` worker pool reading from an `mpsc` queue; a test
//! double records what was enqueued without running it.

use std::sync::Arc;

use async_trait::async_trait;
use cas_error::Error;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// A unit of deferred work. The scheduler delivers each task at-least-once;
/// idempotence is the task handler's responsibility (see C6's
/// `expanded_size != -1` guard).
#[derive(Debug, Clone)]
pub enum Task {
    Verify { namespace: String, digest: String },
    Tag { namespace: String, day: NaiveDate, digests: Vec<String> },
    Cleanup { kind: CleanupKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupKind {
    Old,
    Testing,
    Obliterate,
    Orphaned,
}

/// Enqueues deferred work. Production code calls this from request
/// handlers; it must never block the caller on the task actually running.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    async fn enqueue(&self, task: Task) -> Result<(), Error>;
}

/// A bounded `mpsc`-backed worker pool. Tasks are handed to `handler`
/// sequentially per worker; `worker_count` workers run concurrently.
pub struct InProcessTaskScheduler {
    tx: mpsc::Sender<Task>,
}

impl InProcessTaskScheduler {
    pub fn spawn<F, Fut>(worker_count: usize, queue_capacity: usize, handler: F) -> Arc<Self>
    where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let handler = Arc::new(handler);
        for _ in 0..worker_count.max(1) {
            let rx = rx.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                loop {
                    let task = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    match task {
                        Some(task) => handler(task).await,
                        None => break,
                    }
                }
            });
        }
        Arc::new(InProcessTaskScheduler { tx })
    }
}

#[async_trait]
impl TaskScheduler for InProcessTaskScheduler {
    async fn enqueue(&self, task: Task) -> Result<(), Error> {
        self.tx
            .send(task)
            .await
            .map_err(|_| cas_error::make_err!(cas_error::Code::Unavailable, "Task queue is closed"))
    }
}

/// Records enqueued tasks instead of running them. Used by tests that need
/// to drive C6/C7's background work deterministically rather than racing a
/// real worker pool.
#[derive(Default)]
pub struct RecordingTaskScheduler {
    pub tasks: Mutex<Vec<Task>>,
}

impl RecordingTaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Task> {
        std::mem::take(&mut self.tasks.lock())
    }
}

#[async_trait]
impl TaskScheduler for RecordingTaskScheduler {
    async fn enqueue(&self, task: Task) -> Result<(), Error> {
        self.tasks.lock().push(task);
        Ok(())
    }
}

/// A scheduler whose `enqueue` always fails, used to test the
/// `enqueue_failed` error path (§7).
pub struct FailingTaskScheduler;

#[async_trait]
impl TaskScheduler for FailingTaskScheduler {
    async fn enqueue(&self, _task: Task) -> Result<(), Error> {
        Err(cas_error::make_err!(cas_error::Code::Unavailable, "Task queue unavailable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_scheduler_captures_tasks_in_order() {
        let sched = RecordingTaskScheduler::new();
        sched
            .enqueue(Task::Verify { namespace: "ns".into(), digest: "aa".into() })
            .await
            .unwrap();
        sched
            .enqueue(Task::Cleanup { kind: CleanupKind::Old })
            .await
            .unwrap();
        let tasks = sched.drain();
        assert_eq!(tasks.len(), 2);
        assert!(sched.drain().is_empty());
    }

    #[tokio::test]
    async fn failing_scheduler_always_errors() {
        let sched = FailingTaskScheduler;
        assert!(sched.enqueue(Task::Cleanup { kind: CleanupKind::Old }).await.is_err());
    }

    #[tokio::test]
    async fn in_process_scheduler_delivers_to_handler() {
        let (done_tx, mut done_rx) = mpsc::channel(1);
        let scheduler = InProcessTaskScheduler::spawn(1, 8, move |_task| {
            let done_tx = done_tx.clone();
            async move {
                let _ = done_tx.send(()).await;
            }
        });
        scheduler
            .enqueue(Task::Verify { namespace: "ns".into(), digest: "aa".into() })
            .await
            .unwrap();
        done_rx.recv().await.unwrap();
    }
}

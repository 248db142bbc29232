//! Per-session lifecycle queues
//!
//! One FIFO of pending lifecycle tasks per session key. A queue runs one
//! task at a time; the next task starts only after the previous one's
//! asynchronous completion. Task failure never aborts the queue.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::error;

pub type LifecycleTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Keyed set of serialized task queues.
///
/// A queue exists while it has work; its worker removes the map entry only
/// after observing the channel empty under the map lock, so an enqueue can
/// never race a retiring worker into interleaved execution.
#[derive(Default)]
pub struct LifecycleQueues {
    queues: Mutex<HashMap<String, mpsc::UnboundedSender<LifecycleTask>>>,
}

impl LifecycleQueues {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a task to the queue for `key`, creating the queue if needed
    pub fn enqueue(self: &Arc<Self>, key: &str, task: LifecycleTask) {
        let mut queues = self.queues.lock().unwrap();

        let task = match queues.get(key) {
            Some(tx) => match tx.send(task) {
                Ok(()) => return,
                // Worker already retired with a closed channel; replace it
                Err(mpsc::error::SendError(task)) => task,
            },
            None => task,
        };
        self.spawn_worker(&mut queues, key, task);
    }

    fn spawn_worker(
        self: &Arc<Self>,
        queues: &mut HashMap<String, mpsc::UnboundedSender<LifecycleTask>>,
        key: &str,
        task: LifecycleTask,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(task);
        queues.insert(key.to_string(), tx);

        let queues_ref = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            queues_ref.run_worker(key, rx).await;
        });
    }

    async fn run_worker(
        self: Arc<Self>,
        key: String,
        mut rx: mpsc::UnboundedReceiver<LifecycleTask>,
    ) {
        loop {
            let task = match rx.try_recv() {
                Ok(task) => Some(task),
                Err(mpsc::error::TryRecvError::Disconnected) => break,
                Err(mpsc::error::TryRecvError::Empty) => {
                    // Re-check under the map lock before retiring
                    let mut queues = self.queues.lock().unwrap();
                    match rx.try_recv() {
                        Ok(task) => Some(task),
                        Err(_) => {
                            queues.remove(&key);
                            break;
                        }
                    }
                }
            };

            if let Some(task) = task {
                if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                    error!(session = key, "Lifecycle task panicked");
                }
            }
        }
    }

    /// Whether a queue currently exists for this key
    pub fn has_queue(&self, key: &str) -> bool {
        self.queues.lock().unwrap().contains_key(key)
    }
}

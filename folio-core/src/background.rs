//! Background rasterization for one document.
//!
//! Requests are keyed by page: a newer request for a page replaces the pending one, and a page
//! already being rendered for the current generation counts as pending. The worker renders one
//! page at a time on the blocking pool. Every request carries the generation it was
//! issued under; bumping the generation drops everything pending and makes in-flight results
//! stale.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::error::{ViewerError, ViewerResult};
use crate::provider::{PageGeometryProvider, RenderImage, RenderRequest};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderJob {
    pub page_index: usize,
    pub scale: f32,
    pub dark_mode: bool,
    pub generation: u64,
}

#[derive(Debug)]
pub struct RenderResult {
    pub page_index: usize,
    pub scale: f32,
    pub generation: u64,
    pub outcome: ViewerResult<RenderImage>,
}

#[derive(Default)]
struct Queue {
    jobs: BTreeMap<usize, RenderJob>,
    in_flight: Option<RenderJob>,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    notify: Notify,
    generation: AtomicU64,
    closed: AtomicBool,
}

pub struct RenderScheduler {
    shared: Arc<Shared>,
    results: mpsc::UnboundedReceiver<RenderResult>,
    worker: Option<JoinHandle<()>>,
}

/// The consuming half, run as a task on the runtime.
pub struct RenderWorker {
    shared: Arc<Shared>,
    provider: Arc<dyn PageGeometryProvider>,
    tx: mpsc::UnboundedSender<RenderResult>,
}

impl RenderScheduler {
    pub fn new(provider: Arc<dyn PageGeometryProvider>) -> (Self, RenderWorker) {
        let shared = Arc::new(Shared::default());
        let (tx, results) = mpsc::unbounded_channel();
        let scheduler = Self {
            shared: Arc::clone(&shared),
            results,
            worker: None,
        };
        let worker = RenderWorker {
            shared,
            provider,
            tx,
        };
        (scheduler, worker)
    }

    pub fn spawn(handle: &Handle, provider: Arc<dyn PageGeometryProvider>) -> Self {
        let (mut scheduler, worker) = Self::new(provider);
        scheduler.worker = Some(handle.spawn(worker.run()));
        scheduler
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Invalidates every pending and in-flight request.
    pub fn bump_generation(&self) -> u64 {
        let mut queue = self.shared.queue.lock();
        queue.jobs.clear();
        self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn request(&self, page_index: usize, scale: f32, dark_mode: bool) {
        if self.shared.closed.load(Ordering::SeqCst) {
            return;
        }
        let job = RenderJob {
            page_index,
            scale,
            dark_mode,
            generation: self.generation(),
        };
        self.shared.queue.lock().jobs.insert(page_index, job);
        self.shared.notify.notify_one();
    }

    /// Queued, or being rendered under the current generation.
    pub fn is_pending(&self, page_index: usize) -> bool {
        let queue = self.shared.queue.lock();
        if queue.jobs.contains_key(&page_index) {
            return true;
        }
        queue.in_flight.is_some_and(|job| {
            job.page_index == page_index && job.generation == self.generation()
        })
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    fn is_current(&self, result: &RenderResult) -> bool {
        if result.generation == self.generation() {
            return true;
        }
        debug!(
            page = result.page_index,
            generation = result.generation,
            "discarding stale raster"
        );
        false
    }

    /// Every result that arrived so far, stale ones removed. Never blocks.
    pub fn drain(&mut self) -> Vec<RenderResult> {
        let mut ready = Vec::new();
        while let Ok(result) = self.results.try_recv() {
            if self.is_current(&result) {
                ready.push(result);
            }
        }
        ready
    }

    /// Waits for the next current result; `None` once the worker is gone.
    pub async fn next_result(&mut self) -> Option<RenderResult> {
        while let Some(result) = self.results.recv().await {
            if self.is_current(&result) {
                return Some(result);
            }
        }
        None
    }

    pub fn shutdown(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.bump_generation();
        self.shared.notify.notify_one();
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl RenderWorker {
    #[instrument(skip(self), fields(document = %self.provider.info().path.display()))]
    pub async fn run(self) {
        loop {
            let next = {
                let mut queue = self.shared.queue.lock();
                let next = queue.jobs.pop_first().map(|(_, job)| job);
                queue.in_flight = next;
                next
            };
            let Some(job) = next else {
                if self.shared.closed.load(Ordering::SeqCst) {
                    break;
                }
                self.shared.notify.notified().await;
                continue;
            };
            if job.generation != self.shared.generation.load(Ordering::SeqCst) {
                continue;
            }

            let provider = Arc::clone(&self.provider);
            let request = RenderRequest {
                page_index: job.page_index,
                scale: job.scale,
                dark_mode: job.dark_mode,
            };
            let outcome = match tokio::task::spawn_blocking(move || provider.render_page(request))
                .await
            {
                Ok(Ok(image)) => Ok(image),
                Ok(Err(err)) => Err(ViewerError::provider(job.page_index, err)),
                Err(join) => Err(ViewerError::provider(
                    job.page_index,
                    anyhow!("render task failed: {join}"),
                )),
            };

            let result = RenderResult {
                page_index: job.page_index,
                scale: job.scale,
                generation: job.generation,
                outcome,
            };
            let sent = self.tx.send(result);
            self.shared.queue.lock().in_flight = None;
            if sent.is_err() {
                break;
            }
        }
        debug!("render worker stopped");
    }
}

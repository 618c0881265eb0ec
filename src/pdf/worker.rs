//! Render worker - runs in a dedicated thread
//!
//! Viewport jobs are debounced: the worker waits until no newer viewport
//! job arrived for `debounce`, capped at `max_wait` since the first one.
//! Every job replaced during that window is answered `Superseded`.
//! Page jobs arriving meanwhile are kept and run after the viewport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};

use super::bridge::RenderBridge;
use super::buffer::BufferPool;
use super::error::{BufferError, RenderError};
use super::request::{Job, JobResult, RequestId};
use super::types::PageTransform;

/// Timing knobs for the worker loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Quiet time required before a viewport job runs
    pub debounce: Duration,
    /// Longest a viewport job can be postponed by newer ones
    pub max_wait: Duration,
}

impl WorkerConfig {
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(75);

    #[must_use]
    pub fn with_debounce(debounce: Duration) -> Self {
        Self {
            debounce,
            max_wait: debounce * 4,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::with_debounce(Self::DEFAULT_DEBOUNCE)
    }
}

struct ViewportJob {
    id: RequestId,
    transforms: Vec<PageTransform>,
    page_spacing: i32,
    top_offset: i32,
}

struct PageJob {
    id: RequestId,
    transform: PageTransform,
}

/// What the debounce window ended with.
struct Settled {
    viewport: ViewportJob,
    shutdown: bool,
}

struct Worker {
    bridge: Arc<RenderBridge>,
    pool: Arc<Mutex<BufferPool>>,
    jobs: Receiver<Job>,
    results: Sender<JobResult>,
    config: WorkerConfig,
    pages: VecDeque<PageJob>,
}

/// Main worker function
pub fn render_worker(
    bridge: Arc<RenderBridge>,
    pool: Arc<Mutex<BufferPool>>,
    jobs: Receiver<Job>,
    results: Sender<JobResult>,
    config: WorkerConfig,
) {
    let mut worker = Worker {
        bridge,
        pool,
        jobs,
        results,
        config,
        pages: VecDeque::new(),
    };

    while let Ok(job) = worker.jobs.recv() {
        let shutdown = match job {
            Job::Shutdown => true,
            Job::Page { id, transform } => {
                worker.render_page(PageJob { id, transform });
                false
            }
            Job::Viewport {
                id,
                transforms,
                page_spacing,
                top_offset,
            } => {
                let first = ViewportJob {
                    id,
                    transforms,
                    page_spacing,
                    top_offset,
                };
                let settled = worker.settle(first);
                worker.render_viewport(settled.viewport);
                settled.shutdown
            }
        };

        while let Some(page) = worker.pages.pop_front() {
            worker.render_page(page);
        }

        if shutdown {
            break;
        }
    }
    debug!("Render worker stopped");
}

impl Worker {
    fn send(&self, result: JobResult) {
        // The service may already be gone during teardown.
        let _ = self.results.send(result);
    }

    /// Waits out the debounce window, keeping only the newest viewport job.
    fn settle(&mut self, first: ViewportJob) -> Settled {
        let started = Instant::now();
        let hard_deadline = started + self.config.max_wait;
        let mut latest = first;

        loop {
            let deadline = (Instant::now() + self.config.debounce).min(hard_deadline);
            match self.jobs.recv_deadline(deadline) {
                Ok(Job::Viewport {
                    id,
                    transforms,
                    page_spacing,
                    top_offset,
                }) => {
                    self.send(JobResult::Superseded(latest.id));
                    latest = ViewportJob {
                        id,
                        transforms,
                        page_spacing,
                        top_offset,
                    };
                }
                Ok(Job::Page { id, transform }) => {
                    self.pages.push_back(PageJob { id, transform });
                }
                Ok(Job::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    return Settled {
                        viewport: latest,
                        shutdown: true,
                    };
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Settled {
                        viewport: latest,
                        shutdown: false,
                    };
                }
            }
        }
    }

    fn render_viewport(&self, job: ViewportJob) {
        let ViewportJob {
            id,
            transforms,
            page_spacing,
            top_offset,
        } = job;

        // Held for acquire + render so nothing frees the buffer mid-render.
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        let result = pool
            .acquire_viewport_buffer(&transforms)
            .map_err(RenderError::from)
            .and_then(|buffer_id| {
                let buffer = pool
                    .get_mut(buffer_id)
                    .ok_or(RenderError::Buffer(BufferError::Unknown(buffer_id.0)))?;
                let response =
                    self.bridge
                        .render_into(transforms.clone(), page_spacing, top_offset, buffer);
                match response {
                    Ok(response) => {
                        let info = buffer
                            .info()
                            .ok_or(RenderError::Buffer(BufferError::Disposed(buffer_id.0)))?;
                        Ok((buffer_id, info, response))
                    }
                    Err(err) => {
                        buffer.free();
                        Err(err)
                    }
                }
            });
        drop(pool);

        match result {
            Ok((buffer, info, response)) => self.send(JobResult::Viewport {
                id,
                requested: transforms,
                response,
                buffer,
                info,
            }),
            Err(error) => {
                warn!("Viewport render {id:?} failed: {error}");
                self.send(JobResult::Failed { id, error });
            }
        }
    }

    fn render_page(&self, job: PageJob) {
        let PageJob { id, transform } = job;

        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        let result = pool
            .acquire_page_buffer(&transform)
            .map_err(RenderError::from)
            .and_then(|buffer_id| {
                let buffer = pool
                    .get_mut(buffer_id)
                    .ok_or(RenderError::Buffer(BufferError::Unknown(buffer_id.0)))?;
                match self.bridge.render_into(vec![transform], 0, 0, buffer) {
                    Ok(_) => Ok((buffer_id, buffer.dimensions())),
                    Err(err) => {
                        buffer.free();
                        Err(err)
                    }
                }
            });
        drop(pool);

        match result {
            Ok((buffer, dimensions)) => self.send(JobResult::Page {
                id,
                transform,
                buffer,
                dimensions,
            }),
            Err(error) => {
                warn!("Page {} render failed: {error}", transform.page_index);
                self.send(JobResult::Failed { id, error });
            }
        }
    }
}

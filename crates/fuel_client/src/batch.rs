//! Parallel downloads.
//!
//! Models go through a worker pool sharing one queue. A worker that finishes a
//! model pushes its unseen dependencies back onto the queue, so the batch ends
//! only when the queue is empty and no download is still in flight.

use crate::client::{FuelClient, fetch_failure};

use fuel_core::prelude::*;
use futures::StreamExt;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Workers used when the caller does not say otherwise.
pub const DEFAULT_JOBS: usize = 2;

#[derive(Default)]
struct Queue {
    pending: VecDeque<Job>,
    in_flight: usize,
    seen: HashSet<String>,
}

struct Job {
    id: ModelIdentifier,
    dependency: bool,
}

struct Shared {
    client: FuelClient,
    queue: Mutex<Queue>,
    wake: Notify,
    results: Mutex<Vec<(ModelIdentifier, FuelResult)>>,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn results(&self) -> MutexGuard<'_, Vec<(ModelIdentifier, FuelResult)>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A job taken off the queue. Dropping it releases the slot and queues the
/// dependencies found so far, even when the download unwinds.
struct InFlight<'a> {
    shared: &'a Shared,
    unreported: Option<ModelIdentifier>,
    dependencies: Vec<ModelIdentifier>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.unreported.take() {
            error!("Download of [{}] stopped without a result", id.unique_name());
            self.shared.results().push((id, ResultType::FetchError.into()));
        }
        {
            let mut queue = self.shared.queue();
            for dependency in self.dependencies.drain(..) {
                if queue.seen.insert(dependency.unique_name()) {
                    queue.pending.push_back(Job {
                        id: dependency,
                        dependency: true,
                    });
                }
            }
            queue.in_flight -= 1;
        }
        self.shared.wake.notify_waiters();
    }
}

impl FuelClient {
    /// Downloads `ids` and everything they depend on with up to `jobs` workers.
    ///
    /// Every input id gets an entry in the result, repeats included, and so
    /// does every dependency. A repeated id is downloaded once and its result
    /// is reported for each occurrence. A dependency already in the cache is
    /// reported as `FetchAlreadyExists`. One failure never stops the others.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn download_models(
        &self,
        ids: &[ModelIdentifier],
        jobs: usize,
    ) -> Vec<(ModelIdentifier, FuelResult)> {
        let mut queue = Queue::default();
        let mut repeats = Vec::new();
        for id in ids {
            let name = id.unique_name();
            if queue.seen.insert(name.clone()) {
                queue.pending.push_back(Job {
                    id: id.clone(),
                    dependency: false,
                });
            } else {
                debug!("[{name}] is requested more than once");
                repeats.push(name);
            }
        }

        let shared = Arc::new(Shared {
            client: self.clone(),
            queue: Mutex::new(queue),
            wake: Notify::new(),
            results: Mutex::new(Vec::with_capacity(ids.len())),
        });

        let mut workers = JoinSet::new();
        for worker in 0..jobs.max(1) {
            workers.spawn(run_worker(worker, shared.clone()));
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Download worker stopped unexpectedly: {e}");
            }
        }

        let mut results = std::mem::take(&mut *shared.results());
        for name in repeats {
            let first = results.iter().find(|(id, _)| id.unique_name() == name).cloned();
            results.extend(first);
        }
        info!("Finished downloading {} models", results.len());
        results
    }

    /// Downloads `ids` with up to `jobs` concurrent requests. Results follow
    /// the order of `ids`.
    pub async fn download_worlds(
        &self,
        ids: &[WorldIdentifier],
        jobs: usize,
    ) -> Vec<(WorldIdentifier, FuelResult)> {
        futures::stream::iter(ids.iter().cloned())
            .map(|mut id| async move {
                let result = self.download_world(&mut id).await;
                (id, result)
            })
            .buffered(jobs.max(1))
            .collect()
            .await
    }
}

async fn run_worker(worker: usize, shared: Arc<Shared>) {
    loop {
        let wake = shared.wake.notified();
        tokio::pin!(wake);
        wake.as_mut().enable();

        let job = {
            let mut queue = shared.queue();
            match queue.pending.pop_front() {
                Some(job) => {
                    queue.in_flight += 1;
                    Some(job)
                }
                None if queue.in_flight == 0 => return,
                None => None,
            }
        };

        let Some(job) = job else {
            // Another worker may still discover dependencies.
            wake.await;
            continue;
        };

        let mut slot = InFlight {
            shared: &shared,
            unreported: Some(job.id.clone()),
            dependencies: Vec::new(),
        };
        debug!(worker, "Processing [{}]", job.id.unique_name());
        let (id, result) = process(&shared.client, job).await;
        if result.is_ok() {
            slot.dependencies = shared.client.model_dependencies(&id).await.1;
        }
        slot.unreported = None;
        shared.results().push((id, result));
    }
}

/// Downloads one model. The returned identifier carries the concrete version
/// when it is known.
async fn process(client: &FuelClient, job: Job) -> (ModelIdentifier, FuelResult) {
    if job.dependency {
        if let Some(model) = client.cache().matching_model(&job.id) {
            debug!("Dependency [{}] is already cached", job.id.unique_name());
            return (model.into_identification(), ResultType::FetchAlreadyExists.into());
        }
    }

    match client.fetch_model(&job.id).await {
        Ok((saved, _)) => (saved, ResultType::Fetch.into()),
        Err(e) => {
            warn!("Failed to download [{}]: {e}", job.id.unique_name());
            (job.id, fetch_failure(&e))
        }
    }
}

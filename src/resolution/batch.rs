//! Fixed-size worker pool resolving many artists against one shared engine.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use log::{debug, error, info};

use super::engine::ResolutionEngine;
use crate::cancellation::CancelToken;
use crate::model::{ArtistQuery, CanonicalRecord};

type WorkQueue = Arc<Mutex<VecDeque<(usize, ArtistQuery)>>>;

fn next_job(queue: &WorkQueue) -> Option<(usize, ArtistQuery)> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

fn drain(
    engine: &ResolutionEngine,
    queue: &WorkQueue,
    cancel: &CancelToken,
    results: &mpsc::Sender<(usize, Option<CanonicalRecord>)>,
) {
    while let Some((index, query)) = next_job(queue) {
        if cancel.is_cancelled() {
            break;
        }
        let record = engine.resolve_cancellable(&query, cancel);
        if results.send((index, record)).is_err() {
            break;
        }
    }
}

/// Resolves `queries` with up to `workers` threads and returns the records in
/// input order. Cancelled resolutions are dropped from the output.
pub fn resolve_batch(
    engine: Arc<ResolutionEngine>,
    queries: Vec<ArtistQuery>,
    workers: usize,
    cancel: &CancelToken,
) -> Vec<CanonicalRecord> {
    let total = queries.len();
    if total == 0 {
        return Vec::new();
    }
    let worker_count = workers.clamp(1, total);
    info!("Batch: resolving {} artists with {} worker(s)", total, worker_count);

    let queue: WorkQueue = Arc::new(Mutex::new(queries.into_iter().enumerate().collect()));
    let (result_sender, result_receiver) = mpsc::channel();
    let mut handles = Vec::with_capacity(worker_count);

    for worker_index in 0..worker_count {
        let engine = Arc::clone(&engine);
        let queue = Arc::clone(&queue);
        let cancel = cancel.clone();
        let results = result_sender.clone();
        let spawned = thread::Builder::new()
            .name(format!("liner-worker-{worker_index}"))
            .spawn(move || drain(&engine, &queue, &cancel, &results));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => error!("Batch: failed to spawn worker {}: {}", worker_index, err),
        }
    }

    if handles.is_empty() {
        debug!("Batch: no worker threads available, resolving inline");
        drain(&engine, &queue, cancel, &result_sender);
    }
    drop(result_sender);

    let mut slots: Vec<Option<CanonicalRecord>> = (0..total).map(|_| None).collect();
    for (index, record) in result_receiver {
        if let Some(slot) = slots.get_mut(index) {
            *slot = record;
        }
    }
    for handle in handles {
        if handle.join().is_err() {
            error!("Batch: a worker thread panicked");
        }
    }

    let records: Vec<CanonicalRecord> = slots.into_iter().flatten().collect();
    if records.len() < total {
        info!(
            "Batch: {} of {} resolutions were cancelled or lost",
            total - records.len(),
            total
        );
    }
    records
}

//! Preview queue: bounded hand-off from the upload path to a fixed pool of workers.
//!
//! Uploads never wait on preview derivation. A full queue drops the job with a
//! warning; the record stays without previews until repair picks it up.
//!
//! Stopping: [`PreviewQueue::drain`] stops accepting jobs and waits until every queued
//! job has run. [`PreviewQueue::shutdown`] discards queued jobs and only waits for the
//! in-flight ones.

use clipstash_core::{PreviewConfig, PreviewScheduler};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::PreviewHandler;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("preview queue is full ({capacity} jobs pending)")]
    Full { capacity: usize },

    #[error("preview queue is shut down")]
    Closed,
}

pub struct PreviewQueue {
    sender: Mutex<Option<mpsc::Sender<Uuid>>>,
    capacity: usize,
    cancel: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl PreviewQueue {
    /// Spawn the dispatcher with `workers` concurrent jobs and room for `capacity`
    /// queued ones. Both are clamped to at least 1.
    pub fn start(handler: Arc<dyn PreviewHandler>, workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();

        let dispatcher = tokio::spawn(Self::dispatch(handler, receiver, workers, cancel.clone()));

        Self {
            sender: Mutex::new(Some(sender)),
            capacity,
            cancel,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    pub fn from_config(handler: Arc<dyn PreviewHandler>, config: &PreviewConfig) -> Self {
        Self::start(handler, config.workers, config.queue_capacity)
    }

    /// Queue a record for preview derivation without waiting.
    pub fn submit(&self, record_id: Uuid) -> Result<(), QueueError> {
        if self.cancel.is_cancelled() {
            return Err(QueueError::Closed);
        }
        let guard = self.sender.lock().map_err(|_| QueueError::Closed)?;
        let Some(sender) = guard.as_ref() else {
            return Err(QueueError::Closed);
        };
        sender.try_send(record_id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Jobs waiting for a worker.
    pub fn pending(&self) -> usize {
        match self.sender.lock() {
            Ok(guard) => guard
                .as_ref()
                .map(|s| self.capacity - s.capacity())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Stop accepting jobs and wait for the queued and in-flight ones to finish.
    pub async fn drain(&self) {
        self.close_sender();
        self.join().await;
    }

    /// Stop accepting jobs, discard queued ones and wait for in-flight ones.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.close_sender();
        self.join().await;
    }

    fn close_sender(&self) {
        if let Ok(mut guard) = self.sender.lock() {
            guard.take();
        }
    }

    async fn join(&self) {
        let dispatcher = match self.dispatcher.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Preview dispatcher terminated abnormally");
            }
        }
    }

    async fn dispatch(
        handler: Arc<dyn PreviewHandler>,
        mut receiver: mpsc::Receiver<Uuid>,
        workers: usize,
        cancel: CancellationToken,
    ) {
        tracing::info!(workers = workers, "Preview worker pool started");
        let semaphore = Arc::new(Semaphore::new(workers));

        loop {
            // Take a worker slot before dequeuing so backlog stays in the bounded channel.
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let record_id = tokio::select! {
                _ = cancel.cancelled() => break,
                job = receiver.recv() => match job {
                    Some(record_id) => record_id,
                    None => break,
                },
            };

            let handler = handler.clone();
            tokio::spawn(async move {
                let _permit = permit;
                handler.handle(record_id).await;
            });
        }

        receiver.close();
        let mut discarded = 0usize;
        while receiver.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::warn!(discarded = discarded, "Discarded queued preview jobs on shutdown");
        }

        // All permits back means every in-flight job has finished.
        if semaphore.acquire_many(workers as u32).await.is_err() {
            tracing::warn!("Preview worker semaphore closed during shutdown");
        }
        tracing::info!("Preview worker pool stopped");
    }
}

impl PreviewScheduler for PreviewQueue {
    fn schedule(&self, record_id: Uuid) -> bool {
        match self.submit(record_id) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    record_id = %record_id,
                    error = %e,
                    "Preview job not queued, record stays without previews until repair"
                );
                false
            }
        }
    }
}

impl Drop for PreviewQueue {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Records started and finished jobs; each job waits for a permit on `gate`.
    struct GatedHandler {
        gate: Semaphore,
        started: mpsc::UnboundedSender<Uuid>,
        finished: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl PreviewHandler for GatedHandler {
        async fn handle(&self, record_id: Uuid) {
            let _ = self.started.send(record_id);
            self.gate.acquire().await.unwrap().forget();
            self.finished.lock().unwrap().push(record_id);
        }
    }

    fn gated(open_permits: usize) -> (Arc<GatedHandler>, mpsc::UnboundedReceiver<Uuid>) {
        let (started, started_rx) = mpsc::unbounded_channel();
        let handler = Arc::new(GatedHandler {
            gate: Semaphore::new(open_permits),
            started,
            finished: Mutex::new(Vec::new()),
        });
        (handler, started_rx)
    }

    async fn next_started(rx: &mut mpsc::UnboundedReceiver<Uuid>) -> Uuid {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("job did not start")
            .unwrap()
    }

    #[tokio::test]
    async fn test_jobs_are_processed() {
        let (handler, mut started) = gated(Semaphore::MAX_PERMITS);
        let queue = PreviewQueue::start(handler.clone(), 2, 8);

        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            assert!(queue.schedule(*id));
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(next_started(&mut started).await);
        }
        seen.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(seen, expected);

        queue.shutdown().await;
        assert_eq!(handler.finished.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_blocking() {
        let (handler, mut started) = gated(0);
        let queue = PreviewQueue::start(handler.clone(), 1, 1);

        let first = Uuid::new_v4();
        queue.submit(first).unwrap();
        assert_eq!(next_started(&mut started).await, first);

        let second = Uuid::new_v4();
        queue.submit(second).unwrap();
        assert_eq!(queue.pending(), 1);

        assert_eq!(
            queue.submit(Uuid::new_v4()),
            Err(QueueError::Full { capacity: 1 })
        );
        assert!(!queue.schedule(Uuid::new_v4()));

        handler.gate.add_permits(2);
        assert_eq!(next_started(&mut started).await, second);
        queue.shutdown().await;
        assert_eq!(*handler.finished.lock().unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_drain_runs_queued_jobs() {
        let (handler, _started) = gated(Semaphore::MAX_PERMITS);
        let queue = PreviewQueue::start(handler.clone(), 1, 8);

        for _ in 0..5 {
            queue.submit(Uuid::new_v4()).unwrap();
        }
        queue.drain().await;

        assert_eq!(handler.finished.lock().unwrap().len(), 5);
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.submit(Uuid::new_v4()), Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_jobs() {
        let (handler, mut started) = gated(0);
        let queue = Arc::new(PreviewQueue::start(handler.clone(), 1, 4));

        let running = Uuid::new_v4();
        queue.submit(running).unwrap();
        next_started(&mut started).await;
        queue.submit(Uuid::new_v4()).unwrap();

        let stopping = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!stopping.is_finished());

        handler.gate.add_permits(1);
        stopping.await.unwrap();

        assert_eq!(*handler.finished.lock().unwrap(), vec![running]);
        assert_eq!(queue.submit(Uuid::new_v4()), Err(QueueError::Closed));
        assert!(!queue.schedule(Uuid::new_v4()));
    }
}

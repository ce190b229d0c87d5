use crate::application::ports::remote_backend::RemoteBackend;
use crate::shared::clock::Clock;
use crate::shared::config::MirrorConfig;
use crate::shared::metrics::{AtomicMetric, Gauge};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct MirrorJob {
    pub table: String,
    pub row: Value,
}

enum MirrorCommand {
    Insert(MirrorJob),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct MirrorMetrics {
    delivery: AtomicMetric,
    pending: Gauge,
    dropped: AtomicU64,
}

/// リモートミラーの遅延・失敗状況
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MirrorStatus {
    pub pending: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
    pub last_success_ms: Option<u64>,
    pub last_failure_ms: Option<u64>,
}

/// ローカル書き込みをリモートへ非同期に複製するキュー
///
/// 呼び出し側をブロックせず、失敗してもローカル側は巻き戻さない。
#[derive(Clone)]
pub struct MirrorQueue {
    sender: mpsc::Sender<MirrorCommand>,
    metrics: Arc<MirrorMetrics>,
}

impl MirrorQueue {
    pub fn spawn(
        backend: Arc<dyn RemoteBackend>,
        config: &MirrorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let metrics = Arc::new(MirrorMetrics::default());
        let worker = MirrorWorker {
            backend,
            clock,
            metrics: Arc::clone(&metrics),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        };
        tokio::spawn(worker.run(receiver));
        Self { sender, metrics }
    }

    pub fn enqueue(&self, table: &str, row: Value) {
        let job = MirrorJob {
            table: table.to_string(),
            row,
        };
        self.metrics.pending.increment();
        if let Err(err) = self.sender.try_send(MirrorCommand::Insert(job)) {
            self.metrics.pending.decrement();
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            let reason = match err {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "worker stopped",
            };
            warn!(table = %table, reason, "dropping remote mirror job");
        }
    }

    /// それまでに積まれたジョブがすべて処理されるまで待つ
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(MirrorCommand::Flush(tx)).await.is_err() {
            return;
        }
        let _ = rx.await;
    }

    pub fn status(&self) -> MirrorStatus {
        let delivery = self.metrics.delivery.snapshot();
        MirrorStatus {
            pending: self.metrics.pending.get(),
            delivered: delivery.successes,
            failed: delivery.failures,
            dropped: self.metrics.dropped.load(Ordering::Relaxed),
            last_success_ms: delivery.last_success_ms,
            last_failure_ms: delivery.last_failure_ms,
        }
    }
}

struct MirrorWorker {
    backend: Arc<dyn RemoteBackend>,
    clock: Arc<dyn Clock>,
    metrics: Arc<MirrorMetrics>,
    max_retries: u32,
    backoff: Duration,
}

impl MirrorWorker {
    async fn run(self, mut receiver: mpsc::Receiver<MirrorCommand>) {
        while let Some(command) = receiver.recv().await {
            match command {
                MirrorCommand::Insert(job) => {
                    self.deliver(job).await;
                    self.metrics.pending.decrement();
                }
                MirrorCommand::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        debug!("remote mirror worker terminated");
    }

    async fn deliver(&self, job: MirrorJob) {
        let mut attempt = 0u32;
        loop {
            match self.backend.insert_row(&job.table, job.row.clone()).await {
                Ok(()) => {
                    self.metrics.delivery.record_success(self.clock.now_ms());
                    return;
                }
                Err(err) if attempt < self.max_retries => {
                    attempt += 1;
                    debug!(table = %job.table, attempt, error = %err, "retrying remote mirror");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(err) => {
                    self.metrics.delivery.record_failure(self.clock.now_ms());
                    warn!(
                        table = %job.table,
                        attempts = attempt + 1,
                        error = %err,
                        "remote mirror failed; local copy kept"
                    );
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::backend::MemoryBackend;
    use crate::shared::clock::ManualClock;
    use crate::shared::error::AppError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    struct FlakyBackend {
        inner: MemoryBackend,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl RemoteBackend for FlakyBackend {
        async fn insert_row(&self, table: &str, row: Value) -> Result<(), AppError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(AppError::Network("connection reset".into()));
            }
            self.inner.insert_row(table, row).await
        }
        async fn select_all(&self, table: &str) -> Result<Vec<Value>, AppError> {
            self.inner.select_all(table).await
        }
        async fn select_eq(&self, t: &str, c: &str, v: &str) -> Result<Vec<Value>, AppError> {
            self.inner.select_eq(t, c, v).await
        }
        async fn delete_eq(&self, t: &str, c: &str, v: &str) -> Result<u64, AppError> {
            self.inner.delete_eq(t, c, v).await
        }
        async fn call_rpc(&self, f: &str, p: Value) -> Result<Value, AppError> {
            self.inner.call_rpc(f, p).await
        }
    }

    const NOW_MS: i64 = 1_767_225_600_000;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(NOW_MS))
    }

    fn config(max_retries: u32) -> MirrorConfig {
        MirrorConfig {
            queue_capacity: 16,
            max_retries,
            retry_backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let backend = MemoryBackend::new();
        let queue = MirrorQueue::spawn(Arc::new(backend.clone()), &config(0), clock());
        queue.enqueue("logs", json!({"n": 1}));
        queue.enqueue("logs", json!({"n": 2}));
        queue.flush().await;

        assert_eq!(backend.rows("logs").await, vec![json!({"n": 1}), json!({"n": 2})]);
        let status = queue.status();
        assert_eq!(status.delivered, 2);
        assert_eq!(status.pending, 0);
        assert_eq!(status.failed, 0);
        assert_eq!(status.last_success_ms, Some(NOW_MS as u64));
        assert_eq!(status.last_failure_ms, None);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let inner = MemoryBackend::new();
        let backend = Arc::new(FlakyBackend {
            inner: inner.clone(),
            failures_left: AtomicU32::new(2),
        });
        let queue = MirrorQueue::spawn(backend, &config(3), clock());
        queue.enqueue("logs", json!({"n": 1}));
        queue.flush().await;

        assert_eq!(inner.rows("logs").await.len(), 1);
        assert_eq!(queue.status().delivered, 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let inner = MemoryBackend::new();
        let backend = Arc::new(FlakyBackend {
            inner: inner.clone(),
            failures_left: AtomicU32::new(10),
        });
        let queue = MirrorQueue::spawn(backend, &config(1), clock());
        queue.enqueue("backups", json!({"id": "b1"}));
        queue.flush().await;

        let status = queue.status();
        assert_eq!(status.failed, 1);
        assert_eq!(status.delivered, 0);
        assert_eq!(status.last_failure_ms, Some(NOW_MS as u64));
        assert_eq!(status.last_success_ms, None);
        assert!(inner.rows("backups").await.is_empty());
    }
}

//! Log storage manager.
//!
//! Every report is stored (when a database is configured) and sent to the
//! backend straight away. Reports that cannot be delivered wait in a queue
//! per log kind and MDN until the background sender retries them or they
//! outlive their retention period.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::LogTransport;
use crate::config::RetentionConfig;
use crate::database::Database;
use crate::errors::EmulatorError;
use crate::models::{Emulator, LogKind, LogReport, Mdn};

/// A report waiting to be delivered
#[derive(Debug, Clone, PartialEq)]
pub struct PendingLog {
    pub emulator: Emulator,
    pub report: LogReport,
    pub queued_at: DateTime<Utc>,
    pub retry_count: u32,
}

/// Outcome of [`LogStorageManager::store`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PendingSummary {
    pub total: usize,
    pub by_kind: BTreeMap<LogKind, usize>,
    pub oldest: Option<DateTime<Utc>>,
}

type QueueKey = (LogKind, Mdn);

pub struct LogStorageManager {
    transport: Arc<dyn LogTransport>,
    database: Option<Database>,
    retention: RetentionConfig,
    pending: Mutex<BTreeMap<QueueKey, VecDeque<PendingLog>>>,
    /// Serialises retry passes so each pass owns the front of every queue
    retry_pass: Mutex<()>,
}

impl LogStorageManager {
    pub fn new(transport: Arc<dyn LogTransport>, retention: RetentionConfig) -> Self {
        Self {
            transport,
            database: None,
            retention,
            pending: Mutex::new(BTreeMap::new()),
            retry_pass: Mutex::new(()),
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    fn retention_for(&self, kind: LogKind) -> Duration {
        match kind {
            LogKind::Gps => self.retention.gps,
            LogKind::Power => self.retention.power,
            LogKind::Geofence => self.retention.geofence,
        }
    }

    /// Record an emulator's registration, if a database is configured
    pub async fn register_emulator(&self, emulator: &Emulator) -> Result<(), EmulatorError> {
        if let Some(database) = &self.database {
            database.register_emulator(emulator).await?;
        }
        Ok(())
    }

    /// Persist and send a report, queueing it when the send fails
    pub async fn store(
        &self,
        emulator: &Emulator,
        report: LogReport,
    ) -> Result<Delivery, EmulatorError> {
        if let Some(database) = &self.database {
            database.record(&report).await?;
        }

        let kind = report.kind();
        let mdn = report.mdn();
        match self.transport.send(emulator, &report).await {
            Ok(()) => {
                info!(%mdn, %kind, records = report.record_count(), "Log sent");
                Ok(Delivery::Sent)
            }
            Err(e) if !e.is_transmission() => {
                error!(%mdn, %kind, "Log cannot be sent: {}", e);
                Err(e)
            }
            Err(e) => {
                warn!(%mdn, %kind, "Send failed, queueing for retry: {}", e);
                let entry = PendingLog {
                    emulator: emulator.clone(),
                    report,
                    queued_at: Utc::now(),
                    retry_count: 0,
                };
                self.pending
                    .lock()
                    .await
                    .entry((kind, mdn))
                    .or_default()
                    .push_back(entry);
                Ok(Delivery::Queued)
            }
        }
    }

    /// Retry every queued report, dropping the ones past retention.
    ///
    /// Entries stay queued while they are retried. Returns the number of send
    /// attempts made.
    pub async fn process_pending(&self, now: DateTime<Utc>) -> usize {
        let _pass = self.retry_pass.lock().await;
        let snapshot: Vec<(QueueKey, Vec<PendingLog>)> = self
            .pending
            .lock()
            .await
            .iter()
            .map(|(key, queue)| (*key, queue.iter().cloned().collect()))
            .collect();
        if snapshot.is_empty() {
            return 0;
        }

        let mut attempts = 0;
        let mut outcomes: Vec<(QueueKey, usize, VecDeque<PendingLog>)> =
            Vec::with_capacity(snapshot.len());

        for ((kind, mdn), entries) in snapshot {
            let retention = chrono::Duration::from_std(self.retention_for(kind))
                .unwrap_or(chrono::Duration::MAX);
            let taken = entries.len();
            let mut retained = VecDeque::new();

            for mut entry in entries {
                if now - entry.queued_at > retention {
                    info!(%mdn, %kind, queued_at = %entry.queued_at, "Dropping expired log");
                    continue;
                }

                attempts += 1;
                match self.transport.send(&entry.emulator, &entry.report).await {
                    Ok(()) => {
                        debug!(%mdn, %kind, retries = entry.retry_count, "Pending log delivered");
                    }
                    Err(e) if !e.is_transmission() => {
                        error!(%mdn, %kind, "Dropping undeliverable log: {}", e);
                    }
                    Err(e) => {
                        entry.retry_count += 1;
                        debug!(%mdn, %kind, retries = entry.retry_count, "Retry failed: {}", e);
                        retained.push_back(entry);
                    }
                }
            }
            outcomes.push(((kind, mdn), taken, retained));
        }

        // Only this pass removes entries, so the first `taken` of each queue
        // are the ones it retried; anything behind them arrived meanwhile
        let mut pending = self.pending.lock().await;
        for (key, taken, mut retained) in outcomes {
            let empty = {
                let queue = pending.entry(key).or_default();
                let newer = queue.split_off(taken.min(queue.len()));
                retained.extend(newer);
                *queue = retained;
                queue.is_empty()
            };
            if empty {
                pending.remove(&key);
            }
        }

        attempts
    }

    /// Pending logs of one MDN, ordered by kind then queue time
    pub async fn pending(&self, mdn: Mdn) -> Vec<PendingLog> {
        self.pending
            .lock()
            .await
            .iter()
            .filter(|((_, key_mdn), _)| *key_mdn == mdn)
            .flat_map(|(_, queue)| queue.iter().cloned())
            .collect()
    }

    pub async fn pending_counts(&self) -> BTreeMap<LogKind, usize> {
        let pending = self.pending.lock().await;
        let mut counts: BTreeMap<LogKind, usize> = LogKind::ALL.iter().map(|k| (*k, 0)).collect();
        for ((kind, _), queue) in pending.iter() {
            *counts.entry(*kind).or_default() += queue.len();
        }
        counts
    }

    pub async fn summary(&self) -> PendingSummary {
        let pending = self.pending.lock().await;
        let mut summary = PendingSummary {
            by_kind: LogKind::ALL.iter().map(|k| (*k, 0)).collect(),
            ..PendingSummary::default()
        };
        for ((kind, _), queue) in pending.iter() {
            summary.total += queue.len();
            *summary.by_kind.entry(*kind).or_default() += queue.len();
            let oldest = queue.iter().map(|entry| entry.queued_at).min();
            summary.oldest = match (summary.oldest, oldest) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        summary
    }

    /// Retry pending logs every `interval` after `initial_delay`, until cancelled
    pub async fn run_background_sender(
        &self,
        interval: Duration,
        initial_delay: Duration,
        token: CancellationToken,
    ) {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(initial_delay) => {}
        }

        info!("Background sender started, retrying every {:?}", interval);
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Background sender stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let attempts = self.process_pending(Utc::now()).await;
                    if attempts > 0 {
                        let remaining = self.summary().await.total;
                        info!(attempts, remaining, "Processed pending logs");
                    }
                }
            }
        }
    }
}

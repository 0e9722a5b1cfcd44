use std::fmt;
use tracing::{debug, error, info, warn};
use crate::error::Error;
use crate::snapshot::{Decoded, Snapshot};
use crate::store::Store;
use crate::types::{KeyRecord, Value};
use crate::utils::sync::Notifier;

/// Tally of a restore run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    /// Keys deleted and rewritten.
    pub restored: usize,
    /// Keys whose record held an empty container: deleted, not rewritten.
    pub skipped: usize,
    /// Keys that could not be restored, with the reason.
    pub failures: Vec<(String, String)>,
    /// The run stopped early on an interrupt.
    pub interrupted: bool,
}

impl RestoreReport {
    pub fn processed(&self) -> usize {
        self.restored + self.skipped + self.failures.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn fail(&mut self, err: Error) {
        let (key, reason) = match err {
            Error::PerKeyWrite { key, reason } => (key, reason),
            Error::MalformedSnapshot { key, reason } => (key, format!("malformed entry: {}", reason)),
            err => (String::new(), err.to_string()),
        };
        warn!(%key, %reason, "restore failed for key");
        self.failures.push((key, reason));
    }
}

impl fmt::Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "processed {}, restored {}, skipped {}, failed {}",
            self.processed(),
            self.restored,
            self.skipped,
            self.failed()
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

enum Outcome {
    Restored,
    Emptied,
}

/// Replays records against a target store. Each key is deleted first, so a
/// restore overwrites rather than merges.
pub struct Restorer<'a, S: Store + ?Sized> {
    store: &'a mut S,
    shutdown: Option<Notifier>,
}

impl<'a, S: Store + ?Sized> Restorer<'a, S> {
    pub fn new(store: &'a mut S) -> Restorer<'a, S> {
        Restorer { store, shutdown: None }
    }

    /// Stop before the next key once `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: Notifier) -> Restorer<'a, S> {
        self.shutdown = Some(shutdown);
        self
    }

    /// Restore every record in order. Per-key failures are recorded in the
    /// report; only a lost connection or a timeout ends the run with an
    /// error.
    pub async fn restore(&mut self, snapshot: &Snapshot) -> crate::Result<RestoreReport> {
        let mut report = RestoreReport::default();
        self.run(snapshot, &mut report).await?;
        Ok(report)
    }

    /// Like `restore`, counting each entry the decoder rejected as a failure.
    pub async fn restore_decoded(&mut self, decoded: Decoded) -> crate::Result<RestoreReport> {
        let mut report = RestoreReport::default();
        for err in decoded.rejected {
            report.fail(err);
        }
        self.run(&decoded.snapshot, &mut report).await?;
        Ok(report)
    }

    async fn run(&mut self, snapshot: &Snapshot, report: &mut RestoreReport) -> crate::Result<()> {
        info!(keys = snapshot.len(), "restoring snapshot");
        for record in snapshot.iter() {
            if self.shutdown.as_ref().map_or(false, Notifier::is_notified) {
                warn!("interrupted, stopping restore");
                report.interrupted = true;
                break;
            }
            match self.restore_record(record).await {
                Ok(Outcome::Restored) => report.restored += 1,
                Ok(Outcome::Emptied) => report.skipped += 1,
                Err(e) if e.is_fatal() => {
                    error!(key = %record.key, error = %e, partial = %report, "restore aborted");
                    return Err(e);
                }
                Err(e) => report.fail(Error::PerKeyWrite {
                    key: record.key.clone(),
                    reason: e.to_string(),
                }),
            }
        }
        info!(%report, "restore finished");
        Ok(())
    }

    async fn restore_record(&mut self, record: &KeyRecord) -> crate::Result<Outcome> {
        let key = record.key.as_str();
        self.store.del(key).await?;
        if record.value.is_empty() {
            debug!(%key, "empty container, key left absent");
            return Ok(Outcome::Emptied);
        }
        match &record.value {
            Value::String(value) => self.store.set(key, &value.to_store()?).await?,
            Value::Hash(fields) => self.store.hset(key, fields).await?,
            Value::List(items) => self.store.rpush(key, items).await?,
            Value::Set(members) => self.store.sadd(key, members).await?,
            Value::SortedSet(members) => self.store.zadd(key, members).await?,
        }
        if let Some(ttl) = record.expiry() {
            self.store.expire(key, ttl.as_secs()).await?;
        }
        debug!(%key, tipo = %record.type_tag(), ttl = record.ttl_seconds, "restored");
        Ok(Outcome::Restored)
    }
}

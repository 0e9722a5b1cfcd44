use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Local};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use crate::enumerator::KeyEnumerator;
use crate::error::Error;
use crate::resolver;
use crate::snapshot::Snapshot;
use crate::store::Store;
use crate::utils::sync::Notifier;

pub const FILE_PREFIX: &str = "redis_backup_";
pub const FILE_EXTENSION: &str = "json";

/// Tally of a backup run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupReport {
    /// Keys written to the snapshot.
    pub captured: usize,
    /// Keys that vanished between listing and reading.
    pub vanished: usize,
    /// Keys of a type the snapshot cannot carry, with that type.
    pub unsupported: Vec<(String, String)>,
    /// Keys that could not be read, with the reason.
    pub failures: Vec<(String, String)>,
    pub interrupted: bool,
}

impl BackupReport {
    pub fn skipped(&self) -> usize {
        self.vanished + self.unsupported.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn processed(&self) -> usize {
        self.captured + self.skipped() + self.failed()
    }
}

impl fmt::Display for BackupReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "processed {}, captured {}, skipped {}, failed {}",
            self.processed(),
            self.captured,
            self.skipped(),
            self.failed()
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

/// Captures the keys matching a pattern into a `Snapshot`.
pub struct Backup<'a, S: Store + ?Sized> {
    store: &'a mut S,
    enumerator: KeyEnumerator,
    shutdown: Option<Notifier>,
}

impl<'a, S: Store + ?Sized> Backup<'a, S> {
    pub fn new(store: &'a mut S, enumerator: KeyEnumerator) -> Backup<'a, S> {
        Backup {
            store,
            enumerator,
            shutdown: None,
        }
    }

    /// Stop enumerating once `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: Notifier) -> Backup<'a, S> {
        self.shutdown = Some(shutdown);
        self
    }

    /// Walk the matching keys batch by batch and resolve each one. Per-key
    /// failures are recorded; a lost connection or a timeout is returned.
    pub async fn capture(&mut self) -> crate::Result<(Snapshot, BackupReport)> {
        let mut snapshot = Snapshot::new();
        let mut report = BackupReport::default();
        let mut seen = HashSet::new();
        info!(pattern = %self.enumerator.pattern(), "starting backup");

        let mut scan = self.enumerator.scan();
        'scan: while let Some(keys) = scan.next_batch(&mut *self.store).await? {
            for key in keys {
                if self.shutdown.as_ref().map_or(false, Notifier::is_notified) {
                    warn!("interrupted, stopping backup");
                    report.interrupted = true;
                    break 'scan;
                }
                // a scan may report a key twice, resolve it once
                if !seen.insert(key.clone()) {
                    continue;
                }
                match resolver::resolve(&mut *self.store, &key).await {
                    Ok(Some(record)) => {
                        debug!(%key, tipo = %record.type_tag(), "captured");
                        snapshot.insert(record);
                        report.captured += 1;
                    }
                    Ok(None) => report.vanished += 1,
                    Err(Error::UnsupportedType { key, type_name }) => {
                        warn!(%key, %type_name, "skipping key of unsupported type");
                        report.unsupported.push((key, type_name));
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(%key, error = %e, "failed to read key");
                        report.failures.push((key, e.to_string()));
                    }
                }
            }
        }

        info!(%report, "backup captured");
        Ok((snapshot, report))
    }
}

/// Name of the snapshot file taken at `at`.
pub fn file_name(at: DateTime<Local>) -> String {
    format!("{}{}.{}", FILE_PREFIX, at.format("%Y%m%d_%H%M%S"), FILE_EXTENSION)
}

/// Write `snapshot` into `dir` (created when missing) as a timestamped file.
/// The file is written under a temporary name and renamed into place.
pub async fn write_snapshot(snapshot: &Snapshot, dir: &Path, at: DateTime<Local>) -> crate::Result<PathBuf> {
    fs::create_dir_all(dir).await?;
    let path = dir.join(file_name(at));
    let tmp = path.with_extension("tmp");
    let data = snapshot.encode()?;
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(&data).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp, &path).await?;
    info!(path = %path.display(), keys = snapshot.len(), bytes = data.len(), "snapshot written");
    Ok(path)
}

pub async fn read_snapshot(path: &Path) -> crate::Result<Vec<u8>> {
    Ok(fs::read(path).await?)
}

/// Keep the newest `keep` snapshot files in `dir` and delete the rest.
/// Returns the deleted paths.
pub async fn prune(dir: &Path, keep: usize) -> crate::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut snapshots = vec![];
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(FILE_PREFIX) && name.ends_with(&format!(".{}", FILE_EXTENSION)) {
            snapshots.push(entry.path());
        }
    }
    // timestamps in the names sort chronologically
    snapshots.sort();
    let excess = snapshots.len().saturating_sub(keep);
    let mut removed = Vec::with_capacity(excess);
    for path in snapshots.into_iter().take(excess) {
        fs::remove_file(&path).await?;
        info!(path = %path.display(), "old snapshot removed");
        removed.push(path);
    }
    Ok(removed)
}

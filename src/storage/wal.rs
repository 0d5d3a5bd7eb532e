//! Write-ahead log.
//!
//! One writer task owns the current log file and consumes [`WalCommand`]s
//! from an unbounded queue, in arrival order. [`Wal::append`] only enqueues:
//! it returns before the bytes reach the file and is not a durability
//! barrier. Use [`Wal::flush`] to wait for everything enqueued so far to be
//! written and synced, and [`Wal::close`] to drain, seal and close the file.
//!
//! File layout, one file per generation under the WAL directory:
//!
//! ```text
//! <generation>.wal:
//!   -WAL <generation>\r\n
//!   <raw command bytes>\r\n
//!   ...
//!   -CLOSED\r\n
//! ```

use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::fs::File;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::constants::CRLF;
use crate::constants::WAL_CLOSED_MARKER;
use crate::constants::WAL_FILE_EXTENSION;
use crate::constants::WAL_HEADER_MARKER;
use crate::metrics::WAL_RECORDS_TOTAL;
use crate::protocol::decode;
use crate::protocol::Command;
use crate::protocol::Decoded;
use crate::utils::file_io::create_dir_if_not_exist;
use crate::utils::file_io::numbered_files;
use crate::Result;
use crate::StorageError;

#[derive(Debug)]
pub enum WalCommand {
    /// Raw command bytes to append as one record
    Append(Vec<u8>),
    /// Barrier: acknowledged once every earlier record is written and synced
    Flush(oneshot::Sender<std::result::Result<(), StorageError>>),
}

/// Running counters maintained by the writer task.
#[derive(Debug, Default)]
pub struct WalStats {
    bytes_written: AtomicU64,
    write_ops: AtomicU64,
}

impl WalStats {
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn write_ops(&self) -> u64 {
        self.write_ops.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct Wal {
    generation: u64,
    path: PathBuf,
    sender: Mutex<Option<mpsc::UnboundedSender<WalCommand>>>,
    stats: Arc<WalStats>,
    terminated: watch::Receiver<bool>,
}

impl Wal {
    /// Opens a new generation under `dir` and starts the writer task.
    ///
    /// The generation is one past the highest existing `<n>.wal` file, or 0
    /// when the directory holds none.
    pub async fn open(dir: &Path) -> Result<Self> {
        create_dir_if_not_exist(dir)?;
        let generation = numbered_files(dir, WAL_FILE_EXTENSION)?
            .last()
            .map(|(n, _)| n + 1)
            .unwrap_or(0);
        let path = dir.join(format!("{}.{}", generation, WAL_FILE_EXTENSION));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::PathError {
                path: path.clone(),
                source: e,
            })?;
        let header = format!("{} {}\r\n", WAL_HEADER_MARKER, generation);
        file.write_all(header.as_bytes()).await.map_err(StorageError::Io)?;
        file.flush().await.map_err(StorageError::Io)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let (terminated_tx, terminated_rx) = watch::channel(false);
        let stats = Arc::new(WalStats::default());

        tokio::spawn(Self::run_writer(
            file,
            path.clone(),
            receiver,
            stats.clone(),
            terminated_tx,
        ));
        info!(?path, generation, "WAL writer started");

        Ok(Self {
            generation,
            path,
            sender: Mutex::new(Some(sender)),
            stats,
            terminated: terminated_rx,
        })
    }

    async fn run_writer(
        mut file: File,
        path: PathBuf,
        mut receiver: mpsc::UnboundedReceiver<WalCommand>,
        stats: Arc<WalStats>,
        terminated: watch::Sender<bool>,
    ) {
        while let Some(cmd) = receiver.recv().await {
            match cmd {
                WalCommand::Append(mut record) => {
                    record.extend_from_slice(CRLF);
                    if let Err(e) = file.write_all(&record).await {
                        error!(?path, "WAL append failed: {:?}", e);
                        continue;
                    }
                    stats.bytes_written.fetch_add(record.len() as u64, Ordering::Relaxed);
                    stats.write_ops.fetch_add(1, Ordering::Relaxed);
                    WAL_RECORDS_TOTAL.inc();
                    trace!(bytes = record.len(), "WAL record appended");
                }
                WalCommand::Flush(ack) => {
                    let result = sync(&mut file).await;
                    if ack.send(result).is_err() {
                        warn!("WAL flush ack dropped - caller went away");
                    }
                }
            }
        }

        // Every sender is gone: seal the file.
        if let Err(e) = file.write_all(WAL_CLOSED_MARKER).await {
            error!(?path, "Failed to write WAL closing marker: {:?}", e);
        }
        if let Err(e) = sync(&mut file).await {
            error!(?path, "Failed to sync WAL on close: {:?}", e);
        }
        info!(?path, "WAL writer exited");
        let _ = terminated.send(true);
    }

    /// Enqueues `record` for the writer task and returns immediately.
    pub fn append(
        &self,
        record: &[u8],
    ) -> std::result::Result<(), StorageError> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(StorageError::WalClosed)?;
        sender
            .send(WalCommand::Append(record.to_vec()))
            .map_err(|_| StorageError::WalClosed)
    }

    /// Waits until every record appended before this call is on disk.
    pub async fn flush(&self) -> std::result::Result<(), StorageError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        {
            let guard = self.sender.lock();
            let sender = guard.as_ref().ok_or(StorageError::WalClosed)?;
            sender
                .send(WalCommand::Flush(ack_tx))
                .map_err(|_| StorageError::WalClosed)?;
        }
        ack_rx.await.map_err(|_| StorageError::WalClosed)?
    }

    /// Stops accepting records, then waits for the writer to drain the
    /// queue, write the closing marker and close the file. Idempotent.
    pub async fn close(&self) {
        let sender = self.sender.lock().take();
        drop(sender);

        let mut terminated = self.terminated.clone();
        if terminated.wait_for(|done| *done).await.is_err() {
            warn!("WAL writer ended without signalling termination");
        }
        debug!(path = ?self.path, "WAL closed");
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the log file on disk; 0 if it cannot be read.
    pub fn file_size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> &WalStats {
        &self.stats
    }
}

async fn sync(file: &mut File) -> std::result::Result<(), StorageError> {
    file.flush().await?;
    file.sync_data().await?;
    Ok(())
}

/// Outcome of replaying the log directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub files: usize,
    pub records: usize,
    /// Files whose tail could not be decoded
    pub truncated_files: usize,
}

/// Feeds every record of every `.wal` file under `dir`, in generation
/// order, to `apply`. Marker lines and blank lines are skipped. A record
/// that is cut short or cannot be decoded ends replay of that file.
pub async fn replay<F>(
    dir: &Path,
    mut apply: F,
) -> Result<ReplaySummary>
where
    F: FnMut(Command),
{
    let mut summary = ReplaySummary::default();
    if !dir.exists() {
        return Ok(summary);
    }

    for (generation, path) in numbered_files(dir, WAL_FILE_EXTENSION)? {
        let data = tokio::fs::read(&path).await.map_err(|e| StorageError::PathError {
            path: path.clone(),
            source: e,
        })?;
        summary.files += 1;

        match replay_file(&path, &data, &mut apply) {
            Ok(records) => {
                debug!(generation, records, "WAL file replayed");
                summary.records += records;
            }
            Err((records, e)) => {
                warn!(generation, records, "WAL replay stopped early: {}", e);
                summary.records += records;
                summary.truncated_files += 1;
            }
        }
    }

    info!(
        files = summary.files,
        records = summary.records,
        "WAL replay finished"
    );
    Ok(summary)
}

fn replay_file<F>(
    path: &Path,
    data: &[u8],
    apply: &mut F,
) -> std::result::Result<usize, (usize, StorageError)>
where
    F: FnMut(Command),
{
    let mut cursor = 0;
    let mut records = 0;
    let corrupt = |offset: usize| StorageError::CorruptRecord {
        file: path.to_path_buf(),
        offset,
    };

    while cursor < data.len() {
        let rest = &data[cursor..];
        match rest[0] {
            b'\r' | b'\n' => {
                cursor += 1;
                continue;
            }
            b'-' => {
                match rest.iter().position(|b| *b == b'\n') {
                    Some(end) => cursor += end + 1,
                    // unterminated marker at the tail
                    None => return Err((records, corrupt(cursor))),
                }
                continue;
            }
            _ => {}
        }

        match decode(rest, true) {
            Ok(Decoded::Complete(cmd, consumed)) => {
                apply(cmd);
                records += 1;
                cursor += consumed;
            }
            Ok(Decoded::Partial(_)) | Ok(Decoded::Incomplete) | Err(_) => {
                return Err((records, corrupt(cursor)));
            }
        }
    }
    Ok(records)
}

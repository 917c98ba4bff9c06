//! Batched delimited-file sink

use crate::record::{format_row, DelimitedRecord};
use crate::StorageError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Directory the output file is created in
    pub directory: PathBuf,
    /// File stem, e.g. `results` for `results.csv`
    pub name: String,
    pub extension: String,
    /// Records buffered before a write is forced
    pub batch_size: usize,
    /// Maximum age of buffered records
    pub auto_flush_interval: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("results"),
            name: "results".to_string(),
            extension: "csv".to_string(),
            batch_size: 100,
            auto_flush_interval: Duration::from_secs(30),
        }
    }
}

/// Point-in-time view of the batch buffer
#[derive(Debug, Clone, Serialize)]
pub struct BatchStatus {
    /// Records currently buffered
    pub buffered: usize,
    pub max_batch_size: usize,
    pub time_since_last_flush: Duration,
    pub auto_flush_interval: Duration,
    /// Rows written to disk so far
    pub rows_written: u64,
    /// Last write failure, cleared by the next successful write
    pub last_error: Option<String>,
}

struct BatchState<R> {
    batch: Vec<R>,
    last_flush: Instant,
    header_written: bool,
    rows_written: u64,
    last_error: Option<String>,
}

/// Buffers records and appends them to a file reserved at construction
pub struct BatchedSink<R> {
    path: PathBuf,
    batch_size: usize,
    auto_flush_interval: Duration,
    state: Mutex<BatchState<R>>,
}

impl<R: DelimitedRecord> BatchedSink<R> {
    /// Reserve a collision-free output file and create the sink.
    ///
    /// `name.csv` is taken first, then `name(1).csv`, `name(2).csv` and so on.
    /// The file is created empty so no other sink can claim the same name.
    pub fn create(config: SinkConfig) -> Result<Self, StorageError> {
        if config.batch_size == 0 {
            return Err(StorageError::InvalidConfig(
                "batch size must be greater than zero".to_string(),
            ));
        }

        fs::create_dir_all(&config.directory).map_err(|source| StorageError::Io {
            path: config.directory.display().to_string(),
            source,
        })?;

        let path = reserve_path(&config.directory, &config.name, &config.extension)?;
        info!(
            "Creating batched sink at {} with batch size {}",
            path.display(),
            config.batch_size
        );

        Ok(Self {
            path,
            batch_size: config.batch_size,
            auto_flush_interval: config.auto_flush_interval,
            state: Mutex::new(BatchState {
                batch: Vec::with_capacity(config.batch_size),
                last_flush: Instant::now(),
                header_written: false,
                rows_written: 0,
                last_error: None,
            }),
        })
    }

    /// Path of the reserved output file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer a record, writing the batch out once it is full or stale.
    ///
    /// Returns the number of records written by this call.
    pub fn add_to_batch(&self, record: R) -> Result<usize, StorageError> {
        let mut state = self.lock()?;
        state.batch.push(record);

        if state.batch.len() >= self.batch_size
            || state.last_flush.elapsed() >= self.auto_flush_interval
        {
            return self.write_batch(&mut state);
        }
        Ok(0)
    }

    /// Write every buffered record now
    pub fn flush_batch(&self) -> Result<usize, StorageError> {
        let mut state = self.lock()?;
        self.write_batch(&mut state)
    }

    /// Write the buffer if it is non-empty and older than the auto-flush interval
    pub fn flush_if_due(&self) -> Result<usize, StorageError> {
        let mut state = self.lock()?;
        if state.batch.is_empty() || state.last_flush.elapsed() < self.auto_flush_interval {
            return Ok(0);
        }
        debug!("Auto-flushing {} buffered records", state.batch.len());
        self.write_batch(&mut state)
    }

    pub fn status(&self) -> Result<BatchStatus, StorageError> {
        let state = self.lock()?;
        Ok(BatchStatus {
            buffered: state.batch.len(),
            max_batch_size: self.batch_size,
            time_since_last_flush: state.last_flush.elapsed(),
            auto_flush_interval: self.auto_flush_interval,
            rows_written: state.rows_written,
            last_error: state.last_error.clone(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, BatchState<R>>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    /// Caller holds the lock. The batch is only cleared once the write succeeds.
    fn write_batch(&self, state: &mut BatchState<R>) -> Result<usize, StorageError> {
        if state.batch.is_empty() {
            state.last_flush = Instant::now();
            return Ok(0);
        }

        let mut chunk = String::new();
        if !state.header_written {
            chunk.push_str(&format_row(R::header()));
        }
        for record in &state.batch {
            chunk.push_str(&format_row(&record.fields()));
        }

        let result = append_with_retry(
            || OpenOptions::new().append(true).open(&self.path),
            chunk.as_bytes(),
            &self.path,
        );

        match result {
            Ok(()) => {
                let written = state.batch.len();
                state.batch.clear();
                state.last_flush = Instant::now();
                state.header_written = true;
                state.rows_written += written as u64;
                state.last_error = None;
                debug!("Flushed {} records to {}", written, self.path.display());
                Ok(written)
            }
            Err(e) => {
                error!("Write to {} failed after retry: {}", self.path.display(), e);
                state.last_error = Some(e.to_string());
                Err(StorageError::WriteFailed {
                    message: e.to_string(),
                    buffered: state.batch.len(),
                })
            }
        }
    }

}

/// Append target that can undo a partial write
trait Rollback: Write {
    fn end(&mut self) -> io::Result<u64>;

    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Rollback for File {
    fn end(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Write all of `chunk` or cut the target back to its previous length
fn append_whole<T: Rollback>(target: &mut T, chunk: &[u8]) -> io::Result<()> {
    let start = target.end()?;
    let result = target.write_all(chunk).and_then(|()| target.flush());
    if let Err(e) = result {
        if let Err(undo) = target.truncate(start) {
            error!("Could not roll back partial write to {} bytes: {}", start, undo);
        }
        return Err(e);
    }
    Ok(())
}

/// One attempt plus one retry, each on a freshly opened target
fn append_with_retry<T, F>(mut open: F, chunk: &[u8], path: &Path) -> io::Result<()>
where
    T: Rollback,
    F: FnMut() -> io::Result<T>,
{
    let mut attempt = || open().and_then(|mut target| append_whole(&mut target, chunk));
    match attempt() {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!("Write to {} failed, retrying: {}", path.display(), e);
            attempt()
        }
    }
}

fn reserve_path(directory: &Path, name: &str, extension: &str) -> Result<PathBuf, StorageError> {
    let mut index = 0u32;
    loop {
        let file_name = if index == 0 {
            format!("{}.{}", name, extension)
        } else {
            format!("{}({}).{}", name, index, extension)
        };
        let candidate = directory.join(file_name);

        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => index += 1,
            Err(source) => {
                return Err(StorageError::Io {
                    path: candidate.display().to_string(),
                    source,
                })
            }
        }
    }
}

/// Periodically write stale batches until `shutdown` flips to `true`.
///
/// The final flush on shutdown is left to the owner of the sink.
pub fn spawn_auto_flush<R>(
    sink: Arc<BatchedSink<R>>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    R: DelimitedRecord + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // File I/O under the batch mutex stays off the async workers
                    let due = sink.clone();
                    match tokio::task::spawn_blocking(move || due.flush_if_due()).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!("Auto-flush failed: {}", e),
                        Err(e) => warn!("Auto-flush task panicked: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Auto-flush task stopping");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    #[derive(Debug, Clone)]
    struct Row {
        frame: u64,
        value: Option<f64>,
    }

    impl DelimitedRecord for Row {
        fn header() -> &'static [&'static str] {
            &["frame", "value"]
        }

        fn fields(&self) -> Vec<String> {
            vec![
                self.frame.to_string(),
                self.value.map(|v| v.to_string()).unwrap_or_default(),
            ]
        }
    }

    fn config(dir: &TempDir, batch_size: usize) -> SinkConfig {
        SinkConfig {
            directory: dir.path().to_path_buf(),
            name: "results".to_string(),
            batch_size,
            ..Default::default()
        }
    }

    fn row(frame: u64) -> Row {
        Row { frame, value: Some(0.5) }
    }

    #[test]
    fn test_full_batch_is_flushed() {
        let dir = TempDir::new().unwrap();
        let sink = BatchedSink::create(config(&dir, 5)).unwrap();

        for i in 0..4 {
            assert_eq!(sink.add_to_batch(row(i)).unwrap(), 0);
        }
        assert_eq!(sink.status().unwrap().buffered, 4);
        assert_eq!(fs::read_to_string(sink.path()).unwrap(), "");

        assert_eq!(sink.add_to_batch(row(4)).unwrap(), 5);
        assert_eq!(sink.status().unwrap().buffered, 0);

        let contents = fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "frame,value");
        assert_eq!(lines[5], "4,0.5");
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let sink = BatchedSink::create(config(&dir, 2)).unwrap();
        for i in 0..4 {
            sink.add_to_batch(row(i)).unwrap();
        }

        let contents = fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents.matches("frame,value").count(), 1);
        assert_eq!(contents.lines().count(), 5);
    }

    #[test]
    fn test_absent_value_is_empty_cell() {
        let dir = TempDir::new().unwrap();
        let sink = BatchedSink::create(config(&dir, 10)).unwrap();
        sink.add_to_batch(Row { frame: 7, value: None }).unwrap();
        sink.flush_batch().unwrap();

        let contents = fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents.lines().nth(1), Some("7,"));
    }

    #[test]
    fn test_colliding_names_get_suffix() {
        let dir = TempDir::new().unwrap();
        let first: BatchedSink<Row> = BatchedSink::create(config(&dir, 10)).unwrap();
        let second: BatchedSink<Row> = BatchedSink::create(config(&dir, 10)).unwrap();
        let third: BatchedSink<Row> = BatchedSink::create(config(&dir, 10)).unwrap();

        assert_eq!(first.path(), dir.path().join("results.csv"));
        assert_eq!(second.path(), dir.path().join("results(1).csv"));
        assert_eq!(third.path(), dir.path().join("results(2).csv"));
    }

    #[test]
    fn test_stale_batch_flushed_on_add() {
        let dir = TempDir::new().unwrap();
        let sink = BatchedSink::create(SinkConfig {
            auto_flush_interval: Duration::ZERO,
            ..config(&dir, 100)
        })
        .unwrap();

        assert_eq!(sink.add_to_batch(row(0)).unwrap(), 1);
    }

    #[test]
    fn test_flush_if_due_respects_interval() {
        let dir = TempDir::new().unwrap();
        let sink = BatchedSink::create(config(&dir, 100)).unwrap();
        sink.add_to_batch(row(0)).unwrap();

        assert_eq!(sink.flush_if_due().unwrap(), 0);
        assert_eq!(sink.flush_batch().unwrap(), 1);
        assert_eq!(sink.status().unwrap().rows_written, 1);
    }

    #[test]
    fn test_failed_write_keeps_batch() {
        let dir = TempDir::new().unwrap();
        let sink = BatchedSink::create(config(&dir, 100)).unwrap();
        sink.add_to_batch(row(0)).unwrap();
        sink.add_to_batch(row(1)).unwrap();

        fs::remove_file(sink.path()).unwrap();
        let result = sink.flush_batch();
        assert!(matches!(result, Err(StorageError::WriteFailed { buffered: 2, .. })));

        let status = sink.status().unwrap();
        assert_eq!(status.buffered, 2);
        assert!(status.last_error.is_some());
    }

    #[test]
    fn test_flush_after_failure_writes_each_row_once() {
        let dir = TempDir::new().unwrap();
        let sink = BatchedSink::create(config(&dir, 100)).unwrap();
        sink.add_to_batch(row(0)).unwrap();
        sink.add_to_batch(row(1)).unwrap();

        fs::remove_file(sink.path()).unwrap();
        assert!(sink.flush_batch().is_err());

        fs::File::create(sink.path()).unwrap();
        sink.add_to_batch(row(2)).unwrap();
        assert_eq!(sink.flush_batch().unwrap(), 3);

        let contents = fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents, "frame,value\n0,0.5\n1,0.5\n2,0.5\n");
        assert!(sink.status().unwrap().last_error.is_none());
    }

    /// In-memory file that accepts `budget` bytes and then fails, for the
    /// first `failures` opens
    #[derive(Default)]
    struct Disk {
        bytes: Vec<u8>,
        budget: usize,
        failures: usize,
        opens: usize,
    }

    struct Handle {
        disk: Rc<RefCell<Disk>>,
        remaining: Option<usize>,
    }

    fn open(disk: &Rc<RefCell<Disk>>) -> io::Result<Handle> {
        let mut state = disk.borrow_mut();
        state.opens += 1;
        let remaining = if state.failures > 0 {
            state.failures -= 1;
            Some(state.budget)
        } else {
            None
        };
        Ok(Handle {
            disk: disk.clone(),
            remaining,
        })
    }

    impl Write for Handle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let len = match self.remaining {
                Some(0) => return Err(io::Error::new(ErrorKind::Other, "no space left")),
                Some(remaining) => {
                    let len = buf.len().min(remaining);
                    self.remaining = Some(remaining - len);
                    len
                }
                None => buf.len(),
            };
            self.disk.borrow_mut().bytes.extend_from_slice(&buf[..len]);
            Ok(len)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Rollback for Handle {
        fn end(&mut self) -> io::Result<u64> {
            Ok(self.disk.borrow().bytes.len() as u64)
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.disk.borrow_mut().bytes.truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn test_retry_recovers_from_torn_write() {
        let disk = Rc::new(RefCell::new(Disk {
            bytes: b"frame,value\n0,0.5\n".to_vec(),
            budget: 6,
            failures: 1,
            ..Default::default()
        }));
        let chunk = b"1,0.5\n2,0.5\n3,0.5\n";

        append_with_retry(|| open(&disk), chunk, Path::new("memory.csv")).unwrap();

        let disk = disk.borrow();
        assert_eq!(disk.opens, 2);
        assert_eq!(
            String::from_utf8_lossy(&disk.bytes),
            "frame,value\n0,0.5\n1,0.5\n2,0.5\n3,0.5\n"
        );
    }

    #[test]
    fn test_failed_retry_leaves_file_untouched() {
        let disk = Rc::new(RefCell::new(Disk {
            bytes: b"frame,value\n".to_vec(),
            budget: 4,
            failures: 2,
            ..Default::default()
        }));

        let result = append_with_retry(|| open(&disk), b"1,0.5\n2,0.5\n", Path::new("memory.csv"));
        assert!(result.is_err());

        let disk = disk.borrow();
        assert_eq!(disk.opens, 2);
        assert_eq!(disk.bytes, b"frame,value\n");
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let dir = TempDir::new().unwrap();
        let result: Result<BatchedSink<Row>, _> = BatchedSink::create(config(&dir, 0));
        assert!(matches!(result, Err(StorageError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_auto_flush_task_writes_stale_batch() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(
            BatchedSink::create(SinkConfig {
                auto_flush_interval: Duration::from_millis(20),
                ..config(&dir, 100)
            })
            .unwrap(),
        );
        // Flushes on add only if already stale, so buffer first
        sink.add_to_batch(row(0)).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_auto_flush(sink.clone(), Duration::from_millis(10), shutdown_rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(sink.status().unwrap().buffered, 0);
        assert_eq!(fs::read_to_string(sink.path()).unwrap().lines().count(), 2);
    }
}

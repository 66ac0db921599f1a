//! Append-only result sinks
//!
//! One line per completed trial plus phase-boundary markers. Durability is
//! best-effort: the session logs write failures and carries on, and in-memory
//! results are never touched by a sink.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Append-only line sink
pub trait ResultSink: Send {
    fn append(&mut self, line: &str) -> Result<()>;
}

/// Appends lines to a file, flushing after each one
pub struct FileResultSink {
    path: PathBuf,
    file: File,
}

impl FileResultSink {
    /// Open `path` for appending, creating parent directories as needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for FileResultSink {
    fn append(&mut self, line: &str) -> Result<()> {
        writeln!(self.file, "{}", line)
            .and_then(|_| self.file.flush())
            .map_err(|e| Error::Sink(format!("{}: {}", self.path.display(), e)))
    }
}

/// In-memory sink; clones share the same line buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ResultSink for MemorySink {
    fn append(&mut self, line: &str) -> Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
        Ok(())
    }
}

/// Moves writes of an inner sink onto a dedicated thread
///
/// `append` only enqueues, so a slow disk never delays trial presentation.
/// Failures of the inner sink are logged on the writer thread.
pub struct BackgroundSink {
    tx: Option<mpsc::UnboundedSender<String>>,
    thread: Option<JoinHandle<()>>,
}

impl BackgroundSink {
    pub fn spawn<S: ResultSink + 'static>(inner: S) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name("toneset-sink".to_string())
            .spawn(move || Self::writer_loop(inner, rx))?;
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    fn writer_loop<S: ResultSink>(mut inner: S, mut rx: mpsc::UnboundedReceiver<String>) {
        debug!("Result sink writer started");
        while let Some(line) = rx.blocking_recv() {
            if let Err(e) = inner.append(&line) {
                warn!("Dropping result line after sink failure: {}", e);
            }
        }
        debug!("Result sink writer stopped");
    }

    /// Flush every queued line and stop the writer thread
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender ends the writer loop once the queue drains
        self.tx.take();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Result sink writer thread panicked");
            }
        }
    }
}

impl ResultSink for BackgroundSink {
    fn append(&mut self, line: &str) -> Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(line.to_string())
                .map_err(|_| Error::Sink("background writer has stopped".to_string())),
            None => Err(Error::Sink("background writer is closed".to_string())),
        }
    }
}

impl Drop for BackgroundSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

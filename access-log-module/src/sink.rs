// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Destinations for log lines

use async_trait::async_trait;
use log::{error, trace};
use std::fmt::Debug;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::AccessLogError;

/// Default size of the in-memory buffer of [`DurableSink`]
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

const CHANNEL_CAPACITY: usize = 100;

/// A destination accepting complete log lines
///
/// Each call to [`write_line`](LogSink::write_line) is one unit: concurrent callers never see
/// their lines interleaved.
#[async_trait]
pub trait LogSink: Debug + Send + Sync {
    /// Writes a complete line, including the trailing newline.
    async fn write_line(&self, line: Vec<u8>) -> Result<(), AccessLogError>;

    /// Makes sure all data written so far reached the underlying target.
    async fn flush(&self) -> Result<(), AccessLogError>;
}

/// A sink writing lines to an arbitrary [`Write`] implementation such as standard output
///
/// Writes are serialized with a mutex, no buffering takes place beyond what the writer does
/// itself.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    /// Creates a new sink around `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn with_writer<R>(
        &self,
        f: impl FnOnce(&mut W) -> std::io::Result<R>,
    ) -> Result<R, AccessLogError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("log writer lock poisoned"))?;
        Ok(f(&mut *writer)?)
    }
}

#[async_trait]
impl<W: Write + Debug + Send> LogSink for WriterSink<W> {
    async fn write_line(&self, line: Vec<u8>) -> Result<(), AccessLogError> {
        self.with_writer(|writer| writer.write_all(&line))
    }

    async fn flush(&self) -> Result<(), AccessLogError> {
        self.with_writer(|writer| writer.flush())
    }
}

#[derive(Debug)]
pub(crate) enum WriterMessage {
    Line(Vec<u8>),
    Flush(oneshot::Sender<std::io::Result<()>>),
    Reopen,
}

fn open_file(path: &Path) -> Result<File, AccessLogError> {
    File::options()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|source| AccessLogError::Open {
            path: path.to_owned(),
            source,
        })
}

async fn log_writer(
    path: PathBuf,
    mut writer: BufWriter<File>,
    mut receiver: Receiver<WriterMessage>,
) {
    while let Some(message) = receiver.recv().await {
        match message {
            WriterMessage::Line(line) => {
                if let Err(err) = writer.write_all(&line) {
                    error!("Failed writing to log file {}: {err}", path.display());
                }
            }
            WriterMessage::Flush(done) => {
                let _ = done.send(writer.flush());
            }
            WriterMessage::Reopen => {
                if let Err(err) = writer.flush() {
                    error!("Failed flushing log file {}: {err}", path.display());
                }
                match open_file(&path) {
                    Ok(file) => {
                        trace!("Reopened log file {}", path.display());
                        writer = BufWriter::with_capacity(writer.capacity(), file);
                    }
                    Err(err) => error!("{err}, continuing with the previous file"),
                }
            }
        }
    }

    // All handles are gone
    if let Err(err) = writer.flush() {
        error!("Failed flushing log file {}: {err}", path.display());
    }
}

/// Opens the file and spawns the task writing to it. The task ends after all senders are gone
/// and the remaining data has been flushed.
pub(crate) fn start_writer(
    path: &Path,
    buffer_size: usize,
) -> Result<(Sender<WriterMessage>, JoinHandle<()>), AccessLogError> {
    let file = open_file(path)?;
    let (sender, receiver) = channel(CHANNEL_CAPACITY);
    let writer = BufWriter::with_capacity(buffer_size, file);
    let task = tokio::spawn(log_writer(path.to_owned(), writer, receiver));
    Ok((sender, task))
}

pub(crate) async fn flush_writer(sender: &Sender<WriterMessage>) -> Result<(), AccessLogError> {
    let (done, result) = oneshot::channel();
    sender
        .send(WriterMessage::Flush(done))
        .await
        .map_err(|_| AccessLogError::SinkClosed)?;
    result.await.map_err(|_| AccessLogError::SinkClosed)??;
    Ok(())
}

/// A buffered sink appending to a file
///
/// The file is opened in append mode and created if necessary. All lines go through a single
/// writer task that owns the buffer, so that lines submitted concurrently never mix.
///
/// Buffered data is written to the file when the buffer is full, on [`flush`](LogSink::flush),
/// when the last handle is dropped and when the process receives an interrupt signal (Ctrl-C).
/// In the latter case the process exits after all durable sinks have been flushed. On Unix systems, `HUP` and `USR1`
/// signals make the sink re-open its file.
#[derive(Debug, Clone)]
pub struct DurableSink {
    path: PathBuf,
    sender: Sender<WriterMessage>,
}

impl DurableSink {
    /// Opens the log file and starts the writer task and signal listeners.
    ///
    /// This has to be called from within a Tokio runtime.
    pub fn open(path: impl Into<PathBuf>, buffer_size: usize) -> Result<Self, AccessLogError> {
        let path = path.into();
        let (sender, task) = start_writer(&path, buffer_size)?;
        crate::signal::listen(&sender, task);

        Ok(Self { path, sender })
    }

    /// Same as [`DurableSink::open`] but terminates the process if the file cannot be opened.
    #[allow(clippy::exit)]
    pub fn open_or_exit(path: impl Into<PathBuf>, buffer_size: usize) -> Self {
        match Self::open(path, buffer_size) {
            Ok(sink) => sink,
            Err(err) => {
                error!("{err}");
                // Logging might not be initialized at this point
                eprintln!("{err}");
                std::process::exit(1);
            }
        }
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn sender(&self) -> &Sender<WriterMessage> {
        &self.sender
    }

    /// Flushes buffered data and re-opens the log file, e.g. after it has been moved away.
    pub async fn reopen(&self) -> Result<(), AccessLogError> {
        self.sender
            .send(WriterMessage::Reopen)
            .await
            .map_err(|_| AccessLogError::SinkClosed)
    }
}

#[async_trait]
impl LogSink for DurableSink {
    async fn write_line(&self, line: Vec<u8>) -> Result<(), AccessLogError> {
        self.sender
            .send(WriterMessage::Line(line))
            .await
            .map_err(|_| AccessLogError::SinkClosed)
    }

    async fn flush(&self) -> Result<(), AccessLogError> {
        flush_writer(&self.sender).await
    }
}

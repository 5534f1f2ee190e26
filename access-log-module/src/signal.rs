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

//! Signal processing: flushing on interrupt, re-opening log files on Unix
//!
//! There is a single interrupt listener per process. It flushes every log writer that was
//! started so far before exiting.

use log::{error, info, warn};
use once_cell::sync::Lazy;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{Sender, WeakSender};
use tokio::task::JoinHandle;

use crate::error::AccessLogError;
use crate::sink::{flush_writer, WriterMessage};

/// A running log writer. Doesn't keep the writer alive.
#[derive(Debug)]
struct WriterTask {
    sender: WeakSender<WriterMessage>,
    task: JoinHandle<()>,
}

impl WriterTask {
    fn new(sender: &Sender<WriterMessage>, task: JoinHandle<()>) -> Self {
        Self {
            sender: sender.downgrade(),
            task,
        }
    }
}

#[derive(Debug, Default)]
struct Writers {
    tasks: Vec<WriterTask>,
    interrupt_listener: Option<JoinHandle<()>>,
}

static WRITERS: Lazy<Mutex<Writers>> = Lazy::new(Default::default);

fn writers() -> MutexGuard<'static, Writers> {
    WRITERS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Makes sure everything sent to the writer so far made it into the file. Returns `false` if
/// flushing failed.
async fn flush_before_exit(writer: WriterTask) -> bool {
    if let Some(sender) = writer.sender.upgrade() {
        match flush_writer(&sender).await {
            Ok(()) => return true,
            Err(AccessLogError::SinkClosed) => {}
            Err(err) => {
                error!("Failed flushing access log: {err}");
                return false;
            }
        }
    }

    // All handles are gone, the writer still has to process its queue and flush
    match writer.task.await {
        Ok(()) => true,
        Err(err) => {
            error!("Access log writer failed: {err}");
            false
        }
    }
}

async fn flush_all() -> bool {
    let tasks = std::mem::take(&mut writers().tasks);

    let mut success = true;
    for task in tasks {
        success &= flush_before_exit(task).await;
    }
    success
}

#[allow(clippy::exit)]
fn listen_to_interrupt() -> JoinHandle<()> {
    tokio::spawn(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed registering for interrupt signal: {err}");
            return;
        }

        info!("Flushing logs and exiting...");
        flush_all().await;
        std::process::exit(0);
    })
}

#[cfg(unix)]
fn listen_to_signal(kind: tokio::signal::unix::SignalKind, sender: WeakSender<WriterMessage>) {
    use tokio::signal::unix::signal;

    tokio::spawn(async move {
        let mut sig = match signal(kind) {
            Ok(sig) => sig,
            Err(err) => {
                warn!(
                    "Failed registering for signal {}: {err}",
                    kind.as_raw_value()
                );
                return;
            }
        };

        while sig.recv().await.is_some() {
            let Some(sender) = sender.upgrade() else {
                break;
            };
            if let Err(err) = sender.send(WriterMessage::Reopen).await {
                error!("Failed reopening log files, thread crashed? {err}");
            }
        }
    });
}

/// Registers a log writer with the interrupt listener, starting the listener if necessary, and
/// sets up re-opening signals. The listeners don't keep the writer alive.
pub(crate) fn listen(sender: &Sender<WriterMessage>, task: JoinHandle<()>) {
    {
        let mut writers = writers();
        writers.tasks.retain(|writer| !writer.task.is_finished());

        // The listener is gone along with its runtime
        let listening = writers
            .interrupt_listener
            .as_ref()
            .is_some_and(|listener| !listener.is_finished());
        if !listening {
            writers.interrupt_listener = Some(listen_to_interrupt());
        }

        writers.tasks.push(WriterTask::new(sender, task));
    }

    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;

        listen_to_signal(SignalKind::hangup(), sender.downgrade());
        listen_to_signal(SignalKind::user_defined1(), sender.downgrade());
    }
}

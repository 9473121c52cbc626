//! Streaming encode pipeline.
//!
//! One consumer thread per encoded session reads frames off an unbounded
//! FIFO queue, feeds them to the configured [`StreamEncoder`], and appends
//! encoder output to the final file as it becomes available. The pipeline is
//! created lazily on the first Recording interval and survives pause/resume:
//! the encoded stream is continuous, never one encoder per segment.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

use crate::models::config::RecordConfig;
use crate::models::error::RecordError;
use crate::models::frame::AudioFrame;
use crate::session::notifier::Notifier;
use crate::traits::stream_encoder::StreamEncoder;

/// Invoked exactly once after the queue drains and the encoder flushes.
/// Receives the total raw byte count that entered the encoder on success.
pub(crate) type CompletionCallback = Box<dyn FnOnce(Result<u64, RecordError>) + Send + 'static>;

enum EncodeMsg {
    Frame(Arc<AudioFrame>),
    Finish(CompletionCallback),
}

pub(crate) struct EncodePipeline {
    tx: Sender<EncodeMsg>,
}

impl EncodePipeline {
    /// Open the output file, initialize the encoder, and start the consumer
    /// thread.
    pub fn spawn(
        mut encoder: Box<dyn StreamEncoder>,
        output_path: &Path,
        config: &RecordConfig,
        notifier: Notifier,
    ) -> Result<Self, RecordError> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    RecordError::Storage(format!(
                        "failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let file = File::create(output_path).map_err(|e| {
            RecordError::Storage(format!("failed to create {}: {}", output_path.display(), e))
        })?;
        encoder.initialize(config)?;

        let (tx, rx) = mpsc::channel::<EncodeMsg>();
        let writer = BufWriter::new(file);

        thread::Builder::new()
            .name("encode-pipeline".into())
            .spawn(move || consume(encoder, writer, rx, notifier))
            .expect("failed to spawn encode thread");

        Ok(Self { tx })
    }

    /// Enqueue one frame. Frames are consumed in FIFO order and are never
    /// dropped; the queue is unbounded, so the producer never blocks.
    pub fn push(&self, frame: Arc<AudioFrame>) -> Result<(), RecordError> {
        self.tx
            .send(EncodeMsg::Frame(frame))
            .map_err(|_| RecordError::Encoder("encode pipeline is not running".into()))
    }

    /// Signal end-of-input. The consumer drains every queued frame, flushes
    /// and closes the encoder and output file, then invokes `on_complete`
    /// exactly once, asynchronously with respect to this call.
    pub fn stop_safe(self, on_complete: CompletionCallback) {
        if let Err(mpsc::SendError(msg)) = self.tx.send(EncodeMsg::Finish(on_complete)) {
            // Consumer already gone; the completion contract still holds.
            if let EncodeMsg::Finish(callback) = msg {
                callback(Err(RecordError::Encoder(
                    "encode pipeline is not running".into(),
                )));
            }
        }
    }
}

fn consume(
    mut encoder: Box<dyn StreamEncoder>,
    mut writer: BufWriter<File>,
    rx: mpsc::Receiver<EncodeMsg>,
    notifier: Notifier,
) {
    let mut raw_bytes_in: u64 = 0;
    let mut failure: Option<RecordError> = None;

    while let Ok(msg) = rx.recv() {
        match msg {
            EncodeMsg::Frame(frame) => {
                if failure.is_some() {
                    continue;
                }
                let step = encoder.encode(&frame).and_then(|out| {
                    writer
                        .write_all(&out)
                        .map_err(|e| RecordError::Storage(format!("encoded write failed: {}", e)))
                });
                match step {
                    Ok(()) => raw_bytes_in += frame.len() as u64,
                    Err(e) => {
                        log::error!("encode failed: {}", e);
                        notifier.error(e.clone());
                        failure = Some(e);
                    }
                }
            }
            EncodeMsg::Finish(on_complete) => {
                let outcome = match failure.take() {
                    Some(e) => Err(e),
                    None => flush(&mut encoder, &mut writer).map(|()| raw_bytes_in),
                };
                log::debug!("encode pipeline drained ({} raw bytes in)", raw_bytes_in);
                on_complete(outcome);
                return;
            }
        }
    }

    // Every producer handle dropped without a Finish: flush what we have so
    // a dropped recorder does not truncate the stream mid-frame.
    if failure.is_none() {
        if let Err(e) = flush(&mut encoder, &mut writer) {
            log::error!("encode flush on shutdown failed: {}", e);
        }
    }
}

fn flush(encoder: &mut Box<dyn StreamEncoder>, writer: &mut BufWriter<File>) -> Result<(), RecordError> {
    let tail = encoder.finalize()?;
    writer
        .write_all(&tail)
        .and_then(|()| writer.flush())
        .map_err(|e| RecordError::Storage(format!("encoded flush failed: {}", e)))
}

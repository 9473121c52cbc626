use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::config::{OutputFormat, RecordConfig};
use crate::models::error::RecordError;
use crate::models::frame::AudioFrame;
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::models::state::RecordState;
use crate::processing::{level_meter, wav_format};
use crate::session::encode_pipeline::EncodePipeline;
use crate::session::notifier::Notifier;
use crate::storage::{metadata, segment_store};
use crate::traits::capture_device::CaptureDevice;
use crate::traits::record_delegate::RecordDelegate;
use crate::traits::stream_encoder::StreamEncoder;

/// One active recording session's bookkeeping. Created on `start`, consumed
/// at finalization.
struct SessionData {
    config: RecordConfig,
    output_path: PathBuf,
    temp_dir: PathBuf,
    segments: Vec<PathBuf>,
    next_seq: u32,
}

impl SessionData {
    fn new(output_path: PathBuf, config: RecordConfig) -> Self {
        let temp_dir = output_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            config,
            output_path,
            temp_dir,
            segments: Vec::new(),
            next_seq: 0,
        }
    }

    fn next_segment_path(&mut self) -> PathBuf {
        let path = segment_store::segment_path(&self.temp_dir, self.next_seq);
        self.next_seq += 1;
        path
    }
}

/// Shared mutable state, protected by one `parking_lot::Mutex`.
///
/// `loop_active` is true from the moment a capture interval is committed
/// (start/resume) until its loop has fully wound down. It closes the gap
/// between `pause()` returning and the loop finishing its current read:
/// `resume` is rejected during that window, and `stop()` from Paused defers
/// finalization to the winding-down loop instead of racing it.
struct Shared {
    state: RecordState,
    session: Option<SessionData>,
    loop_active: bool,
}

struct RecorderInner<D> {
    device: Mutex<D>,
    encoder: Mutex<Option<Box<dyn StreamEncoder>>>,
    pipeline: Mutex<Option<EncodePipeline>>,
    shared: Mutex<Shared>,
    notifier: Notifier,
}

/// Recording session orchestrator.
///
/// Generic over the capture backend via the [`CaptureDevice`] trait. Drives
/// the state machine `idle → recording ↔ paused → stopping → finished`,
/// spawns one capture thread per Recording interval, accumulates paused
/// intervals as segment files, and finalizes into the configured output
/// format on stop.
///
/// Control calls run on the caller's thread and only update shared state or
/// enqueue work; capture and encode I/O stay on their own threads. One
/// `Recorder` handles one session at a time; after `Finished` is delivered
/// it is ready for the next `start`.
pub struct Recorder<D: CaptureDevice + 'static> {
    inner: Arc<RecorderInner<D>>,
}

impl<D: CaptureDevice + 'static> Recorder<D> {
    /// A recorder for the raw and WAV output paths.
    pub fn new(device: D) -> Self {
        Self::build(device, None)
    }

    /// A recorder that can also produce the encoded output path.
    pub fn with_encoder(device: D, encoder: Box<dyn StreamEncoder>) -> Self {
        Self::build(device, Some(encoder))
    }

    fn build(device: D, encoder: Option<Box<dyn StreamEncoder>>) -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                device: Mutex::new(device),
                encoder: Mutex::new(encoder),
                pipeline: Mutex::new(None),
                shared: Mutex::new(Shared {
                    state: RecordState::Idle,
                    session: None,
                    loop_active: false,
                }),
                notifier: Notifier::new(),
            }),
        }
    }

    /// Register the event listener. Callbacks arrive on a single delivery
    /// thread in the order events were raised.
    pub fn set_delegate(&self, delegate: Arc<dyn RecordDelegate>) {
        self.inner.notifier.set_delegate(delegate);
    }

    /// Install the encoder for the next encoded session.
    ///
    /// Each encoded session consumes its encoder (the stream is continuous
    /// for the session's lifetime), so a recorder that has finished one
    /// needs a fresh encoder before the next `start` with
    /// [`OutputFormat::Encoded`].
    pub fn set_encoder(&self, encoder: Box<dyn StreamEncoder>) {
        *self.inner.encoder.lock() = Some(encoder);
    }

    pub fn state(&self) -> RecordState {
        self.inner.shared.lock().state
    }

    /// Begin a new session recording to `output_path`.
    ///
    /// Valid only from `Idle`. The session is established here, but the
    /// state transitions to `Recording` only once the capture loop actually
    /// begins, so `state()` reflects capturing rather than requested.
    pub fn start(
        &self,
        output_path: impl Into<PathBuf>,
        config: RecordConfig,
    ) -> Result<(), RecordError> {
        config.validate()?;
        let output_path = output_path.into();

        {
            let mut shared = self.inner.shared.lock();
            if !shared.state.is_idle() || shared.session.is_some() || shared.loop_active {
                log::error!("start rejected in state {:?}", shared.state);
                return Err(RecordError::InvalidState {
                    op: "start",
                    state: shared.state,
                });
            }
            shared.session = Some(SessionData::new(output_path.clone(), config));
            shared.loop_active = true;
        }

        if config.format == OutputFormat::Encoded {
            if let Err(e) = self.inner.ensure_pipeline(&output_path, &config) {
                let mut shared = self.inner.shared.lock();
                shared.session = None;
                shared.loop_active = false;
                return Err(e);
            }
        }

        log::info!(
            "starting {:?} capture -> {}",
            config.format,
            output_path.display()
        );
        spawn_capture_loop(&self.inner);
        Ok(())
    }

    /// Signal the capture loop to pause after its current read.
    ///
    /// Valid only from `Recording`. Returns without waiting for the loop to
    /// exit; the loop closes the active segment and becomes eligible for
    /// `resume`.
    pub fn pause(&self) -> Result<(), RecordError> {
        let mut shared = self.inner.shared.lock();
        if !shared.state.is_recording() {
            log::error!("pause rejected in state {:?}", shared.state);
            return Err(RecordError::InvalidState {
                op: "pause",
                state: shared.state,
            });
        }
        shared.state = RecordState::Paused;
        self.inner.notifier.state_changed(RecordState::Paused);
        log::debug!("pause requested");
        Ok(())
    }

    /// Open a new segment and launch a new capture loop.
    ///
    /// Valid only from `Paused`. Rejected while the previous interval is
    /// still winding down (at most one device-read's duration); retry after
    /// the rejection if that window is hit.
    pub fn resume(&self) -> Result<(), RecordError> {
        {
            let mut shared = self.inner.shared.lock();
            if !shared.state.is_paused() || shared.loop_active {
                log::error!("resume rejected in state {:?}", shared.state);
                return Err(RecordError::InvalidState {
                    op: "resume",
                    state: shared.state,
                });
            }
            shared.loop_active = true;
        }
        log::debug!("resuming capture");
        spawn_capture_loop(&self.inner);
        Ok(())
    }

    /// Stop the session and finalize the output file.
    ///
    /// Valid from `Recording` or `Paused`. From `Recording` the active loop
    /// observes `Stopping` and finalizes after its current read; from
    /// `Paused` finalization runs synchronously here, since no loop is
    /// active. Completion is signaled through `on_finished` after merge /
    /// header synthesis (raw, WAV) or after the encoder drains (encoded).
    pub fn stop(&self) -> Result<(), RecordError> {
        let finalize_here = {
            let mut shared = self.inner.shared.lock();
            match shared.state {
                RecordState::Recording => {
                    shared.state = RecordState::Stopping;
                    self.inner.notifier.state_changed(RecordState::Stopping);
                    false
                }
                RecordState::Paused => {
                    shared.state = RecordState::Stopping;
                    self.inner.notifier.state_changed(RecordState::Stopping);
                    // A loop still winding down performs finalization itself.
                    !shared.loop_active
                }
                state => {
                    log::error!("stop rejected in state {:?}", state);
                    return Err(RecordError::InvalidState { op: "stop", state });
                }
            }
        };

        if finalize_here {
            finalize(&self.inner);
        }
        Ok(())
    }
}

impl<D: CaptureDevice> RecorderInner<D> {
    fn set_state(&self, state: RecordState) {
        let mut shared = self.shared.lock();
        shared.state = state;
        // Sent while holding the lock so listeners observe state changes in
        // commit order.
        self.notifier.state_changed(state);
    }

    fn ensure_pipeline(&self, output_path: &Path, config: &RecordConfig) -> Result<(), RecordError> {
        let mut slot = self.pipeline.lock();
        if slot.is_some() {
            return Ok(());
        }
        let encoder = self
            .encoder
            .lock()
            .take()
            .ok_or_else(|| RecordError::Encoder("no stream encoder configured".into()))?;
        *slot = Some(EncodePipeline::spawn(
            encoder,
            output_path,
            config,
            self.notifier.clone(),
        )?);
        Ok(())
    }

    fn push_encoded_frame(&self, frame: Arc<AudioFrame>) -> Result<(), RecordError> {
        match self.pipeline.lock().as_ref() {
            Some(pipeline) => pipeline.push(frame),
            None => Err(RecordError::Encoder("encode pipeline is not running".into())),
        }
    }
}

fn spawn_capture_loop<D: CaptureDevice + 'static>(inner: &Arc<RecorderInner<D>>) {
    let inner = Arc::clone(inner);
    thread::Builder::new()
        .name("audio-capture".into())
        .spawn(move || capture_loop(&inner))
        .expect("failed to spawn capture thread");
}

/// One Recording interval: producer side of the pipeline.
fn capture_loop<D: CaptureDevice + 'static>(inner: &Arc<RecorderInner<D>>) {
    let begun = {
        let mut shared = inner.shared.lock();
        shared.session.as_mut().map(|session| {
            let config = session.config;
            let segment = match config.format {
                OutputFormat::Raw | OutputFormat::Wav => Some(session.next_segment_path()),
                OutputFormat::Encoded => None,
            };
            (config, segment)
        })
    };
    let Some((config, segment_path)) = begun else {
        inner.shared.lock().loop_active = false;
        return;
    };

    inner.set_state(RecordState::Recording);

    if let Err(e) = run_interval(inner, &config, segment_path.as_deref()) {
        log::error!("capture interval aborted: {}", e);
        inner.notifier.error(e);
    }

    let disposition = {
        let mut shared = inner.shared.lock();
        if let (Some(session), Some(path)) = (shared.session.as_mut(), segment_path) {
            session.segments.push(path);
        }
        shared.loop_active = false;
        shared.state
    };

    match disposition {
        RecordState::Paused => log::debug!("capture paused"),
        // Stopping, or Recording after an aborting failure: finalize what
        // was captured either way.
        _ => finalize(inner),
    }
}

/// Read frames from the device until the session leaves `Recording`,
/// forwarding each frame to the notifier and to the segment sink or encode
/// queue. Holds the device for the whole interval; control calls never
/// touch it.
fn run_interval<D: CaptureDevice>(
    inner: &Arc<RecorderInner<D>>,
    config: &RecordConfig,
    segment_path: Option<&Path>,
) -> Result<(), RecordError> {
    let mut sink = match segment_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
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
            log::info!("segment file: {}", path.display());
            let file = File::create(path).map_err(|e| {
                RecordError::Storage(format!("failed to create segment {}: {}", path.display(), e))
            })?;
            Some(BufWriter::new(file))
        }
        None => None,
    };

    let mut device = inner.device.lock();
    let buffer_size = device.open(config)?;
    device.start()?;

    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut result = Ok(());

    while inner.shared.lock().state.is_recording() {
        let read = match device.read(&mut buffer) {
            Ok(0) => continue,
            Ok(n) => n.min(buffer.len()),
            Err(e) => {
                result = Err(e);
                break;
            }
        };

        let frame = Arc::new(AudioFrame::from_bytes(&buffer[..read]));
        let level = level_meter::peak_dbfs(frame.bytes(), config.bit_depth);
        inner.notifier.data(Arc::clone(&frame), level);

        let written = match sink.as_mut() {
            Some(writer) => writer
                .write_all(frame.bytes())
                .and_then(|()| writer.flush())
                .map_err(|e| RecordError::Storage(format!("segment write failed: {}", e))),
            None => inner.push_encoded_frame(frame),
        };
        if let Err(e) = written {
            result = Err(e);
            break;
        }
    }

    let stopped = device.stop();
    result?;
    stopped
}

/// Run once per session, after the last interval has wound down (or, for a
/// stop issued while paused, synchronously on the control thread).
fn finalize<D: CaptureDevice + 'static>(inner: &Arc<RecorderInner<D>>) {
    let session = inner.shared.lock().session.take();
    let Some(session) = session else {
        inner.shared.lock().state = RecordState::Idle;
        return;
    };

    match session.config.format {
        OutputFormat::Raw => finish_pcm(inner, &session, false),
        OutputFormat::Wav => finish_pcm(inner, &session, true),
        OutputFormat::Encoded => finish_encoded(inner, &session),
    }
}

fn finish_pcm<D: CaptureDevice + 'static>(inner: &Arc<RecorderInner<D>>, session: &SessionData, with_header: bool) {
    let outcome = (|| -> Result<RecordingResult, RecordError> {
        segment_store::merge(&session.output_path, &session.segments)?;
        let data_len = fs::metadata(&session.output_path)
            .map_err(|e| {
                RecordError::Storage(format!(
                    "cannot stat {}: {}",
                    session.output_path.display(),
                    e
                ))
            })?
            .len();
        if with_header {
            wav_format::write_wav_header(&session.output_path, &session.config)?;
        }
        build_result(&session.output_path, &session.config, data_len)
    })();

    finish_with(inner, outcome);
}

fn finish_encoded<D: CaptureDevice + 'static>(inner: &Arc<RecorderInner<D>>, session: &SessionData) {
    let pipeline = inner.pipeline.lock().take();
    let Some(pipeline) = pipeline else {
        inner
            .notifier
            .error(RecordError::Encoder("no encode pipeline to drain".into()));
        inner.set_state(RecordState::Idle);
        return;
    };

    let inner = Arc::clone(inner);
    let output_path = session.output_path.clone();
    let config = session.config;
    pipeline.stop_safe(Box::new(move |drained| {
        let outcome =
            drained.and_then(|raw_bytes_in| build_result(&output_path, &config, raw_bytes_in));
        finish_with(&inner, outcome);
    }));
}

fn finish_with<D: CaptureDevice + 'static>(
    inner: &Arc<RecorderInner<D>>,
    outcome: Result<RecordingResult, RecordError>,
) {
    match outcome {
        Ok(result) => {
            if let Err(e) = metadata::write_sidecar(&result) {
                log::warn!("failed to write metadata sidecar: {}", e);
            }
            log::info!(
                "recording finished: {} ({:.2}s)",
                result.file_path.display(),
                result.duration_secs
            );
            inner.set_state(RecordState::Finished);
            // Reset before posting the result so that by the time a listener
            // observes `on_finished`, the recorder accepts the next `start`.
            inner.shared.lock().state = RecordState::Idle;
            inner.notifier.finished(result);
        }
        Err(e) => {
            log::error!("finalization failed: {}", e);
            inner.notifier.error(e);
            inner.set_state(RecordState::Idle);
        }
    }
}

fn build_result(
    path: &Path,
    config: &RecordConfig,
    raw_data_len: u64,
) -> Result<RecordingResult, RecordError> {
    let checksum = metadata::sha256_file(path)?;
    let duration_secs = raw_data_len as f64 / config.byte_rate() as f64;
    let meta = RecordingMetadata::new(path, config, duration_secs, &checksum);
    Ok(RecordingResult {
        file_path: path.to_path_buf(),
        duration_secs,
        metadata: meta,
        checksum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::Duration;

    const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Scripted capture device: produces a deterministic byte stream at a
    /// fixed cadence and logs every frame it hands out, so tests can assert
    /// the output equals exactly what was captured.
    struct FakeDevice {
        cadence: Duration,
        fail_after: Option<usize>,
        counter: u8,
        reads_this_open: usize,
        probe: DeviceProbe,
    }

    #[derive(Clone)]
    struct DeviceProbe {
        frames: Arc<Mutex<Vec<Vec<u8>>>>,
        opens: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    impl DeviceProbe {
        fn flat(&self) -> Vec<u8> {
            self.frames.lock().iter().flatten().copied().collect()
        }

        fn frames(&self) -> Vec<Vec<u8>> {
            self.frames.lock().clone()
        }
    }

    fn fake_device(cadence_ms: u64, fail_after: Option<usize>) -> (FakeDevice, DeviceProbe) {
        let probe = DeviceProbe {
            frames: Arc::new(Mutex::new(Vec::new())),
            opens: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
        };
        let device = FakeDevice {
            cadence: Duration::from_millis(cadence_ms),
            fail_after,
            counter: 0,
            reads_this_open: 0,
            probe: probe.clone(),
        };
        (device, probe)
    }

    impl CaptureDevice for FakeDevice {
        fn open(&mut self, _config: &RecordConfig) -> Result<usize, RecordError> {
            self.probe.opens.fetch_add(1, Ordering::SeqCst);
            self.reads_this_open = 0;
            Ok(8)
        }

        fn start(&mut self) -> Result<(), RecordError> {
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, RecordError> {
            if let Some(limit) = self.fail_after {
                if self.reads_this_open >= limit {
                    return Err(RecordError::Device("simulated device loss".into()));
                }
            }
            thread::sleep(self.cadence);
            // Alternate full and short reads so valid-count handling is
            // exercised.
            let n = if self.reads_this_open % 2 == 0 {
                buf.len()
            } else {
                buf.len() / 2
            };
            for byte in &mut buf[..n] {
                *byte = self.counter;
                self.counter = self.counter.wrapping_add(1);
            }
            self.reads_this_open += 1;
            self.probe.frames.lock().push(buf[..n].to_vec());
            Ok(n)
        }

        fn stop(&mut self) -> Result<(), RecordError> {
            self.probe.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Length-prefixes every frame and appends a footer; slow enough that
    /// frames queue up behind the producer.
    struct FramingEncoder;

    impl StreamEncoder for FramingEncoder {
        fn initialize(&mut self, _config: &RecordConfig) -> Result<(), RecordError> {
            Ok(())
        }

        fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<u8>, RecordError> {
            thread::sleep(Duration::from_millis(2));
            let mut out = (frame.len() as u32).to_le_bytes().to_vec();
            out.extend_from_slice(frame.bytes());
            Ok(out)
        }

        fn finalize(&mut self) -> Result<Vec<u8>, RecordError> {
            Ok(b"END".to_vec())
        }
    }

    fn framed(frames: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for frame in frames {
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(frame);
        }
        out.extend_from_slice(b"END");
        out
    }

    enum TestEvent {
        State(RecordState),
        Error(RecordError),
        Finished(RecordingResult),
    }

    struct TestDelegate {
        tx: Mutex<Sender<TestEvent>>,
    }

    impl RecordDelegate for TestDelegate {
        fn on_state_changed(&self, state: RecordState) {
            let _ = self.tx.lock().send(TestEvent::State(state));
        }

        fn on_error(&self, error: &RecordError) {
            let _ = self.tx.lock().send(TestEvent::Error(error.clone()));
        }

        fn on_finished(&self, result: &RecordingResult) {
            let _ = self.tx.lock().send(TestEvent::Finished(result.clone()));
        }
    }

    fn delegate() -> (Arc<TestDelegate>, Receiver<TestEvent>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(TestDelegate { tx: Mutex::new(tx) }), rx)
    }

    fn next_event(rx: &Receiver<TestEvent>) -> TestEvent {
        rx.recv_timeout(EVENT_TIMEOUT)
            .expect("timed out waiting for event")
    }

    fn wait_for_state(rx: &Receiver<TestEvent>, want: RecordState) {
        loop {
            if let TestEvent::State(state) = next_event(rx) {
                if state == want {
                    return;
                }
            }
        }
    }

    fn wait_for_finished(rx: &Receiver<TestEvent>) -> RecordingResult {
        loop {
            match next_event(rx) {
                TestEvent::Finished(result) => return result,
                TestEvent::Error(error) => panic!("unexpected error: {}", error),
                TestEvent::State(_) => {}
            }
        }
    }

    fn wait_for_error(rx: &Receiver<TestEvent>) -> RecordError {
        loop {
            match next_event(rx) {
                TestEvent::Error(error) => return error,
                TestEvent::Finished(_) => panic!("finished before expected error"),
                TestEvent::State(_) => {}
            }
        }
    }

    fn collect_states_until_finished(rx: &Receiver<TestEvent>) -> Vec<RecordState> {
        let mut states = Vec::new();
        loop {
            match next_event(rx) {
                TestEvent::State(state) => states.push(state),
                TestEvent::Finished(_) => return states,
                TestEvent::Error(error) => panic!("unexpected error: {}", error),
            }
        }
    }

    /// `resume` is rejected while the previous interval winds down; retry
    /// briefly, the window is one device read.
    fn resume_when_ready<D: CaptureDevice + 'static>(recorder: &Recorder<D>) {
        for _ in 0..200 {
            if recorder.resume().is_ok() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("resume was never accepted");
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("recorder_test_{}_{}", name, uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn raw_config() -> RecordConfig {
        RecordConfig {
            format: OutputFormat::Raw,
            ..Default::default()
        }
    }

    #[test]
    fn raw_session_captures_every_frame() {
        let dir = temp_dir("raw");
        let output = dir.join("take.pcm");
        let (device, probe) = fake_device(1, None);
        let recorder = Recorder::new(device);
        let (observer, rx) = delegate();
        recorder.set_delegate(observer);

        recorder.start(&output, raw_config()).unwrap();
        wait_for_state(&rx, RecordState::Recording);
        thread::sleep(Duration::from_millis(50));
        recorder.stop().unwrap();
        let result = wait_for_finished(&rx);

        let captured = probe.flat();
        assert!(!captured.is_empty());
        assert_eq!(fs::read(&output).unwrap(), captured);
        assert_eq!(result.file_path, output);

        // Segments are deleted after a successful merge.
        let leftovers: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".pcm") && e.path() != output)
            .collect();
        assert!(leftovers.is_empty(), "segment temp files must be cleaned up");

        // Sidecar metadata matches the finished file.
        let sidecar = metadata::read_sidecar(&output).unwrap();
        assert_eq!(sidecar.checksum, metadata::sha256_file(&output).unwrap());

        assert_eq!(recorder.state(), RecordState::Idle);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn pause_resume_loses_no_frames() {
        let dir = temp_dir("pause_resume");
        let output = dir.join("take.pcm");
        let (device, probe) = fake_device(1, None);
        let recorder = Recorder::new(device);
        let (observer, rx) = delegate();
        recorder.set_delegate(observer);

        recorder.start(&output, raw_config()).unwrap();
        wait_for_state(&rx, RecordState::Recording);
        thread::sleep(Duration::from_millis(30));

        recorder.pause().unwrap();
        wait_for_state(&rx, RecordState::Paused);
        thread::sleep(Duration::from_millis(30));

        resume_when_ready(&recorder);
        wait_for_state(&rx, RecordState::Recording);
        thread::sleep(Duration::from_millis(30));

        recorder.stop().unwrap();
        wait_for_finished(&rx);

        // Two capture intervals, merged in order with no gap at the pause
        // boundary.
        assert_eq!(probe.opens.load(Ordering::SeqCst), 2);
        assert_eq!(probe.stops.load(Ordering::SeqCst), 2);
        assert_eq!(fs::read(&output).unwrap(), probe.flat());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn delegate_observes_states_in_order() {
        let dir = temp_dir("state_order");
        let output = dir.join("take.pcm");
        let (device, _probe) = fake_device(1, None);
        let recorder = Recorder::new(device);
        let (observer, rx) = delegate();
        recorder.set_delegate(observer);

        recorder.start(&output, raw_config()).unwrap();
        wait_for_state(&rx, RecordState::Recording);
        recorder.pause().unwrap();
        wait_for_state(&rx, RecordState::Paused);
        thread::sleep(Duration::from_millis(20));
        resume_when_ready(&recorder);
        wait_for_state(&rx, RecordState::Recording);
        recorder.stop().unwrap();

        let states = collect_states_until_finished(&rx);
        assert_eq!(states, vec![RecordState::Stopping, RecordState::Finished]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn stop_while_paused_finalizes_without_new_loop() {
        let dir = temp_dir("stop_paused");
        let output = dir.join("take.pcm");
        let (device, probe) = fake_device(1, None);
        let recorder = Recorder::new(device);
        let (observer, rx) = delegate();
        recorder.set_delegate(observer);

        recorder.start(&output, raw_config()).unwrap();
        wait_for_state(&rx, RecordState::Recording);
        thread::sleep(Duration::from_millis(20));
        recorder.pause().unwrap();
        wait_for_state(&rx, RecordState::Paused);
        thread::sleep(Duration::from_millis(30));

        recorder.stop().unwrap();
        wait_for_finished(&rx);

        assert_eq!(probe.opens.load(Ordering::SeqCst), 1, "no new capture loop");
        assert_eq!(fs::read(&output).unwrap(), probe.flat());
        assert_eq!(recorder.state(), RecordState::Idle);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let dir = temp_dir("invalid");
        let (device, _probe) = fake_device(1, None);
        let recorder = Recorder::new(device);
        let (observer, rx) = delegate();
        recorder.set_delegate(observer);

        assert!(matches!(
            recorder.pause(),
            Err(RecordError::InvalidState { op: "pause", .. })
        ));
        assert!(matches!(
            recorder.resume(),
            Err(RecordError::InvalidState { op: "resume", .. })
        ));
        assert!(matches!(
            recorder.stop(),
            Err(RecordError::InvalidState { op: "stop", .. })
        ));
        assert_eq!(recorder.state(), RecordState::Idle);

        let output = dir.join("take.pcm");
        recorder.start(&output, raw_config()).unwrap();
        wait_for_state(&rx, RecordState::Recording);
        assert!(matches!(
            recorder.start(&output, raw_config()),
            Err(RecordError::InvalidState { op: "start", .. })
        ));
        assert!(matches!(
            recorder.resume(),
            Err(RecordError::InvalidState { op: "resume", .. })
        ));

        recorder.stop().unwrap();
        wait_for_finished(&rx);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn wav_session_prepends_header() {
        let dir = temp_dir("wav");
        let output = dir.join("take.wav");
        let (device, probe) = fake_device(1, None);
        let recorder = Recorder::new(device);
        let (observer, rx) = delegate();
        recorder.set_delegate(observer);

        let config = RecordConfig {
            format: OutputFormat::Wav,
            ..Default::default()
        };
        recorder.start(&output, config).unwrap();
        wait_for_state(&rx, RecordState::Recording);
        thread::sleep(Duration::from_millis(40));
        recorder.stop().unwrap();
        let result = wait_for_finished(&rx);

        let captured = probe.flat();
        let file_data = fs::read(&output).unwrap();
        assert_eq!(file_data.len(), wav_format::WAV_HEADER_SIZE + captured.len());
        assert_eq!(&file_data[0..4], b"RIFF");
        assert_eq!(&file_data[wav_format::WAV_HEADER_SIZE..], &captured[..]);

        let data_size =
            u32::from_le_bytes([file_data[40], file_data[41], file_data[42], file_data[43]]);
        assert_eq!(data_size as usize, captured.len());
        let sample_rate =
            u32::from_le_bytes([file_data[24], file_data[25], file_data[26], file_data[27]]);
        assert_eq!(sample_rate, 44100);

        let expected_duration = captured.len() as f64 / config.byte_rate() as f64;
        assert!((result.duration_secs - expected_duration).abs() < 1e-9);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn encoded_session_drains_queue_before_finishing() {
        let dir = temp_dir("encoded");
        let output = dir.join("take.bin");
        let (device, probe) = fake_device(1, None);
        let recorder = Recorder::with_encoder(device, Box::new(FramingEncoder));
        let (observer, rx) = delegate();
        recorder.set_delegate(observer);

        let config = RecordConfig {
            format: OutputFormat::Encoded,
            ..Default::default()
        };
        recorder.start(&output, config).unwrap();
        wait_for_state(&rx, RecordState::Recording);
        // The encoder is slower than the device, so frames pile up in the
        // queue and must all be drained after stop.
        thread::sleep(Duration::from_millis(100));
        recorder.stop().unwrap();
        wait_for_finished(&rx);

        let frames = probe.frames();
        assert!(frames.len() > 10);
        assert_eq!(fs::read(&output).unwrap(), framed(&frames));

        // Completion fires exactly once.
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(recorder.state(), RecordState::Idle);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn encoded_stop_while_paused_still_drains() {
        let dir = temp_dir("encoded_paused");
        let output = dir.join("take.bin");
        let (device, probe) = fake_device(1, None);
        let recorder = Recorder::with_encoder(device, Box::new(FramingEncoder));
        let (observer, rx) = delegate();
        recorder.set_delegate(observer);

        let config = RecordConfig {
            format: OutputFormat::Encoded,
            ..Default::default()
        };
        recorder.start(&output, config).unwrap();
        wait_for_state(&rx, RecordState::Recording);
        thread::sleep(Duration::from_millis(40));
        recorder.pause().unwrap();
        wait_for_state(&rx, RecordState::Paused);
        thread::sleep(Duration::from_millis(30));

        recorder.stop().unwrap();
        wait_for_finished(&rx);

        assert_eq!(fs::read(&output).unwrap(), framed(&probe.frames()));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn encoded_start_without_encoder_is_rejected() {
        let dir = temp_dir("no_encoder");
        let (device, _probe) = fake_device(1, None);
        let recorder = Recorder::new(device);

        let config = RecordConfig {
            format: OutputFormat::Encoded,
            ..Default::default()
        };
        let err = recorder.start(dir.join("take.bin"), config).unwrap_err();
        assert!(matches!(err, RecordError::Encoder(_)));
        assert_eq!(recorder.state(), RecordState::Idle);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn device_failure_finalizes_what_was_captured() {
        let dir = temp_dir("device_failure");
        let output = dir.join("take.pcm");
        let (device, probe) = fake_device(1, Some(3));
        let recorder = Recorder::new(device);
        let (observer, rx) = delegate();
        recorder.set_delegate(observer);

        recorder.start(&output, raw_config()).unwrap();

        let error = wait_for_error(&rx);
        assert!(matches!(error, RecordError::Device(_)));
        wait_for_finished(&rx);

        let captured = probe.flat();
        assert_eq!(probe.frames().len(), 3);
        assert_eq!(fs::read(&output).unwrap(), captured);
        assert_eq!(recorder.state(), RecordState::Idle);

        // A failed session leaves the recorder ready for a fresh start.
        assert!(recorder.start(dir.join("retry.pcm"), raw_config()).is_ok());
        wait_for_error(&rx);
        wait_for_finished(&rx);

        fs::remove_dir_all(&dir).ok();
    }
}

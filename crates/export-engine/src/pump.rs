//! Track pump: drains one sample stream into one sink track.

use std::sync::Weak;

use clipforge_common::error::MediaError;
use clipforge_common::time::MediaTime;
use clipforge_media_model::{MediaKind, PumpState, SinkStatus, SourceStatus};

use crate::coordinator::{BarrierSlot, PumpOutcome};
use crate::frame_transform::FrameTransformer;
use crate::media::{ReadyNotifier, SampleStream, SharedDemuxer, SharedMuxer, SinkTrack};

/// Session-side receiver of pump events.
///
/// Pumps hold this weakly; once the session state is gone, events are
/// dropped.
pub trait PumpObserver: Send + Sync {
    fn publish_progress(&self, progress: f32);

    /// A pump stopped because of its own failure rather than a collaborator
    /// state change.
    fn report_fault(&self, track: MediaKind, error: &MediaError);
}

/// Maps video presentation times to export progress.
#[derive(Debug, Clone, Copy)]
pub struct ProgressScale {
    start: MediaTime,
    total: MediaTime,
}

impl ProgressScale {
    pub fn new(start: MediaTime, total: MediaTime) -> Self {
        Self { start, total }
    }

    pub fn progress_at(&self, pts: MediaTime) -> f32 {
        if self.total.as_nanos() <= 0 {
            return 1.0;
        }
        let fraction = (pts - self.start).as_secs_f64() / self.total.as_secs_f64();
        fraction.clamp(0.0, 1.0) as f32
    }
}

/// Moves samples for one track under backpressure.
///
/// [`TrackPump::run`] is re-invoked from the serial queue every time the sink
/// signals readiness. It returns once the sink stops accepting data or the
/// pump reaches a terminal state, and reports that state exactly once
/// through its barrier slot.
pub struct TrackPump {
    kind: MediaKind,
    stream: Box<dyn SampleStream>,
    sink: Box<dyn SinkTrack>,
    /// `None` for caller-supplied streams that do not come from the demuxer.
    demuxer: Option<SharedDemuxer>,
    muxer: SharedMuxer,
    transformer: Option<FrameTransformer>,
    progress: Option<ProgressScale>,
    observer: Weak<dyn PumpObserver>,
    state: PumpState,
    slot: Option<BarrierSlot>,
    samples_pushed: u64,
}

impl TrackPump {
    pub fn new(
        stream: Box<dyn SampleStream>,
        sink: Box<dyn SinkTrack>,
        demuxer: Option<SharedDemuxer>,
        muxer: SharedMuxer,
        slot: BarrierSlot,
        observer: Weak<dyn PumpObserver>,
    ) -> Self {
        Self {
            kind: sink.descriptor().kind,
            stream,
            sink,
            demuxer,
            muxer,
            transformer: None,
            progress: None,
            observer,
            state: PumpState::Running,
            slot: Some(slot),
            samples_pushed: 0,
        }
    }

    /// Render video frames through `transformer` before pushing.
    pub fn with_transformer(mut self, transformer: FrameTransformer) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Publish progress for every pushed sample.
    pub fn with_progress(mut self, scale: ProgressScale) -> Self {
        self.progress = Some(scale);
        self
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn samples_pushed(&self) -> u64 {
        self.samples_pushed
    }

    /// Hand the sink a notifier that reschedules this pump.
    pub fn arm(&mut self, notifier: ReadyNotifier) {
        self.sink.request_data_when_ready(notifier);
    }

    pub fn run(&mut self) -> PumpState {
        while self.state == PumpState::Running && self.sink.is_ready_for_more() {
            self.step();
        }
        if self.state == PumpState::Running && !self.collaborators_active() {
            // The sink parked us, but the export is shutting down underneath.
            self.settle(PumpState::Aborted, None);
        }
        self.state
    }

    fn step(&mut self) {
        let Some(sample) = self.stream.next_sample() else {
            self.sink.mark_finished();
            self.settle(PumpState::Finished, None);
            return;
        };

        if !self.collaborators_active() {
            self.settle(PumpState::Aborted, None);
            return;
        }

        let pts = sample.pts;
        let sample = match self.transformer.as_mut() {
            Some(transformer) if self.kind == MediaKind::Video => {
                match transformer.transform(sample) {
                    Ok(sample) => sample,
                    Err(err) => {
                        self.settle(PumpState::Aborted, Some(err));
                        return;
                    }
                }
            }
            _ => sample,
        };

        if let Err(err) = self.sink.push(sample) {
            self.settle(PumpState::Aborted, Some(err));
            return;
        }
        self.samples_pushed += 1;

        if self.kind == MediaKind::Video {
            if let (Some(scale), Some(observer)) = (self.progress, self.observer.upgrade()) {
                observer.publish_progress(scale.progress_at(pts));
            }
        }
    }

    fn collaborators_active(&self) -> bool {
        let source_reading = self
            .demuxer
            .as_ref()
            .map_or(true, |demuxer| demuxer.lock().status() == SourceStatus::Reading);
        source_reading && self.muxer.lock().status() == SinkStatus::Writing
    }

    fn settle(&mut self, state: PumpState, fault: Option<MediaError>) {
        self.state = state;

        match &fault {
            Some(err) => {
                tracing::warn!(
                    track = %self.kind,
                    state = ?state,
                    samples = self.samples_pushed,
                    error = %err,
                    "Track pump stopped on error"
                );
                if let Some(observer) = self.observer.upgrade() {
                    observer.report_fault(self.kind, err);
                }
            }
            None => tracing::info!(
                track = %self.kind,
                state = ?state,
                samples = self.samples_pushed,
                "Track pump settled"
            ),
        }

        if let Some(slot) = self.slot.take() {
            slot.signal(PumpOutcome {
                kind: self.kind,
                state,
                fault,
                samples: self.samples_pushed,
            });
        }
    }

    /// Settle a pump whose task died without reaching a terminal state.
    pub(crate) fn abandon(&mut self, reason: &str) {
        if self.state == PumpState::Running {
            self.settle(PumpState::Aborted, Some(MediaError::new("pump", -1, reason)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CompletionBarrier;
    use crate::media::{SinkMuxer, SourceDemuxer};
    use clipforge_common::time::TimeRange;
    use clipforge_media_model::{
        FrameBuffer, FramePool, MetadataItem, OutputSettings, PixelFormat, SampleBuffer,
        TrackDescriptor, TrackId, VideoComposition,
    };
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    struct FixedStream {
        kind: MediaKind,
        samples: VecDeque<SampleBuffer>,
    }

    impl FixedStream {
        fn video(count: i64) -> Box<dyn SampleStream> {
            let samples = (0..count)
                .map(|i| {
                    let frame = FrameBuffer::new(2, 2, PixelFormat::bgra());
                    SampleBuffer::frame(MediaTime::from_millis(i * 100), MediaTime::from_millis(100), frame)
                })
                .collect();
            Box::new(Self {
                kind: MediaKind::Video,
                samples,
            })
        }
    }

    impl SampleStream for FixedStream {
        fn kind(&self) -> MediaKind {
            self.kind
        }

        fn next_sample(&mut self) -> Option<SampleBuffer> {
            self.samples.pop_front()
        }
    }

    #[derive(Default)]
    struct SinkLog {
        pushed: Vec<(MediaTime, bool)>,
        finished: bool,
        budget: Option<usize>,
        reject: bool,
    }

    struct LogSink {
        descriptor: TrackDescriptor,
        log: Arc<Mutex<SinkLog>>,
    }

    impl SinkTrack for LogSink {
        fn descriptor(&self) -> &TrackDescriptor {
            &self.descriptor
        }

        fn is_ready_for_more(&self) -> bool {
            self.log.lock().budget.map_or(true, |budget| budget > 0)
        }

        fn request_data_when_ready(&mut self, _notifier: ReadyNotifier) {}

        fn push(&mut self, sample: SampleBuffer) -> Result<(), MediaError> {
            let mut log = self.log.lock();
            if log.reject {
                return Err(MediaError::muxer("rejected"));
            }
            if let Some(budget) = log.budget.as_mut() {
                *budget -= 1;
            }
            let pooled = sample.as_frame().map_or(false, FrameBuffer::is_pooled);
            log.pushed.push((sample.pts, pooled));
            Ok(())
        }

        fn mark_finished(&mut self) {
            self.log.lock().finished = true;
        }
    }

    struct StatusDemuxer(SourceStatus);

    impl SourceDemuxer for StatusDemuxer {
        fn set_time_range(&mut self, _range: TimeRange) {}
        fn add_video_output(
            &mut self,
            _tracks: &[TrackId],
            _decode: &OutputSettings,
            _composition: &VideoComposition,
        ) -> Result<Box<dyn SampleStream>, MediaError> {
            Err(MediaError::demuxer("unused"))
        }
        fn add_audio_output(
            &mut self,
            _tracks: &[TrackId],
            _decode: &OutputSettings,
        ) -> Result<Box<dyn SampleStream>, MediaError> {
            Err(MediaError::demuxer("unused"))
        }
        fn start_reading(&mut self) -> Result<(), MediaError> {
            Ok(())
        }
        fn cancel_reading(&mut self) {
            self.0 = SourceStatus::Cancelled;
        }
        fn status(&self) -> SourceStatus {
            self.0
        }
        fn error(&self) -> Option<MediaError> {
            None
        }
    }

    struct StatusMuxer(SinkStatus);

    impl SinkMuxer for StatusMuxer {
        fn set_metadata(&mut self, _items: &[MetadataItem]) {}
        fn set_optimize_for_network_use(&mut self, _enabled: bool) {}
        fn can_add_track(&self, _descriptor: &TrackDescriptor) -> bool {
            true
        }
        fn add_track(&mut self, _descriptor: TrackDescriptor) -> Result<Box<dyn SinkTrack>, MediaError> {
            Err(MediaError::muxer("unused"))
        }
        fn start_writing(&mut self) -> Result<(), MediaError> {
            Ok(())
        }
        fn start_session(&mut self, _at: MediaTime) {}
        fn finish_writing(&mut self) -> Result<(), MediaError> {
            Ok(())
        }
        fn cancel_writing(&mut self) {
            self.0 = SinkStatus::Cancelled;
        }
        fn status(&self) -> SinkStatus {
            self.0
        }
        fn error(&self) -> Option<MediaError> {
            None
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        progress: Mutex<Vec<f32>>,
        faults: Mutex<Vec<MediaKind>>,
    }

    impl PumpObserver for RecordingObserver {
        fn publish_progress(&self, progress: f32) {
            self.progress.lock().push(progress);
        }

        fn report_fault(&self, track: MediaKind, _error: &MediaError) {
            self.faults.lock().push(track);
        }
    }

    struct Rig {
        pump: TrackPump,
        log: Arc<Mutex<SinkLog>>,
        demuxer: SharedDemuxer,
        muxer: SharedMuxer,
        observer: Arc<RecordingObserver>,
        barrier: CompletionBarrier,
    }

    fn rig(stream: Box<dyn SampleStream>) -> Rig {
        let log = Arc::new(Mutex::new(SinkLog::default()));
        let sink = LogSink {
            descriptor: TrackDescriptor::new(stream.kind(), None),
            log: Arc::clone(&log),
        };
        let demuxer: SharedDemuxer =
            Arc::new(Mutex::new(Box::new(StatusDemuxer(SourceStatus::Reading))));
        let muxer: SharedMuxer = Arc::new(Mutex::new(Box::new(StatusMuxer(SinkStatus::Writing))));
        let observer = Arc::new(RecordingObserver::default());
        let weak_observer: Weak<dyn PumpObserver> =
            Arc::downgrade(&(Arc::clone(&observer) as Arc<dyn PumpObserver>));
        let mut barrier = CompletionBarrier::new();
        let slot = barrier.slot(stream.kind());
        let pump = TrackPump::new(
            stream,
            Box::new(sink),
            Some(Arc::clone(&demuxer)),
            Arc::clone(&muxer),
            slot,
            weak_observer,
        )
        .with_progress(ProgressScale::new(MediaTime::ZERO, MediaTime::from_millis(1_000)));
        Rig {
            pump,
            log,
            demuxer,
            muxer,
            observer,
            barrier,
        }
    }

    #[test]
    fn test_drains_stream_and_marks_finished() {
        let mut rig = rig(FixedStream::video(10));
        assert_eq!(rig.pump.run(), PumpState::Finished);
        let log = rig.log.lock();
        assert_eq!(log.pushed.len(), 10);
        assert!(log.finished);
        drop(log);

        let progress = rig.observer.progress.lock().clone();
        assert_eq!(progress.len(), 10);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert!((progress[9] - 0.9).abs() < 1e-6);

        let outcomes = rig.barrier.wait();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].state, PumpState::Finished);
        assert_eq!(outcomes[0].samples, 10);
    }

    #[test]
    fn test_backpressure_parks_and_resumes() {
        let mut rig = rig(FixedStream::video(5));
        rig.log.lock().budget = Some(2);
        assert_eq!(rig.pump.run(), PumpState::Running);
        assert_eq!(rig.log.lock().pushed.len(), 2);

        rig.log.lock().budget = Some(10);
        assert_eq!(rig.pump.run(), PumpState::Finished);
        assert_eq!(rig.log.lock().pushed.len(), 5);
    }

    #[test]
    fn test_cancelled_source_aborts_without_finishing_track() {
        let mut rig = rig(FixedStream::video(5));
        rig.log.lock().budget = Some(1);
        rig.pump.run();
        rig.demuxer.lock().cancel_reading();
        rig.log.lock().budget = None;

        assert_eq!(rig.pump.run(), PumpState::Aborted);
        assert!(!rig.log.lock().finished);
        assert!(rig.observer.faults.lock().is_empty());
        assert_eq!(rig.barrier.wait()[0].state, PumpState::Aborted);
    }

    #[test]
    fn test_parked_pump_aborts_when_sink_is_cancelled() {
        let mut rig = rig(FixedStream::video(5));
        rig.log.lock().budget = Some(0);
        rig.muxer.lock().cancel_writing();
        assert_eq!(rig.pump.run(), PumpState::Aborted);
        assert!(rig.log.lock().pushed.is_empty());
    }

    #[test]
    fn test_rejected_push_is_a_fault() {
        let mut rig = rig(FixedStream::video(3));
        rig.log.lock().reject = true;
        assert_eq!(rig.pump.run(), PumpState::Aborted);
        assert_eq!(*rig.observer.faults.lock(), vec![MediaKind::Video]);
        let outcome = rig.barrier.wait().remove(0);
        assert_eq!(outcome.fault.map(|f| f.message), Some("rejected".to_string()));
    }

    #[test]
    fn test_terminal_pump_ignores_further_runs() {
        let mut rig = rig(FixedStream::video(1));
        assert_eq!(rig.pump.run(), PumpState::Finished);
        assert_eq!(rig.pump.run(), PumpState::Finished);
        assert_eq!(rig.barrier.wait().len(), 1);
    }

    #[test]
    fn test_render_hook_output_is_pushed() {
        let rig = rig(FixedStream::video(3));
        let hook: Arc<crate::frame_transform::RenderHook> =
            Arc::new(|_: &FrameBuffer, _: MediaTime, target: &mut FrameBuffer| target.fill(1));
        let pool = FramePool::new(2, 2, PixelFormat::bgra(), 4);
        let Rig {
            pump, log, barrier, ..
        } = rig;
        let mut pump = pump.with_transformer(FrameTransformer::new(pool, MediaTime::ZERO, &hook, 0));
        assert_eq!(pump.run(), PumpState::Finished);
        assert!(log.lock().pushed.iter().all(|(_, pooled)| *pooled));
        assert_eq!(barrier.wait().len(), 1);
    }

    #[test]
    fn test_zero_total_reports_complete_progress() {
        let scale = ProgressScale::new(MediaTime::from_millis(500), MediaTime::ZERO);
        assert_eq!(scale.progress_at(MediaTime::from_millis(900)), 1.0);
        let scale = ProgressScale::new(MediaTime::from_millis(500), MediaTime::from_millis(1_000));
        assert!((scale.progress_at(MediaTime::from_millis(750)) - 0.25).abs() < 1e-6);
    }
}

//! Export session: the caller-facing entry point.
//!
//! An [`ExportSession`] validates a request, builds the demuxer and muxer,
//! wires one [`TrackPump`] per output track, and hands the pumps to a
//! serial queue. Completion is observed through a barrier, either on the
//! calling thread ([`FinalizeMode::Blocking`]) or on a dedicated finalize
//! thread ([`FinalizeMode::Background`]).

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use clipforge_common::config::ExportDefaults;
use clipforge_common::error::{ExportError, ExportResult, MediaError};
use clipforge_common::time::MediaTime;
use clipforge_media_model::{
    keys, ExportRequest, ExportStatus, FinalizeMode, FrameBuffer, FramePool, MediaKind,
    OutputSettings, PixelFormat, SourceTrackInfo, TrackDescriptor, TrackId, VideoComposition,
};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::coordinator::{remove_partial_output, CompletionBarrier, CompletionCoordinator, Settlement};
use crate::frame_transform::{FrameTransformer, RenderHook};
use crate::media::{
    MediaAsset, MuxerFactory, ReadyNotifier, SampleStream, SharedDemuxer, SharedMuxer, SinkTrack,
};
use crate::pump::{ProgressScale, PumpObserver, TrackPump};
use crate::queue::{QueueHandle, SerialQueue};
use crate::status::{derive_status, SessionFlags};
use crate::transform::{compute_composition, CompositionInputs};

/// Caller hook receiving progress in `[0.0, 1.0]`.
pub type ProgressHook = dyn Fn(f32) + Send + Sync;

/// Caller hook receiving the final outcome.
pub type CompletionHook = Box<dyn FnOnce(ExportOutcome) + Send>;

/// Final report of an export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub status: ExportStatus,
    /// Sink error, else source error, else the engine fault.
    pub error: Option<MediaError>,
    pub output: PathBuf,
    pub progress: f32,
}

impl ExportOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ExportStatus::Completed
    }
}

#[derive(Default)]
struct Hooks {
    progress: Option<Box<ProgressHook>>,
    render: Option<Arc<RenderHook>>,
    completion: Option<CompletionHook>,
}

struct Engine {
    demuxer: SharedDemuxer,
    muxer: SharedMuxer,
    queue: QueueHandle,
    pumps: Vec<Weak<Mutex<TrackPump>>>,
    settled: bool,
}

/// State shared by the session, its handles, its pumps (weakly), and the
/// finalize thread.
struct SessionShared {
    progress_bits: AtomicU32,
    flags: Arc<SessionFlags>,
    rejected: AtomicBool,
    fault: Mutex<Option<MediaError>>,
    hooks: Mutex<Hooks>,
    engine: Mutex<Option<Engine>>,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            progress_bits: AtomicU32::new(0f32.to_bits()),
            flags: Arc::new(SessionFlags::default()),
            rejected: AtomicBool::new(false),
            fault: Mutex::new(None),
            hooks: Mutex::new(Hooks::default()),
            engine: Mutex::new(None),
        }
    }

    fn progress(&self) -> f32 {
        f32::from_bits(self.progress_bits.load(Ordering::SeqCst))
    }

    fn set_progress(&self, progress: f32) {
        self.progress_bits.store(progress.to_bits(), Ordering::SeqCst);
        if let Some(hook) = self.hooks.lock().progress.as_ref() {
            hook(progress);
        }
    }

    fn collaborators(&self) -> Option<(SharedDemuxer, SharedMuxer)> {
        self.engine
            .lock()
            .as_ref()
            .map(|engine| (Arc::clone(&engine.demuxer), Arc::clone(&engine.muxer)))
    }

    fn status(&self) -> ExportStatus {
        if self.rejected.load(Ordering::SeqCst) {
            return ExportStatus::Failed;
        }
        match self.collaborators() {
            None => ExportStatus::Unknown,
            Some((demuxer, muxer)) => {
                let source = demuxer.lock().status();
                let sink = muxer.lock().status();
                derive_status(self.flags.inputs(source, sink))
            }
        }
    }

    fn error(&self) -> Option<MediaError> {
        let collaborator_error = self.collaborators().and_then(|(demuxer, muxer)| {
            let sink_error = muxer.lock().error();
            sink_error.or_else(|| demuxer.lock().error())
        });
        collaborator_error.or_else(|| self.fault.lock().clone())
    }

    /// Enqueue cancellation of both collaborators, then re-run every pump so
    /// parked ones observe the new state.
    fn cancel_engine(&self, user_requested: bool) {
        let engine = self.engine.lock();
        let Some(engine) = engine.as_ref() else {
            tracing::debug!("Cancel ignored: export has not started");
            return;
        };
        if engine.settled {
            tracing::debug!("Cancel ignored: export already settled");
            return;
        }
        if user_requested && !self.flags.request_cancel() {
            return;
        }

        let demuxer = Arc::clone(&engine.demuxer);
        let muxer = Arc::clone(&engine.muxer);
        let pumps = engine.pumps.clone();
        let queued = engine.queue.submit(move || {
            demuxer.lock().cancel_reading();
            muxer.lock().cancel_writing();
            for pump in &pumps {
                run_pump(pump);
            }
        });
        tracing::info!(user_requested, queued, "Cancellation requested");
    }

    fn record_fault(&self, error: MediaError) {
        let mut fault = self.fault.lock();
        if fault.is_none() {
            *fault = Some(error);
        }
    }

    /// Single teardown point: publish the final progress, fire the
    /// completion hook, then release every hook.
    fn finish(&self, settlement: Settlement, output: PathBuf) {
        if let Some(engine) = self.engine.lock().as_mut() {
            engine.settled = true;
            engine.pumps.clear();
        }
        if let Some(fault) = settlement.error.clone() {
            self.record_fault(fault);
        }
        if settlement.status == ExportStatus::Completed && self.progress() < 1.0 {
            self.set_progress(1.0);
        }

        let Hooks {
            progress,
            render,
            completion,
        } = std::mem::take(&mut *self.hooks.lock());

        let outcome = ExportOutcome {
            status: settlement.status,
            error: settlement.error,
            output,
            progress: self.progress(),
        };
        tracing::info!(
            status = %outcome.status,
            progress = outcome.progress,
            output = %outcome.output.display(),
            "Export finished"
        );
        if let Some(completion) = completion {
            completion(outcome);
        }
        drop(progress);
        drop(render);
    }
}

impl PumpObserver for SessionShared {
    fn publish_progress(&self, progress: f32) {
        self.set_progress(progress);
    }

    fn report_fault(&self, track: MediaKind, error: &MediaError) {
        self.record_fault(error.clone());
        if self.flags.mark_runtime_fault() {
            tracing::error!(track = %track, error = %error, "Track pump failed; stopping export");
        }
        self.cancel_engine(false);
    }
}

fn run_pump(pump: &Weak<Mutex<TrackPump>>) {
    let Some(pump) = pump.upgrade() else {
        return;
    };
    let mut pump = pump.lock();
    if panic::catch_unwind(AssertUnwindSafe(|| pump.run())).is_err() {
        pump.abandon("track pump panicked");
    }
}

fn pump_notifier(queue: &QueueHandle, pump: Weak<Mutex<TrackPump>>) -> ReadyNotifier {
    let queue = queue.clone();
    ReadyNotifier::new(move || {
        let pump = pump.clone();
        queue.submit(move || run_pump(&pump));
    })
}

/// Cloneable handle for observing and cancelling an export from another
/// thread.
#[derive(Clone)]
pub struct ExportHandle {
    shared: Arc<SessionShared>,
}

impl ExportHandle {
    /// Request cancellation. Idempotent; a no-op before the export starts
    /// and after it has settled.
    pub fn cancel(&self) {
        self.shared.cancel_engine(true);
    }

    pub fn progress(&self) -> f32 {
        self.shared.progress()
    }

    pub fn status(&self) -> ExportStatus {
        self.shared.status()
    }
}

/// A caller-supplied output track fed from its own stream.
struct ExtraTrack {
    descriptor: TrackDescriptor,
    stream: Box<dyn SampleStream>,
}

/// Everything validation resolves before any collaborator is built.
struct ExportPlan {
    output: PathBuf,
    video_tracks: Vec<TrackId>,
    audio_tracks: Vec<TrackId>,
    video_settings: OutputSettings,
    audio_settings: Option<OutputSettings>,
    video_decode: OutputSettings,
    audio_decode: OutputSettings,
    composition: VideoComposition,
    progress: ProgressScale,
}

/// A sink track paired with the stream that feeds it.
struct WiredTrack {
    stream: Box<dyn SampleStream>,
    sink: Box<dyn SinkTrack>,
    from_demuxer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Rejected,
    Started,
}

/// One export from a source asset into an output container.
pub struct ExportSession {
    asset: Arc<dyn MediaAsset>,
    muxers: Arc<dyn MuxerFactory>,
    request: ExportRequest,
    defaults: ExportDefaults,
    extra_tracks: Vec<ExtraTrack>,
    shared: Arc<SessionShared>,
    phase: Phase,
}

impl ExportSession {
    pub fn new(
        asset: Arc<dyn MediaAsset>,
        muxers: Arc<dyn MuxerFactory>,
        request: ExportRequest,
    ) -> Self {
        Self {
            asset,
            muxers,
            request,
            defaults: ExportDefaults::default(),
            extra_tracks: Vec::new(),
            shared: Arc::new(SessionShared::new()),
            phase: Phase::Idle,
        }
    }

    pub fn with_defaults(mut self, defaults: ExportDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn request(&self) -> &ExportRequest {
        &self.request
    }

    pub fn set_finalize_mode(&mut self, mode: FinalizeMode) {
        self.request.finalize_mode = mode;
    }

    pub fn on_progress(&mut self, hook: impl Fn(f32) + Send + Sync + 'static) {
        self.shared.hooks.lock().progress = Some(Box::new(hook));
    }

    pub fn on_render(
        &mut self,
        hook: impl Fn(&FrameBuffer, MediaTime, &mut FrameBuffer) + Send + Sync + 'static,
    ) {
        self.shared.hooks.lock().render = Some(Arc::new(hook));
    }

    /// Add an output track fed from `stream` rather than the demuxer.
    pub fn add_track(&mut self, descriptor: TrackDescriptor, stream: Box<dyn SampleStream>) {
        self.extra_tracks.push(ExtraTrack { descriptor, stream });
    }

    pub fn handle(&self) -> ExportHandle {
        ExportHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn cancel(&self) {
        self.shared.cancel_engine(true);
    }

    pub fn progress(&self) -> f32 {
        self.shared.progress()
    }

    pub fn status(&self) -> ExportStatus {
        self.shared.status()
    }

    pub fn error(&self) -> Option<MediaError> {
        self.shared.error()
    }

    /// Validate the request against the asset without touching any
    /// collaborator, returning the composition an export would use.
    pub fn preflight(&self) -> ExportResult<VideoComposition> {
        self.validate().map(|plan| plan.composition)
    }

    /// Start the export.
    ///
    /// Synchronous failures (configuration, setup, start) are returned here
    /// and leave no output behind; `completion` is not called for them. In
    /// blocking mode this returns after `completion` has run; in background
    /// mode it returns as soon as the pumps are scheduled.
    ///
    /// Blocking mode parks the calling thread and must not be used from an
    /// async runtime worker; use [`run_export`] there.
    pub fn export(
        &mut self,
        completion: impl FnOnce(ExportOutcome) + Send + 'static,
    ) -> ExportResult<()> {
        if self.phase != Phase::Idle {
            return Err(ExportError::configuration("export has already been started"));
        }

        let result = self.launch(Box::new(completion));
        if let Err(err) = &result {
            tracing::error!(kind = %err.kind(), error = %err, "Export rejected");
            self.phase = Phase::Rejected;
            self.shared.rejected.store(true, Ordering::SeqCst);
            if let Some(cause) = err.cause() {
                self.shared.record_fault(cause.clone());
            }
            drop(std::mem::take(&mut *self.shared.hooks.lock()));
        }
        result
    }

    fn launch(&mut self, completion: CompletionHook) -> ExportResult<()> {
        let plan = self.validate()?;
        tracing::info!(
            output = %plan.output.display(),
            container = %self.request.container.as_str(),
            mode = ?self.request.finalize_mode,
            render_w = plan.composition.render_size.width,
            render_h = plan.composition.render_size.height,
            "Starting export"
        );

        let output_existed = plan.output.exists();
        let demuxer = self
            .asset
            .open_demuxer()
            .map_err(|e| ExportError::setup("failed to open source demuxer", Some(e)))?;
        let demuxer: SharedDemuxer = Arc::new(Mutex::new(demuxer));
        let muxer = match self.muxers.create_muxer(&plan.output, &self.request.container) {
            Ok(muxer) => muxer,
            Err(e) => {
                demuxer.lock().cancel_reading();
                return Err(ExportError::setup(
                    format!("{} could not create a muxer", self.muxers.name()),
                    Some(e),
                ));
            }
        };
        let muxer: SharedMuxer = Arc::new(Mutex::new(muxer));

        let started = self
            .wire(&plan, &demuxer, &muxer)
            .and_then(|tracks| self.start_collaborators(&demuxer, &muxer).map(|()| tracks))
            .and_then(|tracks| {
                SerialQueue::spawn("clipforge-export")
                    .map(|queue| (tracks, queue))
                    .map_err(|e| {
                        ExportError::start(format!("failed to spawn export queue: {e}"), None)
                    })
            });
        let (tracks, queue) = match started {
            Ok(started) => started,
            Err(err) => {
                abandon_collaborators(&demuxer, &muxer, &plan.output, output_existed);
                return Err(err);
            }
        };

        let mut barrier = CompletionBarrier::new();
        let shared_dyn: Arc<dyn PumpObserver> = Arc::clone(&self.shared) as Arc<dyn PumpObserver>;
        let observer = Arc::downgrade(&shared_dyn);
        drop(shared_dyn);
        let render_hook = self.shared.hooks.lock().render.clone();

        let pumps: Vec<Arc<Mutex<TrackPump>>> = tracks
            .into_iter()
            .map(|track| {
                let kind = track.sink.descriptor().kind;
                let mut pump = TrackPump::new(
                    track.stream,
                    track.sink,
                    track.from_demuxer.then(|| Arc::clone(&demuxer)),
                    Arc::clone(&muxer),
                    barrier.slot(kind),
                    observer.clone(),
                );
                if kind == MediaKind::Video && track.from_demuxer {
                    pump = pump.with_progress(plan.progress);
                    if let Some(hook) = &render_hook {
                        pump = pump.with_transformer(self.frame_transformer(&plan, hook));
                    }
                }
                Arc::new(Mutex::new(pump))
            })
            .collect();
        drop(render_hook);

        *self.shared.engine.lock() = Some(Engine {
            demuxer: Arc::clone(&demuxer),
            muxer: Arc::clone(&muxer),
            queue: queue.handle(),
            pumps: pumps.iter().map(Arc::downgrade).collect(),
            settled: false,
        });
        self.shared.hooks.lock().completion = Some(completion);
        self.phase = Phase::Started;

        for pump in &pumps {
            let notifier = pump_notifier(&queue.handle(), Arc::downgrade(pump));
            pump.lock().arm(notifier);
        }
        tracing::info!(pumps = pumps.len(), "Track pumps scheduled");

        let active = ActiveExport {
            pumps,
            coordinator: CompletionCoordinator::new(
                barrier,
                queue,
                demuxer,
                muxer,
                Arc::clone(&self.shared.flags),
                plan.output.clone(),
            ),
            shared: Arc::clone(&self.shared),
            output: plan.output.clone(),
        };

        match self.request.finalize_mode {
            FinalizeMode::Blocking => {
                active.complete();
                Ok(())
            }
            FinalizeMode::Background => {
                let spawned = thread::Builder::new()
                    .name("clipforge-finalize".to_string())
                    .spawn(move || active.complete());
                match spawned {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        if let Some((demuxer, muxer)) = self.shared.collaborators() {
                            abandon_collaborators(&demuxer, &muxer, &plan.output, output_existed);
                        }
                        if let Some(engine) = self.shared.engine.lock().as_mut() {
                            engine.settled = true;
                        }
                        Err(ExportError::start(
                            format!("failed to spawn finalize thread: {e}"),
                            None,
                        ))
                    }
                }
            }
        }
    }

    fn validate(&self) -> ExportResult<ExportPlan> {
        let request = &self.request;
        let output = request
            .output
            .clone()
            .ok_or_else(|| ExportError::configuration("no output location set"))?;

        let range = request.time_range;
        if range.start.is_negative() {
            return Err(ExportError::configuration(format!(
                "time range starts before zero ({})",
                range.start
            )));
        }
        if matches!(range.duration, Some(d) if d.as_nanos() <= 0) {
            return Err(ExportError::configuration("time range is empty"));
        }
        let total = range.effective_duration(self.asset.duration());
        if total.as_nanos() <= 0 || (range.is_unbounded() && range.start >= self.asset.duration()) {
            return Err(ExportError::configuration(format!(
                "time range selects nothing of the source ({})",
                range.start
            )));
        }

        let mut video_settings = request
            .video
            .clone()
            .ok_or_else(|| ExportError::configuration("video output settings are required"))?;
        if video_settings.dimensions().is_none() {
            return Err(ExportError::configuration(
                "video output settings must carry a positive width and height",
            ));
        }
        if !video_settings.contains(keys::CODEC) {
            video_settings.insert(keys::CODEC, self.defaults.video_codec.as_str());
        }

        let video: Vec<SourceTrackInfo> = self
            .asset
            .tracks_of(MediaKind::Video)
            .into_iter()
            .filter(|track| track.playable)
            .collect();
        let first_video = video
            .first()
            .ok_or_else(|| ExportError::configuration("source has no playable video track"))?;

        let composition = match &request.composition {
            Some(composition) => {
                if composition.render_size.is_empty() {
                    return Err(ExportError::configuration(
                        "supplied composition has an empty render size",
                    ));
                }
                composition.clone()
            }
            None => compute_composition(&CompositionInputs {
                track: first_video,
                video_settings: &video_settings,
                time_range: range,
                asset_duration: self.asset.duration(),
                fallback_frame_rate: self.defaults.fallback_frame_rate,
            })?,
        };

        let audio_tracks: Vec<TrackId> = self
            .asset
            .tracks_of(MediaKind::Audio)
            .into_iter()
            .filter(|track| track.playable)
            .map(|track| track.id)
            .collect();

        let audio_settings = request.audio.clone().map(|mut settings| {
            if !settings.contains(keys::CODEC) {
                settings.insert(keys::CODEC, self.defaults.audio_codec.as_str());
            }
            settings
        });

        let mut video_decode = request.video_decode.clone().unwrap_or_default();
        if !video_decode.contains(keys::PIXEL_FORMAT) {
            video_decode.insert(keys::PIXEL_FORMAT, self.defaults.pixel_format.as_str());
        }
        let audio_decode = request
            .audio_decode
            .clone()
            .unwrap_or_else(|| OutputSettings::new().with(keys::FORMAT, "lpcm"));

        Ok(ExportPlan {
            output,
            video_tracks: video.iter().map(|track| track.id).collect(),
            audio_tracks,
            video_settings,
            audio_settings,
            video_decode,
            audio_decode,
            composition,
            progress: ProgressScale::new(range.start, total),
        })
    }

    fn wire(
        &mut self,
        plan: &ExportPlan,
        demuxer: &SharedDemuxer,
        muxer: &SharedMuxer,
    ) -> ExportResult<Vec<WiredTrack>> {
        let mut demuxer = demuxer.lock();
        let mut muxer = muxer.lock();

        demuxer.set_time_range(self.request.time_range);
        muxer.set_metadata(&self.request.metadata);
        muxer.set_optimize_for_network_use(self.request.optimize_for_network_use);

        let mut tracks = Vec::new();

        let stream = demuxer
            .add_video_output(&plan.video_tracks, &plan.video_decode, &plan.composition)
            .map_err(|e| ExportError::setup("demuxer rejected the video output", Some(e)))?;
        let descriptor = TrackDescriptor::new(MediaKind::Video, Some(plan.video_settings.clone()));
        let sink = add_sink_track(&mut **muxer, descriptor)?;
        tracks.push(WiredTrack {
            stream,
            sink,
            from_demuxer: true,
        });

        if plan.audio_tracks.is_empty() {
            tracing::debug!("Source has no playable audio; exporting video only");
        } else {
            let stream = demuxer
                .add_audio_output(&plan.audio_tracks, &plan.audio_decode)
                .map_err(|e| ExportError::setup("demuxer rejected the audio output", Some(e)))?;
            let descriptor = TrackDescriptor::new(MediaKind::Audio, plan.audio_settings.clone());
            let sink = add_sink_track(&mut **muxer, descriptor)?;
            tracks.push(WiredTrack {
                stream,
                sink,
                from_demuxer: true,
            });
        }

        for extra in self.extra_tracks.drain(..) {
            let sink = add_sink_track(&mut **muxer, extra.descriptor)?;
            tracks.push(WiredTrack {
                stream: extra.stream,
                sink,
                from_demuxer: false,
            });
        }

        Ok(tracks)
    }

    fn start_collaborators(&self, demuxer: &SharedDemuxer, muxer: &SharedMuxer) -> ExportResult<()> {
        muxer
            .lock()
            .start_writing()
            .map_err(|e| ExportError::start("muxer could not begin writing", Some(e)))?;
        demuxer
            .lock()
            .start_reading()
            .map_err(|e| ExportError::start("demuxer could not begin reading", Some(e)))?;
        muxer.lock().start_session(self.request.time_range.start);
        Ok(())
    }

    fn frame_transformer(&self, plan: &ExportPlan, hook: &Arc<RenderHook>) -> FrameTransformer {
        let (width, height) = plan.composition.render_size.to_pixels();
        let format = plan
            .video_decode
            .get_str(keys::PIXEL_FORMAT)
            .map(PixelFormat::new)
            .unwrap_or_else(PixelFormat::bgra);
        let pool = FramePool::new(width, height, format, self.defaults.frame_pool_capacity);
        FrameTransformer::new(
            pool,
            self.request.time_range.start,
            hook,
            self.defaults.max_pool_failures,
        )
    }
}

fn add_sink_track(
    muxer: &mut dyn crate::media::SinkMuxer,
    descriptor: TrackDescriptor,
) -> ExportResult<Box<dyn SinkTrack>> {
    let kind = descriptor.kind;
    if !muxer.can_add_track(&descriptor) {
        return Err(ExportError::setup(
            format!("muxer cannot add a {kind} track with the requested settings"),
            None,
        ));
    }
    let codec = descriptor
        .settings
        .as_ref()
        .and_then(|settings| settings.codec().map(str::to_string));
    let sink = muxer
        .add_track(descriptor)
        .map_err(|e| ExportError::setup(format!("muxer rejected the {kind} track"), Some(e)))?;
    tracing::info!(track = %kind, codec = codec.as_deref().unwrap_or("passthrough"), "Wired track");
    Ok(sink)
}

/// Undo a half-started export: stop both collaborators and remove any file
/// this export created.
fn abandon_collaborators(
    demuxer: &SharedDemuxer,
    muxer: &SharedMuxer,
    output: &Path,
    output_existed: bool,
) {
    demuxer.lock().cancel_reading();
    muxer.lock().cancel_writing();
    if !output_existed {
        remove_partial_output(output);
    }
}

/// Everything a running export needs until it settles.
struct ActiveExport {
    pumps: Vec<Arc<Mutex<TrackPump>>>,
    coordinator: CompletionCoordinator,
    shared: Arc<SessionShared>,
    output: PathBuf,
}

impl ActiveExport {
    fn complete(self) {
        let ActiveExport {
            pumps,
            coordinator,
            shared,
            output,
        } = self;
        let settlement = coordinator.finalize();
        drop(pumps);
        shared.finish(settlement, output);
    }
}

/// Run `session` in background mode and resolve once it settles.
pub async fn run_export(mut session: ExportSession) -> ExportResult<ExportOutcome> {
    session.set_finalize_mode(FinalizeMode::Background);
    let (tx, rx) = oneshot::channel();
    session.export(move |outcome| {
        let _ = tx.send(outcome);
    })?;
    drop(session);
    rx.await
        .map_err(|_| ExportError::runtime("export ended without reporting an outcome", None))
}

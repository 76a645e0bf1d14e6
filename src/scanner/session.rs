//! Sampling loop

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{CardPipeline, ScanEvent, TrackerSnapshot};
use crate::capture::{DetectedRegion, FrameSource, RegionSampler, SamplerConfig};
use crate::vision::presence::{self, PresenceThresholds};
use crate::vision::{EnhanceInput, StabilityTracker, TrackerConfig, TrackerEvent, TrackerUpdate};

/// One scanning session over a frame source
///
/// Each tick samples the zone, classifies it and steps the tracker
/// synchronously, so there is never more than one sample in flight.
pub struct ScanSession {
    sampler: RegionSampler,
    thresholds: PresenceThresholds,
    tracker: StabilityTracker,
    source: Arc<dyn FrameSource>,
    pipeline: Arc<CardPipeline>,
    snapshot: Arc<RwLock<TrackerSnapshot>>,
    events: Sender<ScanEvent>,
    cancel: CancellationToken,
    started: Instant,
    ticks: u64,
}

impl ScanSession {
    pub fn new(
        sampler: SamplerConfig,
        thresholds: PresenceThresholds,
        tracker: TrackerConfig,
        source: Arc<dyn FrameSource>,
        pipeline: Arc<CardPipeline>,
    ) -> (Self, Receiver<ScanEvent>) {
        let (events, receiver) = unbounded();
        let zone = sampler.zone;
        let session = Self {
            sampler: RegionSampler::new(sampler),
            thresholds,
            tracker: StabilityTracker::new(tracker, zone),
            source,
            pipeline,
            snapshot: Arc::new(RwLock::new(TrackerSnapshot::default())),
            events,
            cancel: CancellationToken::new(),
            started: Instant::now(),
            ticks: 0,
        };
        (session, receiver)
    }

    /// Start the sampling loop on the tokio runtime
    pub fn spawn(self, events: Receiver<ScanEvent>) -> ScanHandle {
        let cancel = self.cancel.clone();
        let snapshot = self.snapshot.clone();
        let task = tokio::spawn(self.run());
        ScanHandle {
            cancel,
            snapshot,
            events,
            task,
        }
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.snapshot.read().clone()
    }

    /// Process one sampling tick
    ///
    /// Returns `None` when the source had no frame. Must run inside a tokio
    /// runtime: a capture is handed to the pipeline on a spawned task.
    pub(crate) fn tick(&mut self) -> Option<TrackerUpdate> {
        let now_ms = self.started.elapsed().as_millis() as u64;
        let sample = self.sampler.sample(self.source.as_ref())?;
        self.ticks += 1;

        let assessment = presence::assess(&sample, self.tracker.was_detecting(), &self.thresholds);
        let update = self.tracker.step(
            now_ms,
            assessment.present,
            Some(&sample),
            self.source.as_ref(),
        );

        let region = DetectedRegion::from_rect(sample.source(), assessment.confidence);
        *self.snapshot.write() = TrackerSnapshot {
            state: update.state,
            progress: update.progress,
            region: assessment.present.then_some(region),
            ticks: self.ticks,
        };

        match &update.event {
            Some(TrackerEvent::Detected) => self.emit(ScanEvent::Detected),
            Some(TrackerEvent::CardLost) => self.emit(ScanEvent::CardLost),
            Some(TrackerEvent::Rearmed) => self.emit(ScanEvent::Rearmed),
            Some(TrackerEvent::Stable(raster)) => {
                let region = DetectedRegion::from_rect(raster.source(), assessment.confidence);
                info!(
                    "Card captured at {}x{}+{}+{}",
                    region.width, region.height, region.x, region.y
                );
                self.emit(ScanEvent::Captured { region });
                self.process_capture(raster.clone());
            }
            None => {}
        }

        Some(update)
    }

    fn process_capture(&self, raster: crate::capture::RasterSample) {
        let pipeline = self.pipeline.clone();
        let events = self.events.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let outcome = pipeline.process(EnhanceInput::Card(&raster)).await;
            if cancel.is_cancelled() {
                debug!("Session stopped, discarding {:?}", outcome);
                return;
            }
            let _ = events.send(ScanEvent::Processed(outcome));
        });
    }

    fn emit(&self, event: ScanEvent) {
        if self.events.send(event).is_err() {
            debug!("Scan event receiver dropped");
        }
    }

    async fn run(mut self) {
        let mut interval = tokio::time::interval(self.sampler.config().cadence.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Scan session started ({:?} cadence)",
            self.sampler.config().cadence
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }

        self.tracker.reset();
        *self.snapshot.write() = TrackerSnapshot::default();
        info!("Scan session stopped after {} ticks", self.ticks);
    }
}

/// Handle to a running session
pub struct ScanHandle {
    cancel: CancellationToken,
    snapshot: Arc<RwLock<TrackerSnapshot>>,
    events: Receiver<ScanEvent>,
    task: JoinHandle<()>,
}

impl ScanHandle {
    /// Latest tracker state
    pub fn snapshot(&self) -> TrackerSnapshot {
        self.snapshot.read().clone()
    }

    pub fn events(&self) -> &Receiver<ScanEvent> {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop sampling and reset the tracker
    ///
    /// A capture still being processed finishes in the background; its result
    /// is dropped.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            debug!("Scan task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureZone, CapturedFrame, SharedFrameSource};
    use crate::scanner::pipeline::tests::pipeline;
    use crate::scanner::ProcessOutcome;
    use crate::vision::presence::tests::card_sample;
    use crate::vision::recognition::tests::CountingFactory;
    use crate::vision::TrackingState;
    use image::{imageops, Rgba, RgbaImage};
    use std::time::Duration;

    /// Frame whose detection zone is exactly the synthetic card sample
    fn card_frame() -> RgbaImage {
        let mut frame = RgbaImage::from_pixel(333, 187, Rgba([235, 235, 235, 255]));
        let zone = CaptureZone::default().rect(333, 187).unwrap();
        assert_eq!((zone.width, zone.height), (100, 140));
        imageops::replace(&mut frame, card_sample().image(), zone.x as i64, zone.y as i64);
        frame
    }

    fn session(source: Arc<SharedFrameSource>) -> (ScanSession, Receiver<ScanEvent>) {
        let factory = Arc::new(CountingFactory::new("Lightning Bolt\nInstant", 90.0));
        ScanSession::new(
            SamplerConfig::default(),
            PresenceThresholds::default(),
            TrackerConfig::default(),
            source,
            Arc::new(pipeline(factory, 30.0)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_without_frame_is_noop() {
        let source = Arc::new(SharedFrameSource::new());
        let (mut session, _events) = session(source);

        assert!(session.tick().is_none());
        assert_eq!(session.snapshot().ticks, 0);
        assert_eq!(session.snapshot().state, TrackingState::NoCard);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_capture_and_process_card() {
        let source = Arc::new(SharedFrameSource::new());
        source.push(CapturedFrame::new(card_frame()));
        let (mut session, events) = session(source);

        let first = session.tick().unwrap();
        assert_eq!(first.state, TrackingState::Stabilizing);
        assert!(session.snapshot().region.is_some());
        assert!(matches!(events.try_recv(), Ok(ScanEvent::Detected)));

        let mut captured = false;
        for _ in 0..20 {
            tokio::time::advance(Duration::from_millis(100)).await;
            let update = session.tick().unwrap();
            if update.state == TrackingState::Stable {
                captured = true;
                break;
            }
        }
        assert!(captured);
        assert!(matches!(events.try_recv(), Ok(ScanEvent::Captured { .. })));

        let mut outcome = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if let Ok(ScanEvent::Processed(result)) = events.try_recv() {
                outcome = Some(result);
                break;
            }
        }
        match outcome {
            Some(ProcessOutcome::Completed { name, lookup, .. }) => {
                assert_eq!(name, "Lightning Bolt");
                assert!(lookup.success);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        // Card still in view: held in cooldown, no second capture
        for _ in 0..30 {
            tokio::time::advance(Duration::from_millis(100)).await;
            assert_eq!(session.tick().unwrap().state, TrackingState::Cooldown);
        }
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_session_stops_and_resets() {
        let source = Arc::new(SharedFrameSource::new());
        source.push(CapturedFrame::new(card_frame()));
        let (session, events) = session(source);

        let handle = session.spawn(events);
        tokio::time::sleep(Duration::from_millis(550)).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, TrackingState::Stabilizing);
        assert!(snapshot.progress > 0.0);
        assert!(handle.is_running());
        assert!(matches!(handle.events().try_recv(), Ok(ScanEvent::Detected)));

        let snapshot_ref = handle.snapshot.clone();
        handle.stop().await;
        assert_eq!(snapshot_ref.read().state, TrackingState::NoCard);
    }
}

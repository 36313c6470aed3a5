use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::*;
use anyhow::Result;
use tracing::{debug, info, warn};

/// Supplies decoded frames in order.
pub trait FrameSource<F>: Send {
    /// Nominal frame rate of the source.
    fn frames_per_second(&self) -> f64;

    /// Returns the next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<F>>;
}

/// Finds candidate vehicles in a frame.
pub trait Detector<F>: Send {
    fn detect(&mut self, frame_index: u64, frame: &F) -> Result<Vec<Detection>>;
}

/// Renders the end of run summary of every computed speed against the limit.
pub trait SummaryRenderer: Send {
    fn render(&mut self, samples: &[SpeedSample], overspeed_limit_kmh: f64) -> Result<()>;
}

/// Observes every processed frame, e.g. to present annotated frames.
pub trait FrameObserver<F>: Send {
    fn on_frame(
        &mut self,
        frame_index: u64,
        frame: &F,
        table: &TrackTable,
        evaluations: &[Evaluation],
    ) -> Result<()>;
}

/// Requests that a running [`Engine`] stops.
///
/// The engine checks the flag at the top of every frame, so it exits within one frame of [`StopHandle::stop`].
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Calibration supplied by configuration. The frame rate comes from the frame source.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub pixels_per_meter: f64,
    pub overspeed_limit_kmh: f64,
}

/// The result of a completed run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    /// Number of frames read from the source.
    pub frames: u64,
    /// Every computed speed, in the order computed.
    pub samples: Vec<SpeedSample>,
    /// Number of violation records requested.
    pub violations: usize,
    /// Whether the run ended because of a stop request rather than source exhaustion.
    pub stopped: bool,
    /// The error that ended the run early when the source could not supply a frame.
    pub source_error: Option<String>,
}

/// The frame loop: detector, tracker, speed estimator and violation dispatch for every frame.
///
/// # Examples
///
/// ```no_run
/// # use speedtrack::*;
/// # fn build<F>(
/// #     source: Box<dyn FrameSource<F>>,
/// #     detector: Box<dyn Detector<F>>,
/// #     sink: Box<dyn CommandSink<F>>,
/// #     renderer: Box<dyn SummaryRenderer>,
/// # ) -> anyhow::Result<()> {
/// let engine = Engine::new(
///     source,
///     detector,
///     sink,
///     renderer,
///     Tracker::default(),
///     Calibration {
///         pixels_per_meter: 8.0,
///         overspeed_limit_kmh: 60.0,
///     },
/// )?;
///
/// let stop = engine.stop_handle();
/// let summary = engine.run()?;
/// println!("{} speeds over {} frames", summary.samples.len(), summary.frames);
/// # Ok(())
/// # }
/// ```
pub struct Engine<F> {
    source: Box<dyn FrameSource<F>>,
    detector: Box<dyn Detector<F>>,
    sink: Box<dyn CommandSink<F>>,
    renderer: Box<dyn SummaryRenderer>,
    observer: Option<Box<dyn FrameObserver<F>>>,
    tracker: Tracker,
    estimator: SpeedEstimator,
    stop: StopHandle,
}

impl<F> Engine<F> {
    /// Returns a new Engine
    ///
    /// Fails if the calibration or the frame rate of `source` is not a finite positive number.
    ///
    /// # Parameters
    ///
    /// * `source`: The frame source.
    /// * `detector`: The vehicle detector.
    /// * `sink`: Receives the side effects of violations.
    /// * `renderer`: Renders the summary when the run ends.
    /// * `tracker`: The tracker, configured with its matching radius.
    /// * `calibration`: Pixel scale and speed limit.
    pub fn new(
        source: Box<dyn FrameSource<F>>,
        detector: Box<dyn Detector<F>>,
        sink: Box<dyn CommandSink<F>>,
        renderer: Box<dyn SummaryRenderer>,
        tracker: Tracker,
        calibration: Calibration,
    ) -> Result<Engine<F>, ConfigError> {
        let config = SpeedConfig::new(
            calibration.pixels_per_meter,
            calibration.overspeed_limit_kmh,
            source.frames_per_second(),
        )?;

        Ok(Engine {
            source,
            detector,
            sink,
            renderer,
            observer: None,
            tracker,
            estimator: SpeedEstimator::new(config),
            stop: StopHandle::default(),
        })
    }

    /// Set a frame observer
    pub fn with_observer(mut self, observer: Box<dyn FrameObserver<F>>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Return a handle which stops the run
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Process frames until the source is exhausted or a stop is requested, then render the summary and release
    /// the source.
    ///
    /// A source error ends the run like exhaustion does and is reported in [`RunSummary::source_error`]. Detector
    /// errors abort the run. Errors from side effects, the observer and the summary renderer are logged.
    pub fn run(self) -> Result<RunSummary> {
        let Engine {
            mut source,
            mut detector,
            mut sink,
            mut renderer,
            mut observer,
            mut tracker,
            estimator,
            stop,
        } = self;

        let mut summary = RunSummary::default();
        let mut table = TrackTable::new();

        loop {
            if stop.is_stopped() {
                info!(frames = summary.frames, "stop requested");
                summary.stopped = true;
                break;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    warn!(frames = summary.frames, "frame source failed: {err:#}");
                    summary.source_error = Some(format!("{err:#}"));
                    break;
                }
            };
            summary.frames += 1;
            let frame_index = summary.frames;

            let detections = detector.detect(frame_index, &frame)?;
            let FrameUpdate {
                table: next_table,
                continuations,
            } = tracker.update(&table, frame_index, &detections);

            let evaluations = continuations
                .iter()
                .filter_map(|continuation| estimator.evaluate(continuation))
                .collect::<Vec<_>>();
            debug!(
                frame_index,
                detections = detections.len(),
                tracked = next_table.len(),
                evaluated = evaluations.len(),
                "frame processed"
            );

            let now = SystemTime::now();
            let commands = evaluations
                .iter()
                .inspect(|evaluation| {
                    if evaluation.is_violation {
                        info!(
                            track_id = evaluation.track_id,
                            frame_index,
                            "overspeed {:.2} km/h",
                            evaluation.speed_kmh
                        );
                    }
                })
                .flat_map(|evaluation| plan_commands(evaluation, now))
                .collect::<Vec<_>>();
            summary.violations += commands
                .iter()
                .filter(|command| matches!(command, ViolationCommand::Log(_)))
                .count();
            summary
                .samples
                .extend(evaluations.iter().map(Evaluation::sample));

            let frame = Arc::new(frame);
            if !commands.is_empty() {
                if let Err(err) = sink.submit(commands, Arc::clone(&frame)) {
                    warn!(frame_index, "violation dispatch failed: {err:#}");
                }
            }

            if let Some(observer) = &mut observer {
                if let Err(err) = observer.on_frame(frame_index, &frame, &next_table, &evaluations)
                {
                    warn!(frame_index, "frame observer failed: {err:#}");
                }
            }

            table = next_table;
        }

        if let Err(err) = sink.finish() {
            warn!("violation dispatch did not complete: {err:#}");
        }
        if let Err(err) = renderer.render(
            &summary.samples,
            estimator.config().overspeed_limit_kmh(),
        ) {
            warn!("summary rendering failed: {err:#}");
        }
        drop(source);

        info!(
            frames = summary.frames,
            speeds = summary.samples.len(),
            violations = summary.violations,
            "run complete"
        );

        Ok(summary)
    }
}

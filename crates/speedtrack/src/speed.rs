use crate::*;
use tracing::debug;

const MPS_TO_KMH: f64 = 3.6;

/// Calibration constants for converting pixel displacement into road speed.
///
/// Fixed at startup. Every value must be finite and greater than zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedConfig {
    /// Pixels per metre of road in the source frame.
    pixels_per_meter: f64,
    /// Speeds strictly above this value are violations.
    overspeed_limit_kmh: f64,
    /// Nominal frame rate of the video source.
    frames_per_second: f64,
}

impl SpeedConfig {
    /// Returns a new SpeedConfig
    ///
    /// # Parameters
    ///
    /// * `pixels_per_meter`: Calibration factor of the source frame.
    /// * `overspeed_limit_kmh`: Speed limit in km/h.
    /// * `frames_per_second`: Frame rate of the video source.
    pub fn new(
        pixels_per_meter: f64,
        overspeed_limit_kmh: f64,
        frames_per_second: f64,
    ) -> Result<SpeedConfig, ConfigError> {
        Ok(SpeedConfig {
            pixels_per_meter: error::positive("pixels_per_meter", pixels_per_meter)?,
            overspeed_limit_kmh: error::positive("overspeed_limit_kmh", overspeed_limit_kmh)?,
            frames_per_second: error::positive("frames_per_second", frames_per_second)?,
        })
    }

    pub fn pixels_per_meter(&self) -> f64 {
        self.pixels_per_meter
    }

    pub fn overspeed_limit_kmh(&self) -> f64 {
        self.overspeed_limit_kmh
    }

    pub fn frames_per_second(&self) -> f64 {
        self.frames_per_second
    }
}

/// A speed computed for one tracked object in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    pub track_id: usize,
    pub speed_kmh: f64,
    pub frame: u64,
}

/// The outcome of evaluating a single continuation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub track_id: usize,
    pub speed_kmh: f64,
    pub is_violation: bool,
    pub frame: u64,
    /// Bounding box of the object in the evaluated frame.
    pub bbox: BoundingBox,
}

impl Evaluation {
    /// Returns the speed sample contributed to the run summary
    pub fn sample(&self) -> SpeedSample {
        SpeedSample {
            track_id: self.track_id,
            speed_kmh: self.speed_kmh,
            frame: self.frame,
        }
    }
}

/// Computes instantaneous speed from a continuation and classifies violations.
///
/// Evaluation is pure: it performs no I/O and requests side effects only by returning data.
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    config: SpeedConfig,
}

impl SpeedEstimator {
    pub fn new(config: SpeedConfig) -> SpeedEstimator {
        SpeedEstimator { config }
    }

    /// Return the config
    pub fn config(&self) -> &SpeedConfig {
        &self.config
    }

    /// Evaluate the speed of a continued track.
    ///
    /// Returns `None` when the elapsed time between the two observations is zero or negative, i.e. a duplicate or
    /// out-of-order frame index. No speed is produced for such continuations.
    pub fn evaluate(&self, continuation: &Continuation) -> Option<Evaluation> {
        let elapsed_seconds =
            continuation.elapsed_frames() as f64 / self.config.frames_per_second;
        if elapsed_seconds <= 0.0 {
            debug!(
                track_id = continuation.track_id,
                previous_frame = continuation.previous_frame,
                frame = continuation.frame,
                "skipping evaluation with non-positive elapsed time"
            );
            return None;
        }

        let distance_pixels = continuation.distance() as f64;
        let speed_mps = (distance_pixels / self.config.pixels_per_meter) / elapsed_seconds;
        let speed_kmh = speed_mps * MPS_TO_KMH;

        Some(Evaluation {
            track_id: continuation.track_id,
            speed_kmh,
            is_violation: speed_kmh > self.config.overspeed_limit_kmh,
            frame: continuation.frame,
            bbox: continuation.bbox.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use anyhow::Result;
    use assert_approx_eq::assert_approx_eq;

    fn continuation(previous: (f32, f32, u64), current: (f32, f32, u64)) -> Continuation {
        Continuation {
            track_id: 1,
            previous_center: Point::new(previous.0, previous.1),
            previous_frame: previous.2,
            center: Point::new(current.0, current.1),
            frame: current.2,
            bbox: BoundingBox::new(current.0 - 20.0, current.1 - 10.0, 40.0, 20.0),
        }
    }

    #[test]
    fn invalid_config() {
        assert_eq!(
            SpeedConfig::new(0.0, 60.0, 25.0),
            Err(ConfigError::NotPositive {
                name: "pixels_per_meter",
                value: 0.0
            })
        );
        assert!(SpeedConfig::new(8.0, -60.0, 25.0).is_err());
        assert!(SpeedConfig::new(8.0, 60.0, 0.0).is_err());
        assert!(SpeedConfig::new(8.0, 60.0, f64::INFINITY).is_err());
    }

    #[test]
    fn overspeed() -> Result<()> {
        let estimator = SpeedEstimator::new(SpeedConfig::new(8.0, 60.0, 25.0)?);
        let evaluation = estimator
            .evaluate(&continuation((100.0, 100.0, 10), (140.0, 100.0, 15)))
            .unwrap();

        assert_eq!(evaluation.track_id, 1);
        assert_eq!(evaluation.frame, 15);
        assert_approx_eq!(evaluation.speed_kmh, 90.0);
        assert!(evaluation.is_violation);

        Ok(())
    }

    #[test]
    fn speed_formula() -> Result<()> {
        let estimator = SpeedEstimator::new(SpeedConfig::new(12.5, 200.0, 30.0)?);
        let evaluation = estimator
            .evaluate(&continuation((10.0, 10.0, 1), (40.0, 50.0, 4)))
            .unwrap();

        // 50 px over 3 frames at 30 fps
        let expected = (50.0 / 12.5) / (3.0 / 30.0) * 3.6;
        assert_approx_eq!(evaluation.speed_kmh, expected);
        assert!(!evaluation.is_violation);

        Ok(())
    }

    #[test]
    fn limit_is_not_a_violation() -> Result<()> {
        // 8 px at 8 px/m in one frame at 1 fps is exactly 3.6 km/h
        let estimator = SpeedEstimator::new(SpeedConfig::new(8.0, 3.6, 1.0)?);
        let evaluation = estimator
            .evaluate(&continuation((0.0, 0.0, 1), (8.0, 0.0, 2)))
            .unwrap();

        assert_eq!(evaluation.speed_kmh, 3.6);
        assert!(!evaluation.is_violation);

        Ok(())
    }

    #[test]
    fn stationary() -> Result<()> {
        let estimator = SpeedEstimator::new(SpeedConfig::new(8.0, 60.0, 25.0)?);
        let evaluation = estimator
            .evaluate(&continuation((5.0, 5.0, 1), (5.0, 5.0, 2)))
            .unwrap();

        assert_eq!(evaluation.speed_kmh, 0.0);
        assert!(!evaluation.is_violation);

        Ok(())
    }

    #[test]
    fn duplicate_frame_is_skipped() -> Result<()> {
        let estimator = SpeedEstimator::new(SpeedConfig::new(8.0, 60.0, 25.0)?);
        assert!(estimator
            .evaluate(&continuation((100.0, 100.0, 7), (140.0, 100.0, 7)))
            .is_none());
        assert!(estimator
            .evaluate(&continuation((100.0, 100.0, 9), (140.0, 100.0, 7)))
            .is_none());

        Ok(())
    }

    #[test]
    fn sample() -> Result<()> {
        let estimator = SpeedEstimator::new(SpeedConfig::new(8.0, 60.0, 25.0)?);
        let evaluation = estimator
            .evaluate(&continuation((100.0, 100.0, 10), (140.0, 100.0, 15)))
            .unwrap();

        let sample = evaluation.sample();
        assert_eq!(sample.track_id, 1);
        assert_eq!(sample.frame, 15);
        assert_eq!(sample.speed_kmh, evaluation.speed_kmh);

        Ok(())
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Runtime configuration. Every field has a default so a YAML file only needs the values it changes.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Calibration factor of the source frames.
    pub pixels_per_meter: f64,
    /// Speeds above this value are violations.
    pub overspeed_limit_kmh: f64,
    /// Frame rate of the image sequence.
    pub frames_per_second: f64,
    /// Maximum centroid distance in pixels between frames for the same vehicle.
    pub match_radius: f32,
    /// Root of the snapshots, logs, chart, plates and frames directories.
    pub output_dir: PathBuf,
    /// External OCR command, e.g. `["tesseract", "{}", "stdout", "--psm", "7"]`. `{}` is replaced by the crop path.
    pub plate_command: Option<Vec<String>>,
    /// External program that plays the alert, e.g. `["aplay", "alert.wav"]`. The terminal bell is used without one.
    pub alert_command: Option<Vec<String>>,
    /// Frames with violations that may wait for the dispatch worker.
    pub dispatch_queue: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pixels_per_meter: 8.0,
            overspeed_limit_kmh: 60.0,
            frames_per_second: 25.0,
            match_radius: speedtrack::DEFAULT_MATCH_RADIUS,
            output_dir: PathBuf::from("."),
            plate_command: None,
            alert_command: None,
            dispatch_queue: 64,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.output_dir.join("snapshots")
    }

    pub fn violation_log(&self) -> PathBuf {
        self.output_dir.join("logs").join("violations.csv")
    }

    pub fn chart_path(&self) -> PathBuf {
        self.output_dir.join("chart").join("speed_chart.png")
    }

    pub fn plate_dir(&self) -> PathBuf {
        self.output_dir.join("plates")
    }

    pub fn frame_dir(&self) -> PathBuf {
        self.output_dir.join("frames")
    }
}

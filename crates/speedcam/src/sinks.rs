use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local};
use speedtrack::{AlertSink, BoundingBox, PlateReader, SnapshotStore, ViolationLog, ViolationRecord};
use tracing::{debug, info};

use crate::sources::Frame;
use crate::utils::frame_processing;

/// Rings the terminal bell. Used when no alert command is configured.
pub struct TerminalAlert;

impl AlertSink for TerminalAlert {
    fn alert(&mut self, track_id: usize, speed_kmh: f64) -> Result<()> {
        let mut stderr = io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        info!(track_id, "overspeed alert {:.2} km/h", speed_kmh);
        Ok(())
    }
}

/// Plays the alert through an external program, e.g. `["aplay", "alert.wav"]`, waiting for it to finish.
pub struct CommandAlert {
    program: String,
    args: Vec<String>,
}

impl CommandAlert {
    pub fn new(command: &[String]) -> Result<CommandAlert> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("alert command is empty"))?;
        Ok(CommandAlert {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl AlertSink for CommandAlert {
    fn alert(&mut self, track_id: usize, speed_kmh: f64) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .with_context(|| format!("running {}", self.program))?;
        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }
        info!(track_id, "overspeed alert {:.2} km/h", speed_kmh);
        Ok(())
    }
}

/// Saves the full frame of a violation as `<dir>/<track_id>.jpg`.
pub struct JpegSnapshotStore {
    dir: PathBuf,
}

impl JpegSnapshotStore {
    pub fn new(dir: PathBuf) -> Result<JpegSnapshotStore> {
        fs::create_dir_all(&dir)?;
        Ok(JpegSnapshotStore { dir })
    }

    pub fn path_for(&self, track_id: usize) -> PathBuf {
        self.dir.join(format!("{track_id}.jpg"))
    }
}

impl SnapshotStore<Frame> for JpegSnapshotStore {
    fn save(&mut self, track_id: usize, frame: &Frame) -> Result<()> {
        let path = self.path_for(track_id);
        frame
            .image()
            .save(&path)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        debug!(track_id, path = %path.display(), "snapshot saved");
        Ok(())
    }
}

/// Appends violation records to a CSV file: `track_id,speed_kmh,YYYY-MM-DD HH:MM:SS`.
///
/// The file is opened in append mode for every record and never truncated, so it accumulates across runs.
pub struct CsvViolationLog {
    path: PathBuf,
}

impl CsvViolationLog {
    pub fn new(path: PathBuf) -> Result<CsvViolationLog> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(CsvViolationLog { path })
    }
}

/// Format a timestamp as local wall-clock time.
pub fn local_timestamp(timestamp: SystemTime) -> String {
    DateTime::<Local>::from(timestamp)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

impl ViolationLog for CsvViolationLog {
    fn append(&mut self, record: &ViolationRecord) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("opening violation log {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(&[
            record.track_id().to_string(),
            format!("{:.2}", record.speed_kmh()),
            local_timestamp(record.timestamp()),
        ])?;
        writer.flush()?;
        Ok(())
    }
}

/// Runs an external OCR program on the crop of the violating vehicle.
///
/// The crop is written to `<dir>/<track_id>.png`. Every `{}` argument is replaced by that path, or the path is
/// appended when there is none. Non-empty lines of the program's standard output are the candidates.
pub struct CommandPlateReader {
    program: String,
    args: Vec<String>,
    dir: PathBuf,
}

impl CommandPlateReader {
    pub fn new(command: &[String], dir: PathBuf) -> Result<CommandPlateReader> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("plate command is empty"))?;
        fs::create_dir_all(&dir)?;
        Ok(CommandPlateReader {
            program: program.clone(),
            args: args.to_vec(),
            dir,
        })
    }

    fn args_for(&self, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        let mut args = self
            .args
            .iter()
            .map(|arg| arg.replace("{}", &path))
            .collect::<Vec<_>>();
        if !self.args.iter().any(|arg| arg.contains("{}")) {
            args.push(path.to_string());
        }
        args
    }
}

impl PlateReader<Frame> for CommandPlateReader {
    fn read(&mut self, track_id: usize, frame: &Frame, bbox: &BoundingBox) -> Result<Vec<String>> {
        let crop = frame_processing::crop(frame.image(), bbox)
            .ok_or_else(|| anyhow!("bounding box of track {track_id} lies outside the frame"))?;
        let path = self.dir.join(format!("{track_id}.png"));
        crop.save(&path)?;

        let output = Command::new(&self.program)
            .args(self.args_for(&path))
            .output()
            .with_context(|| format!("running {}", self.program))?;
        if !output.status.success() {
            bail!("{} exited with {}", self.program, output.status);
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }
}

mod config;
mod render;
mod sinks;
mod sources;
mod utils;

use std::{io, path::PathBuf, thread};

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use config::Config;
use render::{AnnotatedFrames, SpeedChart};
use sinks::{CommandAlert, CommandPlateReader, CsvViolationLog, JpegSnapshotStore, TerminalAlert};
use sources::{CsvDetections, ImageSequence};
use speedtrack::{
    AlertSink, BackgroundDispatcher, Calibration, Dispatcher, Engine, StopHandle, Tracker,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Estimate vehicle speeds from tracked detections and record overspeed violations
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Glob of the frame images, processed in path order
    #[arg(long)]
    frames: String,

    /// CSV of detections with the header frame,x,y,width,height[,confidence]
    #[arg(short, long)]
    detections: PathBuf,

    /// YAML configuration file, overridden by any flag below
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pixels per metre of road in the frames
    #[arg(short, long)]
    pixels_per_meter: Option<f64>,

    /// Speed limit in km/h
    #[arg(short = 'l', long)]
    overspeed_limit: Option<f64>,

    /// Frame rate of the image sequence
    #[arg(short, long)]
    fps: Option<f64>,

    /// Maximum centroid distance in pixels for a vehicle between frames
    #[arg(short, long)]
    match_radius: Option<f32>,

    /// Directory for snapshots, logs, chart, plates and frames
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// OCR command for plate crops, `{}` is replaced by the crop path
    #[arg(long)]
    plate_command: Option<String>,

    /// Program that plays the alert sound, e.g. `aplay alert.wav`. Without one the terminal bell rings
    #[arg(long)]
    alert_command: Option<String>,

    /// Write annotated frames
    #[arg(short, long, default_value_t = false)]
    write_images: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("speedcam=info,speedtrack=info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    info!(?config, "configuration");

    let source = ImageSequence::new(&args.frames, config.frames_per_second)?;
    let detector = CsvDetections::from_path(&args.detections)?;

    let alert: Box<dyn AlertSink> = match &config.alert_command {
        Some(command) => Box::new(CommandAlert::new(command)?),
        None => Box::new(TerminalAlert),
    };
    let mut dispatcher = Dispatcher::new(
        alert,
        Box::new(JpegSnapshotStore::new(config.snapshot_dir())?),
        Box::new(CsvViolationLog::new(config.violation_log())?),
    );
    if let Some(command) = &config.plate_command {
        dispatcher = dispatcher.with_plate_reader(Box::new(CommandPlateReader::new(
            command,
            config.plate_dir(),
        )?));
    }
    let sink = BackgroundDispatcher::spawn(dispatcher, config.dispatch_queue)?;

    let mut engine = Engine::new(
        Box::new(source),
        Box::new(detector),
        Box::new(sink),
        Box::new(SpeedChart::new(config.chart_path())),
        Tracker::new(config.match_radius)?,
        Calibration {
            pixels_per_meter: config.pixels_per_meter,
            overspeed_limit_kmh: config.overspeed_limit_kmh,
        },
    )?;
    if args.write_images {
        engine = engine.with_observer(Box::new(AnnotatedFrames::new(config.frame_dir())?));
    }

    let stop = engine.stop_handle();
    thread::Builder::new()
        .name("stop-listener".to_string())
        .spawn(move || listen_for_stop(stop))?;
    info!("processing frames, press Enter to stop");

    let summary = thread::Builder::new()
        .name("speedcam-worker".to_string())
        .spawn(move || engine.run())?
        .join()
        .map_err(|_| anyhow!("frame worker panicked"))??;

    println!(
        "{} frames, {} speeds, {} violations{}",
        summary.frames,
        summary.samples.len(),
        summary.violations,
        if summary.stopped { " (stopped)" } else { "" }
    );

    if let Some(err) = summary.source_error {
        bail!("frame source failed after {} frames: {err}", summary.frames);
    }

    Ok(())
}

/// Read the configuration file, if any, and apply the command line overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(pixels_per_meter) = args.pixels_per_meter {
        config.pixels_per_meter = pixels_per_meter;
    }
    if let Some(overspeed_limit) = args.overspeed_limit {
        config.overspeed_limit_kmh = overspeed_limit;
    }
    if let Some(fps) = args.fps {
        config.frames_per_second = fps;
    }
    if let Some(match_radius) = args.match_radius {
        config.match_radius = match_radius;
    }
    if let Some(output_dir) = &args.output_dir {
        config.output_dir = output_dir.to_path_buf();
    }
    if let Some(plate_command) = &args.plate_command {
        config.plate_command = Some(split_command(plate_command));
    }
    if let Some(alert_command) = &args.alert_command {
        config.alert_command = Some(split_command(alert_command));
    }

    Ok(config)
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(String::from).collect()
}

/// Stop the run when a line is entered. A closed stdin leaves the run going.
fn listen_for_stop(stop: StopHandle) {
    let mut line = String::new();
    match io::stdin().read_line(&mut line) {
        Ok(0) => {}
        Ok(_) => {
            info!("stop requested from terminal");
            stop.stop();
        }
        Err(err) => warn!("cannot read stop requests: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn flags_override_defaults() -> Result<()> {
        let args = Args::try_parse_from([
            "speedcam",
            "--frames",
            "frames/*.png",
            "--detections",
            "detections.csv",
            "--overspeed-limit",
            "80",
            "--fps",
            "30",
            "--plate-command",
            "tesseract {} stdout --psm 7",
            "--alert-command",
            "aplay  alert.wav",
        ])?;
        let config = load_config(&args)?;

        assert_eq!(config.overspeed_limit_kmh, 80.0);
        assert_eq!(config.frames_per_second, 30.0);
        assert_eq!(config.pixels_per_meter, 8.0);
        assert_eq!(
            config.plate_command,
            Some(
                ["tesseract", "{}", "stdout", "--psm", "7"]
                    .map(String::from)
                    .to_vec()
            )
        );
        assert_eq!(
            config.alert_command,
            Some(vec!["aplay".to_string(), "alert.wav".to_string()])
        );
        assert!(!args.write_images);

        Ok(())
    }

    #[test]
    fn missing_config_file() -> Result<()> {
        let args = Args::try_parse_from([
            "speedcam",
            "--frames",
            "*.png",
            "-d",
            "detections.csv",
            "-c",
            "/nonexistent/speedcam.yaml",
        ])?;
        assert!(load_config(&args).is_err());

        Ok(())
    }
}

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use itertools::Itertools;
use rusttype::Font;
use speedtrack::{Evaluation, FrameObserver, SpeedSample, SummaryRenderer, TrackTable};
use tracing::info;

use crate::sources::Frame;
use crate::utils::frame_processing;

static CHART_WIDTH: u32 = 1000;
static CHART_HEIGHT: u32 = 500;
static MARGIN: f32 = 50.0;
static GRID_KMH: f64 = 20.0;
static DASH: f32 = 10.0;
static LABEL_SIZE: f32 = 20.0;
static FONT: &[u8] = include_bytes!("../DejaVuSans.ttf");

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GREY: Rgb<u8> = Rgb([220, 220, 220]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const BLUE: Rgb<u8> = Rgb([30, 100, 220]);

/// Maps sample index and speed onto chart pixels.
struct Plot {
    width: f32,
    height: f32,
    count: usize,
    max_speed: f64,
}

impl Plot {
    fn new(samples: &[SpeedSample], overspeed_limit_kmh: f64) -> Plot {
        let fastest = samples
            .iter()
            .map(|sample| sample.speed_kmh)
            .fold(overspeed_limit_kmh, f64::max);
        Plot {
            width: CHART_WIDTH as f32,
            height: CHART_HEIGHT as f32,
            count: samples.len(),
            max_speed: fastest * 1.1,
        }
    }

    fn x(&self, index: usize) -> f32 {
        MARGIN + (self.width - 2.0 * MARGIN) * index as f32 / self.count.saturating_sub(1).max(1) as f32
    }

    fn y(&self, speed_kmh: f64) -> f32 {
        let span = (self.height - 2.0 * MARGIN) as f64;
        self.height - MARGIN - (span * speed_kmh / self.max_speed) as f32
    }
}

/// Line chart of every computed speed, in the order computed, against a dashed line at the limit.
pub struct SpeedChart {
    path: PathBuf,
}

impl SpeedChart {
    pub fn new(path: PathBuf) -> SpeedChart {
        SpeedChart { path }
    }
}

impl SummaryRenderer for SpeedChart {
    fn render(&mut self, samples: &[SpeedSample], overspeed_limit_kmh: f64) -> Result<()> {
        if samples.is_empty() {
            info!("no speeds computed, chart skipped");
            return Ok(());
        }

        let plot = Plot::new(samples, overspeed_limit_kmh);
        let right = plot.width - MARGIN;
        let bottom = plot.height - MARGIN;
        let mut chart = RgbImage::from_pixel(CHART_WIDTH, CHART_HEIGHT, WHITE);

        (1..)
            .map(|step| step as f64 * GRID_KMH)
            .take_while(|speed| *speed < plot.max_speed)
            .for_each(|speed| {
                let y = plot.y(speed);
                draw_line_segment_mut(&mut chart, (MARGIN, y), (right, y), GREY);
            });

        draw_line_segment_mut(&mut chart, (MARGIN, MARGIN), (MARGIN, bottom), BLACK);
        draw_line_segment_mut(&mut chart, (MARGIN, bottom), (right, bottom), BLACK);

        let limit = plot.y(overspeed_limit_kmh);
        (0..)
            .map(|dash| MARGIN + dash as f32 * DASH * 2.0)
            .take_while(|x| *x < right)
            .for_each(|x| {
                draw_line_segment_mut(&mut chart, (x, limit), ((x + DASH).min(right), limit), RED);
            });

        let points = samples
            .iter()
            .enumerate()
            .map(|(index, sample)| (plot.x(index), plot.y(sample.speed_kmh)))
            .collect::<Vec<_>>();
        points
            .iter()
            .tuple_windows()
            .for_each(|(start, end)| draw_line_segment_mut(&mut chart, *start, *end, BLUE));
        points.iter().for_each(|(x, y)| {
            draw_filled_circle_mut(&mut chart, (*x as i32, *y as i32), 3, BLUE);
        });

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        chart
            .save(&self.path)
            .with_context(|| format!("writing chart {}", self.path.display()))?;
        info!("speed chart saved to {}", self.path.display());
        Ok(())
    }
}

/// Writes every frame with its tracked vehicles outlined: red over the limit, green under it, white when no speed
/// was computed for the vehicle in this frame. Vehicles with a speed are labelled with it in whole km/h.
pub struct AnnotatedFrames {
    dir: PathBuf,
    font: Font<'static>,
}

impl AnnotatedFrames {
    pub fn new(dir: PathBuf) -> Result<AnnotatedFrames> {
        let font = Font::try_from_bytes(FONT).ok_or_else(|| anyhow!("invalid label font"))?;
        fs::create_dir_all(&dir)?;
        Ok(AnnotatedFrames { dir, font })
    }
}

fn speed_label(speed_kmh: f64) -> String {
    format!("{} km/h", speed_kmh.trunc() as i64)
}

impl FrameObserver<Frame> for AnnotatedFrames {
    fn on_frame(
        &mut self,
        frame_index: u64,
        frame: &Frame,
        table: &TrackTable,
        evaluations: &[Evaluation],
    ) -> Result<()> {
        let mut annotated = frame.image().clone();

        let outlines = table
            .values()
            .map(|object| {
                let evaluation = evaluations
                    .iter()
                    .rev()
                    .find(|evaluation| evaluation.track_id == object.track_id());
                let color = match evaluation {
                    Some(evaluation) if evaluation.is_violation => RED,
                    Some(_) => GREEN,
                    None => WHITE,
                };
                (object, evaluation, color)
            })
            .collect::<Vec<_>>();

        // labels first so that no label covers another vehicle's outline
        outlines
            .iter()
            .filter_map(|(object, evaluation, color)| {
                evaluation.map(|evaluation| (object, evaluation, color))
            })
            .for_each(|(object, evaluation, color)| {
                frame_processing::draw_label(
                    &mut annotated,
                    object.bbox(),
                    &speed_label(evaluation.speed_kmh),
                    *color,
                    &self.font,
                    LABEL_SIZE,
                );
            });
        outlines.iter().for_each(|(object, _, color)| {
            frame_processing::draw_box(&mut annotated, object.bbox(), *color, 2);
        });

        let file_name = frame
            .path()
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{frame_index:06}.png")));
        annotated.save(self.dir.join(file_name))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use assert_approx_eq::assert_approx_eq;
    use speedtrack::{BoundingBox, Detection, TrackedObject};

    fn scratch(name: &str) -> Result<PathBuf> {
        let dir = std::env::temp_dir().join(format!("speedcam-{name}-{}", std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn samples(speeds: &[f64]) -> Vec<SpeedSample> {
        speeds
            .iter()
            .enumerate()
            .map(|(index, speed_kmh)| SpeedSample {
                track_id: 1,
                speed_kmh: *speed_kmh,
                frame: index as u64 + 2,
            })
            .collect()
    }

    #[test]
    fn plot_mapping() {
        let plot = Plot::new(&samples(&[30.0, 110.0, 40.0]), 60.0);
        assert_approx_eq!(plot.max_speed, 121.0);
        assert_approx_eq!(plot.x(0), MARGIN);
        assert_approx_eq!(plot.x(2), CHART_WIDTH as f32 - MARGIN);
        assert_approx_eq!(plot.y(0.0), CHART_HEIGHT as f32 - MARGIN);
        assert_approx_eq!(plot.y(121.0), MARGIN, 1e-3);

        // a single sample sits on the left axis
        let plot = Plot::new(&samples(&[30.0]), 60.0);
        assert_approx_eq!(plot.x(0), MARGIN);
        assert_approx_eq!(plot.max_speed, 66.0, 1e-9);
    }

    #[test]
    fn chart_written() -> Result<()> {
        let dir = scratch("chart")?;
        let path = dir.join("chart").join("speed_chart.png");

        let mut chart = SpeedChart::new(path.clone());
        chart.render(&samples(&[30.0, 90.0, 45.0]), 60.0)?;

        let image = image::open(&path)?.to_rgb8();
        assert_eq!(image.dimensions(), (CHART_WIDTH, CHART_HEIGHT));
        // start of the dashed limit line
        let limit = Plot::new(&samples(&[30.0, 90.0, 45.0]), 60.0).y(60.0);
        assert!((limit.floor() as u32..=limit.ceil() as u32)
            .any(|y| *image.get_pixel(MARGIN as u32 + 2, y) == RED));

        fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn chart_skipped_without_samples() -> Result<()> {
        let dir = scratch("chart-empty")?;
        let path = dir.join("speed_chart.png");

        SpeedChart::new(path.clone()).render(&[], 60.0)?;
        assert!(!path.exists());

        fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn labels_truncate_to_whole_km_h() {
        assert_eq!(speed_label(90.0), "90 km/h");
        assert_eq!(speed_label(61.99), "61 km/h");
        assert_eq!(speed_label(0.4), "0 km/h");
    }

    #[test]
    fn annotated_frame_labels() -> Result<()> {
        let dir = scratch("frame-labels")?;
        let mut frames = AnnotatedFrames::new(dir.clone())?;

        let fast = TrackedObject::new(
            1,
            &Detection::from(BoundingBox::new(20.0, 60.0, 40.0, 30.0)),
            5,
        );
        let new = TrackedObject::new(
            4,
            &Detection::from(BoundingBox::new(130.0, 60.0, 40.0, 30.0)),
            5,
        );
        let table = [fast, new]
            .into_iter()
            .map(|object| (object.track_id(), object))
            .collect::<TrackTable>();
        let evaluations = vec![Evaluation {
            track_id: 1,
            speed_kmh: 93.7,
            is_violation: true,
            frame: 5,
            bbox: BoundingBox::new(20.0, 60.0, 40.0, 30.0),
        }];

        let frame = Frame::new(
            PathBuf::from("000005.png"),
            RgbImage::from_pixel(200, 100, BLACK),
        );
        frames.on_frame(5, &frame, &table, &evaluations)?;

        let image = image::open(dir.join("000005.png"))?.to_rgb8();
        // red speed text above the violating vehicle, nothing above the unevaluated one
        assert!((40..58).any(|y| (20..125).any(|x| image.get_pixel(x, y)[0] > 0)));
        assert!((0..58).all(|y| (130..200).all(|x| *image.get_pixel(x, y) == BLACK)));
        assert_eq!(*image.get_pixel(20, 60), RED);
        assert_eq!(*image.get_pixel(130, 60), WHITE);

        fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn annotated_frame_colors() -> Result<()> {
        let dir = scratch("frames")?;
        let mut frames = AnnotatedFrames::new(dir.clone())?;

        let fast = TrackedObject::new(1, &Detection::from(BoundingBox::new(2.0, 2.0, 10.0, 10.0)), 5);
        let slow = TrackedObject::new(2, &Detection::from(BoundingBox::new(20.0, 2.0, 10.0, 10.0)), 5);
        let new = TrackedObject::new(3, &Detection::from(BoundingBox::new(40.0, 2.0, 10.0, 10.0)), 5);
        let table = [fast, slow, new]
            .into_iter()
            .map(|object| (object.track_id(), object))
            .collect::<TrackTable>();
        let evaluations = vec![
            Evaluation {
                track_id: 1,
                speed_kmh: 90.0,
                is_violation: true,
                frame: 5,
                bbox: BoundingBox::new(2.0, 2.0, 10.0, 10.0),
            },
            Evaluation {
                track_id: 2,
                speed_kmh: 20.0,
                is_violation: false,
                frame: 5,
                bbox: BoundingBox::new(20.0, 2.0, 10.0, 10.0),
            },
        ];

        let frame = Frame::new(
            PathBuf::from("/frames/000005.png"),
            RgbImage::from_pixel(64, 32, BLACK),
        );
        frames.on_frame(5, &frame, &table, &evaluations)?;

        let image = image::open(dir.join("000005.png"))?.to_rgb8();
        assert_eq!(*image.get_pixel(2, 2), RED);
        assert_eq!(*image.get_pixel(20, 2), GREEN);
        assert_eq!(*image.get_pixel(40, 2), WHITE);
        assert_eq!(*image.get_pixel(60, 30), BLACK);

        fs::remove_dir_all(dir)?;
        Ok(())
    }
}

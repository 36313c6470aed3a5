use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;
use indexmap::IndexMap;
use serde::Deserialize;
use speedtrack::{BoundingBox, Detection, Detector, FrameSource};
use tracing::{info, warn};

/// A decoded frame and the file it was read from.
pub struct Frame {
    path: PathBuf,
    image: RgbImage,
}

impl Frame {
    pub fn new(path: PathBuf, image: RgbImage) -> Frame {
        Frame { path, image }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// Frames read from image files matching a glob pattern, in path order.
pub struct ImageSequence {
    paths: std::vec::IntoIter<PathBuf>,
    frames_per_second: f64,
}

impl ImageSequence {
    pub fn new(pattern: &str, frames_per_second: f64) -> Result<ImageSequence> {
        let mut paths = glob::glob(pattern)
            .with_context(|| format!("invalid frame pattern {pattern}"))?
            .filter_map(|path| path.ok())
            .collect::<Vec<_>>();
        paths.sort();

        if paths.is_empty() {
            warn!(pattern, "no frames match");
        } else {
            info!(pattern, frames = paths.len(), "frames found");
        }

        Ok(ImageSequence {
            paths: paths.into_iter(),
            frames_per_second,
        })
    }
}

impl FrameSource<Frame> for ImageSequence {
    fn frames_per_second(&self) -> f64 {
        self.frames_per_second
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.paths.next() {
            Some(path) => {
                let image = image::io::Reader::open(&path)?
                    .decode()
                    .with_context(|| format!("decoding {}", path.display()))?
                    .to_rgb8();
                Ok(Some(Frame::new(path, image)))
            }
            None => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetectionRow {
    frame: u64,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Detections produced ahead of time by an external detector.
///
/// Reads a CSV file with the header `frame,x,y,width,height[,confidence]`. Frame numbers count from 1 in the order
/// frames are read. Frames without rows have no detections.
pub struct CsvDetections {
    frames: IndexMap<u64, Vec<Detection>>,
}

impl CsvDetections {
    pub fn from_path(path: &Path) -> Result<CsvDetections> {
        let reader = csv::Reader::from_path(path)
            .with_context(|| format!("opening detections {}", path.display()))?;
        Self::from_csv(reader)
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<CsvDetections> {
        Self::from_csv(csv::Reader::from_reader(reader))
    }

    fn from_csv<R: io::Read>(mut reader: csv::Reader<R>) -> Result<CsvDetections> {
        let mut frames = IndexMap::<u64, Vec<Detection>>::new();
        for row in reader.deserialize() {
            let row: DetectionRow = row?;
            let detection = Detection::new(
                BoundingBox::new(row.x, row.y, row.width, row.height),
                row.confidence,
            );
            frames
                .entry(row.frame)
                .and_modify(|detections| detections.push(detection.clone()))
                .or_insert(vec![detection]);
        }

        info!(frames = frames.len(), "detections loaded");
        Ok(CsvDetections { frames })
    }
}

impl<F> Detector<F> for CsvDetections {
    fn detect(&mut self, frame_index: u64, _frame: &F) -> Result<Vec<Detection>> {
        Ok(self.frames.swap_remove(&frame_index).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const DETECTIONS: &str = "frame,x,y,width,height,confidence
1,80,80,40,40,0.9
1,300,80,40,40,
3,120,80,40,40,0.75
";

    #[test]
    fn detections_by_frame() -> Result<()> {
        let mut detections = CsvDetections::from_reader(DETECTIONS.as_bytes())?;

        let first = detections.detect(1, &())?;
        assert_eq!(
            first,
            vec![
                Detection::new(BoundingBox::new(80.0, 80.0, 40.0, 40.0), Some(0.9)),
                Detection::new(BoundingBox::new(300.0, 80.0, 40.0, 40.0), None),
            ]
        );
        assert_eq!(first[1].confidence(), 1.0);
        assert!(detections.detect(2, &())?.is_empty());
        assert_eq!(detections.detect(3, &())?.len(), 1);

        Ok(())
    }

    #[test]
    fn confidence_column_is_optional() -> Result<()> {
        let mut detections =
            CsvDetections::from_reader("frame,x,y,width,height\n2,1,2,3,4\n".as_bytes())?;
        assert_eq!(
            detections.detect(2, &())?,
            vec![Detection::from(BoundingBox::new(1.0, 2.0, 3.0, 4.0))]
        );
        Ok(())
    }

    #[test]
    fn malformed_row() {
        assert!(CsvDetections::from_reader("frame,x,y,width,height\none,1,2,3,4\n".as_bytes()).is_err());
    }

    #[test]
    fn empty_sequence() -> Result<()> {
        let pattern = std::env::temp_dir()
            .join("speedcam-no-frames-*.png")
            .to_string_lossy()
            .to_string();
        let mut sequence = ImageSequence::new(&pattern, 30.0)?;
        assert_eq!(sequence.frames_per_second(), 30.0);
        assert!(sequence.next_frame()?.is_none());
        Ok(())
    }
}

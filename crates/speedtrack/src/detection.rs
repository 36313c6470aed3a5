use crate::{BoundingBox, Point};

/// Detection represents a candidate vehicle bounding box in a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Bounding box in left, top, width, height format.
    bbox: BoundingBox,
    /// Detection confidence score.
    confidence: f32,
}

impl Detection {
    /// Returns a new Detection
    ///
    /// # Parameters
    ///
    /// * `bbox`: A bounding box object.
    /// * `confidence`: Detection confidence score. Defaults to `1.0` for detectors that do not score their output.
    pub fn new(bbox: BoundingBox, confidence: Option<f32>) -> Detection {
        Detection {
            bbox,
            confidence: confidence.unwrap_or(1.0),
        }
    }

    /// Returns a BoundingBox of the detection co-ordinates
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Returns the confidence of the detection
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Returns the centroid of the detection
    pub fn center(&self) -> Point {
        self.bbox.center()
    }
}

impl From<BoundingBox> for Detection {
    fn from(bbox: BoundingBox) -> Self {
        Detection::new(bbox, None)
    }
}

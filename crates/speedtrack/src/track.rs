use crate::*;

/// A single vehicle tracked across consecutive frames.
///
/// The tracker keeps no history: `center` and `last_frame` always describe the most recent detection matched to
/// this object, and an object missing from a single frame is forgotten.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    /// A unique track identifier, never reused within a run.
    track_id: usize,
    /// Centroid of the latest matched detection.
    center: Point,
    /// Frame index at which `center` was observed.
    last_frame: u64,
    /// The latest matched detection box.
    bbox: BoundingBox,
}

impl TrackedObject {
    /// Returns a new TrackedObject
    ///
    /// # Parameters
    ///
    /// * `track_id`: A unique track identifier.
    /// * `detection`: The detection this object was observed as.
    /// * `frame`: The frame index of the observation.
    pub fn new(track_id: usize, detection: &Detection, frame: u64) -> TrackedObject {
        TrackedObject {
            track_id,
            center: detection.center(),
            last_frame: frame,
            bbox: detection.bbox().clone(),
        }
    }

    /// Return the identifier of the track
    pub fn track_id(&self) -> usize {
        self.track_id
    }

    /// Return the centroid of the latest observation
    pub fn center(&self) -> Point {
        self.center
    }

    /// Return the frame index of the latest observation
    pub fn last_frame(&self) -> u64 {
        self.last_frame
    }

    /// Return the bounding box of the latest observation
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }
}

/// An existing tracked object matched again in the current frame.
///
/// Carries both the previous and the current observation so the displacement and elapsed frames can be derived.
#[derive(Debug, Clone, PartialEq)]
pub struct Continuation {
    pub track_id: usize,
    pub previous_center: Point,
    pub previous_frame: u64,
    pub center: Point,
    pub frame: u64,
    /// The bounding box of the matching detection in the current frame.
    pub bbox: BoundingBox,
}

impl Continuation {
    /// Returns the displacement between the previous and the current centroid in pixels.
    pub fn distance(&self) -> f32 {
        self.center.distance(&self.previous_center)
    }

    /// Returns the signed number of frames between the two observations.
    pub fn elapsed_frames(&self) -> i64 {
        self.frame as i64 - self.previous_frame as i64
    }
}

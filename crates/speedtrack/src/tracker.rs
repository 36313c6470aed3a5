use std::collections::BTreeMap;

use crate::*;
use tracing::debug;

/// The objects tracked at the end of a frame, keyed and iterated by ascending track id.
pub type TrackTable = BTreeMap<usize, TrackedObject>;

/// Default maximum centroid distance in pixels for a detection to continue an existing track.
pub const DEFAULT_MATCH_RADIUS: f32 = 50.0;

/// The result of associating one frame of detections with the previous frame's objects.
#[derive(Debug, Default)]
pub struct FrameUpdate {
    /// Exactly the objects observed in this frame.
    pub table: TrackTable,
    /// One entry per detection that continued an existing track, in detection order.
    pub continuations: Vec<Continuation>,
}

/// This is the single-frame-lookback nearest-centroid tracker.
///
/// The tracker owns only the identifier counter and the matching radius. The table of tracked objects is owned by
/// the caller, which passes the previous frame's table in and receives the rebuilt table back.
///
/// # Examples
///
/// ```
/// use speedtrack::{BoundingBox, Detection, TrackTable, Tracker};
///
/// let mut tracker = Tracker::default();
///
/// let first = tracker.update(
///     &TrackTable::new(),
///     1,
///     &[Detection::from(BoundingBox::new(80.0, 80.0, 40.0, 40.0))],
/// );
/// let second = tracker.update(
///     &first.table,
///     2,
///     &[Detection::from(BoundingBox::new(90.0, 80.0, 40.0, 40.0))],
/// );
///
/// for continuation in &second.continuations {
///     println!(
///         "{} moved {} px in {} frames",
///         continuation.track_id,
///         continuation.distance(),
///         continuation.elapsed_frames(),
///     );
/// }
///```
#[derive(Debug)]
pub struct Tracker {
    /// Maximum centroid distance in pixels for a detection to continue an existing track.
    match_radius: f32,
    /// Used to allocate identifiers to new tracks.
    next_id: usize,
}

impl Default for Tracker {
    fn default() -> Self {
        Tracker {
            match_radius: DEFAULT_MATCH_RADIUS,
            next_id: 1,
        }
    }
}

impl Tracker {
    /// Returns a new Tracker
    ///
    /// # Arguments
    ///
    /// * `match_radius`: Maximum centroid distance in pixels for a detection to continue an existing track. Must be finite and positive.
    pub fn new(match_radius: f32) -> Result<Tracker, ConfigError> {
        Ok(Tracker {
            match_radius: error::positive("match_radius", match_radius as f64)? as f32,
            next_id: 1,
        })
    }

    /// Return the match_radius
    pub fn match_radius(&self) -> f32 {
        self.match_radius
    }

    /// Associate this frame's detections with the previous frame's objects.
    ///
    /// # Parameters
    ///
    /// * `previous`: The table returned for the previous frame.
    /// * `frame`: The index of this frame. Expected to increase between calls but not checked here.
    /// * `detections`: The detections of this frame.
    pub fn update(
        &mut self,
        previous: &TrackTable,
        frame: u64,
        detections: &[Detection],
    ) -> FrameUpdate {
        let mut update = FrameUpdate::default();

        detections.iter().for_each(|detection| {
            let center = detection.center();

            let track_id = match centroid_matching::first_within_radius(
                &center,
                previous,
                self.match_radius,
            ) {
                Some(matched) => {
                    update.continuations.push(Continuation {
                        track_id: matched.track_id(),
                        previous_center: matched.center(),
                        previous_frame: matched.last_frame(),
                        center,
                        frame,
                        bbox: detection.bbox().clone(),
                    });
                    matched.track_id()
                }
                None => {
                    let track_id = self.next_id();
                    debug!(track_id, frame, x = center.x, y = center.y, "new track");
                    track_id
                }
            };

            // a later detection continuing the same object replaces the earlier entry
            update
                .table
                .insert(track_id, TrackedObject::new(track_id, detection, frame));
        });

        update
    }

    fn next_id(&mut self) -> usize {
        let track_id = self.next_id;
        self.next_id += 1;
        track_id
    }
}

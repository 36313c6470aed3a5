use crate::*;
use ndarray::*;

/// Compute centroid distances.
///
/// # Parameters
///
/// * `point`: A centroid in format `(x, y)`.
/// * `candidates`: A matrix of candidate centroids (one per row) in the same format as `point`.
///
/// # Returns
///
/// The Euclidean distance in pixels between `point` and each candidate.
pub fn centroid_distance(point: &Array1<f32>, candidates: &Array2<f32>) -> Array1<f32> {
    let deltas = candidates - point;
    deltas.map_axis(Axis(1), |v| v[0].hypot(v[1]))
}

/// Find the first tracked object whose centroid lies strictly within `match_radius` of `center`.
///
/// Candidates are visited in ascending track id order and the first one inside the radius wins. This is a greedy
/// first-match heuristic, not an optimal assignment: two detections close to the same object will both match it.
///
/// # Parameters
///
/// * `center`: The centroid of a new detection.
/// * `table`: The objects tracked in the previous frame.
/// * `match_radius`: Maximum centroid distance in pixels.
pub fn first_within_radius<'a>(
    center: &Point,
    table: &'a TrackTable,
    match_radius: f32,
) -> Option<&'a TrackedObject> {
    if table.is_empty() {
        return None;
    }

    let centers = table
        .values()
        .map(|object| object.center())
        .collect::<Vec<_>>();
    let candidates = Array2::from_shape_fn((centers.len(), 2), |(row, column)| match column {
        0 => centers[row].x,
        _ => centers[row].y,
    });

    centroid_distance(&center.to_xy(), &candidates)
        .iter()
        .zip(table.values())
        .find(|(distance, _)| **distance < match_radius)
        .map(|(_, object)| object)
}

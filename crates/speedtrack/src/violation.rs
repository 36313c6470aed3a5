use std::time::SystemTime;

use crate::*;

/// A persisted record of one frame in which a tracked object exceeded the limit.
///
/// A vehicle that stays above the limit produces one record per frame, not one per incident.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationRecord {
    track_id: usize,
    speed_kmh: f64,
    timestamp: SystemTime,
}

impl ViolationRecord {
    /// Returns a new ViolationRecord
    ///
    /// # Parameters
    ///
    /// * `track_id`: The violating object.
    /// * `speed_kmh`: The computed speed in km/h.
    /// * `timestamp`: The wall-clock time of the violation.
    pub fn new(track_id: usize, speed_kmh: f64, timestamp: SystemTime) -> ViolationRecord {
        ViolationRecord {
            track_id,
            speed_kmh,
            timestamp,
        }
    }

    pub fn track_id(&self) -> usize {
        self.track_id
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

/// A side effect requested for a violation.
///
/// Commands for a single violation are always issued in the order returned by [`plan_commands`].
#[derive(Debug, Clone, PartialEq)]
pub enum ViolationCommand {
    /// Play the alert.
    Alert { track_id: usize, speed_kmh: f64 },
    /// Persist the current frame under a name derived from the track id, replacing any earlier snapshot.
    Snapshot { track_id: usize },
    /// Append a record to the violation log.
    Log(ViolationRecord),
    /// Submit the bounding box crop to the plate reader.
    ReadPlate { track_id: usize, bbox: BoundingBox },
}

/// Returns the side effects requested for an evaluation, stamped with `timestamp`.
///
/// Evaluations under the limit request nothing.
pub fn plan_commands(evaluation: &Evaluation, timestamp: SystemTime) -> Vec<ViolationCommand> {
    if !evaluation.is_violation {
        return vec![];
    }

    vec![
        ViolationCommand::Alert {
            track_id: evaluation.track_id,
            speed_kmh: evaluation.speed_kmh,
        },
        ViolationCommand::Snapshot {
            track_id: evaluation.track_id,
        },
        ViolationCommand::Log(ViolationRecord::new(
            evaluation.track_id,
            evaluation.speed_kmh,
            timestamp,
        )),
        ViolationCommand::ReadPlate {
            track_id: evaluation.track_id,
            bbox: evaluation.bbox.clone(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use crate::*;

    fn evaluation(speed_kmh: f64, is_violation: bool) -> Evaluation {
        Evaluation {
            track_id: 3,
            speed_kmh,
            is_violation,
            frame: 12,
            bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
        }
    }

    #[test]
    fn no_commands_under_limit() {
        assert!(plan_commands(&evaluation(42.0, false), SystemTime::now()).is_empty());
    }

    #[test]
    fn commands_in_order() {
        let now = SystemTime::now();
        let commands = plan_commands(&evaluation(90.0, true), now);

        assert_eq!(
            commands,
            vec![
                ViolationCommand::Alert {
                    track_id: 3,
                    speed_kmh: 90.0
                },
                ViolationCommand::Snapshot { track_id: 3 },
                ViolationCommand::Log(ViolationRecord::new(3, 90.0, now)),
                ViolationCommand::ReadPlate {
                    track_id: 3,
                    bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0)
                },
            ]
        );
    }
}

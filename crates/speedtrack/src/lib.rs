mod bounding_box;
pub mod centroid_matching;
mod detection;
mod dispatch;
mod engine;
pub mod error;
mod speed;
mod track;
mod tracker;
mod violation;

pub use bounding_box::{BoundingBox, Point};
pub use detection::Detection;
pub use dispatch::{
    AlertSink, BackgroundDispatcher, CommandSink, DispatchOutcome, Dispatcher, PlateReader,
    SnapshotStore, ViolationLog,
};
pub use engine::{
    Calibration, Detector, Engine, FrameObserver, FrameSource, RunSummary, StopHandle,
    SummaryRenderer,
};
pub use error::ConfigError;
pub use speed::{Evaluation, SpeedConfig, SpeedEstimator, SpeedSample};
pub use track::{Continuation, TrackedObject};
pub use tracker::{FrameUpdate, TrackTable, Tracker, DEFAULT_MATCH_RADIUS};
pub use violation::{plan_commands, ViolationCommand, ViolationRecord};

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::*;
use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

/// Plays a notification for a violation.
pub trait AlertSink: Send {
    fn alert(&mut self, track_id: usize, speed_kmh: f64) -> Result<()>;
}

/// Persists the frame of a violation under a name derived only from the track id.
pub trait SnapshotStore<F>: Send {
    fn save(&mut self, track_id: usize, frame: &F) -> Result<()>;
}

/// Append-only store of violation records.
pub trait ViolationLog: Send {
    fn append(&mut self, record: &ViolationRecord) -> Result<()>;
}

/// Reads licence plate text from a region of a frame.
pub trait PlateReader<F>: Send {
    /// Returns the recognised candidates, best first. An empty result means nothing was read.
    fn read(&mut self, track_id: usize, frame: &F, bbox: &BoundingBox) -> Result<Vec<String>>;
}

/// Receives the side effects requested for a frame.
pub trait CommandSink<F>: Send {
    /// Submit the commands of one frame together with the frame they refer to.
    fn submit(&mut self, commands: Vec<ViolationCommand>, frame: Arc<F>) -> Result<()>;

    /// Complete any outstanding work. Called once when the run ends.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// What happened when a batch of commands was executed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Number of commands whose collaborator returned an error.
    pub failed: usize,
    /// The top plate candidate, if one was read.
    pub plate: Option<String>,
}

/// Executes violation commands against the external collaborators, synchronously and in order.
///
/// Every command is attempted. A failing collaborator is logged and does not prevent the remaining commands.
pub struct Dispatcher<F> {
    alert: Box<dyn AlertSink>,
    snapshots: Box<dyn SnapshotStore<F>>,
    log: Box<dyn ViolationLog>,
    plate_reader: Option<Box<dyn PlateReader<F>>>,
}

impl<F> Dispatcher<F> {
    /// Returns a new Dispatcher
    ///
    /// # Parameters
    ///
    /// * `alert`: The alert sink.
    /// * `snapshots`: The snapshot store.
    /// * `log`: The violation log.
    pub fn new(
        alert: Box<dyn AlertSink>,
        snapshots: Box<dyn SnapshotStore<F>>,
        log: Box<dyn ViolationLog>,
    ) -> Dispatcher<F> {
        Dispatcher {
            alert,
            snapshots,
            log,
            plate_reader: None,
        }
    }

    /// Set the plate reader. Without one, plate reading requests are skipped.
    pub fn with_plate_reader(mut self, plate_reader: Box<dyn PlateReader<F>>) -> Self {
        self.plate_reader = Some(plate_reader);
        self
    }

    /// Execute `commands` in order against `frame`.
    pub fn dispatch(&mut self, commands: &[ViolationCommand], frame: &F) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        commands.iter().for_each(|command| {
            let result = match command {
                ViolationCommand::Alert {
                    track_id,
                    speed_kmh,
                } => self.alert.alert(*track_id, *speed_kmh),
                ViolationCommand::Snapshot { track_id } => self.snapshots.save(*track_id, frame),
                ViolationCommand::Log(record) => self.log.append(record),
                ViolationCommand::ReadPlate { track_id, bbox } => match &mut self.plate_reader {
                    Some(plate_reader) => {
                        plate_reader
                            .read(*track_id, frame, bbox)
                            .map(|candidates| {
                                outcome.plate = candidates
                                    .into_iter()
                                    .map(|candidate| candidate.trim().to_string())
                                    .find(|candidate| !candidate.is_empty());
                                if let Some(plate) = &outcome.plate {
                                    info!(
                                        track_id = *track_id,
                                        plate = plate.as_str(),
                                        "licence plate detected"
                                    );
                                }
                            })
                    }
                    None => {
                        debug!(track_id, "no plate reader configured");
                        Ok(())
                    }
                },
            };

            if let Err(err) = result {
                warn!(?command, "violation side effect failed: {err:#}");
                outcome.failed += 1;
            }
        });

        outcome
    }
}

impl<F> CommandSink<F> for Dispatcher<F> {
    fn submit(&mut self, commands: Vec<ViolationCommand>, frame: Arc<F>) -> Result<()> {
        self.dispatch(&commands, &frame);
        Ok(())
    }
}

/// Runs a [`Dispatcher`] on a dedicated thread so that snapshot, log, alert and plate reading I/O does not stall
/// the frame loop.
///
/// The queue is bounded: when it is full `submit` waits for the worker, which bounds the latency added to the loop.
pub struct BackgroundDispatcher<F> {
    sender: Option<Sender<(Vec<ViolationCommand>, Arc<F>)>>,
    worker: Option<JoinHandle<()>>,
}

impl<F> BackgroundDispatcher<F>
where
    F: Send + Sync + 'static,
{
    /// Returns a new BackgroundDispatcher
    ///
    /// # Parameters
    ///
    /// * `dispatcher`: The dispatcher moved to the worker thread.
    /// * `capacity`: Maximum number of frames waiting to be dispatched.
    pub fn spawn(dispatcher: Dispatcher<F>, capacity: usize) -> Result<BackgroundDispatcher<F>> {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        let worker = thread::Builder::new()
            .name("violation-dispatch".to_string())
            .spawn(move || Self::work(dispatcher, receiver))?;

        Ok(BackgroundDispatcher {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    fn work(mut dispatcher: Dispatcher<F>, receiver: Receiver<(Vec<ViolationCommand>, Arc<F>)>) {
        // ends once every sender is dropped and the queue is drained
        for (commands, frame) in receiver {
            dispatcher.dispatch(&commands, &frame);
        }
    }
}

impl<F> BackgroundDispatcher<F> {
    fn shutdown(&mut self) -> Result<()> {
        drop(self.sender.take());
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| anyhow!("violation dispatch worker panicked")),
            None => Ok(()),
        }
    }
}

impl<F> CommandSink<F> for BackgroundDispatcher<F>
where
    F: Send + Sync + 'static,
{
    fn submit(&mut self, commands: Vec<ViolationCommand>, frame: Arc<F>) -> Result<()> {
        match &self.sender {
            Some(sender) => sender
                .send((commands, frame))
                .map_err(|_| anyhow!("violation dispatch worker has stopped")),
            None => Err(anyhow!("violation dispatcher already finished")),
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.shutdown()
    }
}

impl<F> Drop for BackgroundDispatcher<F> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!("{err:#}");
        }
    }
}

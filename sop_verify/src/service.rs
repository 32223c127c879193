// THEORY:
// The `service` module runs a `VerificationPipeline` as a single-writer actor on the
// tokio runtime. Capture and landmark extraction may run at whatever cadence they
// like, from as many producers as there are cameras; all of them talk to the actor
// through cloned `VerifierHandle`s that feed one bounded queue.
//
// Key architectural principles:
// 1.  **One Queue, One Writer**: Frames, start and stop requests all travel through
//     the same mpsc channel, so they are applied strictly in arrival order and a
//     session can never be reset while an observation is half-processed.
// 2.  **Backpressure**: The queue is bounded. A producer that outruns verification
//     waits on `send` rather than growing an unbounded backlog.
// 3.  **Fan-out**: Every status change is broadcast as a `StatusUpdate` (the events
//     plus a fresh snapshot). Presentation layers subscribe; a slow subscriber lags
//     and skips updates instead of stalling verification.

use crate::core_modules::event::Observation;
use crate::core_modules::source::LandmarkFrame;
use crate::error::{SessionError, VerifyError};
use crate::pipeline::{Report, StatusSnapshot, VerificationEvent, VerificationPipeline};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::pin;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// A status change published to presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Events in the order they were produced. Empty for start/stop updates.
    pub events: Vec<VerificationEvent>,
    pub snapshot: StatusSnapshot,
}

/// Message type for the verification actor.
enum Command {
    Start(oneshot::Sender<Result<(), SessionError>>),
    Stop(oneshot::Sender<bool>),
    Frame(LandmarkFrame),
    Observe(Observation),
    Snapshot(oneshot::Sender<StatusSnapshot>),
    Shutdown,
}

/// A cloneable producer-side handle to the verification actor.
#[derive(Clone)]
pub struct VerifierHandle {
    commands: mpsc::Sender<Command>,
}

impl VerifierHandle {
    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::ServiceClosed)
    }

    pub async fn start(&self) -> Result<(), VerifyError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Start(reply)).await?;
        response.await.map_err(|_| SessionError::ServiceClosed)??;
        Ok(())
    }

    /// Stops the session. Returns whether one was active.
    pub async fn stop(&self) -> Result<bool, VerifyError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Stop(reply)).await?;
        Ok(response.await.map_err(|_| SessionError::ServiceClosed)?)
    }

    /// Queues a captured frame, waiting for room if the queue is full.
    pub async fn submit_frame(&self, frame: LandmarkFrame) -> Result<(), VerifyError> {
        Ok(self.send(Command::Frame(frame)).await?)
    }

    /// Queues a single observation that is already in zone space.
    pub async fn submit(&self, observation: Observation) -> Result<(), VerifyError> {
        Ok(self.send(Command::Observe(observation)).await?)
    }

    pub async fn snapshot(&self) -> Result<StatusSnapshot, VerifyError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        Ok(response.await.map_err(|_| SessionError::ServiceClosed)?)
    }

    /// Drains an event source into the queue. Returns the number of frames forwarded.
    pub async fn forward<S>(&self, source: S) -> Result<usize, VerifyError>
    where
        S: Stream<Item = LandmarkFrame>,
    {
        let mut source = pin!(source);
        let mut forwarded = 0;
        while let Some(frame) = source.next().await {
            self.submit_frame(frame).await?;
            forwarded += 1;
        }
        Ok(forwarded)
    }
}

/// Owns the actor task that applies queued commands to a `VerificationPipeline`.
pub struct VerificationService {
    handle: VerifierHandle,
    updates: broadcast::Sender<StatusUpdate>,
    task: JoinHandle<VerificationPipeline>,
}

impl VerificationService {
    /// Spawns the actor. Must be called from within a tokio runtime.
    pub fn spawn(pipeline: VerificationPipeline, queue_capacity: usize) -> Self {
        let (commands, receiver) = mpsc::channel(queue_capacity.max(1));
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let task = tokio::spawn(Self::run(pipeline, receiver, updates.clone()));

        Self {
            handle: VerifierHandle { commands },
            updates,
            task,
        }
    }

    async fn run(
        mut pipeline: VerificationPipeline,
        mut receiver: mpsc::Receiver<Command>,
        updates: broadcast::Sender<StatusUpdate>,
    ) -> VerificationPipeline {
        while let Some(command) = receiver.recv().await {
            match command {
                Command::Start(reply) => {
                    let result = pipeline.start();
                    if result.is_ok() {
                        Self::publish(&updates, Vec::new(), &pipeline);
                    }
                    let _ = reply.send(result);
                }
                Command::Stop(reply) => {
                    let was_active = pipeline.stop();
                    if was_active {
                        Self::publish(&updates, Vec::new(), &pipeline);
                    }
                    let _ = reply.send(was_active);
                }
                Command::Frame(frame) => {
                    if let Report::StatusChanged(data) = pipeline.generate_report(&frame) {
                        if !data.events.is_empty() {
                            Self::publish(&updates, data.events, &pipeline);
                        }
                    }
                }
                Command::Observe(observation) => {
                    if let Report::StatusChanged(data) = pipeline.process_observations([observation]) {
                        if !data.events.is_empty() {
                            Self::publish(&updates, data.events, &pipeline);
                        }
                    }
                }
                Command::Snapshot(reply) => {
                    let _ = reply.send(pipeline.status_snapshot());
                }
                Command::Shutdown => break,
            }
        }

        info!("verification service stopped");
        pipeline
    }

    fn publish(updates: &broadcast::Sender<StatusUpdate>, events: Vec<VerificationEvent>, pipeline: &VerificationPipeline) {
        let update = StatusUpdate {
            events,
            snapshot: pipeline.status_snapshot(),
        };
        // No subscribers is fine; the update is simply dropped.
        if updates.send(update).is_err() {
            debug!("status update published with no subscribers");
        }
    }

    pub fn handle(&self) -> VerifierHandle {
        self.handle.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.updates.subscribe()
    }

    /// Stops the actor after the commands already queued and returns the pipeline.
    pub async fn shutdown(self) -> Result<VerificationPipeline, VerifyError> {
        self.handle.send(Command::Shutdown).await?;
        self.task
            .await
            .map_err(|_| VerifyError::from(SessionError::ServiceClosed))
    }
}

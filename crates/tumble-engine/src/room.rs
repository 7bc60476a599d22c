//! One engine per room, owned by a tokio task.
//!
//! Network connections never touch an [`Engine`] directly. They hold a
//! cloneable [`RoomHandle`] and send [`RoomCommand`]s over a bounded mpsc
//! channel; the room task applies them one at a time and answers on a
//! oneshot channel. Event insertion therefore never races an in-flight
//! replay, and rooms share no mutable state with each other.

use tokio::sync::{mpsc, oneshot};
use tumble_core::effect::Effect;
use tumble_core::event::Event;
use tumble_core::stepper::Stepper;

use crate::engine::Engine;
use crate::EngineError;

/// Commands a room task can be waiting on before senders block.
pub const ROOM_QUEUE_DEPTH: usize = 256;

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// A message for the room task.
#[derive(Debug)]
pub enum RoomCommand {
    AddEvent {
        event: Event,
        reply: Reply<()>,
    },
    Step {
        reply: Reply<StepReport>,
    },
    /// Run a stepper predicate against the current state.
    Query {
        operation: String,
        args: serde_json::Value,
        reply: Reply<serde_json::Value>,
    },
    /// Serialize the engine (see [`Engine::serialize`]).
    Export {
        reply: Reply<String>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// What one `Step` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub time: u64,
    pub state_hash: String,
    /// First-time effects derived since the previous report, including
    /// effects from ticks replayed because of late events.
    pub effects: Vec<Effect>,
}

/// Cloneable sender side of a room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    name: String,
    tx: mpsc::Sender<RoomCommand>,
}

/// Move `engine` into a new room task.
///
/// Must be called from within a tokio runtime.
pub fn spawn_room<S>(name: &str, mut engine: Engine<S>) -> RoomHandle
where
    S: Stepper + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(ROOM_QUEUE_DEPTH);
    let room = name.to_owned();
    tokio::spawn(async move {
        tracing::info!(room = %room, stepper = engine.stepper().name(), "room started");
        while let Some(command) = rx.recv().await {
            match command {
                RoomCommand::AddEvent { event, reply } => {
                    let _ = reply.send(engine.add_event(event));
                }
                RoomCommand::Step { reply } => {
                    let _ = reply.send(step(&mut engine));
                }
                RoomCommand::Query {
                    operation,
                    args,
                    reply,
                } => {
                    let _ = reply.send(engine.call_stepper(&operation, &args));
                }
                RoomCommand::Export { reply } => {
                    let _ = reply.send(engine.serialize());
                }
                RoomCommand::Shutdown { reply } => {
                    let _ = reply.send(());
                    break;
                }
            }
        }
        tracing::info!(room = %room, time = engine.time(), "room stopped");
    });
    RoomHandle {
        name: name.to_owned(),
        tx,
    }
}

fn step<S: Stepper>(engine: &mut Engine<S>) -> Result<StepReport, EngineError> {
    engine.step()?;
    Ok(StepReport {
        time: engine.time(),
        state_hash: engine.state_hash()?,
        effects: engine.drain_effects(),
    })
}

impl RoomHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| EngineError::RoomClosed)?;
        response.await.map_err(|_| EngineError::RoomClosed)?
    }

    pub async fn add_event(&self, event: Event) -> Result<(), EngineError> {
        self.request(|reply| RoomCommand::AddEvent { event, reply })
            .await
    }

    pub async fn step(&self) -> Result<StepReport, EngineError> {
        self.request(|reply| RoomCommand::Step { reply }).await
    }

    pub async fn query(
        &self,
        operation: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        let operation = operation.to_owned();
        self.request(|reply| RoomCommand::Query {
            operation,
            args,
            reply,
        })
        .await
    }

    pub async fn export(&self) -> Result<String, EngineError> {
        self.request(|reply| RoomCommand::Export { reply }).await
    }

    /// Stop the room after the commands already queued.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(RoomCommand::Shutdown { reply })
            .await
            .map_err(|_| EngineError::RoomClosed)?;
        done.await.map_err(|_| EngineError::RoomClosed)
    }
}

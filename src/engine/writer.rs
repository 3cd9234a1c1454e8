use anyhow::{Context, Result, anyhow};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::storage::{
    entities::{RatchetEvent, TrackerConfig, TrackerUpdate},
    event_log::EventLog,
    tracker_store::TrackerStore,
};

/// How many mutations may wait for the writer before callers start waiting themselves.
const WRITE_QUEUE: usize = 32;

/// A mutation of the data folder together with the channel its result is sent back on.
#[derive(Debug)]
pub enum WriteCommand {
    CreateTracker {
        config: TrackerConfig,
        reply: oneshot::Sender<Result<()>>,
    },
    UpdateTracker {
        id: String,
        update: TrackerUpdate,
        reply: oneshot::Sender<Result<bool>>,
    },
    DeleteTracker {
        id: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    Append {
        event: RatchetEvent,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Sole owner of every write to a data folder. Both the config document and the partitions are
/// updated by reading and rewriting whole files, so mutations are applied one at a time in the
/// order they were received.
pub struct WriterModule {
    receiver: mpsc::Receiver<WriteCommand>,
    store: TrackerStore,
    log: EventLog,
}

impl WriterModule {
    pub fn new(receiver: mpsc::Receiver<WriteCommand>, store: TrackerStore, log: EventLog) -> Self {
        Self {
            receiver,
            store,
            log,
        }
    }

    /// Runs until every [WriterHandle] is dropped.
    pub async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            debug!("Processing write {:?}", command);
            self.process_next(command).await;
        }
        debug!("All writer handles dropped, stopping");
    }

    async fn process_next(&self, command: WriteCommand) {
        match command {
            WriteCommand::CreateTracker { config, reply } => {
                let result = self.store.create(config).await;
                respond(reply, result);
            }
            WriteCommand::UpdateTracker { id, update, reply } => {
                let result = self.store.update(&id, update).await;
                respond(reply, result);
            }
            WriteCommand::DeleteTracker { id, reply } => {
                let result = self.store.delete(&id).await;
                respond(reply, result);
            }
            WriteCommand::Append { event, reply } => {
                let result = self.log.append(&event).await;
                respond(reply, result);
            }
        }
    }
}

fn respond<T>(reply: oneshot::Sender<Result<T>>, result: Result<T>) {
    if let Err(e) = &result {
        error!("Write failed {e:?}");
    }
    if reply.send(result).is_err() {
        debug!("Caller stopped waiting for the write result");
    }
}

/// Cloneable entry point to a [WriterModule] running on its own task.
#[derive(Clone)]
pub struct WriterHandle {
    sender: mpsc::Sender<WriteCommand>,
}

impl WriterHandle {
    /// Starts the writer task. Has to be called from within a tokio runtime.
    pub fn spawn(store: TrackerStore, log: EventLog) -> Self {
        let (sender, receiver) = mpsc::channel(WRITE_QUEUE);
        tokio::spawn(WriterModule::new(receiver, store, log).run());
        Self { sender }
    }

    pub async fn create_tracker(&self, config: TrackerConfig) -> Result<()> {
        self.request(|reply| WriteCommand::CreateTracker { config, reply })
            .await
    }

    pub async fn update_tracker(&self, id: &str, update: TrackerUpdate) -> Result<bool> {
        let id = id.to_string();
        self.request(|reply| WriteCommand::UpdateTracker { id, update, reply })
            .await
    }

    pub async fn delete_tracker(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.request(|reply| WriteCommand::DeleteTracker { id, reply })
            .await
    }

    pub async fn append(&self, event: RatchetEvent) -> Result<()> {
        self.request(|reply| WriteCommand::Append { event, reply })
            .await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> WriteCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .await
            .map_err(|_| anyhow!("Writer has stopped"))?;
        response.await.context("Writer dropped the request")?
    }
}

//! The state manager task.
//!
//! One task owns the StateStore. IPC commands and job notifications are
//! both funnelled into its dispatch loop, so every operation sees the state
//! left behind by the previous one and no locking is needed.

use bmcstate_common::{BmcError, BmcStatus, Property, PropertyChange, PropertyValue, Transition};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};

use crate::cause_store::CauseStore;
use crate::events::JobRemoved;
use crate::init::{JobExecutor, UnitStatusProvider};
use crate::notify::NotificationHandler;
use crate::store::StateStore;
use crate::transition::TransitionExecutor;

/// Pending commands before senders wait
const COMMAND_QUEUE_DEPTH: usize = 32;

/// Requests served by the manager
#[derive(Debug)]
pub enum Command {
    GetAll {
        reply: oneshot::Sender<BmcStatus>,
    },
    Get {
        property: Property,
        reply: oneshot::Sender<PropertyValue>,
    },
    Set {
        property: Property,
        value: String,
        reply: oneshot::Sender<Result<PropertyValue, BmcError>>,
    },
}

/// External collaborators the manager calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub units: Arc<dyn UnitStatusProvider>,
    pub jobs: Arc<dyn JobExecutor>,
    pub causes: Arc<dyn CauseStore>,
}

/// Cloneable client side of the manager
#[derive(Clone)]
pub struct ManagerHandle {
    commands: mpsc::Sender<Command>,
    changes: broadcast::Sender<PropertyChange>,
}

impl ManagerHandle {
    pub async fn status(&self) -> Result<BmcStatus, BmcError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetAll { reply }).await?;
        rx.await.map_err(|_| BmcError::ManagerUnavailable)
    }

    pub async fn get(&self, property: Property) -> Result<PropertyValue, BmcError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Get { property, reply }).await?;
        rx.await.map_err(|_| BmcError::ManagerUnavailable)
    }

    pub async fn set(&self, property: Property, value: &str) -> Result<PropertyValue, BmcError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Set {
            property,
            value: value.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| BmcError::ManagerUnavailable)?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PropertyChange> {
        self.changes.subscribe()
    }

    async fn send(&self, command: Command) -> Result<(), BmcError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| BmcError::ManagerUnavailable)
    }
}

pub struct Manager {
    store: StateStore,
    collaborators: Collaborators,
    transitions: TransitionExecutor,
    notifications: NotificationHandler,
}

impl Manager {
    pub fn new(
        store: StateStore,
        collaborators: Collaborators,
        transitions: TransitionExecutor,
        notifications: NotificationHandler,
    ) -> Self {
        Self {
            store,
            collaborators,
            transitions,
            notifications,
        }
    }

    /// Create the command channel. The receiver goes to `run`.
    pub fn channel(&self) -> (ManagerHandle, mpsc::Receiver<Command>) {
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let handle = ManagerHandle {
            commands,
            changes: self.store.change_sender(),
        };
        (handle, rx)
    }

    /// Dispatch loop. Ends when every handle is dropped.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<JobRemoved>,
    ) -> StateStore {
        info!("State manager running");
        let mut events_open = true;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.dispatch(command).await,
                    None => break,
                },
                event = events.recv(), if events_open => match event {
                    Some(event) => self.on_job_removed(&event).await,
                    None => {
                        warn!("Job notifications closed; state will only change on request");
                        events_open = false;
                    }
                },
            }
        }

        info!("State manager stopped");
        self.store
    }

    pub async fn dispatch(&mut self, command: Command) {
        match command {
            Command::GetAll { reply } => {
                let _ = reply.send(self.store.snapshot());
            }
            Command::Get { property, reply } => {
                let _ = reply.send(self.store.get(property));
            }
            Command::Set {
                property,
                value,
                reply,
            } => {
                let result = self.set(property, &value).await;
                if let Err(e) = &result {
                    warn!("Write {}={} refused: {}", property, value, e);
                }
                let _ = reply.send(result);
            }
        }
    }

    pub async fn on_job_removed(&mut self, event: &JobRemoved) {
        self.notifications
            .handle(&mut self.store, self.collaborators.units.as_ref(), event)
            .await;
    }

    async fn set(&mut self, property: Property, value: &str) -> Result<PropertyValue, BmcError> {
        match property {
            Property::RequestedBmcTransition => {
                let transition: Transition = value.parse()?;
                let accepted = self
                    .transitions
                    .request(
                        &mut self.store,
                        self.collaborators.jobs.as_ref(),
                        self.collaborators.causes.as_ref(),
                        transition,
                    )
                    .await?;
                Ok(PropertyValue::RequestedBmcTransition(accepted))
            }
            _ => self.store.write_property(property, value),
        }
    }
}

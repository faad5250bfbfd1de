use std::sync::Arc;

use roverlink_motor::{MotorMapping, RoverCommand, RoverCommandTranslator};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::messages::{CommandInbound, CommandOutbound, TelemetryData};
use crate::session::{BackendSession, DisconnectReason, Outbox, SessionRole};

/// Receives the domain messages of the command channel.
///
/// Called on the session task; implementations must not block.
pub trait CommandHandler: Send + Sync + 'static {
    fn on_command(self: Arc<Self>, command: RoverCommand);

    fn on_motor_config(self: Arc<Self>, mapping: MotorMapping);
}

impl CommandHandler for RoverCommandTranslator {
    fn on_command(self: Arc<Self>, command: RoverCommand) {
        tokio::task::spawn_blocking(move || match self.execute(&command) {
            Ok(Some(outcome)) => debug!(command = %command.summary(), ?outcome, "rover command done"),
            Ok(None) => {}
            Err(err) => warn!(command = %command.summary(), error = %err, "rover command failed"),
        });
    }

    fn on_motor_config(self: Arc<Self>, mapping: MotorMapping) {
        if let Err(err) = self.apply_mapping(mapping) {
            warn!(error = %err, "motor mapping from backend not applied");
        }
    }
}

/// Command-channel behavior: registration by name, rover id, command dispatch.
pub struct CommandRole {
    name: String,
    handler: Arc<dyn CommandHandler>,
    identity: watch::Sender<Option<String>>,
    last_command: watch::Sender<Option<String>>,
    last_error: watch::Sender<Option<String>>,
}

impl CommandRole {
    pub fn new(name: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
            identity: watch::Sender::new(None),
            last_command: watch::Sender::new(None),
            last_error: watch::Sender::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SessionRole for CommandRole {
    const NAME: &'static str = "command";

    fn registration(&self) -> Result<String> {
        Ok(serde_json::to_string(&CommandOutbound::Register {
            name: self.name.clone(),
        })?)
    }

    fn heartbeat(&self) -> Result<String> {
        Ok(serde_json::to_string(&CommandOutbound::Heartbeat)?)
    }

    fn on_text(&self, text: &str, _outbox: &Outbox) {
        let message = match serde_json::from_str::<CommandInbound>(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(session = Self::NAME, error = %err, "dropping malformed message");
                return;
            }
        };

        match message {
            CommandInbound::Registered { rover_id } => {
                info!(session = Self::NAME, rover_id = %rover_id, "registered");
                self.identity.send_replace(Some(rover_id));
            }
            CommandInbound::HeartbeatAck => debug!(session = Self::NAME, "heartbeat ack"),
            CommandInbound::CommandAck => debug!(session = Self::NAME, "command ack"),
            CommandInbound::Error { message } => {
                let message = message.unwrap_or_else(|| text.to_owned());
                warn!(session = Self::NAME, error = %message, "backend error");
                self.last_error.send_replace(Some(message));
            }
            CommandInbound::Command(command) => {
                info!(session = Self::NAME, command = %command.summary(), "command received");
                self.last_command.send_replace(Some(command.summary()));
                Arc::clone(&self.handler).on_command(command);
            }
            CommandInbound::MotorConfig { mapping } => {
                info!(session = Self::NAME, ?mapping, "motor mapping received");
                Arc::clone(&self.handler).on_motor_config(mapping);
            }
            CommandInbound::MotorConfigAck => debug!(session = Self::NAME, "motor config ack"),
            CommandInbound::Unknown => {
                debug!(session = Self::NAME, "ignoring unknown message type");
            }
        }
    }

    fn on_disconnected(&self, _reason: DisconnectReason) {
        self.identity.send_if_modified(|identity| identity.take().is_some());
        self.last_command.send_if_modified(|command| command.take().is_some());
    }
}

/// The command channel session.
pub type CommandSession = BackendSession<CommandRole>;

impl BackendSession<CommandRole> {
    /// Rover id assigned by the backend, while registered.
    pub fn identity(&self) -> Option<String> {
        self.role().identity.borrow().clone()
    }

    pub fn subscribe_identity(&self) -> watch::Receiver<Option<String>> {
        self.role().identity.subscribe()
    }

    /// Last command received on the current link, as `"<action> <direction>"`.
    pub fn last_command(&self) -> Option<String> {
        self.role().last_command.borrow().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.role().last_error.borrow().clone()
    }

    /// Push a locally changed mapping to the backend.
    pub fn send_motor_mapping_update(&self, mapping: MotorMapping) -> Result<()> {
        let rover_id = self.identity().ok_or(SessionError::NotRegistered)?;
        self.send(&CommandOutbound::MotorConfigUpdate { rover_id, mapping })
    }

    pub fn send_telemetry(&self, data: TelemetryData) -> Result<()> {
        let rover_id = self.identity().ok_or(SessionError::NotRegistered)?;
        self.send(&CommandOutbound::Telemetry { rover_id, data })
    }
}

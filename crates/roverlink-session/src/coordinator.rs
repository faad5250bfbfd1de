use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::command::CommandSession;
use crate::config::BackendConfig;
use crate::media::MediaSession;
use crate::session::ConnectionState;

/// Starts the media session once the command session has an identity.
///
/// Observes the command session's identity only; losing the identity leaves
/// the media session alone. [`disconnect`](Self::disconnect) tears both down.
pub struct SessionCoordinator {
    command: Arc<CommandSession>,
    media: Arc<MediaSession>,
    config: BackendConfig,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl SessionCoordinator {
    pub fn new(command: Arc<CommandSession>, media: Arc<MediaSession>, config: BackendConfig) -> Self {
        Self {
            command,
            media,
            config,
            watcher: Mutex::new(None),
        }
    }

    pub fn command(&self) -> &Arc<CommandSession> {
        &self.command
    }

    pub fn media(&self) -> &Arc<MediaSession> {
        &self.media
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Connect the command session and follow its identity.
    pub fn connect(&self) {
        let identity = self.command.subscribe_identity();
        let watcher = tokio::spawn(follow_identity(
            identity,
            Arc::clone(&self.media),
            self.config.media_url(),
        ));
        if let Some(previous) = self.lock_watcher().replace(watcher) {
            previous.abort();
        }
        self.command.connect(self.config.command_url());
    }

    /// Stop following and disconnect both sessions.
    pub fn disconnect(&self) {
        if let Some(watcher) = self.lock_watcher().take() {
            watcher.abort();
        }
        self.media.disconnect();
        self.command.disconnect();
        info!("backend sessions disconnected");
    }

    fn lock_watcher(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        if let Some(watcher) = self.lock_watcher().take() {
            watcher.abort();
        }
    }
}

async fn follow_identity(
    mut identity: watch::Receiver<Option<String>>,
    media: Arc<MediaSession>,
    media_url: String,
) {
    loop {
        let current = identity.borrow_and_update().clone();
        if let Some(rover_id) = current {
            if media.state() == ConnectionState::Disconnected {
                info!(rover_id = %rover_id, url = %media_url, "identity acquired, connecting media");
                media.connect_with_identity(media_url.clone(), rover_id);
            } else {
                debug!(media = %media.state(), "identity acquired, media already active");
            }
        }
        if identity.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use roverlink_motor::{MotorMapping, RoverCommand};
    use serde_json::json;
    use tokio::time;

    use super::*;
    use crate::command::{CommandHandler, CommandRole};
    use crate::link::testing::QueueDialer;
    use crate::link::Incoming;
    use crate::media::{FrameSource, MediaRole};

    struct NoopHandler;

    impl CommandHandler for NoopHandler {
        fn on_command(self: Arc<Self>, _command: RoverCommand) {}
        fn on_motor_config(self: Arc<Self>, _mapping: MotorMapping) {}
    }

    struct BlankSource;

    impl FrameSource for BlankSource {
        fn capture(&self) -> Option<Bytes> {
            None
        }
    }

    fn coordinator(
        command_dialer: Arc<QueueDialer>,
        media_dialer: Arc<QueueDialer>,
    ) -> SessionCoordinator {
        let command = Arc::new(CommandSession::new(
            CommandRole::new("ATRover", Arc::new(NoopHandler)),
            command_dialer,
        ));
        let media = Arc::new(MediaSession::new(
            MediaRole::new(Arc::new(BlankSource)),
            media_dialer,
        ));
        SessionCoordinator::new(command, media, BackendConfig::new("rover.test"))
    }

    #[tokio::test(start_paused = true)]
    async fn identity_connects_media() {
        let (command_dialer, _) = QueueDialer::new();
        let (media_dialer, mut media_dials) = QueueDialer::new();
        let mut command_remote = command_dialer.push_link();
        let mut media_remote = media_dialer.push_link();
        let coordinator = coordinator(command_dialer, media_dialer);

        coordinator.connect();
        assert_eq!(command_remote.next_json().await["type"], "register");
        time::sleep(Duration::from_secs(5)).await;
        assert!(media_dials.try_recv().is_err());
        assert_eq!(coordinator.media().state(), ConnectionState::Disconnected);

        command_remote.push_json(json!({"type": "registered", "roverId": "rover-3"}));
        let (_, url) = media_dials.recv().await.expect("media dial");
        assert_eq!(url, "ws://rover.test:8081/ws");
        assert_eq!(
            media_remote.next_json().await,
            json!({"type": "register", "roverId": "rover-3"})
        );

        coordinator.disconnect();
        assert_eq!(coordinator.command().state(), ConnectionState::Disconnected);
        assert_eq!(coordinator.media().state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn losing_identity_leaves_media_alone() {
        let (command_dialer, _) = QueueDialer::new();
        let (media_dialer, mut media_dials) = QueueDialer::new();
        let mut command_remote = command_dialer.push_link();
        let mut media_remote = media_dialer.push_link();
        let coordinator = coordinator(command_dialer.clone(), media_dialer);

        coordinator.connect();
        command_remote.next_json().await;
        command_remote.push_json(json!({"type": "registered", "roverId": "rover-3"}));
        media_dials.recv().await.expect("media dial");
        media_remote.next_json().await;

        let mut command_again = command_dialer.push_link();
        command_remote
            .events
            .send(Incoming::Closed)
            .expect("command session listening");
        time::sleep(Duration::from_millis(1)).await;
        assert!(coordinator.command().identity().is_none());
        assert_eq!(coordinator.media().state(), ConnectionState::Connected);

        assert_eq!(command_again.next_json().await["type"], "register");
        command_again.push_json(json!({"type": "registered", "roverId": "rover-3"}));
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(coordinator.command().identity().as_deref(), Some("rover-3"));
        assert!(media_dials.try_recv().is_err());

        coordinator.disconnect();
    }
}

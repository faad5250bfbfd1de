use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::error::{Result, SessionError};
use crate::link::{Dialer, Incoming, Link, Outgoing};

/// How long a single connect attempt may take.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Connection state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The last connect attempt failed; a retry is scheduled.
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called. No reconnect follows.
    Local,
    /// The peer closed or the link broke. A reconnect is scheduled.
    Remote,
}

/// Send side of the current link, if any.
///
/// Sends are fire-and-forget: with no open link the message is dropped.
#[derive(Clone, Default)]
pub struct Outbox {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<Outgoing>>>>,
}

impl Outbox {
    pub fn is_open(&self) -> bool {
        self.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Returns whether the message was handed to the link.
    pub fn send_text(&self, text: String) -> bool {
        self.push(Outgoing::Text(text))
    }

    pub fn send_binary(&self, data: Bytes) -> bool {
        self.push(Outgoing::Binary(data))
    }

    pub fn send_json<T: Serialize>(&self, message: &T) -> Result<bool> {
        Ok(self.send_text(serde_json::to_string(message)?))
    }

    fn push(&self, message: Outgoing) -> bool {
        match self.lock().as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    fn open(&self, tx: mpsc::UnboundedSender<Outgoing>) {
        *self.lock() = Some(tx);
    }

    /// Detach the link, asking it to close.
    fn close(&self) {
        if let Some(tx) = self.lock().take() {
            let _ = tx.send(Outgoing::Close);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Outgoing>>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Outbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox")
            .field("open", &self.is_open())
            .finish()
    }
}

/// What makes a session a command or a media session.
pub trait SessionRole: Send + Sync + 'static {
    /// Name used in logs.
    const NAME: &'static str;

    /// First message on every new link.
    fn registration(&self) -> Result<String>;

    fn heartbeat(&self) -> Result<String>;

    /// Handle one inbound text message.
    fn on_text(&self, text: &str, outbox: &Outbox);

    /// The link is gone. Called after the state moved to `Disconnected`.
    fn on_disconnected(&self, _reason: DisconnectReason) {}
}

struct Control {
    /// Bumped by every connect/disconnect; stale drivers see a mismatch and exit.
    generation: u64,
    driver: Option<JoinHandle<()>>,
}

struct Core<R> {
    role: R,
    outbox: Outbox,
    state: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
    control: Mutex<Control>,
}

impl<R: SessionRole> Core<R> {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            let changed = *state != next;
            *state = next;
            changed
        });
    }

    /// Publish `next` unless a newer connect/disconnect took over.
    fn publish(&self, generation: u64, next: ConnectionState) -> bool {
        let control = self.control();
        if control.generation != generation {
            return false;
        }
        self.set_state(next);
        true
    }

    /// Serve one open link until it ends. Returns `false` if superseded.
    async fn run_link(&self, generation: u64, link: Link) -> bool {
        let Link {
            outgoing,
            mut incoming,
        } = link;
        {
            let control = self.control();
            if control.generation != generation {
                let _ = outgoing.send(Outgoing::Close);
                return false;
            }
            self.outbox.open(outgoing);
            self.attempts.store(0, Ordering::Relaxed);
            self.set_state(ConnectionState::Connected);
        }
        info!(session = R::NAME, "connected");

        match self.role.registration() {
            Ok(message) => {
                self.outbox.send_text(message);
            }
            Err(err) => warn!(session = R::NAME, error = %err, "skipping registration"),
        }

        let mut heartbeat =
            time::interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                _ = heartbeat.tick() => self.send_heartbeat(),
                event = incoming.recv() => match event {
                    Some(Incoming::Text(text)) => self.role.on_text(&text, &self.outbox),
                    Some(Incoming::Binary(data)) => {
                        debug!(session = R::NAME, len = data.len(), "ignoring binary message");
                    }
                    Some(Incoming::Failed(reason)) => break reason,
                    Some(Incoming::Closed) | None => break "closed by peer".to_string(),
                },
            }
        };

        {
            let control = self.control();
            if control.generation != generation {
                return false;
            }
            self.outbox.close();
            self.set_state(ConnectionState::Disconnected);
        }
        info!(session = R::NAME, reason = %reason, "connection lost");
        self.role.on_disconnected(DisconnectReason::Remote);
        true
    }

    fn send_heartbeat(&self) {
        match self.role.heartbeat() {
            Ok(message) => {
                debug!(session = R::NAME, "heartbeat");
                self.outbox.send_text(message);
            }
            Err(err) => warn!(session = R::NAME, error = %err, "failed to encode heartbeat"),
        }
    }
}

/// Connect, retry with back-off, and serve links until superseded.
async fn drive<R: SessionRole>(
    core: Arc<Core<R>>,
    dialer: Arc<dyn Dialer>,
    url: String,
    generation: u64,
) {
    let mut policy = ReconnectPolicy::new();
    loop {
        if !core.publish(generation, ConnectionState::Connecting) {
            return;
        }
        debug!(session = R::NAME, url = %url, attempt = policy.attempt(), "connecting");

        let dialed = match time::timeout(CONNECT_TIMEOUT, dialer.dial(&url)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::ConnectTimeout { url: url.clone() }),
        };
        match dialed {
            Ok(link) => {
                policy.reset();
                if !core.run_link(generation, link).await {
                    return;
                }
            }
            Err(err) => {
                warn!(session = R::NAME, error = %err, "connect failed");
                if !core.publish(generation, ConnectionState::Error) {
                    return;
                }
            }
        }

        let delay = policy.next_delay();
        core.attempts.store(policy.attempt(), Ordering::Relaxed);
        info!(
            session = R::NAME,
            attempt = policy.attempt(),
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        time::sleep(delay).await;
    }
}

/// One long-lived, auto-reconnecting backend connection.
///
/// `connect` and `disconnect` must be called from within a tokio runtime.
pub struct BackendSession<R: SessionRole> {
    core: Arc<Core<R>>,
    dialer: Arc<dyn Dialer>,
}

impl<R: SessionRole> BackendSession<R> {
    pub fn new(role: R, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            core: Arc::new(Core {
                role,
                outbox: Outbox::default(),
                state: watch::Sender::new(ConnectionState::Disconnected),
                attempts: AtomicU32::new(0),
                control: Mutex::new(Control {
                    generation: 0,
                    driver: None,
                }),
            }),
            dialer,
        }
    }

    pub fn role(&self) -> &R {
        &self.core.role
    }

    pub fn state(&self) -> ConnectionState {
        *self.core.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.core.state.subscribe()
    }

    /// Reconnects scheduled since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.core.attempts.load(Ordering::Relaxed)
    }

    /// Start connecting with auto-reconnect enabled.
    ///
    /// Replaces any previous connection or pending reconnect. The role sees
    /// the replaced link end as a remote disconnect before the new one opens.
    pub fn connect(&self, url: impl Into<String>) {
        let url = url.into();
        let replaced = {
            let mut control = self.core.control();
            control.generation += 1;
            self.core.outbox.close();
            match control.driver.take() {
                Some(previous) => {
                    previous.abort();
                    self.core.set_state(ConnectionState::Disconnected);
                    true
                }
                None => false,
            }
        };
        if replaced {
            debug!(session = R::NAME, "replacing previous connection");
            self.core.role.on_disconnected(DisconnectReason::Remote);
        }

        let mut control = self.core.control();
        control.generation += 1;
        if let Some(previous) = control.driver.take() {
            previous.abort();
        }
        self.core.attempts.store(0, Ordering::Relaxed);

        info!(session = R::NAME, url = %url, "connect requested");
        let driver = drive(
            Arc::clone(&self.core),
            Arc::clone(&self.dialer),
            url,
            control.generation,
        );
        control.driver = Some(tokio::spawn(driver));
    }

    /// Close the connection and stop reconnecting until the next `connect`.
    pub fn disconnect(&self) {
        {
            let mut control = self.core.control();
            control.generation += 1;
            if let Some(driver) = control.driver.take() {
                driver.abort();
            }
            self.core.outbox.close();
            self.core.set_state(ConnectionState::Disconnected);
        }
        info!(session = R::NAME, "disconnected");
        self.core.role.on_disconnected(DisconnectReason::Local);
    }

    /// Send a JSON message if connected; otherwise drop it.
    pub fn send<T: Serialize>(&self, message: &T) -> Result<()> {
        if !self.core.outbox.send_json(message)? {
            debug!(session = R::NAME, "not connected, message dropped");
        }
        Ok(())
    }

    pub(crate) fn outbox(&self) -> &Outbox {
        &self.core.outbox
    }
}

impl<R: SessionRole> Drop for BackendSession<R> {
    fn drop(&mut self) {
        let mut control = self.core.control();
        control.generation += 1;
        if let Some(driver) = control.driver.take() {
            driver.abort();
        }
        self.core.outbox.close();
    }
}

impl<R: SessionRole> fmt::Debug for BackendSession<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSession")
            .field("role", &R::NAME)
            .field("state", &self.state())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::link::testing::{HangingDialer, QueueDialer};

    #[derive(Default)]
    struct RecordingRole {
        texts: Mutex<Vec<String>>,
        disconnects: Mutex<Vec<DisconnectReason>>,
    }

    impl SessionRole for RecordingRole {
        const NAME: &'static str = "test";

        fn registration(&self) -> Result<String> {
            Ok(json!({"type": "register", "name": "t"}).to_string())
        }

        fn heartbeat(&self) -> Result<String> {
            Ok(json!({"type": "heartbeat"}).to_string())
        }

        fn on_text(&self, text: &str, _outbox: &Outbox) {
            self.texts.lock().expect("lock").push(text.to_owned());
        }

        fn on_disconnected(&self, reason: DisconnectReason) {
            self.disconnects.lock().expect("lock").push(reason);
        }
    }

    fn session(dialer: Arc<dyn Dialer>) -> BackendSession<RecordingRole> {
        BackendSession::new(RecordingRole::default(), dialer)
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_delays_follow_backoff() {
        let (dialer, mut dials) = QueueDialer::new();
        let session = session(dialer);
        let mut state = session.subscribe_state();
        session.connect("ws://rover.test/ws");

        let mut times = Vec::new();
        for _ in 0..8 {
            let (at, url) = dials.recv().await.expect("dial");
            assert_eq!(url, "ws://rover.test/ws");
            times.push(at);
        }
        let gaps: Vec<u64> = times
            .windows(2)
            .map(|pair| pair[1].duration_since(pair[0]).as_secs())
            .collect();
        assert_eq!(gaps, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(session.reconnect_attempts(), 8);

        state
            .wait_for(|s| *s == ConnectionState::Error)
            .await
            .expect("state sender alive");
        session.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn successful_connect_resets_attempts() {
        let (dialer, mut dials) = QueueDialer::new();
        let session = session(dialer.clone());
        session.connect("ws://rover.test/ws");

        dials.recv().await.expect("first dial");
        dials.recv().await.expect("second dial");
        assert_eq!(session.reconnect_attempts(), 2);

        let mut remote = dialer.push_link();
        dials.recv().await.expect("third dial");
        assert_eq!(remote.next_json().await["type"], "register");
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.reconnect_attempts(), 0);

        let closed_at = Instant::now();
        remote.events.send(Incoming::Closed).expect("session listening");
        let (redial_at, _) = dials.recv().await.expect("redial");
        assert_eq!(redial_at.duration_since(closed_at), Duration::from_secs(1));
        assert_eq!(
            *session.role().disconnects.lock().expect("lock"),
            vec![DisconnectReason::Remote]
        );
        session.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_every_interval_while_connected() {
        let (dialer, _dials) = QueueDialer::new();
        let mut remote = dialer.push_link();
        let session = session(dialer);
        session.connect("ws://rover.test/ws");

        assert_eq!(remote.next_json().await["type"], "register");
        let start = Instant::now();
        assert_eq!(remote.next_json().await["type"], "heartbeat");
        assert_eq!(start.elapsed(), HEARTBEAT_INTERVAL);
        assert_eq!(remote.next_json().await["type"], "heartbeat");
        assert_eq!(start.elapsed(), HEARTBEAT_INTERVAL * 2);
        session.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_closes_link_and_stops_timers() {
        let (dialer, mut dials) = QueueDialer::new();
        let mut remote = dialer.push_link();
        let session = session(dialer);
        session.connect("ws://rover.test/ws");
        dials.recv().await.expect("dial");
        assert_eq!(remote.next_json().await["type"], "register");

        session.disconnect();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(remote.sent.recv().await, Some(Outgoing::Close));
        assert_eq!(remote.sent.recv().await, None);

        time::sleep(Duration::from_secs(120)).await;
        assert!(dials.try_recv().is_err());
        assert_eq!(
            *session.role().disconnects.lock().expect("lock"),
            vec![DisconnectReason::Local]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_again_ends_the_live_link_first() {
        let (dialer, _dials) = QueueDialer::new();
        let mut first = dialer.push_link();
        let mut second = dialer.push_link();
        let session = session(dialer);

        session.connect("ws://rover.test/ws");
        assert_eq!(first.next_json().await["type"], "register");
        assert!(session.role().disconnects.lock().expect("lock").is_empty());

        session.connect("ws://rover.test/ws");
        assert_eq!(
            *session.role().disconnects.lock().expect("lock"),
            vec![DisconnectReason::Remote]
        );
        assert_eq!(first.sent.recv().await, Some(Outgoing::Close));
        assert_eq!(second.next_json().await["type"], "register");
        assert_eq!(session.state(), ConnectionState::Connected);
        session.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_connect_times_out_into_error() {
        let session = session(Arc::new(HangingDialer));
        let mut state = session.subscribe_state();
        let start = Instant::now();
        session.connect("ws://rover.test/ws");

        state
            .wait_for(|s| *s == ConnectionState::Error)
            .await
            .expect("state sender alive");
        assert_eq!(start.elapsed(), CONNECT_TIMEOUT);
        session.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_text_reaches_role_and_send_drops_when_offline() {
        let session = session(Arc::new(HangingDialer));
        session
            .send(&json!({"type": "heartbeat"}))
            .expect("encoding succeeds");

        let (dialer, _dials) = QueueDialer::new();
        let mut remote = dialer.push_link();
        let session = BackendSession::new(RecordingRole::default(), dialer);
        session.connect("ws://rover.test/ws");
        assert_eq!(remote.next_json().await["type"], "register");

        remote.push_json(json!({"type": "heartbeat_ack"}));
        time::sleep(Duration::from_millis(1)).await;
        session
            .send(&json!({"type": "telemetry"}))
            .expect("encoding succeeds");
        assert_eq!(remote.next_json().await["type"], "telemetry");
        assert_eq!(
            *session.role().texts.lock().expect("lock"),
            vec![r#"{"type":"heartbeat_ack"}"#.to_string()]
        );
        session.disconnect();
    }
}

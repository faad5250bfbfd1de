use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use roverlink_frame::{
    decode_reply, encode_batch, encode_single, hex_dump, CommandEntry, CommandFrame,
    MotorDirective, MotorId, MotorStatus,
};
use roverlink_transport::SerialTransport;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{ChannelError, Result};
use crate::state::{DeviceLink, DeviceState, LastResponse, MotorState};

/// Write attempts per exchange before giving up.
pub const WRITE_ATTEMPTS: u32 = 3;

/// Pause between failed write attempts.
pub const RETRY_DELAY: Duration = Duration::from_millis(50);

/// The device has no "not ready" signal; give it this long before reading.
pub const SETTLE_DELAY: Duration = Duration::from_millis(30);

pub const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

pub const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Largest reply read per exchange.
pub const REPLY_BUFFER_LEN: usize = 20;

/// How the device answered a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The reply carried the success marker. Addressed motors were updated.
    Acked(String),
    /// The device replied without the success marker.
    NotAcked(String),
    /// Nothing arrived inside the read window.
    TimedOut,
}

impl ExchangeOutcome {
    pub fn is_acked(&self) -> bool {
        matches!(self, ExchangeOutcome::Acked(_))
    }
}

type Slot = Option<Box<dyn SerialTransport>>;

struct Inner {
    /// Held for the whole write/settle/read sequence.
    transport: Mutex<Slot>,
    motors: watch::Sender<[MotorState; 4]>,
    device: watch::Sender<DeviceState>,
}

/// Sole owner of the serial transport.
///
/// Cloning is cheap and every clone drives the same device. All sends block
/// the calling thread for the length of one exchange (at most a few hundred
/// milliseconds); call them from `spawn_blocking` in async code.
#[derive(Clone)]
pub struct MotorCommandChannel {
    inner: Arc<Inner>,
}

impl Default for MotorCommandChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MotorCommandChannel {
    /// A channel with no device attached.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                transport: Mutex::new(None),
                motors: watch::Sender::new(MotorState::initial_table()),
                device: watch::Sender::new(DeviceState::default()),
            }),
        }
    }

    /// Attach a transport, replacing (and closing) any previous one.
    pub fn attach(&self, transport: impl SerialTransport + 'static, label: impl Into<String>) {
        let label = label.into();
        let mut slot = self.lock_transport();
        if let Some(mut previous) = slot.replace(Box::new(transport)) {
            if let Err(err) = previous.close() {
                warn!(error = %err, "failed to close replaced transport");
            }
        }
        info!(device = %label, "serial device attached");
        self.inner
            .device
            .send_modify(|state| state.link = DeviceLink::Connected { label });
    }

    /// Close the transport once any in-flight exchange has finished.
    pub fn detach(&self) {
        let mut slot = self.lock_transport();
        if let Some(mut transport) = slot.take() {
            if let Err(err) = transport.close() {
                warn!(error = %err, "failed to close transport");
            }
            info!("serial device detached");
        }
        self.inner
            .device
            .send_modify(|state| state.link = DeviceLink::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.device.borrow().link.is_connected()
    }

    /// Set a motor's configured speed. Takes effect on its next command.
    pub fn set_speed(&self, motor: MotorId, speed: i32) {
        let speed = speed.clamp(0, i32::from(u8::MAX)) as u8;
        self.inner
            .motors
            .send_modify(|table| table[motor.index()].speed = speed);
        debug!(motor = %motor, speed, "speed set");
    }

    /// Command one motor at its configured speed.
    pub fn send_single(&self, motor: MotorId, directive: MotorDirective) -> Result<ExchangeOutcome> {
        let mut slot = self.lock_transport();
        if slot.is_none() {
            return Err(ChannelError::NotConnected);
        }

        let speeds = self.record_intent(&[(motor, directive)]);
        let entry = CommandEntry::new(motor, directive, speeds[0]);

        let mut packet = BytesMut::new();
        encode_single(&entry, &mut packet);
        debug!(
            motor = %motor,
            directive = directive.label(),
            speed = entry.speed,
            packet = %hex_dump(&packet),
            "serial tx (single)"
        );

        self.exchange(&mut slot, &packet, &[entry])
    }

    /// Command 2-4 motors in one frame, each at its configured speed.
    ///
    /// Entries may be in any order. Size and duplicate violations are rejected
    /// before any I/O or state change.
    pub fn send_batch(&self, commands: &[(MotorId, MotorDirective)]) -> Result<ExchangeOutcome> {
        let probe: Vec<CommandEntry> = commands
            .iter()
            .map(|&(motor, directive)| CommandEntry::new(motor, directive, 0))
            .collect();
        CommandFrame::batch(probe)?;

        let mut slot = self.lock_transport();
        if slot.is_none() {
            return Err(ChannelError::NotConnected);
        }

        let speeds = self.record_intent(commands);
        let entries: Vec<CommandEntry> = commands
            .iter()
            .zip(speeds)
            .map(|(&(motor, directive), speed)| CommandEntry::new(motor, directive, speed))
            .collect();

        let mut packet = BytesMut::new();
        encode_batch(&entries, &mut packet)?;
        debug!(
            count = entries.len(),
            motors = %describe(&entries),
            packet = %hex_dump(&packet),
            "serial tx (batch)"
        );

        self.exchange(&mut slot, &packet, &entries)
    }

    /// Current motor table.
    pub fn motors(&self) -> [MotorState; 4] {
        *self.inner.motors.borrow()
    }

    pub fn motor(&self, id: MotorId) -> MotorState {
        self.inner.motors.borrow()[id.index()]
    }

    pub fn subscribe_motors(&self) -> watch::Receiver<[MotorState; 4]> {
        self.inner.motors.subscribe()
    }

    pub fn device(&self) -> DeviceState {
        self.inner.device.borrow().clone()
    }

    pub fn subscribe_device(&self) -> watch::Receiver<DeviceState> {
        self.inner.device.subscribe()
    }

    fn lock_transport(&self) -> MutexGuard<'_, Slot> {
        self.inner
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the requested directives and return each motor's configured speed.
    fn record_intent(&self, commands: &[(MotorId, MotorDirective)]) -> Vec<u8> {
        let mut speeds = Vec::with_capacity(commands.len());
        self.inner.motors.send_modify(|table| {
            for &(motor, directive) in commands {
                let state = &mut table[motor.index()];
                state.last_directive = directive;
                speeds.push(state.speed);
            }
        });
        speeds
    }

    /// One write/settle/read round trip. Caller holds the transport lock.
    fn exchange(
        &self,
        slot: &mut Slot,
        packet: &[u8],
        entries: &[CommandEntry],
    ) -> Result<ExchangeOutcome> {
        let transport = slot.as_mut().ok_or(ChannelError::NotConnected)?;

        let mut attempt = 1;
        loop {
            match transport.write(packet, WRITE_TIMEOUT) {
                Ok(()) => break,
                Err(err) if attempt < WRITE_ATTEMPTS => {
                    warn!(attempt, error = %err, "serial write failed, retrying");
                    thread::sleep(RETRY_DELAY);
                    attempt += 1;
                }
                Err(err) => {
                    error!(attempts = attempt, error = %err, "serial write failed");
                    self.set_last_response(LastResponse::Error);
                    if err.is_write_fault() {
                        self.drop_transport(slot, err.to_string());
                    }
                    return Err(err.into());
                }
            }
        }

        thread::sleep(SETTLE_DELAY);

        let mut buf = [0u8; REPLY_BUFFER_LEN];
        let n = match transport.read(&mut buf, READ_TIMEOUT) {
            Ok(n) => n,
            Err(err) => {
                warn!(error = %err, "serial read failed, treating as no reply");
                0
            }
        };
        if n == 0 {
            warn!(motors = %describe(entries), "serial rx: no reply");
            return Ok(ExchangeOutcome::TimedOut);
        }

        let reply = decode_reply(&buf[..n]);
        debug!(packet = %hex_dump(&buf[..n]), reply = %reply.text, "serial rx");
        self.set_last_response(LastResponse::Reply(reply.text.clone()));

        if reply.is_success() {
            self.confirm(entries);
            Ok(ExchangeOutcome::Acked(reply.text))
        } else {
            warn!(motors = %describe(entries), reply = %reply.text, "unexpected reply");
            Ok(ExchangeOutcome::NotAcked(reply.text))
        }
    }

    fn confirm(&self, entries: &[CommandEntry]) {
        self.inner.motors.send_modify(|table| {
            for entry in entries {
                table[entry.motor.index()].status = MotorStatus::from(entry.directive);
            }
        });
    }

    fn set_last_response(&self, response: LastResponse) {
        self.inner
            .device
            .send_modify(|state| state.last_response = response);
    }

    fn drop_transport(&self, slot: &mut Slot, reason: String) {
        if let Some(mut transport) = slot.take() {
            let _ = transport.close();
        }
        error!(reason = %reason, "serial device lost");
        self.inner.motors.send_modify(|table| {
            for state in table.iter_mut() {
                state.reset_after_loss();
            }
        });
        self.inner
            .device
            .send_modify(|state| state.link = DeviceLink::Lost { reason });
    }
}

impl std::fmt::Debug for MotorCommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotorCommandChannel")
            .field("device", &*self.inner.device.borrow())
            .finish_non_exhaustive()
    }
}

fn describe(entries: &[CommandEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("{}:{}", entry.motor, entry.directive.label()))
        .collect::<Vec<_>>()
        .join(",")
}

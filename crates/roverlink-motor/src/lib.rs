//! Motor control on top of the serial frame protocol.
//!
//! [`MotorCommandChannel`] is the only owner of the serial transport. It runs
//! one write/settle/read exchange at a time and publishes motor and device
//! state through `tokio::sync::watch` cells. [`RoverCommandTranslator`] turns
//! backend rover commands into batches for the channel using the current
//! [`MotorMapping`].

pub mod channel;
pub mod error;
pub mod mapping;
pub mod state;
pub mod translator;

pub use channel::{
    ExchangeOutcome, MotorCommandChannel, READ_TIMEOUT, REPLY_BUFFER_LEN, RETRY_DELAY,
    SETTLE_DELAY, WRITE_ATTEMPTS, WRITE_TIMEOUT,
};
pub use error::{ChannelError, MappingError, Result};
pub use mapping::{JsonFileStore, MappingStore, MemoryStore, MotorMapping};
pub use state::{DeviceLink, DeviceState, LastResponse, MotorState};
pub use translator::{
    plan, scale_speed, DrivePlan, DriveSummary, RoverAction, RoverCommand, RoverCommandTranslator,
    DEFAULT_ROTATE_DEGREES, DEFAULT_SPEED_PERCENT,
};

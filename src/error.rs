use std::io::ErrorKind;
use std::time::Duration;

use thiserror::Error;

use crate::status::GripperFault;

/// Errors raised by a [`RegisterChannel`](crate::RegisterChannel) transaction.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("std io error, serial or socket comm error")]
    Io(#[from] std::io::Error),
    #[error("Modbus protocol or transport error.")]
    Modbus(#[from] tokio_modbus::Error),
    #[error("A server (slave) exception.")]
    Exception(#[from] tokio_modbus::Exception),
    #[error("transaction of {requested} registers exceeds the allowed width of {allowed}")]
    TooWide { requested: usize, allowed: u8 },
    #[error("unsupported read function code {0}")]
    UnsupportedFunction(u8),
    #[error("register channel is closed")]
    Closed,
}

impl ChannelError {
    /// Whether the error means the session itself is gone, rather than a single
    /// transaction failing.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            ChannelError::Closed => true,
            ChannelError::Io(e) => is_connection_kind(e.kind()),
            ChannelError::Modbus(tokio_modbus::Error::Transport(e)) => is_connection_kind(e.kind()),
            _ => false,
        }
    }
}

fn is_connection_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::UnexpectedEof
    )
}

/// Errors surfaced by [`GripperController`](crate::GripperController).
#[derive(Debug, Error)]
pub enum GripperError {
    /// Transport or session unavailable. Not retried.
    #[error("gripper connection unavailable")]
    Connection(#[source] ChannelError),
    /// Rejected before any register transaction was issued.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A single register read or write did not complete.
    #[error("register transaction failed")]
    TransactionFailure(#[source] ChannelError),
    /// The command was sent but the gripper did not converge in time.
    #[error("gripper did not reach position {target} within {timeout:?} (last position {last_position:?})")]
    Timeout {
        target: u8,
        timeout: Duration,
        last_position: Option<u8>,
    },
    /// Activation was requested but the gripper did not report completion in time.
    #[error("gripper activation did not complete within {timeout:?}")]
    ActivationTimeout { timeout: Duration },
    /// The status registers hold values the device can not produce.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("gripper fault: {0}")]
    GripperFault(#[from] GripperFault),
}

impl From<ChannelError> for GripperError {
    fn from(value: ChannelError) -> Self {
        if value.is_connection_lost() {
            GripperError::Connection(value)
        } else {
            GripperError::TransactionFailure(value)
        }
    }
}

/// Errors raised while loading a [`GripperConfig`](crate::GripperConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("malformed config")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

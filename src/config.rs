//! Setup parameters for a gripper controller.
//!
//! Every field has a default, so a config file only names what differs:
//!
//! ```json
//! {
//!   "connection": { "transport": "tcp", "host": "192.168.1.18", "port": 502 },
//!   "poll": { "interval_ms": 50, "convergence": { "mode": "within", "tolerance": 2 } }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::registers::{RegisterAddressParams, DEFAULT_DEVICE_ADDRESS};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GripperConfig {
    pub connection: ConnectionConfig,
    pub registers: RegisterConfig,
    pub poll: PollConfig,
}

impl GripperConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.interval_ms == 0 {
            return Err(ConfigError::Invalid("poll.interval_ms must be positive".into()));
        }
        if self.poll.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll.default_timeout_ms must be positive".into(),
            ));
        }
        if let ConnectionConfig::Rtu { baud_rate: 0, .. } = self.connection {
            return Err(ConfigError::Invalid("connection.baud_rate must be positive".into()));
        }
        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll.interval_ms),
            default_timeout: Duration::from_millis(self.poll.default_timeout_ms),
            convergence: self.poll.convergence,
        }
    }
}

/// How the register channel reaches the gripper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ConnectionConfig {
    /// Modbus RTU over an RS-485 serial port.
    Rtu {
        path: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        #[serde(default)]
        parity: Parity,
        #[serde(default)]
        stop_bits: StopBits,
        #[serde(default = "default_serial_timeout_ms")]
        timeout_ms: u64,
    },
    /// Modbus TCP, through a gateway or the arm controller.
    Tcp {
        host: String,
        #[serde(default = "default_tcp_port")]
        port: u16,
    },
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig::Rtu {
            path: "/dev/ttyUSB0".into(),
            baud_rate: default_baud_rate(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            timeout_ms: default_serial_timeout_ms(),
        }
    }
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_serial_timeout_ms() -> u64 {
    500
}

fn default_tcp_port() -> u16 {
    502
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(value: Parity) -> Self {
        match value {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(value: StopBits) -> Self {
        match value {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

/// The write and read addressing, fixed for the controller's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterConfig {
    pub write: RegisterAddressParams,
    pub read: RegisterAddressParams,
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            write: RegisterAddressParams::command(DEFAULT_DEVICE_ADDRESS),
            read: RegisterAddressParams::status(DEFAULT_DEVICE_ADDRESS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    /// Applied to waits that do not name a timeout of their own.
    pub default_timeout_ms: u64,
    pub convergence: Convergence,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            default_timeout_ms: 10_000,
            convergence: Convergence::Exact,
        }
    }
}

/// When a reported position counts as having reached the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Convergence {
    /// The reported position must equal the target.
    #[default]
    Exact,
    /// The reported position may differ from the target by up to `tolerance`.
    Within { tolerance: u8 },
}

impl Convergence {
    pub fn converged(&self, position: u8, target: u8) -> bool {
        match *self {
            Convergence::Exact => position == target,
            Convergence::Within { tolerance } => position.abs_diff(target) <= tolerance,
        }
    }
}

/// Poll cadence and termination rules of the blocking waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub default_timeout: Duration,
    pub convergence: Convergence,
}

impl Default for PollPolicy {
    fn default() -> Self {
        GripperConfig::default().poll_policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::RegisterAddressParams;

    #[test]
    fn empty_config_uses_device_defaults() {
        let config = GripperConfig::from_json_str("{}").unwrap();
        assert_eq!(config, GripperConfig::default());
        assert_eq!(config.registers.write, RegisterAddressParams::new(1, 1000, 9, 3));
        assert_eq!(config.registers.read, RegisterAddressParams::new(1, 2000, 9, 3));

        let policy = config.poll_policy();
        assert_eq!(policy.interval, Duration::from_millis(100));
        assert_eq!(policy.default_timeout, Duration::from_secs(10));
        assert_eq!(policy.convergence, Convergence::Exact);
    }

    #[test]
    fn parses_tcp_connection_and_tolerance() {
        let config = GripperConfig::from_json_str(
            r#"{
                "connection": { "transport": "tcp", "host": "192.168.1.18" },
                "poll": { "interval_ms": 50, "convergence": { "mode": "within", "tolerance": 2 } }
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.connection,
            ConnectionConfig::Tcp {
                host: "192.168.1.18".into(),
                port: 502
            }
        );
        assert_eq!(config.poll.interval_ms, 50);
        assert_eq!(config.poll.default_timeout_ms, 10_000);
        assert_eq!(config.poll.convergence, Convergence::Within { tolerance: 2 });
    }

    #[test]
    fn parses_rtu_serial_profile() {
        let config = GripperConfig::from_json_str(
            r#"{
                "connection": { "transport": "rtu", "path": "COM17", "parity": "even", "stop_bits": "two" },
                "registers": {
                    "write": { "device_address": 9, "register_offset": 1000, "register_count": 3, "function_code": 3 },
                    "read": { "device_address": 9, "register_offset": 2000, "register_count": 3, "function_code": 4 }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.connection,
            ConnectionConfig::Rtu {
                path: "COM17".into(),
                baud_rate: 115_200,
                parity: Parity::Even,
                stop_bits: StopBits::Two,
                timeout_ms: 500,
            }
        );
        assert_eq!(config.registers.read.function_code, 4);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = GripperConfig::from_json_str(r#"{ "poll": { "interval_ms": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = GripperConfig::from_json_str("{ connection").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn convergence_policies() {
        assert!(Convergence::Exact.converged(100, 100));
        assert!(!Convergence::Exact.converged(101, 100));
        let relaxed = Convergence::Within { tolerance: 2 };
        assert!(relaxed.converged(98, 100));
        assert!(relaxed.converged(102, 100));
        assert!(!relaxed.converged(103, 100));
    }
}

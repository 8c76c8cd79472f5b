//! Register layout of the gripper's command and status images.
//!
//! Commands are written as six byte-valued words starting at register `1000`,
//! status is read as six byte-valued words starting at register `2000`.
//! Over a plain Modbus link each pair of words travels as one big-endian
//! register, so both images occupy three registers on the wire.

use serde::{Deserialize, Serialize};

use crate::error::GripperError;

/// First register of the command (robot output) image.
pub const COMMAND_OFFSET: u16 = 1000;
/// First register of the status (robot input) image.
pub const STATUS_OFFSET: u16 = 2000;
/// Transaction width of the device profile, in registers.
pub const REGISTER_COUNT: u8 = 9;
/// Read holding registers.
pub const READ_HOLDING_REGISTERS: u8 = 3;
/// Read input registers.
pub const READ_INPUT_REGISTERS: u8 = 4;
/// Device address used by the arm controller tunnel.
pub const DEFAULT_DEVICE_ADDRESS: u8 = 1;
/// Modbus slave id of a gripper wired directly to RS-485.
pub const ROBOTIQ_SLAVE_ID: u8 = 9;

/// Number of words in a command or status image.
pub const IMAGE_WORDS: usize = 6;
/// Number of Modbus registers a packed image occupies.
pub const IMAGE_REGISTERS: usize = IMAGE_WORDS / 2;

/// Flag for `rACT` and `gACT`
pub const FLAG_ACT: u16 = 1 << 0;
/// Flag for `rGTO` and `gGTO`
pub const FLAG_GTO: u16 = 1 << 3;

/// Where and how a register transaction is addressed.
///
/// A controller holds one of these for writes and one for reads, fixed at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterAddressParams {
    pub device_address: u8,
    pub register_offset: u16,
    /// Upper bound on the number of registers a single transaction may move.
    pub register_count: u8,
    pub function_code: u8,
}

impl RegisterAddressParams {
    pub const fn new(
        device_address: u8,
        register_offset: u16,
        register_count: u8,
        function_code: u8,
    ) -> Self {
        Self {
            device_address,
            register_offset,
            register_count,
            function_code,
        }
    }

    /// Params addressing the command image of `device_address`.
    pub const fn command(device_address: u8) -> Self {
        Self::new(
            device_address,
            COMMAND_OFFSET,
            REGISTER_COUNT,
            READ_HOLDING_REGISTERS,
        )
    }

    /// Params addressing the status image of `device_address`.
    pub const fn status(device_address: u8) -> Self {
        Self::new(
            device_address,
            STATUS_OFFSET,
            REGISTER_COUNT,
            READ_HOLDING_REGISTERS,
        )
    }
}

/// The action word, first word of every command.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Clear `rACT`: resets the gripper and clears faults.
    Clear = 0,
    /// Raise `rACT` alone: enables the gripper, and holds (stops) it when moving.
    Enable = FLAG_ACT,
    /// Raise `rACT` and `rGTO`: move to the requested position.
    GoTo = FLAG_ACT | FLAG_GTO,
}

/// A command image: `[action, reserved, reserved, position, speed, force]`.
///
/// Every word holds a byte value, so the image always packs into registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandWords([u16; IMAGE_WORDS]);

impl CommandWords {
    pub const ACTION: usize = 0;
    pub const POSITION: usize = 3;
    pub const SPEED: usize = 4;
    pub const FORCE: usize = 5;

    fn with_action(action: Action, position: u8, speed: u8, force: u8) -> Self {
        Self([
            action as u16,
            0,
            0,
            position as u16,
            speed as u16,
            force as u16,
        ])
    }

    /// `[0, 0, 0, 0, 0, 0]`
    pub fn clear() -> Self {
        Self::with_action(Action::Clear, 0, 0, 0)
    }

    /// `[1, 0, 0, 0, 0, 0]`, used both to enable and to stop.
    pub fn enable() -> Self {
        Self::with_action(Action::Enable, 0, 0, 0)
    }

    /// `[9, 0, 0, position, speed, force]`
    pub fn go_to(position: u8, speed: u8, force: u8) -> Self {
        Self::with_action(Action::GoTo, position, speed, force)
    }

    pub fn words(&self) -> &[u16; IMAGE_WORDS] {
        &self.0
    }

    pub fn action(&self) -> u16 {
        self.0[Self::ACTION]
    }

    pub fn position(&self) -> u16 {
        self.0[Self::POSITION]
    }

    pub fn speed(&self) -> u16 {
        self.0[Self::SPEED]
    }

    pub fn force(&self) -> u16 {
        self.0[Self::FORCE]
    }

    /// Pack word pairs into big-endian registers for a direct Modbus write.
    pub fn to_registers(&self) -> [u16; IMAGE_REGISTERS] {
        let w = self.0;
        [
            u16::from_be_bytes([w[0] as u8, w[1] as u8]),
            u16::from_be_bytes([w[2] as u8, w[3] as u8]),
            u16::from_be_bytes([w[4] as u8, w[5] as u8]),
        ]
    }
}

impl From<CommandWords> for [u16; IMAGE_WORDS] {
    fn from(value: CommandWords) -> Self {
        value.0
    }
}

/// The result of a status read.
///
/// Block 0 is the transaction return code, block 1 the register contents:
/// `registers[0]` is the status byte and `registers[4]` the current position.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusBlock {
    pub code: i32,
    pub registers: Vec<u16>,
}

impl StatusBlock {
    pub const STATUS: usize = 0;
    pub const FAULT: usize = 2;
    pub const POSITION_REQUEST: usize = 3;
    pub const POSITION: usize = 4;
    pub const CURRENT: usize = 5;

    pub fn new(registers: Vec<u16>) -> Self {
        Self { code: 0, registers }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    /// Unpack big-endian Modbus registers into one word per byte.
    pub fn from_registers(registers: &[u16]) -> Self {
        Self::new(
            registers
                .iter()
                .flat_map(|r| r.to_be_bytes())
                .map(u16::from)
                .collect(),
        )
    }

    /// The byte at `index`, rejecting missing words and values above `0xFF`.
    pub fn byte(&self, index: usize) -> Result<u8, GripperError> {
        let word = self.registers.get(index).copied().ok_or_else(|| {
            GripperError::ProtocolViolation(format!(
                "status block holds {} words, word {index} is missing",
                self.registers.len()
            ))
        })?;
        u8::try_from(word).map_err(|_| {
            GripperError::ProtocolViolation(format!(
                "status word {index} is {word}, outside 0..=255"
            ))
        })
    }

    pub fn status_byte(&self) -> Result<u8, GripperError> {
        self.byte(Self::STATUS)
    }

    pub fn position(&self) -> Result<u8, GripperError> {
        self.byte(Self::POSITION)
    }

    /// The `gGTO` bit of the status byte.
    pub fn gto(&self) -> Result<bool, GripperError> {
        Ok((self.status_byte()? >> 3) & 1 == 1)
    }
}

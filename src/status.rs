//! Full decode of the gripper's status image.

use num::FromPrimitive;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GripperError;
use crate::registers::StatusBlock;

/// The gripper's activation status
#[repr(u8)]
#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationStatus {
    /// Gripper is in reset (or automatic release). See Fault Status if gripper is activated
    InReset,
    /// Activation in progress
    InProgress,
    /// Not used
    NotUsed,
    /// Activation is completed
    Completed,
}

/// Object detection status, provides information on possible object pick-up.
/// Ignore if `gGTO == 0`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjDetectStatus {
    /// Fingers are in motion towards requested position. No object detected
    InMotion,
    /// Fingers have stopped due to a contact while opening before requested position
    DetectedOpen,
    /// Fingers have stopped due to a contact while closing before requested position
    DetectedClose,
    /// Fingers are at requested position. No object detected or object has been lost/dropped.
    NoObject,
}

impl ObjDetectStatus {
    pub fn detected_obj(&self) -> bool {
        matches!(
            self,
            ObjDetectStatus::DetectedClose | ObjDetectStatus::DetectedOpen
        )
    }
}

/// Fault status, the low nibble of the fault register.
#[repr(u8)]
#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GripperFault {
    #[error("no fault")]
    NoFault = 0x00,
    #[error("action delayed, activation must complete first")]
    ActionDelay = 0x05,
    #[error("activation bit must be set before the action")]
    NotActivated = 0x07,
    #[error("maximum operating temperature exceeded")]
    OverHeated = 0x08,
    #[error("no communication for at least one second")]
    NoComm = 0x09,
    #[error("under minimum operating voltage")]
    UnderVoltage = 0x0A,
    #[error("automatic release in progress")]
    Releasing = 0x0B,
    #[error("internal fault")]
    InternalFault = 0x0C,
    #[error("activation fault")]
    ActivationFault = 0x0D,
    #[error("overcurrent triggered")]
    OverCurrent = 0x0E,
    #[error("automatic release completed")]
    AutomaticReleaseCompleted = 0x0F,
}

impl GripperFault {
    /// Major faults need a reset (rising edge on `rACT`) before the next command.
    pub fn reset_required(&self) -> bool {
        *self as u8 >= 0x0A
    }
}

/// Robot input / status of the gripper, read from register `2000`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GripperStatus {
    /// Echo of the `rACT` bit.
    pub act: bool,
    /// Echo of the `rGTO` bit.
    pub gto: bool,
    pub sta: ActivationStatus,
    /// Ignore if `gto == false`.
    pub obj: ObjDetectStatus,
    pub fault: GripperFault,
    /// Vendor specific fault bits, the high nibble of the fault register.
    pub k_flt: u8,
    /// Echo of the requested position.
    pub pos_req: u8,
    /// Actual position from the encoders, `0x00` open to `0xFF` closed.
    pub pos: u8,
    /// Motor current, approximately `10 * current` mA.
    pub current: u8,
}

impl GripperStatus {
    /// Decode the status image. Every field must hold a byte value.
    pub fn decode(block: &StatusBlock) -> Result<Self, GripperError> {
        let status = block.status_byte()?;
        let fault = block.byte(StatusBlock::FAULT)?;

        let sta = ActivationStatus::from_u8((status >> 4) & 0b11).ok_or_else(|| {
            GripperError::ProtocolViolation(format!("activation status in {status:#04x}"))
        })?;
        let obj = ObjDetectStatus::from_u8((status >> 6) & 0b11).ok_or_else(|| {
            GripperError::ProtocolViolation(format!("object status in {status:#04x}"))
        })?;
        let fault_code = GripperFault::from_u8(fault & 0x0F).ok_or_else(|| {
            GripperError::ProtocolViolation(format!("unknown fault code {:#04x}", fault & 0x0F))
        })?;

        Ok(GripperStatus {
            act: status & 1 != 0,
            gto: status & 8 != 0,
            sta,
            obj,
            fault: fault_code,
            k_flt: fault & 0xF0,
            pos_req: block.byte(StatusBlock::POSITION_REQUEST)?,
            pos: block.position()?,
            current: block.byte(StatusBlock::CURRENT)?,
        })
    }
}

impl TryFrom<&StatusBlock> for GripperStatus {
    type Error = GripperError;

    fn try_from(value: &StatusBlock) -> Result<Self, Self::Error> {
        GripperStatus::decode(value)
    }
}
